//! Fraud alert data structures

use crate::types::assessment::{RiskAssessment, RiskLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Review status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Resolved,
    FalsePositive,
}

#[derive(Debug, Error, PartialEq)]
pub enum AlertError {
    #[error("alert {0} has already been resolved")]
    AlreadyResolved(String),
}

/// Outcome of a human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResolution {
    pub resolved_by: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub false_positive: bool,
}

/// Fraud alert generated for high and critical risk transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Associated transaction ID
    pub transaction_id: String,

    /// Mirrors the assessment's risk level
    pub severity: RiskLevel,

    pub status: AlertStatus,

    /// Combined risk score (0.0 - 100.0)
    pub risk_score: f64,

    pub message: String,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub resolved_by: Option<String>,

    #[serde(default)]
    pub resolution_notes: Option<String>,

    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Create a pending alert for an assessment
    pub fn for_assessment(assessment: &RiskAssessment) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: assessment.transaction_id.clone(),
            severity: assessment.risk_level,
            status: AlertStatus::Pending,
            risk_score: assessment.risk_score,
            message: format!(
                "{} risk: {:.1}",
                capitalize(assessment.risk_level.as_str()),
                assessment.risk_score
            ),
            created_at: Utc::now(),
            resolved_by: None,
            resolution_notes: None,
            resolved_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == AlertStatus::Pending
    }

    /// Apply a human review. An alert can be resolved exactly once.
    pub fn resolve(&mut self, resolution: AlertResolution) -> Result<(), AlertError> {
        if !self.is_pending() {
            return Err(AlertError::AlreadyResolved(self.alert_id.clone()));
        }

        self.status = if resolution.false_positive {
            AlertStatus::FalsePositive
        } else {
            AlertStatus::Resolved
        };
        self.resolved_by = Some(resolution.resolved_by);
        self.resolution_notes = resolution.notes;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::assessment::ComponentScores;

    fn assessment(level: RiskLevel, score: f64) -> RiskAssessment {
        RiskAssessment {
            transaction_id: "tx_123".to_string(),
            risk_score: score,
            risk_level: level,
            is_fraudulent: level.is_fraudulent(),
            components: ComponentScores {
                anomaly: 0.9,
                isolation: 0.9,
                graph: 0.9,
            },
            confidence: 0.7,
            models_available: Vec::new(),
            assessed_at: Utc::now(),
        }
    }

    fn resolution(false_positive: bool) -> AlertResolution {
        AlertResolution {
            resolved_by: "analyst@bank".to_string(),
            notes: Some("customer confirmed".to_string()),
            false_positive,
        }
    }

    #[test]
    fn test_alert_mirrors_assessment() {
        let alert = Alert::for_assessment(&assessment(RiskLevel::Critical, 93.25));

        assert_eq!(alert.transaction_id, "tx_123");
        assert_eq!(alert.severity, RiskLevel::Critical);
        assert_eq!(alert.status, AlertStatus::Pending);
        assert_eq!(alert.message, "Critical risk: 93.2");
    }

    #[test]
    fn test_resolve_once() {
        let mut alert = Alert::for_assessment(&assessment(RiskLevel::High, 80.0));

        alert.resolve(resolution(false)).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some("analyst@bank"));
        assert!(alert.resolved_at.is_some());

        let second = alert.resolve(resolution(true));
        assert_eq!(second, Err(AlertError::AlreadyResolved(alert.alert_id.clone())));
        assert_eq!(alert.status, AlertStatus::Resolved);
    }

    #[test]
    fn test_resolve_as_false_positive() {
        let mut alert = Alert::for_assessment(&assessment(RiskLevel::High, 78.0));
        alert.resolve(resolution(true)).unwrap();
        assert_eq!(alert.status, AlertStatus::FalsePositive);
    }

    #[test]
    fn test_alert_serialization() {
        let alert = Alert::for_assessment(&assessment(RiskLevel::High, 78.0));

        let json = serde_json::to_string(&alert).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        let deserialized: Alert = serde_json::from_str(&json).unwrap();

        assert_eq!(alert.alert_id, deserialized.alert_id);
        assert_eq!(alert.severity, deserialized.severity);
    }
}
