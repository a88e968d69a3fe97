//! Risk assessment data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from a 0-100 score and thresholds.
    ///
    /// Everything below `medium` is `Low`, including the `[low, medium)` band.
    pub fn from_score(score: f64, thresholds: &RiskThresholds) -> Self {
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// High and critical transactions are treated as fraudulent and alerted on
    pub fn is_fraudulent(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }

    /// Medium and above get a human-readable explanation
    pub fn needs_explanation(self) -> bool {
        !matches!(self, RiskLevel::Low)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configurable risk level thresholds on the 0-100 risk scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low: 25.0,
            medium: 50.0,
            high: 75.0,
            critical: 90.0,
        }
    }
}

impl RiskThresholds {
    /// Thresholds must lie in [0, 100] and be non-decreasing
    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.low, self.medium, self.high, self.critical];
        if ordered.iter().any(|t| !(0.0..=100.0).contains(t)) {
            return Err(format!("risk thresholds must be within [0, 100]: {:?}", ordered));
        }
        if ordered.windows(2).any(|w| w[0] > w[1]) {
            return Err(format!("risk thresholds must be non-decreasing: {:?}", ordered));
        }
        Ok(())
    }
}

/// Per-component scores behind a risk score, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    /// Combined pointwise anomaly signal
    pub anomaly: f64,
    /// Isolation-style score, or the anomaly score when that model was unavailable
    pub isolation: f64,
    /// Relational (graph) signal
    pub graph: f64,
}

/// Final risk verdict for one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub transaction_id: String,

    /// Combined risk score (0.0 - 100.0, 2 decimals)
    pub risk_score: f64,

    pub risk_level: RiskLevel,

    /// True iff risk_level is high or critical
    pub is_fraudulent: bool,

    pub components: ComponentScores,

    /// Model confidence (0.0 - 1.0)
    pub confidence: f64,

    /// Names of the models that produced a usable score
    pub models_available: Vec<String>,

    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Fraud probability view of the score (0.0 - 1.0)
    pub fn fraud_score(&self) -> f64 {
        (self.risk_score / 100.0).clamp(0.0, 1.0)
    }

    /// Recommended operator action for the risk level
    pub fn recommended_action(&self) -> &'static str {
        match self.risk_level {
            RiskLevel::Low => "Proceed normally",
            RiskLevel::Medium => "Review",
            RiskLevel::High => "Verify",
            RiskLevel::Critical => "Block",
        }
    }
}
