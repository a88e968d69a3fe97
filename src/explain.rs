//! Explanation collaborator: turns a risk verdict into analyst-facing text

use crate::types::assessment::{RiskAssessment, RiskLevel};
use crate::types::explanation::{Explanation, Reason, SuggestedAction};
use crate::types::transaction::Transaction;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Model identifier attached to locally generated explanations
pub const RULE_BASED_MODEL: &str = "rule_based";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExplainError {
    #[error("explanation service unavailable: {0}")]
    Unavailable(String),
    #[error("explanation service returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ExplanationService: Send + Sync {
    async fn explain(
        &self,
        transaction: &Transaction,
        assessment: &RiskAssessment,
    ) -> Result<Explanation, ExplainError>;
}

#[derive(Serialize)]
struct ModelSignals {
    anomaly_score: f64,
    isolation_score: f64,
    graph_risk_score: f64,
    model_confidence: f64,
}

#[derive(Serialize)]
struct ExplainTransaction<'a> {
    #[serde(flatten)]
    transaction: &'a Transaction,
    risk_score: f64,
    risk_level: RiskLevel,
    is_fraudulent: bool,
    ml_results: ModelSignals,
}

#[derive(Serialize)]
struct ExplainRequest<'a> {
    transaction: ExplainTransaction<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    llm_model: Option<&'a str>,
}

/// Explanation service reached over HTTP (`POST {base_url}/explain`).
pub struct RemoteExplainer {
    client: reqwest::Client,
    explain_url: String,
    llm_model: Option<String>,
}

impl RemoteExplainer {
    pub fn new(base_url: &str, timeout: Duration, llm_model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build explanation service HTTP client")?;

        Ok(Self {
            client,
            explain_url: format!("{}/explain", base_url.trim_end_matches('/')),
            llm_model: llm_model.filter(|m| !m.is_empty()),
        })
    }

    pub fn explain_url(&self) -> &str {
        &self.explain_url
    }
}

#[async_trait]
impl ExplanationService for RemoteExplainer {
    async fn explain(
        &self,
        transaction: &Transaction,
        assessment: &RiskAssessment,
    ) -> Result<Explanation, ExplainError> {
        let request = ExplainRequest {
            transaction: ExplainTransaction {
                transaction,
                risk_score: assessment.risk_score,
                risk_level: assessment.risk_level,
                is_fraudulent: assessment.is_fraudulent,
                ml_results: ModelSignals {
                    anomaly_score: assessment.components.anomaly,
                    isolation_score: assessment.components.isolation,
                    graph_risk_score: assessment.components.graph,
                    model_confidence: assessment.confidence,
                },
            },
            llm_model: self.llm_model.as_deref(),
        };

        let response = self
            .client
            .post(&self.explain_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ExplainError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplainError::Unavailable(format!("status {}", status.as_u16())));
        }

        let explanation = response
            .json::<Explanation>()
            .await
            .map_err(|e| ExplainError::InvalidResponse(e.to_string()))?;

        debug!(
            transaction_id = %assessment.transaction_id,
            model = %explanation.model,
            "Explanation generated"
        );
        Ok(explanation)
    }
}

/// Deterministic explanation built from the component scores alone.
pub fn rule_based_explanation(assessment: &RiskAssessment) -> Explanation {
    let mut reasons = Vec::new();

    if assessment.components.anomaly > 0.7 {
        reasons.push(Reason {
            reason: "High anomaly detection score indicates unusual behavior".to_string(),
            severity: RiskLevel::High,
            impact_score: 0.7,
        });
    }
    if assessment.components.graph > 0.6 {
        reasons.push(Reason {
            reason: "Suspicious connections detected in transaction network".to_string(),
            severity: RiskLevel::Medium,
            impact_score: 0.5,
        });
    }

    Explanation {
        summary: format!(
            "Transaction flagged as {} risk with score {:.1}",
            assessment.risk_level, assessment.risk_score
        ),
        reasons,
        suggested_actions: vec![SuggestedAction {
            action: "Review transaction details".to_string(),
            priority: assessment.risk_level,
            description: "Manually verify transaction authenticity".to_string(),
        }],
        confidence: 0.6,
        model: RULE_BASED_MODEL.to_string(),
        generated_at: Utc::now(),
    }
}
