//! Live-feed event published for every completed assessment

use crate::types::assessment::{RiskAssessment, RiskLevel};
use crate::types::transaction::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Small snapshot of an assessment, independent of the persisted record so
/// the live feed keeps working when persistence fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub transaction_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub merchant_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub is_fraudulent: bool,
    pub transaction_time: DateTime<Utc>,
}

impl BroadcastEvent {
    pub fn from_assessment(transaction: &Transaction, assessment: &RiskAssessment) -> Self {
        Self {
            kind: "transaction".to_string(),
            transaction_id: assessment.transaction_id.clone(),
            risk_score: assessment.risk_score,
            risk_level: assessment.risk_level,
            merchant_id: transaction.merchant_id.clone(),
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            is_fraudulent: assessment.is_fraudulent,
            transaction_time: assessment.assessed_at,
        }
    }
}
