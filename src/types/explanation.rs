//! Human-readable explanation of a risk verdict

use crate::types::assessment::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single contributing reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reason {
    pub reason: String,
    pub severity: RiskLevel,
    #[serde(default)]
    pub impact_score: f64,
}

/// A recommended follow-up for an analyst
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub action: String,
    pub priority: RiskLevel,
    #[serde(default)]
    pub description: String,
}

/// Explanation produced for medium-or-higher risk transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub summary: String,

    /// Ordered by importance
    #[serde(default)]
    pub reasons: Vec<Reason>,

    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,

    #[serde(default)]
    pub confidence: f64,

    /// Identifier of the generating model ("rule_based" for the local fallback)
    #[serde(default, alias = "model_used")]
    pub model: String,

    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}
