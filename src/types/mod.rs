//! Type definitions for the fraud-risk scoring pipeline

pub mod alert;
pub mod assessment;
pub mod event;
pub mod explanation;
pub mod transaction;

pub use alert::{Alert, AlertError, AlertResolution, AlertStatus};
pub use assessment::{ComponentScores, RiskAssessment, RiskLevel, RiskThresholds};
pub use event::BroadcastEvent;
pub use explanation::{Explanation, Reason, SuggestedAction};
pub use transaction::{ScoringRequest, Transaction};
