//! Fraud Risk Scoring Library
//!
//! Scores payment transactions with an ensemble of three anomaly models
//! (reconstruction error, isolation forest, graph), decides on explanations
//! and alerts, and fans completed assessments out to live subscribers.

pub mod broadcast;
pub mod config;
pub mod consumer;
pub mod explain;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod notifier;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use broadcast::{EventBroadcaster, PublishReport, Subscription};
pub use config::AppConfig;
pub use feature_extractor::{FeatureField, FeatureInputs, FeatureVector, FeatureVectorBuilder};
pub use models::{RiskAggregator, ScoringBackend};
pub use orchestrator::{
    BatchReport, ExplanationState, ScoreOptions, ScoringError, ScoringOrchestrator, ScoringOutcome,
};
pub use types::{Alert, RiskAssessment, RiskLevel, ScoringRequest, Transaction};
