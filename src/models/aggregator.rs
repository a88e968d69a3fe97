//! Score aggregation for the three-model ensemble

use crate::models::adapters::ModelScores;
use crate::types::assessment::{ComponentScores, RiskAssessment, RiskLevel, RiskThresholds};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Amount at which the no-model heuristic saturates.
const HEURISTIC_AMOUNT_CAP: f64 = 5000.0;

/// Graph proxy factor applied to the anomaly score when the graph model is missing.
const GRAPH_PROXY_FACTOR: f64 = 0.8;

/// Relative weight of the pointwise and relational signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationWeights {
    pub anomaly: f64,
    pub graph: f64,
}

impl Default for AggregationWeights {
    fn default() -> Self {
        Self {
            anomaly: 0.4,
            graph: 0.6,
        }
    }
}

impl AggregationWeights {
    /// Weights must be finite, non-negative and not both zero
    pub fn validate(&self) -> Result<(), String> {
        if !self.anomaly.is_finite() || !self.graph.is_finite() {
            return Err(format!("scoring weights must be finite: {:?}", self));
        }
        if self.anomaly < 0.0 || self.graph < 0.0 {
            return Err(format!("scoring weights must be non-negative: {:?}", self));
        }
        if self.anomaly + self.graph == 0.0 {
            return Err("scoring weights must not both be zero".to_string());
        }
        Ok(())
    }
}

/// Where the anomaly component came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySource {
    Both,
    ReconstructionOnly,
    IsolationOnly,
    AmountHeuristic,
}

/// Where the graph component came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphSource {
    Model,
    AnomalyProxy,
}

/// Aggregator verdict, before it is bound to a transaction id
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRisk {
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub is_fraudulent: bool,
    pub components: ComponentScores,
    pub confidence: f64,
    pub anomaly_source: AnomalySource,
    pub graph_source: GraphSource,
}

impl AggregatedRisk {
    pub fn into_assessment(
        self,
        transaction_id: impl Into<String>,
        models_available: Vec<String>,
    ) -> RiskAssessment {
        RiskAssessment {
            transaction_id: transaction_id.into(),
            risk_score: self.risk_score,
            risk_level: self.risk_level,
            is_fraudulent: self.is_fraudulent,
            components: self.components,
            confidence: self.confidence,
            models_available,
            assessed_at: Utc::now(),
        }
    }

    /// True when at least one component fell back to a heuristic
    pub fn is_degraded(&self) -> bool {
        self.anomaly_source == AnomalySource::AmountHeuristic
            || self.graph_source == GraphSource::AnomalyProxy
    }
}

/// Combines normalized model scores into a bounded risk score and level.
#[derive(Debug, Clone)]
pub struct RiskAggregator {
    weights: AggregationWeights,
    thresholds: RiskThresholds,
    /// Reported when no model supplied a confidence
    default_confidence: f64,
}

impl RiskAggregator {
    /// Invalid weights are replaced by the defaults so the score stays in [0, 100].
    pub fn new(weights: AggregationWeights, thresholds: RiskThresholds) -> Self {
        let weights = match weights.validate() {
            Ok(()) => weights,
            Err(reason) => {
                warn!(reason = %reason, "Ignoring invalid aggregation weights");
                AggregationWeights::default()
            }
        };
        Self {
            weights,
            thresholds,
            default_confidence: 0.5,
        }
    }

    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Aggregate the model scores of one transaction.
    ///
    /// Never fails: missing models degrade to the amount heuristic and the
    /// anomaly-based graph proxy.
    pub fn aggregate(&self, scores: &ModelScores, amount: f64) -> AggregatedRisk {
        let reconstruction = scores.reconstruction.value();
        let isolation = scores.isolation.value();

        let (anomaly, anomaly_source) = match (reconstruction, isolation) {
            (Some(r), Some(i)) => ((r + i) / 2.0, AnomalySource::Both),
            (Some(r), None) => (r, AnomalySource::ReconstructionOnly),
            (None, Some(i)) => (i, AnomalySource::IsolationOnly),
            (None, None) => (amount_heuristic(amount), AnomalySource::AmountHeuristic),
        };
        let anomaly = anomaly.clamp(0.0, 1.0);

        let (graph, graph_source) = match scores.graph.value() {
            Some(g) => (g.clamp(0.0, 1.0), GraphSource::Model),
            None => (anomaly * GRAPH_PROXY_FACTOR, GraphSource::AnomalyProxy),
        };

        let combined = (self.weights.anomaly * anomaly + self.weights.graph * graph).clamp(0.0, 1.0);
        let risk_score = round2(combined * 100.0);
        let risk_level = RiskLevel::from_score(risk_score, &self.thresholds);

        let confidence = scores
            .confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(self.default_confidence);

        AggregatedRisk {
            risk_score,
            risk_level,
            is_fraudulent: risk_level.is_fraudulent(),
            components: ComponentScores {
                anomaly,
                isolation: isolation.unwrap_or(anomaly),
                graph,
            },
            confidence,
            anomaly_source,
            graph_source,
        }
    }
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new(AggregationWeights::default(), RiskThresholds::default())
    }
}

/// Bounded anomaly stand-in used when neither pointwise model is available
pub fn amount_heuristic(amount: f64) -> f64 {
    let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
    (amount / HEURISTIC_AMOUNT_CAP).min(1.0) * 0.5 + 0.1
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
