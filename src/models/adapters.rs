//! Per-model score normalization.
//!
//! Each adapter maps one raw model output onto [0, 1]. A model that is not
//! loaded, or whose output is unusable, is reported as unavailable; only a
//! failure of the backend itself is a transport error.

use crate::models::backend::{BackendError, RawModelOutputs};
use serde::Serialize;
use std::fmt;
use tracing::warn;

/// Reconstruction error is capped here before squashing.
pub const MSE_CAP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Reconstruction,
    Isolation,
    Graph,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Reconstruction => "autoencoder",
            ModelKind::Isolation => "isolation_forest",
            ModelKind::Graph => "gnn",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one adapter call
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterResult {
    /// Normalized score in [0, 1]
    Available(f64),
    /// No model loaded, or the model produced nothing usable
    Unavailable,
    /// The scoring backend could not be reached
    TransportError(String),
}

/// Normalized score of one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScore {
    pub kind: ModelKind,
    pub result: AdapterResult,
}

impl ModelScore {
    /// The score, if the model produced one
    pub fn value(&self) -> Option<f64> {
        match self.result {
            AdapterResult::Available(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.value().is_some()
    }
}

/// The three model scores for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScores {
    pub reconstruction: ModelScore,
    pub isolation: ModelScore,
    pub graph: ModelScore,
    /// Confidence reported by the backend, if any
    pub confidence: Option<f64>,
}

impl ModelScores {
    /// Run every adapter over one backend response
    pub fn evaluate(response: &Result<RawModelOutputs, BackendError>) -> Self {
        Self {
            reconstruction: ReconstructionScorer.evaluate(response),
            isolation: IsolationScorer.evaluate(response),
            graph: GraphScorer.evaluate(response),
            confidence: response.as_ref().ok().and_then(|o| o.model_confidence),
        }
    }

    /// Build from already-normalized values (`None` = unavailable)
    pub fn from_values(
        reconstruction: Option<f64>,
        isolation: Option<f64>,
        graph: Option<f64>,
    ) -> Self {
        let score = |kind, value: Option<f64>| ModelScore {
            kind,
            result: match value {
                Some(v) => AdapterResult::Available(v.clamp(0.0, 1.0)),
                None => AdapterResult::Unavailable,
            },
        };
        Self {
            reconstruction: score(ModelKind::Reconstruction, reconstruction),
            isolation: score(ModelKind::Isolation, isolation),
            graph: score(ModelKind::Graph, graph),
            confidence: None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelScore> {
        [&self.reconstruction, &self.isolation, &self.graph].into_iter()
    }

    /// First transport error among the adapters, if the backend failed
    pub fn transport_error(&self) -> Option<&str> {
        self.iter().find_map(|s| match &s.result {
            AdapterResult::TransportError(e) => Some(e.as_str()),
            _ => None,
        })
    }

    pub fn available_names(&self) -> Vec<String> {
        self.iter()
            .filter(|s| s.is_available())
            .map(|s| s.kind.name().to_string())
            .collect()
    }
}

/// Maps one raw backend output to a normalized score.
pub trait ModelAdapter {
    fn kind(&self) -> ModelKind;

    /// Pick this model's raw value out of the backend response
    fn raw(&self, outputs: &RawModelOutputs) -> Option<f64>;

    /// Map a finite raw value onto [0, 1]
    fn normalize(&self, raw: f64) -> f64;

    fn evaluate(&self, response: &Result<RawModelOutputs, BackendError>) -> ModelScore {
        let result = match response {
            Err(e) => AdapterResult::TransportError(e.to_string()),
            Ok(outputs) => match self.raw(outputs) {
                None => AdapterResult::Unavailable,
                Some(raw) if !raw.is_finite() => {
                    warn!(model = %self.kind(), raw = raw, "Model returned a non-finite output, ignoring");
                    AdapterResult::Unavailable
                }
                Some(raw) => AdapterResult::Available(self.normalize(raw).clamp(0.0, 1.0)),
            },
        };
        ModelScore {
            kind: self.kind(),
            result,
        }
    }
}

/// Autoencoder: saturating map of reconstruction MSE, `1 - exp(-min(mse, 10))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconstructionScorer;

impl ModelAdapter for ReconstructionScorer {
    fn kind(&self) -> ModelKind {
        ModelKind::Reconstruction
    }

    fn raw(&self, outputs: &RawModelOutputs) -> Option<f64> {
        outputs.reconstruction_mse
    }

    fn normalize(&self, mse: f64) -> f64 {
        reconstruction_score(mse)
    }
}

pub fn reconstruction_score(mse: f64) -> f64 {
    (1.0 - (-mse.min(MSE_CAP)).exp()).clamp(0.0, 1.0)
}

/// Mean squared error between a vector and its reconstruction.
///
/// Returns `None` when the shapes differ or the input is empty.
pub fn mean_squared_error(input: &[f32], reconstruction: &[f32]) -> Option<f64> {
    if input.is_empty() || input.len() != reconstruction.len() {
        return None;
    }
    let sum: f64 = input
        .iter()
        .zip(reconstruction)
        .map(|(x, r)| (*x as f64 - *r as f64).powi(2))
        .sum();
    Some(sum / input.len() as f64)
}

/// Isolation forest: logistic squashing of the decision function, where
/// more negative means more anomalous: `1 / (1 + exp(d))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsolationScorer;

impl ModelAdapter for IsolationScorer {
    fn kind(&self) -> ModelKind {
        ModelKind::Isolation
    }

    fn raw(&self, outputs: &RawModelOutputs) -> Option<f64> {
        outputs.isolation_decision
    }

    fn normalize(&self, decision: f64) -> f64 {
        isolation_score(decision)
    }
}

pub fn isolation_score(decision: f64) -> f64 {
    (1.0 / (1.0 + decision.exp())).clamp(0.0, 1.0)
}

/// GNN: the model's sigmoid output is already a probability.
///
/// The graph model is evaluated on a single node with no edges; there is
/// no neighbor information at inference time.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphScorer;

impl ModelAdapter for GraphScorer {
    fn kind(&self) -> ModelKind {
        ModelKind::Graph
    }

    fn raw(&self, outputs: &RawModelOutputs) -> Option<f64> {
        outputs.graph_sigmoid
    }

    fn normalize(&self, sigmoid: f64) -> f64 {
        sigmoid.clamp(0.0, 1.0)
    }
}

/// Zero-pad or truncate a vector to the graph model's input width
pub fn fit_width(features: &[f32], width: usize) -> Vec<f32> {
    let mut fitted = features[..features.len().min(width)].to_vec();
    fitted.resize(width, 0.0);
    fitted
}
