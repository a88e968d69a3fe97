//! Model scoring: backends, per-model normalization and the risk ensemble

pub mod adapters;
pub mod aggregator;
pub mod backend;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use adapters::{AdapterResult, ModelKind, ModelScore, ModelScores};
pub use aggregator::{AggregationWeights, RiskAggregator};
pub use backend::{BackendError, NullBackend, RawModelOutputs, RemoteBackend, ScoringBackend};
#[cfg(feature = "onnx")]
pub use onnx::{ModelFiles, OnnxBackend};
