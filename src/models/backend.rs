//! Scoring backends: where raw model outputs come from

use crate::feature_extractor::{FeatureVector, FEATURE_SCHEMA_VERSION};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Raw outputs for one feature vector. A `None` means that model is not
/// loaded (or failed on this input) and is treated as unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawModelOutputs {
    /// Autoencoder reconstruction mean squared error
    pub reconstruction_mse: Option<f64>,
    /// Isolation forest decision function (negative = anomalous)
    pub isolation_decision: Option<f64>,
    /// GNN sigmoid output
    pub graph_sigmoid: Option<f64>,
    pub model_confidence: Option<f64>,
}

/// Transport-level failure of the backend itself, as opposed to one model
/// being absent.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("model backend unreachable: {0}")]
    Unreachable(String),
    #[error("model backend returned status {0}")]
    BadStatus(u16),
    #[error("model backend returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    async fn infer(&self, features: &FeatureVector) -> Result<RawModelOutputs, BackendError>;
}

/// Backend with no models loaded. Every model is unavailable, so scoring
/// runs on the amount heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

#[async_trait]
impl ScoringBackend for NullBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn infer(&self, _features: &FeatureVector) -> Result<RawModelOutputs, BackendError> {
        Ok(RawModelOutputs::default())
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    schema_version: u32,
    features: BTreeMap<&'static str, f32>,
    vector: &'a [f32],
}

/// Model service reached over HTTP (`POST {base_url}/predict`).
pub struct RemoteBackend {
    client: reqwest::Client,
    predict_url: String,
}

impl RemoteBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build model service HTTP client")?;

        Ok(Self {
            client,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }
}

#[async_trait]
impl ScoringBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn infer(&self, features: &FeatureVector) -> Result<RawModelOutputs, BackendError> {
        let payload = PredictRequest {
            schema_version: FEATURE_SCHEMA_VERSION,
            features: features.named().collect(),
            vector: features.as_slice(),
        };

        let response = self
            .client
            .post(&self.predict_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BackendError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::BadStatus(status.as_u16()));
        }

        let outputs = response
            .json::<RawModelOutputs>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        debug!(outputs = ?outputs, "Model service responded");
        Ok(outputs)
    }
}
