//! Configuration management for the risk scoring service

use crate::models::aggregator::AggregationWeights;
use crate::types::assessment::RiskThresholds;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variables with this prefix override file values,
/// e.g. `FRAUD__SCORING__HIGH=80`
pub const ENV_PREFIX: &str = "FRAUD";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub scoring: ScoringConfig,
    pub explanation: ExplanationConfig,
    pub broadcast: BroadcastConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Subject for incoming scoring requests
    pub transaction_subject: String,
    /// Subject for outgoing fraud alerts
    pub alert_subject: String,
    /// Subject the live feed is relayed to
    pub event_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            transaction_subject: "transactions".to_string(),
            alert_subject: "fraud.alerts".to_string(),
            event_subject: "fraud.live".to_string(),
        }
    }
}

/// Where raw model outputs come from
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// HTTP model service
    #[default]
    Remote,
    /// In-process ONNX Runtime (requires the `onnx` feature)
    Onnx,
    /// No models; amount heuristic only
    None,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub backend: BackendKind,
    pub models_dir: String,
    /// Threads per ONNX session
    pub onnx_threads: usize,
    pub autoencoder_file: String,
    pub isolation_forest_file: String,
    pub gnn_file: String,
    pub service_url: String,
    pub timeout_ms: u64,
    /// Reported when no model supplies a confidence
    pub default_confidence: f64,
}

impl ModelsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Remote,
            models_dir: "models".to_string(),
            onnx_threads: 1,
            autoencoder_file: "autoencoder.onnx".to_string(),
            isolation_forest_file: "isolation_forest.onnx".to_string(),
            gnn_file: "gnn.onnx".to_string(),
            service_url: "http://localhost:8001".to_string(),
            timeout_ms: 5000,
            default_confidence: 0.5,
        }
    }
}

/// Risk thresholds on the 0-100 scale and ensemble weights
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
    pub anomaly_weight: f64,
    pub graph_weight: f64,
}

impl ScoringConfig {
    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            low: self.low,
            medium: self.medium,
            high: self.high,
            critical: self.critical,
        }
    }

    pub fn weights(&self) -> AggregationWeights {
        AggregationWeights {
            anomaly: self.anomaly_weight,
            graph: self.graph_weight,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let thresholds = RiskThresholds::default();
        let weights = AggregationWeights::default();
        Self {
            low: thresholds.low,
            medium: thresholds.medium,
            high: thresholds.high,
            critical: thresholds.critical,
            anomaly_weight: weights.anomaly,
            graph_weight: weights.graph,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplanationConfig {
    pub enabled: bool,
    pub service_url: String,
    pub timeout_ms: u64,
    pub llm_model: Option<String>,
    /// Substitute a rule-based explanation when the service fails
    pub rule_based_fallback: bool,
}

impl ExplanationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ExplanationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_url: "http://localhost:8002".to_string(),
            timeout_ms: 30000,
            llm_model: Some("llama3".to_string()),
            rule_based_fallback: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Per-subscriber queue capacity
    pub queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: crate::broadcast::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Assessment store sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Transactions retained before the oldest are evicted
    pub max_transactions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum transactions in flight
    pub workers: usize,
    /// Per-transaction deadline in milliseconds
    pub timeout_ms: u64,
    pub metrics_interval_secs: u64,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            timeout_ms: 10000,
            metrics_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    /// Load `config/config.toml` if present, then environment overrides
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/config").required(false))
            .add_source(env_overrides())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    /// Load configuration from a specific path, then environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_overrides())
            .build()
            .context("Failed to build configuration")?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        self.scoring
            .thresholds()
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid [scoring] section")?;

        self.scoring
            .weights()
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid [scoring] section")?;

        if !(0.0..=1.0).contains(&self.models.default_confidence) {
            bail!(
                "models.default_confidence must be within [0, 1], got {}",
                self.models.default_confidence
            );
        }
        if self.broadcast.queue_capacity == 0 {
            bail!("broadcast.queue_capacity must be at least 1");
        }
        if self.store.max_transactions == 0 {
            bail!("store.max_transactions must be at least 1");
        }
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        Ok(())
    }
}

fn env_overrides() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
