//! Fraud Risk Scoring - Main Entry Point
//!
//! Consumes scoring requests from NATS, scores them through the model
//! ensemble, publishes alerts and relays the live feed back to NATS.

use anyhow::{Context, Result};
use fraud_risk_scoring::{
    broadcast::EventBroadcaster,
    config::{AppConfig, BackendKind, LogFormat, LoggingConfig},
    consumer::{decode_request, TransactionConsumer},
    explain::RemoteExplainer,
    metrics::{MetricsReporter, PipelineMetrics},
    models::{NullBackend, RemoteBackend, RiskAggregator, ScoringBackend},
    notifier::{relay_live_feed, NatsAlertNotifier},
    orchestrator::{ScoreOptions, ScoringOrchestrator},
    store::InMemoryStore,
    ScoringRequest,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Fraud Risk Scoring");
    info!(
        low = config.scoring.low,
        medium = config.scoring.medium,
        high = config.scoring.high,
        critical = config.scoring.critical,
        anomaly_weight = config.scoring.anomaly_weight,
        graph_weight = config.scoring.graph_weight,
        "Configuration loaded"
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let broadcaster = EventBroadcaster::new(config.broadcast.queue_capacity);

    let backend = build_backend(&config)?;
    info!(backend = backend.name(), "Scoring backend ready");

    let aggregator = RiskAggregator::new(config.scoring.weights(), config.scoring.thresholds())
        .with_default_confidence(config.models.default_confidence);

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let store = Arc::new(InMemoryStore::with_capacity(config.store.max_transactions));
    info!(max_transactions = config.store.max_transactions, "Assessment store ready");

    let notifier = Arc::new(NatsAlertNotifier::new(client.clone(), &config.nats.alert_subject));
    let mut orchestrator = ScoringOrchestrator::new(backend, aggregator, broadcaster.clone())
        .with_store(store)
        .with_notifier(notifier)
        .with_metrics(metrics.clone())
        .with_rule_based_fallback(config.explanation.rule_based_fallback);

    if config.explanation.enabled {
        let explainer = RemoteExplainer::new(
            &config.explanation.service_url,
            config.explanation.timeout(),
            config.explanation.llm_model.clone(),
        )?;
        info!(url = %explainer.explain_url(), "Explanation service configured");
        orchestrator = orchestrator.with_explainer(Arc::new(explainer));
    } else {
        info!("Explanations disabled");
    }
    let orchestrator = Arc::new(orchestrator);

    let relay = tokio::spawn(relay_live_feed(
        broadcaster.subscribe(),
        client.clone(),
        config.nats.event_subject.clone(),
    ));

    let reporter = tokio::spawn(
        MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs).start(),
    );

    let consumer = TransactionConsumer::new(client.clone(), &config.nats.transaction_subject);
    let mut subscription = consumer.subscribe().await?;

    let workers = config.pipeline.workers;
    let deadline = config.pipeline.timeout();
    let semaphore = Arc::new(Semaphore::new(workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    info!(
        workers = workers,
        alerts = %config.nats.alert_subject,
        live_feed = %config.nats.event_subject,
        "Starting transaction processing loop"
    );

    loop {
        tokio::select! {
            message = subscription.next() => {
                let Some(message) = message else {
                    warn!("Transaction subscription closed");
                    break;
                };

                let request = match decode_request(&message.payload) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(subject = %message.subject, error = %e, "Failed to deserialize scoring request");
                        continue;
                    }
                };

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .context("Worker pool closed")?;

                let orchestrator = orchestrator.clone();
                let metrics = metrics.clone();
                let processed_count = processed_count.clone();

                tokio::spawn(async move {
                    process(orchestrator, request, deadline, permit).await;

                    let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    if count % 100 == 0 {
                        info!(
                            processed = count,
                            throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                            avg_latency_us = metrics.get_processing_stats().mean_us,
                            "Processing milestone"
                        );
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Pipeline shutting down...");

    // Wait for in-flight transactions
    let drained = tokio::time::timeout(
        deadline + Duration::from_secs(1),
        semaphore.acquire_many(workers as u32),
    )
    .await;
    if drained.is_err() {
        warn!("Timed out waiting for in-flight transactions");
    }

    broadcaster.shutdown();
    if let Err(e) = relay.await {
        warn!(error = %e, "Live feed relay task failed");
    }
    reporter.abort();

    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush NATS client");
    }

    metrics.print_summary();
    Ok(())
}

/// Score one request under the pipeline deadline. When the deadline passes
/// the caller stops waiting; inference still finishes but persistence and
/// broadcast are skipped.
async fn process(
    orchestrator: Arc<ScoringOrchestrator>,
    request: ScoringRequest,
    deadline: Duration,
    permit: OwnedSemaphorePermit,
) {
    let transaction_id = request.transaction_id().to_string();
    let cancel = CancellationToken::new();
    let options = ScoreOptions::default().with_cancel(cancel.clone());

    let mut task = tokio::spawn(async move {
        // the worker slot stays taken until scoring really finishes
        let _permit = permit;
        orchestrator.score(&request, &options).await
    });

    match tokio::time::timeout(deadline, &mut task).await {
        Ok(Ok(Ok(outcome))) => {
            debug!(
                transaction_id = %transaction_id,
                risk_score = outcome.assessment.risk_score,
                explanation = outcome.explanation_state.as_str(),
                alert = outcome.alert.is_some(),
                "Transaction processed"
            );
        }
        Ok(Ok(Err(e))) => {
            error!(transaction_id = %transaction_id, error = %e, "Scoring failed");
        }
        Ok(Err(e)) => {
            error!(transaction_id = %transaction_id, error = %e, "Scoring task failed");
        }
        Err(_) => {
            cancel.cancel();
            warn!(
                transaction_id = %transaction_id,
                timeout_ms = deadline.as_millis() as u64,
                "Scoring deadline elapsed, side effects will be skipped"
            );
        }
    }
}

fn build_backend(config: &AppConfig) -> Result<Arc<dyn ScoringBackend>> {
    match config.models.backend {
        BackendKind::Remote => {
            let backend = RemoteBackend::new(&config.models.service_url, config.models.timeout())?;
            info!(url = %backend.predict_url(), "Using remote model service");
            Ok(Arc::new(backend))
        }
        BackendKind::Onnx => load_onnx_backend(config),
        BackendKind::None => {
            warn!("No model backend configured, scoring on the amount heuristic");
            Ok(Arc::new(NullBackend))
        }
    }
}

#[cfg(feature = "onnx")]
fn load_onnx_backend(config: &AppConfig) -> Result<Arc<dyn ScoringBackend>> {
    use fraud_risk_scoring::models::{ModelFiles, OnnxBackend};

    let files = ModelFiles {
        autoencoder: config.models.autoencoder_file.clone(),
        isolation_forest: config.models.isolation_forest_file.clone(),
        gnn: config.models.gnn_file.clone(),
    };
    let backend = OnnxBackend::load(&config.models.models_dir, &files, config.models.onnx_threads)?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx_backend(_config: &AppConfig) -> Result<Arc<dyn ScoringBackend>> {
    anyhow::bail!("models.backend = \"onnx\" requires a build with the `onnx` feature")
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("fraud_risk_scoring={}", logging.level))
            .context("Invalid logging.level")?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
    Ok(())
}
