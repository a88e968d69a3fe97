//! Throughput, latency and outcome statistics for the scoring pipeline.

use crate::broadcast::PublishReport;
use crate::models::adapters::{ModelKind, ModelScores};
use crate::orchestrator::{ExplanationState, PipelineStage};
use crate::types::assessment::{RiskAssessment, RiskLevel};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// End-to-end timings kept for percentiles
const PROCESSING_WINDOW: usize = 10_000;
/// Per-backend timings and agreement samples
const SAMPLE_WINDOW: usize = 1_000;

/// Metrics collector for pipeline performance
pub struct PipelineMetrics {
    /// Assessments returned to callers
    pub transactions_scored: AtomicU64,
    /// Requests that ended in a hard failure
    pub hard_failures: AtomicU64,
    pub alerts_generated: AtomicU64,
    /// Assessments where at least one fallback heuristic was used
    pub degraded_assessments: AtomicU64,
    pub events_delivered: AtomicU64,
    pub events_dropped: AtomicU64,
    alerts_by_level: RwLock<HashMap<RiskLevel, u64>>,
    failures_by_stage: RwLock<HashMap<PipelineStage, u64>>,
    /// End-to-end processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Backend inference times (in microseconds)
    backend_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Risk score distribution over 0-100 in buckets of 10
    score_buckets: RwLock<[u64; 10]>,
    /// How often each model produced a usable score
    model_available: RwLock<HashMap<ModelKind, u64>>,
    explanation_outcomes: RwLock<HashMap<ExplanationState, u64>>,
    /// Agreement between available model scores (1 - std dev)
    model_agreements: RwLock<Vec<f64>>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            transactions_scored: AtomicU64::new(0),
            hard_failures: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            degraded_assessments: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            alerts_by_level: RwLock::new(HashMap::new()),
            failures_by_stage: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            backend_times: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 10]),
            model_available: RwLock::new(HashMap::new()),
            explanation_outcomes: RwLock::new(HashMap::new()),
            model_agreements: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a completed assessment and the model scores behind it
    pub fn record_assessment(
        &self,
        processing_time: Duration,
        assessment: &RiskAssessment,
        scores: &ModelScores,
        degraded: bool,
    ) {
        self.transactions_scored.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.degraded_assessments.fetch_add(1, Ordering::Relaxed);
        }

        push_windowed(
            &mut *self.processing_times.write(),
            processing_time.as_micros() as u64,
            PROCESSING_WINDOW,
        );

        let bucket = ((assessment.risk_score / 10.0).max(0.0) as usize).min(9);
        self.score_buckets.write()[bucket] += 1;

        {
            let mut available = self.model_available.write();
            for score in scores.iter().filter(|s| s.is_available()) {
                *available.entry(score.kind).or_insert(0) += 1;
            }
        }

        self.record_model_agreement(scores);
    }

    pub fn record_failure(&self, stage: PipelineStage) {
        self.hard_failures.fetch_add(1, Ordering::Relaxed);
        *self.failures_by_stage.write().entry(stage).or_insert(0) += 1;
    }

    pub fn record_alert(&self, risk_level: RiskLevel) {
        self.alerts_generated.fetch_add(1, Ordering::Relaxed);
        *self.alerts_by_level.write().entry(risk_level).or_insert(0) += 1;
    }

    pub fn record_backend_time(&self, backend: &str, duration: Duration) {
        let mut times = self.backend_times.write();
        let samples = times.entry(backend.to_string()).or_default();
        push_windowed(samples, duration.as_micros() as u64, SAMPLE_WINDOW);
    }

    pub fn record_explanation(&self, state: ExplanationState) {
        *self.explanation_outcomes.write().entry(state).or_insert(0) += 1;
    }

    pub fn record_broadcast(&self, report: PublishReport) {
        self.events_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.events_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
    }

    fn record_model_agreement(&self, scores: &ModelScores) {
        let values: Vec<f64> = scores.iter().filter_map(|s| s.value()).collect();
        if values.len() < 2 {
            return;
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        let agreement = 1.0 - variance.sqrt().min(1.0);

        push_windowed(&mut *self.model_agreements.write(), agreement, SAMPLE_WINDOW);
    }

    pub fn get_processing_stats(&self) -> LatencyStats {
        LatencyStats::from_samples(&self.processing_times.read())
    }

    /// Inference latency per backend name
    pub fn get_backend_stats(&self) -> HashMap<String, LatencyStats> {
        self.backend_times
            .read()
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|(backend, samples)| (backend.clone(), LatencyStats::from_samples(samples)))
            .collect()
    }

    pub fn get_avg_agreement(&self) -> f64 {
        let agreements = self.model_agreements.read();
        if agreements.is_empty() {
            return 0.0;
        }
        agreements.iter().sum::<f64>() / agreements.len() as f64
    }

    /// Transactions per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read()
    }

    pub fn get_alerts_by_level(&self) -> HashMap<RiskLevel, u64> {
        self.alerts_by_level.read().clone()
    }

    pub fn get_failures_by_stage(&self) -> HashMap<PipelineStage, u64> {
        self.failures_by_stage.read().clone()
    }

    pub fn get_model_availability(&self) -> HashMap<ModelKind, u64> {
        self.model_available.read().clone()
    }

    pub fn get_explanation_outcomes(&self) -> HashMap<ExplanationState, u64> {
        self.explanation_outcomes.read().clone()
    }

    /// Log a summary of everything collected so far
    pub fn print_summary(&self) {
        let scored = self.transactions_scored.load(Ordering::Relaxed);
        let failures = self.hard_failures.load(Ordering::Relaxed);
        let alert_count = self.alerts_generated.load(Ordering::Relaxed);
        let degraded = self.degraded_assessments.load(Ordering::Relaxed);
        let alert_rate = if scored > 0 {
            (alert_count as f64 / scored as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║             FRAUD RISK SCORING - METRICS SUMMARY             ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Scored: {:>8}  Failed: {:>6}  Throughput: {:>6.1} tx/s    ║",
            scored,
            failures,
            self.get_throughput()
        );
        info!(
            "║ Alerts: {:>8}  Alert Rate: {:>5.1}%  Degraded: {:>8}     ║",
            alert_count, alert_rate, degraded
        );
        info!(
            "║ Processing Time (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.p99_us
        );
        info!(
            "║ Model Agreement: {:>5.1}%  Live feed: {} delivered, {} dropped",
            self.get_avg_agreement() * 100.0,
            self.events_delivered.load(Ordering::Relaxed),
            self.events_dropped.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for level in [RiskLevel::Medium, RiskLevel::High, RiskLevel::Critical] {
            if let Some(count) = self.alerts_by_level.read().get(&level) {
                info!("║   alerts {:10}: {:>6}", level.as_str(), count);
            }
        }
        for (kind, count) in self.get_model_availability() {
            info!("║   model {:16}: available {:>6}", kind.name(), count);
        }
        for (state, count) in self.get_explanation_outcomes() {
            info!("║   explanation {:10}: {:>6}", state.as_str(), count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Risk Score Distribution:                                     ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar = "█".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "║   {:>3}-{:<3}: {:>6} ({:>5.1}%) {}",
                i * 10,
                (i + 1) * 10,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        for (backend, stats) in self.get_backend_stats() {
            info!(
                backend = %backend,
                calls = stats.count,
                mean_us = stats.mean_us,
                p50_us = stats.p50_us,
                p99_us = stats.p99_us,
                "Backend inference latency"
            );
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency percentiles over a window of samples, in microseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

impl LatencyStats {
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();

        let n = sorted.len();
        let rank = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];
        Self {
            count: n as u64,
            mean_us: sorted.iter().sum::<u64>() / n as u64,
            p50_us: rank(0.50),
            p95_us: rank(0.95),
            p99_us: rank(0.99),
            max_us: sorted[n - 1],
        }
    }
}

/// Append a sample, discarding the older half once the window is full
fn push_windowed<T>(samples: &mut Vec<T>, value: T, window: usize) {
    samples.push(value);
    if samples.len() > window {
        samples.drain(0..window / 2);
    }
}

/// Prints a summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::assessment::ComponentScores;
    use chrono::Utc;

    fn assessment(score: f64) -> RiskAssessment {
        let thresholds = Default::default();
        let level = RiskLevel::from_score(score, &thresholds);
        RiskAssessment {
            transaction_id: "tx".to_string(),
            risk_score: score,
            risk_level: level,
            is_fraudulent: level.is_fraudulent(),
            components: ComponentScores {
                anomaly: 0.0,
                isolation: 0.0,
                graph: 0.0,
            },
            confidence: 0.5,
            models_available: vec![],
            assessed_at: Utc::now(),
        }
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = PipelineMetrics::new();
        let scores = ModelScores::from_values(Some(0.2), None, Some(0.3));

        metrics.record_assessment(Duration::from_micros(100), &assessment(5.0), &scores, true);
        metrics.record_assessment(Duration::from_micros(200), &assessment(100.0), &scores, false);
        metrics.record_alert(RiskLevel::Critical);
        metrics.record_failure(PipelineStage::Scoring);

        assert_eq!(metrics.transactions_scored.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.degraded_assessments.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.hard_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_alerts_by_level()[&RiskLevel::Critical], 1);

        let buckets = metrics.get_score_distribution();
        assert_eq!(buckets[0], 1);
        assert_eq!(buckets[9], 1);

        let availability = metrics.get_model_availability();
        assert_eq!(availability[&ModelKind::Reconstruction], 2);
        assert!(!availability.contains_key(&ModelKind::Isolation));

        let stats = metrics.get_processing_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max_us, 200);
    }

    #[test]
    fn test_latency_stats() {
        let samples: Vec<u64> = (1..=100).collect();
        let stats = LatencyStats::from_samples(&samples);
        assert_eq!(stats.count, 100);
        assert_eq!(stats.mean_us, 50);
        assert_eq!(stats.p50_us, 51);
        assert_eq!(stats.p99_us, 100);
        assert_eq!(stats.max_us, 100);

        assert_eq!(LatencyStats::from_samples(&[]), LatencyStats::default());
        assert_eq!(LatencyStats::from_samples(&[7]).p99_us, 7);
    }

    #[test]
    fn test_window_keeps_recent_samples() {
        let mut samples = Vec::new();
        for i in 0..11 {
            push_windowed(&mut samples, i, 10);
        }
        assert_eq!(samples, vec![5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_model_agreement() {
        let metrics = PipelineMetrics::new();
        let scores = ModelScores::from_values(Some(0.8), Some(0.82), Some(0.79));

        metrics.record_assessment(Duration::from_micros(10), &assessment(80.0), &scores, false);
        assert!(metrics.get_avg_agreement() > 0.9);
    }

    #[test]
    fn test_broadcast_and_explanation_counts() {
        let metrics = PipelineMetrics::new();
        metrics.record_broadcast(PublishReport { delivered: 3, dropped: 1 });
        metrics.record_explanation(ExplanationState::Reused);
        metrics.record_explanation(ExplanationState::Reused);

        assert_eq!(metrics.events_delivered.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.events_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.get_explanation_outcomes()[&ExplanationState::Reused], 2);
    }
}
