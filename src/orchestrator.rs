//! Per-transaction scoring pipeline.
//!
//! `Extracting -> Scoring -> Aggregating -> (ExplanationPending) -> Done`,
//! with `Failed` reachable only from `Scoring` when the backend itself is
//! unreachable. Everything after the verdict is best-effort: explanation
//! problems are reported through [`ExplanationState`], while persistence,
//! notification and broadcast problems are logged and swallowed.

use crate::broadcast::EventBroadcaster;
use crate::explain::{rule_based_explanation, ExplanationService};
use crate::feature_extractor::FeatureVectorBuilder;
use crate::metrics::PipelineMetrics;
use crate::models::adapters::ModelScores;
use crate::models::aggregator::{AnomalySource, GraphSource, RiskAggregator};
use crate::models::backend::ScoringBackend;
use crate::notifier::AlertNotifier;
use crate::store::{AssessmentStore, StoreError};
use crate::types::alert::Alert;
use crate::types::assessment::{RiskAssessment, RiskLevel};
use crate::types::event::BroadcastEvent;
use crate::types::explanation::Explanation;
use crate::types::transaction::{ScoringRequest, Transaction};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_BATCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Extracting,
    Scoring,
    Aggregating,
    ExplanationPending,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Extracting => "extracting",
            PipelineStage::Scoring => "scoring",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::ExplanationPending => "explanation_pending",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the explanation of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationState {
    /// Low risk: no explanation is produced
    NotNeeded,
    /// Generated by the explanation service on this call
    Fresh,
    /// Earlier explanation for the same transaction id
    Reused,
    /// Service failed, rule-based explanation substituted
    Fallback,
    /// Service failed or is disabled and the caller did not ask for one
    Missing,
    /// The caller required a fresh explanation and none could be produced
    Degraded,
}

impl ExplanationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExplanationState::NotNeeded => "not_needed",
            ExplanationState::Fresh => "fresh",
            ExplanationState::Reused => "reused",
            ExplanationState::Fallback => "fallback",
            ExplanationState::Missing => "missing",
            ExplanationState::Degraded => "degraded",
        }
    }
}

/// The only error `score` returns. No partial assessment accompanies it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScoringError {
    #[error("scoring service unavailable during {stage}: {reason}")]
    ServiceUnavailable { stage: PipelineStage, reason: String },
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ScoreOptions {
    /// The caller explicitly wants an explanation; failing to produce a
    /// fresh or cached one is reported as `Degraded`
    pub require_explanation: bool,
    /// Skip the cached explanation and ask the service again
    pub regenerate: bool,
    /// Cancelled when the caller gives up; side effects are then skipped
    pub cancel: Option<CancellationToken>,
}

impl ScoreOptions {
    pub fn require_explanation(mut self) -> Self {
        self.require_explanation = true;
        self
    }

    pub fn regenerate(mut self) -> Self {
        self.regenerate = true;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Everything `score` produced for one transaction
#[derive(Debug, Clone)]
pub struct ScoringOutcome {
    pub assessment: RiskAssessment,
    pub explanation: Option<Explanation>,
    pub explanation_state: ExplanationState,
    /// Present for high and critical transactions
    pub alert: Option<Alert>,
    pub anomaly_source: AnomalySource,
    pub graph_source: GraphSource,
}

impl ScoringOutcome {
    pub fn is_explanation_degraded(&self) -> bool {
        self.explanation_state == ExplanationState::Degraded
    }
}

/// Statistics over one batch
#[derive(Debug)]
pub struct BatchReport {
    pub total: usize,
    pub scored: usize,
    pub failed: usize,
    pub fraudulent: usize,
    /// High or critical
    pub high_risk: usize,
    /// Mean risk score of the scored items, 2 decimals
    pub average_risk_score: f64,
    /// Fraudulent share of the scored items in percent, 2 decimals
    pub fraud_rate_percent: f64,
    /// One entry per request, in request order
    pub results: Vec<Result<ScoringOutcome, ScoringError>>,
}

impl BatchReport {
    fn from_results(results: Vec<Result<ScoringOutcome, ScoringError>>) -> Self {
        let assessments: Vec<&RiskAssessment> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|o| &o.assessment)
            .collect();

        let scored = assessments.len();
        let fraudulent = assessments.iter().filter(|a| a.is_fraudulent).count();
        let high_risk = assessments
            .iter()
            .filter(|a| matches!(a.risk_level, RiskLevel::High | RiskLevel::Critical))
            .count();
        let (average_risk_score, fraud_rate_percent) = if scored > 0 {
            let sum: f64 = assessments.iter().map(|a| a.risk_score).sum();
            (
                round2(sum / scored as f64),
                round2(fraudulent as f64 / scored as f64 * 100.0),
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            total: results.len(),
            scored,
            failed: results.len() - scored,
            fraudulent,
            high_risk,
            average_risk_score,
            fraud_rate_percent,
            results,
        }
    }
}

/// Sequences one transaction through the pipeline.
pub struct ScoringOrchestrator {
    builder: FeatureVectorBuilder,
    backend: Arc<dyn ScoringBackend>,
    aggregator: RiskAggregator,
    broadcaster: EventBroadcaster,
    metrics: Arc<PipelineMetrics>,
    /// `None` when explanations are disabled
    explainer: Option<Arc<dyn ExplanationService>>,
    store: Option<Arc<dyn AssessmentStore>>,
    notifier: Option<Arc<dyn AlertNotifier>>,
    rule_based_fallback: bool,
    batch_concurrency: usize,
}

impl ScoringOrchestrator {
    pub fn new(
        backend: Arc<dyn ScoringBackend>,
        aggregator: RiskAggregator,
        broadcaster: EventBroadcaster,
    ) -> Self {
        Self {
            builder: FeatureVectorBuilder::new(),
            backend,
            aggregator,
            broadcaster,
            metrics: Arc::new(PipelineMetrics::new()),
            explainer: None,
            store: None,
            notifier: None,
            rule_based_fallback: false,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn ExplanationService>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn AssessmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_rule_based_fallback(mut self, enabled: bool) -> Self {
        self.rule_based_fallback = enabled;
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Score one transaction.
    ///
    /// Fails only when the scoring backend cannot be reached. Identical
    /// requests produce identical risk scores and levels.
    pub async fn score(
        &self,
        request: &ScoringRequest,
        options: &ScoreOptions,
    ) -> Result<ScoringOutcome, ScoringError> {
        let started = Instant::now();
        let transaction = &request.transaction;
        let transaction_id = transaction.transaction_id.as_str();

        debug!(transaction_id = %transaction_id, stage = %PipelineStage::Extracting, "Building feature vector");
        let features = self.builder.build_for(request);

        debug!(transaction_id = %transaction_id, stage = %PipelineStage::Scoring, "Running models");
        let inference_start = Instant::now();
        let response = self.backend.infer(&features).await;
        self.metrics
            .record_backend_time(self.backend.name(), inference_start.elapsed());

        let scores = ModelScores::evaluate(&response);
        if let Some(reason) = scores.transport_error() {
            error!(
                transaction_id = %transaction_id,
                backend = self.backend.name(),
                error = %reason,
                "Scoring backend unavailable"
            );
            self.metrics.record_failure(PipelineStage::Scoring);
            return Err(ScoringError::ServiceUnavailable {
                stage: PipelineStage::Scoring,
                reason: reason.to_string(),
            });
        }

        let risk = self.aggregator.aggregate(&scores, transaction.amount);
        let degraded = risk.is_degraded();
        let (anomaly_source, graph_source) = (risk.anomaly_source, risk.graph_source);
        if degraded {
            warn!(
                transaction_id = %transaction_id,
                anomaly_source = ?anomaly_source,
                graph_source = ?graph_source,
                "Scored with fallback heuristics"
            );
        }
        let assessment = risk.into_assessment(transaction_id, scores.available_names());

        let (explanation, explanation_state) = if assessment.risk_level.needs_explanation() {
            self.resolve_explanation(transaction, &assessment, options).await
        } else {
            (None, ExplanationState::NotNeeded)
        };
        self.metrics.record_explanation(explanation_state);

        // a transaction carries at most one alert; rescoring reuses it
        let (mut alert, raised) = if !assessment.risk_level.is_fraudulent() {
            (None, false)
        } else if let Some(existing) = self.existing_alert(transaction_id).await {
            debug!(transaction_id = %transaction_id, alert_id = %existing.alert_id, "Alert already raised");
            (Some(existing), false)
        } else {
            (Some(Alert::for_assessment(&assessment)), true)
        };

        if options.is_cancelled() {
            warn!(transaction_id = %transaction_id, "Caller gave up, skipping persistence and broadcast");
        } else {
            self.persist(&assessment, explanation.as_ref(), explanation_state)
                .await;
            if raised {
                if let Some(candidate) = alert.take() {
                    let (claimed, is_new) = self.claim_alert(candidate).await;
                    if is_new {
                        self.metrics.record_alert(claimed.severity);
                        self.notify(&claimed).await;
                    }
                    alert = Some(claimed);
                }
            }
            let report = self
                .broadcaster
                .publish(&BroadcastEvent::from_assessment(transaction, &assessment));
            self.metrics.record_broadcast(report);
        }

        self.metrics
            .record_assessment(started.elapsed(), &assessment, &scores, degraded);

        info!(
            transaction_id = %transaction_id,
            risk_score = assessment.risk_score,
            risk_level = %assessment.risk_level,
            models = ?assessment.models_available,
            explanation = explanation_state.as_str(),
            "Transaction scored"
        );

        Ok(ScoringOutcome {
            assessment,
            explanation,
            explanation_state,
            alert,
            anomaly_source,
            graph_source,
        })
    }

    /// Score many transactions independently. A failed item is recorded
    /// and does not stop the batch.
    pub async fn score_batch(
        &self,
        requests: &[ScoringRequest],
        options: &ScoreOptions,
    ) -> BatchReport {
        let results: Vec<_> = stream::iter(requests)
            .map(|request| self.score(request, options))
            .buffered(self.batch_concurrency)
            .collect()
            .await;

        let report = BatchReport::from_results(results);
        info!(
            total = report.total,
            failed = report.failed,
            fraudulent = report.fraudulent,
            average_risk_score = report.average_risk_score,
            "Batch scored"
        );
        report
    }

    async fn resolve_explanation(
        &self,
        transaction: &Transaction,
        assessment: &RiskAssessment,
        options: &ScoreOptions,
    ) -> (Option<Explanation>, ExplanationState) {
        let transaction_id = assessment.transaction_id.as_str();

        if !options.regenerate {
            if let Some(cached) = self.cached_explanation(transaction_id).await {
                debug!(transaction_id = %transaction_id, "Reusing cached explanation");
                return (Some(cached), ExplanationState::Reused);
            }
        }

        let failure = match &self.explainer {
            Some(explainer) => match explainer.explain(transaction, assessment).await {
                Ok(explanation) => return (Some(explanation), ExplanationState::Fresh),
                Err(e) => e.to_string(),
            },
            None => "explanations disabled".to_string(),
        };

        let required = options.require_explanation || options.regenerate;
        let fallback = self
            .rule_based_fallback
            .then(|| rule_based_explanation(assessment));

        let state = if required {
            ExplanationState::Degraded
        } else if fallback.is_some() {
            ExplanationState::Fallback
        } else {
            ExplanationState::Missing
        };
        warn!(
            transaction_id = %transaction_id,
            reason = %failure,
            state = state.as_str(),
            "No fresh explanation"
        );
        (fallback, state)
    }

    async fn cached_explanation(&self, transaction_id: &str) -> Option<Explanation> {
        let store = self.store.as_ref()?;
        match store.find_explanation(transaction_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "Explanation lookup failed");
                None
            }
        }
    }

    async fn persist(
        &self,
        assessment: &RiskAssessment,
        explanation: Option<&Explanation>,
        explanation_state: ExplanationState,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        let transaction_id = assessment.transaction_id.as_str();

        if let Err(e) = store.save_assessment(assessment).await {
            warn!(transaction_id = %transaction_id, error = %e, "Failed to persist assessment");
        }

        // fallbacks stay out of the cache so a later call can still get a fresh one
        if let (Some(explanation), ExplanationState::Fresh) = (explanation, explanation_state) {
            if let Err(e) = store.save_explanation(transaction_id, explanation).await {
                warn!(transaction_id = %transaction_id, error = %e, "Failed to persist explanation");
            }
        }
    }

    async fn existing_alert(&self, transaction_id: &str) -> Option<Alert> {
        let store = self.store.as_ref()?;
        match store.find_alert_for_transaction(transaction_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(transaction_id = %transaction_id, error = %e, "Alert lookup failed");
                None
            }
        }
    }

    /// Persist a freshly raised alert. Returns the alert the transaction
    /// ends up with and whether it is the one raised here; a concurrent
    /// call for the same transaction may have stored its alert first.
    async fn claim_alert(&self, alert: Alert) -> (Alert, bool) {
        let Some(store) = &self.store else {
            return (alert, true);
        };
        match store.save_alert(&alert).await {
            Ok(()) => (alert, true),
            Err(StoreError::Conflict(reason)) => {
                debug!(transaction_id = %alert.transaction_id, reason = %reason, "Alert raised concurrently");
                match store.find_alert_for_transaction(&alert.transaction_id).await {
                    Ok(Some(existing)) => (existing, false),
                    _ => (alert, false),
                }
            }
            Err(e) => {
                warn!(alert_id = %alert.alert_id, error = %e, "Failed to persist alert");
                (alert, true)
            }
        }
    }

    async fn notify(&self, alert: &Alert) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if !notifier.notify(alert).await {
            warn!(
                alert_id = %alert.alert_id,
                transaction_id = %alert.transaction_id,
                "Alert notification not delivered"
            );
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::ExplainError;
    use crate::feature_extractor::FeatureVector;
    use crate::models::backend::{BackendError, NullBackend, RawModelOutputs};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedBackend(RawModelOutputs);

    #[async_trait]
    impl ScoringBackend for FixedBackend {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn infer(&self, _features: &FeatureVector) -> Result<RawModelOutputs, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct DownBackend;

    #[async_trait]
    impl ScoringBackend for DownBackend {
        fn name(&self) -> &'static str {
            "down"
        }

        async fn infer(&self, _features: &FeatureVector) -> Result<RawModelOutputs, BackendError> {
            Err(BackendError::Unreachable("connection refused".to_string()))
        }
    }

    /// Explainer that fails on demand and counts its calls
    #[derive(Default)]
    struct CountingExplainer {
        calls: AtomicUsize,
        failing: bool,
    }

    #[async_trait]
    impl ExplanationService for CountingExplainer {
        async fn explain(
            &self,
            _transaction: &Transaction,
            assessment: &RiskAssessment,
        ) -> Result<Explanation, ExplainError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing {
                return Err(ExplainError::Unavailable("timeout".to_string()));
            }
            let mut explanation = rule_based_explanation(assessment);
            explanation.model = format!("stub-{}", call);
            Ok(explanation)
        }
    }

    fn outputs(mse: f64, sigmoid: f64) -> RawModelOutputs {
        RawModelOutputs {
            reconstruction_mse: Some(mse),
            isolation_decision: None,
            graph_sigmoid: Some(sigmoid),
            model_confidence: None,
        }
    }

    fn orchestrator(backend: impl ScoringBackend + 'static) -> ScoringOrchestrator {
        ScoringOrchestrator::new(
            Arc::new(backend),
            RiskAggregator::default(),
            EventBroadcaster::default(),
        )
    }

    fn request(id: &str, amount: f64) -> ScoringRequest {
        ScoringRequest::new(Transaction::new(id, amount))
    }

    #[tokio::test]
    async fn test_low_risk_needs_no_explanation() {
        let explainer = Arc::new(CountingExplainer::default());
        let orchestrator =
            orchestrator(FixedBackend(outputs(0.0, 0.0))).with_explainer(explainer.clone());

        let outcome = orchestrator
            .score(&request("tx_low", 10.0), &ScoreOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.assessment.risk_score, 0.0);
        assert_eq!(outcome.explanation_state, ExplanationState::NotNeeded);
        assert!(outcome.alert.is_none());
        assert_eq!(explainer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_down_is_service_unavailable() {
        let orchestrator = orchestrator(DownBackend);
        let mut feed = orchestrator.broadcaster().subscribe();

        let err = orchestrator
            .score(&request("tx_down", 10.0), &ScoreOptions::default())
            .await
            .unwrap_err();

        let ScoringError::ServiceUnavailable { stage, reason } = err;
        assert_eq!(stage, PipelineStage::Scoring);
        assert!(reason.contains("connection refused"));
        assert!(feed.try_recv().is_none());
        assert_eq!(orchestrator.metrics().get_failures_by_stage()[&PipelineStage::Scoring], 1);
    }

    #[tokio::test]
    async fn test_no_models_uses_heuristic() {
        let orchestrator = orchestrator(NullBackend);

        let outcome = orchestrator
            .score(&request("tx_none", 2500.0), &ScoreOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.assessment.risk_score, 30.8);
        assert_eq!(outcome.anomaly_source, AnomalySource::AmountHeuristic);
        assert_eq!(outcome.graph_source, GraphSource::AnomalyProxy);
        assert!(outcome.assessment.models_available.is_empty());
    }

    #[tokio::test]
    async fn test_explainer_failure_states() {
        // 0.4 * 0.6 + 0.6 * 0.5 = 0.54 -> medium
        let mse = -(0.4f64).ln();
        let failing = Arc::new(CountingExplainer {
            failing: true,
            ..Default::default()
        });

        let plain = orchestrator(FixedBackend(outputs(mse, 0.5))).with_explainer(failing.clone());
        let outcome = plain
            .score(&request("tx_medium", 50.0), &ScoreOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.assessment.risk_level, RiskLevel::Medium);
        assert_eq!(outcome.explanation_state, ExplanationState::Missing);
        assert!(outcome.explanation.is_none());

        let required = plain
            .score(&request("tx_medium", 50.0), &ScoreOptions::default().require_explanation())
            .await
            .unwrap();
        assert!(required.is_explanation_degraded());

        let with_fallback = orchestrator(FixedBackend(outputs(mse, 0.5)))
            .with_explainer(failing)
            .with_rule_based_fallback(true);
        let outcome = with_fallback
            .score(&request("tx_medium", 50.0), &ScoreOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.explanation_state, ExplanationState::Fallback);
        assert_eq!(outcome.explanation.unwrap().model, "rule_based");
    }

    #[tokio::test]
    async fn test_explanations_disabled() {
        let orchestrator = orchestrator(FixedBackend(outputs(10.0, 1.0)));

        let outcome = orchestrator
            .score(&request("tx_crit", 9000.0), &ScoreOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.assessment.risk_level, RiskLevel::Critical);
        assert_eq!(outcome.explanation_state, ExplanationState::Missing);
        assert!(outcome.alert.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_caller_skips_side_effects() {
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = orchestrator(FixedBackend(outputs(10.0, 1.0))).with_store(store.clone());
        let mut feed = orchestrator.broadcaster().subscribe();

        let token = CancellationToken::new();
        token.cancel();
        let outcome = orchestrator
            .score(&request("tx_gone", 100.0), &ScoreOptions::default().with_cancel(token))
            .await
            .unwrap();

        assert_eq!(outcome.assessment.risk_score, 100.0);
        assert!(outcome.alert.is_some());
        assert_eq!(store.assessment_count(), 0);
        assert_eq!(store.alert_count(), 0);
        assert!(feed.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_rescoring_reuses_alert() {
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = orchestrator(FixedBackend(outputs(10.0, 1.0))).with_store(store.clone());

        let first = orchestrator
            .score(&request("tx_twice", 9000.0), &ScoreOptions::default())
            .await
            .unwrap();
        let second = orchestrator
            .score(&request("tx_twice", 9000.0), &ScoreOptions::default())
            .await
            .unwrap();

        assert_eq!(
            first.alert.unwrap().alert_id,
            second.alert.unwrap().alert_id
        );
        assert_eq!(store.alert_count(), 1);
        assert_eq!(orchestrator.metrics().alerts_generated.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_batch_report_statistics() {
        let assessment = |id: &str, score: f64, level: RiskLevel| ScoringOutcome {
            assessment: RiskAssessment {
                transaction_id: id.to_string(),
                risk_score: score,
                risk_level: level,
                is_fraudulent: level.is_fraudulent(),
                components: crate::types::assessment::ComponentScores {
                    anomaly: 0.0,
                    isolation: 0.0,
                    graph: 0.0,
                },
                confidence: 0.5,
                models_available: vec![],
                assessed_at: chrono::Utc::now(),
            },
            explanation: None,
            explanation_state: ExplanationState::NotNeeded,
            alert: None,
            anomaly_source: AnomalySource::Both,
            graph_source: GraphSource::Model,
        };

        let report = BatchReport::from_results(vec![
            Ok(assessment("a", 10.0, RiskLevel::Low)),
            Ok(assessment("b", 80.0, RiskLevel::High)),
            Ok(assessment("c", 95.0, RiskLevel::Critical)),
            Err(ScoringError::ServiceUnavailable {
                stage: PipelineStage::Scoring,
                reason: "down".to_string(),
            }),
        ]);

        assert_eq!(report.total, 4);
        assert_eq!(report.scored, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.fraudulent, 2);
        assert_eq!(report.high_risk, 2);
        assert_eq!(report.average_risk_score, 61.67);
        assert_eq!(report.fraud_rate_percent, 66.67);
    }

    #[test]
    fn test_empty_batch_report() {
        let report = BatchReport::from_results(vec![]);
        assert_eq!(report.total, 0);
        assert_eq!(report.average_risk_score, 0.0);
        assert_eq!(report.fraud_rate_percent, 0.0);
    }
}
