//! End-to-end scoring scenarios with in-process collaborators

use async_trait::async_trait;
use fraud_risk_scoring::broadcast::EventBroadcaster;
use fraud_risk_scoring::explain::{rule_based_explanation, ExplainError, ExplanationService};
use fraud_risk_scoring::feature_extractor::{FeatureField, FeatureInputs, FeatureVector};
use fraud_risk_scoring::models::aggregator::{AnomalySource, GraphSource};
use fraud_risk_scoring::models::backend::{BackendError, NullBackend, RawModelOutputs, ScoringBackend};
use fraud_risk_scoring::models::RiskAggregator;
use fraud_risk_scoring::notifier::AlertNotifier;
use fraud_risk_scoring::orchestrator::{
    ExplanationState, PipelineStage, ScoreOptions, ScoringError, ScoringOrchestrator,
};
use fraud_risk_scoring::store::{AssessmentStore, InMemoryStore, StoreError};
use fraud_risk_scoring::types::{
    Alert, AlertResolution, AlertStatus, Explanation, RiskAssessment, RiskLevel, ScoringRequest,
    Transaction,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Backend returning the same raw outputs for every vector
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

/// Backend whose outputs follow the amount; negative amounts fail transport
struct AmountBackend;

#[async_trait]
impl ScoringBackend for AmountBackend {
    fn name(&self) -> &'static str {
        "amount"
    }

    async fn infer(&self, features: &FeatureVector) -> Result<RawModelOutputs, BackendError> {
        let amount = features.get(FeatureField::Amount) as f64;
        if amount < 0.0 {
            return Err(BackendError::BadStatus(503));
        }
        Ok(RawModelOutputs {
            reconstruction_mse: Some(amount / 10.0),
            isolation_decision: None,
            graph_sigmoid: Some((amount / 100.0).min(1.0)),
            model_confidence: Some(0.9),
        })
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

#[derive(Default)]
struct StubExplainer {
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StubExplainer {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExplanationService for StubExplainer {
    async fn explain(
        &self,
        _transaction: &Transaction,
        assessment: &RiskAssessment,
    ) -> Result<Explanation, ExplainError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExplainError::Unavailable("llm timeout".to_string()));
        }
        let mut explanation = rule_based_explanation(assessment);
        explanation.model = format!("llm-{}", call);
        Ok(explanation)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Alert>>,
    deliver: bool,
}

#[async_trait]
impl AlertNotifier for RecordingNotifier {
    async fn notify(&self, alert: &Alert) -> bool {
        self.sent.lock().push(alert.clone());
        self.deliver
    }
}

/// Store whose every operation fails
struct BrokenStore;

#[async_trait]
impl AssessmentStore for BrokenStore {
    async fn save_assessment(&self, _assessment: &RiskAssessment) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn find_assessment(&self, _id: &str) -> Result<Option<RiskAssessment>, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn save_explanation(&self, _id: &str, _e: &Explanation) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn find_explanation(&self, _id: &str) -> Result<Option<Explanation>, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn save_alert(&self, _alert: &Alert) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn find_alert(&self, _id: &str) -> Result<Option<Alert>, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn find_alert_for_transaction(&self, _id: &str) -> Result<Option<Alert>, StoreError> {
        Err(StoreError::Backend("disk full".to_string()))
    }

    async fn resolve_alert(&self, id: &str, _r: AlertResolution) -> Result<Alert, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }
}

struct Harness {
    orchestrator: ScoringOrchestrator,
    explainer: Arc<StubExplainer>,
    notifier: Arc<RecordingNotifier>,
    store: Arc<InMemoryStore>,
}

fn harness(backend: impl ScoringBackend + 'static) -> Harness {
    let explainer = Arc::new(StubExplainer::default());
    let notifier = Arc::new(RecordingNotifier {
        deliver: true,
        ..Default::default()
    });
    let store = Arc::new(InMemoryStore::new());

    let orchestrator = ScoringOrchestrator::new(
        Arc::new(backend),
        RiskAggregator::default(),
        EventBroadcaster::default(),
    )
    .with_explainer(explainer.clone())
    .with_notifier(notifier.clone())
    .with_store(store.clone());

    Harness {
        orchestrator,
        explainer,
        notifier,
        store,
    }
}

fn raw(mse: f64, sigmoid: f64) -> RawModelOutputs {
    RawModelOutputs {
        reconstruction_mse: Some(mse),
        isolation_decision: None,
        graph_sigmoid: Some(sigmoid),
        model_confidence: None,
    }
}

fn request(id: &str, amount: f64) -> ScoringRequest {
    ScoringRequest::new(Transaction::new(id, amount).with_merchant("merchant_42"))
}

#[tokio::test]
async fn scenario_a_zero_scores_are_low_risk() {
    let h = harness(FixedBackend(raw(0.0, 0.0)));
    let mut feed = h.orchestrator.broadcaster().subscribe();

    let outcome = h
        .orchestrator
        .score(&request("tx_a", 25.0), &ScoreOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.assessment.risk_score, 0.0);
    assert_eq!(outcome.assessment.risk_level, RiskLevel::Low);
    assert!(!outcome.assessment.is_fraudulent);
    assert!(outcome.alert.is_none());
    assert!(outcome.explanation.is_none());
    assert_eq!(outcome.explanation_state, ExplanationState::NotNeeded);
    assert_eq!(h.explainer.calls(), 0);

    let event: serde_json::Value = serde_json::from_str(&feed.recv().await.unwrap()).unwrap();
    assert_eq!(event["type"], "transaction");
    assert_eq!(event["transaction_id"], "tx_a");
    assert_eq!(event["risk_level"], "low");
    assert_eq!(event["merchant_id"], "merchant_42");
}

#[tokio::test]
async fn scenario_b_saturated_scores_are_critical() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));

    let outcome = h
        .orchestrator
        .score(&request("tx_b", 9800.0), &ScoreOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.assessment.risk_score, 100.0);
    assert_eq!(outcome.assessment.risk_level, RiskLevel::Critical);
    assert!(outcome.assessment.is_fraudulent);

    let alert = outcome.alert.expect("critical transactions raise an alert");
    assert_eq!(alert.severity, RiskLevel::Critical);
    assert_eq!(alert.status, AlertStatus::Pending);
    assert_eq!(h.notifier.sent.lock().len(), 1);
    assert_eq!(h.store.alerts_for("tx_b").len(), 1);

    assert_eq!(outcome.explanation_state, ExplanationState::Fresh);
    assert_eq!(h.explainer.calls(), 1);
    let stored = h.store.find_explanation("tx_b").await.unwrap().unwrap();
    assert_eq!(stored.model, "llm-1");
}

#[tokio::test]
async fn scenario_c_medium_risk_gets_explanation_without_alert() {
    // reconstruction score 1 - exp(ln 0.4) = 0.6, graph 0.5 -> 54.0
    let h = harness(FixedBackend(raw(-(0.4f64).ln(), 0.5)));

    let outcome = h
        .orchestrator
        .score(&request("tx_c", 300.0), &ScoreOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.assessment.risk_score, 54.0);
    assert_eq!(outcome.assessment.risk_level, RiskLevel::Medium);
    assert!(!outcome.assessment.is_fraudulent);
    assert!(outcome.alert.is_none());
    assert_eq!(outcome.explanation_state, ExplanationState::Fresh);
    assert!(outcome.explanation.is_some());
    assert!(h.notifier.sent.lock().is_empty());
}

#[tokio::test]
async fn all_models_unavailable_still_scores() {
    let h = harness(NullBackend);

    let outcome = h
        .orchestrator
        .score(&request("tx_none", 10000.0), &ScoreOptions::default())
        .await
        .unwrap();

    // anomaly = 0.6, graph = 0.48 -> 0.24 + 0.288 = 0.528
    assert_eq!(outcome.assessment.risk_score, 52.8);
    assert_eq!(outcome.assessment.risk_level, RiskLevel::Medium);
    assert_eq!(outcome.anomaly_source, AnomalySource::AmountHeuristic);
    assert_eq!(outcome.graph_source, GraphSource::AnomalyProxy);
    assert_eq!(outcome.assessment.confidence, 0.5);
    assert!(outcome.assessment.models_available.is_empty());
}

#[tokio::test]
async fn backend_outage_is_service_unavailable() {
    let h = harness(DownBackend);
    let mut feed = h.orchestrator.broadcaster().subscribe();

    let result = h
        .orchestrator
        .score(&request("tx_down", 50.0), &ScoreOptions::default())
        .await;

    match result {
        Err(ScoringError::ServiceUnavailable { stage, reason }) => {
            assert_eq!(stage, PipelineStage::Scoring);
            assert!(reason.contains("connection refused"));
        }
        Ok(outcome) => panic!("expected a hard failure, got {:?}", outcome.assessment),
    }
    assert_eq!(h.store.assessment_count(), 0);
    assert!(feed.try_recv().is_none());
    assert_eq!(h.explainer.calls(), 0);
}

#[tokio::test]
async fn identical_requests_score_identically() {
    let h = harness(AmountBackend);
    let context = FeatureInputs::default()
        .with(FeatureField::UserTransactionCount, 3_u32)
        .with(FeatureField::DeviceIsSuspicious, true);
    let request = request("tx_same", 60.0).with_context(context);

    let first = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();

    assert_eq!(first.assessment.risk_score, second.assessment.risk_score);
    assert_eq!(first.assessment.risk_level, second.assessment.risk_level);
    assert_eq!(first.assessment.components, second.assessment.components);
    assert_eq!(first.assessment.confidence, 0.9);
}

#[tokio::test]
async fn cached_explanation_is_reused_until_regenerated() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    let request = request("tx_cache", 5000.0);

    let first = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(first.explanation_state, ExplanationState::Fresh);

    let second = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(second.explanation_state, ExplanationState::Reused);
    assert_eq!(second.explanation.unwrap().model, "llm-1");
    assert_eq!(h.explainer.calls(), 1);

    let regenerated = h
        .orchestrator
        .score(&request, &ScoreOptions::default().regenerate())
        .await
        .unwrap();
    assert_eq!(regenerated.explanation_state, ExplanationState::Fresh);
    assert_eq!(regenerated.explanation.unwrap().model, "llm-2");
    assert_eq!(h.explainer.calls(), 2);
}

#[tokio::test]
async fn explanation_failure_is_degraded_only_when_required() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    h.explainer.set_failing(true);

    let quiet = h
        .orchestrator
        .score(&request("tx_explain", 700.0), &ScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(quiet.explanation_state, ExplanationState::Missing);
    assert_eq!(quiet.assessment.risk_level, RiskLevel::Critical);

    let required = h
        .orchestrator
        .score(&request("tx_explain", 700.0), &ScoreOptions::default().require_explanation())
        .await
        .unwrap();
    assert!(required.is_explanation_degraded());
    assert!(required.explanation.is_none());
    assert_eq!(required.assessment.risk_score, quiet.assessment.risk_score);
}

#[tokio::test]
async fn failed_regeneration_is_degraded_even_with_cache() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    let request = request("tx_regen", 700.0);

    h.orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    h.explainer.set_failing(true);

    let outcome = h
        .orchestrator
        .score(&request, &ScoreOptions::default().regenerate())
        .await
        .unwrap();
    assert_eq!(outcome.explanation_state, ExplanationState::Degraded);

    // the earlier explanation is still served to plain lookups
    let plain = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(plain.explanation_state, ExplanationState::Reused);
}

#[tokio::test]
async fn persistence_failure_keeps_the_verdict() {
    let broadcaster = EventBroadcaster::default();
    let mut feed = broadcaster.subscribe();
    let orchestrator = ScoringOrchestrator::new(
        Arc::new(FixedBackend(raw(10.0, 1.0))),
        RiskAggregator::default(),
        broadcaster,
    )
    .with_store(Arc::new(BrokenStore));

    let outcome = orchestrator
        .score(&request("tx_store", 100.0), &ScoreOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.assessment.risk_score, 100.0);
    assert!(outcome.alert.is_some());
    assert!(feed.try_recv().is_some());
}

#[tokio::test]
async fn undelivered_alert_does_not_change_result() {
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = ScoringOrchestrator::new(
        Arc::new(FixedBackend(raw(10.0, 1.0))),
        RiskAggregator::default(),
        EventBroadcaster::default(),
    )
    .with_notifier(notifier.clone());

    let outcome = orchestrator
        .score(&request("tx_notify", 100.0), &ScoreOptions::default())
        .await
        .unwrap();

    assert!(outcome.alert.is_some());
    assert_eq!(notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn rescoring_keeps_a_single_alert() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    let request = request("tx_dup", 9000.0);

    let first = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    let second = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();

    assert_eq!(h.store.alerts_for("tx_dup").len(), 1);
    assert_eq!(h.notifier.sent.lock().len(), 1);
    assert_eq!(first.alert.unwrap().alert_id, second.alert.unwrap().alert_id);
}

#[tokio::test]
async fn resolved_alert_is_not_raised_again() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    let request = request("tx_reviewed", 9000.0);

    let first = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    let resolution = AlertResolution {
        resolved_by: "analyst".to_string(),
        notes: None,
        false_positive: true,
    };
    h.store
        .resolve_alert(&first.alert.unwrap().alert_id, resolution)
        .await
        .unwrap();

    let again = h
        .orchestrator
        .score(&request, &ScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(again.alert.unwrap().status, AlertStatus::FalsePositive);
    assert_eq!(h.store.alert_count(), 1);
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rescoring_raises_one_alert() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    let orchestrator = Arc::new(h.orchestrator);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .score(&request("tx_race", 9000.0), &ScoreOptions::default())
                    .await
                    .unwrap()
                    .alert
                    .unwrap()
                    .alert_id
            })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap());
    }
    ids.dedup();

    assert_eq!(ids.len(), 1);
    assert_eq!(h.store.alerts_for("tx_race").len(), 1);
    assert_eq!(h.notifier.sent.lock().len(), 1);
}

#[tokio::test]
async fn alert_resolution_through_store() {
    let h = harness(FixedBackend(raw(10.0, 1.0)));
    let outcome = h
        .orchestrator
        .score(&request("tx_review", 100.0), &ScoreOptions::default())
        .await
        .unwrap();
    let alert_id = outcome.alert.unwrap().alert_id;

    let resolution = AlertResolution {
        resolved_by: "analyst".to_string(),
        notes: Some("card reported stolen".to_string()),
        false_positive: false,
    };
    let resolved = h.store.resolve_alert(&alert_id, resolution.clone()).await.unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);
    assert_eq!(resolved.resolved_by.as_deref(), Some("analyst"));

    assert!(matches!(
        h.store.resolve_alert(&alert_id, resolution).await,
        Err(StoreError::Conflict(_))
    ));
}

#[tokio::test]
async fn batch_reports_failures_and_statistics() {
    let h = harness(AmountBackend);
    let requests = vec![
        request("tx_1", 10.0),
        request("tx_2", 100.0),
        request("tx_3", -1.0),
    ];

    let report = h
        .orchestrator
        .score_batch(&requests, &ScoreOptions::default())
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.scored, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.fraudulent, 1);
    assert_eq!(report.high_risk, 1);
    // 31.28 and 100.0
    assert!((report.average_risk_score - 65.64).abs() < 1e-9);
    assert_eq!(report.fraud_rate_percent, 50.0);
    assert!(report.results[2].is_err());
    assert_eq!(
        report.results[1].as_ref().unwrap().assessment.transaction_id,
        "tx_2"
    );
}
