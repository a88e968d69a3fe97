//! Persistence collaborator for assessments, explanations and alerts

use crate::types::alert::{Alert, AlertError, AlertResolution};
use crate::types::assessment::RiskAssessment;
use crate::types::explanation::Explanation;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<AlertError> for StoreError {
    fn from(err: AlertError) -> Self {
        StoreError::Conflict(err.to_string())
    }
}

/// Durable home of scoring results. Writes happen after the verdict is
/// computed and never feed back into it.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn save_assessment(&self, assessment: &RiskAssessment) -> Result<(), StoreError>;

    async fn find_assessment(&self, transaction_id: &str) -> Result<Option<RiskAssessment>, StoreError>;

    /// Store the latest explanation for a transaction, replacing any earlier one
    async fn save_explanation(
        &self,
        transaction_id: &str,
        explanation: &Explanation,
    ) -> Result<(), StoreError>;

    async fn find_explanation(&self, transaction_id: &str) -> Result<Option<Explanation>, StoreError>;

    /// Store a new alert. A transaction holds at most one alert; a second
    /// one for the same transaction is a `Conflict`.
    async fn save_alert(&self, alert: &Alert) -> Result<(), StoreError>;

    async fn find_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError>;

    async fn find_alert_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Alert>, StoreError>;

    /// Apply a human review to a pending alert
    async fn resolve_alert(
        &self,
        alert_id: &str,
        resolution: AlertResolution,
    ) -> Result<Alert, StoreError>;
}

#[derive(Default)]
struct Tables {
    assessments: HashMap<String, RiskAssessment>,
    explanations: HashMap<String, Explanation>,
    alerts: HashMap<String, Alert>,
    /// transaction id -> alert id
    alert_index: HashMap<String, String>,
    /// Transactions in first-write order, oldest first
    order: VecDeque<String>,
}

impl Tables {
    fn is_tracked(&self, transaction_id: &str) -> bool {
        self.assessments.contains_key(transaction_id)
            || self.explanations.contains_key(transaction_id)
            || self.alert_index.contains_key(transaction_id)
    }

    /// Register a first write for `transaction_id`, evicting the oldest
    /// transactions beyond `capacity`.
    fn admit(&mut self, transaction_id: &str, capacity: Option<usize>) {
        if self.is_tracked(transaction_id) {
            return;
        }
        self.order.push_back(transaction_id.to_string());

        let Some(capacity) = capacity else {
            return;
        };
        while self.order.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.evict(&oldest);
        }
    }

    fn evict(&mut self, transaction_id: &str) {
        self.assessments.remove(transaction_id);
        self.explanations.remove(transaction_id);
        if let Some(alert_id) = self.alert_index.remove(transaction_id) {
            if let Some(alert) = self.alerts.remove(&alert_id) {
                if alert.is_pending() {
                    warn!(
                        alert_id = %alert_id,
                        transaction_id = %transaction_id,
                        "Evicting unresolved alert from in-memory store"
                    );
                }
            }
        }
        debug!(transaction_id = %transaction_id, "Evicted transaction from in-memory store");
    }
}

/// Process-local store. Bounded stores keep the most recent
/// `max_transactions` transactions and drop everything recorded for older
/// ones.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    max_transactions: Option<usize>,
}

impl InMemoryStore {
    /// Unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that retains at most `max_transactions` transactions
    pub fn with_capacity(max_transactions: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            max_transactions: Some(max_transactions.max(1)),
        }
    }

    pub fn max_transactions(&self) -> Option<usize> {
        self.max_transactions
    }

    pub fn assessment_count(&self) -> usize {
        self.tables.read().assessments.len()
    }

    pub fn alert_count(&self) -> usize {
        self.tables.read().alerts.len()
    }

    /// Number of transactions with at least one stored record
    pub fn transaction_count(&self) -> usize {
        self.tables.read().order.len()
    }

    /// Alerts raised for one transaction
    pub fn alerts_for(&self, transaction_id: &str) -> Vec<Alert> {
        self.tables
            .read()
            .alerts
            .values()
            .filter(|a| a.transaction_id == transaction_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AssessmentStore for InMemoryStore {
    async fn save_assessment(&self, assessment: &RiskAssessment) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables.admit(&assessment.transaction_id, self.max_transactions);
        tables
            .assessments
            .insert(assessment.transaction_id.clone(), assessment.clone());
        Ok(())
    }

    async fn find_assessment(&self, transaction_id: &str) -> Result<Option<RiskAssessment>, StoreError> {
        Ok(self.tables.read().assessments.get(transaction_id).cloned())
    }

    async fn save_explanation(
        &self,
        transaction_id: &str,
        explanation: &Explanation,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        tables.admit(transaction_id, self.max_transactions);
        tables
            .explanations
            .insert(transaction_id.to_string(), explanation.clone());
        Ok(())
    }

    async fn find_explanation(&self, transaction_id: &str) -> Result<Option<Explanation>, StoreError> {
        Ok(self.tables.read().explanations.get(transaction_id).cloned())
    }

    async fn save_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.alerts.contains_key(&alert.alert_id) {
            return Err(StoreError::Conflict(format!("alert {} already exists", alert.alert_id)));
        }
        if let Some(existing) = tables.alert_index.get(&alert.transaction_id) {
            return Err(StoreError::Conflict(format!(
                "transaction {} already has alert {}",
                alert.transaction_id, existing
            )));
        }
        tables.admit(&alert.transaction_id, self.max_transactions);
        tables
            .alert_index
            .insert(alert.transaction_id.clone(), alert.alert_id.clone());
        tables.alerts.insert(alert.alert_id.clone(), alert.clone());
        Ok(())
    }

    async fn find_alert(&self, alert_id: &str) -> Result<Option<Alert>, StoreError> {
        Ok(self.tables.read().alerts.get(alert_id).cloned())
    }

    async fn find_alert_for_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Alert>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .alert_index
            .get(transaction_id)
            .and_then(|alert_id| tables.alerts.get(alert_id))
            .cloned())
    }

    async fn resolve_alert(
        &self,
        alert_id: &str,
        resolution: AlertResolution,
    ) -> Result<Alert, StoreError> {
        let mut tables = self.tables.write();
        let alert = tables
            .alerts
            .get_mut(alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?;
        alert.resolve(resolution)?;
        Ok(alert.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::alert::AlertStatus;
    use crate::types::assessment::{ComponentScores, RiskLevel};
    use chrono::Utc;

    fn assessment(id: &str) -> RiskAssessment {
        RiskAssessment {
            transaction_id: id.to_string(),
            risk_score: 82.0,
            risk_level: RiskLevel::High,
            is_fraudulent: true,
            components: ComponentScores {
                anomaly: 0.8,
                isolation: 0.8,
                graph: 0.83,
            },
            confidence: 0.5,
            models_available: vec!["gnn".to_string()],
            assessed_at: Utc::now(),
        }
    }

    fn resolution() -> AlertResolution {
        AlertResolution {
            resolved_by: "reviewer".to_string(),
            notes: Some("customer confirmed".to_string()),
            false_positive: true,
        }
    }

    #[tokio::test]
    async fn test_assessment_roundtrip() {
        let store = InMemoryStore::new();
        store.save_assessment(&assessment("tx_1")).await.unwrap();

        let found = store.find_assessment("tx_1").await.unwrap().unwrap();
        assert_eq!(found.risk_score, 82.0);
        assert!(store.find_assessment("tx_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_alert_once() {
        let store = InMemoryStore::new();
        let alert = Alert::for_assessment(&assessment("tx_1"));
        store.save_alert(&alert).await.unwrap();

        let resolved = store.resolve_alert(&alert.alert_id, resolution()).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::FalsePositive);

        let again = store.resolve_alert(&alert.alert_id, resolution()).await;
        assert!(matches!(again, Err(StoreError::Conflict(_))));

        let missing = store.resolve_alert("nope", resolution()).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_duplicate_alert_is_conflict() {
        let store = InMemoryStore::new();
        let alert = Alert::for_assessment(&assessment("tx_1"));
        store.save_alert(&alert).await.unwrap();

        assert!(matches!(store.save_alert(&alert).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.alerts_for("tx_1").len(), 1);
    }

    #[tokio::test]
    async fn test_one_alert_per_transaction() {
        let store = InMemoryStore::new();
        let first = Alert::for_assessment(&assessment("tx_1"));
        let second = Alert::for_assessment(&assessment("tx_1"));
        assert_ne!(first.alert_id, second.alert_id);

        store.save_alert(&first).await.unwrap();
        assert!(matches!(store.save_alert(&second).await, Err(StoreError::Conflict(_))));

        let found = store.find_alert_for_transaction("tx_1").await.unwrap().unwrap();
        assert_eq!(found.alert_id, first.alert_id);
        assert!(store.find_alert_for_transaction("tx_2").await.unwrap().is_none());
        assert_eq!(store.alert_count(), 1);
    }

    #[tokio::test]
    async fn test_bounded_store_evicts_oldest_transactions() {
        let store = InMemoryStore::with_capacity(2);
        for id in ["tx_1", "tx_2", "tx_3"] {
            store.save_assessment(&assessment(id)).await.unwrap();
            store.save_alert(&Alert::for_assessment(&assessment(id))).await.unwrap();
        }

        assert_eq!(store.transaction_count(), 2);
        assert_eq!(store.assessment_count(), 2);
        assert_eq!(store.alert_count(), 2);
        assert!(store.find_assessment("tx_1").await.unwrap().is_none());
        assert!(store.find_alert_for_transaction("tx_1").await.unwrap().is_none());
        assert!(store.find_assessment("tx_3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rewrites_do_not_consume_capacity() {
        let store = InMemoryStore::with_capacity(2);
        store.save_assessment(&assessment("tx_1")).await.unwrap();
        store.save_assessment(&assessment("tx_2")).await.unwrap();
        for _ in 0..5 {
            store.save_assessment(&assessment("tx_2")).await.unwrap();
        }

        assert_eq!(store.transaction_count(), 2);
        assert!(store.find_assessment("tx_1").await.unwrap().is_some());
    }
}
