//! Outbound NATS publishing: fraud alerts and the live-feed relay

use crate::broadcast::Subscription;
use crate::types::alert::Alert;
use anyhow::Result;
use async_nats::Client;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Best-effort alert delivery. `false` means the alert did not go out; it
/// never affects the risk verdict.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> bool;
}

/// Publishes alerts as JSON to a NATS subject
#[derive(Clone)]
pub struct NatsAlertNotifier {
    client: Client,
    subject: String,
}

impl NatsAlertNotifier {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    pub async fn publish(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            severity = %alert.severity,
            "Published fraud alert"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

#[async_trait]
impl AlertNotifier for NatsAlertNotifier {
    async fn notify(&self, alert: &Alert) -> bool {
        match self.publish(alert).await {
            Ok(()) => true,
            Err(e) => {
                warn!(alert_id = %alert.alert_id, error = %e, "Failed to publish alert");
                false
            }
        }
    }
}

/// Forward every live-feed event to a NATS subject so consumers outside
/// this process can follow the stream. Returns once the broadcaster shuts
/// down, with the number of events relayed.
pub async fn relay_live_feed(mut subscription: Subscription, client: Client, subject: String) -> u64 {
    info!(subject = %subject, "Relaying live feed to NATS");
    let mut relayed = 0;

    while let Some(payload) = subscription.recv().await {
        match client
            .publish(subject.clone(), payload.as_bytes().to_vec().into())
            .await
        {
            Ok(()) => relayed += 1,
            Err(e) => warn!(error = %e, "Failed to relay live feed event"),
        }
    }

    info!(relayed = relayed, "Live feed relay stopped");
    relayed
}
