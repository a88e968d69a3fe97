//! NATS intake of scoring requests

use crate::types::transaction::ScoringRequest;
use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Subscribes to the transaction subject and decodes its messages
pub struct TransactionConsumer {
    client: Client,
    subject: String,
}

impl TransactionConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(subject = %self.subject, "Subscribed to transaction subject");
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Decode one message payload. Accepts either a full scoring request or a
/// bare transaction with no behavioral context.
pub fn decode_request(payload: &[u8]) -> Result<ScoringRequest, serde_json::Error> {
    serde_json::from_slice::<ScoringRequest>(payload).or_else(|request_err| {
        serde_json::from_slice(payload)
            .map(ScoringRequest::new)
            .map_err(|_| request_err)
    })
}
