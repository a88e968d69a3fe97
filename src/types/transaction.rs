//! Transaction data structures for fraud-risk scoring

use crate::feature_extractor::FeatureInputs;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A payment transaction submitted for risk scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier (generated when the producer omits it)
    #[serde(default = "generate_transaction_id")]
    pub transaction_id: String,

    /// Account that initiated the transaction
    #[serde(default)]
    pub user_id: Option<String>,

    /// Transaction amount in `currency`
    pub amount: f64,

    /// ISO currency code
    #[serde(default = "default_currency")]
    pub currency: String,

    /// purchase, withdrawal, transfer, deposit, refund, payment
    #[serde(default = "default_transaction_type")]
    pub transaction_type: String,

    /// Merchant category (groceries, electronics, ...)
    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub merchant_id: Option<String>,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default, alias = "latitude")]
    pub location_lat: Option<f64>,

    #[serde(default, alias = "longitude")]
    pub location_lng: Option<f64>,

    /// Transaction time; temporal features are derived from it
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Generate a transaction id of the form `txn_<16 hex chars>`
pub fn generate_transaction_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("txn_{}", &id[..16])
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_transaction_type() -> String {
    "purchase".to_string()
}

impl Transaction {
    /// Create a new purchase transaction with required fields
    pub fn new(transaction_id: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: None,
            amount,
            currency: default_currency(),
            transaction_type: default_transaction_type(),
            category: None,
            merchant_id: None,
            device_id: None,
            location_lat: None,
            location_lng: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_merchant(mut self, merchant_id: impl Into<String>) -> Self {
        self.merchant_id = Some(merchant_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_location(mut self, lat: f64, lng: f64) -> Self {
        self.location_lat = Some(lat);
        self.location_lng = Some(lng);
        self
    }
}

/// One unit of work for the scoring pipeline: the raw transaction plus the
/// precomputed behavioral / merchant / device / graph context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub transaction: Transaction,

    /// Derived attributes; these win over transaction-side values
    #[serde(default, alias = "features")]
    pub context: FeatureInputs,
}

impl ScoringRequest {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            context: FeatureInputs::default(),
        }
    }

    pub fn with_context(mut self, context: FeatureInputs) -> Self {
        self.context = context;
        self
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction.transaction_id
    }
}
