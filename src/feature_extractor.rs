//! Feature extraction for fraud model inference.
//!
//! Turns a transaction and its precomputed behavioral context into the
//! fixed-order numeric vector every model was trained on. The schema is a
//! closed list of fields; anything missing or non-numeric becomes 0.0, so
//! building a vector never fails.

use crate::types::transaction::{ScoringRequest, Transaction};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

/// Bump when fields are added, removed or reordered.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Number of features in the vector.
pub const FEATURE_COUNT: usize = 25;

/// Fields of the feature vector, in model input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureField {
    Amount,
    AmountLog,
    CurrencyCode,
    TransactionTypeCode,
    CategoryCode,
    HasLocation,
    Latitude,
    Longitude,
    UserTransactionCount,
    UserAvgAmount,
    UserAmountStd,
    UserFrequencyDays,
    IsNewUser,
    TimeSinceFirstTransaction,
    MerchantRiskScore,
    MerchantFraudCount,
    MerchantTotalTxn,
    DeviceRiskScore,
    DeviceIsSuspicious,
    DeviceAccountCount,
    HourOfDay,
    DayOfWeek,
    IsWeekend,
    GraphRiskRaw,
    BehavioralDeviation,
}

impl FeatureField {
    pub const ALL: [FeatureField; FEATURE_COUNT] = [
        FeatureField::Amount,
        FeatureField::AmountLog,
        FeatureField::CurrencyCode,
        FeatureField::TransactionTypeCode,
        FeatureField::CategoryCode,
        FeatureField::HasLocation,
        FeatureField::Latitude,
        FeatureField::Longitude,
        FeatureField::UserTransactionCount,
        FeatureField::UserAvgAmount,
        FeatureField::UserAmountStd,
        FeatureField::UserFrequencyDays,
        FeatureField::IsNewUser,
        FeatureField::TimeSinceFirstTransaction,
        FeatureField::MerchantRiskScore,
        FeatureField::MerchantFraudCount,
        FeatureField::MerchantTotalTxn,
        FeatureField::DeviceRiskScore,
        FeatureField::DeviceIsSuspicious,
        FeatureField::DeviceAccountCount,
        FeatureField::HourOfDay,
        FeatureField::DayOfWeek,
        FeatureField::IsWeekend,
        FeatureField::GraphRiskRaw,
        FeatureField::BehavioralDeviation,
    ];

    /// Position in the vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name used in training data and model-service payloads
    pub fn name(self) -> &'static str {
        match self {
            FeatureField::Amount => "amount",
            FeatureField::AmountLog => "amount_log",
            FeatureField::CurrencyCode => "currency_code",
            FeatureField::TransactionTypeCode => "transaction_type_code",
            FeatureField::CategoryCode => "category_code",
            FeatureField::HasLocation => "has_location",
            FeatureField::Latitude => "latitude",
            FeatureField::Longitude => "longitude",
            FeatureField::UserTransactionCount => "user_transaction_count",
            FeatureField::UserAvgAmount => "user_avg_amount",
            FeatureField::UserAmountStd => "user_amount_std",
            FeatureField::UserFrequencyDays => "user_frequency_days",
            FeatureField::IsNewUser => "is_new_user",
            FeatureField::TimeSinceFirstTransaction => "time_since_first_transaction",
            FeatureField::MerchantRiskScore => "merchant_risk_score",
            FeatureField::MerchantFraudCount => "merchant_fraud_count",
            FeatureField::MerchantTotalTxn => "merchant_total_txn",
            FeatureField::DeviceRiskScore => "device_risk_score",
            FeatureField::DeviceIsSuspicious => "device_is_suspicious",
            FeatureField::DeviceAccountCount => "device_account_count",
            FeatureField::HourOfDay => "hour_of_day",
            FeatureField::DayOfWeek => "day_of_week",
            FeatureField::IsWeekend => "is_weekend",
            FeatureField::GraphRiskRaw => "graph_risk_raw",
            FeatureField::BehavioralDeviation => "behavioral_deviation",
        }
    }
}

/// A loosely typed source value. Upstream producers send whatever they
/// have; only numbers and booleans carry signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl FeatureValue {
    /// Encode for the model: booleans as 1.0/0.0, finite numbers as-is, everything else 0.0
    pub fn encode(&self) -> f32 {
        match self {
            FeatureValue::Flag(true) => 1.0,
            FeatureValue::Flag(false) => 0.0,
            FeatureValue::Number(v) => {
                let v = *v as f32;
                if v.is_finite() {
                    v
                } else {
                    0.0
                }
            }
            FeatureValue::Text(_) | FeatureValue::Other(_) => 0.0,
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<u32> for FeatureValue {
    fn from(v: u32) -> Self {
        FeatureValue::Number(v as f64)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Flag(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Text(v.to_string())
    }
}

/// Partial values for every schema field. Used both for the attributes
/// read off the transaction and for the derived behavioral context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureInputs {
    pub amount: Option<FeatureValue>,
    pub amount_log: Option<FeatureValue>,
    #[serde(alias = "currency")]
    pub currency_code: Option<FeatureValue>,
    #[serde(alias = "transaction_type")]
    pub transaction_type_code: Option<FeatureValue>,
    #[serde(alias = "category")]
    pub category_code: Option<FeatureValue>,
    pub has_location: Option<FeatureValue>,
    pub latitude: Option<FeatureValue>,
    pub longitude: Option<FeatureValue>,
    pub user_transaction_count: Option<FeatureValue>,
    pub user_avg_amount: Option<FeatureValue>,
    pub user_amount_std: Option<FeatureValue>,
    pub user_frequency_days: Option<FeatureValue>,
    pub is_new_user: Option<FeatureValue>,
    pub time_since_first_transaction: Option<FeatureValue>,
    pub merchant_risk_score: Option<FeatureValue>,
    pub merchant_fraud_count: Option<FeatureValue>,
    #[serde(alias = "merchant_transaction_count")]
    pub merchant_total_txn: Option<FeatureValue>,
    pub device_risk_score: Option<FeatureValue>,
    #[serde(alias = "device_suspicious")]
    pub device_is_suspicious: Option<FeatureValue>,
    #[serde(alias = "device_associated_accounts")]
    pub device_account_count: Option<FeatureValue>,
    pub hour_of_day: Option<FeatureValue>,
    pub day_of_week: Option<FeatureValue>,
    pub is_weekend: Option<FeatureValue>,
    pub graph_risk_raw: Option<FeatureValue>,
    pub behavioral_deviation: Option<FeatureValue>,
}

impl FeatureInputs {
    pub fn get(&self, field: FeatureField) -> Option<&FeatureValue> {
        match field {
            FeatureField::Amount => self.amount.as_ref(),
            FeatureField::AmountLog => self.amount_log.as_ref(),
            FeatureField::CurrencyCode => self.currency_code.as_ref(),
            FeatureField::TransactionTypeCode => self.transaction_type_code.as_ref(),
            FeatureField::CategoryCode => self.category_code.as_ref(),
            FeatureField::HasLocation => self.has_location.as_ref(),
            FeatureField::Latitude => self.latitude.as_ref(),
            FeatureField::Longitude => self.longitude.as_ref(),
            FeatureField::UserTransactionCount => self.user_transaction_count.as_ref(),
            FeatureField::UserAvgAmount => self.user_avg_amount.as_ref(),
            FeatureField::UserAmountStd => self.user_amount_std.as_ref(),
            FeatureField::UserFrequencyDays => self.user_frequency_days.as_ref(),
            FeatureField::IsNewUser => self.is_new_user.as_ref(),
            FeatureField::TimeSinceFirstTransaction => self.time_since_first_transaction.as_ref(),
            FeatureField::MerchantRiskScore => self.merchant_risk_score.as_ref(),
            FeatureField::MerchantFraudCount => self.merchant_fraud_count.as_ref(),
            FeatureField::MerchantTotalTxn => self.merchant_total_txn.as_ref(),
            FeatureField::DeviceRiskScore => self.device_risk_score.as_ref(),
            FeatureField::DeviceIsSuspicious => self.device_is_suspicious.as_ref(),
            FeatureField::DeviceAccountCount => self.device_account_count.as_ref(),
            FeatureField::HourOfDay => self.hour_of_day.as_ref(),
            FeatureField::DayOfWeek => self.day_of_week.as_ref(),
            FeatureField::IsWeekend => self.is_weekend.as_ref(),
            FeatureField::GraphRiskRaw => self.graph_risk_raw.as_ref(),
            FeatureField::BehavioralDeviation => self.behavioral_deviation.as_ref(),
        }
    }

    fn slot_mut(&mut self, field: FeatureField) -> &mut Option<FeatureValue> {
        match field {
            FeatureField::Amount => &mut self.amount,
            FeatureField::AmountLog => &mut self.amount_log,
            FeatureField::CurrencyCode => &mut self.currency_code,
            FeatureField::TransactionTypeCode => &mut self.transaction_type_code,
            FeatureField::CategoryCode => &mut self.category_code,
            FeatureField::HasLocation => &mut self.has_location,
            FeatureField::Latitude => &mut self.latitude,
            FeatureField::Longitude => &mut self.longitude,
            FeatureField::UserTransactionCount => &mut self.user_transaction_count,
            FeatureField::UserAvgAmount => &mut self.user_avg_amount,
            FeatureField::UserAmountStd => &mut self.user_amount_std,
            FeatureField::UserFrequencyDays => &mut self.user_frequency_days,
            FeatureField::IsNewUser => &mut self.is_new_user,
            FeatureField::TimeSinceFirstTransaction => &mut self.time_since_first_transaction,
            FeatureField::MerchantRiskScore => &mut self.merchant_risk_score,
            FeatureField::MerchantFraudCount => &mut self.merchant_fraud_count,
            FeatureField::MerchantTotalTxn => &mut self.merchant_total_txn,
            FeatureField::DeviceRiskScore => &mut self.device_risk_score,
            FeatureField::DeviceIsSuspicious => &mut self.device_is_suspicious,
            FeatureField::DeviceAccountCount => &mut self.device_account_count,
            FeatureField::HourOfDay => &mut self.hour_of_day,
            FeatureField::DayOfWeek => &mut self.day_of_week,
            FeatureField::IsWeekend => &mut self.is_weekend,
            FeatureField::GraphRiskRaw => &mut self.graph_risk_raw,
            FeatureField::BehavioralDeviation => &mut self.behavioral_deviation,
        }
    }

    pub fn set(&mut self, field: FeatureField, value: impl Into<FeatureValue>) {
        *self.slot_mut(field) = Some(value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, field: FeatureField, value: impl Into<FeatureValue>) -> Self {
        self.set(field, value);
        self
    }
}

/// Immutable model input, built fresh for each transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f32; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f32; FEATURE_COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, field: FeatureField) -> f32 {
        self.values[field.index()]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        FEATURE_COUNT
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// `(name, value)` pairs in schema order
    pub fn named(&self) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        FeatureField::ALL
            .iter()
            .map(move |field| (field.name(), self.values[field.index()]))
    }
}

/// Builds model input vectors.
///
/// Features are emitted in the exact order expected by the models
/// (see [`FeatureField::ALL`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorBuilder;

impl FeatureVectorBuilder {
    /// Create a new feature vector builder.
    pub fn new() -> Self {
        Self
    }

    /// Merge transaction-side values with derived values and encode them.
    ///
    /// Derived values take precedence when both sides provide a field.
    pub fn build(&self, transaction: &FeatureInputs, derived: &FeatureInputs) -> FeatureVector {
        let mut values = [0.0_f32; FEATURE_COUNT];
        for field in FeatureField::ALL {
            values[field.index()] = derived
                .get(field)
                .or_else(|| transaction.get(field))
                .map(FeatureValue::encode)
                .unwrap_or(0.0);
        }
        FeatureVector { values }
    }

    /// Build the vector for a scoring request.
    pub fn build_for(&self, request: &ScoringRequest) -> FeatureVector {
        let transaction = self.transaction_inputs(&request.transaction);
        self.build(&transaction, &request.context)
    }

    /// Attributes read directly off the transaction: amount, encoded
    /// categoricals, location and timestamp-derived temporal fields.
    pub fn transaction_inputs(&self, tx: &Transaction) -> FeatureInputs {
        let mut inputs = FeatureInputs::default();

        inputs.set(FeatureField::Amount, tx.amount);
        inputs.set(FeatureField::AmountLog, tx.amount.max(0.0).ln_1p());
        inputs.set(FeatureField::CurrencyCode, encode_currency(&tx.currency));
        inputs.set(
            FeatureField::TransactionTypeCode,
            encode_transaction_type(&tx.transaction_type),
        );
        inputs.set(
            FeatureField::CategoryCode,
            tx.category.as_deref().map(encode_category).unwrap_or(0),
        );

        match (tx.location_lat, tx.location_lng) {
            (Some(lat), Some(lng)) => {
                inputs.set(FeatureField::HasLocation, true);
                inputs.set(FeatureField::Latitude, lat);
                inputs.set(FeatureField::Longitude, lng);
            }
            _ => inputs.set(FeatureField::HasLocation, false),
        }

        let weekday = tx.timestamp.weekday().num_days_from_monday();
        inputs.set(FeatureField::HourOfDay, tx.timestamp.hour());
        inputs.set(FeatureField::DayOfWeek, weekday);
        inputs.set(FeatureField::IsWeekend, weekday >= 5);

        inputs
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in model input order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        FeatureField::ALL.iter().map(|f| f.name()).collect()
    }
}

pub fn encode_currency(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "USD" => 1,
        "EUR" => 2,
        "GBP" => 3,
        "JPY" => 4,
        "CAD" => 5,
        "AUD" => 6,
        _ => 0,
    }
}

pub fn encode_transaction_type(tx_type: &str) -> u32 {
    match tx_type.to_ascii_lowercase().as_str() {
        "purchase" => 1,
        "withdrawal" => 2,
        "transfer" => 3,
        "deposit" => 4,
        "refund" => 5,
        "payment" => 6,
        _ => 0,
    }
}

pub fn encode_category(category: &str) -> u32 {
    match category.to_ascii_lowercase().as_str() {
        "groceries" => 1,
        "electronics" => 2,
        "clothing" => 3,
        "travel" => 4,
        "dining" => 5,
        "entertainment" => 6,
        "utilities" => 7,
        "health" => 8,
        "education" => 9,
        _ => 0,
    }
}
