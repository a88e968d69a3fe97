//! Test Scoring Request Producer
//!
//! Generates legitimate and suspicious scoring requests and publishes them
//! to NATS for exercising the pipeline end to end.

use fraud_risk_scoring::{FeatureField, FeatureInputs, ScoringRequest, Transaction};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};

/// Scoring request generator for testing
struct RequestGenerator {
    rng: rand::rngs::ThreadRng,
    transaction_counter: u64,
}

impl RequestGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            transaction_counter: 0,
        }
    }

    fn next_transaction(&mut self, amount: f64) -> Transaction {
        self.transaction_counter += 1;
        let mut transaction = Transaction::new(format!("txn_{:012}", self.transaction_counter), amount)
            .with_merchant(format!("merchant_{}", self.rng.gen_range(1..1000)));
        transaction.user_id = Some(format!("user_{}", self.rng.gen_range(1..5000)));
        transaction.device_id = Some(format!("device_{:08x}", self.rng.gen::<u32>()));
        transaction
    }

    /// Generate a random legitimate request
    fn generate_legitimate(&mut self) -> ScoringRequest {
        let amount = self.rng.gen_range(10.0..500.0);
        let mut transaction = self.next_transaction(amount);
        transaction.currency = self.random_choice(&["USD", "EUR", "GBP", "CAD"]).to_string();
        transaction.category = Some(
            self.random_choice(&["groceries", "restaurants", "gas", "utilities"])
                .to_string(),
        );
        if self.rng.gen_bool(0.7) {
            transaction = transaction.with_location(
                self.rng.gen_range(25.0..49.0),
                self.rng.gen_range(-124.0..-67.0),
            );
        }

        let avg_amount = self.rng.gen_range(50.0..200.0);
        let context = FeatureInputs::default()
            .with(FeatureField::UserTransactionCount, self.rng.gen_range(20..400_u32))
            .with(FeatureField::UserAvgAmount, avg_amount)
            .with(FeatureField::UserAmountStd, avg_amount * 0.4)
            .with(FeatureField::UserFrequencyDays, self.rng.gen_range(0.5..5.0))
            .with(FeatureField::IsNewUser, false)
            .with(FeatureField::TimeSinceFirstTransaction, self.rng.gen_range(30.0..1000.0))
            .with(FeatureField::MerchantRiskScore, self.rng.gen_range(0.0..0.2))
            .with(FeatureField::MerchantFraudCount, self.rng.gen_range(0..2_u32))
            .with(FeatureField::MerchantTotalTxn, self.rng.gen_range(100..10000_u32))
            .with(FeatureField::DeviceRiskScore, self.rng.gen_range(0.0..0.2))
            .with(FeatureField::DeviceIsSuspicious, false)
            .with(FeatureField::DeviceAccountCount, 1_u32)
            .with(FeatureField::GraphRiskRaw, self.rng.gen_range(0.0..0.2))
            .with(FeatureField::BehavioralDeviation, self.rng.gen_range(0.0..1.0));

        ScoringRequest::new(transaction).with_context(context)
    }

    /// Generate a suspicious request
    fn generate_suspicious(&mut self) -> ScoringRequest {
        let amount = self.rng.gen_range(1000.0..10000.0);
        let mut transaction = self.next_transaction(amount);
        transaction.currency = self.random_choice(&["USD", "EUR", "XBT"]).to_string();
        transaction.transaction_type = self.random_choice(&["transfer", "withdrawal"]).to_string();
        transaction.category = Some(self.random_choice(&["electronics", "travel"]).to_string());

        let context = FeatureInputs::default()
            .with(FeatureField::UserTransactionCount, self.rng.gen_range(0..3_u32))
            .with(FeatureField::UserAvgAmount, self.rng.gen_range(20.0..80.0))
            .with(FeatureField::UserAmountStd, self.rng.gen_range(5.0..20.0))
            .with(FeatureField::IsNewUser, true)
            .with(FeatureField::TimeSinceFirstTransaction, self.rng.gen_range(0.0..3.0))
            .with(FeatureField::MerchantRiskScore, self.rng.gen_range(0.5..1.0))
            .with(FeatureField::MerchantFraudCount, self.rng.gen_range(5..50_u32))
            .with(FeatureField::MerchantTotalTxn, self.rng.gen_range(10..200_u32))
            .with(FeatureField::DeviceRiskScore, self.rng.gen_range(0.6..1.0))
            .with(FeatureField::DeviceIsSuspicious, true)
            .with(FeatureField::DeviceAccountCount, self.rng.gen_range(3..12_u32))
            // night time
            .with(FeatureField::HourOfDay, self.rng.gen_range(0..6_u32))
            .with(FeatureField::GraphRiskRaw, self.rng.gen_range(0.6..1.0))
            .with(FeatureField::BehavioralDeviation, self.rng.gen_range(3.0..10.0));

        ScoringRequest::new(transaction).with_context(context)
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }

    fn generate(&mut self, fraud_rate: f64) -> (ScoringRequest, bool) {
        if self.rng.gen_bool(fraud_rate) {
            (self.generate_suspicious(), true)
        } else {
            (self.generate_legitimate(), false)
        }
    }
}

/// Positional arguments: `[nats_url] [subject] [count] [fraud_rate] [delay_ms]`
struct ProducerArgs {
    nats_url: String,
    subject: String,
    count: u64,
    fraud_rate: f64,
    delay: Duration,
}

impl ProducerArgs {
    fn from_env() -> Self {
        let mut args = std::env::args().skip(1);
        let nats_url = args.next().unwrap_or_else(|| "nats://localhost:4222".to_string());
        let subject = args.next().unwrap_or_else(|| "transactions".to_string());
        let count = args.next().and_then(|s| s.parse().ok()).unwrap_or(100);
        let fraud_rate = args
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(0.1)
            .clamp(0.0, 1.0);
        let delay_ms = args.next().and_then(|s| s.parse().ok()).unwrap_or(100);

        Self {
            nats_url,
            subject,
            count,
            fraud_rate,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[derive(Default)]
struct Tally {
    legitimate: u64,
    suspicious: u64,
}

impl Tally {
    fn total(&self) -> u64 {
        self.legitimate + self.suspicious
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    let args = ProducerArgs::from_env();
    info!(
        nats_url = %args.nats_url,
        subject = %args.subject,
        count = args.count,
        fraud_rate = args.fraud_rate,
        delay_ms = args.delay.as_millis() as u64,
        "Starting test scoring request producer"
    );

    // without a broker, requests are only logged
    let client = match async_nats::connect(args.nats_url.as_str()).await {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "NATS unreachable, running in dry-run mode");
            None
        }
    };

    let mut generator = RequestGenerator::new();
    let mut tally = Tally::default();

    while tally.total() < args.count {
        let (request, suspicious) = generator.generate(args.fraud_rate);
        if suspicious {
            tally.suspicious += 1;
        } else {
            tally.legitimate += 1;
        }
        let sent = tally.total();

        match &client {
            Some(client) => {
                let payload = serde_json::to_vec(&request)?;
                client.publish(args.subject.clone(), payload.into()).await?;
                if sent % 10 == 0 {
                    info!(
                        sent,
                        legitimate = tally.legitimate,
                        suspicious = tally.suspicious,
                        "Publishing progress"
                    );
                }
            }
            None if sent == 1 || sent % 10 == 0 => {
                info!("Sample request {}:\n{}", sent, serde_json::to_string_pretty(&request)?);
            }
            None => {}
        }

        tokio::time::sleep(args.delay).await;
    }

    if let Some(client) = &client {
        client.flush().await?;
    }
    info!(
        total = tally.total(),
        legitimate = tally.legitimate,
        suspicious = tally.suspicious,
        dry_run = client.is_none(),
        "Producer finished"
    );

    Ok(())
}
