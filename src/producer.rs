//! Fraud alert side channel
//!
//! Alerts are fire-and-forget: a sink never reports failure back to the
//! scoring stage.

use async_nats::Client;
use tracing::{debug, error, warn};

use crate::types::alert::FraudAlert;

/// Receives an alert for every transaction the model flags
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: FraudAlert);
}

/// Default sink: logs the alert and delivers nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn notify(&self, alert: FraudAlert) {
        warn!(
            alert_id = %alert.alert_id,
            trans_num = %alert.trans_num,
            merchant = %alert.merchant,
            amt = alert.amt,
            "Fraud detected, no alert delivery configured"
        );
    }
}

/// Publishes alerts as JSON on a NATS subject
#[derive(Clone)]
pub struct NatsAlertSink {
    client: Client,
    subject: String,
}

impl NatsAlertSink {
    /// Create a new alert producer
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Connect to a NATS server and build the sink
    pub async fn connect(url: &str, subject: &str) -> anyhow::Result<Self> {
        let client = async_nats::connect(url).await?;
        Ok(Self::new(client, subject))
    }

    /// Publish a fraud alert
    pub async fn publish(&self, alert: &FraudAlert) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            trans_num = %alert.trans_num,
            subject = %self.subject,
            "Published fraud alert"
        );

        Ok(())
    }

    /// Get the subject name
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl AlertSink for NatsAlertSink {
    fn notify(&self, alert: FraudAlert) {
        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.publish(&alert).await {
                error!(
                    alert_id = %alert.alert_id,
                    error = %e,
                    "Failed to publish fraud alert"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::{ClassifiedRecord, FeatureRecord};

    fn alert() -> FraudAlert {
        FraudAlert::from_record(&ClassifiedRecord {
            features: FeatureRecord {
                cc_num: 999999.0,
                merchant: "TEST_bidon".into(),
                category: "kids_pets".into(),
                amt: 100.01,
                first: "Jenna".into(),
                last: "Brooks".into(),
                gender: "F".into(),
                street: "South Park".into(),
                city: "Baton Rouge".into(),
                state: "LA".into(),
                zip: 99999.0,
                lat: 30.4066,
                long: -91.494831,
                city_pop: 795.0,
                job: "Designer".into(),
                dob: "1977-02-22".into(),
                trans_num: "f00d".into(),
                merch_lat: 30.731498,
                merch_long: -91.494831,
                unix_time: 1765483867.831,
                trans_date_trans_time: "2025-12-11 20:11:07".into(),
            },
            classification: 1.0,
        })
    }

    #[test]
    fn test_noop_sink_accepts_alerts() {
        let sink: Box<dyn AlertSink> = Box::new(NoopAlertSink);
        sink.notify(alert());
    }

    #[tokio::test]
    async fn test_connect_to_missing_server_fails() {
        // Nothing listens on the discard port
        assert!(NatsAlertSink::connect("nats://127.0.0.1:9", "fraud.alerts")
            .await
            .is_err());
    }
}
