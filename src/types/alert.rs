//! Fraud alert data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::transaction::ClassifiedRecord;

/// Fraud alert emitted when the model flags a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Transaction number from the source
    pub trans_num: String,

    /// Merchant name
    pub merchant: String,

    /// Card number, as carried by the features
    pub cc_num: f64,

    /// Transaction amount
    pub amt: f64,

    /// Model verdict (always 1.0 for an alert)
    pub classification: f64,

    /// Transaction time from the features
    pub trans_date_trans_time: String,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl FraudAlert {
    /// Build an alert for a classified record
    pub fn from_record(record: &ClassifiedRecord) -> Self {
        let f = &record.features;
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            trans_num: f.trans_num.clone(),
            merchant: f.merchant.clone(),
            cc_num: f.cc_num,
            amt: f.amt,
            classification: record.classification,
            trans_date_trans_time: f.trans_date_trans_time.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::transaction::FeatureRecord;

    fn record() -> ClassifiedRecord {
        ClassifiedRecord {
            features: FeatureRecord {
                cc_num: 60416207185.0,
                merchant: "fraud_Schmeler-Howe".into(),
                category: "personal_care".into(),
                amt: 17.94,
                first: "Mary".into(),
                last: "Diaz".into(),
                gender: "F".into(),
                street: "9886 Anita Drive".into(),
                city: "Fort Washakie".into(),
                state: "WY".into(),
                zip: 82514.0,
                lat: 43.0048,
                long: -108.8964,
                city_pop: 1645.0,
                job: "Information systems manager".into(),
                dob: "1986-02-17".into(),
                trans_num: "ee94a194b2f6f00096223809b8310b1c".into(),
                merch_lat: 42.340281,
                merch_long: -109.460051,
                unix_time: 1765352050.905,
                trans_date_trans_time: "2025-12-10 07:34:10".into(),
            },
            classification: 1.0,
        }
    }

    #[test]
    fn test_fraud_alert_serialization() {
        let alert = FraudAlert::from_record(&record());

        let json = serde_json::to_string(&alert).unwrap();
        let deserialized: FraudAlert = serde_json::from_str(&json).unwrap();

        assert_eq!(alert.alert_id, deserialized.alert_id);
        assert_eq!(deserialized.trans_num, "ee94a194b2f6f00096223809b8310b1c");
        assert_eq!(deserialized.amt, 17.94);
        assert_eq!(deserialized.classification, 1.0);
    }

    #[test]
    fn test_alert_ids_are_unique() {
        let a = FraudAlert::from_record(&record());
        let b = FraudAlert::from_record(&record());
        assert_ne!(a.alert_id, b.alert_id);
    }
}
