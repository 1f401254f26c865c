//! Verdict stage: classifier call, verdict records and fraud alerts

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::classifier::{to_verdict, Classifier};
use crate::producer::AlertSink;
use crate::types::alert::FraudAlert;
use crate::types::transaction::{ClassifiedRecord, FeatureRecord};

/// Attaches model verdicts to feature records
pub struct VerdictStage {
    classifier: Arc<dyn Classifier>,
    alerts: Arc<dyn AlertSink>,
    /// Probability cut for models that return scores instead of labels
    threshold: f64,
}

impl VerdictStage {
    pub fn new(classifier: Arc<dyn Classifier>, alerts: Arc<dyn AlertSink>, threshold: f64) -> Self {
        Self {
            classifier,
            alerts,
            threshold,
        }
    }

    /// Score a batch; one verdict per record or an `InferenceError`.
    ///
    /// Every fraud verdict is handed to the alert sink.
    pub async fn score(&self, features: &[FeatureRecord]) -> Result<Vec<ClassifiedRecord>> {
        let start = Instant::now();
        let outputs = self.classifier.predict(features).await?;

        if outputs.len() != features.len() {
            return Err(PipelineError::InferenceError(format!(
                "model {} returned {} predictions for {} rows",
                self.classifier.name(),
                outputs.len(),
                features.len()
            )));
        }

        let records = features
            .iter()
            .zip(outputs)
            .map(|(f, output)| {
                Ok(ClassifiedRecord {
                    features: f.clone(),
                    classification: to_verdict(output, self.threshold)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let flagged = records.iter().filter(|r| r.is_fraud_verdict()).count();
        for record in records.iter().filter(|r| r.is_fraud_verdict()) {
            self.alerts.notify(FraudAlert::from_record(record));
        }

        if flagged > 0 {
            info!(
                model = %self.classifier.name(),
                rows = records.len(),
                flagged = flagged,
                "Fraud detected"
            );
        } else {
            debug!(
                model = %self.classifier.name(),
                rows = records.len(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "Transaction classified as legitimate"
            );
        }

        Ok(records)
    }

    /// Get the classifier name
    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedClassifier(Vec<f64>);

    #[async_trait]
    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn predict(&self, _features: &[FeatureRecord]) -> Result<Vec<f64>> {
            Ok(self.0.clone())
        }
    }

    struct RejectingClassifier;

    #[async_trait]
    impl Classifier for RejectingClassifier {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn predict(&self, _features: &[FeatureRecord]) -> Result<Vec<f64>> {
            Err(PipelineError::InferenceError("bad input shape".into()))
        }
    }

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<FraudAlert>>);

    impl AlertSink for CollectingSink {
        fn notify(&self, alert: FraudAlert) {
            self.0.lock().unwrap().push(alert);
        }
    }

    fn features(trans_num: &str) -> FeatureRecord {
        FeatureRecord {
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
            trans_num: trans_num.into(),
            merch_lat: 42.340281,
            merch_long: -109.460051,
            unix_time: 1765352050.905,
            trans_date_trans_time: "2025-12-10 07:34:10".into(),
        }
    }

    #[tokio::test]
    async fn test_one_verdict_per_row_and_alerts() {
        let sink = Arc::new(CollectingSink::default());
        let stage = VerdictStage::new(Arc::new(FixedClassifier(vec![0.0, 1.0, 0.9])), sink.clone(), 0.5);

        let batch = vec![features("a"), features("b"), features("c")];
        let records = stage.score(&batch).await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].classification, 0.0);
        assert_eq!(records[1].classification, 1.0);
        assert_eq!(records[2].classification, 1.0);
        assert_eq!(records[1].features.trans_num, "b");

        let alerts = sink.0.lock().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].trans_num, "b");
        assert_eq!(alerts[1].trans_num, "c");
    }

    #[tokio::test]
    async fn test_length_mismatch_is_inference_error() {
        let sink = Arc::new(CollectingSink::default());
        let stage = VerdictStage::new(Arc::new(FixedClassifier(vec![1.0])), sink.clone(), 0.5);

        let err = stage.score(&[features("a"), features("b")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::InferenceError(_)));
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_classifier_rejection_propagates() {
        let stage = VerdictStage::new(Arc::new(RejectingClassifier), Arc::new(CollectingSink::default()), 0.5);
        let err = stage.score(&[features("a")]).await.unwrap_err();
        assert_eq!(err.kind(), "inference_error");
    }

    #[tokio::test]
    async fn test_out_of_domain_output_is_inference_error() {
        let stage = VerdictStage::new(Arc::new(FixedClassifier(vec![3.0])), Arc::new(CollectingSink::default()), 0.5);
        assert!(stage.score(&[features("a")]).await.is_err());
    }
}
