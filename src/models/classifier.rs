//! Classifier seam and the MLflow scoring-server implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::models::registry::ModelHandle;
use crate::types::transaction::{FeatureRecord, FEATURE_COLUMNS};

/// A trained model able to label a batch of feature records.
///
/// Returns one raw output per record: a class label (0/1) or a fraud
/// probability.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Model name used in logs
    fn name(&self) -> &str;

    async fn predict(&self, features: &[FeatureRecord]) -> Result<Vec<f64>>;
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScoringResponse {
    Wrapped { predictions: Vec<Value> },
    Bare(Vec<Value>),
}

impl ScoringResponse {
    fn into_predictions(self) -> Vec<Value> {
        match self {
            ScoringResponse::Wrapped { predictions } => predictions,
            ScoringResponse::Bare(predictions) => predictions,
        }
    }
}

/// Classifier served by `mlflow models serve` (`POST /invocations`)
pub struct MlflowClassifier {
    client: Client,
    invocations_url: String,
    model: ModelHandle,
    label: String,
}

impl MlflowClassifier {
    /// Create a classifier with its own client and request timeout
    pub fn new(serving_url: &str, model: ModelHandle, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, serving_url, model))
    }

    pub fn with_client(client: Client, serving_url: &str, model: ModelHandle) -> Self {
        let label = match &model.version {
            Some(version) => format!("{}/{}", model.name, version),
            None => model.name.clone(),
        };
        Self {
            client,
            invocations_url: format!("{}/invocations", serving_url.trim_end_matches('/')),
            model,
            label,
        }
    }

    /// Get the resolved model
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }
}

#[async_trait]
impl Classifier for MlflowClassifier {
    fn name(&self) -> &str {
        &self.label
    }

    async fn predict(&self, features: &[FeatureRecord]) -> Result<Vec<f64>> {
        let rows: Vec<Vec<Value>> = features.iter().map(FeatureRecord::to_json_row).collect();
        let body = json!({
            "dataframe_split": {
                "columns": FEATURE_COLUMNS,
                "data": rows,
            }
        });

        let response = self
            .client
            .post(&self.invocations_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::InferenceError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::InferenceError(format!(
                "scoring endpoint returned HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: ScoringResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::InferenceError(format!("undecodable predictions: {}", e)))?;

        let outputs = parsed
            .into_predictions()
            .iter()
            .map(prediction_as_f64)
            .collect::<Result<Vec<f64>>>()?;

        debug!(model = %self.label, rows = outputs.len(), "Scoring endpoint answered");
        Ok(outputs)
    }
}

fn prediction_as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| PipelineError::InferenceError(format!("unexpected prediction value {}", value)))
}

/// Map one raw model output onto the verdict domain {0.0, 1.0}.
///
/// Labels pass through; probabilities are cut at `threshold`.
pub fn to_verdict(output: f64, threshold: f64) -> Result<f64> {
    if output.is_nan() || !(0.0..=1.0).contains(&output) {
        return Err(PipelineError::InferenceError(format!(
            "model output {} is outside [0, 1]",
            output
        )));
    }
    if output == 0.0 || output == 1.0 {
        return Ok(output);
    }
    Ok(if output >= threshold { 1.0 } else { 0.0 })
}
