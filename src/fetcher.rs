//! HTTP fetcher for the simulated real-time transaction source

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use crate::types::RawTransaction;

/// Pulls one transaction payload per call from the source endpoint
#[derive(Clone)]
pub struct TransactionFetcher {
    client: Client,
    url: String,
}

impl TransactionFetcher {
    /// Create a fetcher with its own client, bounded by the configured timeout
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.url))
    }

    /// Create a fetcher around an existing client
    pub fn with_client(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    /// Fetch one transaction.
    ///
    /// Transport failures, timeouts and non-success statuses are
    /// `SourceUnavailable`; an undecodable body is `MalformedPayload`.
    pub async fn fetch(&self) -> Result<RawTransaction> {
        debug!(url = %self.url, "Calling transaction source");

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceUnavailable(format!(
                "source returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::SourceUnavailable(e.to_string()))?;

        let raw = decode_payload(&body)?;
        info!(
            rows = raw.row_count(),
            columns = raw.columns.len(),
            "Transaction received"
        );
        Ok(raw)
    }

    /// Get the endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Decode a source body into a `RawTransaction`.
///
/// The source encodes its payload twice: the body is a JSON string whose
/// content is the JSON payload. Stage one decodes the body; when that yields
/// a string, stage two decodes the string. A body that is already an object
/// goes straight to stage two's output.
pub fn decode_payload(body: &str) -> Result<RawTransaction> {
    let outer: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::MalformedPayload(format!("body is not JSON: {}", e)))?;

    let inner = match outer {
        Value::String(encoded) => serde_json::from_str::<Value>(&encoded).map_err(|e| {
            PipelineError::MalformedPayload(format!("embedded payload is not JSON: {}", e))
        })?,
        value @ Value::Object(_) => value,
        other => {
            return Err(PipelineError::MalformedPayload(format!(
                "expected a JSON string or object, got {}",
                json_kind(&other)
            )))
        }
    };

    let raw: RawTransaction = serde_json::from_value(inner)
        .map_err(|e| PipelineError::MalformedPayload(e.to_string()))?;
    raw.check_shape().map_err(PipelineError::MalformedPayload)?;
    Ok(raw)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
