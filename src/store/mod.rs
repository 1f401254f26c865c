//! Persistence stage: `public.transactions` rows and the stores that hold them

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::feature_extractor::value_as_f64;
use crate::types::transaction::{ClassifiedRecord, PersistedRow, RawTransaction, LABEL_COLUMN};

pub use memory::MemoryTransactionStore;
pub use postgres::PgTransactionStore;

/// Reporting totals for one calendar day
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct DailySummary {
    pub total_transactions: i64,
    pub total_amount: f64,
    /// Transactions the model classified as fraud
    pub fraud_transactions: i64,
    pub fraud_amount: f64,
}

/// Relational store for classified transactions
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Create `public.transactions` if it does not exist. Idempotent.
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert all rows or none of them
    async fn insert(&self, rows: &[PersistedRow]) -> Result<()>;

    /// Rows matching a merchant and transaction number
    async fn find_by_key(&self, merchant: &str, trans_num: &str) -> anyhow::Result<Vec<PersistedRow>>;

    /// Totals for transactions dated on `day`
    async fn daily_summary(&self, day: NaiveDate) -> anyhow::Result<DailySummary>;
}

/// Map verdicts to table rows.
///
/// The ground-truth label is read from the source payload's label column,
/// looked up by name, and broadcast to every row. It is never taken from the
/// verdict.
pub fn to_rows(raw: &RawTransaction, verdicts: &[ClassifiedRecord]) -> Result<Vec<PersistedRow>> {
    let idx = raw.column_index(LABEL_COLUMN).ok_or_else(|| {
        PipelineError::SchemaMismatch(format!("source payload has no {} column", LABEL_COLUMN))
    })?;
    let first = raw
        .data
        .first()
        .ok_or_else(|| PipelineError::SchemaMismatch("source payload has no rows".into()))?;
    let label = first
        .get(idx)
        .ok_or_else(|| PipelineError::SchemaMismatch(format!("row has no value for {}", LABEL_COLUMN)))?;
    let is_fraud = value_as_f64(label)
        .ok_or_else(|| PipelineError::SchemaMismatch(format!("{} is not numeric: {}", LABEL_COLUMN, label)))?;

    if raw.row_count() > 1 {
        warn!(
            rows = raw.row_count(),
            "Payload has several rows, broadcasting the first row's label"
        );
    }

    Ok(verdicts
        .iter()
        .map(|v| PersistedRow::from_classified(v, is_fraud))
        .collect())
}

/// Half-open `trans_date_trans_time` range covering `day`
pub(crate) fn day_bounds(day: NaiveDate) -> (String, String) {
    let next = day.succ_opt().unwrap_or(day);
    (
        format!("{} 00:00:00", day.format("%Y-%m-%d")),
        format!("{} 00:00:00", next.format("%Y-%m-%d")),
    )
}
