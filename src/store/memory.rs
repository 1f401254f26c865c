//! In-process transaction store for dry runs and tests.
//!
//! Behaves like the PostgreSQL table where it matters to the pipeline:
//! inserting before `ensure_schema` fails, and an insert lands completely
//! or not at all.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{day_bounds, DailySummary, TransactionStore};
use crate::error::{PipelineError, Result};
use crate::types::transaction::PersistedRow;

#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    /// `None` until the table is created
    table: Mutex<Option<Vec<PersistedRow>>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored row
    pub fn rows(&self) -> Vec<PersistedRow> {
        self.table
            .lock()
            .map(|t| t.clone().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn has_table(&self) -> bool {
        self.table.lock().map(|t| t.is_some()).unwrap_or(false)
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn ensure_schema(&self) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|e| PipelineError::StoreWriteError(e.to_string()))?;
        table.get_or_insert_with(Vec::new);
        Ok(())
    }

    async fn insert(&self, rows: &[PersistedRow]) -> Result<()> {
        let mut table = self
            .table
            .lock()
            .map_err(|e| PipelineError::StoreWriteError(e.to_string()))?;
        let stored = table.as_mut().ok_or_else(|| {
            PipelineError::StoreWriteError("relation \"public.transactions\" does not exist".into())
        })?;
        stored.extend_from_slice(rows);
        Ok(())
    }

    async fn find_by_key(&self, merchant: &str, trans_num: &str) -> anyhow::Result<Vec<PersistedRow>> {
        Ok(self
            .rows()
            .into_iter()
            .filter(|r| r.merchant == merchant && r.trans_num == trans_num)
            .collect())
    }

    async fn daily_summary(&self, day: NaiveDate) -> anyhow::Result<DailySummary> {
        let (start, end) = day_bounds(day);
        let mut summary = DailySummary::default();

        for row in self.rows().iter().filter(|r| {
            r.trans_date_trans_time.as_str() >= start.as_str() && r.trans_date_trans_time.as_str() < end.as_str()
        }) {
            summary.total_transactions += 1;
            summary.total_amount += row.amt;
            if row.classification == 1.0 {
                summary.fraud_transactions += 1;
                summary.fraud_amount += row.amt;
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(merchant: &str, trans_num: &str, when: &str, amt: f64, classification: f64) -> PersistedRow {
        PersistedRow {
            cc_num: 213156747557083.0,
            merchant: merchant.into(),
            category: "kids_pets".into(),
            amt,
            first: "Adam".into(),
            last: "Santos".into(),
            gender: "M".into(),
            street: "725 Jo Trace Apt. 102".into(),
            city: "Glendale".into(),
            state: "CA".into(),
            zip: 91206.0,
            lat: 34.1556,
            long: -118.2322,
            city_pop: 172817.0,
            job: "Advertising account planner".into(),
            dob: "1982-07-30".into(),
            trans_num: trans_num.into(),
            merch_lat: 34.60145,
            merch_long: -118.493708,
            is_fraud: 0.0,
            unix_time: 1765483557.381,
            trans_date_trans_time: when.into(),
            classification,
        }
    }

    #[tokio::test]
    async fn test_insert_requires_schema() {
        let store = MemoryTransactionStore::new();
        let err = store
            .insert(&[row("TEST_FRAUD", "t1", "2025-12-11 20:05:57", 72.77, 0.0)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store_write_error");
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let store = MemoryTransactionStore::new();
        store.ensure_schema().await.unwrap();
        store
            .insert(&[row("TEST_FRAUD", "t1", "2025-12-11 20:05:57", 72.77, 0.0)])
            .await
            .unwrap();
        store.ensure_schema().await.unwrap();

        assert!(store.has_table());
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_round_trip_by_key() {
        let store = MemoryTransactionStore::new();
        store.ensure_schema().await.unwrap();
        let written = row("TEST_FRAUD_PYTEST", "8a8bc54161fc0db49940c30f8fed1eea", "2025-12-11 20:05:57", 72.77, 0.0);
        store.insert(std::slice::from_ref(&written)).await.unwrap();

        let found = store
            .find_by_key("TEST_FRAUD_PYTEST", "8a8bc54161fc0db49940c30f8fed1eea")
            .await
            .unwrap();
        assert_eq!(found, vec![written]);
        assert!(store.find_by_key("TEST_FRAUD_PYTEST", "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_daily_summary() {
        let store = MemoryTransactionStore::new();
        store.ensure_schema().await.unwrap();
        store
            .insert(&[
                row("m1", "t1", "2025-12-11 00:00:00", 10.0, 0.0),
                row("m2", "t2", "2025-12-11 23:59:59", 20.0, 1.0),
                row("m3", "t3", "2025-12-12 00:00:00", 40.0, 1.0),
                row("m4", "t4", "2025-12-10 23:59:59", 80.0, 0.0),
            ])
            .await
            .unwrap();

        let summary = store
            .daily_summary(NaiveDate::from_ymd_opt(2025, 12, 11).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.total_transactions, 2);
        assert_eq!(summary.total_amount, 30.0);
        assert_eq!(summary.fraud_transactions, 1);
        assert_eq!(summary.fraud_amount, 20.0);
    }
}
