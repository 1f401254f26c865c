//! PostgreSQL-backed transaction store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{day_bounds, DailySummary, TransactionStore};
use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use crate::types::transaction::{PersistedRow, TABLE_COLUMNS};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS public.transactions (
    cc_num DOUBLE PRECISION,
    merchant VARCHAR,
    category VARCHAR,
    amt DOUBLE PRECISION,
    first VARCHAR,
    last VARCHAR,
    gender VARCHAR,
    street VARCHAR,
    city VARCHAR,
    state VARCHAR,
    zip DOUBLE PRECISION,
    lat DOUBLE PRECISION,
    long DOUBLE PRECISION,
    city_pop DOUBLE PRECISION,
    job VARCHAR,
    dob VARCHAR,
    trans_num VARCHAR,
    merch_lat DOUBLE PRECISION,
    merch_long DOUBLE PRECISION,
    is_fraud DOUBLE PRECISION,
    unix_time DOUBLE PRECISION,
    trans_date_trans_time VARCHAR,
    classification DOUBLE PRECISION
)";

/// Postgres caps bind parameters at 65535 per statement.
const ROWS_PER_STATEMENT: usize = 1000;

/// `public.transactions` in PostgreSQL
#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool for the configured database.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;
        info!("database pool created");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_err(e: sqlx::Error) -> PipelineError {
    PipelineError::StoreWriteError(e.to_string())
}

fn select_columns() -> String {
    TABLE_COLUMNS.join(", ")
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        debug!("table public.transactions ready");
        Ok(())
    }

    async fn insert(&self, rows: &[PersistedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        for chunk in rows.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO public.transactions ({}) ",
                select_columns()
            ));
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.cc_num)
                    .push_bind(&row.merchant)
                    .push_bind(&row.category)
                    .push_bind(row.amt)
                    .push_bind(&row.first)
                    .push_bind(&row.last)
                    .push_bind(&row.gender)
                    .push_bind(&row.street)
                    .push_bind(&row.city)
                    .push_bind(&row.state)
                    .push_bind(row.zip)
                    .push_bind(row.lat)
                    .push_bind(row.long)
                    .push_bind(row.city_pop)
                    .push_bind(&row.job)
                    .push_bind(&row.dob)
                    .push_bind(&row.trans_num)
                    .push_bind(row.merch_lat)
                    .push_bind(row.merch_long)
                    .push_bind(row.is_fraud)
                    .push_bind(row.unix_time)
                    .push_bind(&row.trans_date_trans_time)
                    .push_bind(row.classification);
            });
            builder.build().execute(&mut *tx).await.map_err(store_err)?;
        }

        // Dropping an uncommitted transaction rolls it back.
        tx.commit().await.map_err(store_err)?;
        info!(rows = rows.len(), "Transactions written to database");
        Ok(())
    }

    async fn find_by_key(&self, merchant: &str, trans_num: &str) -> anyhow::Result<Vec<PersistedRow>> {
        let rows = sqlx::query_as::<_, PersistedRow>(&format!(
            "SELECT {} FROM public.transactions WHERE merchant = $1 AND trans_num = $2",
            select_columns()
        ))
        .bind(merchant)
        .bind(trans_num)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn daily_summary(&self, day: NaiveDate) -> anyhow::Result<DailySummary> {
        let (start, end) = day_bounds(day);
        let summary = sqlx::query_as::<_, DailySummary>(
            "SELECT COUNT(*) AS total_transactions,
                    COALESCE(SUM(amt), 0.0::double precision) AS total_amount,
                    COUNT(*) FILTER (WHERE classification = 1) AS fraud_transactions,
                    COALESCE(SUM(amt) FILTER (WHERE classification = 1), 0.0::double precision) AS fraud_amount
             FROM public.transactions
             WHERE trans_date_trans_time >= $1 AND trans_date_trans_time < $2",
        )
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(summary)
    }
}
