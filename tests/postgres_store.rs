//! `public.transactions` against a live PostgreSQL.
//!
//! Ignored by default. Run with
//! `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use chrono::NaiveDate;
use uuid::Uuid;

use fraud_scoring_pipeline::config::DatabaseConfig;
use fraud_scoring_pipeline::store::{PgTransactionStore, TransactionStore};
use fraud_scoring_pipeline::types::PersistedRow;

async fn connect() -> PgTransactionStore {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let store = PgTransactionStore::connect(&DatabaseConfig {
        url,
        ..DatabaseConfig::default()
    })
    .await
    .unwrap();
    store.ensure_schema().await.unwrap();
    store
}

fn row(merchant: &str, trans_num: &str, classification: f64) -> PersistedRow {
    PersistedRow {
        cc_num: 213156747557083.0,
        merchant: merchant.into(),
        category: "kids_pets".into(),
        amt: 72.77,
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
        trans_date_trans_time: "1999-01-02 20:05:57".into(),
        classification,
    }
}

async fn cleanup(store: &PgTransactionStore, merchant: &str) {
    sqlx::query("DELETE FROM public.transactions WHERE merchant = $1")
        .bind(merchant)
        .execute(store.pool())
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn insert_and_read_back() {
    let store = connect().await;
    let merchant = format!("TEST_FRAUD_{}", Uuid::new_v4().simple());
    let trans_num = Uuid::new_v4().simple().to_string();

    let written = row(&merchant, &trans_num, 0.0);
    store.insert(std::slice::from_ref(&written)).await.unwrap();

    let found = store.find_by_key(&merchant, &trans_num).await.unwrap();
    assert_eq!(found, vec![written]);

    cleanup(&store, &merchant).await;
}

#[tokio::test]
#[ignore]
async fn ensure_schema_twice_keeps_rows() {
    let store = connect().await;
    let merchant = format!("TEST_SCHEMA_{}", Uuid::new_v4().simple());

    store.insert(&[row(&merchant, "t1", 1.0)]).await.unwrap();
    store.ensure_schema().await.unwrap();

    assert_eq!(store.find_by_key(&merchant, "t1").await.unwrap().len(), 1);
    cleanup(&store, &merchant).await;
}

#[tokio::test]
#[ignore]
async fn daily_summary_counts_fraud_verdicts() {
    let store = connect().await;
    let merchant = format!("TEST_SUMMARY_{}", Uuid::new_v4().simple());

    store
        .insert(&[row(&merchant, "a", 0.0), row(&merchant, "b", 1.0)])
        .await
        .unwrap();

    // 1999-01-02 is reserved for this test's rows
    let summary = store
        .daily_summary(NaiveDate::from_ymd_opt(1999, 1, 2).unwrap())
        .await
        .unwrap();
    assert!(summary.total_transactions >= 2);
    assert!(summary.fraud_transactions >= 1);

    cleanup(&store, &merchant).await;
}
