//! Fraud Scoring Pipeline Library
//!
//! Periodically pulls a payment transaction from an HTTP source, derives
//! model features, classifies it with a registered model, archives every
//! intermediate artifact to blob storage and persists the verdict to
//! PostgreSQL.

pub mod archive;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod store;
pub mod types;

pub use archive::{Archiver, ObjectStoreBlobs};
pub use config::AppConfig;
pub use error::PipelineError;
pub use feature_extractor::FeatureExtractor;
pub use fetcher::TransactionFetcher;
pub use models::inference::VerdictStage;
pub use pipeline::{Pipeline, RunContext};
pub use producer::{AlertSink, NatsAlertSink, NoopAlertSink};
pub use store::{MemoryTransactionStore, PgTransactionStore, TransactionStore};
pub use types::{alert::FraudAlert, transaction::RawTransaction};
