//! Type definitions for the fraud scoring pipeline

pub mod alert;
pub mod transaction;

pub use alert::FraudAlert;
pub use transaction::{ClassifiedRecord, FeatureRecord, PersistedRow, RawTransaction};
