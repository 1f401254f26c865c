//! Artifact archive: raw, silver and gold layers in blob storage
//!
//! Keys look like `<prefix>/<layer>/<YYYYMMDD-HHMMSS>_transaction.<ext>`.
//! One stamp is taken per cycle and shared by all three layers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use object_store::aws::AmazonS3Builder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ClientOptions, ObjectStore, PutOptions, PutPayload};
use tracing::info;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PipelineError, Result};
use crate::types::transaction::{
    ClassifiedRecord, FeatureRecord, RawTransaction, FEATURE_COLUMNS, VERDICT_COLUMN,
};

/// Archive tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Source payload, unmodified
    Raw,
    /// Model-ready features
    Silver,
    /// Features plus verdict
    Gold,
}

impl Layer {
    pub fn dir(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Layer::Raw => "json",
            Layer::Silver | Layer::Gold => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Layer::Raw => "application/json",
            Layer::Silver | Layer::Gold => "text/csv",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir())
    }
}

/// Wall-clock stamp shared by every artifact of a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveStamp(String);

impl ArchiveStamp {
    pub const FORMAT: &'static str = "%Y%m%d-%H%M%S";

    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(at.format(Self::FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage key of an archived artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey(String);

impl ArchiveKey {
    pub fn new(prefix: &str, layer: Layer, stamp: &ArchiveStamp) -> Self {
        let prefix = prefix.trim_matches('/');
        let file = format!("{}_transaction.{}", stamp, layer.extension());
        if prefix.is_empty() {
            Self(format!("{}/{}", layer.dir(), file))
        } else {
            Self(format!("{}/{}/{}", prefix, layer.dir(), file))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `body` under `key`; any failure is an `ArchiveWriteError`
    async fn put(&self, key: &ArchiveKey, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// `BlobStore` over any `object_store` backend
#[derive(Clone)]
pub struct ObjectStoreBlobs {
    inner: Arc<dyn ObjectStore>,
    location: String,
}

impl ObjectStoreBlobs {
    pub fn new(inner: Arc<dyn ObjectStore>, location: &str) -> Self {
        Self {
            inner,
            location: location.to_string(),
        }
    }

    /// In-process store, for dry runs and tests
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory://")
    }

    /// Build the configured backend
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::S3 => {
                let mut builder = AmazonS3Builder::from_env()
                    .with_bucket_name(&config.bucket)
                    .with_region(&config.region)
                    .with_client_options(
                        ClientOptions::new().with_timeout(Duration::from_secs(config.timeout_secs)),
                    );
                if let Some(key) = &config.access_key_id {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = &config.secret_access_key {
                    builder = builder.with_secret_access_key(secret);
                }
                if let Some(endpoint) = &config.endpoint {
                    builder = builder
                        .with_endpoint(endpoint)
                        .with_allow_http(endpoint.starts_with("http://"));
                }
                let store = builder.build().context("Failed to build S3 client")?;
                Ok(Self::new(
                    Arc::new(store),
                    &format!("s3://{}", config.bucket),
                ))
            }
        }
    }

    /// Underlying store, for reading artifacts back
    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.inner.clone()
    }

    /// Human-readable location, e.g. `s3://bucket`
    pub fn location(&self) -> &str {
        &self.location
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobs {
    async fn put(&self, key: &ArchiveKey, body: Vec<u8>, content_type: &str) -> Result<()> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.inner
            .put_opts(&ObjectPath::from(key.as_str()), PutPayload::from(body), options)
            .await
            .map_err(|e| PipelineError::ArchiveWriteError(format!("{}/{}: {}", self.location, key, e)))?;
        Ok(())
    }
}

/// Payload of one archive write
#[derive(Debug, Clone, Copy)]
pub enum ArchivePayload<'a> {
    Raw(&'a RawTransaction),
    Features(&'a [FeatureRecord]),
    Verdicts(&'a [ClassifiedRecord]),
}

impl ArchivePayload<'_> {
    pub fn layer(&self) -> Layer {
        match self {
            ArchivePayload::Raw(_) => Layer::Raw,
            ArchivePayload::Features(_) => Layer::Silver,
            ArchivePayload::Verdicts(_) => Layer::Gold,
        }
    }

    /// Serialize in the layer's format
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            ArchivePayload::Raw(raw) => serde_json::to_vec_pretty(raw)
                .map_err(|e| PipelineError::ArchiveWriteError(e.to_string())),
            ArchivePayload::Features(records) => features_csv(records),
            ArchivePayload::Verdicts(records) => verdicts_csv(records),
        }
    }
}

/// Writes cycle artifacts under the layered naming scheme
pub struct Archiver {
    blobs: Arc<dyn BlobStore>,
    prefix: String,
}

impl Archiver {
    pub fn new(blobs: Arc<dyn BlobStore>, prefix: &str) -> Self {
        Self {
            blobs,
            prefix: prefix.to_string(),
        }
    }

    /// Encode and store one artifact, returning its key
    pub async fn archive(&self, payload: ArchivePayload<'_>, stamp: &ArchiveStamp) -> Result<ArchiveKey> {
        let layer = payload.layer();
        let key = ArchiveKey::new(&self.prefix, layer, stamp);
        let body = payload.encode()?;
        let bytes = body.len();

        self.blobs.put(&key, body, layer.content_type()).await?;

        info!(layer = %layer, key = %key, bytes = bytes, "Artifact archived");
        Ok(key)
    }

    pub async fn archive_raw(&self, raw: &RawTransaction, stamp: &ArchiveStamp) -> Result<ArchiveKey> {
        self.archive(ArchivePayload::Raw(raw), stamp).await
    }

    pub async fn archive_features(&self, records: &[FeatureRecord], stamp: &ArchiveStamp) -> Result<ArchiveKey> {
        self.archive(ArchivePayload::Features(records), stamp).await
    }

    pub async fn archive_verdicts(&self, records: &[ClassifiedRecord], stamp: &ArchiveStamp) -> Result<ArchiveKey> {
        self.archive(ArchivePayload::Verdicts(records), stamp).await
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// Silver layer: header plus one line per record
pub fn features_csv(records: &[FeatureRecord]) -> Result<Vec<u8>> {
    let rows = records
        .iter()
        .map(|r| r.cells().iter().map(|c| c.render()).collect::<Vec<_>>());
    write_csv(FEATURE_COLUMNS.iter().copied(), rows)
}

/// Gold layer: silver columns plus `classification`
pub fn verdicts_csv(records: &[ClassifiedRecord]) -> Result<Vec<u8>> {
    let header = FEATURE_COLUMNS.iter().copied().chain(std::iter::once(VERDICT_COLUMN));
    let rows = records.iter().map(|r| {
        let mut cells: Vec<String> = r.features.cells().iter().map(|c| c.render()).collect();
        cells.push(crate::types::transaction::format_float(r.classification));
        cells
    });
    write_csv(header, rows)
}

fn write_csv<'a, H, R>(header: H, rows: R) -> Result<Vec<u8>>
where
    H: IntoIterator<Item = &'a str>,
    R: IntoIterator<Item = Vec<String>>,
{
    let to_err = |e: csv::Error| PipelineError::ArchiveWriteError(format!("csv encoding: {}", e));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header).map_err(to_err)?;
    for row in rows {
        writer.write_record(&row).map_err(to_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::ArchiveWriteError(format!("csv encoding: {}", e)))
}
