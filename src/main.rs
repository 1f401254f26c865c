//! Fraud Scoring Pipeline - Main Entry Point
//!
//! Resolves the model, connects the stores and runs scoring cycles until the
//! configured cycle count is reached or the process is interrupted.

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    archive::{Archiver, ObjectStoreBlobs},
    config::{AppConfig, LoggingConfig},
    feature_extractor::FeatureExtractor,
    fetcher::TransactionFetcher,
    metrics::PipelineMetrics,
    models::{MlflowClassifier, ModelRegistry, VerdictStage},
    pipeline::{Pipeline, RunContext},
    producer::{AlertSink, NatsAlertSink, NoopAlertSink},
    store::{PgTransactionStore, TransactionStore},
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("fraud_scoring_pipeline={}", logging.level).parse()?),
    };

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Fraud Scoring Pipeline");
    info!(
        source = %config.source.url,
        model_uri = %config.model.model_uri,
        threshold = config.detection.threshold,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let fetcher = TransactionFetcher::new(&config.source)?;
    info!("Polling transactions from {}", fetcher.url());
    let extractor = FeatureExtractor::new();
    info!("Feature extractor initialized ({} features)", extractor.feature_count());

    // Resolve the model once; every cycle scores against the same version
    let registry_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.model.timeout_secs))
        .build()?;
    let registry = ModelRegistry::new(registry_client, &config.model.tracking_uri);
    let model = registry
        .resolve(&config.model.model_uri)
        .await
        .context("Failed to resolve model")?;
    let classifier = MlflowClassifier::new(
        &config.model.serving_url,
        model,
        Duration::from_secs(config.model.timeout_secs),
    )?;
    // The registry only names the model; the serving endpoint decides what scores.
    let resolved = classifier.model();
    info!(
        model = %resolved.name,
        version = resolved.version.as_deref().unwrap_or("-"),
        source = resolved.source.as_deref().unwrap_or("-"),
        serving_url = %config.model.serving_url,
        "Scoring endpoint must serve this model source"
    );

    let alerts: Arc<dyn AlertSink> = match &config.alerts.nats_url {
        Some(url) => {
            let sink = NatsAlertSink::connect(url, &config.alerts.subject).await?;
            info!("Publishing alerts to {} on {}", sink.subject(), url);
            Arc::new(sink)
        }
        None => {
            warn!("alerts.nats_url not set, fraud alerts will only be logged");
            Arc::new(NoopAlertSink)
        }
    };
    let verdicts = VerdictStage::new(Arc::new(classifier), alerts, config.detection.threshold);
    info!("Verdict stage initialized with model {}", verdicts.model_name());

    let blobs = ObjectStoreBlobs::from_config(&config.storage)?;
    let location = blobs.location().to_string();
    let archiver = Archiver::new(Arc::new(blobs), &config.storage.prefix);
    info!("Archiving to {}/{}", location, archiver.prefix());

    let store = PgTransactionStore::connect(&config.database).await?;
    store
        .ensure_schema()
        .await
        .context("Failed to create public.transactions")?;

    let ctx = RunContext {
        fetcher,
        extractor,
        verdicts,
        archiver,
        store: Arc::new(store),
        metrics: metrics.clone(),
    };
    let mut pipeline = Pipeline::new(ctx, config.pipeline.clone());

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current cycle");
            shutdown.cancel();
        }
    });

    let summary = pipeline.run(cancel).await;

    // Print final summary
    info!("Pipeline shutting down...");
    metrics.print_summary();

    if summary.succeeded == 0 && summary.failed > 0 {
        warn!(failed = summary.failed, "No cycle completed successfully");
    }

    Ok(())
}
