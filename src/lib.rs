//! spamsift
//!
//! Concurrent message triage pipeline: resolve raw contacts to users, fetch
//! their messages in batches, classify each message for spam, and emit one
//! sorted line per message.
//!
//! # Architecture
//!
//! Four stages connected by bounded channels, each with its own concurrency
//! strategy:
//!
//! - **SelectUsers**: per-contact lookup fan-out with first-seen dedup
//! - **SelectMessages**: fixed-size batch accumulation, one worker per batch
//! - **CheckSpam**: bounded worker pool (the only concurrency ceiling)
//! - **CombineResults**: drain, sort spam-first/ascending-id, emit lines
//!
//! # Usage
//!
//! ```no_run
//! use spamsift::{run_pipeline, Config};
//! use spamsift::services::{FixtureClassifier, FixtureDirectory, FixtureMessageStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let (contacts_tx, contacts_rx) = async_channel::bounded(16);
//!     let (lines_tx, lines_rx) = async_channel::bounded(16);
//!
//!     tokio::spawn(async move {
//!         for contact in ["a@example.com", "b@example.com"] {
//!             let _ = contacts_tx.send(contact.to_string()).await;
//!         }
//!     });
//!
//!     let printer = tokio::spawn(async move {
//!         while let Ok(line) = lines_rx.recv().await {
//!             println!("{line}");
//!         }
//!     });
//!
//!     run_pipeline(
//!         &config,
//!         Arc::new(FixtureDirectory),
//!         Arc::new(FixtureMessageStore::default()),
//!         Arc::new(FixtureClassifier),
//!         contacts_rx,
//!         lines_tx,
//!     )
//!     .await?;
//!     printer.await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod pipeline;
pub mod services;
pub mod types;

pub use config::Config;
pub use pipeline::{Metrics, Pipeline, PipelineConfig, PipelineStats};
pub use types::{MessageId, MessageRecord, User};

use crate::pipeline::MetricsReporter;
use crate::services::{MessageStore, SpamClassifier, UserDirectory};
use anyhow::Result;
use async_channel::{Receiver, Sender};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Run the full triage pipeline with the given configuration.
///
/// The caller owns both ends: it feeds `contacts_rx` and closes it to signal
/// end of input, and it drains the receiver paired with `lines_tx`.
pub async fn run_pipeline(
    config: &Config,
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn MessageStore>,
    classifier: Arc<dyn SpamClassifier>,
    contacts_rx: Receiver<String>,
    lines_tx: Sender<String>,
) -> Result<PipelineStats> {
    config.validate()?;

    let metrics = Metrics::new();

    let pipeline_config = PipelineConfig {
        max_users_per_batch: config.processing.max_users_per_batch,
        spam_check_workers: config.processing.spam_check_workers,
        channel_capacity: config.processing.channel_capacity,
    };

    tracing::info!(
        "Starting triage pipeline (batch size {}, {} spam-check workers)",
        pipeline_config.max_users_per_batch,
        pipeline_config.spam_check_workers
    );

    // Start metrics reporter if enabled
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let reporter_handle = if config.processing.enable_metrics {
        let reporter = MetricsReporter::new(
            metrics.clone(),
            config.processing.metrics_interval_secs,
        );
        Some(tokio::spawn(reporter.run(shutdown_rx)))
    } else {
        drop(shutdown_rx);
        None
    };

    let pipeline = Pipeline::new(directory, store, classifier, metrics.clone(), pipeline_config);
    let stats = pipeline.run(contacts_rx, lines_tx).await?;

    // Shutdown metrics reporter
    let _ = shutdown_tx.send(()).await;
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }

    if let Some(ref path) = config.processing.metrics_output_path {
        let snapshot = metrics.snapshot();
        if let Err(e) = snapshot.save_to_file(path) {
            tracing::warn!("Failed to save metrics to {}: {}", path, e);
        }
    }

    tracing::info!("Pipeline complete: {}", stats);

    Ok(stats)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
