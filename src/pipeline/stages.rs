//! Decoupled pipeline stages for message triage.
//!
//! The pipeline is split into four stages connected by bounded channels:
//!
//! ```text
//! ┌──────────────┐    ┌─────────────────┐    ┌────────────┐    ┌─────────────────┐
//! │ SelectUsers  │───▶│ SelectMessages  │───▶│ CheckSpam  │───▶│ CombineResults  │
//! │ (dedup)      │    │ (batch fan-out) │    │ (pool of W)│    │ (collect+sort)  │
//! └──────────────┘    └─────────────────┘    └────────────┘    └─────────────────┘
//!      users_rx            messages_rx           records_rx          lines
//! ```
//!
//! Each stage drains its inbound channel fully and closes its outbound channel
//! by dropping the last `Sender` clone when it returns, after every pending
//! emission has gone out. Bounded capacities give backpressure: a slow
//! downstream stage throttles all upstream fan-out that feeds it.
//!
//! Concurrency strategy differs per stage:
//! - `SelectUsers` spawns one lookup task per contact (unbounded fan-out) and
//!   deduplicates on the resolved user id, first writer wins.
//! - `SelectMessages` accumulates fixed-size batches and spawns one retrieval
//!   worker per batch.
//! - `CheckSpam` pre-spawns a fixed pool of workers sharing one receiver; this
//!   is the pipeline's only cap on concurrent collaborator calls.
//! - `CombineResults` is single-task: drain, sort, emit.

use crate::pipeline::Metrics;
use crate::services::{MessageStore, SpamClassifier, UserDirectory};
use crate::types::{MessageId, MessageRecord, User};
use anyhow::Result;
use async_channel::{Receiver, Sender};
use dashmap::DashSet;
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Configuration for the staged pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum users per batched retrieval call
    pub max_users_per_batch: usize,
    /// Fixed worker count for the spam-check pool
    pub spam_check_workers: usize,
    /// Buffer size of each inter-stage channel
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_users_per_batch: 10,
            spam_check_workers: 5,
            channel_capacity: 16,
        }
    }
}

/// Staged pipeline executor.
pub struct Pipeline {
    directory: Arc<dyn UserDirectory>,
    store: Arc<dyn MessageStore>,
    classifier: Arc<dyn SpamClassifier>,
    metrics: Arc<Metrics>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        store: Arc<dyn MessageStore>,
        classifier: Arc<dyn SpamClassifier>,
        metrics: Arc<Metrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            directory,
            store,
            classifier,
            metrics,
            config,
        }
    }

    /// Run the pipeline over a source of contacts.
    ///
    /// The caller owns the outer two streams: it feeds `contacts_rx` (and
    /// closes it to signal end of input) and drains `lines_tx`'s receiver.
    /// The three interior channels are allocated here; every stage closes its
    /// own outbound channel, never someone else's, and this method waits for
    /// all four stages regardless of the order they finish in.
    pub async fn run(
        &self,
        contacts_rx: Receiver<String>,
        lines_tx: Sender<String>,
    ) -> Result<PipelineStats> {
        let cap = self.config.channel_capacity;
        let (users_tx, users_rx) = async_channel::bounded::<User>(cap);
        let (messages_tx, messages_rx) = async_channel::bounded::<MessageId>(cap);
        let (records_tx, records_rx) = async_channel::bounded::<MessageRecord>(cap);

        let stages = [
            self.spawn_select_users(contacts_rx, users_tx),
            self.spawn_select_messages(users_rx, messages_tx),
            self.spawn_check_spam(messages_rx, records_tx),
            self.spawn_combine_results(records_rx, lines_tx),
        ];

        for handle in stages {
            handle.await?;
        }

        let snapshot = self.metrics.snapshot();
        Ok(PipelineStats {
            contacts_received: snapshot.contacts_received as usize,
            users_forwarded: snapshot.users_forwarded as usize,
            messages_classified: snapshot.messages_classified as usize,
            spam_detected: snapshot.spam_detected as usize,
            failures: snapshot.failures as usize,
        })
    }

    /// Spawn the dedup stage: one lookup task per contact, forward first-seen ids.
    fn spawn_select_users(
        &self,
        contacts_rx: Receiver<String>,
        users_tx: Sender<User>,
    ) -> JoinHandle<()> {
        let directory = self.directory.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            // Scoped to this run; a fresh stage starts with an empty set.
            let seen = Arc::new(DashSet::<u64>::new());
            let mut lookups = Vec::new();

            while let Ok(contact) = contacts_rx.recv().await {
                metrics.add_contact_received();

                let directory = directory.clone();
                let metrics = metrics.clone();
                let seen = seen.clone();
                let users_tx = users_tx.clone();

                lookups.push(tokio::spawn(async move {
                    let start = Instant::now();
                    match directory.resolve(&contact).await {
                        Ok(user) => {
                            metrics.add_lookup_time(start.elapsed());
                            metrics.add_lookup_completed();

                            // insert() is the atomic test-and-set: exactly one
                            // of two racing tasks with the same id gets true.
                            if seen.insert(user.id) {
                                metrics.add_user_forwarded();
                                if users_tx.send(user).await.is_err() {
                                    tracing::debug!("User receiver dropped");
                                }
                            } else {
                                metrics.add_duplicate_dropped();
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Lookup failed for {:?}: {}", contact, e);
                            metrics.add_failure();
                        }
                    }
                }));
            }

            // Every launched lookup must finish before the outbound closes.
            for handle in lookups {
                let _ = handle.await;
            }
        })
    }

    /// Spawn the batch stage: accumulate fixed-size batches, one retrieval
    /// worker per batch, plus one for a trailing partial batch.
    fn spawn_select_messages(
        &self,
        users_rx: Receiver<User>,
        messages_tx: Sender<MessageId>,
    ) -> JoinHandle<()> {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let batch_size = self.config.max_users_per_batch;

        tokio::spawn(async move {
            let mut batch: Vec<User> = Vec::with_capacity(batch_size);
            let mut workers = Vec::new();

            while let Ok(user) = users_rx.recv().await {
                batch.push(user);

                if batch.len() == batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    workers.push(spawn_fetch_worker(
                        store.clone(),
                        metrics.clone(),
                        full,
                        messages_tx.clone(),
                    ));
                }
            }

            if !batch.is_empty() {
                workers.push(spawn_fetch_worker(
                    store.clone(),
                    metrics.clone(),
                    batch,
                    messages_tx.clone(),
                ));
            }

            for handle in workers {
                let _ = handle.await;
            }
        })
    }

    /// Spawn the spam-check stage: a fixed pool of long-lived workers sharing
    /// one receiver, capping concurrent classification calls.
    fn spawn_check_spam(
        &self,
        messages_rx: Receiver<MessageId>,
        records_tx: Sender<MessageRecord>,
    ) -> JoinHandle<()> {
        let classifier = self.classifier.clone();
        let metrics = self.metrics.clone();
        let pool_size = self.config.spam_check_workers;

        tokio::spawn(async move {
            let mut workers = Vec::with_capacity(pool_size);

            for _ in 0..pool_size {
                let classifier = classifier.clone();
                let metrics = metrics.clone();
                let messages_rx = messages_rx.clone();
                let records_tx = records_tx.clone();

                workers.push(tokio::spawn(async move {
                    while let Ok(id) = messages_rx.recv().await {
                        let start = Instant::now();
                        let has_spam = match classifier.classify(id).await {
                            Ok(has_spam) => {
                                metrics.add_classify_time(start.elapsed());
                                has_spam
                            }
                            Err(e) => {
                                // Forward anyway so every inbound id yields a
                                // record; the failure is visible in logs and
                                // the metrics counter.
                                tracing::warn!("Classification failed for {}: {}", id, e);
                                metrics.add_failure();
                                false
                            }
                        };
                        metrics.add_message_classified(has_spam);

                        // The tokio scheduler is cooperative; a worker over an
                        // always-ready classifier must not starve its peers.
                        tokio::task::yield_now().await;

                        if records_tx.send(MessageRecord { id, has_spam }).await.is_err() {
                            tracing::debug!("Record receiver dropped, stopping worker");
                            break;
                        }
                    }
                }));
            }

            // The stage's own sender clone drops here; the channel closes once
            // the last worker finishes and drops its clone.
            drop(records_tx);

            for handle in workers {
                let _ = handle.await;
            }
        })
    }

    /// Spawn the terminal stage: drain everything, sort, emit formatted lines.
    fn spawn_combine_results(
        &self,
        records_rx: Receiver<MessageRecord>,
        lines_tx: Sender<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut records = Vec::new();
            while let Ok(record) = records_rx.recv().await {
                records.push(record);
            }

            sort_records(&mut records);

            for record in records {
                if lines_tx.send(record.to_line()).await.is_err() {
                    tracing::debug!("Line receiver dropped, stopping emit");
                    break;
                }
            }
        })
    }
}

/// One retrieval worker: a single batched store call, results forwarded
/// individually. A failed call contributes zero messages for its batch.
fn spawn_fetch_worker(
    store: Arc<dyn MessageStore>,
    metrics: Arc<Metrics>,
    batch: Vec<User>,
    messages_tx: Sender<MessageId>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        metrics.add_batch_dispatched();

        let start = Instant::now();
        match store.fetch_for_users(&batch).await {
            Ok(ids) => {
                metrics.add_fetch_time(start.elapsed());
                metrics.add_messages_fetched(ids.len() as u64);
                for id in ids {
                    if messages_tx.send(id).await.is_err() {
                        tracing::debug!("Message receiver dropped, stopping fetch worker");
                        break;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Retrieval failed for batch of {}: {}", batch.len(), e);
                metrics.add_failure();
            }
        }
    })
}

/// Total order for the final output: spam first, ascending id within group.
fn sort_records(records: &mut [MessageRecord]) {
    records.sort_unstable_by_key(|r| (Reverse(r.has_spam), r.id));
}

/// Statistics from a pipeline run.
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub contacts_received: usize,
    pub users_forwarded: usize,
    pub messages_classified: usize,
    pub spam_detected: usize,
    pub failures: usize,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Contacts: {}, Users: {}, Classified: {}, Spam: {}, Failures: {}",
            self.contacts_received,
            self.users_forwarded,
            self.messages_classified,
            self.spam_detected,
            self.failures
        )
    }
}
