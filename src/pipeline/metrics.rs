//! Throughput monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for a pipeline run.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Contacts read from the source stream
    pub contacts_received: AtomicU64,

    /// Directory lookups that completed
    pub lookups_completed: AtomicU64,

    /// Users dropped because their id was already seen
    pub duplicates_dropped: AtomicU64,

    /// Distinct users forwarded to the batch stage
    pub users_forwarded: AtomicU64,

    /// Batched retrieval calls dispatched
    pub batches_dispatched: AtomicU64,

    /// Message ids fetched from the store
    pub messages_fetched: AtomicU64,

    /// Messages classified by the spam-check pool
    pub messages_classified: AtomicU64,

    /// Messages flagged as spam
    pub spam_detected: AtomicU64,

    /// Collaborator calls that returned an error
    pub failures: AtomicU64,

    /// Start time
    start_time: Option<Instant>,

    // Per-collaborator timing (in microseconds, summed across tasks)
    /// Time spent in directory lookups (microseconds)
    pub lookup_us: AtomicU64,

    /// Time spent in batched message retrieval (microseconds)
    pub fetch_us: AtomicU64,

    /// Time spent in spam classification (microseconds)
    pub classify_us: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    /// Record a contact read from the source.
    pub fn add_contact_received(&self) {
        self.contacts_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed directory lookup.
    pub fn add_lookup_completed(&self) {
        self.lookups_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a user dropped as a duplicate.
    pub fn add_duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a user forwarded downstream.
    pub fn add_user_forwarded(&self) {
        self.users_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dispatched retrieval batch.
    pub fn add_batch_dispatched(&self) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record fetched message ids.
    pub fn add_messages_fetched(&self, count: u64) {
        self.messages_fetched.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a classified message.
    pub fn add_message_classified(&self, has_spam: bool) {
        self.messages_classified.fetch_add(1, Ordering::Relaxed);
        if has_spam {
            self.spam_detected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed collaborator call.
    pub fn add_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent in directory lookups.
    pub fn add_lookup_time(&self, duration: Duration) {
        self.lookup_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent in batched retrieval.
    pub fn add_fetch_time(&self, duration: Duration) {
        self.fetch_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent in classification.
    pub fn add_classify_time(&self, duration: Duration) {
        self.classify_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get messages classified per second.
    pub fn messages_per_second(&self) -> f64 {
        let messages = self.messages_classified.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            messages as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            contacts_received: self.contacts_received.load(Ordering::Relaxed),
            lookups_completed: self.lookups_completed.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            users_forwarded: self.users_forwarded.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            messages_fetched: self.messages_fetched.load(Ordering::Relaxed),
            messages_classified: self.messages_classified.load(Ordering::Relaxed),
            spam_detected: self.spam_detected.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            messages_per_second: self.messages_per_second(),
            lookup_secs: self.lookup_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            fetch_secs: self.fetch_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            classify_secs: self.classify_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub contacts_received: u64,
    pub lookups_completed: u64,
    pub duplicates_dropped: u64,
    pub users_forwarded: u64,
    pub batches_dispatched: u64,
    pub messages_fetched: u64,
    pub messages_classified: u64,
    pub spam_detected: u64,
    pub failures: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub messages_per_second: f64,
    /// Total time in directory lookups (seconds, summed across tasks)
    pub lookup_secs: f64,
    /// Total time in batched retrieval (seconds, summed across tasks)
    pub fetch_secs: f64,
    /// Total time in classification (seconds, summed across tasks)
    pub classify_secs: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Time share per collaborator
        let total = self.lookup_secs + self.fetch_secs + self.classify_secs;
        let (lookup_pct, fetch_pct, classify_pct) = if total > 0.0 {
            (
                self.lookup_secs / total * 100.0,
                self.fetch_secs / total * 100.0,
                self.classify_secs / total * 100.0,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        write!(
            f,
            "Contacts: {} | Users: {} forwarded, {} dupes | \
             Batches: {} | Messages: {} fetched, {} classified, {} spam | \
             Rate: {:.1} msg/s | Failures: {} | Elapsed: {:.1}s | \
             Time: lookup {:.0}% | fetch {:.0}% | classify {:.0}%",
            self.contacts_received,
            self.users_forwarded,
            self.duplicates_dropped,
            self.batches_dispatched,
            self.messages_fetched,
            self.messages_classified,
            self.spam_detected,
            self.messages_per_second,
            self.failures,
            self.elapsed.as_secs_f64(),
            lookup_pct,
            fetch_pct,
            classify_pct,
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::info!("{}", self.metrics.snapshot());
                }
                _ = shutdown.recv() => {
                    // Final report
                    tracing::info!("Final: {}", self.metrics.snapshot());
                    break;
                }
            }
        }
    }

    /// Print a final summary.
    pub fn print_summary(&self) {
        let snapshot = self.metrics.snapshot();

        println!("\n=== Pipeline Summary ===");
        println!("Total time: {:.1}s", snapshot.elapsed.as_secs_f64());
        println!("Contacts received: {}", snapshot.contacts_received);
        println!(
            "Users forwarded: {} ({} duplicates dropped)",
            snapshot.users_forwarded, snapshot.duplicates_dropped
        );
        println!("Retrieval batches: {}", snapshot.batches_dispatched);
        println!("Messages fetched: {}", snapshot.messages_fetched);
        println!(
            "Messages classified: {} ({} spam)",
            snapshot.messages_classified, snapshot.spam_detected
        );
        println!("Classification rate: {:.1} msg/s", snapshot.messages_per_second);
        println!("Failures: {}", snapshot.failures);

        let total = snapshot.lookup_secs + snapshot.fetch_secs + snapshot.classify_secs;
        if total > 0.0 {
            println!("\n--- Collaborator Time Breakdown ---");
            println!(
                "Lookup:    {:>7.1}s ({:>5.1}%)",
                snapshot.lookup_secs,
                snapshot.lookup_secs / total * 100.0
            );
            println!(
                "Fetch:     {:>7.1}s ({:>5.1}%)",
                snapshot.fetch_secs,
                snapshot.fetch_secs / total * 100.0
            );
            println!(
                "Classify:  {:>7.1}s ({:>5.1}%)",
                snapshot.classify_secs,
                snapshot.classify_secs / total * 100.0
            );
        }
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.add_contact_received();
        metrics.add_contact_received();

        assert_eq!(metrics.contacts_received.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = Metrics::new();

        metrics.add_user_forwarded();
        metrics.add_user_forwarded();
        metrics.add_duplicate_dropped();
        metrics.add_batch_dispatched();
        metrics.add_messages_fetched(8);
        metrics.add_message_classified(true);
        metrics.add_message_classified(false);
        metrics.add_failure();

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.users_forwarded, 2);
        assert_eq!(snapshot.duplicates_dropped, 1);
        assert_eq!(snapshot.batches_dispatched, 1);
        assert_eq!(snapshot.messages_fetched, 8);
        assert_eq!(snapshot.messages_classified, 2);
        assert_eq!(snapshot.spam_detected, 1);
        assert_eq!(snapshot.failures, 1);
    }

    #[test]
    fn test_timing_metrics() {
        let metrics = Metrics::new();

        metrics.add_lookup_time(Duration::from_millis(100));
        metrics.add_fetch_time(Duration::from_millis(50));
        metrics.add_classify_time(Duration::from_millis(25));

        let snapshot = metrics.snapshot();

        assert!((snapshot.lookup_secs - 0.1).abs() < 0.001);
        assert!((snapshot.fetch_secs - 0.05).abs() < 0.001);
        assert!((snapshot.classify_secs - 0.025).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = Metrics::new();
        metrics.add_contact_received();
        metrics.add_user_forwarded();
        metrics.add_message_classified(true);

        let display = format!("{}", metrics.snapshot());

        assert!(display.contains("Contacts: 1"));
        assert!(display.contains("1 forwarded"));
        assert!(display.contains("1 spam"));
    }

    #[test]
    fn test_zero_elapsed_no_panic() {
        // No start_time set: rates must come back as 0.0, not NaN or panic
        let metrics = Metrics {
            start_time: None,
            ..Default::default()
        };

        metrics.add_message_classified(false);

        assert_eq!(metrics.messages_per_second(), 0.0);
    }
}
