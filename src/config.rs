//! Configuration for the triage pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Input source configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputConfig {
    /// Path to a newline-delimited contacts file.
    /// If not set, contacts are read from stdin.
    #[serde(default)]
    pub contacts_path: Option<String>,
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum users per batched message-retrieval call
    #[serde(default = "default_max_users_per_batch")]
    pub max_users_per_batch: usize,

    /// Fixed worker count for the spam-check pool.
    /// This caps peak concurrent classification calls.
    #[serde(default = "default_spam_check_workers")]
    pub spam_check_workers: usize,

    /// Buffer size of each inter-stage channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Number of Tokio worker threads (None = num CPUs)
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Enable periodic metrics reporting
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_users_per_batch: 10,
            spam_check_workers: 5,
            channel_capacity: 16,
            worker_threads: None,
            enable_metrics: true,
            metrics_interval_secs: 10,
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // YAML is a superset of JSON
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing.max_users_per_batch == 0 {
            anyhow::bail!("max_users_per_batch must be > 0");
        }
        if self.processing.spam_check_workers == 0 {
            anyhow::bail!("spam_check_workers must be > 0");
        }
        if self.processing.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be > 0");
        }
        if let Some(threads) = self.processing.worker_threads {
            if threads == 0 {
                anyhow::bail!("worker_threads must be > 0 when set");
            }
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_max_users_per_batch() -> usize { 10 }
fn default_spam_check_workers() -> usize { 5 }
fn default_channel_capacity() -> usize { 16 }
fn default_true() -> bool { true }
fn default_metrics_interval() -> u64 { 10 }
