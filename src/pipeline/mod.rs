//! Staged, channel-connected pipeline for message triage.

mod metrics;
mod stages;

pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use stages::{Pipeline, PipelineConfig, PipelineStats};
