//! spamsift CLI
//!
//! Reads newline-delimited contacts, runs the triage pipeline, and prints one
//! sorted `"<spam> <message id>"` line per message. The CLI wires in the
//! deterministic fixture collaborators; production deployments embed the
//! library with real service clients instead.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use spamsift::services::{FixtureClassifier, FixtureDirectory, FixtureMessageStore};
use spamsift::{build_runtime, run_pipeline, Config};

#[derive(Parser)]
#[command(name = "spamsift")]
#[command(about = "Triage messages for spam across a contact list", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override spam-check worker pool size
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Override maximum users per retrieval batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the triage pipeline (default if no command specified)
    Run {
        /// Contacts file (newline-delimited); stdin if omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => run_command(cli.config, None, cli.workers, cli.batch_size)?,

        Some(Commands::Run { input }) => {
            run_command(cli.config, input, cli.workers, cli.batch_size)?;
        }

        Some(Commands::Validate) => {
            validate_command(cli.config)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

fn run_command(
    config_path: PathBuf,
    input: Option<PathBuf>,
    workers: Option<usize>,
    batch_size: Option<usize>,
) -> Result<()> {
    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        tracing::debug!("No config file at {}, using defaults", config_path.display());
        Config::default()
    };

    // Apply overrides
    if let Some(w) = workers {
        config.processing.spam_check_workers = w;
    }
    if let Some(b) = batch_size {
        config.processing.max_users_per_batch = b;
    }

    config.validate()?;

    let contacts = read_contacts(input.or_else(|| {
        config.input.contacts_path.as_ref().map(PathBuf::from)
    }))?;
    tracing::info!("Read {} contacts", contacts.len());

    let runtime = build_runtime(config.processing.worker_threads)?;
    runtime.block_on(async {
        let capacity = config.processing.channel_capacity;
        let (contacts_tx, contacts_rx) = async_channel::bounded(capacity);
        let (lines_tx, lines_rx) = async_channel::bounded(capacity);

        let feeder = tokio::spawn(async move {
            for contact in contacts {
                if contacts_tx.send(contact).await.is_err() {
                    break;
                }
            }
            // Sender drops here; the pipeline sees end of input.
        });

        let printer = tokio::spawn(async move {
            while let Ok(line) = lines_rx.recv().await {
                println!("{line}");
            }
        });

        run_pipeline(
            &config,
            Arc::new(FixtureDirectory),
            Arc::new(FixtureMessageStore::default()),
            Arc::new(FixtureClassifier),
            contacts_rx,
            lines_tx,
        )
        .await?;

        feeder.await?;
        printer.await?;
        anyhow::Ok(())
    })?;

    Ok(())
}

/// Read contacts from a file, or stdin when no path is given.
/// Blank lines are skipped.
fn read_contacts(path: Option<PathBuf>) -> Result<Vec<String>> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(&path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    // Generate a commented YAML config
    let yaml = r#"# spamsift configuration

# === INPUT ===
input:
  # Newline-delimited contacts file; omit to read from stdin
  # contacts_path: "contacts.txt"

# === PROCESSING ===
processing:
  # Maximum users per batched message-retrieval call
  max_users_per_batch: 10

  # Fixed worker count for the spam-check pool.
  # This is the only cap on concurrent classification calls.
  spam_check_workers: 5

  # Buffer size of each inter-stage channel (backpressure window)
  channel_capacity: 16

  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 8

  # Print throughput metrics during processing
  enable_metrics: true

  # Metrics reporting interval in seconds
  metrics_interval_secs: 10

  # Optional path to save metrics JSON after run completes
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        // No subcommand - should default to Run
        let cli = Cli::try_parse_from(["spamsift"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().command.is_none());
    }

    #[test]
    fn test_cli_parse_with_overrides() {
        let cli = Cli::try_parse_from(["spamsift", "--workers", "3", "--batch-size", "7"]).unwrap();
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.batch_size, Some(7));
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["spamsift", "validate", "-c", "test.yaml"]);
        assert!(cli.is_ok());
    }
}
