mod config;
mod processor;
mod tally;

use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use tracing::info;

use logsift_logs::Compression;

use crate::config::Config;
use crate::processor::LogProcessor;

/// Logsift - fetch, list and tally time-windowed log objects
#[derive(Parser, Debug)]
#[command(name = "logsift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults apply when omitted)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Object store root directory, overriding the config file
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every line of one object
    Lines {
        account: String,
        container: String,
        object: String,

        /// Treat the object as gzip even if its name does not say so
        #[arg(long)]
        compressed: bool,
    },

    /// List the objects of a container inside a date-hour window
    List {
        account: String,
        container: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Print the listing as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Count lines and bytes of every object in a window, in parallel
    Tally {
        account: String,
        container: String,

        #[command(flatten)]
        window: WindowArgs,

        /// Worker threads, overriding the config file
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct WindowArgs {
    /// First hour to include, as YYYYMMDDHH
    #[arg(long, value_name = "YYYYMMDDHH")]
    start: Option<String>,

    /// Last hour to include, as YYYYMMDDHH
    #[arg(long, value_name = "YYYYMMDDHH")]
    end: Option<String>,

    /// Object name to skip (repeatable)
    #[arg(long = "exclude", value_name = "NAME")]
    exclude: Vec<String>,
}

impl WindowArgs {
    fn exclusions(&self) -> HashSet<String> {
        self.exclude.iter().cloned().collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(root) = args.root {
        config.store.root = root;
    }
    if let Command::Tally {
        workers: Some(workers),
        ..
    } = &args.command
    {
        config.processor.worker_count = *workers;
    }

    let store = Arc::new(config.store.build());
    let processor = LogProcessor::new(store, config.processor);
    let mut out = BufWriter::new(std::io::stdout().lock());

    match args.command {
        Command::Lines {
            account,
            container,
            object,
            compressed,
        } => {
            let compressed = compressed || Compression::from_name(&object).is_gzip();
            let mut lines = processor
                .get_object_data(&account, &container, &object, compressed)
                .await
                .with_context(|| format!("Failed to fetch {account}/{container}/{object}"))?;

            while let Some(line) = lines
                .try_next()
                .await
                .with_context(|| format!("Failed to read {account}/{container}/{object}"))?
            {
                writeln!(out, "{line}")?;
            }
            info!(
                lines = lines.lines_read(),
                bytes = lines.bytes_read(),
                "object read"
            );
        }

        Command::List {
            account,
            container,
            window,
            json,
        } => {
            let exclusions = window.exclusions();
            let names = processor
                .get_container_listing(
                    &account,
                    &container,
                    window.start.as_deref(),
                    window.end.as_deref(),
                    Some(&exclusions),
                )
                .await
                .with_context(|| format!("Failed to list {account}/{container}"))?;

            if json {
                serde_json::to_writer_pretty(&mut out, &names)?;
                writeln!(out)?;
            } else {
                for name in &names {
                    writeln!(out, "{name}")?;
                }
            }
        }

        Command::Tally {
            account,
            container,
            window,
            ..
        } => {
            let exclusions = window.exclusions();
            let report = processor
                .tally_window(
                    &account,
                    &container,
                    window.start.as_deref(),
                    window.end.as_deref(),
                    Some(&exclusions),
                )
                .await?;

            for tally in &report.tallies {
                serde_json::to_writer(&mut out, tally)?;
                writeln!(out)?;
            }
            eprintln!(
                "tallied {} object(s), {} failed",
                report.tallies.len(),
                report.failed
            );
        }
    }

    out.flush()?;
    Ok(())
}
