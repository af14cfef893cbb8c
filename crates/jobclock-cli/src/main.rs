use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use jobclock_runner::{Runner, SyncReport, DEFAULT_QUEUE_SAMPLE};

const ERROR_SENTINEL: &str = "_alt_error.txt";
const TRACE_SENTINEL: &str = "_alt_traceback.txt";

#[derive(Parser)]
#[command(name = "jobclock", version, about = "Job runtime and queue-time estimates from mirrored telemetry")]
struct Cli {
    /// TOML config file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror database path, overrides `mirror_path`
    #[arg(long, global = true)]
    sqldb: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull new completed jobs into the local mirror
    Sync {
        /// Intended days between runs; informational only
        #[arg(long)]
        cadence: Option<f64>,
    },

    /// Estimated run time of a job type on an instance type
    Runtime {
        #[arg(long)]
        jobtype: String,
        #[arg(long)]
        instance: String,
        /// Newest runs to sample
        #[arg(long)]
        size: Option<usize>,
    },

    /// Estimated cost of one run
    Runcost {
        #[arg(long)]
        jobtype: String,
        #[arg(long)]
        instance: String,
    },

    /// Time for the current queue to drain
    Queue {
        #[arg(long, default_value_t = 1)]
        nodes: u32,
        #[arg(long, default_value_t = DEFAULT_QUEUE_SAMPLE)]
        size: usize,
    },

    /// Remaining time of running jobs
    Remaining {
        #[arg(long, default_value_t = DEFAULT_QUEUE_SAMPLE)]
        size: usize,
    },

    /// Mirror size, watermark and whether a sync is running
    Status,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let runner = open_runner(cli.config.as_deref(), cli.sqldb);

    match cli.cmd {
        Command::Sync { cadence } => {
            if let Some(days) = cadence {
                info!(cadence_days = days, "cadence is advisory; scheduling is external");
            }
            match sync_or_sentinels(Path::new("."), runner) {
                Some(report) => print_json(&report)?,
                None => std::process::exit(1),
            }
        }
        Command::Runtime { jobtype, instance, size } => {
            print_json(&runner?.runtime(&jobtype, &instance, size))?;
        }
        Command::Runcost { jobtype, instance } => {
            print_json(&runner?.run_cost(&jobtype, &instance))?;
        }
        Command::Queue { nodes, size } => {
            print_json(&runner?.queue_drain(nodes, size)?)?;
        }
        Command::Remaining { size } => {
            print_json(&runner?.in_flight(size)?)?;
        }
        Command::Status => {
            print_json(&runner?.status()?)?;
        }
    }

    Ok(())
}

fn open_runner(config: Option<&Path>, sqldb: Option<String>) -> anyhow::Result<Runner> {
    let mut runner = Runner::open(config)?;
    if let Some(db) = sqldb {
        runner.cfg.mirror_path = db;
    }
    Ok(runner)
}

/// Run a sync; any failure on the way, config loading included, leaves sentinels in `dir`.
fn sync_or_sentinels(dir: &Path, runner: anyhow::Result<Runner>) -> Option<SyncReport> {
    let outcome = runner.and_then(|r| r.sync().map_err(anyhow::Error::new));
    match outcome {
        Ok(report) => Some(report),
        Err(e) => {
            error!(error = %e, "sync failed");
            write_sentinels(dir, &e);
            None
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Leave the failure where an external scheduler can find it.
fn write_sentinels(dir: &Path, err: &anyhow::Error) {
    let trace = format!("{:?}", err);
    for (name, body) in [(ERROR_SENTINEL, err.to_string()), (TRACE_SENTINEL, trace)] {
        let path = dir.join(name);
        if let Err(io) = std::fs::write(&path, body) {
            error!(path = %path.display(), error = %io, "could not write failure sentinel");
        }
    }
}
