//! stsd - host metrics to PostgreSQL daemon.
//!
//! Every few seconds collects per-core CPU and per-process metrics from
//! /proc and inserts them into the `cpu_metrics` and `processes_metrics`
//! tables. A tick that is still running when the next one is due causes
//! that next one to be skipped.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod logging;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use logging::LogArgs;
use sts_core::collector::{ProcfsCollector, RealFs};
use sts_core::scheduler::{self, Pipeline};
use sts_core::writer::{PgStore, StoreWriter};

/// Host metrics to PostgreSQL daemon.
#[derive(Parser, Debug)]
#[command(name = "stsd", about = "Host metrics to PostgreSQL daemon", version)]
struct Args {
    /// PostgreSQL connection string (key=value or postgresql:// URL).
    #[arg(long, env = "STS_DATABASE_CONNECTION_STRING", hide_env_values = true)]
    database_url: String,

    /// Collection interval in seconds.
    #[arg(
        short,
        long,
        env = "STS_INTERVAL",
        default_value = "3",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Path to /proc filesystem.
    #[arg(long, env = "STS_PROC_PATH", default_value = "/proc")]
    proc_path: String,

    #[command(flatten)]
    log: LogArgs,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = logging::init_logging(&args.log) {
        eprintln!("stsd: {}", e);
        return ExitCode::FAILURE;
    }

    info!("stsd {} starting", env!("CARGO_PKG_VERSION"));

    let store = match PgStore::new(&args.database_url) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "invalid database connection string");
            return ExitCode::FAILURE;
        }
    };

    let interval = Duration::from_secs(args.interval);
    info!(
        interval_secs = args.interval,
        proc_path = %args.proc_path,
        server = %store.target(),
        "configuration loaded"
    );

    let collector = ProcfsCollector::new(RealFs::new(), args.proc_path.as_str());
    let pipeline = Pipeline::new(collector, StoreWriter::new(store), interval);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("failed to set signal handler: {}", e);
    }

    let handle = match scheduler::spawn(interval, pipeline) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start scheduler");
            return ExitCode::FAILURE;
        }
    };

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("shutting down, waiting for the running tick");
    if let Some(mut pipeline) = handle.stop() {
        pipeline.close();
    }
    info!("shutdown complete");
    ExitCode::SUCCESS
}
