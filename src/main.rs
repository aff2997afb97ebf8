use std::process::ExitCode;
use std::sync::Arc;

use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use oxid_lock::clock::{AtomicClock, LogicalClock};
use oxid_lock::config::WorkloadConfig;
use oxid_lock::workload::run_workload;

fn main() -> ExitCode {
    println!("OxidLock - timestamp ordered locking stress test");
    let config = match WorkloadConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock: Arc<dyn LogicalClock> = Arc::new(AtomicClock::new());
    match run_workload(&config, clock) {
        Ok(report) => {
            println!("{}", report);
            if report.races > 0 {
                error!("{} races detected", report.races);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
