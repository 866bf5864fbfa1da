mod utils;

use std::time::Duration;

use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::{Config, Externals, ServiceState};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Install the global subscriber: compact stdout output filtered by
/// `RUST_LOG`, falling back to `level`.
pub fn init_logging(level: tracing::Level) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stdout_layer).init();
}

/// Set up logging and build the node state, exiting on error.
///
/// Use this when the caller routes transport messages to the handler itself.
pub async fn start_service(config: &Config, externals: Externals) -> ServiceState {
    let level = match config.level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    init_logging(level);

    utils::register_panic_logger();
    utils::report_build_info();

    match ServiceState::from_config(config, externals).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("error creating server state: {}", e);
            std::process::exit(3);
        }
    }
}

/// Run the node until SIGINT or SIGTERM, then drain the job workers.
pub async fn spawn_service(config: &Config, externals: Externals) {
    let state = start_service(config, externals).await;

    let graceful_waiter = match utils::graceful_shutdown_blocker() {
        Ok(waiter) => waiter,
        Err(e) => {
            tracing::error!("failed to install signal handlers: {}", e);
            std::process::exit(3);
        }
    };
    tracing::info!("node {} ready", state.account());

    let _ = graceful_waiter.await;

    if timeout(FINAL_SHUTDOWN_TIMEOUT, state.shutdown())
        .await
        .is_err()
    {
        tracing::error!(
            "Failed to shut down within {} seconds",
            FINAL_SHUTDOWN_TIMEOUT.as_secs()
        );
        std::process::exit(4);
    }
}
