//! Webproxy - Entry Point
//!
//! Parses arguments, loads the blocklist, then serves the configured number
//! of connections before draining the worker pool and exiting.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webproxy::config::{LogConfig, LogFormat};
use webproxy::{Cli, HostFilter, ProxyConfig, ProxyError, ProxyServer};

fn main() -> ExitCode {
    let cli = match Cli::parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(usage) => {
            println!("{}", usage);
            return ExitCode::SUCCESS;
        }
    };

    let config = match ProxyConfig::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::SUCCESS;
        }
    };

    init_tracing(&config.log);
    info!("Starting webproxy");

    let filter = match HostFilter::load(&config.filter_path) {
        Ok(filter) => Arc::new(filter),
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::SUCCESS;
        }
    };

    let server = match ProxyServer::bind(&config, filter) {
        Ok(server) => server,
        // An out-of-range pool size is an argument error, not a runtime failure.
        Err(e @ ProxyError::InvalidPoolSize { .. }) => {
            eprintln!("{}", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("Failed to start proxy on {}: {}", config.listen_addr(), e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = server.run();
    info!(
        accepted = summary.accepted,
        failed_accepts = summary.failed_accepts,
        "Webproxy stopped"
    );
    ExitCode::SUCCESS
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("webproxy={}", log.level)));
    let json = log.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}
