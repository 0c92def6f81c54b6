use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::{ProxyError, Result};

/// One-line usage message printed on any argument error
pub const USAGE: &str = "Usage: webproxy <port> <pool-size> <max-number-of-request> <filter>";

/// Positional command-line arguments
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "webproxy", about = "Forwarding HTTP proxy")]
pub struct Cli {
    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub port: u16,

    /// Number of worker threads
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub pool_size: u64,

    /// Number of connections to accept before shutting down
    #[arg(value_parser = clap::value_parser!(u64).range(1..))]
    pub max_requests: u64,

    /// File listing blocked hosts, one per line
    pub filter: PathBuf,
}

impl Cli {
    /// Parse arguments, mapping every failure to [`USAGE`].
    pub fn parse_args<I, T>(args: I) -> std::result::Result<Self, &'static str>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Cli::try_parse_from(args).map_err(|_| USAGE)
    }
}

/// Proxy configuration: command-line arguments plus environment overrides
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to (default: 0.0.0.0)
    pub host: String,
    /// Number of worker threads
    pub pool_size: usize,
    /// Connections accepted before shutdown
    pub max_requests: usize,
    /// Blocklist file
    pub filter_path: PathBuf,
    /// Read/write timeout on client sockets (none by default)
    pub client_timeout: Option<Duration>,
    /// Origin connect timeout (OS default when unset)
    pub connect_timeout: Option<Duration>,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl ProxyConfig {
    /// Build the configuration from parsed arguments and the environment
    pub fn from_cli(cli: Cli) -> Result<Self> {
        Ok(ProxyConfig {
            port: cli.port,
            host: get_env_or("PROXY_HOST", "0.0.0.0"),
            pool_size: to_usize(cli.pool_size, "pool-size")?,
            max_requests: to_usize(cli.max_requests, "max-requests")?,
            filter_path: cli.filter,
            client_timeout: parse_timeout("PROXY_CLIENT_TIMEOUT")?,
            connect_timeout: parse_timeout("PROXY_CONNECT_TIMEOUT")?,
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: match get_env_or("LOG_FORMAT", "pretty").to_lowercase().as_str() {
                    "pretty" => LogFormat::Pretty,
                    "json" => LogFormat::Json,
                    other => {
                        return Err(ProxyError::InvalidConfig(format!(
                            "LOG_FORMAT must be pretty or json, got {}",
                            other
                        )))
                    }
                },
            },
        })
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn to_usize(value: u64, name: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| ProxyError::InvalidConfig(format!("{} is too large: {}", name, value)))
}

/// Optional timeout in whole seconds; unset or 0 means no timeout.
fn parse_timeout(key: &str) -> Result<Option<Duration>> {
    let raw = get_env_or(key, "0");
    let secs: u64 = raw.trim().parse().map_err(|_| {
        ProxyError::InvalidConfig(format!("{} must be a number of seconds, got {}", key, raw))
    })?;

    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
