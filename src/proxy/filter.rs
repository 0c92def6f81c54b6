//! Static host blocklist

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ProxyError, Result};

/// Immutable set of blocked hostnames.
///
/// Built once at startup and shared read-only (behind an `Arc`) with every
/// connection, so lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct HostFilter {
    hosts: HashSet<String>,
}

impl HostFilter {
    /// An empty filter that blocks nothing
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(Into::into)
                .filter(|h: &String| !h.is_empty())
                .collect(),
        }
    }

    /// Load a filter file with one hostname per line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read(path).map_err(|source| ProxyError::FilterLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let filter = Self::parse(&String::from_utf8_lossy(&contents));
        info!("Loaded {} blocked hosts from {}", filter.len(), path.display());
        Ok(filter)
    }

    fn parse(contents: &str) -> Self {
        Self::from_hosts(
            contents
                .split('\n')
                .map(|line| line.trim_end_matches(['\r', '\n'])),
        )
    }

    /// Exact, case-sensitive membership test
    pub fn is_blocked(&self, host: &str) -> bool {
        let blocked = self.hosts.contains(host);
        if blocked {
            debug!(host, "Host matched blocklist");
        }
        blocked
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
