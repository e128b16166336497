//! Probe timeouts and cancellation
//!
//! Every external call is bounded. Reachability checks get a short budget,
//! cluster and SQL calls a longer one, so `All` cannot hang on one bad host.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::ProbeError;

/// Budget category of an external call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Ping and DNS
    Reachability,
    /// TCP connect
    Connect,
    /// Cluster management API
    ClusterApi,
    /// SQL connect and query
    Sql,
    /// External commands (self-test binaries, stack reset)
    Command,
}

/// Timeout configuration (milliseconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeTimeouts {
    #[serde(default = "default_reachability_timeout")]
    pub reachability: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect: u64,
    #[serde(default = "default_cluster_api_timeout")]
    pub cluster_api: u64,
    #[serde(default = "default_sql_timeout")]
    pub sql: u64,
    #[serde(default = "default_command_timeout")]
    pub command: u64,
}

fn default_reachability_timeout() -> u64 {
    2000
}
fn default_connect_timeout() -> u64 {
    3000
}
fn default_cluster_api_timeout() -> u64 {
    30000
}
fn default_sql_timeout() -> u64 {
    15000
}
fn default_command_timeout() -> u64 {
    120000
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        DEFAULT_TIMEOUTS
    }
}

/// Default probe timeouts
pub const DEFAULT_TIMEOUTS: ProbeTimeouts = ProbeTimeouts {
    reachability: 2000, // 2s
    connect: 3000,      // 3s
    cluster_api: 30000, // 30s
    sql: 15000,         // 15s
    command: 120000,    // 2min
};

impl ProbeTimeouts {
    pub fn millis(&self, class: TimeoutClass) -> u64 {
        match class {
            TimeoutClass::Reachability => self.reachability,
            TimeoutClass::Connect => self.connect,
            TimeoutClass::ClusterApi => self.cluster_api,
            TimeoutClass::Sql => self.sql,
            TimeoutClass::Command => self.command,
        }
    }
}

/// Timeout error
#[derive(Debug, Error)]
#[error("Operation timed out after {timeout_ms}ms")]
pub struct TimeoutError {
    pub timeout_ms: u64,
}

/// Cancellation error
#[derive(Debug, Error)]
#[error("Operation aborted")]
pub struct AbortError;

/// Timeout or cancellation
#[derive(Debug, Error)]
pub enum TimeoutOrAbortError {
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
    #[error("{0}")]
    Abort(#[from] AbortError),
}

impl From<TimeoutOrAbortError> for ProbeError {
    fn from(err: TimeoutOrAbortError) -> Self {
        match err {
            TimeoutOrAbortError::Timeout(t) => ProbeError::Timeout(Duration::from_millis(t.timeout_ms)),
            TimeoutOrAbortError::Abort(_) => ProbeError::Cancelled,
        }
    }
}

/// Run a future with a timeout, giving up early if the token is cancelled
pub async fn with_timeout_and_cancel<T, F>(
    future: F,
    timeout_ms: u64,
    cancel_token: &CancellationToken,
) -> Result<T, TimeoutOrAbortError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        result = timeout(Duration::from_millis(timeout_ms), future) => {
            match result {
                Ok(value) => Ok(value),
                Err(_) => Err(TimeoutOrAbortError::Timeout(TimeoutError { timeout_ms })),
            }
        }
        _ = cancel_token.cancelled() => {
            Err(TimeoutOrAbortError::Abort(AbortError))
        }
    }
}

/// Bound a probe: flatten timeout, cancellation and the probe's own error
pub async fn bounded_probe<T, F>(
    future: F,
    timeout_ms: u64,
    cancel_token: &CancellationToken,
) -> Result<T, ProbeError>
where
    F: Future<Output = Result<T, ProbeError>>,
{
    if cancel_token.is_cancelled() {
        return Err(ProbeError::Cancelled);
    }
    with_timeout_and_cancel(future, timeout_ms, cancel_token).await?
}
