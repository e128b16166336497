//! Typed records returned by the probe adapters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Cluster
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    Online,
    Offline,
    Draining,
    Provisioning,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeHealth {
    #[serde(alias = "Ok")]
    OK,
    Warning,
    Error,
    Transitional,
    Unapproved,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterNode {
    pub name: String,
    pub state: NodeState,
    pub health: NodeHealth,
    /// Role string as reported by the cluster, e.g. "HeadNode,ComputeNode"
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl ClusterNode {
    pub fn is_online(&self) -> bool {
        self.state == NodeState::Online
    }

    pub fn is_healthy(&self) -> bool {
        self.health == NodeHealth::OK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobState {
    Configuring,
    Submitted,
    Validating,
    ExternalValidation,
    Queued,
    Running,
    Finishing,
    Finished,
    Failed,
    Canceling,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobSummary {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: String,
    pub state: JobState,
    pub submit_time: DateTime<Utc>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: String,
}

impl JobSummary {
    /// Seconds between submission and start
    pub fn wait_secs(&self) -> Option<i64> {
        self.start_time.map(|s| (s - self.submit_time).num_seconds())
    }

    /// Seconds between start and end
    pub fn run_secs(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => Some((e - s).num_seconds()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobTask {
    pub task_id: u32,
    #[serde(default)]
    pub name: String,
    pub state: JobState,
    #[serde(default)]
    pub command_line: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub node: Option<String>,
}

/// Job listing filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobQuery {
    pub submitted_since: DateTime<Utc>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricInfo {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricValue {
    pub metric: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    pub value: f64,
    pub time: DateTime<Utc>,
}

/// One row of metric history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricSample {
    pub time: DateTime<Utc>,
    pub counter: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub node: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterOverview {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub head_node: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub total_nodes: u32,
    #[serde(default)]
    pub online_nodes: u32,
    #[serde(default)]
    pub total_cores: u32,
    #[serde(default)]
    pub busy_cores: u32,
    #[serde(default)]
    pub queued_jobs: u32,
    #[serde(default)]
    pub running_jobs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterProperty {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeTemplate {
    pub name: String,
    #[serde(default)]
    pub template_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub node_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub node_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStateChange {
    pub node: String,
    pub time: DateTime<Utc>,
    pub from_state: NodeState,
    pub to_state: NodeState,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// Network
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingReply {
    pub reachable: bool,
    pub latency_ms: Option<f64>,
}

impl PingReply {
    pub fn reply(latency_ms: f64) -> Self {
        Self {
            reachable: true,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn no_reply() -> Self {
        Self {
            reachable: false,
            latency_ms: None,
        }
    }
}

// ============================================================================
// Certificates and TLS
// ============================================================================

/// Certificate store, searched in `SEARCH_ORDER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CertStoreLocation {
    LocalMachine,
    CurrentUser,
}

impl CertStoreLocation {
    pub const SEARCH_ORDER: [CertStoreLocation; 2] =
        [CertStoreLocation::LocalMachine, CertStoreLocation::CurrentUser];
}

impl fmt::Display for CertStoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertStoreLocation::LocalMachine => f.write_str(r"LocalMachine\My"),
            CertStoreLocation::CurrentUser => f.write_str(r"CurrentUser\My"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    /// Upper-case hex, no separators
    pub thumbprint: String,
    pub not_after: DateTime<Utc>,
    pub has_private_key: bool,
    pub store: Option<CertStoreLocation>,
    pub source: PathBuf,
}

impl CertificateInfo {
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_after <= now
    }
}

/// Normalize a thumbprint for comparison: strip separators, upper-case
pub fn normalize_thumbprint(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Certificate plus private key in PEM form
#[derive(Clone)]
pub struct ClientCredential {
    pub info: CertificateInfo,
    pub pem: Vec<u8>,
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("info", &self.info)
            .field("pem", &format_args!("<{} bytes>", self.pem.len()))
            .finish()
    }
}

/// Server certificate validation for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustPolicy {
    #[default]
    Strict,
    /// Accept any server certificate; used for a single diagnostic request only
    AcceptInvalidCerts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpsResponse {
    pub status: u16,
    pub body: String,
}

impl HttpsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ============================================================================
// SQL
// ============================================================================

/// Verified SQL endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlConnection {
    pub instance: String,
    pub connection_string: String,
    pub trust: TrustPolicy,
}

// ============================================================================
// Local host
// ============================================================================

/// Cluster settings stored on the local machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub installed_role: Option<String>,
    #[serde(default)]
    pub cert_thumbprint: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    Running,
    Stopped,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StartMode {
    Auto,
    Manual,
    Disabled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub display_name: String,
    pub state: ServiceState,
    pub start_mode: StartMode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub hostname: String,
    pub os_type: String,
    pub os_release: String,
    pub cpu_count: u32,
    pub cpu_speed_mhz: Option<u64>,
    pub memory_total_mb: u64,
    pub memory_available_mb: u64,
    pub swap_total_mb: u64,
    pub swap_free_mb: u64,
    pub uptime_secs: Option<u64>,
    pub load_average: Option<[f64; 3]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
