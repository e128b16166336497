//! Probe adapters
//!
//! Thin async interfaces to everything outside the process: the network stack,
//! the cluster management API, certificate stores, SQL, performance counters,
//! the local cluster configuration, services, processes and HTTPS.
//!
//! Check modules only see these traits. `system` holds the implementations used
//! by the binary; `Unavailable` stands in for any adapter that cannot be built
//! on the current host, so a missing collaborator degrades one check instead of
//! aborting the run.

mod model;
pub mod system;
mod unavailable;

pub use model::*;
pub use unavailable::Unavailable;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ProbeError;

pub type ProbeResult<T> = Result<T, ProbeError>;

#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// Default gateway, IPv4 preferred, IPv6 as fallback
    async fn default_gateway(&self) -> ProbeResult<IpAddr>;

    async fn ping(&self, host: &str) -> ProbeResult<PingReply>;

    async fn resolve_dns(&self, name: &str) -> ProbeResult<Vec<IpAddr>>;

    /// `Ok(true)` when the port accepted a connection, `Ok(false)` when refused
    async fn test_tcp_port(&self, host: &str, port: u16) -> ProbeResult<bool>;

    async fn open_inbound_port(&self, port: u16) -> ProbeResult<()>;

    async fn reset_stack(&self) -> ProbeResult<String>;

    async fn flush_dns(&self) -> ProbeResult<String>;
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn list_nodes(&self) -> ProbeResult<Vec<ClusterNode>>;

    async fn list_jobs(&self, query: JobQuery) -> ProbeResult<Vec<JobSummary>>;

    async fn get_job(&self, job_id: u32) -> ProbeResult<JobSummary>;

    async fn list_tasks(&self, job_id: u32) -> ProbeResult<Vec<JobTask>>;

    async fn list_metrics(&self) -> ProbeResult<Vec<MetricInfo>>;

    async fn get_metric_value(&self, metric: &str) -> ProbeResult<Vec<MetricValue>>;

    async fn get_metric_value_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProbeResult<Vec<MetricSample>>;

    async fn get_cluster_overview(&self) -> ProbeResult<ClusterOverview>;

    async fn get_cluster_properties(&self) -> ProbeResult<Vec<ClusterProperty>>;

    async fn get_node_templates(&self) -> ProbeResult<Vec<NodeTemplate>>;

    async fn get_groups(&self) -> ProbeResult<Vec<NodeGroup>>;

    async fn get_node_state_history(
        &self,
        node: Option<&str>,
        since: DateTime<Utc>,
    ) -> ProbeResult<Vec<NodeStateChange>>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_by_subject_substring(
        &self,
        store: CertStoreLocation,
        pattern: &str,
    ) -> ProbeResult<Vec<CertificateInfo>>;

    async fn find_by_thumbprint(
        &self,
        store: CertStoreLocation,
        thumbprint: &str,
    ) -> ProbeResult<Option<CertificateInfo>>;

    async fn load_pfx(&self, path: &Path, password: Option<&str>) -> ProbeResult<ClientCredential>;

    /// Certificate and private key material for a certificate found in a store
    async fn export_credential(&self, cert: &CertificateInfo) -> ProbeResult<ClientCredential>;
}

#[async_trait]
pub trait SqlProbe: Send + Sync {
    async fn connect(&self, connection_string: &str, trust: TrustPolicy) -> ProbeResult<SqlConnection>;

    /// Run a query returning one row of two columns
    async fn query_scalar_pair(&self, conn: &SqlConnection, query: &str) -> ProbeResult<(String, String)>;
}

#[async_trait]
pub trait PerfCounterAdapter: Send + Sync {
    async fn sample_cpu_percent(&self) -> ProbeResult<f64>;

    async fn sample_available_memory_mb(&self) -> ProbeResult<u64>;

    async fn sample_network_bytes_per_sec(&self) -> ProbeResult<f64>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn read_cluster_config(&self) -> ProbeResult<ClusterConfig>;
}

#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn list_services(&self) -> ProbeResult<Vec<ServiceInfo>>;
}

#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn host_summary(&self) -> ProbeResult<HostSummary>;
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Resolve a program name or path to an executable, if present
    async fn locate(&self, program: &str) -> Option<PathBuf>;

    async fn run(&self, program: &Path, args: &[String]) -> ProbeResult<CommandOutput>;
}

#[async_trait]
pub trait HttpsProbe: Send + Sync {
    /// GET `url`, presenting `credential` when given, validating the server
    /// certificate according to `trust` for this request only
    async fn get(
        &self,
        url: &str,
        credential: Option<&ClientCredential>,
        trust: TrustPolicy,
    ) -> ProbeResult<HttpsResponse>;
}

/// The full set of adapters handed to check modules
#[derive(Clone)]
pub struct Adapters {
    pub network: Arc<dyn NetworkAdapter>,
    pub cluster: Arc<dyn ClusterApi>,
    pub certificates: Arc<dyn CertificateStore>,
    pub sql: Arc<dyn SqlProbe>,
    pub perf: Arc<dyn PerfCounterAdapter>,
    pub config: Arc<dyn ConfigStore>,
    pub services: Arc<dyn ServiceManager>,
    pub host: Arc<dyn HostProbe>,
    pub process: Arc<dyn ProcessRunner>,
    pub https: Arc<dyn HttpsProbe>,
}

impl Default for Adapters {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl Adapters {
    /// Every adapter reports itself unavailable
    pub fn unavailable() -> Self {
        let none = Arc::new(Unavailable);
        Self {
            network: none.clone(),
            cluster: none.clone(),
            certificates: none.clone(),
            sql: none.clone(),
            perf: none.clone(),
            config: none.clone(),
            services: none.clone(),
            host: none.clone(),
            process: none.clone(),
            https: none,
        }
    }

    pub fn with_network(mut self, adapter: Arc<dyn NetworkAdapter>) -> Self {
        self.network = adapter;
        self
    }

    pub fn with_cluster(mut self, adapter: Arc<dyn ClusterApi>) -> Self {
        self.cluster = adapter;
        self
    }

    pub fn with_certificates(mut self, adapter: Arc<dyn CertificateStore>) -> Self {
        self.certificates = adapter;
        self
    }

    pub fn with_sql(mut self, adapter: Arc<dyn SqlProbe>) -> Self {
        self.sql = adapter;
        self
    }

    pub fn with_perf(mut self, adapter: Arc<dyn PerfCounterAdapter>) -> Self {
        self.perf = adapter;
        self
    }

    pub fn with_config(mut self, adapter: Arc<dyn ConfigStore>) -> Self {
        self.config = adapter;
        self
    }

    pub fn with_services(mut self, adapter: Arc<dyn ServiceManager>) -> Self {
        self.services = adapter;
        self
    }

    pub fn with_host(mut self, adapter: Arc<dyn HostProbe>) -> Self {
        self.host = adapter;
        self
    }

    pub fn with_process(mut self, adapter: Arc<dyn ProcessRunner>) -> Self {
        self.process = adapter;
        self
    }

    pub fn with_https(mut self, adapter: Arc<dyn HttpsProbe>) -> Self {
        self.https = adapter;
        self
    }
}
