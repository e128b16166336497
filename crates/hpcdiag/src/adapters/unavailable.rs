//! Stand-in for adapters that cannot be used on this host

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use super::*;

/// Answers every call with `ProbeError::AdapterUnavailable`
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

fn unavailable<T>(adapter: &str) -> ProbeResult<T> {
    Err(ProbeError::unavailable(format!("{} is not available on this host", adapter)))
}

#[async_trait]
impl NetworkAdapter for Unavailable {
    async fn default_gateway(&self) -> ProbeResult<IpAddr> {
        unavailable("network adapter")
    }

    async fn ping(&self, _host: &str) -> ProbeResult<PingReply> {
        unavailable("network adapter")
    }

    async fn resolve_dns(&self, _name: &str) -> ProbeResult<Vec<IpAddr>> {
        unavailable("network adapter")
    }

    async fn test_tcp_port(&self, _host: &str, _port: u16) -> ProbeResult<bool> {
        unavailable("network adapter")
    }

    async fn open_inbound_port(&self, _port: u16) -> ProbeResult<()> {
        unavailable("network adapter")
    }

    async fn reset_stack(&self) -> ProbeResult<String> {
        unavailable("network adapter")
    }

    async fn flush_dns(&self) -> ProbeResult<String> {
        unavailable("network adapter")
    }
}

#[async_trait]
impl ClusterApi for Unavailable {
    async fn list_nodes(&self) -> ProbeResult<Vec<ClusterNode>> {
        unavailable("cluster API")
    }

    async fn list_jobs(&self, _query: JobQuery) -> ProbeResult<Vec<JobSummary>> {
        unavailable("cluster API")
    }

    async fn get_job(&self, _job_id: u32) -> ProbeResult<JobSummary> {
        unavailable("cluster API")
    }

    async fn list_tasks(&self, _job_id: u32) -> ProbeResult<Vec<JobTask>> {
        unavailable("cluster API")
    }

    async fn list_metrics(&self) -> ProbeResult<Vec<MetricInfo>> {
        unavailable("cluster API")
    }

    async fn get_metric_value(&self, _metric: &str) -> ProbeResult<Vec<MetricValue>> {
        unavailable("cluster API")
    }

    async fn get_metric_value_history(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> ProbeResult<Vec<MetricSample>> {
        unavailable("cluster API")
    }

    async fn get_cluster_overview(&self) -> ProbeResult<ClusterOverview> {
        unavailable("cluster API")
    }

    async fn get_cluster_properties(&self) -> ProbeResult<Vec<ClusterProperty>> {
        unavailable("cluster API")
    }

    async fn get_node_templates(&self) -> ProbeResult<Vec<NodeTemplate>> {
        unavailable("cluster API")
    }

    async fn get_groups(&self) -> ProbeResult<Vec<NodeGroup>> {
        unavailable("cluster API")
    }

    async fn get_node_state_history(
        &self,
        _node: Option<&str>,
        _since: DateTime<Utc>,
    ) -> ProbeResult<Vec<NodeStateChange>> {
        unavailable("cluster API")
    }
}

#[async_trait]
impl CertificateStore for Unavailable {
    async fn find_by_subject_substring(
        &self,
        _store: CertStoreLocation,
        _pattern: &str,
    ) -> ProbeResult<Vec<CertificateInfo>> {
        unavailable("certificate store")
    }

    async fn find_by_thumbprint(
        &self,
        _store: CertStoreLocation,
        _thumbprint: &str,
    ) -> ProbeResult<Option<CertificateInfo>> {
        unavailable("certificate store")
    }

    async fn load_pfx(&self, _path: &Path, _password: Option<&str>) -> ProbeResult<ClientCredential> {
        unavailable("certificate store")
    }

    async fn export_credential(&self, _cert: &CertificateInfo) -> ProbeResult<ClientCredential> {
        unavailable("certificate store")
    }
}

#[async_trait]
impl SqlProbe for Unavailable {
    async fn connect(&self, _connection_string: &str, _trust: TrustPolicy) -> ProbeResult<SqlConnection> {
        unavailable("SQL client")
    }

    async fn query_scalar_pair(&self, _conn: &SqlConnection, _query: &str) -> ProbeResult<(String, String)> {
        unavailable("SQL client")
    }
}

#[async_trait]
impl PerfCounterAdapter for Unavailable {
    async fn sample_cpu_percent(&self) -> ProbeResult<f64> {
        unavailable("performance counters")
    }

    async fn sample_available_memory_mb(&self) -> ProbeResult<u64> {
        unavailable("performance counters")
    }

    async fn sample_network_bytes_per_sec(&self) -> ProbeResult<f64> {
        unavailable("performance counters")
    }
}

#[async_trait]
impl ConfigStore for Unavailable {
    async fn read_cluster_config(&self) -> ProbeResult<ClusterConfig> {
        unavailable("cluster configuration store")
    }
}

#[async_trait]
impl ServiceManager for Unavailable {
    async fn list_services(&self) -> ProbeResult<Vec<ServiceInfo>> {
        unavailable("service manager")
    }
}

#[async_trait]
impl HostProbe for Unavailable {
    async fn host_summary(&self) -> ProbeResult<HostSummary> {
        unavailable("host information")
    }
}

#[async_trait]
impl ProcessRunner for Unavailable {
    async fn locate(&self, _program: &str) -> Option<PathBuf> {
        None
    }

    async fn run(&self, _program: &Path, _args: &[String]) -> ProbeResult<CommandOutput> {
        unavailable("process runner")
    }
}

#[async_trait]
impl HttpsProbe for Unavailable {
    async fn get(
        &self,
        _url: &str,
        _credential: Option<&ClientCredential>,
        _trust: TrustPolicy,
    ) -> ProbeResult<HttpsResponse> {
        unavailable("HTTPS client")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_is_unavailable() {
        let adapters = Adapters::unavailable();
        let err = adapters.cluster.list_nodes().await.unwrap_err();
        assert!(matches!(err, ProbeError::AdapterUnavailable(_)));
        let err = adapters.network.ping("head01").await.unwrap_err();
        assert!(err.is_degraded());
        assert!(adapters.process.locate("anything").await.is_none());
    }
}
