//! Fakes and a harness for module tests

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{AutoConfirm, CheckContext, CheckModule, ModuleOutcome};
use crate::adapters::*;
use crate::error::ProbeError;
use crate::report::{BufferSink, Reporter};
use crate::settings::Settings;
use crate::target::{ProbeTarget, VerbosityMode};

/// Counts every adapter call made through the fakes
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeNetwork {
    pub calls: CallCounter,
    pub gateway: Option<IpAddr>,
    pub open_ports: HashSet<u16>,
    pub unreachable: HashSet<String>,
    pub opened: Mutex<Vec<u16>>,
    pub resets: AtomicUsize,
}

impl FakeNetwork {
    pub fn healthy(calls: CallCounter) -> Self {
        Self {
            calls,
            gateway: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))),
            open_ports: [80, 443].into_iter().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl NetworkAdapter for FakeNetwork {
    async fn default_gateway(&self) -> ProbeResult<IpAddr> {
        self.calls.hit();
        self.gateway.ok_or_else(|| ProbeError::failed("no default route"))
    }

    async fn ping(&self, host: &str) -> ProbeResult<PingReply> {
        self.calls.hit();
        if self.unreachable.contains(host) {
            Ok(PingReply::no_reply())
        } else {
            Ok(PingReply::reply(1.5))
        }
    }

    async fn resolve_dns(&self, name: &str) -> ProbeResult<Vec<IpAddr>> {
        self.calls.hit();
        if self.unreachable.contains(name) {
            return Err(ProbeError::failed(format!("cannot resolve {}", name)));
        }
        Ok(vec![IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))])
    }

    async fn test_tcp_port(&self, host: &str, port: u16) -> ProbeResult<bool> {
        self.calls.hit();
        if self.unreachable.contains(host) {
            return Err(ProbeError::unreachable(host.to_string()));
        }
        Ok(self.open_ports.contains(&port))
    }

    async fn open_inbound_port(&self, port: u16) -> ProbeResult<()> {
        self.calls.hit();
        self.opened.lock().push(port);
        Ok(())
    }

    async fn reset_stack(&self) -> ProbeResult<String> {
        self.calls.hit();
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok("reset ok".to_string())
    }

    async fn flush_dns(&self) -> ProbeResult<String> {
        self.calls.hit();
        Ok("flushed".to_string())
    }
}

// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCluster {
    pub calls: CallCounter,
    pub nodes: Vec<ClusterNode>,
    pub jobs: Vec<JobSummary>,
    pub tasks: HashMap<u32, Vec<JobTask>>,
    pub metrics: Vec<MetricInfo>,
    pub samples: Vec<MetricSample>,
    pub history: Vec<NodeStateChange>,
    pub fail_nodes: bool,
}

pub fn node(name: &str, node_type: &str, state: NodeState, health: NodeHealth) -> ClusterNode {
    ClusterNode {
        name: name.to_string(),
        state,
        health,
        node_type: node_type.to_string(),
        cores: 16,
        memory_mb: 65536,
        template: Some("Default ComputeNode Template".to_string()),
        groups: vec!["ComputeNodes".to_string()],
    }
}

/// Fixed "now" shared by every fake so paired runs render identical times
pub static FAKE_NOW: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

pub fn job(id: u32, state: JobState, submitted_minutes_ago: i64) -> JobSummary {
    let submit = *FAKE_NOW - ChronoDuration::minutes(submitted_minutes_ago);
    JobSummary {
        id,
        name: format!("job-{}", id),
        owner: "CONTOSO\\alice".to_string(),
        state,
        submit_time: submit,
        start_time: Some(submit + ChronoDuration::seconds(10)),
        end_time: Some(submit + ChronoDuration::seconds(70)),
        priority: "Normal".to_string(),
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> ProbeResult<Vec<ClusterNode>> {
        self.calls.hit();
        if self.fail_nodes {
            return Err(ProbeError::failed("scheduler refused the connection"));
        }
        Ok(self.nodes.clone())
    }

    async fn list_jobs(&self, query: JobQuery) -> ProbeResult<Vec<JobSummary>> {
        self.calls.hit();
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.submit_time >= query.submitted_since)
            .cloned()
            .collect())
    }

    async fn get_job(&self, job_id: u32) -> ProbeResult<JobSummary> {
        self.calls.hit();
        self.jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
            .ok_or_else(|| ProbeError::failed(format!("job {} not found", job_id)))
    }

    async fn list_tasks(&self, job_id: u32) -> ProbeResult<Vec<JobTask>> {
        self.calls.hit();
        Ok(self.tasks.get(&job_id).cloned().unwrap_or_default())
    }

    async fn list_metrics(&self) -> ProbeResult<Vec<MetricInfo>> {
        self.calls.hit();
        Ok(self.metrics.clone())
    }

    async fn get_metric_value(&self, metric: &str) -> ProbeResult<Vec<MetricValue>> {
        self.calls.hit();
        Ok(vec![MetricValue {
            metric: metric.to_string(),
            node: Some("cn01".to_string()),
            instance: None,
            value: 42.0,
            time: *FAKE_NOW,
        }])
    }

    async fn get_metric_value_history(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProbeResult<Vec<MetricSample>> {
        self.calls.hit();
        Ok(self
            .samples
            .iter()
            .filter(|s| s.time >= start && s.time <= end)
            .cloned()
            .collect())
    }

    async fn get_cluster_overview(&self) -> ProbeResult<ClusterOverview> {
        self.calls.hit();
        Ok(ClusterOverview {
            cluster_name: "contoso".to_string(),
            head_node: "head01".to_string(),
            version: "6.3.8310".to_string(),
            total_nodes: self.nodes.len() as u32,
            online_nodes: self.nodes.iter().filter(|n| n.is_online()).count() as u32,
            ..Default::default()
        })
    }

    async fn get_cluster_properties(&self) -> ProbeResult<Vec<ClusterProperty>> {
        self.calls.hit();
        Ok(vec![ClusterProperty {
            name: "HeartbeatInterval".to_string(),
            value: "30".to_string(),
        }])
    }

    async fn get_node_templates(&self) -> ProbeResult<Vec<NodeTemplate>> {
        self.calls.hit();
        Ok(vec![NodeTemplate {
            name: "Default ComputeNode Template".to_string(),
            template_type: "ComputeNode".to_string(),
            description: "Default".to_string(),
            node_count: self.nodes.len() as u32,
        }])
    }

    async fn get_groups(&self) -> ProbeResult<Vec<NodeGroup>> {
        self.calls.hit();
        Ok(vec![NodeGroup {
            name: "ComputeNodes".to_string(),
            description: String::new(),
            node_count: self.nodes.len() as u32,
        }])
    }

    async fn get_node_state_history(
        &self,
        node: Option<&str>,
        since: DateTime<Utc>,
    ) -> ProbeResult<Vec<NodeStateChange>> {
        self.calls.hit();
        Ok(self
            .history
            .iter()
            .filter(|h| h.time >= since)
            .filter(|h| node.map_or(true, |n| h.node.eq_ignore_ascii_case(n)))
            .cloned()
            .collect())
    }
}

// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCerts {
    pub calls: CallCounter,
    pub machine: Vec<CertificateInfo>,
    pub user: Vec<CertificateInfo>,
}

pub fn cert(subject: &str, thumbprint: &str, has_private_key: bool, days_left: i64) -> CertificateInfo {
    CertificateInfo {
        subject: subject.to_string(),
        thumbprint: thumbprint.to_string(),
        not_after: *FAKE_NOW + ChronoDuration::days(days_left),
        has_private_key,
        store: None,
        source: PathBuf::from(format!("{}.pem", thumbprint)),
    }
}

impl FakeCerts {
    fn store(&self, store: CertStoreLocation) -> &[CertificateInfo] {
        match store {
            CertStoreLocation::LocalMachine => &self.machine,
            CertStoreLocation::CurrentUser => &self.user,
        }
    }
}

#[async_trait]
impl CertificateStore for FakeCerts {
    async fn find_by_subject_substring(
        &self,
        store: CertStoreLocation,
        pattern: &str,
    ) -> ProbeResult<Vec<CertificateInfo>> {
        self.calls.hit();
        Ok(self
            .store(store)
            .iter()
            .filter(|c| c.subject.to_lowercase().contains(&pattern.to_lowercase()))
            .map(|c| CertificateInfo {
                store: Some(store),
                ..c.clone()
            })
            .collect())
    }

    async fn find_by_thumbprint(
        &self,
        store: CertStoreLocation,
        thumbprint: &str,
    ) -> ProbeResult<Option<CertificateInfo>> {
        self.calls.hit();
        let wanted = normalize_thumbprint(thumbprint);
        Ok(self
            .store(store)
            .iter()
            .find(|c| normalize_thumbprint(&c.thumbprint) == wanted)
            .map(|c| CertificateInfo {
                store: Some(store),
                ..c.clone()
            }))
    }

    async fn load_pfx(&self, path: &Path, _password: Option<&str>) -> ProbeResult<ClientCredential> {
        self.calls.hit();
        Ok(ClientCredential {
            info: CertificateInfo {
                source: path.to_path_buf(),
                ..cert("CN=PfxClient", "FFEE", true, 365)
            },
            pem: b"pfx".to_vec(),
        })
    }

    async fn export_credential(&self, cert: &CertificateInfo) -> ProbeResult<ClientCredential> {
        self.calls.hit();
        Ok(ClientCredential {
            info: cert.clone(),
            pem: b"pem".to_vec(),
        })
    }
}

// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeHttps {
    pub calls: CallCounter,
    /// (url, presented a credential, trust)
    pub requests: Mutex<Vec<(String, bool, TrustPolicy)>>,
}

#[async_trait]
impl HttpsProbe for FakeHttps {
    async fn get(
        &self,
        url: &str,
        credential: Option<&ClientCredential>,
        trust: TrustPolicy,
    ) -> ProbeResult<HttpsResponse> {
        self.calls.hit();
        self.requests
            .lock()
            .push((url.to_string(), credential.is_some(), trust));
        Ok(HttpsResponse {
            status: 200,
            body: "SchedulerStatefulService".to_string(),
        })
    }
}

// ----------------------------------------------------------------------------

pub struct FakePerf {
    pub calls: CallCounter,
    pub cpu: f64,
    pub memory_mb: u64,
}

#[async_trait]
impl PerfCounterAdapter for FakePerf {
    async fn sample_cpu_percent(&self) -> ProbeResult<f64> {
        self.calls.hit();
        Ok(self.cpu)
    }

    async fn sample_available_memory_mb(&self) -> ProbeResult<u64> {
        self.calls.hit();
        Ok(self.memory_mb)
    }

    async fn sample_network_bytes_per_sec(&self) -> ProbeResult<f64> {
        self.calls.hit();
        Ok(125_000.0)
    }
}

pub struct FakeConfig {
    pub calls: CallCounter,
    pub config: ClusterConfig,
}

#[async_trait]
impl ConfigStore for FakeConfig {
    async fn read_cluster_config(&self) -> ProbeResult<ClusterConfig> {
        self.calls.hit();
        Ok(self.config.clone())
    }
}

pub struct FakeSql {
    pub calls: CallCounter,
    pub connected: Mutex<Vec<(String, TrustPolicy)>>,
}

#[async_trait]
impl SqlProbe for FakeSql {
    async fn connect(&self, connection_string: &str, trust: TrustPolicy) -> ProbeResult<SqlConnection> {
        self.calls.hit();
        self.connected
            .lock()
            .push((connection_string.to_string(), trust));
        Ok(SqlConnection {
            instance: "head01\\COMPUTECLUSTER".to_string(),
            connection_string: connection_string.to_string(),
            trust,
        })
    }

    async fn query_scalar_pair(&self, _conn: &SqlConnection, _query: &str) -> ProbeResult<(String, String)> {
        self.calls.hit();
        Ok(("Express Edition (64-bit)".to_string(), "15.0.2000.5".to_string()))
    }
}

pub struct FakeServices {
    pub calls: CallCounter,
    pub services: Vec<ServiceInfo>,
}

#[async_trait]
impl ServiceManager for FakeServices {
    async fn list_services(&self) -> ProbeResult<Vec<ServiceInfo>> {
        self.calls.hit();
        Ok(self.services.clone())
    }
}

pub fn service(name: &str, state: ServiceState, start_mode: StartMode) -> ServiceInfo {
    ServiceInfo {
        name: name.to_string(),
        display_name: format!("{} Service", name),
        state,
        start_mode,
    }
}

pub struct FakeHost {
    pub calls: CallCounter,
}

#[async_trait]
impl HostProbe for FakeHost {
    async fn host_summary(&self) -> ProbeResult<HostSummary> {
        self.calls.hit();
        Ok(HostSummary {
            hostname: "head01".to_string(),
            os_type: "Windows".to_string(),
            os_release: "10.0.20348".to_string(),
            cpu_count: 8,
            cpu_speed_mhz: Some(2600),
            memory_total_mb: 32768,
            memory_available_mb: 16384,
            swap_total_mb: 4096,
            swap_free_mb: 4096,
            uptime_secs: Some(3 * 86400 + 3600),
            load_average: Some([0.5, 0.4, 0.3]),
        })
    }
}

pub struct FakeProcess {
    pub calls: CallCounter,
    pub present: bool,
}

#[async_trait]
impl ProcessRunner for FakeProcess {
    async fn locate(&self, program: &str) -> Option<PathBuf> {
        self.calls.hit();
        self.present.then(|| PathBuf::from(format!("/opt/hpc/bin/{}", program)))
    }

    async fn run(&self, _program: &Path, _args: &[String]) -> ProbeResult<CommandOutput> {
        self.calls.hit();
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout: "Certificate test passed".to_string(),
            stderr: String::new(),
        })
    }
}

// ----------------------------------------------------------------------------

/// A healthy three-node cluster seen from the head node
pub fn healthy_adapters(calls: &CallCounter) -> Adapters {
    let cluster = FakeCluster {
        calls: calls.clone(),
        nodes: vec![
            node("HEAD01", "HeadNode", NodeState::Online, NodeHealth::OK),
            node("CN01", "ComputeNode", NodeState::Online, NodeHealth::OK),
            node("BN01", "BrokerNode", NodeState::Online, NodeHealth::OK),
        ],
        jobs: vec![
            job(3, JobState::Running, 5),
            job(2, JobState::Finished, 60),
            job(1, JobState::Failed, 120),
        ],
        metrics: vec![MetricInfo {
            name: "HPCCpuUsage".to_string(),
            unit: Some("%".to_string()),
            description: None,
        }],
        ..Default::default()
    };
    Adapters::unavailable()
        .with_network(Arc::new(FakeNetwork::healthy(calls.clone())))
        .with_cluster(Arc::new(cluster))
        .with_certificates(Arc::new(FakeCerts {
            calls: calls.clone(),
            machine: vec![cert("CN=HPC Pack Node Communication", "AB12", true, 200)],
            user: Vec::new(),
        }))
        .with_https(Arc::new(FakeHttps {
            calls: calls.clone(),
            ..Default::default()
        }))
        .with_perf(Arc::new(FakePerf {
            calls: calls.clone(),
            cpu: 12.0,
            memory_mb: 16384,
        }))
        .with_config(Arc::new(FakeConfig {
            calls: calls.clone(),
            config: ClusterConfig {
                installed_role: Some("HN".to_string()),
                cert_thumbprint: Some("AB12".to_string()),
                connection_string: Some(
                    "Data Source=head01\\COMPUTECLUSTER;Initial Catalog=HpcScheduler;Integrated Security=True"
                        .to_string(),
                ),
            },
        }))
        .with_sql(Arc::new(FakeSql {
            calls: calls.clone(),
            connected: Mutex::new(Vec::new()),
        }))
        .with_services(Arc::new(FakeServices {
            calls: calls.clone(),
            services: vec![
                service("HpcScheduler", ServiceState::Running, StartMode::Auto),
                service("HpcManagement", ServiceState::Running, StartMode::Auto),
                service("HpcReporting", ServiceState::Stopped, StartMode::Manual),
                service("Spooler", ServiceState::Running, StartMode::Auto),
            ],
        }))
        .with_host(Arc::new(FakeHost { calls: calls.clone() }))
        .with_process(Arc::new(FakeProcess {
            calls: calls.clone(),
            present: true,
        }))
}

/// Owns everything a `CheckContext` borrows
pub struct Harness {
    pub target: ProbeTarget,
    pub verbosity: VerbosityMode,
    pub adapters: Adapters,
    pub settings: Settings,
    pub reporter: Reporter,
    pub sink: BufferSink,
    pub cancel: CancellationToken,
    pub confirmer: AutoConfirm,
}

impl Harness {
    pub fn new(verbosity: VerbosityMode) -> Self {
        let calls = CallCounter::default();
        let (reporter, sink) = Reporter::buffered();
        Self {
            target: ProbeTarget::new("head01"),
            verbosity,
            adapters: healthy_adapters(&calls),
            settings: Settings::default(),
            reporter,
            sink,
            cancel: CancellationToken::new(),
            confirmer: AutoConfirm(true),
        }
    }

    pub fn with_target(mut self, target: ProbeTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_adapters(mut self, adapters: Adapters) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_confirm(mut self, answer: bool) -> Self {
        self.confirmer = AutoConfirm(answer);
        self
    }

    pub fn context(&self) -> CheckContext<'_> {
        CheckContext::new(
            &self.target,
            self.verbosity,
            &self.adapters,
            &self.settings,
            &self.reporter,
            &self.cancel,
            &self.confirmer,
        )
    }

    pub async fn run_module(&self, module: &dyn CheckModule) -> ModuleOutcome {
        let ctx = self.context();
        super::run_module(module, &ctx).await
    }

    pub fn lines(&self) -> Vec<String> {
        self.sink.lines()
    }

    pub fn output(&self) -> String {
        self.sink.contents()
    }
}

/// Run a module at Concise and at Verbose against identical fakes and check
/// that every concise line also appears at Verbose
pub async fn assert_concise_subset_of_verbose(
    module: &dyn CheckModule,
    build: impl Fn(VerbosityMode) -> Harness,
) {
    let concise = build(VerbosityMode::Concise);
    concise.run_module(module).await;
    let verbose = build(VerbosityMode::Verbose);
    verbose.run_module(module).await;

    let verbose_lines = verbose.lines();
    for line in concise.lines() {
        assert!(
            verbose_lines.contains(&line),
            "{}: concise line missing at verbose: {:?}",
            module.mode(),
            line
        );
    }
    assert!(verbose_lines.len() >= concise.lines().len());
}
