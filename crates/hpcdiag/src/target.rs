//! Probe target and verbosity
//!
//! Everything a check module needs to know about the invocation. Built once
//! from the command line and never mutated afterwards.

use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ProbeError;

/// Default look-back window for job, node and metric history
pub const DEFAULT_DAYS_BACK: u32 = 7;

/// Default destination of the metric history export
pub const DEFAULT_METRIC_OUTPUT: &str = "MetricValueHistory.csv";

/// Default transcript file for `-ExportToFile`
pub const DEFAULT_REPORT_FILE: &str = "report.log";

/// Ports HPC Pack nodes listen on, tested by `-TestHpcNodePorts` and
/// opened by the network repair step
pub const HPC_NODE_PORTS: [u16; 22] = [
    80, 443, 1856, 5800, 5801, 5802, 5969, 5970, 5974, 5999, 6729, 6730, 7997, 8677, 8938,
    8939, 8940, 9087, 9090, 9091, 9092, 9794,
];

/// How much a check prints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerbosityMode {
    /// Summaries only
    #[default]
    Concise,
    /// Summaries plus expanded tables and statistics
    Verbose,
    /// Reference commands only, nothing is probed
    TipsOnly,
}

impl VerbosityMode {
    pub fn is_verbose(&self) -> bool {
        matches!(self, Self::Verbose)
    }

    pub fn is_tips_only(&self) -> bool {
        matches!(self, Self::TipsOnly)
    }
}

/// Ports requested on the command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSelection {
    List(Vec<u16>),
    /// Inclusive range
    Range { start: u16, end: u16 },
}

impl PortSelection {
    /// Expand to the ordered list of ports to probe
    pub fn expand(&self) -> Vec<u16> {
        match self {
            PortSelection::List(ports) => ports.clone(),
            PortSelection::Range { start, end } => (*start..=*end).collect(),
        }
    }

    /// Parse `"9000-9010"` into a range
    pub fn parse_range(s: &str) -> Result<Self, ProbeError> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| ProbeError::validation(format!("port range '{}' must look like 9000-9010", s)))?;
        let start: u16 = a
            .trim()
            .parse()
            .map_err(|_| ProbeError::validation(format!("invalid port '{}'", a.trim())))?;
        let end: u16 = b
            .trim()
            .parse()
            .map_err(|_| ProbeError::validation(format!("invalid port '{}'", b.trim())))?;
        if start > end {
            return Err(ProbeError::validation(format!(
                "port range start {} is greater than end {}",
                start, end
            )));
        }
        Ok(PortSelection::Range { start, end })
    }
}

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Local>,
    pub end: DateTime<Local>,
}

impl DateRange {
    /// Build a range, rejecting `start > end`
    pub fn new(start: DateTime<Local>, end: DateTime<Local>) -> Result<Self, ProbeError> {
        if start > end {
            return Err(ProbeError::validation(format!(
                "metric start date {} is after end date {}",
                start.format("%Y-%m-%d %H:%M:%S"),
                end.format("%Y-%m-%d %H:%M:%S")
            )));
        }
        Ok(Self { start, end })
    }
}

/// Explicit client certificate selection for the communication test
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCertOverride {
    pub thumbprint: Option<String>,
    pub pfx_path: Option<PathBuf>,
    pub pfx_password: Option<String>,
}

impl ClientCertOverride {
    pub fn is_set(&self) -> bool {
        self.thumbprint.is_some() || self.pfx_path.is_some()
    }
}

/// What to probe, assembled once per invocation
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    /// Scheduler (head node) host name
    pub scheduler: String,
    pub ports: Option<PortSelection>,
    /// Raw metric window as given; validated by the metric export
    pub metric_start: Option<DateTime<Local>>,
    pub metric_end: Option<DateTime<Local>>,
    pub job_id: Option<u32>,
    pub node_name: Option<String>,
    pub days_back: u32,
    pub metric_output_path: PathBuf,
    pub client_cert: ClientCertOverride,
    pub fix_network_issues: bool,
    pub test_node_ports: bool,
    /// Skip confirmation prompts
    pub force: bool,
}

impl ProbeTarget {
    pub fn new(scheduler: impl Into<String>) -> Self {
        Self {
            scheduler: scheduler.into(),
            ports: None,
            metric_start: None,
            metric_end: None,
            job_id: None,
            node_name: None,
            days_back: DEFAULT_DAYS_BACK,
            metric_output_path: PathBuf::from(DEFAULT_METRIC_OUTPUT),
            client_cert: ClientCertOverride::default(),
            fix_network_issues: false,
            test_node_ports: false,
            force: false,
        }
    }

    pub fn with_ports(mut self, ports: PortSelection) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn with_job_id(mut self, job_id: u32) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_node_name(mut self, node: impl Into<String>) -> Self {
        self.node_name = Some(node.into());
        self
    }

    pub fn with_days_back(mut self, days: u32) -> Self {
        self.days_back = days;
        self
    }

    pub fn with_metric_window(
        mut self,
        start: Option<DateTime<Local>>,
        end: Option<DateTime<Local>>,
    ) -> Self {
        self.metric_start = start;
        self.metric_end = end;
        self
    }

    pub fn with_metric_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.metric_output_path = path.into();
        self
    }

    pub fn with_client_cert(mut self, cert: ClientCertOverride) -> Self {
        self.client_cert = cert;
        self
    }

    /// Ports for the port test: explicit selection, else the HPC port set
    pub fn requested_ports(&self) -> Vec<u16> {
        match &self.ports {
            Some(selection) => selection.expand(),
            None => HPC_NODE_PORTS.to_vec(),
        }
    }

    /// Metric window with defaults filled in (last 7 days ending now)
    pub fn metric_window(&self, now: DateTime<Local>) -> Result<DateRange, ProbeError> {
        let end = self.metric_end.unwrap_or(now);
        let start = self
            .metric_start
            .unwrap_or_else(|| end - ChronoDuration::days(i64::from(DEFAULT_DAYS_BACK)));
        DateRange::new(start, end)
    }

    /// Start of the `-DaysBack` window ending at `now`
    pub fn days_back_since(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ProbeError> {
        ChronoDuration::try_days(i64::from(self.days_back))
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                ProbeError::validation(format!(
                    "-DaysBack {} reaches before the earliest representable date",
                    self.days_back
                ))
            })
    }
}

/// `"HEAD01.contoso.com"` -> `"head01"`
pub fn short_host_name(host: &str) -> String {
    host.split('.').next().unwrap_or(host).to_ascii_lowercase()
}
