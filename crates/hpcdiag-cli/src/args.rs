//! Command line
//!
//! PowerShell-style switches (`-RunMode All`, `-verbose`) are rewritten to
//! their `--kebab-case` form before clap sees them, so both spellings work.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use clap::Parser;
use hpcdiag::target::{DEFAULT_DAYS_BACK, DEFAULT_METRIC_OUTPUT, DEFAULT_REPORT_FILE};
use hpcdiag::{ClientCertOverride, DiagError, DispatchRequest, PortSelection, ProbeTarget, VerbosityMode};
use std::path::PathBuf;

/// Environment variable naming the default scheduler
pub const SCHEDULER_ENV_VAR: &str = "CCP_SCHEDULER";

const SWITCHES: &[&str] = &[
    "RunMode",
    "SchedulerNode",
    "FixNetworkIssues",
    "Force",
    "TestHpcNodePorts",
    "Port",
    "Ports",
    "PortRange",
    "JobId",
    "NodeName",
    "DaysBack",
    "ExportToFile",
    "ReportFile",
    "MetricStartDate",
    "MetricEndDate",
    "MetricOutputPath",
    "CliTips",
    "Verbose",
    "ShowHelp",
    "DeepHelp",
    "ClientCertThumbprint",
    "ClientCertPfxPath",
    "ClientCertPfxPassword",
    "Config",
];

/// `TestHpcNodePorts` -> `test-hpc-node-ports`
pub fn kebab_case(pascal: &str) -> String {
    let mut out = String::with_capacity(pascal.len() + 4);
    for (i, c) in pascal.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Rewrite known single-dash switches (any case) to `--kebab-case`.
/// `-Switch:value` is split into the switch and its value.
pub fn normalize_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    for arg in args {
        let Some(body) = arg.strip_prefix('-').filter(|b| !b.starts_with('-')) else {
            out.push(arg);
            continue;
        };
        let (name, inline) = match body.split_once(':') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };
        match SWITCHES.iter().find(|s| s.eq_ignore_ascii_case(name)) {
            Some(switch) => {
                out.push(format!("--{}", kebab_case(switch)));
                if let Some(value) = inline {
                    out.push(value.to_string());
                }
            }
            None => out.push(arg),
        }
    }
    out
}

/// `a-b`, inclusive, `a <= b`
pub fn parse_port_range(raw: &str) -> Result<PortSelection, String> {
    PortSelection::parse_range(raw).map_err(|e| e.to_string())
}

/// `2024-05-01`, `2024-05-01 13:30`, `2024-05-01T13:30:00` or RFC 3339
pub fn parse_date(raw: &str) -> Result<DateTime<Local>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Local));
    }
    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("'{}' is not a date (expected YYYY-MM-DD[ HH:MM[:SS]])", raw))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("'{}' does not exist in the local time zone", raw))
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hpcdiag", version, about = "Run-mode diagnostics for HPC Pack clusters")]
#[command(disable_help_flag = true)]
pub struct Cli {
    /// Run mode, e.g. All, PortTest, ListModules
    #[arg(value_name = "MODE")]
    pub mode: Option<String>,

    /// Scheduler (head node) host name
    #[arg(value_name = "HOST")]
    pub host: Option<String>,

    #[arg(long)]
    pub run_mode: Option<String>,

    #[arg(long)]
    pub scheduler_node: Option<String>,

    #[arg(long)]
    pub fix_network_issues: bool,

    #[arg(long)]
    pub force: bool,

    #[arg(long)]
    pub test_hpc_node_ports: bool,

    #[arg(long, conflicts_with_all = ["ports", "port_range"])]
    pub port: Option<u16>,

    #[arg(long, value_delimiter = ',', num_args = 1.., conflicts_with = "port_range")]
    pub ports: Vec<u16>,

    #[arg(long, value_parser = parse_port_range)]
    pub port_range: Option<PortSelection>,

    #[arg(long)]
    pub job_id: Option<u32>,

    #[arg(long)]
    pub node_name: Option<String>,

    #[arg(long, default_value_t = DEFAULT_DAYS_BACK)]
    pub days_back: u32,

    #[arg(long)]
    pub export_to_file: bool,

    #[arg(long, default_value = DEFAULT_REPORT_FILE)]
    pub report_file: PathBuf,

    #[arg(long, value_parser = parse_date)]
    pub metric_start_date: Option<DateTime<Local>>,

    #[arg(long, value_parser = parse_date)]
    pub metric_end_date: Option<DateTime<Local>>,

    #[arg(long, default_value = DEFAULT_METRIC_OUTPUT)]
    pub metric_output_path: PathBuf,

    /// Print reference commands instead of probing
    #[arg(long)]
    pub cli_tips: bool,

    #[arg(long)]
    pub verbose: bool,

    #[arg(long, short = 'h', alias = "help")]
    pub show_help: bool,

    #[arg(long)]
    pub deep_help: bool,

    #[arg(long)]
    pub client_cert_thumbprint: Option<String>,

    #[arg(long)]
    pub client_cert_pfx_path: Option<PathBuf>,

    #[arg(long)]
    pub client_cert_pfx_password: Option<String>,

    /// Settings file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn verbosity(&self) -> VerbosityMode {
        if self.cli_tips {
            VerbosityMode::TipsOnly
        } else if self.verbose {
            VerbosityMode::Verbose
        } else {
            VerbosityMode::Concise
        }
    }

    /// `-RunMode` and the positional mode must agree when both are given
    pub fn mode_name(&self) -> Result<Option<String>, DiagError> {
        match (&self.run_mode, &self.mode) {
            (Some(a), Some(b)) if !a.eq_ignore_ascii_case(b) => Err(DiagError::validation(format!(
                "run mode given twice: -RunMode {} and {}",
                a, b
            ))),
            (Some(m), _) | (None, Some(m)) => Ok(Some(m.clone())),
            (None, None) => Ok(None),
        }
    }

    pub fn scheduler(&self, env: Option<String>, local: impl FnOnce() -> Option<String>) -> Result<String, DiagError> {
        match (&self.scheduler_node, &self.host) {
            (Some(a), Some(b)) if !a.eq_ignore_ascii_case(b) => Err(DiagError::validation(format!(
                "scheduler given twice: -SchedulerNode {} and {}",
                a, b
            ))),
            (Some(h), _) | (None, Some(h)) => Ok(h.clone()),
            (None, None) => Ok(env
                .filter(|s| !s.trim().is_empty())
                .or_else(local)
                .unwrap_or_else(|| "localhost".to_string())),
        }
    }

    fn port_selection(&self) -> Option<PortSelection> {
        if let Some(port) = self.port {
            Some(PortSelection::List(vec![port]))
        } else if !self.ports.is_empty() {
            Some(PortSelection::List(self.ports.clone()))
        } else {
            self.port_range.clone()
        }
    }

    pub fn to_request(&self, scheduler: String) -> Result<DispatchRequest, DiagError> {
        if self.client_cert_pfx_password.is_some() && self.client_cert_pfx_path.is_none() {
            return Err(DiagError::validation("-ClientCertPfxPassword needs -ClientCertPfxPath"));
        }

        let mut target = ProbeTarget::new(scheduler)
            .with_days_back(self.days_back)
            .with_metric_window(self.metric_start_date, self.metric_end_date)
            .with_metric_output(self.metric_output_path.clone())
            .with_client_cert(ClientCertOverride {
                thumbprint: self.client_cert_thumbprint.clone(),
                pfx_path: self.client_cert_pfx_path.clone(),
                pfx_password: self.client_cert_pfx_password.clone(),
            });
        if let Some(ports) = self.port_selection() {
            target = target.with_ports(ports);
        }
        if let Some(job_id) = self.job_id {
            target = target.with_job_id(job_id);
        }
        if let Some(node) = &self.node_name {
            target = target.with_node_name(node.clone());
        }
        target.fix_network_issues = self.fix_network_issues;
        target.test_node_ports = self.test_hpc_node_ports;
        target.force = self.force;

        let mut request = DispatchRequest::new(self.mode_name()?, target).with_verbosity(self.verbosity());
        if self.export_to_file {
            request = request.with_report_file(self.report_file.clone());
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("hpcdiag".to_string()).chain(args.iter().map(|s| s.to_string()));
        Cli::try_parse_from(normalize_args(argv)).unwrap()
    }

    fn request(args: &[&str]) -> DispatchRequest {
        let cli = parse(args);
        let scheduler = cli.scheduler(None, || Some("local".to_string())).unwrap();
        cli.to_request(scheduler).unwrap()
    }

    #[test_case("RunMode", "run-mode")]
    #[test_case("TestHpcNodePorts", "test-hpc-node-ports")]
    #[test_case("ClientCertPfxPath", "client-cert-pfx-path")]
    #[test_case("Force", "force")]
    fn test_kebab_case(pascal: &str, kebab: &str) {
        assert_eq!(kebab_case(pascal), kebab);
    }

    #[test]
    fn test_normalize_args() {
        let args = ["hpcdiag", "-RunMode", "All", "-verbose", "--days-back", "3", "-Port:80", "-Unknown"]
            .map(String::from);
        assert_eq!(
            normalize_args(args),
            vec!["hpcdiag", "--run-mode", "All", "--verbose", "--days-back", "3", "--port", "80", "-Unknown"]
        );
    }

    #[test]
    fn test_powershell_and_gnu_styles_agree() {
        let ps = request(&["-RunMode", "PortTest", "-SchedulerNode", "head01", "-Ports", "80,443,9999"]);
        let gnu = request(&["--run-mode", "PortTest", "--scheduler-node", "head01", "--ports", "80,443,9999"]);
        let positional = request(&["PortTest", "head01", "-Ports", "80,443,9999"]);
        for r in [&ps, &gnu, &positional] {
            assert_eq!(r.mode.as_deref(), Some("PortTest"));
            assert_eq!(r.target.scheduler, "head01");
            assert_eq!(r.target.requested_ports(), vec![80, 443, 9999]);
        }
    }

    #[test]
    fn test_port_range() {
        let r = request(&["PortTest", "-PortRange", "40000-40002"]);
        assert_eq!(r.target.requested_ports(), vec![40000, 40001, 40002]);

        let argv = ["hpcdiag", "--port-range", "9-1"].map(String::from);
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_port_options_conflict() {
        let argv = normalize_args(["hpcdiag", "-Port", "80", "-Ports", "443"].map(String::from));
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_defaults() {
        let r = request(&[]);
        assert_eq!(r.mode, None);
        assert_eq!(r.target.scheduler, "local");
        assert_eq!(r.target.days_back, 7);
        assert_eq!(r.target.metric_output_path, PathBuf::from("MetricValueHistory.csv"));
        assert_eq!(r.verbosity, VerbosityMode::Concise);
        assert!(r.report_file.is_none());
    }

    #[test]
    fn test_report_file_only_with_export() {
        let r = request(&["All", "-ReportFile", "diag.log"]);
        assert!(r.report_file.is_none());
        let r = request(&["All", "-ExportToFile"]);
        assert_eq!(r.report_file, Some(PathBuf::from("report.log")));
    }

    #[test]
    fn test_tips_win_over_verbose() {
        assert_eq!(parse(&["All", "-Verbose", "-CliTips"]).verbosity(), VerbosityMode::TipsOnly);
        assert_eq!(parse(&["All", "-Verbose"]).verbosity(), VerbosityMode::Verbose);
    }

    #[test]
    fn test_quick_query_inputs() {
        let r = request(&["-JobId", "42", "-NodeName", "CN01"]);
        assert_eq!(r.mode, None);
        assert_eq!(r.target.job_id, Some(42));
        assert_eq!(r.target.node_name.as_deref(), Some("CN01"));
    }

    #[test]
    fn test_conflicting_modes_rejected() {
        let cli = parse(&["PortTest", "-RunMode", "All"]);
        assert!(matches!(cli.mode_name(), Err(DiagError::Validation(_))));
        let cli = parse(&["All", "-RunMode", "all"]);
        assert_eq!(cli.mode_name().unwrap().as_deref(), Some("all"));
    }

    #[test]
    fn test_scheduler_fallbacks() {
        let cli = parse(&["All"]);
        assert_eq!(cli.scheduler(Some("ccp01".into()), || None).unwrap(), "ccp01");
        assert_eq!(cli.scheduler(Some(" ".into()), || Some("me".into())).unwrap(), "me");
        assert_eq!(cli.scheduler(None, || None).unwrap(), "localhost");
    }

    #[test]
    fn test_parse_dates() {
        let day = parse_date("2024-05-01").unwrap();
        assert_eq!(day.format("%Y-%m-%d %H:%M").to_string(), "2024-05-01 00:00");
        let minute = parse_date("2024-05-01 13:30").unwrap();
        assert_eq!(minute.format("%H:%M").to_string(), "13:30");
        assert!(parse_date("2024-05-01T13:30:00Z").is_ok());
        assert!(parse_date("yesterday").is_err());
    }

    #[test]
    fn test_metric_window_passes_through() {
        let r = request(&["MetricValueHistory", "-MetricStartDate", "2024-05-02", "-MetricEndDate", "2024-05-01"]);
        // validated by the export, not by the parser
        assert!(r.target.metric_window(Local::now()).is_err());
    }

    #[test]
    fn test_pfx_password_needs_path() {
        let cli = parse(&["CommunicationTest", "-ClientCertPfxPassword", "secret"]);
        assert!(matches!(cli.to_request("h".into()), Err(DiagError::Validation(_))));
    }

    #[test]
    fn test_help_switches() {
        assert!(parse(&["-ShowHelp"]).show_help);
        assert!(parse(&["--help"]).show_help);
        assert!(parse(&["-DeepHelp"]).deep_help);
    }
}
