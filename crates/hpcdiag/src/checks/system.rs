//! Local host checks: system summary and HPC service state

use async_trait::async_trait;

use super::{CheckContext, CheckModule, Tip};
use crate::adapters::{ServiceInfo, ServiceState, StartMode};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::CheckResult;
use crate::timeout::TimeoutClass;

/// Service name fragments that identify HPC Pack services
pub const HPC_SERVICE_PATTERNS: [&str; 13] = [
    "HpcScheduler",
    "HpcManagement",
    "HpcNodeManager",
    "HpcBroker",
    "HpcReporting",
    "HpcSession",
    "HpcMonitoring",
    "HpcNaming",
    "HpcSoa",
    "HpcWebService",
    "HpcFrontend",
    "HpcDiagnostics",
    "MSSQL",
];

/// `93784` -> `"1d 2h 3m"`
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else {
        format!("{}h {}m", hours, minutes)
    }
}

pub struct SystemInfoCheck;

#[async_trait]
impl CheckModule for SystemInfoCheck {
    fn mode(&self) -> RunMode {
        RunMode::SystemInfo
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("systeminfo", "Operating system, memory and hotfix summary"),
            Tip::new(
                "Get-CimInstance Win32_OperatingSystem | Select Caption,Version,LastBootUpTime",
                "OS version and last boot time",
            ),
            Tip::new(
                "Get-ItemProperty HKLM:\\SOFTWARE\\Microsoft\\HPC | Select InstalledRole",
                "HPC Pack role installed on this machine",
            ),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let host = ctx
            .try_probe(TimeoutClass::Command, ctx.adapters.host.host_summary())
            .await?;

        ctx.emit(CheckResult::ok("Host name", &host.hostname));
        ctx.emit(CheckResult::ok(
            "Operating system",
            format!("{} {}", host.os_type, host.os_release),
        ));
        let cpu = match host.cpu_speed_mhz {
            Some(mhz) => format!("{} cores @ {} MHz", host.cpu_count, mhz),
            None => format!("{} cores", host.cpu_count),
        };
        ctx.emit(CheckResult::ok("CPU", cpu));
        ctx.emit(
            CheckResult::ok(
                "Memory",
                format!(
                    "{} MB available of {} MB",
                    host.memory_available_mb, host.memory_total_mb
                ),
            )
            .with_metric(host.memory_available_mb as f64),
        );
        match host.uptime_secs {
            Some(secs) => ctx.emit(CheckResult::ok("Uptime", format_uptime(secs))),
            None => ctx.emit(CheckResult::unknown("Uptime", "not reported")),
        }

        if let Some([one, five, fifteen]) = host.load_average {
            ctx.emit_verbose(CheckResult::ok(
                "Load average",
                format!("{:.2} {:.2} {:.2}", one, five, fifteen),
            ));
        }
        ctx.emit_verbose(CheckResult::ok(
            "Swap",
            format!("{} MB free of {} MB", host.swap_free_mb, host.swap_total_mb),
        ));

        if let Some(config) = ctx
            .probe(
                "HPC role",
                TimeoutClass::Command,
                ctx.adapters.config.read_cluster_config(),
            )
            .await
        {
            match config.installed_role {
                Some(role) => ctx.emit(CheckResult::ok("HPC role", role)),
                None => ctx.emit(CheckResult::warn("HPC role", "HPC Pack is not installed")),
            }
        }
        Ok(())
    }
}

// ============================================================================

/// Running and stopped counts plus start-mode buckets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceTally {
    pub running: usize,
    pub stopped: usize,
    pub other_state: usize,
    pub auto: usize,
    pub manual: usize,
    pub disabled: usize,
    pub other_mode: usize,
}

impl ServiceTally {
    pub fn of(services: &[ServiceInfo]) -> Self {
        services.iter().fold(Self::default(), |mut t, s| {
            match s.state {
                ServiceState::Running => t.running += 1,
                ServiceState::Stopped => t.stopped += 1,
                ServiceState::Other => t.other_state += 1,
            }
            match s.start_mode {
                StartMode::Auto => t.auto += 1,
                StartMode::Manual => t.manual += 1,
                StartMode::Disabled => t.disabled += 1,
                StartMode::Other => t.other_mode += 1,
            }
            t
        })
    }
}

pub fn is_hpc_service(service: &ServiceInfo) -> bool {
    let name = service.name.to_ascii_lowercase();
    HPC_SERVICE_PATTERNS
        .iter()
        .any(|p| name.contains(&p.to_ascii_lowercase()))
}

pub struct ServicesStatusCheck;

#[async_trait]
impl CheckModule for ServicesStatusCheck {
    fn mode(&self) -> RunMode {
        RunMode::ServicesStatus
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new(
                "Get-Service Hpc*,MSSQL* | Sort Status | Format-Table Name,Status,StartType",
                "State of every HPC Pack and SQL service",
            ),
            Tip::new("Restart-Service HpcScheduler", "Restart the scheduler service"),
            Tip::new("sc.exe qc HpcScheduler", "Service account and start type"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let services = ctx
            .try_probe(TimeoutClass::Command, ctx.adapters.services.list_services())
            .await?;
        let mut hpc: Vec<ServiceInfo> = services.into_iter().filter(is_hpc_service).collect();
        hpc.sort_by(|a, b| a.name.cmp(&b.name));

        if hpc.is_empty() {
            ctx.emit(CheckResult::warn("HPC services", "no HPC services found"));
            return Ok(());
        }

        let tally = ServiceTally::of(&hpc);
        ctx.emit(CheckResult::ok(
            "HPC services",
            format!(
                "{} found: {} running, {} stopped, {} other",
                hpc.len(),
                tally.running,
                tally.stopped,
                tally.other_state
            ),
        ));
        ctx.note(format!(
            "Start mode: {} auto, {} manual, {} disabled, {} other",
            tally.auto, tally.manual, tally.disabled, tally.other_mode
        ));

        for service in hpc
            .iter()
            .filter(|s| s.start_mode == StartMode::Auto && s.state != ServiceState::Running)
        {
            ctx.emit(CheckResult::warn(
                &service.name,
                format!("set to start automatically but is {:?}", service.state),
            ));
        }

        let rows: Vec<Vec<String>> = hpc
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.display_name.clone(),
                    format!("{:?}", s.state),
                    format!("{:?}", s.start_mode),
                ]
            })
            .collect();
        ctx.verbose_table(&["Name", "Display name", "State", "Start mode"], &rows);
        Ok(())
    }
}
