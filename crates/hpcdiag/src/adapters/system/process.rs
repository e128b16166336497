//! Local processes and host facts

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::process::Command;

use super::exec;
use crate::adapters::{CommandOutput, HostProbe, HostSummary, ProbeResult, ProcessRunner};
use crate::error::ProbeError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcess;

#[async_trait]
impl ProcessRunner for SystemProcess {
    async fn locate(&self, program: &str) -> Option<PathBuf> {
        let path = Path::new(program);
        if path.is_absolute() {
            return path.is_file().then(|| path.to_path_buf());
        }
        which::which(program).ok()
    }

    async fn run(&self, program: &Path, args: &[String]) -> ProbeResult<CommandOutput> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        exec(cmd, None).await
    }
}

const MIB: u64 = 1024 * 1024;

fn collect_summary() -> ProbeResult<HostSummary> {
    let hostname = System::host_name()
        .or_else(|| hostname::get().ok().map(|h| h.to_string_lossy().into_owned()))
        .ok_or_else(|| ProbeError::failed("host name is not available"))?;
    let sys = System::new_with_specifics(
        RefreshKind::new()
            .with_memory(MemoryRefreshKind::everything())
            .with_cpu(CpuRefreshKind::new().with_frequency()),
    );
    if sys.total_memory() == 0 {
        return Err(ProbeError::unavailable("memory information"));
    }
    let load = System::load_average();
    let uptime = System::uptime();
    Ok(HostSummary {
        hostname,
        os_type: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        os_release: System::os_version().or_else(System::kernel_version).unwrap_or_default(),
        cpu_count: u32::try_from(sys.cpus().len()).unwrap_or(u32::MAX),
        cpu_speed_mhz: sys.cpus().first().map(|cpu| cpu.frequency()).filter(|&mhz| mhz > 0),
        memory_total_mb: sys.total_memory() / MIB,
        memory_available_mb: sys.available_memory() / MIB,
        swap_total_mb: sys.total_swap() / MIB,
        swap_free_mb: sys.free_swap() / MIB,
        uptime_secs: (uptime > 0).then_some(uptime),
        load_average: (!cfg!(windows)).then_some([load.one, load.five, load.fifteen]),
    })
}

/// Host facts from `sysinfo`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

#[async_trait]
impl HostProbe for SystemHost {
    async fn host_summary(&self) -> ProbeResult<HostSummary> {
        tokio::task::spawn_blocking(collect_summary)
            .await
            .map_err(|e| ProbeError::failed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_summary_reports_memory() {
        let summary = SystemHost.host_summary().await.unwrap();
        assert!(!summary.hostname.is_empty());
        assert!(summary.cpu_count > 0);
        assert!(summary.memory_available_mb <= summary.memory_total_mb);
    }

    #[tokio::test]
    async fn test_locate_missing_program() {
        assert!(SystemProcess.locate("hpcdiag-no-such-binary").await.is_none());
        assert!(SystemProcess.locate("/nonexistent/HpcDiagnosticHost").await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_exit_code() {
        let sh = SystemProcess.locate("sh").await.unwrap();
        let out = SystemProcess
            .run(&sh, &["-c".to_string(), "echo ok; exit 3".to_string()])
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout.trim(), "ok");
    }
}
