//! Adapters backed by the local host
//!
//! Each adapter talks to the operating system through files, sockets, the
//! cluster REST endpoint or a short-lived child process. `system_adapters`
//! builds the full set; an adapter whose backing client cannot be created is
//! replaced by `Unavailable` so only the checks that need it degrade.

mod certs;
mod cluster;
mod config_store;
mod https;
mod network;
mod perf;
mod process;
mod services;
mod sql;

pub use certs::FileCertificateStore;
pub use cluster::RestClusterApi;
pub use config_store::LocalConfigStore;
pub use https::ReqwestHttps;
pub use network::SystemNetwork;
pub use perf::SystemPerf;
pub use process::{SystemHost, SystemProcess};
pub use services::SystemServices;
pub use sql::SqlcmdProbe;

use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Adapters, CommandOutput, ProbeResult};
use crate::error::ProbeError;
use crate::settings::Settings;

/// Real adapters for `scheduler`
pub fn system_adapters(settings: &Settings, scheduler: &str) -> Adapters {
    let mut adapters = Adapters::unavailable()
        .with_network(Arc::new(SystemNetwork))
        .with_certificates(Arc::new(FileCertificateStore::from_settings(&settings.certificates)))
        .with_sql(Arc::new(SqlcmdProbe))
        .with_perf(Arc::new(SystemPerf))
        .with_config(Arc::new(LocalConfigStore::new(
            settings.diagnostics.cluster_config_file.clone(),
        )))
        .with_services(Arc::new(SystemServices))
        .with_host(Arc::new(SystemHost))
        .with_process(Arc::new(SystemProcess))
        .with_https(Arc::new(ReqwestHttps));

    match RestClusterApi::new(scheduler, &settings.cluster_api) {
        Ok(api) => adapters = adapters.with_cluster(Arc::new(api)),
        Err(e) => warn!("Cluster API client unavailable: {}", e),
    }
    adapters
}

/// Run a prepared command to completion, feeding `input` on stdin.
/// The child is killed if the future is dropped.
pub(crate) async fn exec(mut cmd: Command, input: Option<&[u8]>) -> ProbeResult<CommandOutput> {
    debug!("exec: {:?}", cmd.as_std());
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    if let (Some(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(bytes).await?;
    }
    let output = child.wait_with_output().await?;
    Ok(CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `program args...`, failing on a non-zero exit
pub(crate) async fn exec_checked(program: &str, args: &[&str]) -> ProbeResult<String> {
    let which = which::which(program).map_err(|_| ProbeError::unavailable(format!("{} not found on PATH", program)))?;
    let mut cmd = Command::new(which);
    cmd.args(args);
    let output = exec(cmd, None).await?;
    if output.success() {
        Ok(output.stdout)
    } else {
        Err(command_failure(program, &output))
    }
}

pub(crate) fn command_failure(program: &str, output: &CommandOutput) -> ProbeError {
    let detail = output.stderr.trim();
    let detail = if detail.is_empty() {
        output.stdout.trim()
    } else {
        detail
    };
    match output.exit_code {
        Some(code) => ProbeError::failed(format!("{} exited with {}: {}", program, code, detail)),
        None => ProbeError::failed(format!("{} was terminated: {}", program, detail)),
    }
}

/// Run a PowerShell snippet
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) async fn powershell(script: &str) -> ProbeResult<String> {
    exec_checked("powershell", &["-NoProfile", "-NonInteractive", "-Command", script]).await
}
