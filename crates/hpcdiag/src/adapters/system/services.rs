//! Service inventory
//!
//! `systemctl` on Linux, `Win32_Service` through PowerShell on Windows.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

use crate::adapters::{ProbeResult, ServiceInfo, ServiceManager, ServiceState, StartMode};
use crate::error::ProbeError;

/// One line of `systemctl list-units --plain --no-legend`:
/// `unit load active sub description...`
pub fn parse_unit_line(line: &str) -> Option<(String, ServiceState, String)> {
    let mut fields = line.split_whitespace();
    let unit = fields.next()?;
    let name = unit.strip_suffix(".service")?;
    let _load = fields.next()?;
    let _active = fields.next()?;
    let state = match fields.next()? {
        "running" => ServiceState::Running,
        "dead" | "exited" | "failed" => ServiceState::Stopped,
        _ => ServiceState::Other,
    };
    let description = fields.collect::<Vec<_>>().join(" ");
    Some((name.to_string(), state, description))
}

/// One line of `systemctl list-unit-files --no-legend`: `unit state [preset]`
pub fn parse_unit_file_line(line: &str) -> Option<(String, StartMode)> {
    let mut fields = line.split_whitespace();
    let name = fields.next()?.strip_suffix(".service")?;
    let mode = match fields.next()? {
        "enabled" | "enabled-runtime" => StartMode::Auto,
        "disabled" | "masked" | "masked-runtime" => StartMode::Disabled,
        "static" | "indirect" | "generated" | "linked" => StartMode::Manual,
        _ => StartMode::Other,
    };
    Some((name.to_string(), mode))
}

pub fn merge_systemd(units: &str, unit_files: &str) -> Vec<ServiceInfo> {
    let modes: HashMap<String, StartMode> = unit_files.lines().filter_map(parse_unit_file_line).collect();
    let mut services: Vec<ServiceInfo> = units
        .lines()
        .filter_map(parse_unit_line)
        .map(|(name, state, description)| ServiceInfo {
            start_mode: modes.get(&name).copied().unwrap_or(StartMode::Other),
            display_name: if description.is_empty() {
                name.clone()
            } else {
                description
            },
            name,
            state,
        })
        .collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    services
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Win32Service {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    state: ServiceState,
    start_mode: StartMode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<Win32Service>),
    One(Win32Service),
}

/// `ConvertTo-Json` output of `Win32_Service` rows
pub fn parse_win32_services(json: &str) -> ProbeResult<Vec<ServiceInfo>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let rows = match serde_json::from_str::<OneOrMany>(json)
        .map_err(|e| ProbeError::failed(format!("unexpected service listing: {}", e)))?
    {
        OneOrMany::Many(rows) => rows,
        OneOrMany::One(row) => vec![row],
    };
    Ok(rows
        .into_iter()
        .map(|s| ServiceInfo {
            display_name: s.display_name.unwrap_or_else(|| s.name.clone()),
            name: s.name,
            state: s.state,
            start_mode: s.start_mode,
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemServices;

#[async_trait]
impl ServiceManager for SystemServices {
    #[cfg(windows)]
    async fn list_services(&self) -> ProbeResult<Vec<ServiceInfo>> {
        let json = super::powershell(
            "Get-CimInstance Win32_Service | Select-Object Name,DisplayName,State,StartMode | ConvertTo-Json -Compress",
        )
        .await?;
        parse_win32_services(&json)
    }

    #[cfg(not(windows))]
    async fn list_services(&self) -> ProbeResult<Vec<ServiceInfo>> {
        let units = super::exec_checked(
            "systemctl",
            &["list-units", "--type=service", "--all", "--no-legend", "--no-pager", "--plain"],
        )
        .await?;
        let unit_files = super::exec_checked(
            "systemctl",
            &["list-unit-files", "--type=service", "--no-legend", "--no-pager"],
        )
        .await?;
        Ok(merge_systemd(&units, &unit_files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_merge_systemd() {
        let units = "hpcscheduler.service loaded active running HPC Job Scheduler\n\
                     hpcreporting.service loaded inactive dead HPC Reporting\n\
                     -.mount loaded active mounted Root Mount\n";
        let files = "hpcscheduler.service enabled enabled\nhpcreporting.service disabled enabled\n";
        let services = merge_systemd(units, files);
        assert_eq!(
            services,
            vec![
                ServiceInfo {
                    name: "hpcreporting".to_string(),
                    display_name: "HPC Reporting".to_string(),
                    state: ServiceState::Stopped,
                    start_mode: StartMode::Disabled,
                },
                ServiceInfo {
                    name: "hpcscheduler".to_string(),
                    display_name: "HPC Job Scheduler".to_string(),
                    state: ServiceState::Running,
                    start_mode: StartMode::Auto,
                },
            ]
        );
    }

    #[test]
    fn test_parse_win32_services() {
        let json = r#"[{"Name":"HpcScheduler","DisplayName":"HPC Job Scheduler Service","State":"Running","StartMode":"Auto"},
                       {"Name":"HpcBroker","DisplayName":null,"State":"Paused","StartMode":"Boot"}]"#;
        let services = parse_win32_services(json).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].state, ServiceState::Running);
        assert_eq!(services[1].display_name, "HpcBroker");
        assert_eq!(services[1].state, ServiceState::Other);
        assert_eq!(services[1].start_mode, StartMode::Other);

        let single = r#"{"Name":"HpcSdm","DisplayName":"HPC SDM Store","State":"Stopped","StartMode":"Manual"}"#;
        assert_eq!(parse_win32_services(single).unwrap()[0].start_mode, StartMode::Manual);
        assert!(parse_win32_services("").unwrap().is_empty());
    }
}
