//! Local cluster configuration
//!
//! Windows reads `HKLM\SOFTWARE\Microsoft\HPC`; other hosts read a YAML file
//! with the same three fields.

use async_trait::async_trait;
use std::path::PathBuf;
#[cfg(not(windows))]
use tracing::debug;

use crate::adapters::{ClusterConfig, ConfigStore, ProbeResult};
use crate::error::ProbeError;

#[cfg(windows)]
const HPC_KEY: &str = r"SOFTWARE\Microsoft\HPC";
#[cfg(windows)]
const HPC_SECURITY_KEY: &str = r"SOFTWARE\Microsoft\HPC\Security";

#[derive(Debug, Clone)]
pub struct LocalConfigStore {
    #[cfg_attr(windows, allow(dead_code))]
    file: PathBuf,
}

impl LocalConfigStore {
    pub fn new(file: PathBuf) -> Self {
        Self { file }
    }

    #[cfg(windows)]
    fn read(&self) -> ProbeResult<ClusterConfig> {
        use winreg::enums::HKEY_LOCAL_MACHINE;
        use winreg::RegKey;

        let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
        let hpc = hklm
            .open_subkey(HPC_KEY)
            .map_err(|e| ProbeError::unavailable(format!("HKLM\\{}: {}", HPC_KEY, e)))?;
        let connection_string = hklm
            .open_subkey(HPC_SECURITY_KEY)
            .ok()
            .and_then(|k| k.get_value::<String, _>("SchedulerDbConnectionString").ok());
        Ok(ClusterConfig {
            installed_role: hpc.get_value::<String, _>("InstalledRole").ok(),
            cert_thumbprint: hpc.get_value::<String, _>("SSLThumbprint").ok(),
            connection_string,
        })
    }

    #[cfg(not(windows))]
    fn read(&self) -> ProbeResult<ClusterConfig> {
        let content = match std::fs::read_to_string(&self.file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::unavailable(format!(
                    "no cluster configuration at {}",
                    self.file.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        debug!("reading cluster configuration from {}", self.file.display());
        if content.trim().is_empty() {
            return Ok(ClusterConfig::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| ProbeError::failed(format!("{}: {}", self.file.display(), e)))
    }
}

#[async_trait]
impl ConfigStore for LocalConfigStore {
    async fn read_cluster_config(&self) -> ProbeResult<ClusterConfig> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.read())
            .await
            .map_err(|e| ProbeError::failed(e.to_string()))?
    }
}
