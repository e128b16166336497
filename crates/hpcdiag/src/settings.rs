//! Settings
//!
//! Optional YAML file. Every field has a default, so a missing file or a
//! partial file both work. Lookup order: explicit path, `HPCDIAG_CONFIG`,
//! then `<config dir>/hpcdiag/settings.yaml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::timeout::ProbeTimeouts;

/// Environment variable naming the settings file
pub const CONFIG_ENV_VAR: &str = "HPCDIAG_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub timeouts: ProbeTimeouts,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub cluster_api: ClusterApiSettings,
    #[serde(default)]
    pub certificates: CertificateSettings,
    #[serde(default)]
    pub diagnostics: DiagnosticsSettings,
}

/// Reachability sweep tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Pings in flight at once
    #[serde(default = "default_sweep_concurrency")]
    pub concurrency: usize,
}

fn default_sweep_concurrency() -> usize {
    8
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            concurrency: default_sweep_concurrency(),
        }
    }
}

/// Cluster management REST endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterApiSettings {
    #[serde(default = "default_api_scheme")]
    pub scheme: String,
    #[serde(default = "default_api_base_path")]
    pub base_path: String,
    /// Head nodes commonly present self-signed certificates
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_api_scheme() -> String {
    "https".to_string()
}

fn default_api_base_path() -> String {
    "/hpc".to_string()
}

impl Default for ClusterApiSettings {
    fn default() -> Self {
        Self {
            scheme: default_api_scheme(),
            base_path: default_api_base_path(),
            accept_invalid_certs: false,
        }
    }
}

/// Client certificate discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateSettings {
    /// Subject substring used when no thumbprint or PFX is given
    #[serde(default = "default_subject_pattern")]
    pub subject_pattern: String,
    /// Directory backing the machine store (searched first)
    #[serde(default = "default_machine_store_dir")]
    pub machine_store_dir: PathBuf,
    /// Directory backing the user store
    #[serde(default = "default_user_store_dir")]
    pub user_store_dir: PathBuf,
    /// Days before expiry that trigger a warning
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,
}

fn default_subject_pattern() -> String {
    "HPC".to_string()
}

fn default_machine_store_dir() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ProgramData\hpcdiag\certs\LocalMachine")
    } else {
        PathBuf::from("/etc/hpcdiag/certs")
    }
}

fn default_user_store_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("hpcdiag").join("certs"))
        .unwrap_or_else(|| PathBuf::from("~/.config/hpcdiag/certs"))
}

fn default_expiry_warning_days() -> i64 {
    30
}

impl Default for CertificateSettings {
    fn default() -> Self {
        Self {
            subject_pattern: default_subject_pattern(),
            machine_store_dir: default_machine_store_dir(),
            user_store_dir: default_user_store_dir(),
            expiry_warning_days: default_expiry_warning_days(),
        }
    }
}

/// Local diagnostics tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsSettings {
    /// Certificate self-test binary, looked up on PATH when not absolute
    #[serde(default = "default_self_test_binary")]
    pub self_test_binary: String,
    #[serde(default = "default_self_test_args")]
    pub self_test_args: Vec<String>,
    /// Cluster config file read on hosts without a registry
    #[serde(default = "default_cluster_config_file")]
    pub cluster_config_file: PathBuf,
}

fn default_self_test_binary() -> String {
    "HpcDiagnosticHost".to_string()
}

fn default_self_test_args() -> Vec<String> {
    vec!["-CertificateTest".to_string()]
}

fn default_cluster_config_file() -> PathBuf {
    PathBuf::from("/etc/hpcdiag/cluster.yaml")
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            self_test_binary: default_self_test_binary(),
            self_test_args: default_self_test_args(),
            cluster_config_file: default_cluster_config_file(),
        }
    }
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("hpcdiag").join("settings.yaml"))
    }

    /// Resolve the settings path: explicit, then environment, then default
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
            .or_else(Self::default_path)
    }

    /// Load settings. A missing file yields defaults; a malformed file is an error.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = Self::resolve_path(explicit) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            if explicit.is_some() {
                anyhow::bail!("settings file not found: {}", path.display());
            }
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&content)
            .map_err(|e| anyhow::anyhow!("invalid settings file {}: {}", path.display(), e))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Settings::from_yaml("").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
timeouts:
  cluster_api: 5000
sweep:
  concurrency: 2
certificates:
  subject_pattern: "CN=HPC"
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.timeouts.cluster_api, 5000);
        assert_eq!(settings.timeouts.reachability, 2000);
        assert_eq!(settings.sweep.concurrency, 2);
        assert_eq!(settings.certificates.subject_pattern, "CN=HPC");
        assert_eq!(settings.cluster_api.base_path, "/hpc");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "cluster_api:\n  accept_invalid_certs: true\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert!(settings.cluster_api.accept_invalid_certs);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(Settings::load(Some(&path)).is_err());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "timeouts: [1, 2").unwrap();
        assert!(Settings::from_file(&path).is_err());
    }
}
