//! Run Mode Registry
//!
//! The static catalog of every dispatchable mode. Listings and help text are
//! generated from it, and `verify` checks it against the registered check
//! modules once at startup.

use serde::Serialize;
use std::collections::HashMap;

use crate::checks::CheckModule;
use crate::error::RegistryError;
use crate::mode::RunMode;

/// Where a mode comes from, used to group listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Core,
    Network,
    Cluster,
    Jobs,
    Metrics,
    Security,
    Health,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Core => "core",
            SourceTag::Network => "network",
            SourceTag::Cluster => "cluster",
            SourceTag::Jobs => "jobs",
            SourceTag::Metrics => "metrics",
            SourceTag::Security => "security",
            SourceTag::Health => "health",
        }
    }
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunModeDescriptor {
    pub mode: RunMode,
    pub name: &'static str,
    pub description: &'static str,
    pub source_tag: SourceTag,
}

impl RunModeDescriptor {
    const fn new(mode: RunMode, name: &'static str, description: &'static str, source_tag: SourceTag) -> Self {
        Self {
            mode,
            name,
            description,
            source_tag,
        }
    }
}

const BUILTIN_DESCRIPTORS: &[RunModeDescriptor] = &[
    RunModeDescriptor::new(RunMode::All, "All", "Run every check in a fixed order", SourceTag::Core),
    RunModeDescriptor::new(RunMode::ListModules, "ListModules", "List the available run modes", SourceTag::Core),
    RunModeDescriptor::new(
        RunMode::SystemInfo,
        "SystemInfo",
        "Host name, OS, CPU, memory, uptime and HPC role",
        SourceTag::Core,
    ),
    RunModeDescriptor::new(
        RunMode::ServicesStatus,
        "ServicesStatus",
        "State and start mode of the HPC Pack and SQL services",
        SourceTag::Core,
    ),
    RunModeDescriptor::new(
        RunMode::SqlTrace,
        "SQLTrace",
        "SQL instance, connectivity, edition and trace guidance",
        SourceTag::Core,
    ),
    RunModeDescriptor::new(
        RunMode::NetworkFix,
        "NetworkFix",
        "Gateway, DNS and optional network repair",
        SourceTag::Network,
    ),
    RunModeDescriptor::new(
        RunMode::PortTest,
        "PortTest",
        "TCP connect test per port against the scheduler",
        SourceTag::Network,
    ),
    RunModeDescriptor::new(
        RunMode::CommandTest,
        "CommandTest",
        "Smoke test of the cluster management API",
        SourceTag::Cluster,
    ),
    RunModeDescriptor::new(
        RunMode::NodeValidation,
        "NodeValidation",
        "Node state, health and role counts",
        SourceTag::Cluster,
    ),
    RunModeDescriptor::new(
        RunMode::ClusterMetadata,
        "ClusterMetadata",
        "Cluster overview, properties and node groups",
        SourceTag::Cluster,
    ),
    RunModeDescriptor::new(
        RunMode::NodeTemplates,
        "NodeTemplates",
        "Node templates and the nodes using them",
        SourceTag::Cluster,
    ),
    RunModeDescriptor::new(
        RunMode::JobHistory,
        "JobHistory",
        "Recent jobs with a state histogram",
        SourceTag::Jobs,
    ),
    RunModeDescriptor::new(
        RunMode::JobDetails,
        "JobDetails",
        "One job and its tasks (needs -JobId)",
        SourceTag::Jobs,
    ),
    RunModeDescriptor::new(
        RunMode::NodeHistory,
        "NodeHistory",
        "Node state changes over the last days",
        SourceTag::Jobs,
    ),
    RunModeDescriptor::new(
        RunMode::ClusterMetrics,
        "ClusterMetrics",
        "Metrics and their current values",
        SourceTag::Metrics,
    ),
    RunModeDescriptor::new(
        RunMode::MetricValueHistory,
        "MetricValueHistory",
        "Export metric history to CSV",
        SourceTag::Metrics,
    ),
    RunModeDescriptor::new(
        RunMode::ClusterTopology,
        "ClusterTopology",
        "Nodes grouped by role",
        SourceTag::Cluster,
    ),
    RunModeDescriptor::new(
        RunMode::DiagnosticTests,
        "DiagnosticTests",
        "Certificate self-test and client certificate validity",
        SourceTag::Security,
    ),
    RunModeDescriptor::new(
        RunMode::NodeConfig,
        "NodeConfig",
        "Local cluster configuration and its certificate",
        SourceTag::Security,
    ),
    RunModeDescriptor::new(
        RunMode::CommunicationTest,
        "CommunicationTest",
        "HTTPS call to the naming service with the node certificate",
        SourceTag::Security,
    ),
    RunModeDescriptor::new(
        RunMode::AdvancedHealth,
        "AdvancedHealth",
        "Resource pressure, node reachability and recommendations",
        SourceTag::Health,
    ),
];

/// Ordered catalog of run modes
#[derive(Debug, Clone)]
pub struct RunModeRegistry {
    descriptors: Vec<RunModeDescriptor>,
}

impl RunModeRegistry {
    pub fn builtin() -> Self {
        Self::from_descriptors(BUILTIN_DESCRIPTORS.to_vec())
    }

    pub fn from_descriptors(descriptors: Vec<RunModeDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn list_modes(&self) -> &[RunModeDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, mode: RunMode) -> Option<&RunModeDescriptor> {
        self.descriptors.iter().find(|d| d.mode == mode)
    }

    /// Every mode has exactly one descriptor; every check mode has exactly
    /// one handler.
    pub fn verify(&self, handlers: &[Box<dyn CheckModule>]) -> Result<(), RegistryError> {
        let mut described: HashMap<RunMode, usize> = HashMap::new();
        for d in &self.descriptors {
            *described.entry(d.mode).or_default() += 1;
        }
        let mut handled: HashMap<RunMode, usize> = HashMap::new();
        for h in handlers {
            *handled.entry(h.mode()).or_default() += 1;
        }

        for mode in RunMode::VARIANTS {
            match described.get(&mode).copied().unwrap_or(0) {
                0 => return Err(RegistryError::MissingDescriptor(mode)),
                1 => {}
                _ => return Err(RegistryError::DuplicateDescriptor(mode)),
            }
            if !mode.is_check() {
                continue;
            }
            match handled.get(&mode).copied().unwrap_or(0) {
                0 => return Err(RegistryError::MissingHandler(mode)),
                1 => {}
                _ => return Err(RegistryError::DuplicateHandler(mode)),
            }
        }
        Ok(())
    }
}

impl Default for RunModeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
