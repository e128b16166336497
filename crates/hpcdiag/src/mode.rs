//! Run modes
//!
//! The closed set of names the dispatcher understands. Parsing is
//! case-insensitive and accepts a few historical aliases.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DiagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RunMode {
    All,
    ListModules,
    SystemInfo,
    ServicesStatus,
    SqlTrace,
    NetworkFix,
    PortTest,
    CommandTest,
    NodeValidation,
    ClusterMetadata,
    NodeTemplates,
    JobHistory,
    JobDetails,
    NodeHistory,
    ClusterMetrics,
    MetricValueHistory,
    ClusterTopology,
    DiagnosticTests,
    NodeConfig,
    CommunicationTest,
    AdvancedHealth,
}

/// Execution order for `All`. Later checks assume the connectivity and
/// module checks before them already ran, so the order is fixed.
pub const ALL_SEQUENCE: [RunMode; 18] = [
    RunMode::SystemInfo,
    RunMode::ServicesStatus,
    RunMode::SqlTrace,
    RunMode::NetworkFix,
    RunMode::PortTest,
    RunMode::CommandTest,
    RunMode::NodeValidation,
    RunMode::ClusterMetadata,
    RunMode::NodeTemplates,
    RunMode::JobHistory,
    RunMode::NodeHistory,
    RunMode::ClusterMetrics,
    RunMode::MetricValueHistory,
    RunMode::ClusterTopology,
    RunMode::DiagnosticTests,
    RunMode::NodeConfig,
    RunMode::CommunicationTest,
    RunMode::AdvancedHealth,
];

impl RunMode {
    /// Every variant, in registry listing order
    pub const VARIANTS: [RunMode; 21] = [
        RunMode::All,
        RunMode::ListModules,
        RunMode::SystemInfo,
        RunMode::ServicesStatus,
        RunMode::SqlTrace,
        RunMode::NetworkFix,
        RunMode::PortTest,
        RunMode::CommandTest,
        RunMode::NodeValidation,
        RunMode::ClusterMetadata,
        RunMode::NodeTemplates,
        RunMode::JobHistory,
        RunMode::JobDetails,
        RunMode::NodeHistory,
        RunMode::ClusterMetrics,
        RunMode::MetricValueHistory,
        RunMode::ClusterTopology,
        RunMode::DiagnosticTests,
        RunMode::NodeConfig,
        RunMode::CommunicationTest,
        RunMode::AdvancedHealth,
    ];

    /// Canonical name as printed in listings and help
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::All => "All",
            RunMode::ListModules => "ListModules",
            RunMode::SystemInfo => "SystemInfo",
            RunMode::ServicesStatus => "ServicesStatus",
            RunMode::SqlTrace => "SQLTrace",
            RunMode::NetworkFix => "NetworkFix",
            RunMode::PortTest => "PortTest",
            RunMode::CommandTest => "CommandTest",
            RunMode::NodeValidation => "NodeValidation",
            RunMode::ClusterMetadata => "ClusterMetadata",
            RunMode::NodeTemplates => "NodeTemplates",
            RunMode::JobHistory => "JobHistory",
            RunMode::JobDetails => "JobDetails",
            RunMode::NodeHistory => "NodeHistory",
            RunMode::ClusterMetrics => "ClusterMetrics",
            RunMode::MetricValueHistory => "MetricValueHistory",
            RunMode::ClusterTopology => "ClusterTopology",
            RunMode::DiagnosticTests => "DiagnosticTests",
            RunMode::NodeConfig => "NodeConfig",
            RunMode::CommunicationTest => "CommunicationTest",
            RunMode::AdvancedHealth => "AdvancedHealth",
        }
    }

    /// Modes backed by a check module (everything except the two meta modes)
    pub fn is_check(&self) -> bool {
        !matches!(self, RunMode::All | RunMode::ListModules)
    }

    /// Check modes, in listing order
    pub fn checks() -> impl Iterator<Item = RunMode> {
        Self::VARIANTS.into_iter().filter(RunMode::is_check)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        if let Some(mode) = Self::VARIANTS
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
        {
            return Ok(*mode);
        }

        let alias = match wanted.to_ascii_lowercase().as_str() {
            "listrunmodes" | "list" => Some(RunMode::ListModules),
            "sql" | "sqltrace" => Some(RunMode::SqlTrace),
            "network" | "networkfix" => Some(RunMode::NetworkFix),
            "ports" => Some(RunMode::PortTest),
            "topology" => Some(RunMode::ClusterTopology),
            "health" => Some(RunMode::AdvancedHealth),
            _ => None,
        };

        alias.ok_or_else(|| DiagError::UnknownRunMode(wanted.to_string()))
    }
}
