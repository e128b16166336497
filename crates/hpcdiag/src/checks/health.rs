//! Advanced health: resource sampling, node reachability and a verdict
//!
//! Findings are graded as issues (something is broken) or warnings (something
//! is under pressure). The verdict lists issues first, then warnings, each with
//! a recommendation. With neither the verdict is `[EXCELLENT]`.
//!
//! The resource verdict is printed the same way at every tier. Sweep findings
//! only exist at Verbose and are printed after it as a second block.

use async_trait::async_trait;
use serde::Serialize;

use super::sweep::{reachability_sweep, render_sweep};
use super::{CheckContext, CheckModule, Tip};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::{CheckResult, Reporter};
use crate::timeout::TimeoutClass;

/// CPU usage above this percentage is a warning
pub const CPU_WARNING_PERCENT: f64 = 90.0;

/// Available memory below this many MB is a warning
pub const MEMORY_WARNING_MB: u64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Issue,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub message: String,
    pub recommendation: String,
}

/// Collected findings of one health run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthVerdict {
    findings: Vec<Finding>,
}

impl HealthVerdict {
    pub fn issue(&mut self, message: impl Into<String>, recommendation: impl Into<String>) {
        self.push(Severity::Issue, message.into(), recommendation.into());
    }

    pub fn warning(&mut self, message: impl Into<String>, recommendation: impl Into<String>) {
        self.push(Severity::Warning, message.into(), recommendation.into());
    }

    fn push(&mut self, severity: Severity, message: String, recommendation: String) {
        self.findings.push(Finding {
            severity,
            message,
            recommendation,
        });
    }

    pub fn issues(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Issue).count()
    }

    pub fn warnings(&self) -> usize {
        self.findings.iter().filter(|f| f.severity == Severity::Warning).count()
    }

    pub fn is_excellent(&self) -> bool {
        self.findings.is_empty()
    }

    /// 0-100; an issue costs 25 points, a warning 10
    pub fn score(&self) -> u8 {
        let penalty = self.issues() * 25 + self.warnings() * 10;
        100usize.saturating_sub(penalty) as u8
    }

    /// Findings with issues first, insertion order kept within a severity
    pub fn prioritized(&self) -> Vec<&Finding> {
        let mut sorted: Vec<&Finding> = self.findings.iter().collect();
        sorted.sort_by_key(|f| f.severity);
        sorted
    }

    /// Both sets of findings, `self` first
    pub fn merged(&self, other: &HealthVerdict) -> HealthVerdict {
        HealthVerdict {
            findings: self.findings.iter().chain(&other.findings).cloned().collect(),
        }
    }

    pub fn render(&self, out: &Reporter) {
        out.line(format!("  Health score: {}/100", self.score()));
        if self.is_excellent() {
            out.line("  [EXCELLENT] No issues or warnings detected");
            return;
        }
        self.render_findings(out, "Recommendations:");
    }

    pub fn render_findings(&self, out: &Reporter, heading: &str) {
        out.line(format!("  {}", heading));
        for (i, finding) in self.prioritized().iter().enumerate() {
            let tag = match finding.severity {
                Severity::Issue => "[CRITICAL]",
                Severity::Warning => "[ATTENTION]",
            };
            out.line(format!("  {}. {} {}", i + 1, tag, finding.message));
            out.line(format!("       {}", finding.recommendation));
        }
    }
}

pub struct AdvancedHealthCheck;

#[async_trait]
impl CheckModule for AdvancedHealthCheck {
    fn mode(&self) -> RunMode {
        RunMode::AdvancedHealth
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-Counter '\\Processor(_Total)\\% Processor Time'", "Current CPU usage"),
            Tip::new("Get-Counter '\\Memory\\Available MBytes'", "Available memory"),
            Tip::new("Get-Counter '\\Network Interface(*)\\Bytes Total/sec'", "Network throughput"),
            Tip::new("Get-HpcNode | ForEach { Test-Connection $_.NetBiosName -Count 1 }", "Ping every node"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let perf = &ctx.adapters.perf;
        let mut verdict = HealthVerdict::default();

        if let Some(cpu) = ctx
            .probe("CPU usage", TimeoutClass::Command, perf.sample_cpu_percent())
            .await
        {
            let result = if cpu > CPU_WARNING_PERCENT {
                verdict.warning(
                    format!("CPU usage is {:.1}%", cpu),
                    "Check for runaway processes or move services off the head node",
                );
                CheckResult::warn("CPU usage", format!("{:.1}%", cpu))
            } else {
                CheckResult::ok("CPU usage", format!("{:.1}%", cpu))
            };
            ctx.emit(result.with_metric(cpu));
        }

        if let Some(memory) = ctx
            .probe("Available memory", TimeoutClass::Command, perf.sample_available_memory_mb())
            .await
        {
            let result = if memory < MEMORY_WARNING_MB {
                verdict.warning(
                    format!("Only {} MB of memory available", memory),
                    "Add memory or reduce the services running on this node",
                );
                CheckResult::warn("Available memory", format!("{} MB", memory))
            } else {
                CheckResult::ok("Available memory", format!("{} MB", memory))
            };
            ctx.emit(result.with_metric(memory as f64));
        }

        if let Some(bytes) = ctx
            .probe("Network throughput", TimeoutClass::Command, perf.sample_network_bytes_per_sec())
            .await
        {
            ctx.emit(
                CheckResult::ok("Network throughput", format!("{:.1} KB/s", bytes / 1024.0)).with_metric(bytes),
            );
        }

        verdict.render(ctx.out);

        if ctx.is_verbose() {
            if let Some(nodes) = ctx
                .probe("Node list", TimeoutClass::ClusterApi, ctx.adapters.cluster.list_nodes())
                .await
            {
                let names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
                let report = reachability_sweep(ctx, &names).await;
                render_sweep(ctx, &report);
                if let Some(latency) = report.average_latency_ms() {
                    ctx.note(format!("Average latency: {:.1} ms", latency));
                }
                let down: Vec<&str> = report.unreachable().map(|e| e.node.as_str()).collect();
                if !down.is_empty() {
                    let mut reachability = HealthVerdict::default();
                    reachability.issue(
                        format!("{} node(s) unreachable: {}", down.len(), down.join(", ")),
                        "Check power, network cabling and firewall rules on those nodes",
                    );
                    reachability.render_findings(ctx.out, "Node findings:");
                    ctx.out.line(format!(
                        "  Overall health score: {}/100",
                        verdict.merged(&reachability).score()
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{assert_concise_subset_of_verbose, CallCounter, FakeNetwork, FakePerf, Harness};
    use super::*;
    use crate::target::VerbosityMode;
    use std::sync::Arc;

    #[test]
    fn test_verdict_prioritizes_issues() {
        let mut verdict = HealthVerdict::default();
        verdict.warning("hot", "cool it");
        verdict.issue("down", "bring it up");
        let order: Vec<&str> = verdict.prioritized().iter().map(|f| f.message.as_str()).collect();
        assert_eq!(order, vec!["down", "hot"]);
        assert_eq!(verdict.score(), 65);
        assert!(!verdict.is_excellent());
    }

    #[test]
    fn test_empty_verdict_is_excellent() {
        let (reporter, sink) = Reporter::buffered();
        HealthVerdict::default().render(&reporter);
        assert_eq!(
            sink.lines(),
            vec!["  Health score: 100/100", "  [EXCELLENT] No issues or warnings detected"]
        );
    }

    #[tokio::test]
    async fn test_healthy_host_is_excellent() {
        let harness = Harness::new(VerbosityMode::Concise);
        harness.run_module(&AdvancedHealthCheck).await;
        let out = harness.output();
        assert!(out.contains("[OK] CPU usage: 12.0%"));
        assert!(out.contains("[OK] Available memory: 16384 MB"));
        assert!(out.contains("[EXCELLENT]"));
    }

    #[tokio::test]
    async fn test_pressure_becomes_warnings() {
        let harness = Harness::new(VerbosityMode::Concise);
        let adapters = harness.adapters.clone().with_perf(Arc::new(FakePerf {
            calls: CallCounter::default(),
            cpu: 97.5,
            memory_mb: 512,
        }));
        let harness = harness.with_adapters(adapters);
        harness.run_module(&AdvancedHealthCheck).await;
        let out = harness.output();
        assert!(out.contains("[WARN] CPU usage: 97.5%"));
        assert!(out.contains("[ATTENTION] CPU usage is 97.5%"));
        assert!(out.contains("[ATTENTION] Only 512 MB of memory available"));
        assert!(!out.contains("[EXCELLENT]"));
    }

    #[tokio::test]
    async fn test_unreachable_nodes_are_issues_at_verbose() {
        let mut network = FakeNetwork::healthy(CallCounter::default());
        network.unreachable.insert("CN01".to_string());
        let harness = Harness::new(VerbosityMode::Verbose);
        let adapters = harness.adapters.clone().with_network(Arc::new(network));
        let harness = harness.with_adapters(adapters);
        harness.run_module(&AdvancedHealthCheck).await;
        let out = harness.output();
        assert!(out.contains("Reachability: 2/3 nodes answered"));
        assert!(out.contains("  Node findings:"));
        assert!(out.contains("1. [CRITICAL] 1 node(s) unreachable: CN01"));
        assert!(out.contains("  Overall health score: 75/100"));
    }

    #[tokio::test]
    async fn test_unreachable_node_keeps_concise_verdict_at_verbose() {
        let with_down_node = |verbosity| {
            let mut network = FakeNetwork::healthy(CallCounter::default());
            network.unreachable.insert("CN01".to_string());
            let harness = Harness::new(verbosity);
            let adapters = harness.adapters.clone().with_network(Arc::new(network));
            harness.with_adapters(adapters)
        };
        assert_concise_subset_of_verbose(&AdvancedHealthCheck, with_down_node).await;
    }

    #[test]
    fn test_merged_score_counts_both_blocks() {
        let mut resources = HealthVerdict::default();
        resources.warning("hot", "cool it");
        let mut nodes = HealthVerdict::default();
        nodes.issue("down", "bring it up");
        assert_eq!(resources.merged(&nodes).score(), 65);
        assert_eq!(resources.score(), 90);
    }

    #[tokio::test]
    async fn test_concise_lines_also_verbose() {
        assert_concise_subset_of_verbose(&AdvancedHealthCheck, Harness::new).await;
    }
}
