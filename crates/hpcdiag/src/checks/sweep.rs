//! Reachability sweep over a node set

use futures::stream::{self, StreamExt};
use tracing::debug;

use super::CheckContext;
use crate::report::CheckResult;
use crate::timeout::TimeoutClass;

/// Node sets larger than this are not swept at all
pub const MAX_REACHABILITY_SWEEP_NODES: usize = 50;

/// Result of pinging one node
#[derive(Debug, Clone, PartialEq)]
pub struct SweepEntry {
    pub node: String,
    pub reachable: bool,
    pub latency_ms: Option<f64>,
    /// Set when the ping itself failed rather than went unanswered
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    /// In input order
    pub entries: Vec<SweepEntry>,
    /// Node count when the set was over the limit and nothing was pinged
    pub skipped: Option<usize>,
}

impl SweepReport {
    pub fn reachable(&self) -> usize {
        self.entries.iter().filter(|e| e.reachable).count()
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &SweepEntry> {
        self.entries.iter().filter(|e| !e.reachable)
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        let latencies: Vec<f64> = self.entries.iter().filter_map(|e| e.latency_ms).collect();
        if latencies.is_empty() {
            None
        } else {
            Some(latencies.iter().sum::<f64>() / latencies.len() as f64)
        }
    }
}

/// Ping every node concurrently, or none when there are more than
/// `MAX_REACHABILITY_SWEEP_NODES`. Each ping is bounded by the reachability
/// timeout and stops early on cancellation.
pub async fn reachability_sweep(ctx: &CheckContext<'_>, nodes: &[String]) -> SweepReport {
    if nodes.len() > MAX_REACHABILITY_SWEEP_NODES {
        debug!("{} nodes, over the sweep limit", nodes.len());
        return SweepReport {
            entries: Vec::new(),
            skipped: Some(nodes.len()),
        };
    }
    let concurrency = ctx.settings.sweep.concurrency.max(1);
    debug!("sweeping {} nodes, concurrency {}", nodes.len(), concurrency);

    let network = &ctx.adapters.network;
    let owned: Vec<(usize, String)> = nodes.iter().cloned().enumerate().collect();
    let mut indexed: Vec<(usize, SweepEntry)> = stream::iter(owned)
        .map(|(index, node)| async move {
            let result = ctx
                .try_probe(TimeoutClass::Reachability, network.ping(&node))
                .await;
            let entry = match result {
                Ok(reply) => SweepEntry {
                    node,
                    reachable: reply.reachable,
                    latency_ms: reply.latency_ms,
                    error: None,
                },
                Err(e) => SweepEntry {
                    node,
                    reachable: false,
                    latency_ms: None,
                    error: Some(e.to_string()),
                },
            };
            (index, entry)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    indexed.sort_by_key(|(index, _)| *index);
    SweepReport {
        entries: indexed.into_iter().map(|(_, entry)| entry).collect(),
        skipped: None,
    }
}

/// Render the sweep summary and, at Verbose, a per-node table
pub fn render_sweep(ctx: &CheckContext<'_>, report: &SweepReport) {
    if let Some(total) = report.skipped {
        ctx.emit(CheckResult::skipped(
            "Reachability sweep",
            format!("{} nodes exceeds the limit of {}, no nodes pinged", total, MAX_REACHABILITY_SWEEP_NODES),
        ));
        return;
    }
    ctx.note(format!(
        "Reachability: {}/{} nodes answered",
        report.reachable(),
        report.entries.len()
    ));
    let rows: Vec<Vec<String>> = report
        .entries
        .iter()
        .map(|e| {
            vec![
                e.node.clone(),
                if e.reachable { "yes" } else { "no" }.to_string(),
                e.latency_ms.map(|l| format!("{:.1} ms", l)).unwrap_or_else(|| "-".to_string()),
                e.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    ctx.verbose_table(&["Node", "Reachable", "Latency", "Error"], &rows);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{CallCounter, FakeNetwork, Harness};
    use super::*;
    use crate::adapters::Adapters;
    use crate::target::VerbosityMode;
    use std::sync::Arc;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cn{:03}", i)).collect()
    }

    #[tokio::test]
    async fn test_sweep_keeps_input_order() {
        let harness = Harness::new(VerbosityMode::Verbose);
        let ctx = harness.context();
        let nodes = names(12);
        let report = reachability_sweep(&ctx, &nodes).await;
        let swept: Vec<String> = report.entries.iter().map(|e| e.node.clone()).collect();
        assert_eq!(swept, nodes);
        assert_eq!(report.reachable(), 12);
        assert_eq!(report.skipped, None);
    }

    #[tokio::test]
    async fn test_sweep_at_limit_pings_every_node() {
        let calls = CallCounter::default();
        let adapters = Adapters::unavailable().with_network(Arc::new(FakeNetwork::healthy(calls.clone())));
        let harness = Harness::new(VerbosityMode::Concise).with_adapters(adapters);
        let ctx = harness.context();
        let report = reachability_sweep(&ctx, &names(MAX_REACHABILITY_SWEEP_NODES)).await;
        assert_eq!(report.entries.len(), MAX_REACHABILITY_SWEEP_NODES);
        assert_eq!(calls.count(), MAX_REACHABILITY_SWEEP_NODES);
    }

    #[tokio::test]
    async fn test_sweep_over_limit_is_skipped_with_notice() {
        let calls = CallCounter::default();
        let adapters = Adapters::unavailable().with_network(Arc::new(FakeNetwork::healthy(calls.clone())));
        let harness = Harness::new(VerbosityMode::Concise).with_adapters(adapters);
        let ctx = harness.context();
        let report = reachability_sweep(&ctx, &names(MAX_REACHABILITY_SWEEP_NODES + 1)).await;
        assert!(report.entries.is_empty());
        assert_eq!(report.skipped, Some(51));
        assert_eq!(calls.count(), 0);

        render_sweep(&ctx, &report);
        assert_eq!(
            harness.lines(),
            vec!["  [SKIPPED] Reachability sweep: 51 nodes exceeds the limit of 50, no nodes pinged"]
        );
    }

    #[tokio::test]
    async fn test_unreachable_and_failed_pings() {
        let mut network = FakeNetwork::healthy(CallCounter::default());
        network.unreachable.insert("cn001".to_string());
        let adapters = Adapters::unavailable().with_network(Arc::new(network));
        let harness = Harness::new(VerbosityMode::Concise).with_adapters(adapters);
        let ctx = harness.context();
        let report = reachability_sweep(&ctx, &names(3)).await;
        let down: Vec<&str> = report.unreachable().map(|e| e.node.as_str()).collect();
        assert_eq!(down, vec!["cn001"]);
        assert_eq!(report.average_latency_ms(), Some(1.5));

        render_sweep(&ctx, &report);
        assert_eq!(harness.lines(), vec!["    Reachability: 2/3 nodes answered"]);
    }
}
