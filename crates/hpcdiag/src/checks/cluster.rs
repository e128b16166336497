//! Cluster inventory checks against the management API

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Instant;

use super::role::{classify_role, NodeRole};
use super::sweep::{reachability_sweep, render_sweep};
use super::{CheckContext, CheckModule, Tip};
use crate::adapters::{ClusterNode, JobQuery};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::CheckResult;
use crate::timeout::TimeoutClass;

/// Names listed inline before switching to "and N more"
const INLINE_NAME_LIMIT: usize = 5;

fn name_list(names: &[&str]) -> String {
    if names.len() <= INLINE_NAME_LIMIT {
        names.join(", ")
    } else {
        format!(
            "{} and {} more",
            names[..INLINE_NAME_LIMIT].join(", "),
            names.len() - INLINE_NAME_LIMIT
        )
    }
}

/// Node count per role, every role present
pub fn role_counts(nodes: &[ClusterNode], scheduler: &str) -> BTreeMap<NodeRole, Vec<String>> {
    let mut by_role: BTreeMap<NodeRole, Vec<String>> = NodeRole::ALL.iter().map(|r| (*r, Vec::new())).collect();
    for node in nodes {
        by_role
            .entry(classify_role(&node.name, &node.node_type, scheduler))
            .or_default()
            .push(node.name.clone());
    }
    by_role
}

fn role_mix(by_role: &BTreeMap<NodeRole, Vec<String>>) -> String {
    by_role
        .iter()
        .map(|(role, names)| format!("{} {}", names.len(), role.as_str().to_ascii_lowercase()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn node_names(nodes: &[ClusterNode]) -> Vec<String> {
    nodes.iter().map(|n| n.name.clone()).collect()
}

// ============================================================================

pub struct CommandTestCheck;

#[async_trait]
impl CheckModule for CommandTestCheck {
    fn mode(&self) -> RunMode {
        RunMode::CommandTest
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcClusterOverview", "Cluster summary"),
            Tip::new("Get-HpcNode | Format-Table NetBiosName,NodeState,NodeHealth", "Node list"),
            Tip::new("Get-HpcJob -State All -Count 1", "Most recent job"),
            Tip::new("Get-HpcMetric", "Metrics known to the cluster"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let cluster = &ctx.adapters.cluster;

        let started = Instant::now();
        if let Some(overview) = ctx
            .probe("Cluster overview", TimeoutClass::ClusterApi, cluster.get_cluster_overview())
            .await
        {
            ctx.emit(CheckResult::ok("Cluster overview", format!("cluster {}", overview.cluster_name)));
            ctx.verbose_note(format!("Cluster overview: {} ms", started.elapsed().as_millis()));
        }

        let started = Instant::now();
        if let Some(nodes) = ctx
            .probe("Node list", TimeoutClass::ClusterApi, cluster.list_nodes())
            .await
        {
            ctx.emit(CheckResult::ok("Node list", format!("{} nodes", nodes.len())));
            ctx.verbose_note(format!("Node list: {} ms", started.elapsed().as_millis()));
        }

        let started = Instant::now();
        let jobs = match ctx.target.days_back_since(Utc::now()) {
            Ok(since) => {
                let query = JobQuery { submitted_since: since, limit: 1 };
                ctx.probe("Job list", TimeoutClass::ClusterApi, cluster.list_jobs(query))
                    .await
            }
            Err(e) => {
                ctx.report_failure("Job list", &e);
                None
            }
        };
        if let Some(jobs) = jobs {
            let detail = match jobs.first() {
                Some(job) => format!("latest job {} ({})", job.id, job.state),
                None => "no jobs in range".to_string(),
            };
            ctx.emit(CheckResult::ok("Job list", detail));
            ctx.verbose_note(format!("Job list: {} ms", started.elapsed().as_millis()));
        }

        let started = Instant::now();
        if let Some(metrics) = ctx
            .probe("Metric list", TimeoutClass::ClusterApi, cluster.list_metrics())
            .await
        {
            ctx.emit(CheckResult::ok("Metric list", format!("{} metrics", metrics.len())));
            ctx.verbose_note(format!("Metric list: {} ms", started.elapsed().as_millis()));
        }
        Ok(())
    }
}

// ============================================================================

pub struct NodeValidationCheck;

#[async_trait]
impl CheckModule for NodeValidationCheck {
    fn mode(&self) -> RunMode {
        RunMode::NodeValidation
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcNode -State Offline", "Offline nodes"),
            Tip::new("Get-HpcNode -Health Error,Warning", "Nodes reporting a health problem"),
            Tip::new("Set-HpcNodeState -Name <node> -State Online", "Bring a node back online"),
            Tip::new("Invoke-HpcNodeDiagnostics", "Run the built-in node diagnostics"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let nodes = ctx
            .try_probe(TimeoutClass::ClusterApi, ctx.adapters.cluster.list_nodes())
            .await?;

        let online = nodes.iter().filter(|n| n.is_online()).count();
        let healthy = nodes.iter().filter(|n| n.is_healthy()).count();
        ctx.emit(CheckResult::ok(
            "Nodes",
            format!("{} nodes: {} online, {} healthy", nodes.len(), online, healthy),
        ));

        let offline: Vec<&str> = nodes
            .iter()
            .filter(|n| !n.is_online())
            .map(|n| n.name.as_str())
            .collect();
        if !offline.is_empty() {
            ctx.emit(CheckResult::warn(
                "Offline nodes",
                format!("{}: {}", offline.len(), name_list(&offline)),
            ));
        }
        let unhealthy: Vec<&str> = nodes
            .iter()
            .filter(|n| !n.is_healthy())
            .map(|n| n.name.as_str())
            .collect();
        if !unhealthy.is_empty() {
            ctx.emit(CheckResult::warn(
                "Unhealthy nodes",
                format!("{}: {}", unhealthy.len(), name_list(&unhealthy)),
            ));
        }

        ctx.note(format!("Roles: {}", role_mix(&role_counts(&nodes, &ctx.target.scheduler))));

        if ctx.is_verbose() && !nodes.is_empty() {
            let rows: Vec<Vec<String>> = nodes
                .iter()
                .map(|n| {
                    vec![
                        n.name.clone(),
                        format!("{:?}", n.state),
                        format!("{:?}", n.health),
                        n.node_type.clone(),
                        n.cores.to_string(),
                        n.memory_mb.to_string(),
                    ]
                })
                .collect();
            ctx.verbose_table(&["Name", "State", "Health", "Type", "Cores", "Memory MB"], &rows);
            let report = reachability_sweep(ctx, &node_names(&nodes)).await;
            render_sweep(ctx, &report);
        }
        Ok(())
    }
}

// ============================================================================

pub struct ClusterMetadataCheck;

#[async_trait]
impl CheckModule for ClusterMetadataCheck {
    fn mode(&self) -> RunMode {
        RunMode::ClusterMetadata
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcClusterOverview", "Cluster name, version and capacity"),
            Tip::new("Get-HpcClusterProperty", "Cluster-wide settings"),
            Tip::new("Get-HpcGroup", "Node groups"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let cluster = &ctx.adapters.cluster;

        if let Some(o) = ctx
            .probe("Cluster", TimeoutClass::ClusterApi, cluster.get_cluster_overview())
            .await
        {
            ctx.emit(CheckResult::ok(
                "Cluster",
                format!("{} version {}, head node {}", o.cluster_name, o.version, o.head_node),
            ));
            ctx.note(format!(
                "Nodes {}/{} online, cores {}/{} busy, jobs {} running {} queued",
                o.online_nodes, o.total_nodes, o.busy_cores, o.total_cores, o.running_jobs, o.queued_jobs
            ));
        }

        if let Some(properties) = ctx
            .probe("Cluster properties", TimeoutClass::ClusterApi, cluster.get_cluster_properties())
            .await
        {
            ctx.emit(CheckResult::ok("Cluster properties", format!("{} defined", properties.len())));
            let rows: Vec<Vec<String>> = properties
                .iter()
                .map(|p| vec![p.name.clone(), p.value.clone()])
                .collect();
            ctx.verbose_table(&["Property", "Value"], &rows);
        }

        if let Some(groups) = ctx
            .probe("Node groups", TimeoutClass::ClusterApi, cluster.get_groups())
            .await
        {
            let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
            ctx.emit(CheckResult::ok(
                "Node groups",
                format!("{}: {}", groups.len(), name_list(&names)),
            ));
            let rows: Vec<Vec<String>> = groups
                .iter()
                .map(|g| vec![g.name.clone(), g.node_count.to_string(), g.description.clone()])
                .collect();
            ctx.verbose_table(&["Group", "Nodes", "Description"], &rows);
        }
        Ok(())
    }
}

// ============================================================================

pub struct NodeTemplatesCheck;

#[async_trait]
impl CheckModule for NodeTemplatesCheck {
    fn mode(&self) -> RunMode {
        RunMode::NodeTemplates
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcNodeTemplate", "Node templates"),
            Tip::new("Export-HpcNodeTemplate -Name <template> -Path template.xml", "Export one template"),
            Tip::new("Get-HpcNode -TemplateName <template>", "Nodes using a template"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let templates = ctx
            .try_probe(TimeoutClass::ClusterApi, ctx.adapters.cluster.get_node_templates())
            .await?;
        if templates.is_empty() {
            ctx.emit(CheckResult::warn("Node templates", "none defined"));
            return Ok(());
        }

        ctx.emit(CheckResult::ok("Node templates", format!("{} defined", templates.len())));
        let rows: Vec<Vec<String>> = templates
            .iter()
            .map(|t| vec![t.name.clone(), t.template_type.clone(), t.node_count.to_string()])
            .collect();
        ctx.sample_table(&["Name", "Type", "Nodes"], &rows);

        let descriptions: Vec<Vec<String>> = templates
            .iter()
            .map(|t| vec![t.name.clone(), t.description.clone()])
            .collect();
        ctx.verbose_table(&["Name", "Description"], &descriptions);
        Ok(())
    }
}

// ============================================================================

pub struct ClusterTopologyCheck;

#[async_trait]
impl CheckModule for ClusterTopologyCheck {
    fn mode(&self) -> RunMode {
        RunMode::ClusterTopology
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-HpcNode | Group-Object NodeRole", "Nodes per role"),
            Tip::new("Get-HpcNode -GroupName HeadNodes,BrokerNodes,ComputeNodes", "Nodes in the default role groups"),
            Tip::new("Test-Connection <node> -Count 1", "Ping one node"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let nodes = ctx
            .try_probe(TimeoutClass::ClusterApi, ctx.adapters.cluster.list_nodes())
            .await?;
        if nodes.is_empty() {
            ctx.emit(CheckResult::warn("Topology", "no nodes found"));
            return Ok(());
        }

        let by_role = role_counts(&nodes, &ctx.target.scheduler);
        ctx.emit(CheckResult::ok("Topology", format!("{} nodes: {}", nodes.len(), role_mix(&by_role))));
        if by_role.get(&NodeRole::Head).map_or(true, Vec::is_empty) {
            ctx.emit(CheckResult::warn("Head node", "no node classified as head"));
        }

        if ctx.is_verbose() {
            for (role, names) in by_role.iter().filter(|(_, names)| !names.is_empty()) {
                ctx.note(format!("{}: {}", role, names.join(", ")));
            }
            let report = reachability_sweep(ctx, &node_names(&nodes)).await;
            render_sweep(ctx, &report);
        }
        Ok(())
    }
}
