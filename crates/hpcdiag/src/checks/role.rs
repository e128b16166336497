//! Node role classification
//!
//! Roles come from a rule table matched against `"{node_type} {name}"`. The
//! first matching rule wins, so head rules are listed before broker rules and
//! broker rules before compute rules: a head node that also runs compute
//! workloads reports `"HeadNode,ComputeNode"` and must classify as Head.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;

use crate::target::short_host_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeRole {
    Head,
    Broker,
    Compute,
    Unknown,
}

impl NodeRole {
    /// Display order for per-role summaries
    pub const ALL: [NodeRole; 4] = [NodeRole::Head, NodeRole::Broker, NodeRole::Compute, NodeRole::Unknown];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Head => "Head",
            NodeRole::Broker => "Broker",
            NodeRole::Compute => "Compute",
            NodeRole::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(pattern, role)` in match order
pub const ROLE_RULES: &[(&str, NodeRole)] = &[
    (r"(?i)\bhead\s*node\b|\bheadnode\b", NodeRole::Head),
    (r"(?i)^head\b", NodeRole::Head),
    (r"(?i)\bbroker\s*node\b|\bbrokernode\b|\bwcfbroker\b", NodeRole::Broker),
    (r"(?i)\bcompute\s*node\b|\bcomputenode\b", NodeRole::Compute),
    (r"(?i)\b(workstation|unmanaged)\s*node\b|\bworkstationnode\b|\bunmanagedserver\b", NodeRole::Compute),
];

static COMPILED_RULES: Lazy<Vec<(Regex, NodeRole)>> = Lazy::new(|| {
    ROLE_RULES
        .iter()
        .filter_map(|(pattern, role)| Regex::new(pattern).ok().map(|re| (re, *role)))
        .collect()
});

/// Classify one node. `scheduler` is the configured head node host name.
pub fn classify_role(name: &str, node_type: &str, scheduler: &str) -> NodeRole {
    let subject = format!("{} {}", node_type, name);
    if let Some((_, role)) = COMPILED_RULES.iter().find(|(re, _)| re.is_match(&subject)) {
        return *role;
    }
    if !name.is_empty() && short_host_name(name) == short_host_name(scheduler) {
        return NodeRole::Head;
    }
    NodeRole::Unknown
}
