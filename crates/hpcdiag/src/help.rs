//! Help text
//!
//! Generated from the run-mode registry so listings never drift from what the
//! dispatcher accepts. Pure text: nothing here probes the host.

use std::collections::HashMap;
use std::fmt::Write;

use crate::checks::builtin_modules;
use crate::mode::RunMode;
use crate::registry::RunModeRegistry;
use crate::target::{DEFAULT_DAYS_BACK, DEFAULT_METRIC_OUTPUT, DEFAULT_REPORT_FILE};

/// One command-line option: switch, value placeholder, description, default
struct OptionHelp {
    switch: &'static str,
    value: &'static str,
    description: &'static str,
    default: Option<&'static str>,
}

const fn opt(
    switch: &'static str,
    value: &'static str,
    description: &'static str,
    default: Option<&'static str>,
) -> OptionHelp {
    OptionHelp {
        switch,
        value,
        description,
        default,
    }
}

const OPTIONS: &[OptionHelp] = &[
    opt("-RunMode", "<Mode>", "Run mode to execute", None),
    opt("-SchedulerNode", "<host>", "Head node to diagnose", Some("$CCP_SCHEDULER or this host")),
    opt("-FixNetworkIssues", "", "Let NetworkFix repair the network stack", None),
    opt("-Force", "", "Skip confirmation prompts", None),
    opt("-TestHpcNodePorts", "", "Probe the HPC Pack node ports", None),
    opt("-Port", "<int>", "Single port for PortTest", None),
    opt("-Ports", "<int,int,...>", "Port list for PortTest", None),
    opt("-PortRange", "<a-b>", "Inclusive port range for PortTest", None),
    opt("-JobId", "<int>", "Job for JobDetails", None),
    opt("-NodeName", "<name>", "Node filter for NodeHistory", None),
    opt("-DaysBack", "<int>", "History window in days", Some("7")),
    opt("-ExportToFile", "", "Mirror the output to a transcript file", None),
    opt("-ReportFile", "<path>", "Transcript destination", Some(DEFAULT_REPORT_FILE)),
    opt("-MetricStartDate", "<date>", "Start of the metric history window", Some("now - 7 days")),
    opt("-MetricEndDate", "<date>", "End of the metric history window", Some("now")),
    opt("-MetricOutputPath", "<path>", "Metric history CSV", Some(DEFAULT_METRIC_OUTPUT)),
    opt("-ClientCertThumbprint", "<hex>", "Client certificate to use", None),
    opt("-ClientCertPfxPath", "<path>", "Client certificate PFX file", None),
    opt("-ClientCertPfxPassword", "<secret>", "Password for the PFX file", None),
    opt("-Config", "<path>", "Settings file", Some("$HPCDIAG_CONFIG")),
    opt("-CliTips", "", "Print reference commands instead of probing", None),
    opt("-Verbose", "", "Full tables and extra detail", None),
    opt("-ShowHelp", "", "This help", None),
    opt("-DeepHelp", "", "Help with per-mode detail and examples", None),
];

const EXAMPLES: &[(&str, &str)] = &[
    ("hpcdiag All", "Every check against the local head node"),
    ("hpcdiag -RunMode PortTest -SchedulerNode head01 -Ports 80,443,9999", "Test three ports"),
    ("hpcdiag PortTest head01 -PortRange 40000-40005", "Test a port range"),
    ("hpcdiag -JobId 42", "Details of job 42"),
    ("hpcdiag -NodeName CN01 -DaysBack 3", "State changes of CN01 over three days"),
    (
        "hpcdiag MetricValueHistory -MetricStartDate 2024-05-01 -MetricOutputPath out\\metrics.csv",
        "Export metric history",
    ),
    ("hpcdiag NetworkFix -FixNetworkIssues -Force", "Repair the network without prompting"),
    ("hpcdiag All -CliTips", "Reference commands only"),
    ("hpcdiag All -Verbose -ExportToFile -ReportFile diag.log", "Full run mirrored to diag.log"),
];

pub fn render_usage() -> String {
    let mut out = String::new();
    out.push_str("Usage: hpcdiag [-RunMode <Mode>] [-SchedulerNode <host>] [options]\n");
    out.push_str("       hpcdiag <Mode> [<host>] [options]\n");
    out.push_str("       hpcdiag -JobId <id> | -NodeName <name>\n");
    out
}

fn push_modes(out: &mut String, registry: &RunModeRegistry) {
    let width = registry.list_modes().iter().map(|d| d.name.len()).max().unwrap_or(0);
    out.push_str("\nRun modes:\n");
    for d in registry.list_modes() {
        let _ = writeln!(out, "  {:<width$}  {}", d.name, d.description, width = width);
    }
}

fn push_options(out: &mut String, with_defaults: bool) {
    let width = OPTIONS
        .iter()
        .map(|o| o.switch.len() + o.value.len() + 1)
        .max()
        .unwrap_or(0);
    out.push_str("\nOptions:\n");
    for o in OPTIONS {
        let left = format!("{} {}", o.switch, o.value);
        let _ = write!(out, "  {:<width$}  {}", left.trim_end(), o.description, width = width);
        if let (true, Some(default)) = (with_defaults, o.default) {
            let _ = write!(out, " (default: {})", default);
        }
        out.push('\n');
    }
}

pub fn render_help(registry: &RunModeRegistry) -> String {
    let mut out = render_usage();
    push_modes(&mut out, registry);
    push_options(&mut out, false);
    out.push_str("\nPowerShell-style switches (-RunMode) and GNU-style flags (--run-mode) are both accepted.\n");
    out.push_str("Run with -DeepHelp for defaults, per-mode details and examples.\n");
    out
}

pub fn render_deep_help(registry: &RunModeRegistry) -> String {
    let tips: HashMap<RunMode, usize> = builtin_modules()
        .iter()
        .map(|m| (m.mode(), m.tips().len()))
        .collect();

    let mut out = render_usage();
    let width = registry.list_modes().iter().map(|d| d.name.len()).max().unwrap_or(0);
    out.push_str("\nRun modes:\n");
    for d in registry.list_modes() {
        let _ = writeln!(out, "  {:<width$}  [{}] {}", d.name, d.source_tag.as_str(), d.description, width = width);
        match tips.get(&d.mode) {
            Some(count) => {
                let _ = writeln!(out, "  {:<width$}  {} reference commands with -CliTips", "", count, width = width);
            }
            None => {
                let _ = writeln!(out, "  {:<width$}  dispatcher mode, no probes", "", width = width);
            }
        }
    }
    push_options(&mut out, true);

    out.push_str("\nAll runs, in order:\n  ");
    let order: Vec<&str> = crate::mode::ALL_SEQUENCE.iter().map(|m| m.as_str()).collect();
    out.push_str(&order.join(", "));
    out.push('\n');

    let _ = writeln!(
        out,
        "\nHistory modes look back {} days unless -DaysBack is given.",
        DEFAULT_DAYS_BACK
    );

    out.push_str("\nExamples:\n");
    for (command, description) in EXAMPLES {
        let _ = writeln!(out, "  {}\n      {}", command, description);
    }
    out
}
