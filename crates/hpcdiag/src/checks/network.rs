//! Network checks: gateway, DNS, optional repair, TCP port probes

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use super::{failure_status, CheckContext, CheckModule, Tip};
use crate::error::ProbeError;
use crate::mode::RunMode;
use crate::report::CheckResult;
use crate::target::HPC_NODE_PORTS;
use crate::timeout::TimeoutClass;

/// Names resolved to confirm DNS works
pub const WELL_KNOWN_DNS_NAMES: [&str; 2] = ["www.microsoft.com", "login.microsoftonline.com"];

/// Outcome of one TCP connect attempt
#[derive(Debug)]
pub enum PortState {
    Open,
    Closed,
    Failed(ProbeError),
}

/// Connect to every port on `host`, preserving order. Exactly one entry per
/// requested port.
pub async fn probe_ports(ctx: &CheckContext<'_>, host: &str, ports: &[u16]) -> Vec<(u16, PortState)> {
    let concurrency = ctx.settings.sweep.concurrency.max(1);
    let network = &ctx.adapters.network;
    stream::iter(ports.iter().copied())
        .map(|port| async move {
            let state = match ctx
                .try_probe(TimeoutClass::Connect, network.test_tcp_port(host, port))
                .await
            {
                Ok(true) => PortState::Open,
                Ok(false) => PortState::Closed,
                Err(e) => PortState::Failed(e),
            };
            (port, state)
        })
        .buffered(concurrency)
        .collect()
        .await
}

/// One line per port, then an open/closed count
pub fn render_ports(ctx: &CheckContext<'_>, host: &str, results: &[(u16, PortState)]) {
    let mut open = 0;
    for (port, state) in results {
        let label = format!("Port {}", port);
        match state {
            PortState::Open => {
                open += 1;
                ctx.emit(CheckResult::ok(label, format!("open on {}", host)));
            }
            PortState::Closed => ctx.emit(CheckResult::error(label, format!("closed on {}", host))),
            PortState::Failed(e) => ctx.emit(CheckResult::new(failure_status(e), label, e.to_string())),
        }
    }
    ctx.note(format!("{} of {} ports open", open, results.len()));
}

pub struct NetworkFixCheck;

impl NetworkFixCheck {
    async fn check_gateway(&self, ctx: &CheckContext<'_>) {
        let Some(gateway) = ctx
            .probe(
                "Default gateway",
                TimeoutClass::Command,
                ctx.adapters.network.default_gateway(),
            )
            .await
        else {
            return;
        };
        ctx.emit(CheckResult::ok("Default gateway", gateway.to_string()));

        let target = gateway.to_string();
        if let Some(reply) = ctx
            .probe(
                "Gateway ping",
                TimeoutClass::Reachability,
                ctx.adapters.network.ping(&target),
            )
            .await
        {
            match reply.latency_ms {
                Some(ms) if reply.reachable => {
                    ctx.emit(CheckResult::ok("Gateway ping", format!("reply in {:.1} ms", ms)).with_metric(ms))
                }
                _ if reply.reachable => ctx.emit(CheckResult::ok("Gateway ping", "reply")),
                _ => ctx.emit(CheckResult::error("Gateway ping", format!("no reply from {}", target))),
            }
        }
    }

    async fn check_dns(&self, ctx: &CheckContext<'_>) {
        for name in WELL_KNOWN_DNS_NAMES {
            let label = format!("DNS {}", name);
            if let Some(addresses) = ctx
                .probe(&label, TimeoutClass::Reachability, ctx.adapters.network.resolve_dns(name))
                .await
            {
                match addresses.first() {
                    Some(first) => {
                        ctx.emit(CheckResult::ok(&label, format!("resolved to {}", first)));
                        let all: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
                        ctx.verbose_note(format!("{}: {}", name, all.join(", ")));
                    }
                    None => ctx.emit(CheckResult::error(&label, "no addresses returned")),
                }
            }
        }
    }

    async fn repair(&self, ctx: &CheckContext<'_>) {
        if !ctx.confirm("Reset the network stack, flush DNS and open the HPC inbound ports?") {
            ctx.emit(CheckResult::skipped("Network repair", "declined by operator"));
            return;
        }

        if let Some(output) = ctx
            .probe(
                "Reset network stack",
                TimeoutClass::Command,
                ctx.adapters.network.reset_stack(),
            )
            .await
        {
            ctx.emit(CheckResult::ok("Reset network stack", "done"));
            ctx.verbose_note(output.trim());
        }
        if let Some(output) = ctx
            .probe("Flush DNS", TimeoutClass::Command, ctx.adapters.network.flush_dns())
            .await
        {
            ctx.emit(CheckResult::ok("Flush DNS", "done"));
            ctx.verbose_note(output.trim());
        }

        let mut opened = 0;
        for port in HPC_NODE_PORTS {
            let label = format!("Open inbound port {}", port);
            if ctx
                .probe(&label, TimeoutClass::Command, ctx.adapters.network.open_inbound_port(port))
                .await
                .is_some()
            {
                opened += 1;
            }
        }
        ctx.emit(CheckResult::ok(
            "Inbound firewall rules",
            format!("{} of {} ports opened", opened, HPC_NODE_PORTS.len()),
        ));
    }
}

#[async_trait]
impl CheckModule for NetworkFixCheck {
    fn mode(&self) -> RunMode {
        RunMode::NetworkFix
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Get-NetRoute -DestinationPrefix 0.0.0.0/0", "Default gateway"),
            Tip::new("Resolve-DnsName www.microsoft.com", "Check name resolution"),
            Tip::new("netsh int ip reset && netsh winsock reset", "Reset the TCP/IP stack (reboot afterwards)"),
            Tip::new("ipconfig /flushdns", "Clear the DNS client cache"),
            Tip::new(
                "New-NetFirewallRule -DisplayName HPC -Direction Inbound -Protocol TCP -LocalPort 5969,5970,9087",
                "Open HPC Pack inbound ports",
            ),
            Tip::new("Test-NetConnection <head node> -Port 5970", "Probe one port on the head node"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        self.check_gateway(ctx).await;
        self.check_dns(ctx).await;

        if ctx.target.fix_network_issues {
            self.repair(ctx).await;
        } else {
            ctx.note("Run with -FixNetworkIssues to reset the stack and open HPC ports");
        }

        if ctx.target.test_node_ports || ctx.target.ports.is_some() {
            let host = ctx.target.scheduler.as_str();
            let results = probe_ports(ctx, host, &ctx.target.requested_ports()).await;
            render_ports(ctx, host, &results);
        }
        Ok(())
    }
}

pub struct PortTestCheck;

#[async_trait]
impl CheckModule for PortTestCheck {
    fn mode(&self) -> RunMode {
        RunMode::PortTest
    }

    fn tips(&self) -> &'static [Tip] {
        const TIPS: &[Tip] = &[
            Tip::new("Test-NetConnection <host> -Port <port>", "Probe one TCP port"),
            Tip::new("netstat -ano | findstr LISTENING", "Ports listening on this host"),
            Tip::new("Get-NetFirewallRule -Enabled True -Direction Inbound", "Inbound firewall rules"),
        ];
        TIPS
    }

    async fn execute(&self, ctx: &CheckContext<'_>) -> Result<(), ProbeError> {
        let host = ctx.target.scheduler.as_str();
        let ports = ctx.target.requested_ports();
        if ports.is_empty() {
            return Err(ProbeError::validation("no ports to test"));
        }
        let results = probe_ports(ctx, host, &ports).await;
        render_ports(ctx, host, &results);
        Ok(())
    }
}
