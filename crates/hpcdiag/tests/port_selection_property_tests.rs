//! Property-based tests for port selection
//!
//! *For any* requested port set, the port test prints exactly one result line
//! per port, in request order, and the open count matches the fake network.

use async_trait::async_trait;
use hpcdiag::adapters::{NetworkAdapter, PingReply, ProbeResult};
use hpcdiag::{
    AutoConfirm, DispatchRequest, Dispatcher, PortSelection, ProbeError, ProbeTarget, Reporter, Settings,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct EvenPortsOpen;

#[async_trait]
impl NetworkAdapter for EvenPortsOpen {
    async fn default_gateway(&self) -> ProbeResult<IpAddr> {
        Err(ProbeError::unavailable("routing table"))
    }

    async fn ping(&self, _host: &str) -> ProbeResult<PingReply> {
        Ok(PingReply::no_reply())
    }

    async fn resolve_dns(&self, name: &str) -> ProbeResult<Vec<IpAddr>> {
        Err(ProbeError::failed(format!("cannot resolve {}", name)))
    }

    async fn test_tcp_port(&self, _host: &str, port: u16) -> ProbeResult<bool> {
        Ok(port % 2 == 0)
    }

    async fn open_inbound_port(&self, _port: u16) -> ProbeResult<()> {
        Ok(())
    }

    async fn reset_stack(&self) -> ProbeResult<String> {
        Ok(String::new())
    }

    async fn flush_dns(&self) -> ProbeResult<String> {
        Ok(String::new())
    }
}

fn run_port_test(selection: PortSelection) -> Vec<String> {
    let adapters = hpcdiag::Adapters::unavailable().with_network(Arc::new(EvenPortsOpen));
    let dispatcher = Dispatcher::builtin(adapters, Settings::default()).unwrap();
    let request = DispatchRequest::new(
        Some("PortTest".to_string()),
        ProbeTarget::new("node7").with_ports(selection),
    );
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (reporter, sink) = Reporter::buffered();
    rt.block_on(dispatcher.run(request, &reporter, &AutoConfirm(false), &CancellationToken::new()))
        .unwrap();
    sink.lines()
}

fn port_lines(lines: &[String]) -> Vec<String> {
    lines.iter().filter(|l| l.contains("] Port ")).cloned().collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_one_line_per_listed_port(ports in prop::collection::vec(1u16..=65535, 1..24)) {
        let lines = run_port_test(PortSelection::List(ports.clone()));
        let printed = port_lines(&lines);
        prop_assert_eq!(printed.len(), ports.len());
        for (line, port) in printed.iter().zip(&ports) {
            prop_assert!(line.contains(&format!("Port {}:", port)), "{} does not name {}", line, port);
        }

        let open = ports.iter().filter(|p| *p % 2 == 0).count();
        let summary = format!("{} of {} ports open", open, ports.len());
        prop_assert!(lines.iter().any(|l| l.contains(&summary)));
    }

    #[test]
    fn prop_range_expands_inclusively(start in 1u16..60000, len in 0u16..16) {
        let end = start + len;
        let lines = run_port_test(PortSelection::Range { start, end });
        let printed = port_lines(&lines);
        prop_assert_eq!(printed.len(), usize::from(len) + 1);
        let seen: HashSet<&String> = printed.iter().collect();
        prop_assert_eq!(seen.len(), printed.len());
    }
}
