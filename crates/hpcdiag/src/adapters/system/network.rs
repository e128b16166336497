//! Network stack probes

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::ErrorKind;
use std::net::IpAddr;
use tokio::net::TcpStream;
use tokio::process::Command;

use super::{command_failure, exec, exec_checked};
use crate::adapters::{NetworkAdapter, PingReply, ProbeResult};
use crate::error::ProbeError;

static PING_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)time[=<]\s*([\d.]+)\s*ms").expect("valid ping pattern"));

/// Round-trip time from one line of `ping` output
pub fn parse_ping_latency(output: &str) -> Option<f64> {
    PING_TIME
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// First address after `via` in `ip route show default`
pub fn parse_ip_route(output: &str) -> Option<IpAddr> {
    output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word == "via" {
                return words.next().and_then(|w| w.parse().ok());
            }
        }
        None
    })
}

/// Probes through sockets and the platform's network tools
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNetwork;

impl SystemNetwork {
    #[cfg(windows)]
    async fn gateway(&self) -> ProbeResult<IpAddr> {
        let script = "Get-NetRoute -DestinationPrefix '0.0.0.0/0','::/0' | Sort-Object AddressFamily,RouteMetric | Select-Object -First 1 -ExpandProperty NextHop";
        let out = super::powershell(script).await?;
        out.trim()
            .parse()
            .map_err(|_| ProbeError::failed("no default gateway configured"))
    }

    #[cfg(not(windows))]
    async fn gateway(&self) -> ProbeResult<IpAddr> {
        for family in ["-4", "-6"] {
            let routes = exec_checked("ip", &[family, "route", "show", "default"]).await?;
            if let Some(gateway) = parse_ip_route(&routes) {
                return Ok(gateway);
            }
        }
        Err(ProbeError::failed("no default gateway configured"))
    }
}

#[async_trait]
impl NetworkAdapter for SystemNetwork {
    async fn default_gateway(&self) -> ProbeResult<IpAddr> {
        self.gateway().await
    }

    async fn ping(&self, host: &str) -> ProbeResult<PingReply> {
        let program = which::which("ping").map_err(|_| ProbeError::unavailable("ping not found on PATH"))?;
        let mut cmd = Command::new(program);
        if cfg!(windows) {
            cmd.args(["-n", "1", "-w", "2000", host]);
        } else {
            cmd.args(["-c", "1", "-W", "2", host]);
        }
        let output = exec(cmd, None).await?;
        if !output.success() {
            return Ok(PingReply::no_reply());
        }
        Ok(match parse_ping_latency(&output.stdout) {
            Some(ms) => PingReply::reply(ms),
            None => PingReply {
                reachable: true,
                latency_ms: None,
            },
        })
    }

    async fn resolve_dns(&self, name: &str) -> ProbeResult<Vec<IpAddr>> {
        let mut addrs: Vec<IpAddr> = tokio::net::lookup_host((name, 0))
            .await
            .map_err(|e| ProbeError::failed(format!("{}: {}", name, e)))?
            .map(|a| a.ip())
            .collect();
        addrs.dedup();
        if addrs.is_empty() {
            return Err(ProbeError::failed(format!("{}: no addresses", name)));
        }
        Ok(addrs)
    }

    async fn test_tcp_port(&self, host: &str, port: u16) -> ProbeResult<bool> {
        match TcpStream::connect((host, port)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Ok(false),
            Err(e) => Err(ProbeError::unreachable(format!("{}:{}: {}", host, port, e))),
        }
    }

    async fn open_inbound_port(&self, port: u16) -> ProbeResult<()> {
        if cfg!(windows) {
            let name = format!("name=HPC Pack TCP {}", port);
            let local = format!("localport={}", port);
            exec_checked(
                "netsh",
                &["advfirewall", "firewall", "add", "rule", &name, "dir=in", "action=allow", "protocol=TCP", &local],
            )
            .await?;
            return Ok(());
        }
        let rule = format!("{}/tcp", port);
        if which::which("firewall-cmd").is_ok() {
            let arg = format!("--add-port={}", rule);
            exec_checked("firewall-cmd", &[&arg]).await?;
        } else {
            exec_checked("ufw", &["allow", &rule]).await?;
        }
        Ok(())
    }

    async fn reset_stack(&self) -> ProbeResult<String> {
        if !cfg!(windows) {
            return Err(ProbeError::unavailable("network stack reset is only supported on Windows"));
        }
        let winsock = exec_checked("netsh", &["winsock", "reset"]).await?;
        let ip = exec_checked("netsh", &["int", "ip", "reset"]).await?;
        Ok(format!("{}\n{}", winsock.trim(), ip.trim()))
    }

    async fn flush_dns(&self) -> ProbeResult<String> {
        if cfg!(windows) {
            return exec_checked("ipconfig", &["/flushdns"]).await.map(|s| s.trim().to_string());
        }
        let program = which::which("resolvectl").map_err(|_| ProbeError::unavailable("resolvectl not found on PATH"))?;
        let mut cmd = Command::new(program);
        cmd.arg("flush-caches");
        let output = exec(cmd, None).await?;
        if output.success() {
            Ok("DNS cache flushed".to_string())
        } else {
            Err(command_failure("resolvectl", &output))
        }
    }
}
