//! Performance counters
//!
//! CPU and network are rates, so each takes two `sysinfo` samples
//! [`SAMPLE_INTERVAL`] apart. Loopback traffic is not counted.

use async_trait::async_trait;
use std::time::Duration;
use sysinfo::{MemoryRefreshKind, Networks, System};

use crate::adapters::{PerfCounterAdapter, ProbeResult};

/// Gap between the two samples of a rate counter
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

const LOOPBACK: &[&str] = &["lo", "lo0"];

fn is_loopback(interface: &str) -> bool {
    LOOPBACK.contains(&interface) || interface.starts_with("Loopback")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPerf;

#[async_trait]
impl PerfCounterAdapter for SystemPerf {
    async fn sample_cpu_percent(&self) -> ProbeResult<f64> {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        tokio::time::sleep(SAMPLE_INTERVAL.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
        sys.refresh_cpu_usage();
        Ok(f64::from(sys.global_cpu_usage()).clamp(0.0, 100.0))
    }

    async fn sample_available_memory_mb(&self) -> ProbeResult<u64> {
        let mut sys = System::new();
        sys.refresh_memory_specifics(MemoryRefreshKind::new().with_ram());
        Ok(sys.available_memory() / (1024 * 1024))
    }

    async fn sample_network_bytes_per_sec(&self) -> ProbeResult<f64> {
        let mut networks = Networks::new_with_refreshed_list();
        tokio::time::sleep(SAMPLE_INTERVAL).await;
        networks.refresh();
        let bytes: u64 = networks
            .iter()
            .filter(|(name, _)| !is_loopback(name))
            .map(|(_, data)| data.received() + data.transmitted())
            .sum();
        Ok(bytes as f64 / SAMPLE_INTERVAL.as_secs_f64())
    }
}
