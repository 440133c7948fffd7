// Resource probe implementation
// sysinfo for cross-platform readings; the core stays platform-free

use async_trait::async_trait;
use std::sync::Mutex;
use sysinfo::{Disks, Networks, System};
use tracing::debug;

use opsync_core::port::resource_probe::{ResourceProbe, ResourceReadings};

/// Resource probe backed by sysinfo.
///
/// Network reachability is approximated from interface traffic: a host
/// with no interface that has ever moved bytes is treated as offline.
/// Latency measurement belongs to the transport, not this probe.
pub struct SysinfoResourceProbe {
    system: Mutex<System>,
    networks: Mutex<Networks>,
}

impl SysinfoResourceProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
        }
    }
}

impl Default for SysinfoResourceProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceProbe for SysinfoResourceProbe {
    async fn read(&self) -> ResourceReadings {
        let (memory_pct, cpu_pct) = {
            let mut sys = self.system.lock().unwrap();
            sys.refresh_memory();
            sys.refresh_cpu();

            let total = sys.total_memory().max(1);
            let memory_pct = sys.used_memory() as f64 / total as f64 * 100.0;
            let cpu_pct = sys.global_cpu_info().cpu_usage() as f64;
            (memory_pct, cpu_pct)
        };

        // Storage: first disk, used / total
        let disks = Disks::new_with_refreshed_list();
        let storage_pct = disks
            .first()
            .map(|disk| {
                let total = disk.total_space().max(1);
                let used = total - disk.available_space();
                used as f64 / total as f64 * 100.0
            })
            .unwrap_or(0.0);

        let network_online = {
            let mut networks = self.networks.lock().unwrap();
            networks.refresh_list();
            networks
                .iter()
                .any(|(_, data)| data.total_received() > 0 || data.total_transmitted() > 0)
        };

        debug!(
            memory_pct = %memory_pct,
            storage_pct = %storage_pct,
            cpu_pct = %cpu_pct,
            network_online = %network_online,
            "Resource readings collected"
        );

        ResourceReadings {
            memory_pct,
            storage_pct,
            cpu_pct,
            network_online,
            network_latency_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_readings_are_percentages() {
        let probe = SysinfoResourceProbe::new();
        let readings = probe.read().await;

        assert!(readings.memory_pct >= 0.0);
        assert!(readings.memory_pct <= 100.0);
        assert!(readings.storage_pct >= 0.0);
        assert!(readings.storage_pct <= 100.0);
        assert!(readings.cpu_pct >= 0.0);
    }

    #[tokio::test]
    async fn test_repeated_reads_do_not_panic() {
        let probe = SysinfoResourceProbe::new();
        for _ in 0..3 {
            probe.read().await;
        }
    }
}
