// Resource Probe Port
// The core performs no measurements itself; it consumes numeric readings
// through this interface.

use async_trait::async_trait;

/// One set of resource readings
#[derive(Debug, Clone)]
pub struct ResourceReadings {
    /// Memory usage as a percentage, 0.0..=100.0
    pub memory_pct: f64,
    /// Storage usage as a percentage, 0.0..=100.0
    pub storage_pct: f64,
    /// CPU usage as a percentage, 0.0..=100.0
    pub cpu_pct: f64,
    /// Whether the network currently appears reachable
    pub network_online: bool,
    /// Observed network latency, if the probe measures one
    pub network_latency_ms: Option<f64>,
}

/// Resource probe port
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Read current resource levels
    async fn read(&self) -> ResourceReadings;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock probe with settable readings
    pub struct MockResourceProbe {
        readings: Arc<Mutex<ResourceReadings>>,
    }

    impl MockResourceProbe {
        pub fn new() -> Self {
            Self {
                readings: Arc::new(Mutex::new(ResourceReadings {
                    memory_pct: 40.0,
                    storage_pct: 30.0,
                    cpu_pct: 20.0,
                    network_online: true,
                    network_latency_ms: Some(25.0),
                })),
            }
        }

        pub fn set_memory_pct(&self, pct: f64) {
            self.readings.lock().unwrap().memory_pct = pct;
        }

        pub fn set_storage_pct(&self, pct: f64) {
            self.readings.lock().unwrap().storage_pct = pct;
        }

        pub fn set_cpu_pct(&self, pct: f64) {
            self.readings.lock().unwrap().cpu_pct = pct;
        }

        pub fn set_network_online(&self, online: bool) {
            self.readings.lock().unwrap().network_online = online;
        }
    }

    impl Default for MockResourceProbe {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ResourceProbe for MockResourceProbe {
        async fn read(&self) -> ResourceReadings {
            self.readings.lock().unwrap().clone()
        }
    }
}
