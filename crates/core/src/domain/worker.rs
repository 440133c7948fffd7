// Worker & Scaling Domain Models

use serde::{Deserialize, Serialize};

/// Worker slot identifier
pub type WorkerId = String;

/// A logical concurrency slot.
///
/// Slots are created once at manager initialization and are never
/// destroyed; scaling toggles `enabled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub capacity: u32,
    pub weight: f64,
    pub enabled: bool,
    /// Derived from current queue utilization at snapshot time
    pub load: f64,
}

impl Worker {
    pub fn new(id: impl Into<String>, capacity: u32, weight: f64) -> Self {
        Self {
            id: id.into(),
            capacity,
            weight,
            enabled: false,
            load: 0.0,
        }
    }
}

/// Scaling direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    ScaleUp,
    ScaleDown,
}

impl std::fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleDirection::ScaleUp => write!(f, "scale_up"),
            ScaleDirection::ScaleDown => write!(f, "scale_down"),
        }
    }
}

/// Immutable record of one scaling attempt, successful or not
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingEvent {
    pub direction: ScaleDirection,
    pub from_workers: usize,
    pub to_workers: usize,
    pub reason: String,
    pub success: bool,
    pub timestamp: i64,
}
