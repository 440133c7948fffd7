// Observable Events
//
// Each event carries a snapshot of the relevant entity. Fan-out runs over
// a broadcast channel owned by the manager; subscribers hold a receiver,
// there is no global listener registry.

use crate::application::queue::QueueMetrics;
use crate::domain::alert::Alert;
use crate::domain::health::HealthStatus;
use crate::domain::operation::QueueItem;
use crate::domain::worker::ScalingEvent;
use serde::{Deserialize, Serialize};

/// Events emitted by the queue and its managing layers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// An operation was admitted
    Enqueued { item: QueueItem },
    /// An operation completed successfully
    Completed { item: QueueItem },
    /// An operation failed terminally
    Failed { item: QueueItem },
    /// A failed execution was rescheduled with backoff
    Retried { item: QueueItem, delay_ms: i64 },
    /// A pending or in-flight operation was cancelled
    Cancelled { item: QueueItem },
    /// A scaling attempt was recorded
    Scaled {
        #[serde(rename = "scaling_event")]
        event: ScalingEvent,
    },
    /// A new alert was created
    AlertCreated { alert: Alert },
    /// The composite health state changed
    HealthStatusChanged { status: HealthStatus },
    /// A metrics collection tick completed
    MetricsCollected { metrics: QueueMetrics },
}
