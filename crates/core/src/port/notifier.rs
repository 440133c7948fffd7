// Notification Channel Port
// Alerts are pushed as structured records; channel-specific formatting is
// the channel's responsibility.

use crate::domain::alert::Notification;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// A delivery channel for alert notifications
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name for logging and configuration
    fn name(&self) -> &str;

    /// Disabled channels are skipped during dispatch
    fn enabled(&self) -> bool {
        true
    }

    /// Deliver one notification
    async fn notify(&self, notification: &Notification);
}

/// Console channel: renders notifications into the structured log
pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn notify(&self, notification: &Notification) {
        use crate::domain::alert::AlertSeverity;
        match notification.severity {
            AlertSeverity::Critical | AlertSeverity::High => error!(
                alert_id = %notification.id,
                severity = %notification.severity,
                title = %notification.title,
                "{}", notification.message
            ),
            AlertSeverity::Medium => warn!(
                alert_id = %notification.id,
                severity = %notification.severity,
                title = %notification.title,
                "{}", notification.message
            ),
            AlertSeverity::Low => info!(
                alert_id = %notification.id,
                severity = %notification.severity,
                title = %notification.title,
                "{}", notification.message
            ),
        }
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Channel that records every notification it receives
    #[derive(Default)]
    pub struct RecordingChannel {
        delivered: Mutex<Vec<Notification>>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn delivered(&self) -> Vec<Notification> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn notify(&self, notification: &Notification) {
            self.delivered.lock().unwrap().push(notification.clone());
        }
    }
}
