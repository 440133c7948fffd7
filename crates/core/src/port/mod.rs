// Port Layer - Interfaces for external collaborators

pub mod id_provider;
pub mod notifier;
pub mod resource_probe;
pub mod state_store;
pub mod sync_executor;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use notifier::{ConsoleChannel, NotificationChannel};
pub use resource_probe::{ResourceProbe, ResourceReadings};
pub use state_store::StateStore;
pub use sync_executor::{SyncError, SyncExecutor};
pub use time_provider::TimeProvider;
