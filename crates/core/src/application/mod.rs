// Application Layer - Queue, managing services, and dispatch loops

pub mod alerts;
pub mod autoscaler;
pub mod batch;
pub mod health;
pub mod manager;
pub mod monitor;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod worker;

// Re-exports
pub use alerts::AlertEngine;
pub use autoscaler::{AutoScaler, ScalingDecision};
pub use batch::BatchOptimizer;
pub use health::HealthRunner;
pub use manager::QueueManager;
pub use monitor::ResourceMonitor;
pub use queue::{
    ClearOptions, DispatchGate, EnqueueOptions, IfActive, OperationQueue, QueueMetrics,
    QueueStatus,
};
pub use retry::{RetryDecision, RetryEvaluator};
pub use scheduler::PriorityScheduler;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, SyncWorker, WorkerRegistry};
