// Operation Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Queue item ID (caller-supplied or UUID v4)
pub type ItemId = String;

/// Operation kind tag (e.g. "upload_record", "delete_record")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationKind(String);

impl OperationKind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque operation payload (JSON serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationPayload(serde_json::Value);

impl OperationPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// One deferred unit of work submitted by a caller.
///
/// The engine never interprets the payload; it is shipped verbatim to the
/// sync executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub payload: OperationPayload,
}

impl Operation {
    pub fn new(kind: OperationKind, payload: OperationPayload) -> Self {
        Self { kind, payload }
    }
}

/// Priority classes, highest first in dispatch order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
    Background,
}

impl Priority {
    /// Numeric rank for ordering (higher = dispatched first)
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Background => 0,
        }
    }

    /// All classes in dispatch order (highest first)
    pub fn all() -> &'static [Priority] {
        &[
            Priority::Critical,
            Priority::High,
            Priority::Medium,
            Priority::Low,
            Priority::Background,
        ]
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Background => "background",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Priority {
    type Err = crate::domain::error::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "background" => Ok(Priority::Background),
            other => Err(crate::domain::error::DomainError::InvalidPriority(
                other.to_string(),
            )),
        }
    }
}

/// Item lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ItemStatus {
    /// Terminal states never transition again (except Failed via explicit retry)
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed | ItemStatus::Cancelled
        )
    }

    /// Active states hold the dedup invariant: one per id
    pub fn is_active(self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Processing)
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Processing => "PROCESSING",
            ItemStatus::Completed => "COMPLETED",
            ItemStatus::Failed => "FAILED",
            ItemStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", name)
    }
}

/// Error classification reported by the sync executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NetworkError,
    Timeout,
    ServerError,
    RateLimit,
    Conflict,
    Unclassified,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::NetworkError => "network_error",
            ErrorClass::Timeout => "timeout",
            ErrorClass::ServerError => "server_error",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Unclassified => "unclassified",
        };
        write!(f, "{}", name)
    }
}

/// One admitted unit of work with its retry bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub operation: Operation,
    pub priority: Priority,
    pub status: ItemStatus,

    /// Failed execution attempts recorded so far
    pub attempts: u32,

    /// Ids that must reach Completed before this item is eligible
    pub dependencies: Vec<ItemId>,

    /// Earliest dispatch eligibility (epoch ms); advanced on retry backoff
    pub scheduled_at: i64,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    /// Admission order, FIFO tie-break within a priority class
    pub seq: u64,

    pub last_error: Option<String>,
    pub cancel_requested: bool,
    pub metadata: BTreeMap<String, String>,
}

impl QueueItem {
    pub fn new(
        id: impl Into<String>,
        operation: Operation,
        priority: Priority,
        created_at: i64,
        seq: u64,
    ) -> Self {
        Self {
            id: id.into(),
            operation,
            priority,
            status: ItemStatus::Pending,
            attempts: 0,
            dependencies: Vec::new(),
            scheduled_at: created_at,
            created_at,
            started_at: None,
            finished_at: None,
            seq,
            last_error: None,
            cancel_requested: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Transition to Processing with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.status != ItemStatus::Pending {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "PROCESSING".to_string(),
            });
        }
        self.status = ItemStatus::Processing;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed with explicit timestamp
    pub fn complete(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.status != ItemStatus::Processing {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "COMPLETED".to_string(),
            });
        }
        self.status = ItemStatus::Completed;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Mark as terminally Failed with explicit timestamp
    pub fn fail(&mut self, now_millis: i64, error: impl Into<String>) {
        self.status = ItemStatus::Failed;
        self.finished_at = Some(now_millis);
        self.last_error = Some(error.into());
    }

    /// Return to Pending for a retry, eligible again at `scheduled_at`
    pub fn requeue(&mut self, scheduled_at: i64) {
        self.status = ItemStatus::Pending;
        self.started_at = None;
        self.scheduled_at = scheduled_at;
    }

    /// Transition to Cancelled; only Pending items may be cancelled directly
    pub fn cancel(&mut self, now_millis: i64) -> crate::domain::error::Result<()> {
        if self.status != ItemStatus::Pending {
            return Err(crate::domain::error::DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "CANCELLED".to_string(),
            });
        }
        self.status = ItemStatus::Cancelled;
        Ok(())
    }

    /// Create a test item with deterministic id/seq/timestamps.
    ///
    /// **Note**: tests only. Production code injects ids and time via
    /// providers.
    pub fn new_test(kind: impl Into<String>, priority: Priority) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let operation = Operation::new(
            OperationKind::new(kind),
            OperationPayload::new(serde_json::json!({})),
        );
        Self::new(
            format!("test-{}", counter),
            operation,
            priority,
            (counter * 1000) as i64,
            counter,
        )
    }
}
