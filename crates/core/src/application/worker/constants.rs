// Worker constants (no magic values in the loop body)
use std::time::Duration;

/// Sleep duration when no items are eligible (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Poll interval while a worker slot is disabled (250ms)
pub const DISABLED_POLL_DURATION: Duration = Duration::from_millis(250);

/// Sleep when the dispatch gate refuses (paused/throttled/offline) (200ms)
pub const GATED_SLEEP_DURATION: Duration = Duration::from_millis(200);

/// CPU usage threshold for dispatch throttling (percent).
/// Above this the worker skips pulling new items.
pub const CPU_THROTTLE_THRESHOLD: f64 = 90.0;

/// Default worker slot capacity
pub const DEFAULT_WORKER_CAPACITY: u32 = 1;

/// Default worker slot weight
pub const DEFAULT_WORKER_WEIGHT: f64 = 1.0;
