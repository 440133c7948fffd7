// Dispatch Gate
//
// Shared control point every worker consults before pulling work:
// pause flags set by the resource monitor / health actions, and an
// optional token-bucket throttle. Adaptive throttling shrinks the refill
// rate as the error rate climbs.

use crate::config::ThrottleSettings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Token bucket over injected time
struct TokenBucket {
    tokens: f64,
    last_refill_ms: i64,
    rate_per_sec: f64,
    burst: f64,
    /// Refill horizon: idle gaps longer than this earn no extra credit
    window_ms: i64,
    /// 1.0 = full rate; lowered by adaptive/emergency throttling
    factor: f64,
}

impl TokenBucket {
    fn new(settings: &ThrottleSettings, now: i64) -> Self {
        Self {
            tokens: settings.burst_size as f64,
            last_refill_ms: now,
            rate_per_sec: settings.max_operations_per_second,
            burst: settings.burst_size as f64,
            window_ms: settings.window_ms,
            factor: 1.0,
        }
    }

    fn try_acquire(&mut self, now: i64) -> bool {
        let elapsed_s = (now - self.last_refill_ms).clamp(0, self.window_ms) as f64 / 1_000.0;
        self.tokens = (self.tokens + elapsed_s * self.rate_per_sec * self.factor).min(self.burst);
        self.last_refill_ms = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Gate consulted by workers before each dispatch
pub struct DispatchGate {
    paused: AtomicBool,
    bucket: Option<Mutex<TokenBucket>>,
    adaptive: bool,
    emergency_throttled: AtomicBool,
    /// Used to skip alternate dispatches when the emergency brake is on
    /// but no token bucket is configured
    acquire_counter: std::sync::atomic::AtomicU64,
}

impl DispatchGate {
    pub fn new(throttle: Option<&ThrottleSettings>, adaptive: bool, now: i64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            bucket: throttle.map(|t| Mutex::new(TokenBucket::new(t, now))),
            adaptive,
            emergency_throttled: AtomicBool::new(false),
            acquire_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            info!("Dispatch paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            info!("Dispatch resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Resource monitor's Throttle mitigation: halve the dispatch rate
    pub fn set_emergency_throttle(&self, on: bool) {
        let was = self.emergency_throttled.swap(on, Ordering::SeqCst);
        if was != on {
            info!(emergency_throttle = on, "Emergency throttle changed");
        }
    }

    /// Try to pass the rate gate. Always passes when no throttle is
    /// configured. `error_rate` feeds adaptive throttling.
    pub fn try_acquire(&self, now: i64, error_rate: f64) -> bool {
        let Some(bucket) = &self.bucket else {
            // No rate limit configured; the emergency brake halves
            // dispatch by skipping alternate acquisitions
            if self.emergency_throttled.load(Ordering::SeqCst) {
                let n = self.acquire_counter.fetch_add(1, Ordering::SeqCst);
                return n % 2 == 0;
            }
            return true;
        };

        let mut bucket = bucket.lock().unwrap();
        bucket.factor = self.current_factor(error_rate);
        let acquired = bucket.try_acquire(now);
        if !acquired {
            debug!(error_rate = %error_rate, "Dispatch throttled");
        }
        acquired
    }

    fn current_factor(&self, error_rate: f64) -> f64 {
        let mut factor = 1.0;
        if self.adaptive && error_rate > 0.1 {
            // Linear backoff: 50% errors -> roughly half rate
            factor *= (1.0 - error_rate).max(0.1);
        }
        if self.emergency_throttled.load(Ordering::SeqCst) {
            factor *= 0.5;
        }
        factor
    }
}
