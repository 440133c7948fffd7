//! Priority Scheduler - Orders admitted items and gates eligibility
//!
//! Dispatch order: highest priority class first; within a class ascending
//! eligibility time, then admission order (stable FIFO tie-break).
//! Dependency-blocked items are skipped until every dependency reports
//! Completed.

use crate::config::PriorityRule;
use crate::domain::condition::Condition;
use crate::domain::operation::{ItemStatus, Priority, QueueItem};
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

pub struct PriorityScheduler {
    priority_rules: Vec<PriorityRule>,
}

impl PriorityScheduler {
    pub fn new(priority_rules: Vec<PriorityRule>) -> Self {
        Self { priority_rules }
    }

    /// Admission-time priority boost: the first matching rule wins, and a
    /// boost never lowers the caller's class.
    pub fn admission_priority(&self, item: &QueueItem) -> Priority {
        for rule in &self.priority_rules {
            if Condition::all_match(&rule.conditions, item)
                && rule.boost_to.rank() > item.priority.rank()
            {
                debug!(
                    item_id = %item.id,
                    from = %item.priority,
                    to = %rule.boost_to,
                    "Priority boosted at admission"
                );
                return rule.boost_to;
            }
        }
        item.priority
    }

    /// A pending item is eligible once its backoff time has been reached,
    /// it has not been flagged for cancellation, and every dependency is
    /// satisfied.
    pub fn is_eligible(&self, item: &QueueItem, items: &HashMap<String, QueueItem>, now: i64) -> bool {
        if item.status != ItemStatus::Pending || item.cancel_requested {
            return false;
        }
        if item.scheduled_at > now {
            return false;
        }
        self.dependencies_satisfied(item, items)
    }

    /// A dependency is satisfied when Completed, or when the id is absent
    /// from the queue (completed earlier and already cleaned up).
    pub fn dependencies_satisfied(
        &self,
        item: &QueueItem,
        items: &HashMap<String, QueueItem>,
    ) -> bool {
        item.dependencies.iter().all(|dep_id| {
            items
                .get(dep_id)
                .map(|dep| dep.status == ItemStatus::Completed)
                .unwrap_or(true)
        })
    }

    /// Pick the next item to dispatch among pending items.
    ///
    /// Returns the id of the highest-priority, earliest-eligible,
    /// dependency-satisfied item.
    pub fn next_eligible(&self, items: &HashMap<String, QueueItem>, now: i64) -> Option<String> {
        items
            .values()
            .filter(|item| self.is_eligible(item, items, now))
            .min_by_key(|item| (Reverse(item.priority.rank()), item.scheduled_at, item.seq))
            .map(|item| item.id.clone())
    }

    /// Eligible item count, used by batch-mode dispatch pacing
    pub fn eligible_count(&self, items: &HashMap<String, QueueItem>, now: i64) -> usize {
        items
            .values()
            .filter(|item| self.is_eligible(item, items, now))
            .count()
    }
}
