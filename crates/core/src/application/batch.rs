// Batch Optimizer
//
// Coalesces bursts of similar pending operations into a single item
// before admission, reducing queue churn for identical workloads.

use crate::application::queue::{EnqueueOptions, OperationQueue};
use crate::config::BatchStrategy;
use crate::domain::condition::Condition;
use crate::domain::operation::{Operation, OperationKind, OperationPayload, QueueItem};
use crate::error::Result;
use std::collections::BTreeMap;
use tracing::info;

pub struct BatchOptimizer {
    strategies: Vec<BatchStrategy>,
}

impl BatchOptimizer {
    pub fn new(strategies: Vec<BatchStrategy>) -> Self {
        Self { strategies }
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Admit an operation, coalescing it with matching pending items when
    /// a strategy's count threshold is reached.
    ///
    /// Coalescing groups by operation kind: the merged item carries all
    /// payloads as a batch, the union of dependencies, and the highest
    /// priority among the originals.
    pub fn enqueue_optimized(
        &self,
        queue: &OperationQueue,
        operation: Operation,
        options: EnqueueOptions,
    ) -> Result<String> {
        let id = queue.enqueue(operation, options)?;
        let Some(item) = queue.get(&id) else {
            return Ok(id);
        };

        for strategy in &self.strategies {
            if !Condition::all_match(&strategy.conditions, &item) {
                continue;
            }
            let kind = item.operation.kind.clone();
            let group =
                queue.pending_matching(|candidate| candidate.operation.kind == kind);
            if group.len() < strategy.min_count {
                continue;
            }

            info!(
                strategy = %strategy.name,
                kind = %kind,
                count = group.len(),
                "Coalescing pending operations"
            );
            return self.coalesce(queue, &kind, &group);
        }

        Ok(id)
    }

    fn coalesce(
        &self,
        queue: &OperationQueue,
        kind: &OperationKind,
        group: &[QueueItem],
    ) -> Result<String> {
        let ids: Vec<String> = group.iter().map(|i| i.id.clone()).collect();

        let payloads: Vec<serde_json::Value> = group
            .iter()
            .map(|i| i.operation.payload.as_value().clone())
            .collect();
        let merged_operation = Operation::new(
            OperationKind::new(format!("{}:batch", kind)),
            OperationPayload::new(serde_json::json!({
                "batched": payloads,
                "source_ids": ids,
            })),
        );

        let priority = group
            .iter()
            .map(|i| i.priority)
            .max_by_key(|p| p.rank())
            .unwrap_or_default();

        let mut dependencies: Vec<String> = group
            .iter()
            .flat_map(|i| i.dependencies.iter().cloned())
            // A dependency on a member of the batch dissolves into the batch
            .filter(|dep| !ids.contains(dep))
            .collect();
        dependencies.sort();
        dependencies.dedup();

        let mut metadata = BTreeMap::new();
        for item in group {
            for (k, v) in &item.metadata {
                metadata.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        metadata.insert("batch_size".to_string(), group.len().to_string());

        queue.coalesce_pending(&ids, merged_operation, priority, dependencies, metadata)
    }
}
