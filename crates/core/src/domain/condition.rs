// Condition Predicates
//
// Closed, statically-typed predicate representation evaluated against
// queue items. Replaces free-form rule expressions: no caller-supplied
// code is ever executed.

use crate::domain::operation::QueueItem;
use serde::{Deserialize, Serialize};

/// Item field a condition inspects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Priority,
    Kind,
    Attempts,
    Metadata(String),
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl ConditionOp {
    pub fn compare_f64(self, left: f64, right: f64) -> bool {
        match self {
            ConditionOp::Eq => left == right,
            ConditionOp::Ne => left != right,
            ConditionOp::Gt => left > right,
            ConditionOp::Gte => left >= right,
            ConditionOp::Lt => left < right,
            ConditionOp::Lte => left <= right,
        }
    }

    fn compare_str(self, left: &str, right: &str) -> bool {
        match self {
            ConditionOp::Eq => left == right,
            ConditionOp::Ne => left != right,
            ConditionOp::Gt => left > right,
            ConditionOp::Gte => left >= right,
            ConditionOp::Lt => left < right,
            ConditionOp::Lte => left <= right,
        }
    }
}

/// Literal a field is compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(f64),
    Text(String),
}

/// One predicate: `field op value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub op: ConditionOp,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: ConditionField, op: ConditionOp, value: ConditionValue) -> Self {
        Self { field, op, value }
    }

    /// Evaluate against an item.
    ///
    /// Priority and Attempts compare numerically (priority by rank);
    /// Kind and Metadata compare as strings. A missing metadata key never
    /// matches.
    pub fn matches(&self, item: &QueueItem) -> bool {
        match (&self.field, &self.value) {
            (ConditionField::Priority, ConditionValue::Text(want)) => want
                .parse::<crate::domain::Priority>()
                .map(|p| self.op.compare_f64(item.priority.rank() as f64, p.rank() as f64))
                .unwrap_or(false),
            (ConditionField::Priority, ConditionValue::Number(rank)) => {
                self.op.compare_f64(item.priority.rank() as f64, *rank)
            }
            (ConditionField::Kind, ConditionValue::Text(want)) => {
                self.op.compare_str(item.operation.kind.as_str(), want)
            }
            (ConditionField::Attempts, ConditionValue::Number(want)) => {
                self.op.compare_f64(item.attempts as f64, *want)
            }
            (ConditionField::Metadata(key), ConditionValue::Text(want)) => item
                .metadata
                .get(key)
                .map(|v| self.op.compare_str(v, want))
                .unwrap_or(false),
            (ConditionField::Metadata(key), ConditionValue::Number(want)) => item
                .metadata
                .get(key)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| self.op.compare_f64(v, *want))
                .unwrap_or(false),
            // Type mismatches never match
            _ => false,
        }
    }

    /// All conditions must hold (empty list matches everything)
    pub fn all_match(conditions: &[Condition], item: &QueueItem) -> bool {
        conditions.iter().all(|c| c.matches(item))
    }
}
