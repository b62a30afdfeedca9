//! Execution model: aggregated invocations and dataflows.

use crate::model::types::{OperationRef, StorageRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count and duration aggregate of an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationStatistics {
    pub count: u64,
    /// Occurrences that came with a duration.
    #[serde(default)]
    pub timed_count: u64,
    /// Sum of all known durations in nanoseconds.
    pub total_duration_nanos: i64,
    pub min_duration_nanos: Option<i64>,
    pub max_duration_nanos: Option<i64>,
}

impl InvocationStatistics {
    /// Account one occurrence. Occurrences without a duration only count.
    pub fn record(&mut self, duration_nanos: Option<i64>) {
        self.count += 1;
        if let Some(d) = duration_nanos {
            self.timed_count += 1;
            self.total_duration_nanos = self.total_duration_nanos.saturating_add(d);
            self.min_duration_nanos = Some(self.min_duration_nanos.map_or(d, |m| m.min(d)));
            self.max_duration_nanos = Some(self.max_duration_nanos.map_or(d, |m| m.max(d)));
        }
    }

    /// Mean over the occurrences that carried a duration.
    pub fn mean_duration_nanos(&self) -> Option<f64> {
        (self.timed_count > 0).then(|| self.total_duration_nanos as f64 / self.timed_count as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub caller: OperationRef,
    pub callee: OperationRef,
    pub statistics: InvocationStatistics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataflowDirection {
    Read,
    Write,
    Both,
}

impl DataflowDirection {
    /// Combined direction of two observations of the same edge.
    pub fn merge(self, other: DataflowDirection) -> DataflowDirection {
        if self == other {
            self
        } else {
            DataflowDirection::Both
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDataflow {
    pub source: OperationRef,
    pub target: OperationRef,
    pub direction: DataflowDirection,
    pub statistics: InvocationStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDataflow {
    pub source: OperationRef,
    pub storage: StorageRef,
    pub direction: DataflowDirection,
    pub statistics: InvocationStatistics,
}

/// Aggregates keyed by their endpoint pairs. Each key maps to exactly one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionModel {
    pub(crate) invocations: BTreeMap<(OperationRef, OperationRef), Invocation>,
    pub(crate) operation_dataflows: BTreeMap<(OperationRef, OperationRef), OperationDataflow>,
    pub(crate) storage_dataflows: BTreeMap<(OperationRef, StorageRef), StorageDataflow>,
}

impl ExecutionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invocation(&self, caller: &OperationRef, callee: &OperationRef) -> Option<&Invocation> {
        self.invocations.get(&(caller.clone(), callee.clone()))
    }

    pub fn invocations(&self) -> impl Iterator<Item = &Invocation> {
        self.invocations.values()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.len()
    }

    pub fn operation_dataflow(
        &self,
        source: &OperationRef,
        target: &OperationRef,
    ) -> Option<&OperationDataflow> {
        self.operation_dataflows.get(&(source.clone(), target.clone()))
    }

    pub fn operation_dataflows(&self) -> impl Iterator<Item = &OperationDataflow> {
        self.operation_dataflows.values()
    }

    pub fn storage_dataflow(
        &self,
        source: &OperationRef,
        storage: &StorageRef,
    ) -> Option<&StorageDataflow> {
        self.storage_dataflows.get(&(source.clone(), storage.clone()))
    }

    pub fn storage_dataflows(&self) -> impl Iterator<Item = &StorageDataflow> {
        self.storage_dataflows.values()
    }

    /// Invocations leaving `caller`.
    pub fn callees_of<'a>(&'a self, caller: &'a OperationRef) -> impl Iterator<Item = &'a Invocation> + 'a {
        self.invocations.values().filter(move |i| &i.caller == caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_record() {
        let mut stats = InvocationStatistics::default();
        assert_eq!(stats.mean_duration_nanos(), None);
        stats.record(Some(10));
        stats.record(Some(30));
        stats.record(None);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.timed_count, 2);
        assert_eq!(stats.total_duration_nanos, 40);
        assert_eq!(stats.min_duration_nanos, Some(10));
        assert_eq!(stats.max_duration_nanos, Some(30));
        // Untimed occurrences do not dilute the mean.
        assert_eq!(stats.mean_duration_nanos(), Some(20.0));
    }

    #[test]
    fn test_untimed_statistics_have_no_mean() {
        let mut stats = InvocationStatistics::default();
        stats.record(None);
        stats.record(None);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_duration_nanos(), None);
    }

    #[test]
    fn test_direction_merge() {
        use DataflowDirection::*;
        assert_eq!(Read.merge(Read), Read);
        assert_eq!(Read.merge(Write), Both);
        assert_eq!(Both.merge(Write), Both);
    }
}
