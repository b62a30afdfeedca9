//! Call-tree reconstruction from correlated execution records.
//!
//! Records of one trace arrive flat and in exit order. Sorting them by eoi
//! yields entry order; the ess of each execution then determines its parent:
//! the closest preceding execution whose ess is exactly one less.
//!
//! ```text
//! eoi ess                 A.f()            (0, 0)
//!  0   0   A.f()          ├── B.g()        (1, 1)
//!  1   1   B.g()          │   └── C.h()    (2, 2)
//!  2   2   C.h()          └── B.k()        (3, 1)
//!  3   1   B.k()
//! ```

use crate::record::OperationExecutionRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a set of records does not form a valid call tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("Trace has no executions")]
    Empty,

    #[error("Execution with trace id {found} does not belong to trace {expected}")]
    ForeignExecution { expected: i64, found: i64 },

    #[error("Duplicate eoi {0}")]
    DuplicateEoi(i32),

    #[error("Missing eoi {expected} (next is {found})")]
    EoiGap { expected: i32, found: i32 },

    #[error("Root execution has ess {0}, expected 0")]
    InvalidRoot(i32),

    #[error("Execution eoi {eoi} with ess {ess} has no parent at ess {}", ess - 1)]
    InvalidNesting { eoi: i32, ess: i32 },
}

/// The operation identity of one execution, as seen by signature extractors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationEvent {
    pub host_name: String,
    pub component_signature: String,
    pub operation_signature: String,
}

impl From<&OperationExecutionRecord> for OperationEvent {
    fn from(record: &OperationExecutionRecord) -> Self {
        Self {
            host_name: record.host_name.clone(),
            component_signature: record.component_signature.clone(),
            operation_signature: record.operation_signature.clone(),
        }
    }
}

/// A caller → callee pair extracted from a reconstructed trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCallEvent {
    pub trace_id: i64,
    pub caller: OperationEvent,
    pub callee: OperationEvent,
    /// Callee duration in nanoseconds.
    pub duration_nanos: i64,
}

/// A re-nested call tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    trace_id: i64,
    /// Executions in eoi order; index == eoi.
    executions: Vec<OperationExecutionRecord>,
    /// Parent index per execution (`None` only for the root).
    parents: Vec<Option<usize>>,
}

impl ExecutionTrace {
    /// Re-nest the records of one trace.
    pub fn reconstruct(
        trace_id: i64,
        mut records: Vec<OperationExecutionRecord>,
    ) -> Result<Self, TraceError> {
        if records.is_empty() {
            return Err(TraceError::Empty);
        }
        if let Some(foreign) = records.iter().find(|r| r.trace_id != trace_id) {
            return Err(TraceError::ForeignExecution {
                expected: trace_id,
                found: foreign.trace_id,
            });
        }
        records.sort_by_key(|r| r.eoi);

        for (expected, record) in records.iter().enumerate() {
            let expected = expected as i32;
            if record.eoi < expected {
                return Err(TraceError::DuplicateEoi(record.eoi));
            }
            if record.eoi > expected {
                return Err(TraceError::EoiGap {
                    expected,
                    found: record.eoi,
                });
            }
        }
        if records[0].ess != 0 {
            return Err(TraceError::InvalidRoot(records[0].ess));
        }

        let mut parents = Vec::with_capacity(records.len());
        let mut stack: Vec<usize> = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            while let Some(&top) = stack.last() {
                if records[top].ess >= record.ess {
                    stack.pop();
                } else {
                    break;
                }
            }
            let parent = stack.last().copied();
            match parent {
                None if idx == 0 => {}
                Some(p) if records[p].ess == record.ess - 1 => {}
                _ => {
                    return Err(TraceError::InvalidNesting {
                        eoi: record.eoi,
                        ess: record.ess,
                    })
                }
            }
            parents.push(parent);
            stack.push(idx);
        }

        Ok(Self {
            trace_id,
            executions: records,
            parents,
        })
    }

    pub fn trace_id(&self) -> i64 {
        self.trace_id
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn root(&self) -> &OperationExecutionRecord {
        &self.executions[0]
    }

    pub fn executions(&self) -> &[OperationExecutionRecord] {
        &self.executions
    }

    pub fn parent_of(&self, index: usize) -> Option<&OperationExecutionRecord> {
        self.parents
            .get(index)
            .copied()
            .flatten()
            .map(|p| &self.executions[p])
    }

    /// Direct children of the execution at `index`, in entry order.
    pub fn children_of(&self, index: usize) -> impl Iterator<Item = &OperationExecutionRecord> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(move |(_, parent)| **parent == Some(index))
            .map(move |(child, _)| &self.executions[child])
    }

    /// Maximum ess in the trace, i.e. the tree height minus one.
    pub fn max_depth(&self) -> i32 {
        self.executions.iter().map(|e| e.ess).max().unwrap_or(0)
    }

    /// Root duration in nanoseconds.
    pub fn duration_nanos(&self) -> i64 {
        self.root().duration_nanos()
    }

    /// One call per non-root execution, in entry order.
    pub fn operation_calls(&self) -> Vec<OperationCallEvent> {
        self.executions
            .iter()
            .zip(&self.parents)
            .filter_map(|(callee, parent)| {
                parent.map(|p| OperationCallEvent {
                    trace_id: self.trace_id,
                    caller: OperationEvent::from(&self.executions[p]),
                    callee: OperationEvent::from(callee),
                    duration_nanos: callee.duration_nanos(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NO_SESSION_ID;

    fn exec(component: &str, op: &str, eoi: i32, ess: i32) -> OperationExecutionRecord {
        OperationExecutionRecord {
            component_signature: component.to_string(),
            operation_signature: op.to_string(),
            session_id: NO_SESSION_ID.to_string(),
            trace_id: 1,
            tin: 10 * eoi as i64,
            tout: 100 - eoi as i64,
            host_name: "srv0".to_string(),
            eoi,
            ess,
        }
    }

    #[test]
    fn test_reconstruct_from_exit_order() {
        // Exit order: deepest first, root last.
        let records = vec![
            exec("C", "h()", 2, 2),
            exec("B", "g()", 1, 1),
            exec("B", "k()", 3, 1),
            exec("A", "f()", 0, 0),
        ];
        let trace = ExecutionTrace::reconstruct(1, records).unwrap();
        assert_eq!(trace.len(), 4);
        assert_eq!(trace.root().operation_signature, "f()");
        assert_eq!(trace.parent_of(2).unwrap().operation_signature, "g()");
        assert_eq!(trace.parent_of(3).unwrap().operation_signature, "f()");
        let children: Vec<&str> = trace
            .children_of(0)
            .map(|e| e.operation_signature.as_str())
            .collect();
        assert_eq!(children, vec!["g()", "k()"]);
        assert_eq!(trace.max_depth(), 2);

        let calls = trace.operation_calls();
        let pairs: Vec<(&str, &str)> = calls
            .iter()
            .map(|c| (c.caller.operation_signature.as_str(), c.callee.operation_signature.as_str()))
            .collect();
        assert_eq!(pairs, vec![("f()", "g()"), ("g()", "h()"), ("f()", "k()")]);
    }

    #[test]
    fn test_rejects_gap_and_duplicates() {
        let gap = vec![exec("A", "f()", 0, 0), exec("B", "g()", 2, 1)];
        assert_eq!(
            ExecutionTrace::reconstruct(1, gap),
            Err(TraceError::EoiGap { expected: 1, found: 2 })
        );
        let dup = vec![exec("A", "f()", 0, 0), exec("B", "g()", 0, 1)];
        assert_eq!(
            ExecutionTrace::reconstruct(1, dup),
            Err(TraceError::DuplicateEoi(0))
        );
    }

    #[test]
    fn test_rejects_invalid_nesting() {
        let jump = vec![exec("A", "f()", 0, 0), exec("B", "g()", 1, 2)];
        assert_eq!(
            ExecutionTrace::reconstruct(1, jump),
            Err(TraceError::InvalidNesting { eoi: 1, ess: 2 })
        );
        let second_root = vec![exec("A", "f()", 0, 0), exec("B", "g()", 1, 0)];
        assert!(matches!(
            ExecutionTrace::reconstruct(1, second_root),
            Err(TraceError::InvalidNesting { eoi: 1, ess: 0 })
        ));
        let bad_root = vec![exec("A", "f()", 0, 1)];
        assert_eq!(
            ExecutionTrace::reconstruct(1, bad_root),
            Err(TraceError::InvalidRoot(1))
        );
    }

    #[test]
    fn test_rejects_foreign_and_empty() {
        let mut foreign = exec("A", "f()", 0, 0);
        foreign.trace_id = 2;
        assert_eq!(
            ExecutionTrace::reconstruct(1, vec![foreign]),
            Err(TraceError::ForeignExecution { expected: 1, found: 2 })
        );
        assert_eq!(ExecutionTrace::reconstruct(1, Vec::new()), Err(TraceError::Empty));
    }
}
