//! Monitoring records emitted by probes.
//!
//! A record is produced once per traced call (or per monitored branch) and is
//! never mutated afterwards. Records travel through writers into the analysis
//! pipeline, optionally via the binary log format in [`binary`].

pub mod binary;
pub mod registry;

pub use binary::{CodecError, RecordDecoder, RecordEncoder};
pub use registry::StringRegistry;

use serde::{Deserialize, Serialize};

/// Sentinel for an unset trace id.
pub const NO_TRACE_ID: i64 = -1;

/// Sentinel for an unset eoi / ess / timestamp.
pub const UNSET: i32 = -1;

/// Session id used when no session is registered on the thread.
pub const NO_SESSION_ID: &str = "<no-session-id>";

/// One traced operation execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationExecutionRecord {
    pub component_signature: String,
    pub operation_signature: String,
    pub session_id: String,
    pub trace_id: i64,
    /// Entry timestamp in nanoseconds.
    pub tin: i64,
    /// Exit timestamp in nanoseconds.
    pub tout: i64,
    pub host_name: String,
    /// Execution order index within the trace.
    pub eoi: i32,
    /// Execution stack size (call depth) at entry.
    pub ess: i32,
}

impl OperationExecutionRecord {
    /// Size of the fixed binary layout in bytes (strings count as registry ids).
    pub const SIZE: usize = 4 + 4 + 4 + 8 + 8 + 8 + 4 + 4 + 4;

    /// Duration of the execution in nanoseconds (zero if timestamps are inverted).
    pub fn duration_nanos(&self) -> i64 {
        (self.tout - self.tin).max(0)
    }

    /// Whether the correlation fields carry usable values.
    pub fn has_valid_correlation(&self) -> bool {
        self.trace_id != NO_TRACE_ID && self.eoi != UNSET && self.ess != UNSET
    }
}

/// A monitored branching decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchingRecord {
    pub timestamp: i64,
    pub branch_id: i32,
    pub branching_outcome: i32,
}

impl BranchingRecord {
    pub const SIZE: usize = 8 + 4 + 4;
}

/// Any record a probe can emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringRecord {
    OperationExecution(OperationExecutionRecord),
    Branching(BranchingRecord),
}

impl MonitoringRecord {
    /// Timestamp used for ordering and time-window filtering.
    pub fn timestamp(&self) -> i64 {
        match self {
            MonitoringRecord::OperationExecution(r) => r.tin,
            MonitoringRecord::Branching(r) => r.timestamp,
        }
    }

    pub fn as_operation_execution(&self) -> Option<&OperationExecutionRecord> {
        match self {
            MonitoringRecord::OperationExecution(r) => Some(r),
            MonitoringRecord::Branching(_) => None,
        }
    }
}

impl From<OperationExecutionRecord> for MonitoringRecord {
    fn from(record: OperationExecutionRecord) -> Self {
        MonitoringRecord::OperationExecution(record)
    }
}

impl From<BranchingRecord> for MonitoringRecord {
    fn from(record: BranchingRecord) -> Self {
        MonitoringRecord::Branching(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(eoi: i32, ess: i32) -> OperationExecutionRecord {
        OperationExecutionRecord {
            component_signature: "shop.Catalog".to_string(),
            operation_signature: "getItem()".to_string(),
            session_id: NO_SESSION_ID.to_string(),
            trace_id: 7,
            tin: 100,
            tout: 160,
            host_name: "srv0".to_string(),
            eoi,
            ess,
        }
    }

    #[test]
    fn test_duration() {
        assert_eq!(record(0, 0).duration_nanos(), 60);
        let mut inverted = record(0, 0);
        inverted.tout = 10;
        assert_eq!(inverted.duration_nanos(), 0);
    }

    #[test]
    fn test_correlation_validity() {
        assert!(record(0, 0).has_valid_correlation());
        assert!(!record(UNSET, 0).has_valid_correlation());
        assert!(!record(0, UNSET).has_valid_correlation());
    }

    #[test]
    fn test_monitoring_record_timestamp() {
        let rec: MonitoringRecord = record(0, 0).into();
        assert_eq!(rec.timestamp(), 100);
        let branch: MonitoringRecord = BranchingRecord {
            timestamp: 42,
            branch_id: 1,
            branching_outcome: 0,
        }
        .into();
        assert_eq!(branch.timestamp(), 42);
        assert!(branch.as_operation_execution().is_none());
    }
}
