//! Events flowing between stages.
//!
//! Every event carries its runtime [`EventType`], which `emit` checks against
//! the declared types of the output port.

use crate::model::DataflowDirection;
use crate::pipeline::port::EventType;
use crate::record::{MonitoringRecord, OperationExecutionRecord};
use crate::trace::{ExecutionTrace, OperationCallEvent, OperationEvent};
use serde::{Deserialize, Serialize};

/// Where a dataflow goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataflowTarget {
    Operation(OperationEvent),
    Storage(String),
}

/// Observed data transfer from an operation to another operation or a storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataflowEvent {
    pub source: OperationEvent,
    pub target: DataflowTarget,
    pub direction: DataflowDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Record(MonitoringRecord),
    Trace(ExecutionTrace),
    OperationCall(OperationCallEvent),
    Dataflow(DataflowEvent),
}

impl PipelineEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            PipelineEvent::Record(MonitoringRecord::OperationExecution(_)) => {
                EventType::OperationExecution
            }
            PipelineEvent::Record(MonitoringRecord::Branching(_)) => EventType::Branching,
            PipelineEvent::Trace(_) => EventType::ExecutionTrace,
            PipelineEvent::OperationCall(_) => EventType::OperationCall,
            PipelineEvent::Dataflow(_) => EventType::Dataflow,
        }
    }

    pub fn as_record(&self) -> Option<&MonitoringRecord> {
        match self {
            PipelineEvent::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_operation_execution(&self) -> Option<&OperationExecutionRecord> {
        self.as_record().and_then(MonitoringRecord::as_operation_execution)
    }

    pub fn as_trace(&self) -> Option<&ExecutionTrace> {
        match self {
            PipelineEvent::Trace(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_operation_call(&self) -> Option<&OperationCallEvent> {
        match self {
            PipelineEvent::OperationCall(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_dataflow(&self) -> Option<&DataflowEvent> {
        match self {
            PipelineEvent::Dataflow(d) => Some(d),
            _ => None,
        }
    }
}

impl From<MonitoringRecord> for PipelineEvent {
    fn from(record: MonitoringRecord) -> Self {
        PipelineEvent::Record(record)
    }
}

impl From<OperationExecutionRecord> for PipelineEvent {
    fn from(record: OperationExecutionRecord) -> Self {
        PipelineEvent::Record(record.into())
    }
}

impl From<ExecutionTrace> for PipelineEvent {
    fn from(trace: ExecutionTrace) -> Self {
        PipelineEvent::Trace(trace)
    }
}

impl From<OperationCallEvent> for PipelineEvent {
    fn from(call: OperationCallEvent) -> Self {
        PipelineEvent::OperationCall(call)
    }
}

impl From<DataflowEvent> for PipelineEvent {
    fn from(flow: DataflowEvent) -> Self {
        PipelineEvent::Dataflow(flow)
    }
}

/// Runtime configuration value for a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::BranchingRecord;

    #[test]
    fn test_event_type() {
        let branch: PipelineEvent = MonitoringRecord::from(BranchingRecord {
            timestamp: 0,
            branch_id: 1,
            branching_outcome: 0,
        })
        .into();
        assert_eq!(branch.event_type(), EventType::Branching);
        assert!(branch.as_operation_execution().is_none());

        let flow: PipelineEvent = DataflowEvent {
            source: OperationEvent {
                host_name: "srv0".into(),
                component_signature: "A".into(),
                operation_signature: "f()".into(),
            },
            target: DataflowTarget::Storage("orders".into()),
            direction: DataflowDirection::Write,
        }
        .into();
        assert_eq!(flow.event_type(), EventType::Dataflow);
        assert!(flow.as_dataflow().is_some());
    }

    #[test]
    fn test_config_value() {
        assert_eq!(ConfigValue::Bool(true).as_bool(), Some(true));
        assert_eq!(ConfigValue::Int(42).as_int(), Some(42));
        assert_eq!(ConfigValue::Float(2.5).as_float(), Some(2.5));
        assert_eq!(ConfigValue::String("hello".into()).as_str(), Some("hello"));
        assert_eq!(ConfigValue::Int(1).as_str(), None);
    }
}
