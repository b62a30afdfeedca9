//! Test data builders for creating test records

use tracescope_rs::record::{MonitoringRecord, OperationExecutionRecord};

/// Builder for [`OperationExecutionRecord`]s with sensible defaults.
pub struct ExecutionBuilder {
    record: OperationExecutionRecord,
}

impl ExecutionBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            record: OperationExecutionRecord {
                component_signature: component.to_string(),
                operation_signature: operation.to_string(),
                session_id: String::new(),
                trace_id: 1,
                tin: 0,
                tout: 10,
                host_name: "srv0".to_string(),
                eoi: 0,
                ess: 0,
            },
        }
    }

    pub fn trace(mut self, trace_id: i64) -> Self {
        self.record.trace_id = trace_id;
        self
    }

    pub fn order(mut self, eoi: i32, ess: i32) -> Self {
        self.record.eoi = eoi;
        self.record.ess = ess;
        self
    }

    pub fn time(mut self, tin: i64, tout: i64) -> Self {
        self.record.tin = tin;
        self.record.tout = tout;
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.record.host_name = host.to_string();
        self
    }

    pub fn build(self) -> OperationExecutionRecord {
        self.record
    }

    pub fn record(self) -> MonitoringRecord {
        self.record.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_builder() {
        let record = ExecutionBuilder::new("A", "f()").trace(7).order(2, 1).build();
        assert_eq!(record.trace_id, 7);
        assert_eq!((record.eoi, record.ess), (2, 1));
        assert_eq!(record.host_name, "srv0");
    }
}
