//! TimestampFilterStage: splits records by a time window.
//!
//! An execution passes when `not_before <= tin` and `tout <= not_after`;
//! other records pass when their timestamp lies in the window. Both bounds
//! are inclusive. Records outside the window go to the `outside` port.

use crate::config::FilterConfig;
use crate::pipeline::event::{ConfigValue, PipelineEvent};
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stage::{StageContext, StageError};
use crate::record::MonitoringRecord;

pub const INPUT: &str = "records";
pub const WITHIN: &str = "within";
pub const OUTSIDE: &str = "outside";

/// Config keys.
pub const NOT_BEFORE: &str = "not_before";
pub const NOT_AFTER: &str = "not_after";

const RECORDS: &[EventType] = &[EventType::MonitoringRecord];

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(INPUT, RECORDS),
    PortDescriptor::output(WITHIN, RECORDS),
    PortDescriptor::output(OUTSIDE, RECORDS),
];

pub struct TimestampFilterStage {
    not_before: i64,
    not_after: i64,
    passed: u64,
    rejected: u64,
}

impl TimestampFilterStage {
    pub fn new(not_before: i64, not_after: i64) -> Self {
        Self {
            not_before,
            not_after,
            passed: 0,
            rejected: 0,
        }
    }

    /// Passes everything.
    pub fn unbounded() -> Self {
        Self::new(i64::MIN, i64::MAX)
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(
            config.not_before.unwrap_or(i64::MIN),
            config.not_after.unwrap_or(i64::MAX),
        )
    }

    pub fn name(&self) -> &str {
        "TimestampFilter"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn on_start(&mut self, _ctx: &StageContext) {}

    pub fn is_within(&self, record: &MonitoringRecord) -> bool {
        match record {
            MonitoringRecord::OperationExecution(e) => {
                self.not_before <= e.tin && e.tout <= self.not_after
            }
            MonitoringRecord::Branching(b) => {
                self.not_before <= b.timestamp && b.timestamp <= self.not_after
            }
        }
    }

    pub fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        let record = event
            .as_record()
            .ok_or_else(|| StageError::unexpected(input, event))?;
        if self.is_within(record) {
            self.passed += 1;
            ctx.emit(WITHIN, record.clone());
        } else {
            self.rejected += 1;
            ctx.emit(OUTSIDE, record.clone());
        }
        Ok(())
    }

    pub fn on_terminate(&mut self, _ctx: &StageContext) {
        tracing::debug!(passed = self.passed, rejected = self.rejected, "Timestamp filter done");
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<(), StageError> {
        let bound = value.as_int().ok_or_else(|| StageError::InvalidConfig {
            key: key.to_string(),
            message: "expected an integer timestamp".to_string(),
        })?;
        match key {
            NOT_BEFORE => self.not_before = bound,
            NOT_AFTER => self.not_after = bound,
            _ => {
                return Err(StageError::InvalidConfig {
                    key: key.to_string(),
                    message: "unknown key".to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn bounds(&self) -> (i64, i64) {
        (self.not_before, self.not_after)
    }
}

impl Default for TimestampFilterStage {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BranchingRecord, OperationExecutionRecord};

    fn execution(tin: i64, tout: i64) -> MonitoringRecord {
        OperationExecutionRecord {
            component_signature: "A".into(),
            operation_signature: "f()".into(),
            session_id: String::new(),
            trace_id: 1,
            tin,
            tout,
            host_name: String::new(),
            eoi: 0,
            ess: 0,
        }
        .into()
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let filter = TimestampFilterStage::new(10, 20);
        assert!(filter.is_within(&execution(10, 20)));
        assert!(!filter.is_within(&execution(9, 20)));
        assert!(!filter.is_within(&execution(10, 21)));
        let branch = |t| {
            MonitoringRecord::from(BranchingRecord {
                timestamp: t,
                branch_id: 0,
                branching_outcome: 0,
            })
        };
        assert!(filter.is_within(&branch(20)));
        assert!(!filter.is_within(&branch(21)));
    }

    #[test]
    fn test_config_change() {
        let mut filter = TimestampFilterStage::unbounded();
        filter.on_config_change(NOT_BEFORE, &ConfigValue::Int(5)).unwrap();
        assert_eq!(filter.bounds().0, 5);
        assert!(filter
            .on_config_change(NOT_AFTER, &ConfigValue::String("x".into()))
            .is_err());
        assert!(filter.on_config_change("window", &ConfigValue::Int(1)).is_err());
    }

    #[test]
    fn test_from_config() {
        let filter = TimestampFilterStage::from_config(&FilterConfig {
            not_before: Some(1),
            not_after: None,
        });
        assert_eq!(filter.bounds(), (1, i64::MAX));
    }
}
