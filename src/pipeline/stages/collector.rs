//! CollectorStage: keeps every event it receives, for inspection.

use crate::pipeline::event::{ConfigValue, PipelineEvent};
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stage::{StageContext, StageError};
use std::sync::{Arc, Mutex, PoisonError};

pub const INPUT: &str = "events";

#[derive(Default)]
struct Collected {
    events: Vec<PipelineEvent>,
    terminate_count: u32,
}

/// Read side of a [`CollectorStage`]; stays valid after the stage moved into a pipeline.
#[derive(Clone, Default)]
pub struct CollectorHandle {
    inner: Arc<Mutex<Collected>>,
}

impl CollectorHandle {
    fn with<T>(&self, f: impl FnOnce(&mut Collected) -> T) -> T {
        f(&mut self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.with(|c| c.events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.with(|c| c.events.clone())
    }

    /// Drain what was collected so far.
    pub fn take(&self) -> Vec<PipelineEvent> {
        self.with(|c| std::mem::take(&mut c.events))
    }

    pub fn is_terminated(&self) -> bool {
        self.terminate_count() > 0
    }

    pub fn terminate_count(&self) -> u32 {
        self.with(|c| c.terminate_count)
    }
}

pub struct CollectorStage {
    ports: [PortDescriptor; 1],
    handle: CollectorHandle,
}

impl CollectorStage {
    /// Collector accepting any event type.
    pub fn new() -> (Self, CollectorHandle) {
        Self::with_event_types(&[EventType::Any])
    }

    pub fn with_event_types(event_types: &'static [EventType]) -> (Self, CollectorHandle) {
        let handle = CollectorHandle::default();
        let stage = Self {
            ports: [PortDescriptor::input(INPUT, event_types)],
            handle: handle.clone(),
        };
        (stage, handle)
    }

    pub fn name(&self) -> &str {
        "Collector"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn on_start(&mut self, _ctx: &StageContext) {}

    pub fn on_event(
        &mut self,
        _input: &str,
        event: &PipelineEvent,
        _ctx: &StageContext,
    ) -> Result<(), StageError> {
        self.handle.with(|c| c.events.push(event.clone()));
        Ok(())
    }

    pub fn on_terminate(&mut self, _ctx: &StageContext) {
        self.handle.with(|c| c.terminate_count += 1);
    }

    pub fn on_config_change(&mut self, key: &str, _value: &ConfigValue) -> Result<(), StageError> {
        Err(StageError::InvalidConfig {
            key: key.to_string(),
            message: "stage has no settings".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::record::{BranchingRecord, MonitoringRecord};

    #[test]
    fn test_typed_collector_refuses_other_events() {
        let mut pipeline = Pipeline::new();
        let (collector, events) = CollectorStage::with_event_types(&[EventType::Branching]);
        let id = pipeline.add_stage(collector).unwrap();
        let branch = MonitoringRecord::from(BranchingRecord {
            timestamp: 1,
            branch_id: 2,
            branching_outcome: 3,
        });
        assert!(pipeline.inject(id, INPUT, branch));
        let execution = crate::record::OperationExecutionRecord {
            component_signature: "A".into(),
            operation_signature: "f()".into(),
            session_id: String::new(),
            trace_id: 1,
            tin: 0,
            tout: 1,
            host_name: String::new(),
            eoi: 0,
            ess: 0,
        };
        assert!(!pipeline.inject(id, INPUT, execution));
        assert_eq!(events.take().len(), 1);
        assert!(events.is_empty());
        assert!(!events.is_terminated());
    }
}
