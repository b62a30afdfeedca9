//! Stages that feed the shared models.

use crate::model::signature::resolve_operation;
use crate::model::{
    ExecutionModel, ExecutionModelAssembler, SharedModel, SignatureExtractor, SourceModel,
    StorageRef, TypeModel, TypeModelAssembler,
};
use crate::pipeline::event::{ConfigValue, DataflowTarget, PipelineEvent};
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stage::{StageContext, StageError};
use crate::trace::OperationEvent;
use std::sync::Arc;

pub const EVENTS: &str = "events";
pub const FORWARD: &str = "forward";
pub const CALLS: &str = "calls";
pub const DATAFLOWS: &str = "dataflows";

const TYPE_EVENTS: &[EventType] = &[
    EventType::MonitoringRecord,
    EventType::ExecutionTrace,
    EventType::OperationCall,
];

static TYPE_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(EVENTS, TYPE_EVENTS),
    PortDescriptor::output(FORWARD, TYPE_EVENTS),
];

static EXECUTION_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(CALLS, &[EventType::OperationCall]),
    PortDescriptor::input(DATAFLOWS, &[EventType::Dataflow]),
];

/// Registers every operation it sees in the [`TypeModel`].
///
/// Accepts raw records, whole traces and operation calls; branching records
/// carry no operation and are skipped. Every accepted event is passed on
/// unchanged on `forward`, so further stages can be chained behind it.
pub struct TypeModelAssemblerStage {
    assembler: TypeModelAssembler,
    created: u64,
}

impl TypeModelAssemblerStage {
    pub fn new(
        model: SharedModel<TypeModel>,
        sources: SharedModel<SourceModel>,
        extractor: Arc<dyn SignatureExtractor>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            assembler: TypeModelAssembler::new(model, sources, extractor, source_label),
            created: 0,
        }
    }

    pub fn name(&self) -> &str {
        "TypeModelAssembler"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        TYPE_PORTS
    }

    pub fn on_start(&mut self, _ctx: &StageContext) {}

    fn add(&mut self, event: &OperationEvent) -> Result<(), StageError> {
        let (_, upsert) = self.assembler.add_operation(event)?;
        if upsert.is_created() {
            self.created += 1;
        }
        Ok(())
    }

    pub fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        match event {
            PipelineEvent::Record(record) => {
                if let Some(execution) = record.as_operation_execution() {
                    self.add(&OperationEvent::from(execution))?;
                }
            }
            PipelineEvent::Trace(trace) => {
                for execution in trace.executions() {
                    self.add(&OperationEvent::from(execution))?;
                }
            }
            PipelineEvent::OperationCall(call) => {
                self.add(&call.caller)?;
                self.add(&call.callee)?;
            }
            PipelineEvent::Dataflow(_) => return Err(StageError::unexpected(input, event)),
        }
        ctx.emit(FORWARD, event.clone());
        Ok(())
    }

    pub fn on_terminate(&mut self, _ctx: &StageContext) {
        tracing::debug!(created = self.created, "Type model assembly done");
    }

    pub fn on_config_change(&mut self, key: &str, _value: &ConfigValue) -> Result<(), StageError> {
        Err(StageError::InvalidConfig {
            key: key.to_string(),
            message: "stage has no settings".to_string(),
        })
    }
}

/// Records invocations and dataflows in the [`ExecutionModel`].
pub struct ExecutionModelAssemblerStage {
    assembler: ExecutionModelAssembler,
    extractor: Arc<dyn SignatureExtractor>,
    calls: u64,
    dataflows: u64,
}

impl ExecutionModelAssemblerStage {
    pub fn new(
        model: SharedModel<ExecutionModel>,
        sources: SharedModel<SourceModel>,
        extractor: Arc<dyn SignatureExtractor>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            assembler: ExecutionModelAssembler::new(model, sources, source_label),
            extractor,
            calls: 0,
            dataflows: 0,
        }
    }

    pub fn name(&self) -> &str {
        "ExecutionModelAssembler"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        EXECUTION_PORTS
    }

    pub fn on_start(&mut self, _ctx: &StageContext) {}

    pub fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        _ctx: &StageContext,
    ) -> Result<(), StageError> {
        let extractor = self.extractor.as_ref();
        match event {
            PipelineEvent::OperationCall(call) if input == CALLS => {
                let caller = resolve_operation(extractor, &call.caller);
                let callee = resolve_operation(extractor, &call.callee);
                self.assembler
                    .add_operation_call(&caller, &callee, Some(call.duration_nanos))?;
                self.calls += 1;
            }
            PipelineEvent::Dataflow(flow) if input == DATAFLOWS => {
                let source = resolve_operation(extractor, &flow.source);
                match &flow.target {
                    DataflowTarget::Operation(target) => {
                        let target = resolve_operation(extractor, target);
                        self.assembler
                            .add_operation_dataflow(&source, &target, flow.direction)?;
                    }
                    DataflowTarget::Storage(name) => {
                        self.assembler.add_storage_dataflow(
                            &source,
                            &StorageRef::new(name.as_str()),
                            flow.direction,
                        )?;
                    }
                }
                self.dataflows += 1;
            }
            _ => return Err(StageError::unexpected(input, event)),
        }
        Ok(())
    }

    pub fn on_terminate(&mut self, _ctx: &StageContext) {
        tracing::debug!(
            calls = self.calls,
            dataflows = self.dataflows,
            "Execution model assembly done"
        );
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
    use crate::model::{DataflowDirection, IdentitySignatureExtractor, ModelSet, OperationRef};
    use crate::pipeline::event::DataflowEvent;
    use crate::pipeline::id::StageId;
    use crate::pipeline::stages::CollectorStage;
    use crate::pipeline::Pipeline;
    use crate::record::{BranchingRecord, MonitoringRecord, OperationExecutionRecord};
    use crate::trace::OperationCallEvent;

    fn op(component: &str, operation: &str) -> OperationEvent {
        OperationEvent {
            host_name: "srv0".into(),
            component_signature: component.into(),
            operation_signature: operation.into(),
        }
    }

    fn setup() -> (Pipeline, ModelSet, StageId, StageId) {
        let models = ModelSet::new();
        let extractor: Arc<dyn SignatureExtractor> = Arc::new(IdentitySignatureExtractor);
        let mut pipeline = Pipeline::new();
        let types = pipeline
            .add_stage(TypeModelAssemblerStage::new(
                models.types.clone(),
                models.sources.clone(),
                extractor.clone(),
                "test",
            ))
            .unwrap();
        let execution = pipeline
            .add_stage(ExecutionModelAssemblerStage::new(
                models.execution.clone(),
                models.sources.clone(),
                extractor,
                "test",
            ))
            .unwrap();
        (pipeline, models, types, execution)
    }

    #[test]
    fn test_type_stage_registers_records_and_calls() {
        let (pipeline, models, types, _) = setup();
        let record = OperationExecutionRecord {
            component_signature: "shop.Cart".into(),
            operation_signature: "add()".into(),
            session_id: String::new(),
            trace_id: 1,
            tin: 0,
            tout: 1,
            host_name: "srv0".into(),
            eoi: 0,
            ess: 0,
        };
        assert!(pipeline.inject(types, EVENTS, record.clone()));
        assert!(pipeline.inject(types, EVENTS, record));
        assert!(pipeline.inject(
            types,
            EVENTS,
            MonitoringRecord::from(BranchingRecord {
                timestamp: 0,
                branch_id: 1,
                branching_outcome: 0,
            })
        ));
        assert!(pipeline.inject(
            types,
            EVENTS,
            OperationCallEvent {
                trace_id: 1,
                caller: op("shop.Cart", "add()"),
                callee: op("shop.Stock", "reserve()"),
                duration_nanos: 5,
            }
        ));

        let model = models.types.read().unwrap();
        assert_eq!(model.component_count(), 2);
        assert_eq!(model.operation_count(), 2);
    }

    #[test]
    fn test_type_stage_forwards_events() {
        let (mut pipeline, models, types, _) = setup();
        let (collector, forwarded) = CollectorStage::new();
        let sink = pipeline.add_stage(collector).unwrap();
        assert!(pipeline.connect(types, FORWARD, sink, "events"));

        let call = OperationCallEvent {
            trace_id: 1,
            caller: op("A", "f()"),
            callee: op("B", "g()"),
            duration_nanos: 3,
        };
        assert!(pipeline.inject(types, EVENTS, call.clone()));
        assert_eq!(forwarded.events(), vec![PipelineEvent::from(call)]);
        assert_eq!(models.types.read().unwrap().component_count(), 2);
    }

    #[test]
    fn test_execution_stage_aggregates_calls() {
        let (pipeline, models, _, execution) = setup();
        for duration in [10, 30] {
            assert!(pipeline.inject(
                execution,
                CALLS,
                OperationCallEvent {
                    trace_id: 1,
                    caller: op("A", "f()"),
                    callee: op("B", "g()"),
                    duration_nanos: duration,
                }
            ));
        }
        let model = models.execution.read().unwrap();
        assert_eq!(model.invocation_count(), 1);
        let invocation = model
            .invocation(&OperationRef::new("A", "f()"), &OperationRef::new("B", "g()"))
            .unwrap();
        assert_eq!(invocation.statistics.count, 2);
        assert_eq!(invocation.statistics.mean_duration_nanos(), Some(20.0));
    }

    #[test]
    fn test_execution_stage_records_dataflows() {
        let (pipeline, models, _, execution) = setup();
        assert!(pipeline.inject(
            execution,
            DATAFLOWS,
            DataflowEvent {
                source: op("A", "f()"),
                target: DataflowTarget::Storage("orders".into()),
                direction: DataflowDirection::Write,
            }
        ));
        assert!(pipeline.inject(
            execution,
            DATAFLOWS,
            DataflowEvent {
                source: op("A", "f()"),
                target: DataflowTarget::Operation(op("B", "g()")),
                direction: DataflowDirection::Read,
            }
        ));
        // Calls on the dataflow port are refused by the port type.
        assert!(!pipeline.inject(
            execution,
            DATAFLOWS,
            OperationCallEvent {
                trace_id: 1,
                caller: op("A", "f()"),
                callee: op("B", "g()"),
                duration_nanos: 1,
            }
        ));

        let model = models.execution.read().unwrap();
        assert_eq!(model.storage_dataflows().count(), 1);
        assert_eq!(model.operation_dataflows().count(), 1);
        assert_eq!(model.invocation_count(), 0);
    }
}
