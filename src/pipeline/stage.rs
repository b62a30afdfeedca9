//! Stage abstraction for the pipeline.
//!
//! Two-layer design:
//! - **`Stage` trait** for user-defined stages.
//! - **`BuiltinStage` enum** for the built-in stages, dispatched with a match
//!   instead of a vtable.
//!
//! `AnyStage` wraps either variant so the pipeline can handle both uniformly.
//! Readers are the pipeline's sources; they implement [`Reader`] and run on
//! their own thread.

use crate::error::TraceScopeError;
use crate::pipeline::controller::PipelineCore;
use crate::pipeline::event::{ConfigValue, PipelineEvent};
use crate::pipeline::id::StageId;
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stages::{
    CollectorStage, ExecutionModelAssemblerStage, QueueSinkStage, TimestampFilterStage,
    TraceReconstructionStage, TypeModelAssemblerStage,
};
use crate::record::CodecError;
use thiserror::Error;

/// Failure of a single handler invocation. Logged by the pipeline and
/// isolated from other subscribers.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Unexpected {event_type} event on port '{port}'")]
    UnexpectedEvent { port: String, event_type: EventType },

    #[error("Invalid config '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    #[error("Record decoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Other(#[from] TraceScopeError),
}

impl StageError {
    pub fn unexpected(port: &str, event: &PipelineEvent) -> Self {
        StageError::UnexpectedEvent {
            port: port.to_string(),
            event_type: event.event_type(),
        }
    }
}

/// Handle passed to stage callbacks. Emits on the stage's own output ports.
pub struct StageContext<'p> {
    pub(crate) core: &'p PipelineCore,
    pub(crate) stage: StageId,
}

impl<'p> StageContext<'p> {
    pub fn stage_id(&self) -> StageId {
        self.stage
    }

    /// Push `event` through output port `output`. Subscribers run before
    /// this returns. See [`Pipeline::emit`](super::Pipeline::emit).
    pub fn emit(&self, output: &str, event: impl Into<PipelineEvent>) -> bool {
        self.core.emit(self.stage, output, event.into())
    }

    /// Whether the pipeline asked its stages to stop.
    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }
}

/// Trait for user-defined processing stages.
pub trait Stage: Send {
    /// Human-readable name of this stage.
    fn name(&self) -> &str;

    /// Port descriptors for this stage.
    fn ports(&self) -> &[PortDescriptor];

    /// Called once when the pipeline starts, before any reader runs.
    fn on_start(&mut self, _ctx: &StageContext) {}

    /// Handle an event delivered to input port `input`.
    fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        ctx: &StageContext,
    ) -> Result<(), StageError>;

    /// Called exactly once when the pipeline terminates. May still emit.
    fn on_terminate(&mut self, _ctx: &StageContext) {}

    /// Called when a config value changes.
    fn on_config_change(&mut self, _key: &str, _value: &ConfigValue) -> Result<(), StageError> {
        Ok(())
    }
}

/// A source stage: pulls events from outside and emits them.
pub trait Reader: Send {
    fn name(&self) -> &str;

    /// Output ports only.
    fn ports(&self) -> &[PortDescriptor];

    /// Produce events until the input is exhausted or `ctx.is_terminated()`.
    fn read(&mut self, ctx: &StageContext) -> Result<(), StageError>;

    fn on_terminate(&mut self, _ctx: &StageContext) {}
}

/// Enum dispatch for built-in stages.
pub enum BuiltinStage {
    TimestampFilter(TimestampFilterStage),
    TraceReconstruction(TraceReconstructionStage),
    TypeModelAssembler(TypeModelAssemblerStage),
    ExecutionModelAssembler(ExecutionModelAssemblerStage),
    QueueSink(QueueSinkStage),
    Collector(CollectorStage),
}

impl BuiltinStage {
    pub fn name(&self) -> &str {
        match self {
            BuiltinStage::TimestampFilter(s) => s.name(),
            BuiltinStage::TraceReconstruction(s) => s.name(),
            BuiltinStage::TypeModelAssembler(s) => s.name(),
            BuiltinStage::ExecutionModelAssembler(s) => s.name(),
            BuiltinStage::QueueSink(s) => s.name(),
            BuiltinStage::Collector(s) => s.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            BuiltinStage::TimestampFilter(s) => s.ports(),
            BuiltinStage::TraceReconstruction(s) => s.ports(),
            BuiltinStage::TypeModelAssembler(s) => s.ports(),
            BuiltinStage::ExecutionModelAssembler(s) => s.ports(),
            BuiltinStage::QueueSink(s) => s.ports(),
            BuiltinStage::Collector(s) => s.ports(),
        }
    }

    pub fn on_start(&mut self, ctx: &StageContext) {
        match self {
            BuiltinStage::TimestampFilter(s) => s.on_start(ctx),
            BuiltinStage::TraceReconstruction(s) => s.on_start(ctx),
            BuiltinStage::TypeModelAssembler(s) => s.on_start(ctx),
            BuiltinStage::ExecutionModelAssembler(s) => s.on_start(ctx),
            BuiltinStage::QueueSink(s) => s.on_start(ctx),
            BuiltinStage::Collector(s) => s.on_start(ctx),
        }
    }

    pub fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        match self {
            BuiltinStage::TimestampFilter(s) => s.on_event(input, event, ctx),
            BuiltinStage::TraceReconstruction(s) => s.on_event(input, event, ctx),
            BuiltinStage::TypeModelAssembler(s) => s.on_event(input, event, ctx),
            BuiltinStage::ExecutionModelAssembler(s) => s.on_event(input, event, ctx),
            BuiltinStage::QueueSink(s) => s.on_event(input, event, ctx),
            BuiltinStage::Collector(s) => s.on_event(input, event, ctx),
        }
    }

    pub fn on_terminate(&mut self, ctx: &StageContext) {
        match self {
            BuiltinStage::TimestampFilter(s) => s.on_terminate(ctx),
            BuiltinStage::TraceReconstruction(s) => s.on_terminate(ctx),
            BuiltinStage::TypeModelAssembler(s) => s.on_terminate(ctx),
            BuiltinStage::ExecutionModelAssembler(s) => s.on_terminate(ctx),
            BuiltinStage::QueueSink(s) => s.on_terminate(ctx),
            BuiltinStage::Collector(s) => s.on_terminate(ctx),
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<(), StageError> {
        match self {
            BuiltinStage::TimestampFilter(s) => s.on_config_change(key, value),
            BuiltinStage::TraceReconstruction(s) => s.on_config_change(key, value),
            BuiltinStage::TypeModelAssembler(s) => s.on_config_change(key, value),
            BuiltinStage::ExecutionModelAssembler(s) => s.on_config_change(key, value),
            BuiltinStage::QueueSink(s) => s.on_config_change(key, value),
            BuiltinStage::Collector(s) => s.on_config_change(key, value),
        }
    }
}

/// Wrapper that holds either a built-in stage (enum dispatch) or a plugin (trait object).
pub enum AnyStage {
    Builtin(BuiltinStage),
    Plugin(Box<dyn Stage>),
}

impl AnyStage {
    pub fn name(&self) -> &str {
        match self {
            AnyStage::Builtin(s) => s.name(),
            AnyStage::Plugin(s) => s.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            AnyStage::Builtin(s) => s.ports(),
            AnyStage::Plugin(s) => s.ports(),
        }
    }

    pub fn on_start(&mut self, ctx: &StageContext) {
        match self {
            AnyStage::Builtin(s) => s.on_start(ctx),
            AnyStage::Plugin(s) => s.on_start(ctx),
        }
    }

    pub fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        match self {
            AnyStage::Builtin(s) => s.on_event(input, event, ctx),
            AnyStage::Plugin(s) => s.on_event(input, event, ctx),
        }
    }

    pub fn on_terminate(&mut self, ctx: &StageContext) {
        match self {
            AnyStage::Builtin(s) => s.on_terminate(ctx),
            AnyStage::Plugin(s) => s.on_terminate(ctx),
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<(), StageError> {
        match self {
            AnyStage::Builtin(s) => s.on_config_change(key, value),
            AnyStage::Plugin(s) => s.on_config_change(key, value),
        }
    }
}

impl From<BuiltinStage> for AnyStage {
    fn from(stage: BuiltinStage) -> Self {
        AnyStage::Builtin(stage)
    }
}

impl From<Box<dyn Stage>> for AnyStage {
    fn from(stage: Box<dyn Stage>) -> Self {
        AnyStage::Plugin(stage)
    }
}

impl From<TimestampFilterStage> for AnyStage {
    fn from(stage: TimestampFilterStage) -> Self {
        AnyStage::Builtin(BuiltinStage::TimestampFilter(stage))
    }
}

impl From<TraceReconstructionStage> for AnyStage {
    fn from(stage: TraceReconstructionStage) -> Self {
        AnyStage::Builtin(BuiltinStage::TraceReconstruction(stage))
    }
}

impl From<TypeModelAssemblerStage> for AnyStage {
    fn from(stage: TypeModelAssemblerStage) -> Self {
        AnyStage::Builtin(BuiltinStage::TypeModelAssembler(stage))
    }
}

impl From<ExecutionModelAssemblerStage> for AnyStage {
    fn from(stage: ExecutionModelAssemblerStage) -> Self {
        AnyStage::Builtin(BuiltinStage::ExecutionModelAssembler(stage))
    }
}

impl From<QueueSinkStage> for AnyStage {
    fn from(stage: QueueSinkStage) -> Self {
        AnyStage::Builtin(BuiltinStage::QueueSink(stage))
    }
}

impl From<CollectorStage> for AnyStage {
    fn from(stage: CollectorStage) -> Self {
        AnyStage::Builtin(BuiltinStage::Collector(stage))
    }
}
