//! Stage-based analysis pipeline.
//!
//! Readers pull monitoring records from outside and emit them through typed
//! output ports; stages subscribe to those ports and emit derived events in
//! turn. Delivery is synchronous: `emit` returns after every subscriber ran.
//!
//! # Architecture
//!
//! ```text
//! [BinaryLogReader] ──► [TimestampFilter] ──┬──► [TraceReconstruction] ──► [ExecutionModelAssembler]
//!                                           └──► [TypeModelAssembler]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch for built-ins**: `BuiltinStage` covers all built-in stages,
//!   plugins go through the `Stage` trait.
//! - **Typed ports**: connections are checked against the declared event
//!   types when made, emits when sent.
//! - **Frozen topology**: stages and connections are fixed once `start` ran.
//! - **One thread per reader**: stages run on the thread of the emitting reader,
//!   serialized by a per-stage lock.

pub mod controller;
pub mod error;
pub mod event;
pub mod id;
pub mod port;
pub mod stage;
pub mod stages;

pub use controller::{
    Connection, DefaultStageIds, Pipeline, PipelineBuilder, StageSnapshot, TopologySnapshot,
};
pub use error::{PipelineError, PipelineResult};
pub use event::{ConfigValue, DataflowEvent, DataflowTarget, PipelineEvent};
pub use id::{ConnectionId, StageId};
pub use port::{EventType, PortDescriptor, PortDirection};
pub use stage::{AnyStage, BuiltinStage, Reader, Stage, StageContext, StageError};
