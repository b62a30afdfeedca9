//! Monitoring side: correlation state, probes and writers.
//!
//! ```text
//! probe ──► MonitoringController ──► MonitoringWriter ──► (channel | memory | binary log)
//!   │              │
//!   └── ControlFlowRegistry (thread-local trace id / eoi / ess)
//! ```

pub mod controller;
pub mod probe;
pub mod registry;
pub mod session;
pub mod writer;

pub use controller::{MonitoringController, SystemTimeSource, TimeSource};
pub use probe::{BranchingProbe, OperationExecutionProbe};
pub use registry::{ControlFlowRegistry, ExecutionScope, TraceContext, TraceHeader, TraceStart};
pub use session::SessionRegistry;
pub use writer::{BinaryLogWriter, ChannelWriter, MemoryWriter, MonitoringWriter};
