//! Built-in pipeline stages and readers.

pub mod assembly;
pub mod collector;
pub mod filter;
pub mod queue;
pub mod readers;
pub mod reconstruction;

pub use assembly::{ExecutionModelAssemblerStage, TypeModelAssemblerStage};
pub use collector::{CollectorHandle, CollectorStage};
pub use filter::TimestampFilterStage;
pub use queue::{channel_pair, QueueSinkStage};
pub use readers::{BinaryLogReader, ChannelReader, MemoryReader};
pub use reconstruction::{ReconstructionStats, TraceReconstructionStage};
