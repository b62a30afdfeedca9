//! Pipeline-specific error types.

use crate::pipeline::id::StageId;
use crate::pipeline::port::EventType;
use thiserror::Error;

/// Reasons a pipeline operation is rejected.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown stage {0:?}")]
    UnknownStage(StageId),

    #[error("Stage {stage:?} has no {direction} port '{port}'")]
    UnknownPort {
        stage: StageId,
        port: String,
        direction: &'static str,
    },

    #[error("Stage {0:?} is a reader and cannot receive connections")]
    ReaderAsTarget(StageId),

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Port mismatch: output accepts {output:?}, input accepts {input:?}")]
    PortMismatch {
        output: &'static [EventType],
        input: &'static [EventType],
    },

    #[error("Stage {stage:?} rejected configuration: {message}")]
    Config { stage: StageId, message: String },

    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Reader {0:?} failed: {1}")]
    ReaderFailed(StageId, String),

    #[error("Reader thread for {0:?} panicked")]
    ReaderPanicked(StageId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
