//! Error handling for tracescope-rs
//!
//! This module defines the crate-wide error type and a Result alias. The
//! pipeline, stage and record codec layers keep their own narrower error
//! enums and convert into [`TraceScopeError`] at the crate boundary.

use crate::pipeline::error::PipelineError;
use crate::record::binary::CodecError;
use thiserror::Error;

/// Main error type for tracescope-rs operations
#[derive(Error, Debug)]
pub enum TraceScopeError {
    /// Errors raised while composing or running a pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to encoding or decoding persisted records
    #[error("Record codec error: {0}")]
    Codec(#[from] CodecError),

    /// Errors related to Rhai signature extractor scripts
    #[error("Script error: {0}")]
    Script(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to correlation state (trace id / eoi / ess misuse)
    #[error("Correlation error: {0}")]
    Correlation(String),

    /// Errors related to channel communication or lock acquisition
    #[error("Channel error: {0}")]
    Channel(String),

    /// Errors raised while updating a shared model
    #[error("Model error: {0}")]
    Model(String),

    /// Monitoring has been terminated and accepts no further records
    #[error("Monitoring terminated")]
    MonitoringTerminated,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<TraceScopeError>,
    },
}

impl TraceScopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        TraceScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a script error from a Rhai error
    pub fn from_rhai_error(err: Box<rhai::EvalAltResult>) -> Self {
        TraceScopeError::Script(err.to_string())
    }
}

/// Result type alias for tracescope-rs operations
pub type Result<T> = std::result::Result<T, TraceScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, Box<rhai::EvalAltResult>> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| TraceScopeError::from_rhai_error(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| TraceScopeError::from_rhai_error(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TraceScopeError::Correlation("eoi unset at exit".to_string());
        assert_eq!(err.to_string(), "Correlation error: eoi unset at exit");
    }

    #[test]
    fn test_error_with_context() {
        let err = TraceScopeError::Config("missing field".to_string());
        let with_ctx = err.with_context("Failed to load analysis.toml");
        assert!(with_ctx.to_string().contains("Failed to load analysis.toml"));
        assert!(with_ctx.to_string().contains("missing field"));
    }

    #[test]
    fn test_codec_error_converts() {
        let err: TraceScopeError = CodecError::UnknownRecordTag(9).into();
        assert!(err.to_string().contains("Record codec error"));
    }
}
