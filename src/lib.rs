//! # tracescope-rs: call-trace correlation and architecture recovery
//!
//! Probes record every monitored execution together with its correlation
//! data (trace id, execution order index, execution stack size). An analysis
//! pipeline re-nests those records into call trees and folds them into
//! architectural models.
//!
//! ## Architecture
//!
//! - **Monitoring**: thread-local correlation state, probes and record writers
//! - **Record**: monitoring record types and their binary log codec
//! - **Pipeline**: typed stages connected through ports, run by reader threads
//! - **Trace**: call-tree reconstruction from correlated records
//! - **Model**: type, execution and source models built by idempotent assemblers
//! - **Graph**: hierarchical graph view of the models
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracescope_rs::{
//!     config::AnalysisConfig,
//!     model::{IdentitySignatureExtractor, ModelSet},
//!     pipeline::{stages::BinaryLogReader, PipelineBuilder},
//! };
//!
//! let config = AnalysisConfig::default();
//! let models = ModelSet::new();
//! let reader = BinaryLogReader::open("records.bin", true)?;
//! let (pipeline, _) = PipelineBuilder::new(config).build_default(
//!     Box::new(reader),
//!     &models,
//!     Arc::new(IdentitySignatureExtractor),
//! )?;
//! pipeline.run()?;
//! println!("{}", models.snapshot()?.to_json_pretty()?);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod model;
pub mod monitoring;
pub mod pipeline;
pub mod record;
pub mod trace;

// Re-export commonly used types
pub use config::AnalysisConfig;
pub use error::{Result, TraceScopeError};
pub use model::{ModelSet, ModelSnapshot};
pub use monitoring::{ControlFlowRegistry, MonitoringController, OperationExecutionProbe};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use record::MonitoringRecord;
pub use trace::ExecutionTrace;
