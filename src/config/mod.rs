//! Configuration module for tracescope-rs
//!
//! One [`AnalysisConfig`] drives both sides of an analysis run: the
//! monitoring controller that produces records, and the pipeline that
//! consumes them.
//!
//! # Location
//!
//! Resolved in this order:
//! 1. an explicit path (e.g. the `--config` argument)
//! 2. the `TRACESCOPE_CONFIG` environment variable
//! 3. `config.toml` in the platform data directory:
//!    - **Linux**: `~/.local/share/dev.tracescope.tracescope-rs/`
//!    - **macOS**: `~/Library/Application Support/dev.tracescope.tracescope-rs/`
//!    - **Windows**: `%APPDATA%\dev.tracescope.tracescope-rs\`
//!
//! Files ending in `.json` are read and written as JSON, anything else as TOML.
//!
//! # Example
//!
//! ```ignore
//! use tracescope_rs::config::AnalysisConfig;
//!
//! let mut config = AnalysisConfig::load_or_default(None);
//! config.reconstruction.max_trace_duration_ms = 5_000;
//! config.save("analysis.toml")?;
//! ```

use crate::error::{Result, TraceScopeError};
use crate::model::{IdentitySignatureExtractor, ScriptedSignatureExtractor, SignatureExtractor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.tracescope.tracescope-rs";

/// Default config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "TRACESCOPE_CONFIG";

/// Default capacity of pipeline queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default maximum trace duration in milliseconds
pub const DEFAULT_MAX_TRACE_DURATION_MS: u64 = 60_000;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path of the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Resolve the config path from an explicit path, the environment, or the default location.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(default_config_path)
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

// ==================== Analysis Config ====================

/// Complete configuration of an analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Label recorded as the provenance of every model entity
    pub source_label: String,
    pub monitoring: MonitoringConfig,
    pub pipeline: PipelineConfig,
    pub reconstruction: ReconstructionConfig,
    pub filter: FilterConfig,
    pub signatures: SignatureConfig,
    pub logging: LoggingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            source_label: "dynamic".to_string(),
            monitoring: MonitoringConfig::default(),
            pipeline: PipelineConfig::default(),
            reconstruction: ReconstructionConfig::default(),
            filter: FilterConfig::default(),
            signatures: SignatureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load a config file, TOML or JSON by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TraceScopeError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content).map_err(|e| {
                TraceScopeError::Config(format!("Failed to parse config {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                TraceScopeError::Config(format!("Failed to parse config {:?}: {}", path, e))
            })
        }
    }

    /// Load from the resolved location, falling back to defaults when no
    /// file exists or it cannot be parsed
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let (config, error) = Self::try_load_or_default(explicit);
        if let Some(e) = error {
            tracing::warn!("Failed to load config, using defaults: {}", e);
        }
        config
    }

    /// Like [`load_or_default`](Self::load_or_default), but hands the load
    /// error back instead of logging it, for callers that set up logging
    /// from the config they are loading.
    pub fn try_load_or_default(explicit: Option<&Path>) -> (Self, Option<TraceScopeError>) {
        let Some(path) = resolve_config_path(explicit) else {
            return (Self::default(), None);
        };
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load(&path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Save to disk, TOML or JSON by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TraceScopeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| TraceScopeError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| TraceScopeError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)
            .map_err(|e| TraceScopeError::Config(format!("Failed to write config: {}", e)))
    }
}

// ==================== Sections ====================

/// Settings of the monitoring controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Host name written into every record
    pub host_name: String,
    pub experiment_id: i32,
    /// Whether probes write records at all
    pub enabled: bool,
    /// Replay mode: records keep their original timestamps
    pub replay_mode: bool,
    /// First trace id handed out; a process-specific offset is used when unset
    pub initial_trace_id: Option<i64>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            host_name: "localhost".to_string(),
            experiment_id: 0,
            enabled: true,
            replay_mode: false,
            initial_trace_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Capacity of queues between pipelines and monitoring channels
    pub queue_capacity: usize,
    /// Skip records that fail to decode but leave the log readable
    pub skip_malformed_records: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            skip_malformed_records: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// Event-time span after which a pending trace is flushed
    pub max_trace_duration_ms: u64,
    /// Forward executions of invalid traces on the `invalid` port
    pub emit_invalid_traces: bool,
    /// Hold complete traces until they time out or the pipeline terminates,
    /// so records of remote callees arriving after the root still join them
    pub settle_complete_traces: bool,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_trace_duration_ms: DEFAULT_MAX_TRACE_DURATION_MS,
            emit_invalid_traces: false,
            settle_complete_traces: true,
        }
    }
}

/// Inclusive timestamp window in nanoseconds; unset bounds are open
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub not_before: Option<i64>,
    pub not_after: Option<i64>,
}

/// Rhai scripts for signature extraction; identity when both are unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub component_script: Option<String>,
    pub operation_script: Option<String>,
}

impl SignatureConfig {
    /// Build the configured extractor. A missing script keeps the raw signature.
    pub fn build_extractor(&self) -> Result<Arc<dyn SignatureExtractor>> {
        match (&self.component_script, &self.operation_script) {
            (None, None) => Ok(Arc::new(IdentitySignatureExtractor)),
            (component, operation) => Ok(Arc::new(ScriptedSignatureExtractor::new(
                component.as_deref().unwrap_or("component"),
                operation.as_deref().unwrap_or("operation"),
            )?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,
    /// Also write logs to this file
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,tracescope_rs=debug".to_string(),
            log_file: None,
        }
    }
}
