//! The monitoring controller.
//!
//! A `MonitoringController` is constructed explicitly (usually from
//! [`MonitoringConfig`]) and handed to every probe that needs it, typically as
//! an `Arc`. It owns the correlation registries, the time source and the
//! writer, and it enforces the fail-fast policy: once monitoring is terminated
//! (explicitly, after a writer failure, or after invalid correlation data was
//! observed) no further record is accepted for the lifetime of the controller.
//!
//! # Lifecycle
//!
//! ```ignore
//! let controller = Arc::new(MonitoringController::new(&config.monitoring, writer));
//! // ... probes call controller.new_monitoring_record(..)
//! controller.terminate_monitoring();
//! ```

use crate::config::MonitoringConfig;
use crate::error::{Result, TraceScopeError};
use crate::monitoring::registry::ControlFlowRegistry;
use crate::monitoring::session::SessionRegistry;
use crate::monitoring::writer::MonitoringWriter;
use crate::record::MonitoringRecord;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of timestamps in nanoseconds.
pub trait TimeSource: Send + Sync {
    fn current_time_nanos(&self) -> i64;
}

/// Wall-clock nanoseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn current_time_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }
}

/// Process-wide monitoring context, passed explicitly to probes.
pub struct MonitoringController {
    host_name: String,
    experiment_id: i32,
    writing_enabled: AtomicBool,
    terminated: AtomicBool,
    replay_mode: AtomicBool,
    number_of_inserts: AtomicU64,
    registry: ControlFlowRegistry,
    sessions: SessionRegistry,
    time_source: Box<dyn TimeSource>,
    writer: Box<dyn MonitoringWriter>,
}

impl MonitoringController {
    pub fn new(config: &MonitoringConfig, writer: Box<dyn MonitoringWriter>) -> Self {
        Self::with_time_source(config, writer, Box::new(SystemTimeSource))
    }

    pub fn with_time_source(
        config: &MonitoringConfig,
        writer: Box<dyn MonitoringWriter>,
        time_source: Box<dyn TimeSource>,
    ) -> Self {
        let registry = match config.initial_trace_id {
            Some(first) => ControlFlowRegistry::with_initial_trace_id(first),
            None => ControlFlowRegistry::new(),
        };
        tracing::info!(
            host = %config.host_name,
            writer = writer.name(),
            "Monitoring controller created"
        );
        Self {
            host_name: config.host_name.clone(),
            experiment_id: config.experiment_id,
            writing_enabled: AtomicBool::new(config.enabled),
            terminated: AtomicBool::new(false),
            replay_mode: AtomicBool::new(config.replay_mode),
            number_of_inserts: AtomicU64::new(0),
            registry,
            sessions: SessionRegistry::new(),
            time_source,
            writer,
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn experiment_id(&self) -> i32 {
        self.experiment_id
    }

    pub fn registry(&self) -> &ControlFlowRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn current_time_nanos(&self) -> i64 {
        self.time_source.current_time_nanos()
    }

    pub fn is_writing_enabled(&self) -> bool {
        self.writing_enabled.load(Ordering::Acquire)
    }

    pub fn set_writing_enabled(&self, enabled: bool) {
        self.writing_enabled.store(enabled, Ordering::Release);
        if enabled && self.is_monitoring_terminated() {
            tracing::warn!("Enabled writing but monitoring is terminated");
        }
    }

    pub fn is_monitoring_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Whether probes should record at all.
    pub fn is_monitoring_enabled(&self) -> bool {
        self.is_writing_enabled() && !self.is_monitoring_terminated()
    }

    pub fn is_replay_mode(&self) -> bool {
        self.replay_mode.load(Ordering::Relaxed)
    }

    pub fn enable_replay_mode(&self) {
        self.replay_mode.store(true, Ordering::Relaxed);
    }

    pub fn enable_realtime_mode(&self) {
        self.replay_mode.store(false, Ordering::Relaxed);
    }

    pub fn number_of_inserts(&self) -> u64 {
        self.number_of_inserts.load(Ordering::Relaxed)
    }

    /// Hand a record to the writer. Returns `false` if monitoring is disabled
    /// or terminated, or if the writer failed (which terminates monitoring).
    pub fn new_monitoring_record(&self, record: MonitoringRecord) -> bool {
        matches!(self.write_monitoring_record(record), Ok(true))
    }

    /// Hand a record to the writer, reporting why it was refused.
    ///
    /// `Ok(false)` while writing is disabled; [`TraceScopeError::MonitoringTerminated`]
    /// once monitoring has stopped. A writer error terminates monitoring and
    /// is returned as is.
    pub fn write_monitoring_record(&self, record: MonitoringRecord) -> Result<bool> {
        if self.is_monitoring_terminated() {
            return Err(TraceScopeError::MonitoringTerminated);
        }
        if !self.is_writing_enabled() {
            return Ok(false);
        }
        self.number_of_inserts.fetch_add(1, Ordering::Relaxed);
        self.writer.write_record(&record).map_err(|e| {
            tracing::error!("Error writing the monitoring data ({}). Will terminate monitoring!", e);
            self.terminate_monitoring();
            e
        })?;
        Ok(true)
    }

    /// Report invalid correlation data observed by a probe. Aggregates built
    /// on such records cannot be trusted, so the whole session stops.
    pub fn report_invalid_correlation(&self, eoi: i32, ess: i32) -> TraceScopeError {
        let err = TraceScopeError::Correlation(format!(
            "eoi {} and ess {} are not valid at execution exit",
            eoi, ess
        ));
        tracing::error!("{}. Terminating monitoring!", err);
        self.terminate_monitoring();
        err
    }

    /// Stop accepting records and terminate the writer. Returns `true` only
    /// for the call that performed the termination.
    pub fn terminate_monitoring(&self) -> bool {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::info!("Shutting down monitoring controller");
        self.writer.terminate();
        true
    }

    /// Human-readable state report.
    pub fn state(&self) -> String {
        let mut sb = String::new();
        let _ = writeln!(sb, "Host: '{}'", self.host_name);
        let _ = writeln!(sb, "Experiment id: '{}'", self.experiment_id);
        let _ = writeln!(sb, "Replay mode: '{}'", self.is_replay_mode());
        let _ = writeln!(sb, "Writing enabled: '{}'", self.is_writing_enabled());
        let _ = writeln!(sb, "Terminated: '{}'", self.is_monitoring_terminated());
        let _ = writeln!(sb, "Number of inserts: '{}'", self.number_of_inserts());
        let _ = write!(sb, "Writer: {}", self.writer.info());
        sb
    }
}

impl Drop for MonitoringController {
    fn drop(&mut self) {
        self.terminate_monitoring();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::writer::MemoryWriter;
    use crate::record::BranchingRecord;

    struct FailingWriter;

    impl MonitoringWriter for FailingWriter {
        fn name(&self) -> &str {
            "FailingWriter"
        }

        fn write_record(&self, _record: &MonitoringRecord) -> Result<()> {
            Err(TraceScopeError::Channel("disk full".to_string()))
        }
    }

    fn branch() -> MonitoringRecord {
        BranchingRecord {
            timestamp: 0,
            branch_id: 1,
            branching_outcome: 1,
        }
        .into()
    }

    #[test]
    fn test_records_reach_writer() {
        let writer = MemoryWriter::new();
        let controller =
            MonitoringController::new(&MonitoringConfig::default(), Box::new(writer.clone()));
        assert!(controller.new_monitoring_record(branch()));
        assert_eq!(writer.len(), 1);
        assert_eq!(controller.number_of_inserts(), 1);
    }

    #[test]
    fn test_disabled_writing_drops_records() {
        let writer = MemoryWriter::new();
        let controller =
            MonitoringController::new(&MonitoringConfig::default(), Box::new(writer.clone()));
        controller.set_writing_enabled(false);
        assert!(!controller.new_monitoring_record(branch()));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_writer_failure_terminates() {
        let controller =
            MonitoringController::new(&MonitoringConfig::default(), Box::new(FailingWriter));
        assert!(!controller.new_monitoring_record(branch()));
        assert!(controller.is_monitoring_terminated());
        assert!(!controller.terminate_monitoring());
    }

    #[test]
    fn test_invalid_correlation_is_fatal() {
        let writer = MemoryWriter::new();
        let controller =
            MonitoringController::new(&MonitoringConfig::default(), Box::new(writer.clone()));
        let err = controller.report_invalid_correlation(-1, 0);
        assert!(matches!(err, TraceScopeError::Correlation(_)));
        assert!(!controller.new_monitoring_record(branch()));
        assert!(writer.is_empty());
        assert!(controller.state().contains("Terminated: 'true'"));
    }

    #[test]
    fn test_write_reports_refusal_reason() {
        let writer = MemoryWriter::new();
        let controller =
            MonitoringController::new(&MonitoringConfig::default(), Box::new(writer.clone()));
        controller.set_writing_enabled(false);
        assert!(matches!(controller.write_monitoring_record(branch()), Ok(false)));
        controller.set_writing_enabled(true);
        assert!(matches!(controller.write_monitoring_record(branch()), Ok(true)));
        controller.terminate_monitoring();
        assert!(matches!(
            controller.write_monitoring_record(branch()),
            Err(TraceScopeError::MonitoringTerminated)
        ));
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn test_writer_error_is_returned() {
        let controller =
            MonitoringController::new(&MonitoringConfig::default(), Box::new(FailingWriter));
        assert!(matches!(
            controller.write_monitoring_record(branch()),
            Err(TraceScopeError::Channel(_))
        ));
        assert!(controller.is_monitoring_terminated());
    }
}
