//! TraceReconstructionStage: groups executions by trace and re-nests them.
//!
//! A pending trace is complete once it holds its root (eoi 0, ess 0) and its
//! eoi values form the contiguous range `0..=max`. Finished traces are
//! emitted as an [`ExecutionTrace`] on `traces` followed by one
//! [`OperationCallEvent`](crate::trace::OperationCallEvent) per caller →
//! callee pair on `calls`.
//!
//! Time is taken from the records, not the wall clock, so replayed logs
//! behave like live ones: a pending trace whose newest exit lies more than
//! `max_trace_duration` behind the newest exit seen overall is flushed.
//! Flushing reconstructs what is there; traces that do not form a valid tree
//! are dropped, or their executions are emitted on `invalid` when enabled.
//!
//! A root followed by a contiguous run of eois looks complete even when a
//! remote tail call has not been read yet, since the remote records carry
//! the next eois and nothing in the local ones announces them. With
//! settling on (the default), complete traces therefore wait for the same
//! timeout and only count as timed out when still incomplete. With settling
//! off they are emitted the moment they complete.

use crate::config::ReconstructionConfig;
use crate::pipeline::event::{ConfigValue, PipelineEvent};
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stage::{StageContext, StageError};
use crate::record::OperationExecutionRecord;
use crate::trace::ExecutionTrace;
use std::collections::{HashMap, HashSet};

pub const INPUT: &str = "records";
pub const TRACES: &str = "traces";
pub const CALLS: &str = "calls";
pub const INVALID: &str = "invalid";

/// Config keys.
pub const MAX_TRACE_DURATION_MS: &str = "max_trace_duration_ms";
pub const EMIT_INVALID: &str = "emit_invalid_traces";
pub const SETTLE_COMPLETE: &str = "settle_complete_traces";

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input(INPUT, &[EventType::MonitoringRecord]),
    PortDescriptor::output(TRACES, &[EventType::ExecutionTrace]),
    PortDescriptor::output(CALLS, &[EventType::OperationCall]),
    PortDescriptor::output(INVALID, &[EventType::OperationExecution]),
];

#[derive(Default)]
struct PendingTrace {
    records: Vec<OperationExecutionRecord>,
    eois: HashSet<i32>,
    max_eoi: i32,
    has_root: bool,
    last_tout: i64,
}

impl PendingTrace {
    fn add(&mut self, record: OperationExecutionRecord) {
        self.eois.insert(record.eoi);
        self.max_eoi = self.max_eoi.max(record.eoi);
        self.has_root |= record.eoi == 0 && record.ess == 0;
        self.last_tout = self.last_tout.max(record.tout);
        self.records.push(record);
    }

    fn is_complete(&self) -> bool {
        self.has_root
            && self.eois.len() == self.records.len()
            && self.eois.len() as i64 == self.max_eoi as i64 + 1
    }
}

/// Counters reported on terminate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionStats {
    pub valid_traces: u64,
    pub invalid_traces: u64,
    pub timed_out_traces: u64,
}

pub struct TraceReconstructionStage {
    pending: HashMap<i64, PendingTrace>,
    max_trace_duration_nanos: i64,
    emit_invalid: bool,
    settle_complete: bool,
    newest_tout: i64,
    stats: ReconstructionStats,
}

impl TraceReconstructionStage {
    pub fn new(max_trace_duration_nanos: i64, emit_invalid: bool) -> Self {
        Self {
            pending: HashMap::new(),
            max_trace_duration_nanos,
            emit_invalid,
            settle_complete: true,
            newest_tout: i64::MIN,
            stats: ReconstructionStats::default(),
        }
    }

    /// Whether complete traces wait for the timeout before being emitted.
    pub fn settle_complete_traces(mut self, settle: bool) -> Self {
        self.settle_complete = settle;
        self
    }

    pub fn from_config(config: &ReconstructionConfig) -> Self {
        Self::new(
            millis_to_nanos(config.max_trace_duration_ms),
            config.emit_invalid_traces,
        )
        .settle_complete_traces(config.settle_complete_traces)
    }

    pub fn name(&self) -> &str {
        "TraceReconstruction"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn stats(&self) -> ReconstructionStats {
        self.stats
    }

    pub fn pending_traces(&self) -> usize {
        self.pending.len()
    }

    pub fn on_start(&mut self, _ctx: &StageContext) {}

    pub fn on_event(
        &mut self,
        input: &str,
        event: &PipelineEvent,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        if event.event_type() == EventType::Branching {
            return Ok(());
        }
        let record = event
            .as_operation_execution()
            .ok_or_else(|| StageError::unexpected(input, event))?;
        if !record.has_valid_correlation() {
            tracing::debug!(
                trace_id = record.trace_id,
                eoi = record.eoi,
                ess = record.ess,
                "Dropping execution without correlation data"
            );
            return Ok(());
        }

        self.newest_tout = self.newest_tout.max(record.tout);
        let trace_id = record.trace_id;
        let pending = self.pending.entry(trace_id).or_default();
        pending.add(record.clone());
        if !self.settle_complete && pending.is_complete() {
            if let Some(done) = self.pending.remove(&trace_id) {
                self.finish(trace_id, done, ctx);
            }
        }

        self.flush_timed_out(ctx);
        Ok(())
    }

    fn flush_timed_out(&mut self, ctx: &StageContext) {
        let deadline = self.newest_tout.saturating_sub(self.max_trace_duration_nanos);
        let expired: Vec<i64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.last_tout < deadline)
            .map(|(id, _)| *id)
            .collect();
        for trace_id in expired {
            if let Some(pending) = self.pending.remove(&trace_id) {
                if !pending.is_complete() {
                    tracing::debug!(trace_id, "Trace timed out");
                    self.stats.timed_out_traces += 1;
                }
                self.finish(trace_id, pending, ctx);
            }
        }
    }

    fn finish(&mut self, trace_id: i64, pending: PendingTrace, ctx: &StageContext) {
        let records = pending.records;
        match ExecutionTrace::reconstruct(trace_id, records.clone()) {
            Ok(trace) => {
                self.stats.valid_traces += 1;
                let calls = trace.operation_calls();
                ctx.emit(TRACES, trace);
                for call in calls {
                    ctx.emit(CALLS, call);
                }
            }
            Err(e) => {
                self.stats.invalid_traces += 1;
                tracing::debug!(trace_id, "Invalid trace: {}", e);
                if self.emit_invalid {
                    for record in records {
                        ctx.emit(INVALID, record);
                    }
                }
            }
        }
    }

    /// Flush every pending trace.
    pub fn on_terminate(&mut self, ctx: &StageContext) {
        let mut pending: Vec<(i64, PendingTrace)> = self.pending.drain().collect();
        pending.sort_by_key(|(id, _)| *id);
        for (trace_id, trace) in pending {
            self.finish(trace_id, trace, ctx);
        }
        tracing::info!(
            valid = self.stats.valid_traces,
            invalid = self.stats.invalid_traces,
            timed_out = self.stats.timed_out_traces,
            "Trace reconstruction finished"
        );
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<(), StageError> {
        match (key, value) {
            (MAX_TRACE_DURATION_MS, ConfigValue::Int(ms)) if *ms >= 0 => {
                self.max_trace_duration_nanos = millis_to_nanos(*ms as u64);
            }
            (EMIT_INVALID, ConfigValue::Bool(b)) => self.emit_invalid = *b,
            (SETTLE_COMPLETE, ConfigValue::Bool(b)) => self.settle_complete = *b,
            _ => {
                return Err(StageError::InvalidConfig {
                    key: key.to_string(),
                    message: format!("unsupported value {:?}", value),
                })
            }
        }
        Ok(())
    }
}

fn millis_to_nanos(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX).saturating_mul(1_000_000)
}
