//! Probes that turn calls into monitoring records.
//!
//! [`OperationExecutionProbe::monitor`] is the around-advice every
//! instrumentation adapter reduces to: claim eoi/ess on entry, run the code,
//! and emit one [`OperationExecutionRecord`] on every exit path. The record is
//! written from a drop guard, so a panicking callee still produces its record
//! and still restores the thread's call depth.

use crate::monitoring::controller::MonitoringController;
use crate::monitoring::registry::{ControlFlowRegistry, ExecutionScope, TraceHeader};
use crate::record::{BranchingRecord, OperationExecutionRecord};

/// Records operation executions through a [`MonitoringController`].
#[derive(Clone, Copy)]
pub struct OperationExecutionProbe<'c> {
    controller: &'c MonitoringController,
}

impl<'c> OperationExecutionProbe<'c> {
    pub fn new(controller: &'c MonitoringController) -> Self {
        Self { controller }
    }

    /// Run `f` as a traced execution of `component.operation`.
    pub fn monitor<R>(&self, component: &str, operation: &str, f: impl FnOnce() -> R) -> R {
        if !self.controller.is_monitoring_enabled() {
            return f();
        }
        let _pending = PendingExecution {
            controller: self.controller,
            component,
            operation,
            tin: self.controller.current_time_nanos(),
            scope: self.controller.registry().enter_execution(),
        };
        f()
    }

    /// Run `f` as the remote half of a distributed trace.
    ///
    /// With a present `header` the thread joins the caller's trace instead of
    /// opening a new one. The thread-local state is cleared on every exit,
    /// unwinding included, since the trace leaves this process with the
    /// response. Returns the response header for the caller, if a trace was
    /// active.
    pub fn monitor_incoming<R>(
        &self,
        header: Option<&TraceHeader>,
        component: &str,
        operation: &str,
        f: impl FnOnce() -> R,
    ) -> (R, Option<TraceHeader>) {
        let registry = self.controller.registry();
        if let Some(header) = header {
            if !registry.continue_from_header(header) {
                tracing::debug!("incoming header carries no trace; opening a new one");
            }
        }
        let incoming = IncomingCall { registry };
        let result = self.monitor(component, operation, f);
        let response = registry.response_header();
        drop(incoming);
        (result, response)
    }

    /// Header to attach to an outgoing remote call from inside a traced execution.
    pub fn outgoing_header(&self) -> Option<TraceHeader> {
        self.controller.registry().outgoing_header()
    }

    /// Apply the response header of a completed remote call.
    pub fn apply_response(&self, header: &TraceHeader) {
        self.controller.registry().resume_from_response(header);
    }
}

/// Writes the record for one execution when dropped.
struct PendingExecution<'c, 'a> {
    controller: &'c MonitoringController,
    component: &'a str,
    operation: &'a str,
    tin: i64,
    scope: ExecutionScope<'c>,
}

impl Drop for PendingExecution<'_, '_> {
    fn drop(&mut self) {
        let tout = self.controller.current_time_nanos();
        if !self.scope.is_valid() {
            self.controller
                .report_invalid_correlation(self.scope.eoi(), self.scope.ess());
            return;
        }
        let record = OperationExecutionRecord {
            component_signature: self.component.to_string(),
            operation_signature: self.operation.to_string(),
            session_id: self.controller.sessions().recall_or_default(),
            trace_id: self.scope.trace_id(),
            tin: self.tin,
            tout,
            host_name: self.controller.host_name().to_string(),
            eoi: self.scope.eoi(),
            ess: self.scope.ess(),
        };
        self.controller.new_monitoring_record(record.into());
    }
}

/// Clears the thread's trace when a remotely entered call ends.
struct IncomingCall<'c> {
    registry: &'c ControlFlowRegistry,
}

impl Drop for IncomingCall<'_> {
    fn drop(&mut self) {
        self.registry.clear();
    }
}

/// Records branching decisions. Never propagates failures to the caller.
#[derive(Clone, Copy)]
pub struct BranchingProbe<'c> {
    controller: &'c MonitoringController,
}

impl<'c> BranchingProbe<'c> {
    pub fn new(controller: &'c MonitoringController) -> Self {
        Self { controller }
    }

    pub fn monitor_branch(&self, branch_id: i32, branching_outcome: i32) -> bool {
        let record = BranchingRecord {
            timestamp: self.controller.current_time_nanos(),
            branch_id,
            branching_outcome,
        };
        self.controller.new_monitoring_record(record.into())
    }
}
