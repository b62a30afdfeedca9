//! Per-thread control-flow correlation.
//!
//! Each thread carries a [`TraceContext`] of `(trace_id, eoi, ess)`:
//!
//! - `trace_id` identifies the root call chain (`-1` when no trace is active),
//! - `eoi` is the next execution order index to hand out,
//! - `ess` is the current call depth.
//!
//! Probes stamp every execution with the eoi/ess they obtained at entry, which
//! is enough to re-nest a flat record stream into a call tree later on. The
//! state lives in a `thread_local!` and is never shared or locked; the
//! [`ControlFlowRegistry`] itself only owns the trace id generator.
//!
//! Entry and exit must be symmetric. [`ControlFlowRegistry::enter_execution`]
//! returns an [`ExecutionScope`] that restores the call depth on drop, so the
//! restore also happens when the monitored code returns early or unwinds.

use crate::record::binary::CodecError;
use crate::record::{NO_TRACE_ID, UNSET};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Thread-local correlation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: i64,
    pub eoi: i32,
    pub ess: i32,
}

impl TraceContext {
    pub const UNSET: TraceContext = TraceContext {
        trace_id: NO_TRACE_ID,
        eoi: UNSET,
        ess: UNSET,
    };

    pub fn is_active(&self) -> bool {
        self.trace_id != NO_TRACE_ID
    }
}

thread_local! {
    static TRACE_CONTEXT: Cell<TraceContext> = const { Cell::new(TraceContext::UNSET) };
}

fn load() -> TraceContext {
    TRACE_CONTEXT.with(Cell::get)
}

fn store(ctx: TraceContext) {
    TRACE_CONTEXT.with(|cell| cell.set(ctx));
}

/// Result of [`ControlFlowRegistry::begin_or_continue_trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceStart {
    pub trace_id: i64,
    /// True when this call opened the trace (the thread had none).
    pub is_entry: bool,
}

/// Correlation triple carried across a remote call boundary.
///
/// Wire form: big-endian `i64` trace id, `i32` eoi, `i32` ess; `-1` = absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceHeader {
    pub trace_id: i64,
    pub eoi: i32,
    pub ess: i32,
}

impl TraceHeader {
    pub const ENCODED_LEN: usize = 16;

    pub const ABSENT: TraceHeader = TraceHeader {
        trace_id: NO_TRACE_ID,
        eoi: UNSET,
        ess: UNSET,
    };

    pub fn is_present(&self) -> bool {
        self.trace_id != NO_TRACE_ID
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..8].copy_from_slice(&self.trace_id.to_be_bytes());
        out[8..12].copy_from_slice(&self.eoi.to_be_bytes());
        out[12..16].copy_from_slice(&self.ess.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < Self::ENCODED_LEN {
            return Err(CodecError::BufferUnderflow {
                needed: Self::ENCODED_LEN,
                available: bytes.len(),
            });
        }
        let mut trace_id = [0u8; 8];
        let mut eoi = [0u8; 4];
        let mut ess = [0u8; 4];
        trace_id.copy_from_slice(&bytes[0..8]);
        eoi.copy_from_slice(&bytes[8..12]);
        ess.copy_from_slice(&bytes[12..16]);
        Ok(Self {
            trace_id: i64::from_be_bytes(trace_id),
            eoi: i32::from_be_bytes(eoi),
            ess: i32::from_be_bytes(ess),
        })
    }
}

/// Allocates trace ids and manipulates the calling thread's [`TraceContext`].
#[derive(Debug)]
pub struct ControlFlowRegistry {
    next_trace_id: AtomicI64,
}

impl Default for ControlFlowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlFlowRegistry {
    /// Create a registry whose ids start at a process-specific offset, so two
    /// processes writing into one log rarely collide.
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let salt = (std::process::id() ^ nanos) & 0xFFFF;
        Self::with_initial_trace_id((salt as i64) << (64 - 16 - 1))
    }

    pub fn with_initial_trace_id(first: i64) -> Self {
        Self {
            next_trace_id: AtomicI64::new(first.max(0)),
        }
    }

    fn allocate_trace_id(&self) -> i64 {
        self.next_trace_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Snapshot of the calling thread's state.
    pub fn current(&self) -> TraceContext {
        load()
    }

    pub fn recall_trace_id(&self) -> i64 {
        load().trace_id
    }

    pub fn recall_eoi(&self) -> i32 {
        load().eoi
    }

    pub fn recall_ess(&self) -> i32 {
        load().ess
    }

    /// Open a trace if the thread has none, otherwise return the ambient one.
    pub fn begin_or_continue_trace(&self) -> TraceStart {
        let ctx = load();
        if ctx.is_active() {
            return TraceStart {
                trace_id: ctx.trace_id,
                is_entry: false,
            };
        }
        let trace_id = self.allocate_trace_id();
        store(TraceContext {
            trace_id,
            eoi: 0,
            ess: 0,
        });
        tracing::trace!(trace_id, "opened trace");
        TraceStart {
            trace_id,
            is_entry: true,
        }
    }

    /// Return the current eoi and advance it. `UNSET` if no trace is active
    /// or the counter is exhausted.
    pub fn next_eoi(&self) -> i32 {
        let mut ctx = load();
        if !ctx.is_active() || ctx.eoi < 0 {
            return UNSET;
        }
        let eoi = ctx.eoi;
        let Some(next) = eoi.checked_add(1) else {
            tracing::warn!(trace_id = ctx.trace_id, "eoi counter exhausted");
            return UNSET;
        };
        ctx.eoi = next;
        store(ctx);
        eoi
    }

    /// Return the current ess and increment it. `UNSET` if no trace is active
    /// or the depth is exhausted.
    pub fn push_ess(&self) -> i32 {
        let mut ctx = load();
        if !ctx.is_active() || ctx.ess < 0 {
            return UNSET;
        }
        let ess = ctx.ess;
        let Some(next) = ess.checked_add(1) else {
            tracing::warn!(trace_id = ctx.trace_id, "ess depth exhausted");
            return UNSET;
        };
        ctx.ess = next;
        store(ctx);
        ess
    }

    /// Restore ess to exactly the value a matching [`push_ess`] returned.
    ///
    /// [`push_ess`]: ControlFlowRegistry::push_ess
    pub fn pop_ess(&self, prior: i32) {
        let mut ctx = load();
        if !ctx.is_active() || prior == UNSET {
            return;
        }
        ctx.ess = prior;
        store(ctx);
    }

    /// Unset trace id, eoi and ess together.
    pub fn clear(&self) {
        store(TraceContext::UNSET);
    }

    /// Open (or join) a trace and claim the eoi/ess of a new execution.
    pub fn enter_execution(&self) -> ExecutionScope<'_> {
        let start = self.begin_or_continue_trace();
        let eoi = self.next_eoi();
        let ess = self.push_ess();
        ExecutionScope {
            registry: self,
            trace_id: start.trace_id,
            eoi,
            ess,
            is_entry: start.is_entry,
            _not_send: PhantomData,
        }
    }

    /// Capture the correlation triple for an outgoing remote call.
    ///
    /// Reserves the next eoi for the remote callee; `ess` is the depth the
    /// callee runs at. `None` when the thread is not inside a trace.
    pub fn outgoing_header(&self) -> Option<TraceHeader> {
        let ctx = load();
        if !ctx.is_active() {
            return None;
        }
        let eoi = self.next_eoi();
        Some(TraceHeader {
            trace_id: ctx.trace_id,
            eoi,
            ess: ctx.ess,
        })
    }

    /// Seed this thread from an incoming request header instead of opening a
    /// fresh trace. Returns `false` (and leaves the state untouched) if the
    /// header carries no trace or a negative field.
    pub fn continue_from_header(&self, header: &TraceHeader) -> bool {
        if header.trace_id < 0 || header.eoi < 0 || header.ess < 0 {
            if header.is_present() {
                tracing::warn!(?header, "rejecting malformed trace header");
            }
            return false;
        }
        store(TraceContext {
            trace_id: header.trace_id,
            eoi: header.eoi,
            ess: header.ess,
        });
        true
    }

    /// Header returned to the caller at the end of a remotely entered call;
    /// carries the eoi counter so the caller can skip the indices used here.
    pub fn response_header(&self) -> Option<TraceHeader> {
        let ctx = load();
        ctx.is_active().then_some(TraceHeader {
            trace_id: ctx.trace_id,
            eoi: ctx.eoi,
            ess: UNSET,
        })
    }

    /// Apply a response header on the calling side. Ignored if it belongs to
    /// another trace.
    pub fn resume_from_response(&self, header: &TraceHeader) {
        let mut ctx = load();
        if !ctx.is_active() || header.trace_id != ctx.trace_id {
            if header.is_present() {
                tracing::warn!(
                    expected = ctx.trace_id,
                    received = header.trace_id,
                    "response header belongs to another trace"
                );
            }
            return;
        }
        if header.eoi > ctx.eoi {
            ctx.eoi = header.eoi;
            store(ctx);
        }
    }
}

/// Guard for one traced execution. Restores ess on drop and clears the
/// thread's trace when the execution opened it.
///
/// Not `Send`: it must be dropped on the thread whose state it manipulates.
#[derive(Debug)]
pub struct ExecutionScope<'a> {
    registry: &'a ControlFlowRegistry,
    trace_id: i64,
    eoi: i32,
    ess: i32,
    is_entry: bool,
    _not_send: PhantomData<*const ()>,
}

impl ExecutionScope<'_> {
    pub fn trace_id(&self) -> i64 {
        self.trace_id
    }

    pub fn eoi(&self) -> i32 {
        self.eoi
    }

    pub fn ess(&self) -> i32 {
        self.ess
    }

    pub fn is_entry(&self) -> bool {
        self.is_entry
    }

    /// Whether eoi and ess were both obtained.
    pub fn is_valid(&self) -> bool {
        self.trace_id != NO_TRACE_ID && self.eoi != UNSET && self.ess != UNSET
    }
}

impl Drop for ExecutionScope<'_> {
    fn drop(&mut self) {
        if self.is_entry {
            self.registry.clear();
        } else {
            self.registry.pop_ess(self.ess);
        }
    }
}
