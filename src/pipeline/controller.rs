//! Pipeline controller: stage graph, delivery and lifecycle.
//!
//! Delivery is synchronous. `emit` runs every subscriber of the output port
//! on the calling thread, in subscription order, before it returns; a
//! subscriber that emits in turn recurses down the graph. Readers are the
//! only threads: `start` spawns one per reader.
//!
//! Each stage sits behind its own mutex, so a stage reachable from several
//! reader threads sees one event at a time. Connections are checked for
//! cycles, which keeps lock acquisition in graph order.

use crate::config::AnalysisConfig;
use crate::model::{ModelSet, SignatureExtractor};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::event::{ConfigValue, PipelineEvent};
use crate::pipeline::id::{ConnectionId, StageId};
use crate::pipeline::port::{find_port, PortDescriptor, PortDirection};
use crate::pipeline::stage::{AnyStage, Reader, Stage, StageContext};
use crate::pipeline::stages::{
    assembly, filter, reconstruction, ExecutionModelAssemblerStage, TimestampFilterStage,
    TraceReconstructionStage, TypeModelAssemblerStage,
};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// A connection from an output port of one stage to an input port of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: StageId,
    pub output: &'static str,
    pub target: StageId,
    pub input: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct Subscriber {
    target: StageId,
    input: &'static str,
}

enum SlotKind {
    Stage(Mutex<AnyStage>),
    Reader(Mutex<Box<dyn Reader>>),
}

struct StageSlot {
    name: String,
    kind: SlotKind,
    /// Copied out of the stage so delivery can validate without locking it.
    ports: Vec<PortDescriptor>,
    subscribers: HashMap<&'static str, Vec<Subscriber>>,
}

impl StageSlot {
    fn is_reader(&self) -> bool {
        matches!(self.kind, SlotKind::Reader(_))
    }
}

/// State shared with reader threads.
pub(crate) struct PipelineCore {
    slots: Vec<StageSlot>,
    connections: Vec<Connection>,
    started: AtomicBool,
    terminated: AtomicBool,
    terminate_done: AtomicBool,
}

impl PipelineCore {
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn emit(&self, stage: StageId, output: &str, event: PipelineEvent) -> bool {
        let Some(slot) = self.slots.get(stage.index()) else {
            tracing::warn!("Emit from unknown stage {:?}", stage);
            return false;
        };
        let Some(port) = find_port(&slot.ports, output, PortDirection::Output) else {
            tracing::warn!(stage = %slot.name, port = output, "Emit on unknown output port");
            return false;
        };
        let event_type = event.event_type();
        if !port.accepts(event_type) {
            tracing::warn!(
                stage = %slot.name,
                port = output,
                %event_type,
                "Event type not declared by output port"
            );
            return false;
        }
        if let Some(subscribers) = slot.subscribers.get(port.name) {
            for subscriber in subscribers {
                self.deliver(*subscriber, &event);
            }
        }
        true
    }

    fn deliver(&self, subscriber: Subscriber, event: &PipelineEvent) {
        let Some(slot) = self.slots.get(subscriber.target.index()) else {
            return;
        };
        let SlotKind::Stage(stage) = &slot.kind else {
            return;
        };
        let mut stage = match stage.lock() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(stage = %slot.name, "Skipping delivery, stage lock poisoned: {}", e);
                return;
            }
        };
        let ctx = StageContext {
            core: self,
            stage: subscriber.target,
        };
        match catch_unwind(AssertUnwindSafe(|| stage.on_event(subscriber.input, event, &ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(stage = %slot.name, port = subscriber.input, "Handler failed: {}", e);
            }
            Err(panic) => {
                tracing::warn!(
                    stage = %slot.name,
                    port = subscriber.input,
                    "Handler panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }

    /// Drive one reader to completion. The error message is handed back to
    /// [`Pipeline::join`].
    fn run_reader(&self, id: StageId) -> Result<(), String> {
        let Some(slot) = self.slots.get(id.index()) else {
            return Err(format!("unknown reader {:?}", id));
        };
        let SlotKind::Reader(reader) = &slot.kind else {
            return Err(format!("stage {:?} is not a reader", id));
        };
        let mut reader = reader.lock().map_err(|e| {
            tracing::error!(reader = %slot.name, "Reader lock poisoned: {}", e);
            e.to_string()
        })?;
        let ctx = StageContext { core: self, stage: id };
        tracing::info!(reader = %slot.name, "Reader started");
        match reader.read(&ctx) {
            Ok(()) => {
                tracing::info!(reader = %slot.name, "Reader finished");
                Ok(())
            }
            Err(e) => {
                tracing::error!(reader = %slot.name, "Reader failed: {}", e);
                Err(e.to_string())
            }
        }
    }

    /// Kahn's algorithm over the connection graph.
    fn execution_order(&self) -> Vec<StageId> {
        let n = self.slots.len();
        let mut in_degree = vec![0u32; n];
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];

        for conn in &self.connections {
            let from = conn.source.index();
            let to = conn.target.index();
            if from < n && to < n {
                adj[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut queue: std::collections::VecDeque<usize> =
            (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(node) = queue.pop_front() {
            order.push(StageId(node as u32));
            for &next in &adj[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != n {
            tracing::warn!(
                "Pipeline graph has a cycle! Only {} of {} stages scheduled.",
                order.len(),
                n
            );
        }
        order
    }

    /// Check if adding a connection from `from` to `to` would create a cycle.
    fn would_create_cycle(&self, from: StageId, to: StageId) -> bool {
        // If `to` can reach `from` through existing connections, from->to closes a cycle.
        let mut visited = vec![false; self.slots.len()];
        let mut stack = vec![to];

        while let Some(current) = stack.pop() {
            if current == from {
                return true;
            }
            let idx = current.index();
            if idx >= self.slots.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;

            for conn in &self.connections {
                if conn.source == current {
                    stack.push(conn.target);
                }
            }
        }
        false
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// Snapshot of a single stage.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub id: StageId,
    pub name: String,
    pub is_reader: bool,
    pub ports: Vec<PortDescriptor>,
}

/// Complete topology snapshot of the pipeline graph.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub stages: Vec<StageSnapshot>,
    pub connections: Vec<Connection>,
}

/// Owns readers, stages and their connections, and drives their lifecycle.
pub struct Pipeline {
    core: Arc<PipelineCore>,
    threads: Mutex<Vec<(StageId, JoinHandle<Result<(), String>>)>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            core: Arc::new(PipelineCore {
                slots: Vec::new(),
                connections: Vec::new(),
                started: AtomicBool::new(false),
                terminated: AtomicBool::new(false),
                terminate_done: AtomicBool::new(false),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Mutable access to the graph; only before `start`.
    fn core_mut(&mut self) -> PipelineResult<&mut PipelineCore> {
        if self.core.started.load(Ordering::Acquire) {
            return Err(PipelineError::AlreadyStarted);
        }
        Arc::get_mut(&mut self.core).ok_or(PipelineError::AlreadyStarted)
    }

    fn push_slot(&mut self, name: String, kind: SlotKind, ports: Vec<PortDescriptor>) -> PipelineResult<StageId> {
        let core = self.core_mut()?;
        let id = StageId(core.slots.len() as u32);
        tracing::debug!(stage = %name, "Added {:?}", id);
        core.slots.push(StageSlot {
            name,
            kind,
            ports,
            subscribers: HashMap::new(),
        });
        Ok(id)
    }

    pub fn add_stage(&mut self, stage: impl Into<AnyStage>) -> PipelineResult<StageId> {
        let stage = stage.into();
        let name = stage.name().to_string();
        let ports = stage.ports().to_vec();
        self.push_slot(name, SlotKind::Stage(Mutex::new(stage)), ports)
    }

    /// Add a user-defined stage.
    pub fn add_plugin<S: Stage + 'static>(&mut self, stage: S) -> PipelineResult<StageId> {
        self.add_stage(AnyStage::Plugin(Box::new(stage)))
    }

    pub fn add_reader<R: Reader + 'static>(&mut self, reader: R) -> PipelineResult<StageId> {
        self.add_boxed_reader(Box::new(reader))
    }

    pub fn add_boxed_reader(&mut self, reader: Box<dyn Reader>) -> PipelineResult<StageId> {
        let name = reader.name().to_string();
        let ports = reader.ports().to_vec();
        self.push_slot(name, SlotKind::Reader(Mutex::new(reader)), ports)
    }

    /// Connect an output port to an input port. Returns `false` and leaves
    /// the graph unchanged if the connection is invalid.
    pub fn connect(&mut self, source: StageId, output: &str, target: StageId, input: &str) -> bool {
        match self.try_connect(source, output, target, input) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Rejected connection {:?}.{} -> {:?}.{}: {}", source, output, target, input, e);
                false
            }
        }
    }

    /// Like [`connect`](Self::connect), reporting why a connection is rejected.
    pub fn try_connect(
        &mut self,
        source: StageId,
        output: &str,
        target: StageId,
        input: &str,
    ) -> PipelineResult<ConnectionId> {
        let core = self.core_mut()?;
        let source_slot = core
            .slots
            .get(source.index())
            .ok_or(PipelineError::UnknownStage(source))?;
        let target_slot = core
            .slots
            .get(target.index())
            .ok_or(PipelineError::UnknownStage(target))?;
        if target_slot.is_reader() {
            return Err(PipelineError::ReaderAsTarget(target));
        }
        let out_port = *find_port(&source_slot.ports, output, PortDirection::Output).ok_or_else(|| {
            PipelineError::UnknownPort {
                stage: source,
                port: output.to_string(),
                direction: PortDirection::Output.as_str(),
            }
        })?;
        let in_port = *find_port(&target_slot.ports, input, PortDirection::Input).ok_or_else(|| {
            PipelineError::UnknownPort {
                stage: target,
                port: input.to_string(),
                direction: PortDirection::Input.as_str(),
            }
        })?;
        if core.would_create_cycle(source, target) {
            return Err(PipelineError::CycleDetected);
        }
        if !out_port.can_connect_to(&in_port) {
            return Err(PipelineError::PortMismatch {
                output: out_port.event_types,
                input: in_port.event_types,
            });
        }

        let id = ConnectionId(core.connections.len() as u32);
        core.slots[source.index()]
            .subscribers
            .entry(out_port.name)
            .or_default()
            .push(Subscriber {
                target,
                input: in_port.name,
            });
        core.connections.push(Connection {
            id,
            source,
            output: out_port.name,
            target,
            input: in_port.name,
        });
        tracing::info!(
            "Connected {}.{} -> {}.{}",
            core.slots[source.index()].name,
            out_port.name,
            core.slots[target.index()].name,
            in_port.name
        );
        Ok(id)
    }

    /// Push `event` out of `stage` through `output`, running all subscribers
    /// synchronously. Returns `false` if the port is unknown or does not
    /// declare the event's type.
    pub fn emit(&self, stage: StageId, output: &str, event: impl Into<PipelineEvent>) -> bool {
        self.core.emit(stage, output, event.into())
    }

    /// [`emit`](Self::emit) for callers holding an optional event; `None` is rejected.
    pub fn emit_opt(&self, stage: StageId, output: &str, event: Option<PipelineEvent>) -> bool {
        match event {
            Some(event) => self.core.emit(stage, output, event),
            None => {
                tracing::warn!("Emit of absent event on {:?}.{}", stage, output);
                false
            }
        }
    }

    /// Deliver `event` straight to an input port, as if an upstream stage emitted it.
    pub fn inject(&self, target: StageId, input: &str, event: impl Into<PipelineEvent>) -> bool {
        let event = event.into();
        let Some(slot) = self.core.slots.get(target.index()) else {
            return false;
        };
        match find_port(&slot.ports, input, PortDirection::Input) {
            Some(port) if port.accepts(event.event_type()) => {
                self.core.deliver(
                    Subscriber {
                        target,
                        input: port.name,
                    },
                    &event,
                );
                true
            }
            _ => {
                tracing::warn!(stage = %slot.name, port = input, "Inject rejected");
                false
            }
        }
    }

    /// Change a stage setting at runtime.
    pub fn configure(&self, stage: StageId, key: &str, value: &ConfigValue) -> PipelineResult<()> {
        let slot = self
            .core
            .slots
            .get(stage.index())
            .ok_or(PipelineError::UnknownStage(stage))?;
        let SlotKind::Stage(inner) = &slot.kind else {
            return Err(PipelineError::Config {
                stage,
                message: "readers take no runtime configuration".to_string(),
            });
        };
        let mut inner = inner.lock().map_err(|e| PipelineError::Config {
            stage,
            message: format!("Failed to acquire stage lock: {}", e),
        })?;
        inner
            .on_config_change(key, value)
            .map_err(|e| PipelineError::Config {
                stage,
                message: e.to_string(),
            })
    }

    /// Call `on_start` on every stage, then spawn one thread per reader.
    pub fn start(&self) -> PipelineResult<()> {
        if self.core.started.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::AlreadyStarted);
        }
        for id in self.core.execution_order() {
            let slot = &self.core.slots[id.index()];
            if let SlotKind::Stage(stage) = &slot.kind {
                if let Ok(mut stage) = stage.lock() {
                    stage.on_start(&StageContext {
                        core: &self.core,
                        stage: id,
                    });
                }
            }
        }

        let mut threads = self.threads.lock().unwrap_or_else(PoisonError::into_inner);
        for (idx, slot) in self.core.slots.iter().enumerate() {
            if !slot.is_reader() {
                continue;
            }
            let id = StageId(idx as u32);
            let core = Arc::clone(&self.core);
            let handle = thread::Builder::new()
                .name(format!("reader-{}", slot.name))
                .spawn(move || core.run_reader(id))?;
            threads.push((id, handle));
        }
        tracing::info!("Pipeline started with {} reader thread(s)", threads.len());
        Ok(())
    }

    /// Wait for all reader threads to finish. Reports the first reader that
    /// failed or panicked.
    pub fn join(&self) -> PipelineResult<()> {
        let threads = self
            .threads
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default();
        let mut result = Ok(());
        for (id, handle) in threads {
            let outcome = match handle.join() {
                Ok(Ok(())) => continue,
                Ok(Err(message)) => PipelineError::ReaderFailed(id, message),
                Err(_) => {
                    tracing::error!("Reader thread for {:?} panicked", id);
                    PipelineError::ReaderPanicked(id)
                }
            };
            if result.is_ok() {
                result = Err(outcome);
            }
        }
        result
    }

    /// Ask readers to stop and call `on_terminate` on every stage exactly
    /// once, upstream stages first so their final emits reach live stages.
    pub fn terminate(&self) {
        self.core.terminated.store(true, Ordering::Release);
        if self.core.terminate_done.swap(true, Ordering::AcqRel) {
            return;
        }
        for id in self.core.execution_order() {
            let slot = &self.core.slots[id.index()];
            let ctx = StageContext {
                core: &self.core,
                stage: id,
            };
            match &slot.kind {
                SlotKind::Stage(stage) => match stage.lock() {
                    Ok(mut stage) => stage.on_terminate(&ctx),
                    Err(e) => tracing::warn!(stage = %slot.name, "Cannot terminate: {}", e),
                },
                SlotKind::Reader(reader) => match reader.lock() {
                    Ok(mut reader) => reader.on_terminate(&ctx),
                    Err(e) => tracing::warn!(reader = %slot.name, "Cannot terminate: {}", e),
                },
            }
        }
        tracing::info!("Pipeline terminated");
    }

    /// Start, wait for all readers, then terminate. Stages are terminated
    /// even when a reader failed; the failure is returned afterwards.
    pub fn run(&self) -> PipelineResult<()> {
        self.start()?;
        let joined = self.join();
        self.terminate();
        joined
    }

    pub fn is_terminated(&self) -> bool {
        self.core.is_terminated()
    }

    pub fn len(&self) -> usize {
        self.core.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core.slots.is_empty()
    }

    pub fn stage_name(&self, id: StageId) -> Option<&str> {
        self.core.slots.get(id.index()).map(|s| s.name.as_str())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.core.connections
    }

    /// Topological order of all stages and readers.
    pub fn execution_order(&self) -> Vec<StageId> {
        self.core.execution_order()
    }

    pub fn topology(&self) -> TopologySnapshot {
        TopologySnapshot {
            stages: self
                .core
                .slots
                .iter()
                .enumerate()
                .map(|(idx, slot)| StageSnapshot {
                    id: StageId(idx as u32),
                    name: slot.name.clone(),
                    is_reader: slot.is_reader(),
                    ports: slot.ports.clone(),
                })
                .collect(),
            connections: self.core.connections.clone(),
        }
    }
}

/// Stage IDs of the default analysis pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DefaultStageIds {
    pub reader: StageId,
    pub filter: StageId,
    pub reconstruction: StageId,
    pub type_assembler: StageId,
    pub execution_assembler: StageId,
}

/// Builder for the default analysis pipeline.
pub struct PipelineBuilder {
    config: AnalysisConfig,
}

impl PipelineBuilder {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// ```text
    /// reader → TimestampFilter ─┬→ TraceReconstruction ──calls──→ ExecutionModelAssembler
    ///                           └→ TypeModelAssembler
    /// ```
    pub fn build_default(
        self,
        reader: Box<dyn Reader>,
        models: &ModelSet,
        extractor: Arc<dyn SignatureExtractor>,
    ) -> PipelineResult<(Pipeline, DefaultStageIds)> {
        let mut pipeline = Pipeline::new();
        let label = self.config.source_label.clone();

        let reader_output = reader
            .ports()
            .iter()
            .find(|p| p.direction == PortDirection::Output)
            .map(|p| p.name)
            .ok_or_else(|| PipelineError::UnknownPort {
                stage: StageId::INVALID,
                port: "<any>".to_string(),
                direction: PortDirection::Output.as_str(),
            })?;
        let reader = pipeline.add_boxed_reader(reader)?;
        let filter = pipeline.add_stage(TimestampFilterStage::from_config(&self.config.filter))?;
        let reconstruction = pipeline.add_stage(TraceReconstructionStage::from_config(
            &self.config.reconstruction,
        ))?;
        let type_assembler = pipeline.add_stage(TypeModelAssemblerStage::new(
            models.types.clone(),
            models.sources.clone(),
            extractor.clone(),
            label.clone(),
        ))?;
        let execution_assembler = pipeline.add_stage(ExecutionModelAssemblerStage::new(
            models.execution.clone(),
            models.sources.clone(),
            extractor,
            label,
        ))?;

        pipeline.try_connect(reader, reader_output, filter, filter::INPUT)?;
        pipeline.try_connect(filter, filter::WITHIN, reconstruction, reconstruction::INPUT)?;
        pipeline.try_connect(filter, filter::WITHIN, type_assembler, assembly::EVENTS)?;
        pipeline.try_connect(reconstruction, reconstruction::CALLS, execution_assembler, assembly::CALLS)?;

        let ids = DefaultStageIds {
            reader,
            filter,
            reconstruction,
            type_assembler,
            execution_assembler,
        };
        Ok((pipeline, ids))
    }
}
