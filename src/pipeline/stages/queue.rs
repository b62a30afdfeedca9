//! QueueSinkStage: hands events to another thread or pipeline.
//!
//! Sending blocks while the queue is full, so a slow consumer throttles the
//! upstream reader instead of losing events. The sender is dropped on
//! terminate, which ends a [`ChannelReader`] on the other side.

use crate::error::TraceScopeError;
use crate::pipeline::event::{ConfigValue, PipelineEvent};
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stage::{StageContext, StageError};
use crate::pipeline::stages::readers::ChannelReader;
use crossbeam_channel::{bounded, Sender};

pub const INPUT: &str = "events";

static PORTS: &[PortDescriptor] = &[PortDescriptor::input(INPUT, &[EventType::Any])];

pub struct QueueSinkStage {
    tx: Option<Sender<PipelineEvent>>,
    sent: u64,
}

impl QueueSinkStage {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx), sent: 0 }
    }

    pub fn name(&self) -> &str {
        "QueueSink"
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn on_start(&mut self, _ctx: &StageContext) {}

    pub fn on_event(
        &mut self,
        _input: &str,
        event: &PipelineEvent,
        _ctx: &StageContext,
    ) -> Result<(), StageError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| TraceScopeError::Channel("Queue already closed".to_string()))?;
        tx.send(event.clone())
            .map_err(|_| TraceScopeError::Channel("Queue receiver disconnected".to_string()))?;
        self.sent += 1;
        Ok(())
    }

    pub fn on_terminate(&mut self, _ctx: &StageContext) {
        self.tx = None;
        tracing::debug!(sent = self.sent, "Queue sink closed");
    }

    pub fn on_config_change(&mut self, key: &str, _value: &ConfigValue) -> Result<(), StageError> {
        Err(StageError::InvalidConfig {
            key: key.to_string(),
            message: "stage has no settings".to_string(),
        })
    }
}

/// A queue sink and the reader draining it. The reader declares
/// `event_types` on its output port.
pub fn channel_pair(
    capacity: usize,
    event_types: &'static [EventType],
) -> (QueueSinkStage, ChannelReader<PipelineEvent>) {
    let (tx, rx) = bounded(capacity);
    (
        QueueSinkStage::new(tx),
        ChannelReader::with_event_types(rx, event_types),
    )
}
