//! Pipeline sources.
//!
//! - [`ChannelReader`]: drains a crossbeam channel, e.g. fed by a
//!   [`ChannelWriter`](crate::monitoring::ChannelWriter) or a [`QueueSinkStage`](super::QueueSinkStage)
//! - [`MemoryReader`]: replays a fixed list of records
//! - [`BinaryLogReader`]: decodes a binary record log

use crate::pipeline::event::PipelineEvent;
use crate::pipeline::port::{EventType, PortDescriptor};
use crate::pipeline::stage::{Reader, StageContext, StageError};
use crate::record::{MonitoringRecord, RecordDecoder};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

pub const OUTPUT: &str = "records";
pub const CHANNEL_OUTPUT: &str = "events";

const RECORDS: &[EventType] = &[EventType::MonitoringRecord];

static RECORD_PORTS: &[PortDescriptor] = &[PortDescriptor::output(OUTPUT, RECORDS)];

/// How long a channel reader blocks before re-checking for termination.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Emits everything received on a channel until all senders are gone or the
/// pipeline terminates.
pub struct ChannelReader<T> {
    rx: Receiver<T>,
    ports: [PortDescriptor; 1],
    received: u64,
}

impl<T: Into<PipelineEvent> + Send> ChannelReader<T> {
    pub fn new(rx: Receiver<T>) -> Self {
        Self::with_event_types(rx, RECORDS)
    }

    /// Declare the output port with `event_types` instead of monitoring records.
    pub fn with_event_types(rx: Receiver<T>, event_types: &'static [EventType]) -> Self {
        Self {
            rx,
            ports: [PortDescriptor::output(CHANNEL_OUTPUT, event_types)],
            received: 0,
        }
    }
}

impl<T: Into<PipelineEvent> + Send> Reader for ChannelReader<T> {
    fn name(&self) -> &str {
        "ChannelReader"
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn read(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        while !ctx.is_terminated() {
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(item) => {
                    self.received += 1;
                    ctx.emit(CHANNEL_OUTPUT, item);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!(received = self.received, "Channel reader done");
        Ok(())
    }
}

/// Replays records held in memory.
pub struct MemoryReader {
    records: Vec<MonitoringRecord>,
}

impl MemoryReader {
    pub fn new(records: Vec<MonitoringRecord>) -> Self {
        Self { records }
    }
}

impl Reader for MemoryReader {
    fn name(&self) -> &str {
        "MemoryReader"
    }

    fn ports(&self) -> &[PortDescriptor] {
        RECORD_PORTS
    }

    fn read(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        for record in std::mem::take(&mut self.records) {
            if ctx.is_terminated() {
                break;
            }
            ctx.emit(OUTPUT, record);
        }
        Ok(())
    }
}

/// Decodes records from a binary log.
///
/// With `skip_malformed`, records referencing unknown or conflicting strings
/// are logged and skipped; any error that leaves the stream misaligned still
/// aborts the read.
pub struct BinaryLogReader<R: Read + Send> {
    decoder: RecordDecoder<R>,
    skip_malformed: bool,
    records: u64,
    skipped: u64,
}

impl BinaryLogReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, skip_malformed: bool) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), skip_malformed))
    }
}

impl<R: Read + Send> BinaryLogReader<R> {
    pub fn new(input: R, skip_malformed: bool) -> Self {
        Self {
            decoder: RecordDecoder::new(input),
            skip_malformed,
            records: 0,
            skipped: 0,
        }
    }

    pub fn records_read(&self) -> u64 {
        self.records
    }

    pub fn records_skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: Read + Send> Reader for BinaryLogReader<R> {
    fn name(&self) -> &str {
        "BinaryLogReader"
    }

    fn ports(&self) -> &[PortDescriptor] {
        RECORD_PORTS
    }

    fn read(&mut self, ctx: &StageContext) -> Result<(), StageError> {
        while !ctx.is_terminated() {
            match self.decoder.next_record() {
                Ok(Some(record)) => {
                    self.records += 1;
                    ctx.emit(OUTPUT, record);
                }
                Ok(None) => break,
                Err(e) if self.skip_malformed && e.is_recoverable() => {
                    self.skipped += 1;
                    tracing::warn!("Skipping malformed record: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(
            records = self.records,
            skipped = self.skipped,
            "Binary log replayed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::CollectorStage;
    use crate::pipeline::Pipeline;
    use crate::record::{BranchingRecord, RecordEncoder};

    fn branch(id: i32) -> MonitoringRecord {
        BranchingRecord {
            timestamp: 1,
            branch_id: id,
            branching_outcome: 0,
        }
        .into()
    }

    #[test]
    fn test_channel_reader_stops_when_senders_drop() {
        let (tx, rx) = crossbeam_channel::unbounded::<MonitoringRecord>();
        let mut pipeline = Pipeline::new();
        let reader = pipeline.add_reader(ChannelReader::new(rx)).unwrap();
        let (collector, events) = CollectorStage::new();
        let sink = pipeline.add_stage(collector).unwrap();
        assert!(pipeline.connect(reader, CHANNEL_OUTPUT, sink, "events"));

        tx.send(branch(1)).unwrap();
        tx.send(branch(2)).unwrap();
        drop(tx);
        pipeline.run().unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_binary_log_reader_replays_log() {
        let mut encoder = RecordEncoder::new(Vec::new());
        encoder.write_record(&branch(1)).unwrap();
        encoder.write_record(&branch(2)).unwrap();
        let bytes = encoder.into_inner();

        let mut pipeline = Pipeline::new();
        let reader = pipeline
            .add_reader(BinaryLogReader::new(std::io::Cursor::new(bytes), true))
            .unwrap();
        let (collector, events) = CollectorStage::new();
        let sink = pipeline.add_stage(collector).unwrap();
        assert!(pipeline.connect(reader, OUTPUT, sink, "events"));
        pipeline.run().unwrap();
        assert_eq!(
            events.events(),
            vec![PipelineEvent::from(branch(1)), PipelineEvent::from(branch(2))]
        );
    }
}
