//! Monitoring writers: where the controller hands finished records.
//!
//! - [`ChannelWriter`] pushes into a bounded crossbeam channel that a
//!   [`ChannelReader`](crate::pipeline::stages::ChannelReader) drains into an
//!   analysis pipeline. A full channel blocks the probe (backpressure).
//! - [`MemoryWriter`] keeps records in memory (tests, replay).
//! - [`BinaryLogWriter`] encodes records into any `Write` with the binary
//!   log format.

use crate::error::{Result, TraceScopeError};
use crate::record::binary::RecordEncoder;
use crate::record::MonitoringRecord;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Sink for records accepted by the [`MonitoringController`](super::MonitoringController).
pub trait MonitoringWriter: Send + Sync {
    /// Human-readable name used in state reports.
    fn name(&self) -> &str;

    /// Persist or forward one record.
    fn write_record(&self, record: &MonitoringRecord) -> Result<()>;

    /// Release resources; no further records are written afterwards.
    fn terminate(&self) {}

    /// One-line description for state reports.
    fn info(&self) -> String {
        self.name().to_string()
    }
}

/// Forwards records over a bounded channel.
pub struct ChannelWriter {
    tx: Mutex<Option<Sender<MonitoringRecord>>>,
}

impl ChannelWriter {
    /// Create a writer and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<MonitoringRecord>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }

    pub fn new(tx: Sender<MonitoringRecord>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }
}

impl MonitoringWriter for ChannelWriter {
    fn name(&self) -> &str {
        "ChannelWriter"
    }

    fn write_record(&self, record: &MonitoringRecord) -> Result<()> {
        // Clone the sender so a blocking send does not hold the lock.
        let tx = self
            .tx
            .lock()
            .map_err(|e| TraceScopeError::Channel(format!("Failed to acquire sender lock: {}", e)))?
            .clone()
            .ok_or_else(|| TraceScopeError::Channel("Writer terminated".to_string()))?;
        tx.send(record.clone())
            .map_err(|_| TraceScopeError::Channel("Receiver disconnected".to_string()))
    }

    fn terminate(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

/// Collects records in memory.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    records: Arc<Mutex<Vec<MonitoringRecord>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far.
    pub fn records(&self) -> Vec<MonitoringRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MonitoringWriter for MemoryWriter {
    fn name(&self) -> &str {
        "MemoryWriter"
    }

    fn write_record(&self, record: &MonitoringRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|e| TraceScopeError::Channel(format!("Failed to acquire record lock: {}", e)))?
            .push(record.clone());
        Ok(())
    }

    fn info(&self) -> String {
        format!("MemoryWriter ({} records)", self.len())
    }
}

/// Encodes records with the binary log format.
pub struct BinaryLogWriter<W: Write + Send> {
    encoder: Mutex<RecordEncoder<W>>,
}

impl<W: Write + Send> BinaryLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            encoder: Mutex::new(RecordEncoder::new(out)),
        }
    }

    pub fn records_written(&self) -> u64 {
        self.encoder
            .lock()
            .map(|e| e.records_written())
            .unwrap_or(0)
    }

    /// Flush and return the underlying output.
    pub fn into_inner(self) -> Result<W> {
        let mut encoder = self
            .encoder
            .into_inner()
            .map_err(|e| TraceScopeError::Channel(format!("Encoder lock poisoned: {}", e)))?;
        encoder.flush()?;
        Ok(encoder.into_inner())
    }
}

impl<W: Write + Send> MonitoringWriter for BinaryLogWriter<W> {
    fn name(&self) -> &str {
        "BinaryLogWriter"
    }

    fn write_record(&self, record: &MonitoringRecord) -> Result<()> {
        let mut encoder = self
            .encoder
            .lock()
            .map_err(|e| TraceScopeError::Channel(format!("Failed to acquire encoder lock: {}", e)))?;
        encoder.write_record(record)?;
        Ok(())
    }

    fn terminate(&self) {
        if let Ok(mut encoder) = self.encoder.lock() {
            if let Err(e) = encoder.flush() {
                tracing::warn!("Failed to flush binary log: {}", e);
            }
        }
    }

    fn info(&self) -> String {
        format!("BinaryLogWriter ({} records)", self.records_written())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::binary::RecordDecoder;
    use crate::record::BranchingRecord;

    fn branch(id: i32) -> MonitoringRecord {
        BranchingRecord {
            timestamp: 1,
            branch_id: id,
            branching_outcome: 0,
        }
        .into()
    }

    #[test]
    fn test_channel_writer_terminate_disconnects() {
        let (writer, rx) = ChannelWriter::bounded(4);
        writer.write_record(&branch(1)).unwrap();
        writer.terminate();
        assert!(writer.write_record(&branch(2)).is_err());
        assert_eq!(rx.recv().unwrap(), branch(1));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_binary_writer_round_trip() {
        let writer = BinaryLogWriter::new(Vec::new());
        writer.write_record(&branch(7)).unwrap();
        assert_eq!(writer.records_written(), 1);
        let bytes = writer.into_inner().unwrap();
        let mut decoder = RecordDecoder::new(bytes.as_slice());
        assert_eq!(decoder.next_record().unwrap(), Some(branch(7)));
    }
}
