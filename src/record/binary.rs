//! Binary record encoding with a shared string registry.
//!
//! Every record type has a fixed big-endian field layout; string fields are
//! written as the `i32` id of the string in a [`StringRegistry`]. A stream is a
//! sequence of tagged frames:
//!
//! ```text
//! [0x00][id: i32][len: u32][utf8 bytes]   string registry entry
//! [0x01][OperationExecutionRecord::SIZE]  operation execution
//! [0x02][BranchingRecord::SIZE]           branching
//! ```
//!
//! A registry entry always precedes the first record that references it.

use crate::record::registry::StringRegistry;
use crate::record::{BranchingRecord, MonitoringRecord, OperationExecutionRecord};
use std::io::{self, Read, Write};
use thiserror::Error;

const TAG_STRING: u8 = 0x00;
const UNSET_ID: i32 = -1;
const TAG_OPERATION_EXECUTION: u8 = 0x01;
const TAG_BRANCHING: u8 = 0x02;

/// Longest string a registry entry may carry.
pub const MAX_STRING_LEN: usize = 1 << 20;

/// Errors raised while encoding or decoding records.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Buffer underflow: needed {needed} bytes, {available} available")]
    BufferUnderflow { needed: usize, available: usize },

    #[error("Buffer overflow: needed {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    #[error("Unknown string id {0}")]
    UnknownStringId(i32),

    #[error("String registry entry {0} conflicts with an earlier entry")]
    ConflictingStringId(i32),

    #[error("Invalid UTF-8 in string registry entry {0}")]
    InvalidUtf8(i32),

    #[error("String registry entry {id} announces {len} bytes, over the string length limit")]
    StringTooLong { id: i32, len: usize },

    #[error("Invalid string id {0}")]
    InvalidStringId(i32),

    #[error("Unknown record tag 0x{0:02X}")]
    UnknownRecordTag(u8),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Whether the stream stays aligned after this error, so a reader may skip
    /// the offending record and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CodecError::UnknownStringId(_)
                | CodecError::ConflictingStringId(_)
                | CodecError::InvalidStringId(_)
                | CodecError::InvalidUtf8(_)
        )
    }
}

// ── Fixed layout helpers ──

struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let available = self.buf.len() - self.pos;
        if available < N {
            return Err(CodecError::BufferUnderflow {
                needed: N,
                available,
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    fn get_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    fn get_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take()?))
    }

    fn get_string(&mut self, registry: &StringRegistry) -> Result<String, CodecError> {
        let id = self.get_i32()?;
        registry
            .get(id)
            .map(str::to_string)
            .ok_or(CodecError::UnknownStringId(id))
    }
}

struct ByteSink<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteSink<'a> {
    fn new(buf: &'a mut [u8], needed: usize) -> Result<Self, CodecError> {
        if buf.len() < needed {
            return Err(CodecError::BufferOverflow {
                needed,
                available: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn put_string(&mut self, value: &str, registry: &StringRegistry) -> Result<(), CodecError> {
        let id = registry.id_of(value).ok_or(CodecError::UnknownStringId(-1))?;
        self.put(&id.to_be_bytes());
        Ok(())
    }
}

/// Write an operation execution into `out` using ids from `registry`.
///
/// All string fields must already be interned.
pub fn write_operation_execution(
    record: &OperationExecutionRecord,
    out: &mut [u8],
    registry: &StringRegistry,
) -> Result<(), CodecError> {
    let mut sink = ByteSink::new(out, OperationExecutionRecord::SIZE)?;
    sink.put_string(&record.component_signature, registry)?;
    sink.put_string(&record.operation_signature, registry)?;
    sink.put_string(&record.session_id, registry)?;
    sink.put(&record.trace_id.to_be_bytes());
    sink.put(&record.tin.to_be_bytes());
    sink.put(&record.tout.to_be_bytes());
    sink.put_string(&record.host_name, registry)?;
    sink.put(&record.eoi.to_be_bytes());
    sink.put(&record.ess.to_be_bytes());
    Ok(())
}

/// Read an operation execution from its fixed layout.
pub fn read_operation_execution(
    buf: &[u8],
    registry: &StringRegistry,
) -> Result<OperationExecutionRecord, CodecError> {
    let mut cursor = ByteCursor::new(buf);
    Ok(OperationExecutionRecord {
        component_signature: cursor.get_string(registry)?,
        operation_signature: cursor.get_string(registry)?,
        session_id: cursor.get_string(registry)?,
        trace_id: cursor.get_i64()?,
        tin: cursor.get_i64()?,
        tout: cursor.get_i64()?,
        host_name: cursor.get_string(registry)?,
        eoi: cursor.get_i32()?,
        ess: cursor.get_i32()?,
    })
}

pub fn write_branching(record: &BranchingRecord, out: &mut [u8]) -> Result<(), CodecError> {
    let mut sink = ByteSink::new(out, BranchingRecord::SIZE)?;
    sink.put(&record.timestamp.to_be_bytes());
    sink.put(&record.branch_id.to_be_bytes());
    sink.put(&record.branching_outcome.to_be_bytes());
    Ok(())
}

pub fn read_branching(buf: &[u8]) -> Result<BranchingRecord, CodecError> {
    let mut cursor = ByteCursor::new(buf);
    Ok(BranchingRecord {
        timestamp: cursor.get_i64()?,
        branch_id: cursor.get_i32()?,
        branching_outcome: cursor.get_i32()?,
    })
}

// ── Stream encoder / decoder ──

/// Writes a framed record stream, announcing each string once.
pub struct RecordEncoder<W: Write> {
    out: W,
    registry: StringRegistry,
    scratch: Vec<u8>,
    records_written: u64,
}

impl<W: Write> RecordEncoder<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            registry: StringRegistry::new(),
            scratch: Vec::with_capacity(OperationExecutionRecord::SIZE),
            records_written: 0,
        }
    }

    pub fn write_record(&mut self, record: &MonitoringRecord) -> Result<(), CodecError> {
        match record {
            MonitoringRecord::OperationExecution(r) => {
                for value in [
                    &r.component_signature,
                    &r.operation_signature,
                    &r.session_id,
                    &r.host_name,
                ] {
                    self.announce(value)?;
                }
                self.scratch.resize(OperationExecutionRecord::SIZE, 0);
                write_operation_execution(r, &mut self.scratch, &self.registry)?;
                self.out.write_all(&[TAG_OPERATION_EXECUTION])?;
            }
            MonitoringRecord::Branching(r) => {
                self.scratch.resize(BranchingRecord::SIZE, 0);
                write_branching(r, &mut self.scratch)?;
                self.out.write_all(&[TAG_BRANCHING])?;
            }
        }
        self.out.write_all(&self.scratch)?;
        self.records_written += 1;
        Ok(())
    }

    fn announce(&mut self, value: &str) -> Result<(), CodecError> {
        if value.len() > MAX_STRING_LEN {
            return Err(CodecError::StringTooLong {
                id: UNSET_ID,
                len: value.len(),
            });
        }
        let (id, is_new) = self.registry.intern(value);
        if is_new {
            self.out.write_all(&[TAG_STRING])?;
            self.out.write_all(&id.to_be_bytes())?;
            self.out.write_all(&(value.len() as u32).to_be_bytes())?;
            self.out.write_all(value.as_bytes())?;
        }
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn registry(&self) -> &StringRegistry {
        &self.registry
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Reads a framed record stream produced by [`RecordEncoder`].
pub struct RecordDecoder<R: Read> {
    input: R,
    registry: StringRegistry,
    scratch: Vec<u8>,
}

impl<R: Read> RecordDecoder<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            registry: StringRegistry::new(),
            scratch: Vec::new(),
        }
    }

    /// Decode the next record. `Ok(None)` marks a clean end of stream.
    pub fn next_record(&mut self) -> Result<Option<MonitoringRecord>, CodecError> {
        loop {
            let mut tag = [0u8; 1];
            if self.fill(&mut tag)? == 0 {
                return Ok(None);
            }
            match tag[0] {
                TAG_STRING => self.read_string_entry()?,
                TAG_OPERATION_EXECUTION => {
                    self.read_payload(OperationExecutionRecord::SIZE)?;
                    let record = read_operation_execution(&self.scratch, &self.registry)?;
                    return Ok(Some(record.into()));
                }
                TAG_BRANCHING => {
                    self.read_payload(BranchingRecord::SIZE)?;
                    return Ok(Some(read_branching(&self.scratch)?.into()));
                }
                other => return Err(CodecError::UnknownRecordTag(other)),
            }
        }
    }

    fn read_string_entry(&mut self) -> Result<(), CodecError> {
        self.read_payload(8)?;
        let mut cursor = ByteCursor::new(&self.scratch);
        let id = cursor.get_i32()?;
        let len = u32::from_be_bytes(cursor.take()?) as usize;
        if len > MAX_STRING_LEN {
            return Err(CodecError::StringTooLong { id, len });
        }
        self.read_payload(len)?;
        if id < 0 {
            return Err(CodecError::InvalidStringId(id));
        }
        let value = String::from_utf8(self.scratch.clone()).map_err(|_| CodecError::InvalidUtf8(id))?;
        if !self.registry.register(id, value) {
            return Err(CodecError::ConflictingStringId(id));
        }
        Ok(())
    }

    fn read_payload(&mut self, len: usize) -> Result<(), CodecError> {
        self.scratch.resize(len, 0);
        let mut buf = std::mem::take(&mut self.scratch);
        let read = self.fill(&mut buf);
        self.scratch = buf;
        let read = read?;
        if read < len {
            return Err(CodecError::BufferUnderflow {
                needed: len,
                available: read,
            });
        }
        Ok(())
    }

    /// Read until `buf` is full or the input ends; returns the bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.input.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    pub fn registry(&self) -> &StringRegistry {
        &self.registry
    }
}
