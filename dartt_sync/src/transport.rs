//! The link to the device.

use std::{error::Error, fmt};

use crate::WORD_SIZE;

/// A failure reported by a [Transport], carrying the link's status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportError {
    /// The status code returned by the link.
    pub code: i32,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport failed with status {}", self.code)
    }
}

impl Error for TransportError {}

/// A word-addressed link to the device's copy of the variable.
///
/// Offsets and lengths are in bytes relative to the variable's base, and are always multiples
/// of [WORD_SIZE]. A call either transfers every byte or fails.
pub trait Transport {
    /// Write `bytes` to the device at `offset`.
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), TransportError>;

    /// Fill `buf` with the device's bytes at `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), TransportError>;
}

/// A device simulated by a byte array.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    memory: Vec<u8>,
    /// Fail every write with [ERROR_REFUSED](Self::ERROR_REFUSED).
    pub fail_writes: bool,
    /// Fail every read with [ERROR_REFUSED](Self::ERROR_REFUSED).
    pub fail_reads: bool,
    writes: Vec<(usize, usize)>,
    reads: Vec<(usize, usize)>,
}

impl MemoryTransport {
    /// The device refused the request.
    pub const ERROR_REFUSED: i32 = -1;
    /// The request reached past the end of the device memory.
    pub const ERROR_OUT_OF_RANGE: i32 = -2;
    /// The request was not word aligned.
    pub const ERROR_MISALIGNED: i32 = -3;

    /// A device with `size` zeroed bytes.
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0; size])
    }

    /// A device holding `memory`.
    pub fn from_bytes(memory: Vec<u8>) -> Self {
        Self {
            memory,
            ..Self::default()
        }
    }

    /// The device memory.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// The device memory, for simulating changes made by the device itself.
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// The (offset, length) of every successful write, in order.
    pub fn writes(&self) -> &[(usize, usize)] {
        &self.writes
    }

    /// The (offset, length) of every successful read, in order.
    pub fn reads(&self) -> &[(usize, usize)] {
        &self.reads
    }

    fn range(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>, TransportError> {
        if offset % WORD_SIZE != 0 || len % WORD_SIZE != 0 {
            return Err(TransportError {
                code: Self::ERROR_MISALIGNED,
            });
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.memory.len() => Ok(offset..end),
            _ => Err(TransportError {
                code: Self::ERROR_OUT_OF_RANGE,
            }),
        }
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_writes {
            return Err(TransportError {
                code: Self::ERROR_REFUSED,
            });
        }
        let range = self.range(offset, bytes.len())?;
        self.memory[range].copy_from_slice(bytes);
        self.writes.push((offset, bytes.len()));
        Ok(())
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), TransportError> {
        if self.fail_reads {
            return Err(TransportError {
                code: Self::ERROR_REFUSED,
            });
        }
        let range = self.range(offset, buf.len())?;
        buf.copy_from_slice(&self.memory[range]);
        self.reads.push((offset, buf.len()));
        Ok(())
    }
}
