//! # Stream Data Reassembly (RFC 9000 Section 2.2)
//!
//! STREAM frames can arrive out of order, duplicated, or overlapping after
//! retransmission. The reassembly buffer keeps received chunks keyed by
//! offset and hands them to the reader strictly in order.
//!
//! ## Invariants
//!
//! - Bytes before `read_offset` are never returned again
//! - Overlapping data is assumed identical; the first copy wins
//! - Chunks are `Bytes` slices of the frame payload, never copied

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::types::StreamOffset;

/// Out-of-order receive buffer
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    /// Next byte expected by the reader
    read_offset: StreamOffset,

    /// Received chunks not yet read, keyed by starting offset
    chunks: BTreeMap<StreamOffset, Bytes>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert received stream data at `offset`
    ///
    /// Data entirely before the read offset is dropped. When two chunks start
    /// at the same offset the longer one is kept.
    pub fn insert(&mut self, offset: StreamOffset, data: Bytes) {
        if data.is_empty() {
            return;
        }
        let end = offset.saturating_add(data.len() as u64);
        if end <= self.read_offset {
            return;
        }

        let (offset, data) = if offset < self.read_offset {
            let skip = (self.read_offset - offset) as usize;
            (self.read_offset, data.slice(skip..))
        } else {
            (offset, data)
        };

        self.store(offset, data);
    }

    fn store(&mut self, offset: StreamOffset, data: Bytes) {
        match self.chunks.get(&offset) {
            Some(existing) if existing.len() >= data.len() => {}
            _ => {
                self.chunks.insert(offset, data);
            }
        }
    }

    /// Pop the next in-order chunk, at most `max_len` bytes
    pub fn pop(&mut self, max_len: usize) -> Option<Bytes> {
        if max_len == 0 {
            return None;
        }
        loop {
            let (&offset, _) = self.chunks.iter().next()?;
            if offset > self.read_offset {
                // gap
                return None;
            }
            let mut data = self.chunks.remove(&offset)?;
            let end = offset + data.len() as u64;
            if end <= self.read_offset {
                continue;
            }
            if offset < self.read_offset {
                data = data.slice((self.read_offset - offset) as usize..);
            }
            if data.len() > max_len {
                let rest = data.split_off(max_len);
                self.store(self.read_offset + max_len as u64, rest);
            }
            self.read_offset += data.len() as u64;
            return Some(data);
        }
    }

    /// Next byte to deliver to the reader
    pub fn read_offset(&self) -> StreamOffset {
        self.read_offset
    }

    /// Drop all buffered data
    pub fn clear(&mut self) {
        self.chunks.clear();
    }

    /// Number of chunks held
    pub fn pending_chunks(&self) -> usize {
        self.chunks.len()
    }
}
