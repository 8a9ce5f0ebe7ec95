//! # Core Stream Types (RFC 9000 Sections 2, 16)
//!
//! Identifiers, offsets and error codes shared by both halves of a stream.

#![forbid(unsafe_code)]

use core::fmt;

// ============================================================================
// Variable-Length Integers (RFC 9000 Section 16)
// ============================================================================

/// An integer that is varint-encoded on the wire (1, 2, 4 or 8 bytes)
pub type VarInt = u64;

/// Largest encodable value, 2^62 - 1
pub const VARINT_MAX: u64 = (1u64 << 62) - 1;

/// Encoded size of a VarInt in bytes
pub fn varint_size(value: VarInt) -> usize {
    if value < 0x40 {
        1
    } else if value < 0x4000 {
        2
    } else if value < 0x4000_0000 {
        4
    } else {
        8
    }
}

// ============================================================================
// Offsets and Error Codes
// ============================================================================

/// Position of a byte within a stream
pub type StreamOffset = u64;

/// Byte count used for windows and credit
pub type ByteCount = u64;

/// Application Protocol Error Code (RFC 9000 Section 20.2)
///
/// Carried in RESET_STREAM and STOP_SENDING. Opaque to the transport.
pub type ApplicationErrorCode = VarInt;

// ============================================================================
// Stream ID (RFC 9000 Section 2.1)
// ============================================================================

/// Stream identifier, shared by both halves of a stream
///
/// Bit 0 is set for server-initiated streams, bit 1 for unidirectional ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl StreamId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Which endpoint opened the stream
    pub fn initiator(&self) -> StreamInitiator {
        if (self.0 & 0x01) == 0 {
            StreamInitiator::Client
        } else {
            StreamInitiator::Server
        }
    }

    /// Whether data flows one or both ways
    pub fn direction(&self) -> StreamDirection {
        if (self.0 & 0x02) == 0 {
            StreamDirection::Bidirectional
        } else {
            StreamDirection::Unidirectional
        }
    }

    pub fn is_bidirectional(&self) -> bool {
        self.direction() == StreamDirection::Bidirectional
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Bidirectional,
    Unidirectional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamInitiator {
    Client,
    Server,
}

// ============================================================================
// Unit Tests
// ============================================================================
