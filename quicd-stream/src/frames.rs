//! # Stream Frames (RFC 9000 Section 19)
//!
//! Semantic view of the frames a stream exchanges with its connection. Wire
//! serialization belongs to the connection's packet writer; a stream only
//! needs each frame's fields and, for STREAM frames, a bound on header
//! overhead so it can fill a packet without overshooting.

#![forbid(unsafe_code)]

use bytes::Bytes;

use crate::types::{varint_size, ApplicationErrorCode, ByteCount, StreamId, StreamOffset};
use crate::version::ProtocolVariant;

/// gQUIC stream frame header upper bound: type, 4-byte id, 8-byte offset, 2-byte length
const GQUIC_STREAM_FRAME_MAX_HEADER: usize = 1 + 4 + 8 + 2;

/// STREAM Frame (RFC 9000 Section 19.8)
///
/// Carries application data. `fin` marks the last byte of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    pub stream_id: StreamId,

    /// Offset of the first byte of `data`
    pub offset: StreamOffset,

    pub data: Bytes,

    /// Final marker
    pub fin: bool,
}

impl StreamFrame {
    /// Number of payload bytes
    pub fn data_len(&self) -> ByteCount {
        self.data.len() as ByteCount
    }

    /// Offset one past the last byte carried
    pub fn end_offset(&self) -> StreamOffset {
        self.offset.saturating_add(self.data_len())
    }

    /// Header bytes for a frame at `offset` on `stream_id` within a `max_bytes` budget
    pub fn header_len(
        stream_id: StreamId,
        offset: StreamOffset,
        max_bytes: usize,
        variant: ProtocolVariant,
    ) -> usize {
        match variant {
            ProtocolVariant::Legacy => GQUIC_STREAM_FRAME_MAX_HEADER,
            ProtocolVariant::Modern => {
                let offset_len = if offset == 0 { 0 } else { varint_size(offset) };
                1 + varint_size(stream_id.value()) + offset_len + varint_size(max_bytes as u64)
            }
        }
    }

    /// How many payload bytes fit in `max_bytes`, including the header
    pub fn max_data_len(
        stream_id: StreamId,
        offset: StreamOffset,
        max_bytes: usize,
        variant: ProtocolVariant,
    ) -> usize {
        max_bytes.saturating_sub(Self::header_len(stream_id, offset, max_bytes, variant))
    }
}

/// RESET_STREAM Frame (RFC 9000 Section 19.4), RST_STREAM in gQUIC
///
/// Abruptly terminates sending on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetStreamFrame {
    pub stream_id: StreamId,

    /// Application-defined error code
    pub error_code: ApplicationErrorCode,

    /// Final size of the stream in bytes
    pub final_size: StreamOffset,
}

/// STOP_SENDING Frame (RFC 9000 Section 19.5)
///
/// Requests peer to stop sending on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSendingFrame {
    pub stream_id: StreamId,

    /// Application-defined error code
    pub error_code: ApplicationErrorCode,
}

/// MAX_STREAM_DATA Frame (RFC 9000 Section 19.10), WINDOW_UPDATE in gQUIC
///
/// Raises the amount of data the peer may send on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxStreamDataFrame {
    pub stream_id: StreamId,

    /// New absolute limit
    pub maximum_stream_data: StreamOffset,
}

/// STREAM_DATA_BLOCKED Frame (RFC 9000 Section 19.13), BLOCKED in gQUIC
///
/// Tells the peer we have data to send but no credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDataBlockedFrame {
    pub stream_id: StreamId,

    /// Limit at which we became blocked
    pub maximum_stream_data: StreamOffset,
}

/// Control frames a stream hands to its connection for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    ResetStream(ResetStreamFrame),
    StopSending(StopSendingFrame),
    MaxStreamData(MaxStreamDataFrame),
    StreamDataBlocked(StreamDataBlockedFrame),
}

impl Frame {
    /// Stream the frame refers to
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::ResetStream(f) => f.stream_id,
            Frame::StopSending(f) => f.stream_id,
            Frame::MaxStreamData(f) => f.stream_id,
            Frame::StreamDataBlocked(f) => f.stream_id,
        }
    }
}
