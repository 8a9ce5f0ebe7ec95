//! quicd-stream: Bidirectional QUIC Streams
//!
//! A bidirectional stream is a send half and a receive half sharing one
//! stream ID, one flow controller and the connection's callbacks. This crate
//! provides both halves and the object composing them.
//!
//! # Architecture
//!
//! - **Blocking API**: `read` and `write` park the calling thread on a
//!   condition variable until data, credit, a deadline or a terminal error
//! - **Connection-driven**: the connection feeds frames in, pulls STREAM
//!   frames out, and collects control frames through a callback
//! - **Two wire formats**: gQUIC has no STOP_SENDING frame, so a received
//!   RST_STREAM also stops the send direction
//!
//! # RFC Compliance
//!
//! - **RFC 9000 Section 2, 3**: stream IDs and send/receive state machines
//! - **RFC 9000 Section 4**: stream-level flow control and final size
//! - **RFC 9000 Section 19**: RESET_STREAM, STOP_SENDING, MAX_STREAM_DATA
//!
//! # Module Organization
//!
//! - `stream`: send half, receive half, reassembly, bidirectional stream
//! - `flow_control`: per-stream send and receive windows
//! - `frames`: the stream-related frame types
//! - `version`: protocol versions and their wire variant
//! - `config`: tunables loaded from TOML and the environment
//! - `error`: transport and stream errors

pub mod config;
pub mod error;
pub mod flow_control;
pub mod frames;
pub mod stream;
pub mod types;
pub mod version;

// Re-export key types
pub use config::{ConfigValidator, StreamConfig};
pub use error::{Error, Result, TransportError};
pub use flow_control::{StreamFlowController, WindowFlowController};
pub use frames::{
    Frame, MaxStreamDataFrame, ResetStreamFrame, StopSendingFrame, StreamDataBlockedFrame,
    StreamFrame,
};
pub use stream::{
    BidirectionalStream, OnData, QueueControlFrame, ReceiveStream, SendStream, StreamController,
};
pub use types::{ApplicationErrorCode, StreamDirection, StreamId, StreamInitiator, StreamOffset};
pub use version::{ProtocolVariant, Version};
