//! # Stream State Machines (RFC 9000 Sections 2, 3)
//!
//! A bidirectional stream is two independent half-streams sharing an ID and
//! a flow controller:
//! - **Send half**: Ready → Send → Data Sent, or Reset Sent
//! - **Receive half**: Recv → Size Known → Data Read, or Reset Recvd
//!
//! The connection owns the streams, feeds them frames, pulls STREAM frames
//! out of them, and collects the control frames they queue through the
//! callback it supplied at construction.

use std::sync::Arc;

use crate::frames::Frame;

pub mod bidi;
pub mod buffer;
pub mod receive;
pub mod send;

#[cfg(test)]
mod tests;

pub use bidi::{BidirectionalStream, StreamController};
pub use buffer::ReassemblyBuffer;
pub use receive::ReceiveStream;
pub use send::SendStream;

/// Called when a stream has data to read or to send
pub type OnData = Arc<dyn Fn() + Send + Sync>;

/// Enqueues a control frame for transmission
pub type QueueControlFrame = Arc<dyn Fn(Frame) + Send + Sync>;
