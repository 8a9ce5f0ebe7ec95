//! # Bidirectional Stream
//!
//! Composes a [`SendStream`] and a [`ReceiveStream`] into the single object
//! handed to applications and to the connection.
//!
//! ## Lifecycle
//!
//! ```text
//!   new() ──► open ──┬── close()              FIN after pending data
//!                    ├── cancel_write/read()  RESET_STREAM / STOP_SENDING
//!                    ├── peer RESET_STREAM    legacy: implies STOP_SENDING
//!                    └── close_for_shutdown() silent, connection teardown
//!
//!   finished() once both halves reached a terminal state
//! ```
//!
//! `read` and `write` may run concurrently with each other and with the
//! connection's frame handlers. Concurrent reads (or concurrent writes) must
//! be serialized by the caller.

#![forbid(unsafe_code)]

use std::io;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use super::{OnData, QueueControlFrame, ReceiveStream, SendStream};
use crate::error::{Error, Result};
use crate::flow_control::StreamFlowController;
use crate::frames::{MaxStreamDataFrame, ResetStreamFrame, StopSendingFrame, StreamFrame};
use crate::types::{ApplicationErrorCode, StreamId, StreamOffset};
use crate::version::{ProtocolVariant, Version};

/// Stream Controller Trait
///
/// The connection-facing side of a stream: frame dispatch, packetization,
/// flow control and reclamation.
pub trait StreamController: Send + Sync {
    /// Get the stream ID
    fn stream_id(&self) -> StreamId;

    /// Process a received STREAM frame
    fn handle_stream_frame(&self, frame: StreamFrame) -> Result<()>;

    /// Process a received RESET_STREAM frame
    fn handle_rst_stream_frame(&self, frame: &ResetStreamFrame) -> Result<()>;

    /// Process a received STOP_SENDING frame
    fn handle_stop_sending_frame(&self, frame: &StopSendingFrame);

    /// Process a received MAX_STREAM_DATA frame
    fn handle_max_stream_data_frame(&self, frame: &MaxStreamDataFrame);

    /// Next STREAM frame to transmit, at most `max_bytes` on the wire
    fn pop_stream_frame(&self, max_bytes: usize) -> Option<StreamFrame>;

    /// Receive window update to advertise, if due
    fn window_update(&self) -> Option<StreamOffset>;

    /// Whether sending is blocked by stream flow control, and at which limit
    fn is_flow_control_blocked(&self) -> (bool, StreamOffset);

    /// Both directions reached a terminal state
    fn finished(&self) -> bool;

    /// Terminate both directions without notifying the peer
    fn close_for_shutdown(&self, err: Error);
}

/// A bidirectional QUIC stream
pub struct BidirectionalStream {
    send: SendStream,
    receive: ReceiveStream,
    version: Version,
    variant: ProtocolVariant,
}

impl BidirectionalStream {
    /// Create a stream whose halves share `stream_id`, callbacks and flow controller
    pub fn new(
        stream_id: StreamId,
        on_data: OnData,
        queue_control_frame: QueueControlFrame,
        flow_controller: Arc<dyn StreamFlowController>,
        version: Version,
    ) -> Self {
        let variant = version.variant();
        Self {
            send: SendStream::new(
                stream_id,
                on_data.clone(),
                queue_control_frame.clone(),
                flow_controller.clone(),
                variant,
            ),
            receive: ReceiveStream::new(
                stream_id,
                on_data,
                queue_control_frame,
                flow_controller,
                variant,
            ),
            version,
            variant,
        }
    }

    /// The stream ID, identical for both halves
    pub fn stream_id(&self) -> StreamId {
        self.send.stream_id()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.receive.read(buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.send.write(buf)
    }

    /// Gracefully close the send direction
    ///
    /// The stream can still be read until the peer finishes.
    pub fn close(&self) -> Result<()> {
        self.send.close()?;
        // a legacy read cancel is announced with a RST_STREAM at our final offset
        self.receive.on_close(self.send.write_offset());
        Ok(())
    }

    /// Apply `deadline` to both directions; `None` clears it
    pub fn set_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        let _ = self.receive.set_read_deadline(deadline);
        let _ = self.send.set_write_deadline(deadline);
        Ok(())
    }

    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.receive.set_read_deadline(deadline)
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.send.set_write_deadline(deadline)
    }

    pub fn cancel_read(&self, error_code: ApplicationErrorCode) {
        self.receive.cancel_read(error_code)
    }

    pub fn cancel_write(&self, error_code: ApplicationErrorCode) {
        self.send.cancel_write(error_code)
    }

    /// Terminate abruptly: no FIN, no RESET_STREAM
    ///
    /// Blocked reads and writes return `err`. Later calls have no effect.
    pub fn close_for_shutdown(&self, err: Error) {
        self.send.close_for_shutdown(err.clone());
        self.receive.close_for_shutdown(err);
    }

    /// Deliver a peer reset to the receive half
    ///
    /// The legacy format has no STOP_SENDING: a reset also asks us to stop
    /// sending, so the request is synthesized here with the reset's code.
    pub fn handle_rst_stream_frame(&self, frame: &ResetStreamFrame) -> Result<()> {
        if !self.receive.handle_rst_stream_frame(frame)? {
            return Ok(());
        }
        if !self.variant.has_stop_sending_frame() {
            debug!(
                stream_id = %self.stream_id(),
                error_code = frame.error_code,
                "treating RST_STREAM as STOP_SENDING"
            );
            self.send.handle_stop_sending_frame(&StopSendingFrame {
                stream_id: self.stream_id(),
                error_code: frame.error_code,
            });
        }
        Ok(())
    }

    pub fn handle_stream_frame(&self, frame: StreamFrame) -> Result<()> {
        self.receive.handle_stream_frame(frame)
    }

    pub fn handle_stop_sending_frame(&self, frame: &StopSendingFrame) {
        self.send.handle_stop_sending_frame(frame)
    }

    pub fn handle_max_stream_data_frame(&self, frame: &MaxStreamDataFrame) {
        self.send.handle_max_stream_data_frame(frame)
    }

    pub fn pop_stream_frame(&self, max_bytes: usize) -> Option<StreamFrame> {
        self.send.pop_stream_frame(max_bytes)
    }

    pub fn has_pending_data(&self) -> bool {
        self.send.has_pending_data()
    }

    pub fn window_update(&self) -> Option<StreamOffset> {
        self.receive.window_update()
    }

    pub fn is_flow_control_blocked(&self) -> (bool, StreamOffset) {
        self.send.is_flow_control_blocked()
    }

    /// Both halves finished; the connection may reclaim the stream
    pub fn finished(&self) -> bool {
        self.send.finished() && self.receive.finished()
    }

    /// Code of the stop-sending request the send half received, if any
    ///
    /// Under the legacy format this is also set by a peer RST_STREAM.
    pub fn stop_sending_code(&self) -> Option<ApplicationErrorCode> {
        self.send.stop_sending_code()
    }

    /// Code of the peer's RST_STREAM, if the receive half accepted one
    pub fn reset_error_code(&self) -> Option<ApplicationErrorCode> {
        self.receive.reset_error_code()
    }
}

impl StreamController for BidirectionalStream {
    fn stream_id(&self) -> StreamId {
        BidirectionalStream::stream_id(self)
    }

    fn handle_stream_frame(&self, frame: StreamFrame) -> Result<()> {
        BidirectionalStream::handle_stream_frame(self, frame)
    }

    fn handle_rst_stream_frame(&self, frame: &ResetStreamFrame) -> Result<()> {
        BidirectionalStream::handle_rst_stream_frame(self, frame)
    }

    fn handle_stop_sending_frame(&self, frame: &StopSendingFrame) {
        BidirectionalStream::handle_stop_sending_frame(self, frame)
    }

    fn handle_max_stream_data_frame(&self, frame: &MaxStreamDataFrame) {
        BidirectionalStream::handle_max_stream_data_frame(self, frame)
    }

    fn pop_stream_frame(&self, max_bytes: usize) -> Option<StreamFrame> {
        BidirectionalStream::pop_stream_frame(self, max_bytes)
    }

    fn window_update(&self) -> Option<StreamOffset> {
        BidirectionalStream::window_update(self)
    }

    fn is_flow_control_blocked(&self) -> (bool, StreamOffset) {
        BidirectionalStream::is_flow_control_blocked(self)
    }

    fn finished(&self) -> bool {
        BidirectionalStream::finished(self)
    }

    fn close_for_shutdown(&self, err: Error) {
        BidirectionalStream::close_for_shutdown(self, err)
    }
}

impl io::Read for &BidirectionalStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        BidirectionalStream::read(*self, buf).map_err(io::Error::from)
    }
}

impl io::Write for &BidirectionalStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BidirectionalStream::write(*self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for BidirectionalStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for BidirectionalStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
