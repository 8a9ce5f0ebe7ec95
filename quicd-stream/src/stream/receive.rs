//! # Receiving Part of a Stream (RFC 9000 Section 3.2)
//!
//! Incoming STREAM frames are checked against flow control, reassembled in
//! order, and handed to a reader blocked in `read`. Reading returns credit to
//! the peer through MAX_STREAM_DATA.
//!
//! Terminal conditions, checked in this order on every read:
//! 1. closed for shutdown (local, silent)
//! 2. read canceled locally
//! 3. reset by the peer
//!
//! After the last byte before FIN has been read, `read` returns `Ok(0)`.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::buffer::ReassemblyBuffer;
use super::{OnData, QueueControlFrame};
use crate::error::{Error, Result, TransportError};
use crate::flow_control::StreamFlowController;
use crate::frames::{Frame, MaxStreamDataFrame, ResetStreamFrame, StopSendingFrame, StreamFrame};
use crate::types::{ApplicationErrorCode, StreamId, StreamOffset, VARINT_MAX};
use crate::version::{ProtocolVariant, ERROR_CODE_STOPPING};

#[derive(Debug, Default)]
struct ReceiveState {
    buffer: ReassemblyBuffer,
    final_offset: Option<StreamOffset>,
    fin_read: bool,

    cancel_read_err: Option<Error>,
    reset_remotely_err: Option<Error>,
    shutdown_err: Option<Error>,

    /// Final offset of our own send side, known once it was closed
    send_final_offset: Option<StreamOffset>,

    /// gQUIC announces a canceled read with RST_STREAM, at most once
    legacy_reset_sent: bool,

    deadline: Option<Instant>,
}

impl ReceiveState {
    fn terminal_error(&self) -> Option<Error> {
        self.shutdown_err
            .as_ref()
            .or(self.cancel_read_err.as_ref())
            .or(self.reset_remotely_err.as_ref())
            .cloned()
    }

    fn is_terminated(&self) -> bool {
        self.shutdown_err.is_some()
            || self.cancel_read_err.is_some()
            || self.reset_remotely_err.is_some()
    }

    fn at_eof(&self) -> bool {
        self.final_offset == Some(self.buffer.read_offset())
    }
}

/// Receive half of a stream
pub struct ReceiveStream {
    stream_id: StreamId,
    variant: ProtocolVariant,
    on_data: OnData,
    queue_control_frame: QueueControlFrame,
    flow_controller: Arc<dyn StreamFlowController>,
    state: Mutex<ReceiveState>,
    read_cond: Condvar,
}

impl ReceiveStream {
    pub fn new(
        stream_id: StreamId,
        on_data: OnData,
        queue_control_frame: QueueControlFrame,
        flow_controller: Arc<dyn StreamFlowController>,
        variant: ProtocolVariant,
    ) -> Self {
        Self {
            stream_id,
            variant,
            on_data,
            queue_control_frame,
            flow_controller,
            state: Mutex::new(ReceiveState::default()),
            read_cond: Condvar::new(),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Read into `buf`, blocking until at least one byte is available
    ///
    /// Returns `Ok(0)` at end of stream or for an empty `buf`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.fin_read {
            return Ok(0);
        }
        if let Some(err) = state.terminal_error() {
            return Err(err);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut read = 0;
        loop {
            if let Some(err) = state.terminal_error() {
                return Err(err);
            }
            if matches!(state.deadline, Some(deadline) if Instant::now() >= deadline) {
                return Err(Error::Deadline);
            }
            while read < buf.len() {
                match state.buffer.pop(buf.len() - read) {
                    Some(chunk) => {
                        buf[read..read + chunk.len()].copy_from_slice(&chunk);
                        read += chunk.len();
                    }
                    None => break,
                }
            }
            if read > 0 {
                break;
            }
            if state.at_eof() {
                state.fin_read = true;
                trace!(stream_id = %self.stream_id, "read reached end of stream");
                return Ok(0);
            }
            match state.deadline {
                Some(deadline) => {
                    self.read_cond.wait_until(&mut state, deadline);
                }
                None => self.read_cond.wait(&mut state),
            }
        }

        if state.at_eof() {
            state.fin_read = true;
        }
        drop(state);

        self.flow_controller.add_bytes_read(read as u64);
        if let Some(maximum_stream_data) = self.flow_controller.window_update() {
            trace!(stream_id = %self.stream_id, maximum_stream_data, "queueing window update");
            (self.queue_control_frame)(Frame::MaxStreamData(MaxStreamDataFrame {
                stream_id: self.stream_id,
                maximum_stream_data,
            }));
        }
        Ok(read)
    }

    /// Accept a STREAM frame from the peer
    ///
    /// # Errors
    /// Flow control and final size violations; the connection must be closed.
    pub fn handle_stream_frame(&self, frame: StreamFrame) -> Result<()> {
        // RFC 9000 §19.8: offset + length may not exceed 2^62 - 1
        let end_offset = frame
            .offset
            .checked_add(frame.data_len())
            .filter(|&end| end <= VARINT_MAX)
            .ok_or(TransportError::FlowControlError)?;

        let mut state = self.state.lock();
        self.flow_controller
            .update_highest_received(end_offset, frame.fin)?;

        if frame.fin {
            state.final_offset = Some(end_offset);
        }
        // data nobody will read
        if state.is_terminated() {
            return Ok(());
        }
        state.buffer.insert(frame.offset, frame.data);
        self.read_cond.notify_all();
        drop(state);

        (self.on_data)();
        Ok(())
    }

    /// Accept a RESET_STREAM frame from the peer
    ///
    /// Returns whether this reset was newly accepted. Duplicates and resets
    /// arriving after shutdown are ignored.
    ///
    /// # Errors
    /// Final size violations; the connection must be closed.
    pub fn handle_rst_stream_frame(&self, frame: &ResetStreamFrame) -> Result<bool> {
        let mut state = self.state.lock();
        if state.shutdown_err.is_some() {
            return Ok(false);
        }
        self.flow_controller
            .update_highest_received(frame.final_size, true)?;
        state.final_offset = Some(frame.final_size);

        if state.reset_remotely_err.is_some() {
            return Ok(false);
        }
        state.reset_remotely_err = Some(Error::canceled(
            frame.error_code,
            format!(
                "stream {} was reset with error code {}",
                self.stream_id, frame.error_code
            ),
        ));
        state.buffer.clear();
        self.read_cond.notify_all();
        drop(state);

        self.flow_controller.abandon();
        debug!(
            stream_id = %self.stream_id,
            error_code = frame.error_code,
            final_size = frame.final_size,
            "stream reset by peer"
        );
        Ok(true)
    }

    /// Stop reading and ask the peer to stop sending
    ///
    /// Under the legacy format the request travels as a RST_STREAM that
    /// can only go out once the local final offset is known.
    pub fn cancel_read(&self, error_code: ApplicationErrorCode) {
        let mut state = self.state.lock();
        if state.fin_read || state.is_terminated() {
            return;
        }
        state.cancel_read_err = Some(Error::canceled(
            error_code,
            format!(
                "read on stream {} canceled with error code {}",
                self.stream_id, error_code
            ),
        ));
        state.buffer.clear();
        self.read_cond.notify_all();

        let frame = match self.variant {
            ProtocolVariant::Modern => Some(Frame::StopSending(StopSendingFrame {
                stream_id: self.stream_id,
                error_code,
            })),
            ProtocolVariant::Legacy => self.legacy_reset(&mut state),
        };
        drop(state);

        self.flow_controller.abandon();
        debug!(stream_id = %self.stream_id, error_code, "read canceled");
        if let Some(frame) = frame {
            (self.queue_control_frame)(frame);
        }
    }

    /// The send side was closed at `final_offset`
    pub fn on_close(&self, final_offset: StreamOffset) {
        let mut state = self.state.lock();
        state.send_final_offset = Some(final_offset);
        let frame = if state.cancel_read_err.is_some() && state.shutdown_err.is_none() {
            self.legacy_reset(&mut state)
        } else {
            None
        };
        drop(state);

        if let Some(frame) = frame {
            (self.queue_control_frame)(frame);
        }
    }

    fn legacy_reset(&self, state: &mut ReceiveState) -> Option<Frame> {
        if self.variant != ProtocolVariant::Legacy || state.legacy_reset_sent {
            return None;
        }
        let final_size = state.send_final_offset?;
        state.legacy_reset_sent = true;
        Some(Frame::ResetStream(ResetStreamFrame {
            stream_id: self.stream_id,
            error_code: ERROR_CODE_STOPPING,
            final_size,
        }))
    }

    /// Terminate without telling the peer; blocked readers get `err`
    pub fn close_for_shutdown(&self, err: Error) {
        let mut state = self.state.lock();
        if state.shutdown_err.is_some() {
            return;
        }
        debug!(stream_id = %self.stream_id, error = %err, "receive side closed for shutdown");
        state.shutdown_err = Some(err);
        self.read_cond.notify_all();
    }

    /// Set or clear the read deadline; never fails
    pub fn set_read_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.state.lock().deadline = deadline;
        self.read_cond.notify_all();
        Ok(())
    }

    /// All data read, reset by the peer, shut down, or read canceled with
    /// the final size known
    pub fn finished(&self) -> bool {
        let state = self.state.lock();
        state.shutdown_err.is_some()
            || state.fin_read
            || state.reset_remotely_err.is_some()
            || (state.cancel_read_err.is_some() && state.final_offset.is_some())
    }

    /// Error code of the peer's reset, if one was accepted
    pub fn reset_error_code(&self) -> Option<ApplicationErrorCode> {
        self.state
            .lock()
            .reset_remotely_err
            .as_ref()
            .and_then(Error::error_code)
    }

    /// Window update to advertise, if one is due
    pub fn window_update(&self) -> Option<StreamOffset> {
        self.flow_controller.window_update()
    }
}
