//! # Sending Part of a Stream (RFC 9000 Section 3.1)
//!
//! ```text
//!  write() ──► pending data ──► pop_stream_frame() ──► STREAM frames
//!                                    │
//!                    flow-control credit from MAX_STREAM_DATA
//! ```
//!
//! A writer blocks until the connection has packetized everything it handed
//! over, or until the stream is canceled, shut down, or its deadline passes.
//! The connection learns that there is something to send through `on_data`.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use super::{OnData, QueueControlFrame};
use crate::error::{Error, Result};
use crate::flow_control::StreamFlowController;
use crate::frames::{
    Frame, MaxStreamDataFrame, ResetStreamFrame, StopSendingFrame, StreamDataBlockedFrame,
    StreamFrame,
};
use crate::types::{ApplicationErrorCode, StreamId, StreamOffset};
use crate::version::ProtocolVariant;

#[derive(Debug, Default)]
struct SendState {
    write_offset: StreamOffset,

    /// Data handed over by the blocked writer, not yet packetized
    pending: Option<Bytes>,

    /// close() was called; FIN goes out after pending data
    finished_writing: bool,
    fin_sent: bool,

    /// Set once the write side was reset, locally or on peer request
    cancel_err: Option<Error>,

    /// Code of the first STOP_SENDING seen, synthesized or received
    stop_sending_code: Option<ApplicationErrorCode>,

    shutdown_err: Option<Error>,
    deadline: Option<Instant>,
}

impl SendState {
    fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Bytes::len)
    }

    /// Error that ends a write in progress, if any
    fn write_error(&self) -> Option<Error> {
        if let Some(err) = &self.shutdown_err {
            return Some(err.clone());
        }
        if let Some(err) = &self.cancel_err {
            return Some(err.clone());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::Deadline),
            _ => None,
        }
    }
}

/// Send half of a stream
pub struct SendStream {
    stream_id: StreamId,
    variant: ProtocolVariant,
    on_data: OnData,
    queue_control_frame: QueueControlFrame,
    flow_controller: Arc<dyn StreamFlowController>,
    state: Mutex<SendState>,
    write_cond: Condvar,
}

impl SendStream {
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
            state: Mutex::new(SendState::default()),
            write_cond: Condvar::new(),
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Write `buf` to the stream, blocking until it was packetized
    ///
    /// Returns the number of bytes taken. If a cancel or the deadline
    /// interrupts the write after some bytes went out, that count is returned
    /// and the next call reports the error. A shutdown always returns its
    /// error.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.finished_writing {
            return Err(Error::WriteOnClosed(self.stream_id));
        }
        if let Some(err) = state.write_error() {
            return Err(err);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        state.pending = Some(Bytes::copy_from_slice(buf));
        drop(state);
        (self.on_data)();

        let mut state = self.state.lock();
        loop {
            let remaining = state.pending_len();
            if remaining == 0 {
                state.pending = None;
                return Ok(buf.len());
            }
            if let Some(err) = state.write_error() {
                state.pending = None;
                let written = buf.len() - remaining;
                trace!(stream_id = %self.stream_id, written, error = %err, "write interrupted");
                if written == 0 || state.shutdown_err.is_some() {
                    return Err(err);
                }
                return Ok(written);
            }
            match state.deadline {
                Some(deadline) => {
                    self.write_cond.wait_until(&mut state, deadline);
                }
                None => self.write_cond.wait(&mut state),
            }
        }
    }

    /// Request a graceful close: FIN follows the pending data
    ///
    /// Closing twice is a no-op. Fails if the write side was canceled.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.cancel_err.is_some() {
            return Err(Error::CloseCanceled(self.stream_id));
        }
        if state.finished_writing {
            return Ok(());
        }
        state.finished_writing = true;
        drop(state);

        debug!(stream_id = %self.stream_id, "closing send side");
        (self.on_data)();
        Ok(())
    }

    /// Abandon sending and reset the stream with `error_code`
    pub fn cancel_write(&self, error_code: ApplicationErrorCode) {
        let err = Error::canceled(
            error_code,
            format!(
                "write on stream {} canceled with error code {}",
                self.stream_id, error_code
            ),
        );
        self.cancel_write_impl(error_code, err);
    }

    fn cancel_write_impl(&self, error_code: ApplicationErrorCode, write_err: Error) {
        let mut state = self.state.lock();
        // nothing left to abandon, or the peer must not hear from us any more
        if state.shutdown_err.is_some() || state.cancel_err.is_some() || state.fin_sent {
            return;
        }
        state.cancel_err = Some(write_err);
        let final_size = state.write_offset;
        self.write_cond.notify_all();
        drop(state);

        debug!(stream_id = %self.stream_id, error_code, final_size, "resetting stream");
        (self.queue_control_frame)(Frame::ResetStream(ResetStreamFrame {
            stream_id: self.stream_id,
            error_code,
            final_size,
        }));
        (self.on_data)();
    }

    /// The peer asked us to stop sending
    pub fn handle_stop_sending_frame(&self, frame: &StopSendingFrame) {
        {
            let mut state = self.state.lock();
            if state.stop_sending_code.is_none() {
                state.stop_sending_code = Some(frame.error_code);
            }
        }
        let write_err = Error::canceled(
            frame.error_code,
            format!(
                "stream {} was reset with error code {}",
                self.stream_id, frame.error_code
            ),
        );
        self.cancel_write_impl(self.variant.stopping_error_code(), write_err);
    }

    /// Apply new send credit from the peer
    pub fn handle_max_stream_data_frame(&self, frame: &MaxStreamDataFrame) {
        if !self.flow_controller.update_send_window(frame.maximum_stream_data) {
            return;
        }
        let has_pending = self.state.lock().pending_len() > 0;
        if has_pending {
            (self.on_data)();
        }
    }

    /// Packetize up to `max_bytes` (frame header included)
    ///
    /// Returns `None` when there is nothing to send or no credit.
    pub fn pop_stream_frame(&self, max_bytes: usize) -> Option<StreamFrame> {
        let mut state = self.state.lock();
        if state.shutdown_err.is_some() || state.cancel_err.is_some() || state.fin_sent {
            return None;
        }
        let max_data_len =
            StreamFrame::max_data_len(self.stream_id, state.write_offset, max_bytes, self.variant);
        if max_data_len == 0 {
            return None;
        }

        let credit = self.flow_controller.send_window_size();
        let take = max_data_len.min(credit as usize).min(state.pending_len());
        let data = match state.pending.as_mut() {
            Some(pending) if take > 0 => pending.split_to(take),
            _ => Bytes::new(),
        };
        let drained = state.pending_len() == 0;
        let fin = state.finished_writing && drained;

        let frame = if data.is_empty() && !fin {
            None
        } else {
            let frame = StreamFrame {
                stream_id: self.stream_id,
                offset: state.write_offset,
                data,
                fin,
            };
            self.flow_controller.add_bytes_sent(frame.data_len());
            state.write_offset += frame.data_len();
            if fin {
                state.fin_sent = true;
                trace!(stream_id = %self.stream_id, final_size = state.write_offset, "FIN sent");
            }
            Some(frame)
        };

        let blocked_at = if drained {
            None
        } else {
            self.flow_controller.is_newly_blocked()
        };
        if drained && frame.is_some() {
            self.write_cond.notify_all();
        }
        drop(state);

        if let Some(limit) = blocked_at {
            trace!(stream_id = %self.stream_id, limit, "stream flow control blocked");
            (self.queue_control_frame)(Frame::StreamDataBlocked(StreamDataBlockedFrame {
                stream_id: self.stream_id,
                maximum_stream_data: limit,
            }));
        }
        frame
    }

    /// Terminate without telling the peer; blocked writers get `err`
    pub fn close_for_shutdown(&self, err: Error) {
        let mut state = self.state.lock();
        if state.shutdown_err.is_some() {
            return;
        }
        debug!(stream_id = %self.stream_id, error = %err, "send side closed for shutdown");
        state.shutdown_err = Some(err);
        self.write_cond.notify_all();
    }

    /// Set or clear the write deadline; never fails
    pub fn set_write_deadline(&self, deadline: Option<Instant>) -> Result<()> {
        self.state.lock().deadline = deadline;
        self.write_cond.notify_all();
        Ok(())
    }

    /// FIN sent, reset, or shut down
    pub fn finished(&self) -> bool {
        let state = self.state.lock();
        state.shutdown_err.is_some() || state.fin_sent || state.cancel_err.is_some()
    }

    /// Bytes handed to the connection so far
    pub fn write_offset(&self) -> StreamOffset {
        self.state.lock().write_offset
    }

    /// Error code of the peer's stop-sending request, if one arrived
    pub fn stop_sending_code(&self) -> Option<ApplicationErrorCode> {
        self.state.lock().stop_sending_code
    }

    /// Whether pop_stream_frame would have something to packetize, credit permitting
    pub fn has_pending_data(&self) -> bool {
        let state = self.state.lock();
        if state.shutdown_err.is_some() || state.cancel_err.is_some() {
            return false;
        }
        state.pending_len() > 0 || (state.finished_writing && !state.fin_sent)
    }

    pub fn is_flow_control_blocked(&self) -> (bool, StreamOffset) {
        self.flow_controller.is_blocked()
    }
}
