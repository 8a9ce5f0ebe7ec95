//! # Stream Flow Control (RFC 9000 Section 4)
//!
//! QUIC limits how far ahead a sender may run on each stream:
//! - **Send credit**: the peer's MAX_STREAM_DATA limit minus what we sent
//! - **Receive window**: the limit we advertised minus what the reader consumed
//!
//! One controller serves both halves of a bidirectional stream. The send path
//! (writer and packet scheduler) and the receive path (frame dispatch and
//! reader) call into it concurrently, so every method takes `&self` and the
//! state lives behind a single lock.
//!
//! ## RFC 9000 Section 4.5:
//! Once the final size is known it cannot change; data beyond it and a
//! conflicting final size are both FINAL_SIZE_ERROR.

#![forbid(unsafe_code)]

use parking_lot::Mutex;
use tracing::trace;

use crate::config::StreamConfig;
use crate::error::{Result, TransportError};
use crate::types::{ByteCount, StreamId, StreamOffset};

/// Stream Flow Controller
///
/// Credit accounting shared by the send and receive halves of a stream.
pub trait StreamFlowController: Send + Sync {
    /// Bytes we may send right now
    fn send_window_size(&self) -> ByteCount;

    /// Consume send credit
    fn add_bytes_sent(&self, n: ByteCount);

    /// Apply a MAX_STREAM_DATA limit from the peer
    ///
    /// Returns whether the limit grew. Limits never shrink.
    fn update_send_window(&self, offset: StreamOffset) -> bool;

    /// Limit at which the sender became blocked, reported once per limit
    fn is_newly_blocked(&self) -> Option<StreamOffset>;

    /// Whether the sender is blocked, and at which limit
    fn is_blocked(&self) -> (bool, StreamOffset);

    /// Record the highest offset seen in a STREAM or RESET_STREAM frame
    ///
    /// # Errors
    /// - `FlowControlError` if `offset` exceeds the advertised window
    /// - `FinalSizeError` if `offset` conflicts with a known final size
    fn update_highest_received(&self, offset: StreamOffset, is_final: bool) -> Result<()>;

    /// Credit bytes consumed by the reader
    fn add_bytes_read(&self, n: ByteCount);

    /// New limit to advertise in MAX_STREAM_DATA, if an update is due
    fn window_update(&self) -> Option<StreamOffset>;

    /// Treat everything received so far as read
    ///
    /// Called once the reader will never consume the remaining data.
    fn abandon(&self);
}

#[derive(Debug)]
struct WindowState {
    // send side
    send_window: StreamOffset,
    bytes_sent: ByteCount,
    last_blocked_at: Option<StreamOffset>,

    // receive side
    receive_window: StreamOffset,
    receive_window_size: ByteCount,
    max_receive_window_size: ByteCount,
    highest_received: StreamOffset,
    bytes_read: ByteCount,
    final_offset: Option<StreamOffset>,
}

/// Window-based flow controller for a single stream
///
/// The receive window doubles each time an update is issued, up to
/// `max_receive_window`.
#[derive(Debug)]
pub struct WindowFlowController {
    stream_id: StreamId,
    update_threshold: f64,
    state: Mutex<WindowState>,
}

impl WindowFlowController {
    /// Create new stream flow controller
    pub fn new(
        stream_id: StreamId,
        initial_send_window: ByteCount,
        initial_receive_window: ByteCount,
        max_receive_window: ByteCount,
        update_threshold: f64,
    ) -> Self {
        Self {
            stream_id,
            update_threshold,
            state: Mutex::new(WindowState {
                send_window: initial_send_window,
                bytes_sent: 0,
                last_blocked_at: None,
                receive_window: initial_receive_window,
                receive_window_size: initial_receive_window,
                max_receive_window_size: max_receive_window.max(initial_receive_window),
                highest_received: 0,
                bytes_read: 0,
                final_offset: None,
            }),
        }
    }

    /// Build a controller from stream configuration
    pub fn from_config(stream_id: StreamId, config: &StreamConfig) -> Self {
        Self::new(
            stream_id,
            config.initial_send_window,
            config.initial_receive_window,
            config.max_receive_window,
            config.window_update_threshold,
        )
    }

    /// Bytes received but not yet read
    pub fn buffered_bytes(&self) -> ByteCount {
        let state = self.state.lock();
        state.highest_received.saturating_sub(state.bytes_read)
    }
}

impl StreamFlowController for WindowFlowController {
    fn send_window_size(&self) -> ByteCount {
        let state = self.state.lock();
        state.send_window.saturating_sub(state.bytes_sent)
    }

    fn add_bytes_sent(&self, n: ByteCount) {
        self.state.lock().bytes_sent += n;
    }

    fn update_send_window(&self, offset: StreamOffset) -> bool {
        let mut state = self.state.lock();
        if offset > state.send_window {
            state.send_window = offset;
            true
        } else {
            false
        }
    }

    fn is_newly_blocked(&self) -> Option<StreamOffset> {
        let mut state = self.state.lock();
        if state.bytes_sent < state.send_window {
            return None;
        }
        if state.last_blocked_at == Some(state.send_window) {
            return None;
        }
        state.last_blocked_at = Some(state.send_window);
        Some(state.send_window)
    }

    fn is_blocked(&self) -> (bool, StreamOffset) {
        let state = self.state.lock();
        (state.bytes_sent >= state.send_window, state.send_window)
    }

    fn update_highest_received(&self, offset: StreamOffset, is_final: bool) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(final_offset) = state.final_offset {
            if (is_final && offset != final_offset) || offset > final_offset {
                return Err(TransportError::FinalSizeError.into());
            }
        }
        if is_final {
            if offset < state.highest_received {
                return Err(TransportError::FinalSizeError.into());
            }
            state.final_offset = Some(offset);
        }
        if offset > state.receive_window {
            trace!(
                stream_id = %self.stream_id,
                offset,
                window = state.receive_window,
                "peer exceeded stream receive window"
            );
            return Err(TransportError::FlowControlError.into());
        }
        if offset > state.highest_received {
            state.highest_received = offset;
        }
        Ok(())
    }

    fn add_bytes_read(&self, n: ByteCount) {
        self.state.lock().bytes_read += n;
    }

    fn window_update(&self) -> Option<StreamOffset> {
        let mut state = self.state.lock();

        // no more data is coming
        if state.final_offset.is_some() {
            return None;
        }

        let remaining = state.receive_window.saturating_sub(state.bytes_read);
        let threshold = (state.receive_window_size as f64 * (1.0 - self.update_threshold)) as u64;
        if remaining > threshold {
            return None;
        }

        state.receive_window_size =
            (state.receive_window_size * 2).min(state.max_receive_window_size);
        state.receive_window = state.bytes_read + state.receive_window_size;
        trace!(
            stream_id = %self.stream_id,
            window = state.receive_window,
            window_size = state.receive_window_size,
            "increasing stream receive window"
        );
        Some(state.receive_window)
    }

    fn abandon(&self) {
        let mut state = self.state.lock();
        let end = state.final_offset.unwrap_or(state.highest_received);
        state.bytes_read = state.bytes_read.max(end);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
