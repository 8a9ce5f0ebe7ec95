//! # Bidirectional Stream Tests (RFC 9000 Sections 2, 3, 19.4, 19.5)
//!
//! Scenario tests for the composed stream.
//!
//! ## Test Coverage
//!
//! 1. **Identity** - one stream ID for both halves
//! 2. **Completion** - `finished()` as a conjunction of both halves
//! 3. **Graceful close** - FIN, idempotency, legacy read-cancel RST_STREAM
//! 4. **Reset translation** - RST_STREAM implies STOP_SENDING in gQUIC only
//! 5. **Shutdown** - silent, wakes blocked callers
//! 6. **Deadlines** - timeout errors for reads and writes

#![cfg(test)]

use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use super::{BidirectionalStream, StreamController};
use crate::error::{Error, TransportError};
use crate::flow_control::WindowFlowController;
use crate::frames::{Frame, ResetStreamFrame, StopSendingFrame, StreamFrame};
use crate::types::StreamId;
use crate::version::{Version, ERROR_CODE_STOPPING, ERROR_CODE_STOPPING_GQUIC};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    stream: Arc<BidirectionalStream>,
    frames: Arc<Mutex<Vec<Frame>>>,
    wakeups: Arc<AtomicUsize>,
}

impl Harness {
    fn new(id: u64, version: Version) -> Self {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let wakeups = Arc::new(AtomicUsize::new(0));
        let sink = frames.clone();
        let counter = wakeups.clone();
        let fc = Arc::new(WindowFlowController::new(
            StreamId::new(id),
            1 << 20,
            1 << 20,
            1 << 20,
            0.25,
        ));
        let stream = BidirectionalStream::new(
            StreamId::new(id),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(move |f| sink.lock().push(f)),
            fc,
            version,
        );
        Self {
            stream: Arc::new(stream),
            frames,
            wakeups,
        }
    }

    fn frames(&self) -> Vec<Frame> {
        self.frames.lock().clone()
    }

    /// Write from another thread while acting as the packet scheduler
    fn write_and_pop(&self, data: &'static [u8]) -> Vec<StreamFrame> {
        let writer = {
            let stream = self.stream.clone();
            thread::spawn(move || stream.write(data))
        };
        let mut popped = Vec::new();
        let mut total = 0;
        let deadline = Instant::now() + WAIT;
        while total < data.len() && Instant::now() < deadline {
            match self.stream.pop_stream_frame(1200) {
                Some(frame) => {
                    total += frame.data.len();
                    popped.push(frame);
                }
                None => thread::sleep(Duration::from_millis(1)),
            }
        }
        assert_eq!(writer.join().unwrap(), Ok(data.len()));
        popped
    }

    fn finish_receiving(&self) {
        self.stream
            .handle_stream_frame(StreamFrame {
                stream_id: self.stream.stream_id(),
                offset: 0,
                data: Bytes::new(),
                fin: true,
            })
            .unwrap();
        assert_eq!(self.stream.read(&mut [0u8; 8]), Ok(0));
    }

    fn reset(&self, error_code: u64, final_size: u64) -> crate::Result<()> {
        self.stream.handle_rst_stream_frame(&ResetStreamFrame {
            stream_id: self.stream.stream_id(),
            error_code,
            final_size,
        })
    }
}

// ============================================================================
// Identity
// ============================================================================

mod identity_tests {
    use super::*;

    #[test]
    fn test_stream_id_matches_construction() {
        for id in [0, 4, 5, 1 << 40] {
            let h = Harness::new(id, Version::V1);
            assert_eq!(h.stream.stream_id(), StreamId::new(id));
            assert_eq!(StreamController::stream_id(&*h.stream), StreamId::new(id));
        }
    }

    #[test]
    fn test_stream_id_constant_across_lifecycle() {
        let h = Harness::new(8, Version::GQUIC_43);
        h.stream.close().unwrap();
        h.stream.close_for_shutdown(Error::ConnectionClosed("bye".into()));
        assert_eq!(h.stream.stream_id(), StreamId::new(8));
        assert_eq!(h.stream.version(), Version::GQUIC_43);
    }

    /// Control frames queued by either half carry the shared ID
    #[test]
    fn test_control_frames_carry_stream_id() {
        let h = Harness::new(12, Version::V1);
        h.stream.cancel_read(1);
        h.stream.cancel_write(2);
        let frames = h.frames();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.stream_id() == StreamId::new(12)));
    }
}

// ============================================================================
// Completion
// ============================================================================

mod completion_tests {
    use super::*;

    #[test]
    fn test_finished_requires_both_halves() {
        let h = Harness::new(4, Version::V1);
        assert!(!h.stream.finished());

        h.stream.close().unwrap();
        assert!(h.stream.pop_stream_frame(1200).unwrap().fin);
        // send side done, receive side still open
        assert!(!h.stream.finished());

        h.finish_receiving();
        assert!(h.stream.finished());
    }

    #[test]
    fn test_finished_receive_first() {
        let h = Harness::new(4, Version::V1);
        h.finish_receiving();
        assert!(!h.stream.finished());
        h.stream.cancel_write(9);
        assert!(h.stream.finished());
    }

    #[test]
    fn test_finished_is_monotonic() {
        let h = Harness::new(4, Version::V1);
        h.stream.close().unwrap();
        h.stream.pop_stream_frame(1200).unwrap();
        h.finish_receiving();
        assert!(h.stream.finished());

        h.stream.close().unwrap();
        h.stream.cancel_read(1);
        h.stream.cancel_write(1);
        let _ = h.reset(1, 0);
        h.stream.close_for_shutdown(Error::ConnectionClosed("late".into()));
        assert!(h.stream.finished());
    }

    #[test]
    fn test_shutdown_finishes_both_halves() {
        let h = Harness::new(4, Version::V1);
        h.stream.close_for_shutdown(Error::ConnectionClosed("teardown".into()));
        assert!(h.stream.finished());
    }

    /// Data after FIN is abandoned: no RESET_STREAM will ever arrive
    #[test]
    fn test_canceled_read_with_known_final_size_finishes() {
        let h = Harness::new(4, Version::V1);
        h.stream
            .handle_stream_frame(StreamFrame {
                stream_id: StreamId::new(4),
                offset: 0,
                data: Bytes::from_static(b"unread"),
                fin: true,
            })
            .unwrap();
        h.stream.cancel_read(1);
        h.stream.close().unwrap();
        assert!(h.stream.pop_stream_frame(1200).unwrap().fin);
        assert!(h.stream.finished());
    }
}

// ============================================================================
// Graceful Close
// ============================================================================

mod close_tests {
    use super::*;

    #[test]
    fn test_close_twice_single_fin() {
        let h = Harness::new(4, Version::V1);
        assert_eq!(h.stream.close(), Ok(()));
        assert_eq!(h.stream.close(), Ok(()));

        let fin = h.stream.pop_stream_frame(1200).unwrap();
        assert!(fin.fin);
        assert_eq!(h.stream.pop_stream_frame(1200), None);
        assert_eq!(h.stream.close(), Ok(()));
        assert_eq!(h.stream.pop_stream_frame(1200), None);
    }

    #[test]
    fn test_close_wakes_scheduler() {
        let h = Harness::new(4, Version::V1);
        h.stream.close().unwrap();
        assert_eq!(h.wakeups.load(Ordering::SeqCst), 1);
        assert!(h.stream.has_pending_data());
    }

    #[test]
    fn test_half_closed_stream_still_reads() {
        let h = Harness::new(4, Version::V1);
        h.stream.close().unwrap();
        h.stream
            .handle_stream_frame(StreamFrame {
                stream_id: StreamId::new(4),
                offset: 0,
                data: Bytes::from_static(b"pong"),
                fin: true,
            })
            .unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(h.stream.read(&mut buf), Ok(4));
        assert_eq!(&buf[..4], b"pong");
    }

    #[test]
    fn test_close_after_cancel_write_fails() {
        let h = Harness::new(4, Version::V1);
        h.stream.cancel_write(3);
        assert_eq!(h.stream.close(), Err(Error::CloseCanceled(StreamId::new(4))));
    }

    /// gQUIC: a canceled read is announced with RST_STREAM at our final offset
    #[test]
    fn test_legacy_cancel_read_then_close() {
        let h = Harness::new(4, Version::GQUIC_39);
        h.write_and_pop(b"0123456789");
        h.stream.cancel_read(22);
        assert!(h.frames().is_empty());

        h.stream.close().unwrap();
        assert_eq!(
            h.frames(),
            vec![Frame::ResetStream(ResetStreamFrame {
                stream_id: StreamId::new(4),
                error_code: ERROR_CODE_STOPPING,
                final_size: 10,
            })]
        );
        let fin = h.stream.pop_stream_frame(1200).unwrap();
        assert!(fin.fin);
        assert_eq!(fin.offset, 10);
    }

    #[test]
    fn test_modern_cancel_read_then_close() {
        let h = Harness::new(4, Version::V1);
        h.stream.cancel_read(22);
        h.stream.close().unwrap();
        assert_eq!(
            h.frames(),
            vec![Frame::StopSending(StopSendingFrame {
                stream_id: StreamId::new(4),
                error_code: 22,
            })]
        );
    }
}

// ============================================================================
// Reset Translation
// ============================================================================

mod reset_tests {
    use super::*;

    /// Stream 4 on gQUIC: 10 bytes, close, then the peer resets with code 3
    #[test]
    fn test_legacy_write_close_then_reset() {
        let h = Harness::new(4, Version::GQUIC_43);
        let data = h.write_and_pop(b"0123456789");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].offset, 0);

        h.stream.close().unwrap();
        let fin = h.stream.pop_stream_frame(1200).unwrap();
        assert_eq!(fin.offset, 10);
        assert!(fin.fin);
        assert!(fin.data.is_empty());

        assert_eq!(h.reset(3, 0), Ok(()));
        assert_eq!(h.stream.stop_sending_code(), Some(3));
        assert_eq!(h.stream.reset_error_code(), Some(3));
        // everything was sent already, nothing to reset
        assert!(h.frames().is_empty());
        assert!(h.stream.finished());
    }

    #[test]
    fn test_modern_close_then_reset_no_translation() {
        let h = Harness::new(4, Version::V1);
        h.stream.close().unwrap();
        assert_eq!(h.reset(3, 0), Ok(()));
        assert_eq!(h.stream.stop_sending_code(), None);
        assert!(h.frames().is_empty());
    }

    /// RFC 9000: RESET_STREAM ends only the receive direction
    #[test]
    fn test_modern_reset_leaves_send_half_alone() {
        let h = Harness::new(4, Version::V1);
        assert_eq!(h.reset(5, 0), Ok(()));
        assert_eq!(h.stream.reset_error_code(), Some(5));
        let err = h.stream.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.error_code(), Some(5));
        assert!(err.is_canceled());

        assert_eq!(h.stream.stop_sending_code(), None);
        assert!(h.frames().is_empty());
        assert!(!h.stream.finished());

        let frames = h.write_and_pop(b"still writable");
        assert_eq!(&frames[0].data[..], b"still writable");
    }

    #[test]
    fn test_legacy_reset_cancels_blocked_writer() {
        let h = Harness::new(4, Version::GQUIC_43);
        let writer = {
            let stream = h.stream.clone();
            thread::spawn(move || stream.write(b"never popped"))
        };
        thread::sleep(Duration::from_millis(20));

        assert_eq!(h.reset(3, 0), Ok(()));
        let err = writer.join().unwrap().unwrap_err();
        assert_eq!(err.error_code(), Some(3));
        assert_eq!(
            h.frames(),
            vec![Frame::ResetStream(ResetStreamFrame {
                stream_id: StreamId::new(4),
                error_code: ERROR_CODE_STOPPING_GQUIC,
                final_size: 0,
            })]
        );
        assert!(h.stream.finished());
    }

    #[test]
    fn test_duplicate_legacy_reset_notifies_once() {
        let h = Harness::new(4, Version::GQUIC_43);
        assert_eq!(h.reset(3, 0), Ok(()));
        assert_eq!(h.reset(4, 0), Ok(()));
        assert_eq!(h.frames().len(), 1);
        assert_eq!(h.stream.stop_sending_code(), Some(3));
    }

    #[test]
    fn test_rejected_reset_is_not_translated() {
        let h = Harness::new(4, Version::GQUIC_43);
        h.stream
            .handle_stream_frame(StreamFrame {
                stream_id: StreamId::new(4),
                offset: 0,
                data: Bytes::from_static(b"abc"),
                fin: true,
            })
            .unwrap();
        assert_eq!(
            h.reset(3, 10),
            Err(Error::Transport(TransportError::FinalSizeError))
        );
        assert_eq!(h.stream.stop_sending_code(), None);
        assert!(h.frames().is_empty());
    }

    #[test]
    fn test_reset_after_shutdown_not_translated() {
        let h = Harness::new(4, Version::GQUIC_43);
        h.stream.close().unwrap();
        h.stream.close_for_shutdown(Error::ConnectionClosed("gone".into()));
        assert_eq!(h.reset(3, 0), Ok(()));
        assert_eq!(h.stream.stop_sending_code(), None);
        assert!(h.frames().is_empty());
    }

    #[test]
    fn test_explicit_stop_sending_on_modern() {
        let h = Harness::new(4, Version::V1);
        StreamController::handle_stop_sending_frame(
            &*h.stream,
            &StopSendingFrame {
                stream_id: StreamId::new(4),
                error_code: 11,
            },
        );
        assert_eq!(h.stream.stop_sending_code(), Some(11));
        assert_eq!(
            h.frames(),
            vec![Frame::ResetStream(ResetStreamFrame {
                stream_id: StreamId::new(4),
                error_code: ERROR_CODE_STOPPING,
                final_size: 0,
            })]
        );
    }
}

// ============================================================================
// Shutdown
// ============================================================================

mod shutdown_tests {
    use super::*;

    #[test]
    fn test_shutdown_unblocks_read_and_write() {
        let h = Harness::new(4, Version::V1);
        let (tx, rx) = mpsc::channel();

        let reader = {
            let stream = h.stream.clone();
            let tx = tx.clone();
            thread::spawn(move || tx.send(("read", stream.read(&mut [0u8; 16]))).unwrap())
        };
        let writer = {
            let stream = h.stream.clone();
            thread::spawn(move || tx.send(("write", stream.write(b"blocked"))).unwrap())
        };
        thread::sleep(Duration::from_millis(20));

        let err = Error::ConnectionClosed("connection torn down".into());
        h.stream.close_for_shutdown(err.clone());

        for _ in 0..2 {
            let (_, result) = rx.recv_timeout(WAIT).expect("blocked call was not woken");
            assert_eq!(result, Err(err.clone()));
        }
        reader.join().unwrap();
        writer.join().unwrap();
        assert!(h.frames().is_empty());
    }

    #[test]
    fn test_shutdown_after_partial_send_returns_err() {
        let h = Harness::new(4, Version::V1);
        let writer = {
            let stream = h.stream.clone();
            thread::spawn(move || stream.write(&[7u8; 3000]))
        };
        let deadline = Instant::now() + WAIT;
        let first = loop {
            if let Some(frame) = h.stream.pop_stream_frame(1200) {
                break frame;
            }
            assert!(Instant::now() < deadline, "writer never handed over data");
            thread::sleep(Duration::from_millis(1));
        };
        assert!(first.data.len() < 3000);

        let err = Error::ConnectionClosed("down".into());
        h.stream.close_for_shutdown(err.clone());
        assert_eq!(writer.join().unwrap(), Err(err));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_silent() {
        let h = Harness::new(4, Version::GQUIC_43);
        h.stream.cancel_read(1);
        let first = Error::ConnectionClosed("first".into());
        h.stream.close_for_shutdown(first.clone());
        h.stream.close_for_shutdown(Error::ConnectionClosed("second".into()));

        assert_eq!(h.stream.read(&mut [0u8; 4]), Err(first));

        // graceful close after shutdown must not reach the peer
        h.stream.close().unwrap();
        assert_eq!(h.stream.pop_stream_frame(1200), None);
        assert!(h.frames().is_empty());
        assert_eq!(h.stream.write(b"x"), Err(Error::WriteOnClosed(StreamId::new(4))));
    }

    #[test]
    fn test_shutdown_via_controller_trait() {
        let h = Harness::new(4, Version::V1);
        let controller: Arc<dyn StreamController> = h.stream.clone();
        controller.close_for_shutdown(Error::Transport(TransportError::InternalError));
        assert!(controller.finished());
        assert_eq!(
            h.stream.read(&mut [0u8; 1]),
            Err(Error::Transport(TransportError::InternalError))
        );
    }
}

// ============================================================================
// Deadlines
// ============================================================================

mod deadline_tests {
    use super::*;

    #[test]
    fn test_past_deadline_fails_read_and_write() {
        let h = Harness::new(4, Version::V1);
        h.stream
            .set_deadline(Some(Instant::now() - Duration::from_millis(1)))
            .unwrap();

        let read_err = h.stream.read(&mut [0u8; 4]).unwrap_err();
        assert!(read_err.is_timeout() && read_err.is_temporary());
        let write_err = h.stream.write(b"x").unwrap_err();
        assert!(write_err.is_timeout() && write_err.is_temporary());
    }

    #[test]
    fn test_deadline_wakes_blocked_calls() {
        let h = Harness::new(4, Version::V1);
        let (tx, rx) = mpsc::channel();
        {
            let stream = h.stream.clone();
            let tx = tx.clone();
            thread::spawn(move || tx.send(stream.read(&mut [0u8; 4])).unwrap());
        }
        {
            let stream = h.stream.clone();
            thread::spawn(move || tx.send(stream.write(b"slow")).unwrap());
        }
        thread::sleep(Duration::from_millis(20));
        h.stream
            .set_deadline(Some(Instant::now() - Duration::from_secs(1)))
            .unwrap();

        for _ in 0..2 {
            let result = rx.recv_timeout(WAIT).expect("blocked call was not woken");
            assert_eq!(result, Err(Error::Deadline));
        }
    }

    #[test]
    fn test_cleared_deadline_blocks_again() {
        let h = Harness::new(4, Version::V1);
        h.stream
            .set_deadline(Some(Instant::now() - Duration::from_secs(1)))
            .unwrap();
        h.stream.set_deadline(None).unwrap();

        let frames = h.write_and_pop(b"after");
        assert_eq!(&frames[0].data[..], b"after");
    }

    #[test]
    fn test_read_deadline_independent_of_write() {
        let h = Harness::new(4, Version::V1);
        h.stream
            .set_read_deadline(Some(Instant::now() - Duration::from_secs(1)))
            .unwrap();
        assert_eq!(h.stream.read(&mut [0u8; 4]), Err(Error::Deadline));
        h.write_and_pop(b"ok");
    }

    #[test]
    fn test_io_traits_report_timed_out() {
        let h = Harness::new(4, Version::V1);
        h.stream
            .set_write_deadline(Some(Instant::now() - Duration::from_secs(1)))
            .unwrap();
        let mut stream: &BidirectionalStream = &h.stream;
        let err = Write::write(&mut stream, b"x").unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);

        h.stream
            .handle_stream_frame(StreamFrame {
                stream_id: StreamId::new(4),
                offset: 0,
                data: Bytes::from_static(b"io"),
                fin: true,
            })
            .unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "io");
    }
}
