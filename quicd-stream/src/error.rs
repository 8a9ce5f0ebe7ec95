//! Stream Error Types
//!
//! RFC 9000 Section 20 separates two error domains:
//! - **Transport Errors**: protocol violations detected while handling frames.
//!   These are handed back to the connection, which tears itself down.
//! - **Application Errors**: codes carried by RESET_STREAM / STOP_SENDING.
//!   These terminate a single stream and surface from blocked reads and writes.
//!
//! Deadline expiry and connection shutdown are local signals and never reach
//! the wire.

#![forbid(unsafe_code)]

use std::io;

use thiserror::Error;

use crate::types::{ApplicationErrorCode, StreamId};

/// Transport Error Codes as defined in RFC 9000 Section 20.1
///
/// Only the codes a stream can raise while processing frames are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(u64)]
pub enum TransportError {
    /// No error (0x00) - Used for graceful shutdown
    #[error("no error")]
    NoError = 0x00,

    /// Internal Error (0x01) - Implementation error
    #[error("internal error")]
    InternalError = 0x01,

    /// Flow Control Error (0x03) - Peer exceeded flow control limits
    #[error("flow control limit exceeded")]
    FlowControlError = 0x03,

    /// Stream State Error (0x05) - Frame received in invalid stream state
    #[error("frame received in invalid stream state")]
    StreamStateError = 0x05,

    /// Final Size Error (0x06) - Final size violation
    #[error("final size violation")]
    FinalSizeError = 0x06,

    /// Protocol Violation (0x0a) - Generic protocol violation
    #[error("protocol violation")]
    ProtocolViolation = 0x0a,
}

impl TransportError {
    /// Wire value of the code
    pub fn code(self) -> u64 {
        self as u64
    }
}

/// Generic Result Type for stream operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified Error Type for stream operations
///
/// Callers inspect the facets (`is_timeout`, `is_temporary`, `is_canceled`,
/// `error_code`) rather than comparing against particular values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The read or write deadline passed before the operation completed
    #[error("deadline exceeded")]
    Deadline,

    /// The stream was canceled by either endpoint
    #[error("{message}")]
    Canceled {
        /// Application error code, preserved exactly as received or chosen
        code: ApplicationErrorCode,
        message: String,
    },

    /// Protocol violation detected while handling a frame
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Write after the send direction was closed
    #[error("write on closed stream {0}")]
    WriteOnClosed(StreamId),

    /// Close after the send direction was canceled
    #[error("close called for canceled stream {0}")]
    CloseCanceled(StreamId),

    /// The owning connection went away
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}

impl Error {
    /// Build a cancellation error for a stream
    pub fn canceled(code: ApplicationErrorCode, message: impl Into<String>) -> Self {
        Error::Canceled {
            code,
            message: message.into(),
        }
    }

    /// Deadline errors are always timeouts
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Deadline)
    }

    /// Deadline errors are always retryable
    pub fn is_temporary(&self) -> bool {
        matches!(self, Error::Deadline)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled { .. })
    }

    /// Application error code of a cancellation
    pub fn error_code(&self) -> Option<ApplicationErrorCode> {
        match self {
            Error::Canceled { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Deadline => io::ErrorKind::TimedOut,
            Error::Canceled { .. } => io::ErrorKind::ConnectionReset,
            Error::Transport(_) => io::ErrorKind::InvalidData,
            Error::WriteOnClosed(_) | Error::CloseCanceled(_) => io::ErrorKind::BrokenPipe,
            Error::ConnectionClosed(_) => io::ErrorKind::NotConnected,
        };
        io::Error::new(kind, e)
    }
}
