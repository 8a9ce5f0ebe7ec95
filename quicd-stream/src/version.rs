//! # Wire Versions and Frame Format Variants
//!
//! Streams behave slightly differently depending on the frame format the
//! connection negotiated:
//!
//! 1. **Legacy** (Google QUIC, `Q0xx` versions): there is no STOP_SENDING
//!    frame. A RST_STREAM both abandons the sender's side and implicitly asks
//!    the receiver to abandon its own, and a canceled read is announced with a
//!    RST_STREAM once the local final offset is known.
//! 2. **Modern** (IETF QUIC, RFC 9000 and drafts): STOP_SENDING exists and
//!    the two directions are canceled independently.
//!
//! The variant is resolved once at stream construction and only consulted at
//! the few places where the formats diverge.

#![forbid(unsafe_code)]

use core::fmt;

use crate::types::ApplicationErrorCode;

// ============================================================================
// Version Constants
// ============================================================================

/// QUIC Version 1 (RFC 9000)
pub const VERSION_1: u32 = 0x0000_0001;

/// QUIC Version 2 (RFC 9369)
///
/// Same frame format as Version 1.
pub const VERSION_2: u32 = 0x6b33_43cf;

/// Google QUIC Q039
pub const VERSION_GQUIC_39: u32 = 0x5130_3339;

/// Google QUIC Q043
pub const VERSION_GQUIC_43: u32 = 0x5130_3433;

/// Google QUIC Q044
pub const VERSION_GQUIC_44: u32 = 0x5130_3434;

/// Google QUIC versions spell "Q0xx" in ASCII
const GQUIC_TAG: u32 = 0x5130_0000;
const GQUIC_TAG_MASK: u32 = 0xffff_0000;

/// Error code carried by the RESET_STREAM sent in reply to STOP_SENDING
pub const ERROR_CODE_STOPPING: ApplicationErrorCode = 0;

/// Google QUIC's QUIC_STREAM_PEER_GOING_AWAY, used for the same purpose
pub const ERROR_CODE_STOPPING_GQUIC: ApplicationErrorCode = 7;

// ============================================================================
// Version
// ============================================================================

/// Negotiated wire version of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version(pub u32);

impl Version {
    pub const V1: Version = Version(VERSION_1);
    pub const V2: Version = Version(VERSION_2);
    pub const GQUIC_39: Version = Version(VERSION_GQUIC_39);
    pub const GQUIC_43: Version = Version(VERSION_GQUIC_43);
    pub const GQUIC_44: Version = Version(VERSION_GQUIC_44);

    /// Whether this is a Google QUIC version
    pub fn is_gquic(self) -> bool {
        self.0 & GQUIC_TAG_MASK == GQUIC_TAG
    }

    /// Frame format used by this version
    pub fn variant(self) -> ProtocolVariant {
        if self.is_gquic() {
            ProtocolVariant::Legacy
        } else {
            ProtocolVariant::Modern
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_gquic() {
            let [_, _, hi, lo] = self.0.to_be_bytes();
            write!(f, "gQUIC {}{}", hi as char, lo as char)
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl From<Version> for ProtocolVariant {
    fn from(version: Version) -> Self {
        version.variant()
    }
}

// ============================================================================
// Frame Format Variant
// ============================================================================

/// Frame format family of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVariant {
    /// No STOP_SENDING frame; RST_STREAM implies it
    Legacy,

    /// STOP_SENDING is a distinct frame
    Modern,
}

impl ProtocolVariant {
    /// Whether STOP_SENDING exists on the wire
    pub fn has_stop_sending_frame(self) -> bool {
        matches!(self, ProtocolVariant::Modern)
    }

    /// Error code for the RESET_STREAM sent when the peer asked us to stop
    pub fn stopping_error_code(self) -> ApplicationErrorCode {
        match self {
            ProtocolVariant::Legacy => ERROR_CODE_STOPPING_GQUIC,
            ProtocolVariant::Modern => ERROR_CODE_STOPPING,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
