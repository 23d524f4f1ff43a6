//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when encoding or decoding deCONZ frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Frame is too long.
    #[error("frame too long: maximum {max} bytes, got {actual}")]
    FrameTooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Checksum trailer does not match the frame body.
    #[error("crc mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    CrcMismatch {
        /// Checksum computed over the body.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },

    /// Declared frame length disagrees with the bytes received.
    #[error("frame length mismatch: header says {declared}, body is {actual}")]
    LengthMismatch {
        /// Value of the frame length field.
        declared: usize,
        /// Length of the body actually received.
        actual: usize,
    },

    /// An escape byte was followed by something other than an escape code.
    #[error("invalid escape sequence: 0x{0:02X}")]
    InvalidEscape(u8),

    /// Ran out of bytes while decoding a field.
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes the field needed.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Address mode byte outside the known set.
    #[error("invalid address mode: 0x{0:02X}")]
    InvalidAddressMode(u8),

    /// Arguments do not fit the command schema.
    #[error("schema mismatch for {command}: {reason}")]
    SchemaMismatch {
        /// Command or parameter being encoded.
        command: String,
        /// What went wrong.
        reason: String,
    },

    /// Invalid data in a field.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl ProtocolError {
    /// Build an end-of-data error for a field needing `needed` bytes.
    pub fn eof(needed: usize, remaining: usize) -> Self {
        ProtocolError::UnexpectedEof { needed, remaining }
    }

    /// Build a schema mismatch error.
    pub fn schema(command: impl Into<String>, reason: impl Into<String>) -> Self {
        ProtocolError::SchemaMismatch {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the framing layer (recovered locally).
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::FrameTooShort { .. }
                | ProtocolError::FrameTooLong { .. }
                | ProtocolError::CrcMismatch { .. }
                | ProtocolError::LengthMismatch { .. }
                | ProtocolError::InvalidEscape(_)
        )
    }
}
