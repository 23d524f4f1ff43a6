//! Driver error types.

use std::io;

use deconz_protocol::{CommandId, Open, ProtocolError, Status};
use thiserror::Error;

/// Errors returned by driver operations.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The serial port could not be opened.
    #[error("failed to open {path}: {source}")]
    Connection {
        /// Device path that was opened.
        path: String,
        /// Underlying serial error.
        #[source]
        source: tokio_serial::Error,
    },

    /// No link is open, or it was closed while the command was outstanding.
    #[error("not connected")]
    NotConnected,

    /// The link failed while the command was outstanding.
    #[error("connection lost")]
    ConnectionLost,

    /// No response arrived within the command timeout.
    #[error("{command} timed out")]
    Timeout {
        /// Command that timed out.
        command: CommandId,
    },

    /// The firmware answered with a non-success status.
    #[error("{command} failed with status {status}")]
    Command {
        /// Command that failed.
        command: CommandId,
        /// Status byte from the response frame.
        status: Open<Status>,
    },

    /// Parameter name or id not in the parameter table.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// Encoding or decoding error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error on the link.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl DriverError {
    /// Whether the firmware reported it was busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, DriverError::Command { status, .. } if *status == Status::Busy)
    }

    /// Whether the error means the link is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DriverError::Connection { .. } | DriverError::NotConnected | DriverError::ConnectionLost
        )
    }
}
