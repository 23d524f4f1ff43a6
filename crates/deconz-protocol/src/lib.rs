//! deCONZ Serial Protocol
//!
//! This crate provides the I/O-free half of a driver for deCONZ radio
//! coprocessors (ConBee / RaspBee). It knows how bytes look on the wire and
//! nothing about sockets, tasks or timers.
//!
//! # Protocol Overview
//!
//! The host and firmware exchange SLIP-delimited frames. Each frame carries a
//! command id, a sequence number, a status byte and a command payload:
//!
//! - **Requests** (host → firmware): payload laid out by the command's
//!   transmit schema, status always zero
//! - **Responses** (firmware → host): same command id and sequence as the
//!   request, payload laid out by the receive schema
//! - **Unsolicited frames** (firmware → host): pushed at any time, e.g.
//!   `device_state_changed` and `mac_poll`
//!
//! # Example
//!
//! ```rust,ignore
//! use deconz_protocol::{encode_command, CommandId, Frame, FrameCodec, Value};
//!
//! let payload = encode_command(CommandId::Version, &[Value::U32(0)])?;
//! let bytes = FrameCodec::encode(&Frame::request(CommandId::Version, 1, payload))?;
//!
//! let mut codec = FrameCodec::new();
//! codec.push(&received);
//! while let Some(frame) = codec.decode() { /* ... */ }
//! ```

mod commands;
mod constants;
mod device_state;
mod error;
mod frame;
mod params;
mod schema;
mod status;
mod types;

pub use commands::*;
pub use constants::*;
pub use device_state::*;
pub use error::*;
pub use frame::*;
pub use params::*;
pub use schema::*;
pub use status::*;
pub use types::*;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
