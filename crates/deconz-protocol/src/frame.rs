//! Frame encoding/decoding utilities.
//!
//! A frame body is a fixed header, the command payload and a checksum:
//!
//! ```text
//! +-----+-----+--------+------------+-----------+------------+
//! | cmd | seq | status | len (2 LE) | payload   | crc (2 LE) |
//! +-----+-----+--------+------------+-----------+------------+
//! ```
//!
//! `len` counts the header and payload. `crc` is the two's complement of the
//! 16-bit sum of every byte before it. On the wire each body is SLIP-stuffed
//! and wrapped in `END` delimiters.

use bytes::{Buf, BufMut, BytesMut};

use crate::commands::CommandId;
use crate::constants::*;
use crate::error::ProtocolError;

/// One protocol frame, without stuffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command id byte (may be unknown on received frames).
    pub command_id: u8,
    /// Sequence number correlating a request with its response.
    pub sequence: u8,
    /// Status byte; zero on everything the host sends.
    pub status: u8,
    /// Command payload.
    pub payload: Vec<u8>,
}

/// Checksum over a frame body.
pub fn checksum(data: &[u8]) -> u16 {
    let sum = data
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(*byte as u16));
    (!sum).wrapping_add(1)
}

impl Frame {
    /// Build an outgoing request frame.
    pub fn request(command: CommandId, sequence: u8, payload: Vec<u8>) -> Self {
        Frame {
            command_id: command.into(),
            sequence,
            status: 0,
            payload,
        }
    }

    /// The command, if the id is known.
    pub fn command(&self) -> Option<CommandId> {
        CommandId::from_u8(self.command_id)
    }

    /// Serialize header, payload and checksum (unstuffed).
    pub fn serialize(&self) -> Result<Vec<u8>, ProtocolError> {
        let frame_len = FRAME_HEADER_SIZE + self.payload.len();
        if frame_len + FRAME_CRC_SIZE > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: frame_len + FRAME_CRC_SIZE,
            });
        }

        let mut buf = Vec::with_capacity(frame_len + FRAME_CRC_SIZE);
        buf.put_u8(self.command_id);
        buf.put_u8(self.sequence);
        buf.put_u8(self.status);
        buf.put_u16_le(frame_len as u16);
        buf.put_slice(&self.payload);
        let crc = checksum(&buf);
        buf.put_u16_le(crc);
        Ok(buf)
    }

    /// Parse and verify an unstuffed frame body.
    pub fn deserialize(data: &[u8]) -> Result<Self, ProtocolError> {
        let min = FRAME_HEADER_SIZE + FRAME_CRC_SIZE;
        if data.len() < min {
            return Err(ProtocolError::FrameTooShort {
                expected: min,
                actual: data.len(),
            });
        }
        if data.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: data.len(),
            });
        }

        let (body, trailer) = data.split_at(data.len() - FRAME_CRC_SIZE);
        let carried = u16::from_le_bytes([trailer[0], trailer[1]]);
        let computed = checksum(body);
        if carried != computed {
            return Err(ProtocolError::CrcMismatch {
                expected: computed,
                actual: carried,
            });
        }

        let declared = u16::from_le_bytes([body[3], body[4]]) as usize;
        if declared != body.len() {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        Ok(Frame {
            command_id: body[0],
            sequence: body[1],
            status: body[2],
            payload: body[FRAME_HEADER_SIZE..].to_vec(),
        })
    }
}

fn unescape(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(&byte) = bytes.next() {
        if byte != SLIP_ESC {
            out.push(byte);
            continue;
        }
        match bytes.next() {
            Some(&SLIP_ESC_END) => out.push(SLIP_END),
            Some(&SLIP_ESC_ESC) => out.push(SLIP_ESC),
            Some(&other) => return Err(ProtocolError::InvalidEscape(other)),
            // Escape immediately before the delimiter.
            None => return Err(ProtocolError::InvalidEscape(SLIP_END)),
        }
    }
    Ok(out)
}

/// SLIP codec for reading and writing frames.
///
/// Received bytes are pushed in as they arrive; [`FrameCodec::decode`]
/// yields one result per delimited frame. A malformed frame yields an error
/// and decoding carries on with the next one.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Dropping bytes up to the next delimiter after an overrun.
    discarding: bool,
}

impl FrameCodec {
    /// Largest stuffed frame the buffer may hold before it is dropped.
    const MAX_BUFFERED: usize = 2 * MAX_FRAME_SIZE;

    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
            discarding: false,
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer.
    ///
    /// Returns `None` if more data is needed.
    pub fn decode(&mut self) -> Option<Result<Frame, ProtocolError>> {
        loop {
            let Some(end) = self.buffer.iter().position(|b| *b == SLIP_END) else {
                if self.discarding {
                    self.buffer.clear();
                } else if self.buffer.len() > Self::MAX_BUFFERED {
                    let actual = self.buffer.len();
                    log::warn!("dropping {} buffered bytes with no frame delimiter", actual);
                    self.buffer.clear();
                    self.discarding = true;
                    return Some(Err(ProtocolError::FrameTooLong {
                        max: MAX_FRAME_SIZE,
                        actual,
                    }));
                }
                return None;
            };

            let raw = self.buffer.split_to(end);
            self.buffer.advance(1);

            if self.discarding {
                log::trace!("discarded {} bytes of an overlong frame", raw.len());
                self.discarding = false;
                continue;
            }
            if raw.is_empty() {
                continue;
            }

            let result = unescape(&raw).and_then(|body| Frame::deserialize(&body));
            match &result {
                Err(ProtocolError::FrameTooShort { actual, .. }) => {
                    log::trace!("discarding {} bytes of line noise", actual);
                }
                Err(err) => log::warn!("dropping malformed frame: {}", err),
                Ok(_) => {}
            }
            return Some(result);
        }
    }

    /// Stuff and delimit a frame for transmission.
    pub fn encode(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let body = frame.serialize()?;
        let mut buf = Vec::with_capacity(body.len() + 8);
        buf.put_u8(SLIP_END);
        for byte in body {
            match byte {
                SLIP_END => buf.put_slice(&[SLIP_ESC, SLIP_ESC_END]),
                SLIP_ESC => buf.put_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
                other => buf.put_u8(other),
            }
        }
        buf.put_u8(SLIP_END);
        Ok(buf)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
