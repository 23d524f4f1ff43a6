//! Frame transport over a byte stream.
//!
//! [`FrameTransport`] turns any tokio byte stream (a serial port, a TCP
//! bridge, an in-memory duplex in tests) into a stream of verified frames.
//! Malformed frames are counted and skipped here; callers only ever see
//! good frames, end of stream, or an I/O error.

use std::io;

use deconz_protocol::{Frame, FrameCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

use crate::config::DeviceConfig;
use crate::error::DriverError;
use crate::metrics::{drop_reason, metric_defs};

const READ_CHUNK: usize = 256;

/// Open the serial device described by `config`.
pub fn open(config: &DeviceConfig) -> Result<SerialStream, DriverError> {
    info!(path = %config.path, baudrate = config.baudrate, "opening serial port");
    tokio_serial::new(&config.path, config.baudrate)
        .flow_control(config.flow_control.into())
        .open_native_async()
        .map_err(|source| DriverError::Connection {
            path: config.path.clone(),
            source,
        })
}

/// Frame-level reader/writer over a byte stream.
pub struct FrameTransport<T> {
    io: T,
    codec: FrameCodec,
    read_buf: [u8; READ_CHUNK],
}

impl<T: AsyncRead + AsyncWrite + Unpin> FrameTransport<T> {
    /// Wrap a byte stream.
    pub fn new(io: T) -> Self {
        FrameTransport {
            io,
            codec: FrameCodec::new(),
            read_buf: [0u8; READ_CHUNK],
        }
    }

    /// Wait for the next good frame.
    ///
    /// Returns `Ok(None)` when the stream ends. Cancel-safe: bytes already
    /// read stay buffered for the next call.
    pub async fn next_frame(&mut self) -> io::Result<Option<Frame>> {
        loop {
            while let Some(decoded) = self.codec.decode() {
                match decoded {
                    Ok(frame) => {
                        ::metrics::counter!(metric_defs::FRAMES_RX.name).increment(1);
                        debug!(
                            command = frame.command_id,
                            seq = frame.sequence,
                            status = frame.status,
                            len = frame.payload.len(),
                            "frame received"
                        );
                        return Ok(Some(frame));
                    }
                    Err(err) => {
                        ::metrics::counter!(
                            metric_defs::FRAMES_DROPPED.name,
                            "reason" => drop_reason(&err)
                        )
                        .increment(1);
                    }
                }
            }

            let n = self.io.read(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.codec.push(&self.read_buf[..n]);
        }
    }

    /// Encode and write a frame, then flush.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), DriverError> {
        let bytes = FrameCodec::encode(frame)?;
        self.io.write_all(&bytes).await?;
        self.io.flush().await?;
        ::metrics::counter!(metric_defs::FRAMES_TX.name).increment(1);
        debug!(
            command = frame.command_id,
            seq = frame.sequence,
            len = frame.payload.len(),
            "frame sent"
        );
        Ok(())
    }
}
