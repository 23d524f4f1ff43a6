//! deCONZ Serial Driver
//!
//! Async driver for deCONZ radio coprocessors (ConBee / RaspBee) attached
//! over a serial link. Built on [`deconz_protocol`] for everything that
//! touches bytes.
//!
//! # Architecture
//!
//! ```text
//!   Deconz ──► CommandClient ──mpsc──► worker task ──► FrameTransport ──► serial
//!                    ▲                     │
//!                    │                     ▼
//!         DeviceStateMonitor ◄── handlers (device state, indications, ...)
//!                    │
//!                    ▼
//!                EventSink ──► application
//! ```
//!
//! - One worker task per connection owns the link. It sends one command at a
//!   time, matches responses by sequence number and applies
//!   the per-command timeout.
//! - The [`monitor::DeviceStateMonitor`] watches the device-state byte that
//!   most frames carry and reads back queued APS confirms and indications.
//! - Received APS frames, transmit confirms and connection loss are delivered
//!   as [`Event`]s through an [`EventSink`].
//!
//! # Example
//!
//! ```rust,ignore
//! use deconz_driver::{ApsDataRequest, Deconz, DeviceConfig, DriverConfig, Event, EventSink};
//! use deconz_protocol::AddressEndpoint;
//!
//! let (events, mut rx) = EventSink::channel();
//! let mut api = Deconz::new(DriverConfig::default(), DeviceConfig::new("/dev/ttyACM0"), events);
//! api.connect().await?;
//! api.version().await?;
//!
//! let id = api.tx_confirms().next_request_id();
//! let confirm = api.tx_confirms().register(id);
//! api.aps_data_request(&ApsDataRequest::new(
//!     id,
//!     AddressEndpoint::nwk(0x1234, 1),
//!     0x0104,
//!     0x0006,
//!     1,
//!     vec![0x01, 0x00, 0x02],
//! ))
//! .await?;
//! println!("delivered: {}", confirm.await?);
//!
//! while let Some(event) = rx.recv().await {
//!     if let Event::ApsDataIndication(indication) = event {
//!         println!("{} -> cluster 0x{:04X}", indication.src, indication.cluster_id);
//!     }
//! }
//! ```

mod api;
mod config;
mod confirm;
pub mod engine;
mod error;
mod events;
pub mod metrics;
pub mod monitor;
pub mod transport;

pub use api::*;
pub use config::*;
pub use confirm::*;
pub use error::*;
pub use events::*;

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
