//! Events delivered to the application.

use std::io;
use std::sync::Arc;

use deconz_protocol::{
    Address, AddressEndpoint, Open, ProtocolError, TxStatus, Value,
};
use tokio::sync::mpsc;

/// An asynchronous notification from the driver.
#[derive(Debug, Clone)]
pub enum Event {
    /// The link failed. `None` means the device closed it cleanly.
    ConnectionLost(Option<Arc<io::Error>>),
    /// A frame was received over the air.
    ApsDataIndication(ApsIndication),
    /// The firmware reported the outcome of an APS data request.
    ApsDataConfirm(ApsConfirm),
}

/// A received APS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApsIndication {
    /// Sender address.
    pub src: Address,
    /// Sender endpoint.
    pub src_ep: u8,
    /// Destination address.
    pub dst: Address,
    /// Destination endpoint.
    pub dst_ep: u8,
    /// Application profile.
    pub profile_id: u16,
    /// Cluster.
    pub cluster_id: u16,
    /// APS payload.
    pub payload: Vec<u8>,
    /// Link quality of the last hop.
    pub lqi: u8,
    /// Signal strength of the last hop, in dBm.
    pub rssi: i8,
}

/// Outcome of an APS data request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApsConfirm {
    /// Id given to the request.
    pub request_id: u8,
    /// Destination of the request.
    pub dst: AddressEndpoint,
    /// Source endpoint of the request.
    pub src_ep: u8,
    /// Delivery status.
    pub status: Open<TxStatus>,
}

fn field<'a, T>(
    values: &'a [Value],
    index: usize,
    name: &str,
    get: impl FnOnce(&'a Value) -> Option<T>,
) -> Result<T, ProtocolError> {
    values
        .get(index)
        .and_then(get)
        .ok_or_else(|| ProtocolError::InvalidData(format!("missing or mistyped field {name}")))
}

impl ApsIndication {
    /// Build from the decoded `aps_data_indication` response.
    pub fn from_values(values: &[Value]) -> Result<Self, ProtocolError> {
        let rssi_index = values.len().saturating_sub(1);
        Ok(ApsIndication {
            dst: field(values, 2, "dst", Value::as_address)?,
            dst_ep: field(values, 3, "dst_ep", Value::as_u8)?,
            src: field(values, 4, "src", Value::as_address)?,
            src_ep: field(values, 5, "src_ep", Value::as_u8)?,
            profile_id: field(values, 6, "profile_id", Value::as_u16)?,
            cluster_id: field(values, 7, "cluster_id", Value::as_u16)?,
            payload: field(values, 8, "payload", Value::as_bytes)?.to_vec(),
            lqi: field(values, 11, "lqi", Value::as_u8)?,
            rssi: field(values, rssi_index, "rssi", Value::as_i8)?,
        })
    }
}

impl ApsConfirm {
    /// Build from the decoded `aps_data_confirm` response.
    pub fn from_values(values: &[Value]) -> Result<Self, ProtocolError> {
        Ok(ApsConfirm {
            request_id: field(values, 2, "request_id", Value::as_u8)?,
            dst: field(values, 3, "dst", Value::as_address_endpoint)?,
            src_ep: field(values, 4, "src_ep", Value::as_u8)?,
            status: field(values, 5, "status", Value::as_tx_status)?,
        })
    }
}

/// Where the driver delivers [`Event`]s.
///
/// A sink without a receiver drops events silently.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSink {
    /// Deliver events to `tx`.
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        EventSink { tx: Some(tx) }
    }

    /// A sink that drops everything.
    pub fn none() -> Self {
        EventSink { tx: None }
    }

    /// A sink plus the receiver it delivers to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(tx), rx)
    }

    /// Deliver an event, dropping it if nobody listens.
    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("event receiver gone, dropping event");
            }
        }
    }
}
