//! Driver and device configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Serial flow control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// XON/XOFF.
    Software,
    /// RTS/CTS.
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// Serial device settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub path: String,
    /// Baud rate.
    pub baudrate: u32,
    /// Flow control.
    pub flow_control: FlowControl,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            path: String::new(),
            baudrate: 38_400,
            flow_control: FlowControl::None,
        }
    }
}

impl DeviceConfig {
    /// Settings for the device at `path` with default line parameters.
    pub fn new(path: impl Into<String>) -> Self {
        DeviceConfig {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Command engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// Time to wait for a command response, in milliseconds.
    pub command_timeout_ms: u64,
    /// Time to wait for the probe's device state response, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Delays between attempts when an APS data request is rejected as busy.
    /// One more attempt is made than there are delays.
    pub busy_retry_delays_ms: Vec<u64>,
    /// Commands that may wait behind the one in flight.
    pub request_queue_depth: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            command_timeout_ms: 1_800,
            probe_timeout_ms: 2_000,
            busy_retry_delays_ms: vec![500, 1_000, 1_500],
            request_queue_depth: 32,
        }
    }
}

impl DriverConfig {
    /// Parse from YAML. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DriverError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Command response timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Probe response timeout.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Busy retry delays, in order.
    pub fn busy_retry_delays(&self) -> Vec<Duration> {
        self.busy_retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}
