//! The packed device state byte.

use std::fmt;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::Wire;

/// Network state held in bits 0-1 of the device state byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkState {
    /// Not joined to a network.
    Offline = 0,
    /// Joining or forming a network.
    Joining = 1,
    /// Joined and operating.
    Connected = 2,
    /// Leaving the network.
    Leaving = 3,
}

impl NetworkState {
    /// Decode from the low two bits of `bits`.
    pub fn from_bits(bits: u8) -> Self {
        match bits & DEVICE_STATE_NETWORK_MASK {
            0 => NetworkState::Offline,
            1 => NetworkState::Joining,
            2 => NetworkState::Connected,
            _ => NetworkState::Leaving,
        }
    }

    /// Protocol name.
    pub fn name(&self) -> &'static str {
        match self {
            NetworkState::Offline => "OFFLINE",
            NetworkState::Joining => "JOINING",
            NetworkState::Connected => "CONNECTED",
            NetworkState::Leaving => "LEAVING",
        }
    }
}

impl From<NetworkState> for u8 {
    fn from(state: NetworkState) -> Self {
        state as u8
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device state: network state plus pending-work flags.
///
/// The two reserved high bits are kept so that a decoded byte re-encodes to
/// exactly the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceState {
    /// Network state (bits 0-1).
    pub network_state: NetworkState,
    /// Flag bits 2-7 as received.
    flags: u8,
}

impl DeviceState {
    /// Build from a network state and flag bits. Bits 0-1 of `flags` are
    /// ignored.
    pub fn new(network_state: NetworkState, flags: u8) -> Self {
        DeviceState {
            network_state,
            flags: flags & !DEVICE_STATE_NETWORK_MASK,
        }
    }

    /// Decode from the raw byte.
    pub fn from_byte(byte: u8) -> Self {
        DeviceState::new(NetworkState::from_bits(byte), byte)
    }

    /// The raw byte.
    pub fn to_byte(&self) -> u8 {
        u8::from(self.network_state) | self.flags
    }

    /// Flag bits (bits 2-7).
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// An APS data confirm is waiting.
    pub fn data_confirm(&self) -> bool {
        self.flags & DEVICE_STATE_APSDE_DATA_CONFIRM != 0
    }

    /// An APS data indication is waiting.
    pub fn data_indication(&self) -> bool {
        self.flags & DEVICE_STATE_APSDE_DATA_INDICATION != 0
    }

    /// Firmware configuration changed.
    pub fn conf_changed(&self) -> bool {
        self.flags & DEVICE_STATE_CONF_CHANGED != 0
    }

    /// Firmware can accept APS data requests.
    pub fn request_slots_available(&self) -> bool {
        self.flags & DEVICE_STATE_APSDE_DATA_REQUEST_SLOTS_AVAILABLE != 0
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        DeviceState::new(NetworkState::Offline, 0)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network_state)?;
        let flags = [
            (self.data_confirm(), "APSDE_DATA_CONFIRM"),
            (self.data_indication(), "APSDE_DATA_INDICATION"),
            (self.conf_changed(), "CONF_CHANGED"),
            (self.request_slots_available(), "APSDE_DATA_REQUEST_SLOTS_AVAILABLE"),
        ];
        for (set, name) in flags {
            if set {
                write!(f, "|{}", name)?;
            }
        }
        Ok(())
    }
}

impl Wire for DeviceState {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.to_byte());
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (byte, rest) = u8::decode(data)?;
        Ok((DeviceState::from_byte(byte), rest))
    }
}
