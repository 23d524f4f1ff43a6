//! Network parameters accessed with `read_parameter` / `write_parameter`.

use std::fmt;

use crate::error::ProtocolError;
use crate::schema::{decode_fields, encode_fields, FieldType, Value};

use crate::schema::FieldType as F;

/// A firmware network parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkParameter {
    MacAddress,
    NwkPanid,
    NwkAddress,
    NwkExtendedPanid,
    ApsDesignedCoordinator,
    ChannelMask,
    ApsExtendedPanid,
    TrustCenterAddress,
    SecurityMode,
    ConfigureEndpoint,
    UsePredefinedNwkPanid,
    NetworkKey,
    LinkKey,
    CurrentChannel,
    PermitJoin,
    ProtocolVersion,
    NwkUpdateId,
    WatchdogTtl,
    NwkFrameCounter,
    AppZdpResponseHandling,
}

struct Entry {
    param: NetworkParameter,
    id: u8,
    name: &'static str,
    schema: &'static [FieldType],
}

#[rustfmt::skip]
const PARAMETERS: &[Entry] = &[
    Entry { param: NetworkParameter::MacAddress, id: 0x01, name: "mac_address", schema: &[F::Ieee] },
    Entry { param: NetworkParameter::NwkPanid, id: 0x05, name: "nwk_panid", schema: &[F::U16] },
    Entry { param: NetworkParameter::NwkAddress, id: 0x07, name: "nwk_address", schema: &[F::Nwk] },
    Entry { param: NetworkParameter::NwkExtendedPanid, id: 0x08, name: "nwk_extended_panid", schema: &[F::Ieee] },
    Entry { param: NetworkParameter::ApsDesignedCoordinator, id: 0x09, name: "aps_designed_coordinator", schema: &[F::U8] },
    Entry { param: NetworkParameter::ChannelMask, id: 0x0A, name: "channel_mask", schema: &[F::U32] },
    Entry { param: NetworkParameter::ApsExtendedPanid, id: 0x0B, name: "aps_extended_panid", schema: &[F::Ieee] },
    Entry { param: NetworkParameter::TrustCenterAddress, id: 0x0E, name: "trust_center_address", schema: &[F::Ieee] },
    Entry { param: NetworkParameter::SecurityMode, id: 0x10, name: "security_mode", schema: &[F::U8] },
    Entry { param: NetworkParameter::ConfigureEndpoint, id: 0x13, name: "configure_endpoint", schema: &[F::U8, F::SimpleDescriptor] },
    Entry { param: NetworkParameter::UsePredefinedNwkPanid, id: 0x15, name: "use_predefined_nwk_panid", schema: &[F::U8] },
    Entry { param: NetworkParameter::NetworkKey, id: 0x18, name: "network_key", schema: &[F::U8, F::Key] },
    Entry { param: NetworkParameter::LinkKey, id: 0x19, name: "link_key", schema: &[F::Ieee, F::Key] },
    Entry { param: NetworkParameter::CurrentChannel, id: 0x1C, name: "current_channel", schema: &[F::U8] },
    Entry { param: NetworkParameter::PermitJoin, id: 0x21, name: "permit_join", schema: &[F::U8] },
    Entry { param: NetworkParameter::ProtocolVersion, id: 0x22, name: "protocol_version", schema: &[F::U16] },
    Entry { param: NetworkParameter::NwkUpdateId, id: 0x24, name: "nwk_update_id", schema: &[F::U8] },
    Entry { param: NetworkParameter::WatchdogTtl, id: 0x26, name: "watchdog_ttl", schema: &[F::U32] },
    Entry { param: NetworkParameter::NwkFrameCounter, id: 0x27, name: "nwk_frame_counter", schema: &[F::U32] },
    Entry { param: NetworkParameter::AppZdpResponseHandling, id: 0x28, name: "app_zdp_response_handling", schema: &[F::U16] },
];

impl NetworkParameter {
    // Rows follow declaration order.
    fn entry(&self) -> &'static Entry {
        &PARAMETERS[*self as usize]
    }

    /// Look up by wire id.
    pub fn from_id(id: u8) -> Option<Self> {
        PARAMETERS.iter().find(|e| e.id == id).map(|e| e.param)
    }

    /// Look up by snake-case name.
    pub fn from_name(name: &str) -> Option<Self> {
        PARAMETERS.iter().find(|e| e.name == name).map(|e| e.param)
    }

    /// Wire id.
    pub fn id(&self) -> u8 {
        self.entry().id
    }

    /// Snake-case name.
    pub fn name(&self) -> &'static str {
        self.entry().name
    }

    /// Full value schema.
    pub fn schema(&self) -> &'static [FieldType] {
        self.entry().schema
    }

    /// Fields sent with a read to select the value, e.g. the key index.
    pub fn key_schema(&self) -> &'static [FieldType] {
        let schema = self.schema();
        &schema[..schema.len().saturating_sub(1)]
    }

    /// Parameter data for a read request.
    pub fn encode_read(&self, key: &[Value]) -> Result<Vec<u8>, ProtocolError> {
        encode_fields(self.name(), self.key_schema(), key)
    }

    /// Parameter data for a write request.
    pub fn encode_write(&self, values: &[Value]) -> Result<Vec<u8>, ProtocolError> {
        encode_fields(self.name(), self.schema(), values)
    }

    /// Decode parameter data returned by the firmware.
    pub fn decode_value(&self, data: &[u8]) -> Result<Vec<Value>, ProtocolError> {
        let (values, _) = decode_fields(self.schema(), data)?;
        Ok(values)
    }

    /// Every parameter, in id order.
    pub fn all() -> impl Iterator<Item = NetworkParameter> {
        PARAMETERS.iter().map(|e| e.param)
    }
}

impl fmt::Display for NetworkParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parameter reference as given by a caller: a name, a raw id or an
/// already-resolved parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKey {
    Name(String),
    Id(u8),
    Param(NetworkParameter),
}

impl ParameterKey {
    /// Resolve against the parameter table.
    pub fn resolve(&self) -> Option<NetworkParameter> {
        match self {
            ParameterKey::Name(name) => NetworkParameter::from_name(name),
            ParameterKey::Id(id) => NetworkParameter::from_id(*id),
            ParameterKey::Param(param) => Some(*param),
        }
    }
}

impl From<&str> for ParameterKey {
    fn from(name: &str) -> Self {
        ParameterKey::Name(name.to_string())
    }
}

impl From<String> for ParameterKey {
    fn from(name: String) -> Self {
        ParameterKey::Name(name)
    }
}

impl From<u8> for ParameterKey {
    fn from(id: u8) -> Self {
        ParameterKey::Id(id)
    }
}

impl From<NetworkParameter> for ParameterKey {
    fn from(param: NetworkParameter) -> Self {
        ParameterKey::Param(param)
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterKey::Name(name) => f.write_str(name),
            ParameterKey::Id(id) => write!(f, "0x{:02X}", id),
            ParameterKey::Param(param) => write!(f, "{}", param),
        }
    }
}
