//! Schema-driven payload encoding.
//!
//! Each command has a transmit schema (what the host sends) and a receive
//! schema (what the firmware answers with or pushes unsolicited). A schema is
//! an ordered list of [`FieldType`]s; payloads are built from and decoded
//! into matching lists of [`Value`]s. The two tables below are the only
//! place command layouts are described.

use crate::commands::CommandId;
use crate::device_state::DeviceState;
use crate::error::ProtocolError;
use crate::status::{Open, Status, TxStatus};
use crate::types::*;

/// Type of one schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    U8,
    U16,
    U32,
    I8,
    Nwk,
    Ieee,
    Key,
    Address,
    AddressEndpoint,
    NwkList,
    LvBytes,
    /// Bytes running to the end of the payload.
    Bytes,
    SimpleDescriptor,
    DeviceState,
    Status,
    TxStatus,
    /// A [`NwkList`] that may be left off the end of the payload.
    OptionalNwkList,
}

impl FieldType {
    /// Whether the field may be omitted. Optional fields only appear at the
    /// end of a schema.
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::OptionalNwkList)
    }
}

/// A decoded (or to-be-encoded) field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    I8(i8),
    Nwk(Nwk),
    Ieee(Ieee),
    Key(Key),
    Address(Address),
    AddressEndpoint(AddressEndpoint),
    NwkList(NwkList),
    LvBytes(Vec<u8>),
    Bytes(Vec<u8>),
    SimpleDescriptor(SimpleDescriptor),
    DeviceState(DeviceState),
    Status(Open<Status>),
    TxStatus(Open<TxStatus>),
}

impl Value {
    /// Whether this value can fill a field of type `field`.
    pub fn matches(&self, field: FieldType) -> bool {
        matches!(
            (self, field),
            (Value::U8(_), FieldType::U8)
                | (Value::U16(_), FieldType::U16)
                | (Value::U32(_), FieldType::U32)
                | (Value::I8(_), FieldType::I8)
                | (Value::Nwk(_), FieldType::Nwk)
                | (Value::Ieee(_), FieldType::Ieee)
                | (Value::Key(_), FieldType::Key)
                | (Value::Address(_), FieldType::Address)
                | (Value::AddressEndpoint(_), FieldType::AddressEndpoint)
                | (Value::NwkList(_), FieldType::NwkList)
                | (Value::NwkList(_), FieldType::OptionalNwkList)
                | (Value::LvBytes(_), FieldType::LvBytes)
                | (Value::Bytes(_), FieldType::Bytes)
                | (Value::SimpleDescriptor(_), FieldType::SimpleDescriptor)
                | (Value::DeviceState(_), FieldType::DeviceState)
                | (Value::Status(_), FieldType::Status)
                | (Value::TxStatus(_), FieldType::TxStatus)
        )
    }

    /// Check that the value fits its length prefix.
    fn check_bounds(&self) -> Result<(), String> {
        let too_long = |what: &str, len: usize, max: usize| {
            if len > max {
                Err(format!("{what} has {len} entries, at most {max} fit"))
            } else {
                Ok(())
            }
        };
        match self {
            Value::NwkList(list) => too_long("nwk list", list.0.len(), NwkList::MAX_LEN),
            Value::LvBytes(bytes) => too_long("lv bytes", bytes.len(), LvBytes::MAX_LEN),
            Value::SimpleDescriptor(desc) => {
                too_long("input clusters", desc.input_clusters.len(), u8::MAX as usize)?;
                too_long("output clusters", desc.output_clusters.len(), u8::MAX as usize)
            }
            _ => Ok(()),
        }
    }

    /// Append the wire encoding.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Value::U8(v) => v.encode(out),
            Value::U16(v) => v.encode(out),
            Value::U32(v) => v.encode(out),
            Value::I8(v) => v.encode(out),
            Value::Nwk(v) => v.encode(out),
            Value::Ieee(v) => v.encode(out),
            Value::Key(v) => v.encode(out),
            Value::Address(v) => v.encode(out),
            Value::AddressEndpoint(v) => v.encode(out),
            Value::NwkList(v) => v.encode(out),
            Value::LvBytes(v) => {
                out.extend_from_slice(&(v.len() as u16).to_le_bytes());
                out.extend_from_slice(v);
            }
            Value::Bytes(v) => out.extend_from_slice(v),
            Value::SimpleDescriptor(v) => v.encode(out),
            Value::DeviceState(v) => v.encode(out),
            Value::Status(v) => v.encode(out),
            Value::TxStatus(v) => v.encode(out),
        }
    }

    /// Decode one field of type `field` from the front of `data`.
    pub fn decode(field: FieldType, data: &[u8]) -> Result<(Value, &[u8]), ProtocolError> {
        fn wrap<T: Wire>(
            data: &[u8],
            f: impl FnOnce(T) -> Value,
        ) -> Result<(Value, &[u8]), ProtocolError> {
            let (value, rest) = T::decode(data)?;
            Ok((f(value), rest))
        }

        match field {
            FieldType::U8 => wrap(data, Value::U8),
            FieldType::U16 => wrap(data, Value::U16),
            FieldType::U32 => wrap(data, Value::U32),
            FieldType::I8 => wrap(data, Value::I8),
            FieldType::Nwk => wrap(data, Value::Nwk),
            FieldType::Ieee => wrap(data, Value::Ieee),
            FieldType::Key => wrap(data, Value::Key),
            FieldType::Address => wrap(data, Value::Address),
            FieldType::AddressEndpoint => wrap(data, Value::AddressEndpoint),
            FieldType::NwkList | FieldType::OptionalNwkList => wrap(data, Value::NwkList),
            FieldType::LvBytes => wrap(data, |b: LvBytes| Value::LvBytes(b.0)),
            FieldType::Bytes => wrap(data, |b: Bytes| Value::Bytes(b.0)),
            FieldType::SimpleDescriptor => wrap(data, Value::SimpleDescriptor),
            FieldType::DeviceState => wrap(data, Value::DeviceState),
            FieldType::Status => wrap(data, Value::Status),
            FieldType::TxStatus => wrap(data, Value::TxStatus),
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut out = Vec::new();
        self.encode(&mut out);
        out.len()
    }

    /// The value of a `U8` field.
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            Value::U8(v) => Some(*v),
            _ => None,
        }
    }

    /// The value of a `U16` field.
    pub fn as_u16(&self) -> Option<u16> {
        match self {
            Value::U16(v) => Some(*v),
            _ => None,
        }
    }

    /// The value of a `U32` field.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(v) => Some(*v),
            _ => None,
        }
    }

    /// The value of an `I8` field.
    pub fn as_i8(&self) -> Option<i8> {
        match self {
            Value::I8(v) => Some(*v),
            _ => None,
        }
    }

    /// A decoded device address.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(v) => Some(*v),
            _ => None,
        }
    }

    /// An address with its endpoint.
    pub fn as_address_endpoint(&self) -> Option<AddressEndpoint> {
        match self {
            Value::AddressEndpoint(v) => Some(*v),
            _ => None,
        }
    }

    /// Contents of either byte-string type.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::LvBytes(v) | Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// The device-state byte.
    pub fn as_device_state(&self) -> Option<DeviceState> {
        match self {
            Value::DeviceState(v) => Some(*v),
            _ => None,
        }
    }

    /// Transmit status of a data confirm.
    pub fn as_tx_status(&self) -> Option<Open<TxStatus>> {
        match self {
            Value::TxStatus(v) => Some(*v),
            _ => None,
        }
    }
}

/// Encode `values` against `schema`.
///
/// Values must match the schema field by field; trailing optional fields may
/// be left off. `name` labels any [`ProtocolError::SchemaMismatch`].
pub fn encode_fields(
    name: &str,
    schema: &[FieldType],
    values: &[Value],
) -> Result<Vec<u8>, ProtocolError> {
    let required = schema.iter().filter(|f| !f.is_optional()).count();
    if values.len() < required || values.len() > schema.len() {
        let expected = if required == schema.len() {
            format!("{}", schema.len())
        } else {
            format!("{} to {}", required, schema.len())
        };
        return Err(ProtocolError::schema(
            name,
            format!("expected {expected} fields, got {}", values.len()),
        ));
    }

    let mut out = Vec::new();
    for (index, (field, value)) in schema.iter().zip(values).enumerate() {
        if !value.matches(*field) {
            return Err(ProtocolError::schema(
                name,
                format!("field {index} should be {field:?}, got {value:?}"),
            ));
        }
        value
            .check_bounds()
            .map_err(|reason| ProtocolError::schema(name, format!("field {index}: {reason}")))?;
        value.encode(&mut out);
    }
    Ok(out)
}

/// Decode a payload against `schema`, returning the values and whatever bytes
/// follow the last field.
///
/// An optional trailing field is decoded only if bytes remain for it.
pub fn decode_fields<'a>(
    schema: &[FieldType],
    data: &'a [u8],
) -> Result<(Vec<Value>, &'a [u8]), ProtocolError> {
    let mut values = Vec::with_capacity(schema.len());
    let mut rest = data;
    for field in schema {
        if field.is_optional() && rest.is_empty() {
            break;
        }
        let (value, next) = Value::decode(*field, rest)?;
        values.push(value);
        rest = next;
    }
    Ok((values, rest))
}

// ============================================================================
// Command tables
// ============================================================================

use self::FieldType as F;

const APS_DATA_REQUEST_TX: &[FieldType] = &[
    F::U16,             // length
    F::U8,              // request id
    F::U8,              // flags
    F::AddressEndpoint, // destination
    F::U16,             // profile
    F::U16,             // cluster
    F::U8,              // source endpoint
    F::LvBytes,         // asdu
    F::U8,              // tx options
    F::U8,              // radius
    F::OptionalNwkList, // relays
];

const APS_DATA_CONFIRM_RX: &[FieldType] = &[
    F::U16,             // length
    F::DeviceState,
    F::U8,              // request id
    F::AddressEndpoint, // destination
    F::U8,              // source endpoint
    F::TxStatus,
    F::U8,
    F::U8,
    F::U8,
    F::U8,
];

const APS_DATA_INDICATION_RX: &[FieldType] = &[
    F::U16, // length
    F::DeviceState,
    F::Address, // destination
    F::U8,      // destination endpoint
    F::Address, // source
    F::U8,      // source endpoint
    F::U16,     // profile
    F::U16,     // cluster
    F::LvBytes, // asdu
    F::U8,
    F::U8,
    F::U8, // lqi
    F::U8,
    F::U8,
    F::U8,
    F::U8,
    F::I8, // rssi
];

/// Transmit schema, or `None` for commands the host never sends.
pub fn tx_schema(command: CommandId) -> Option<&'static [FieldType]> {
    let schema: &'static [FieldType] = match command {
        CommandId::ApsDataConfirm => &[F::U16],
        CommandId::DeviceState => &[F::U8, F::U8, F::U8],
        CommandId::ChangeNetworkState => &[F::U8],
        CommandId::ReadParameter => &[F::U16, F::U8, F::Bytes],
        CommandId::WriteParameter => &[F::U16, F::U8, F::Bytes],
        CommandId::Version => &[F::U32],
        CommandId::ApsDataRequest => APS_DATA_REQUEST_TX,
        CommandId::ApsDataIndication => &[F::U16, F::U8],
        CommandId::AddNeighbour => &[F::U16, F::U8, F::Nwk, F::Ieee, F::U8],
        CommandId::DeviceStateChanged
        | CommandId::ZigbeeGreenPower
        | CommandId::MacPoll
        | CommandId::SimplifiedBeacon => return None,
    };
    Some(schema)
}

/// Receive schema and whether the frame answers a host request.
pub fn rx_schema(command: CommandId) -> (&'static [FieldType], bool) {
    match command {
        CommandId::ApsDataConfirm => (APS_DATA_CONFIRM_RX, true),
        CommandId::DeviceState => (&[F::DeviceState, F::U8, F::U8], true),
        CommandId::ChangeNetworkState => (&[F::U8], true),
        CommandId::ReadParameter => (&[F::U16, F::U8, F::Bytes], true),
        CommandId::WriteParameter => (&[F::U16, F::U8], true),
        CommandId::Version => (&[F::U32], true),
        CommandId::DeviceStateChanged => (&[F::DeviceState, F::U8], false),
        CommandId::ApsDataRequest => (&[F::U16, F::DeviceState, F::U8], true),
        CommandId::ApsDataIndication => (APS_DATA_INDICATION_RX, true),
        CommandId::ZigbeeGreenPower => (&[F::LvBytes], false),
        CommandId::MacPoll => (&[F::U16, F::Address, F::U8, F::I8], false),
        CommandId::AddNeighbour => (&[F::U16, F::U8, F::Nwk, F::Ieee, F::U8], true),
        CommandId::SimplifiedBeacon => (&[F::U16, F::U16, F::U16, F::U8, F::U8, F::U8], false),
    }
}

/// Whether the firmware sends this command only in answer to a request.
pub fn is_solicited(command: CommandId) -> bool {
    rx_schema(command).1
}

/// Encode a command payload against its transmit schema.
pub fn encode_command(command: CommandId, values: &[Value]) -> Result<Vec<u8>, ProtocolError> {
    let schema = tx_schema(command)
        .ok_or_else(|| ProtocolError::schema(command.name(), "command cannot be sent"))?;
    encode_fields(command.name(), schema, values)
}

/// Decode a command payload against its receive schema.
pub fn decode_command(command: CommandId, payload: &[u8]) -> Result<Vec<Value>, ProtocolError> {
    let (schema, _) = rx_schema(command);
    let (values, rest) = decode_fields(schema, payload)?;
    if !rest.is_empty() {
        log::trace!(
            "{}: ignoring {} trailing payload bytes",
            command.name(),
            rest.len()
        );
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_state::NetworkState;

    fn sample(field: FieldType) -> Value {
        match field {
            F::U8 => Value::U8(0x42),
            F::U16 => Value::U16(0x1234),
            F::U32 => Value::U32(0x0102_0304),
            F::I8 => Value::I8(-47),
            F::Nwk => Value::Nwk(Nwk(0xC643)),
            F::Ieee => Value::Ieee(Ieee::from_u64(0x00124B0001020304)),
            F::Key => Value::Key(Key([0x11; 16])),
            F::Address => Value::Address(Address::Nwk(Nwk(0))),
            F::AddressEndpoint => {
                Value::AddressEndpoint(AddressEndpoint::nwk(0xAA55, 1))
            }
            F::NwkList | F::OptionalNwkList => Value::NwkList(NwkList(vec![
                Nwk(0x1234),
                Nwk(0x5678),
            ])),
            F::LvBytes => Value::LvBytes(b"aps payload".to_vec()),
            F::Bytes => Value::Bytes(vec![0xDE, 0xAD]),
            F::SimpleDescriptor => {
                Value::SimpleDescriptor(SimpleDescriptor {
                    endpoint: 1,
                    profile: 0x0104,
                    device_type: 0x0005,
                    device_version: 1,
                    input_clusters: vec![0x0000],
                    output_clusters: vec![],
                })
            }
            F::DeviceState => Value::DeviceState(
                DeviceState::new(NetworkState::Connected, 0x24),
            ),
            F::Status => Value::Status(Open::from_raw(0x02)),
            F::TxStatus => Value::TxStatus(Open::from_raw(0xE9)),
        }
    }

    #[test]
    fn test_rx_schemas_round_trip() {
        for command in CommandId::ALL {
            let (schema, _) = rx_schema(command);
            let values: Vec<Value> = schema.iter().map(|f| sample(*f)).collect();
            let encoded = encode_fields(command.name(), schema, &values).unwrap();
            let (decoded, rest) = decode_fields(schema, &encoded).unwrap();
            assert_eq!(decoded, values, "{command}");
            assert!(rest.is_empty(), "{command}");
        }
    }

    #[test]
    fn test_every_sendable_command_encodes() {
        for command in CommandId::ALL {
            let Some(schema) = tx_schema(command) else {
                assert!(!is_solicited(command), "{command} has no tx schema");
                continue;
            };
            let values: Vec<Value> = schema.iter().map(|f| sample(*f)).collect();
            let encoded = encode_command(command, &values).unwrap();
            let expected: usize = values.iter().map(Value::encoded_len).sum();
            assert_eq!(encoded.len(), expected, "{command}");
        }
    }

    #[test]
    fn test_unsolicited_commands() {
        let unsolicited: Vec<CommandId> = CommandId::ALL
            .into_iter()
            .filter(|c| !is_solicited(*c))
            .collect();
        assert_eq!(
            unsolicited,
            vec![
                CommandId::DeviceStateChanged,
                CommandId::ZigbeeGreenPower,
                CommandId::MacPoll,
                CommandId::SimplifiedBeacon,
            ]
        );
    }

    #[test]
    fn test_arity_mismatch() {
        let err = encode_command(CommandId::DeviceState, &[Value::U8(0), Value::U8(0)]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::schema("device_state", "expected 3 fields, got 2")
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = encode_command(CommandId::Version, &[Value::U16(0)]).unwrap_err();
        assert!(matches!(err, ProtocolError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_unsendable_command() {
        assert!(encode_command(CommandId::MacPoll, &[]).is_err());
    }

    #[test]
    fn test_optional_trailing_relays() {
        let mut values: Vec<Value> = APS_DATA_REQUEST_TX
            .iter()
            .filter(|f| !f.is_optional())
            .map(|f| sample(*f))
            .collect();
        let without = encode_command(CommandId::ApsDataRequest, &values).unwrap();

        values.push(sample(F::OptionalNwkList));
        let with = encode_command(CommandId::ApsDataRequest, &values).unwrap();
        assert_eq!(with.len(), without.len() + 5);
        assert_eq!(&with[..without.len()], &without[..]);

        let (decoded, _) = decode_fields(APS_DATA_REQUEST_TX, &without).unwrap();
        assert_eq!(decoded.len(), APS_DATA_REQUEST_TX.len() - 1);
        let (decoded, _) = decode_fields(APS_DATA_REQUEST_TX, &with).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_oversized_list_rejected() {
        let relays = NwkList(vec![Nwk(0); 256]);
        let err = encode_fields("relays", &[F::NwkList], &[Value::NwkList(relays)]);
        assert!(matches!(err, Err(ProtocolError::SchemaMismatch { .. })));
    }

    #[test]
    fn test_decode_indication() {
        // length, state, dst nwk 0x0000, dst ep 1, src nwk 0xC643, src ep 1,
        // profile 0x0104, cluster 0x0000, asdu, 7 trailing bytes, rssi -47
        let mut payload = vec![0x3F, 0x00, 0x22, 0x02, 0x00, 0x00, 0x01, 0x02, 0x43, 0xC6, 0x01];
        payload.extend_from_slice(&[0x04, 0x01, 0x00, 0x00]);
        payload.extend_from_slice(&[0x02, 0x00, 0x18, 0x1F]);
        payload.extend_from_slice(&[0x00, 0xAF, 0xFF, 0xBA, 0x19, 0x4E, 0x03, 0xD1]);

        let values = decode_command(CommandId::ApsDataIndication, &payload).unwrap();
        assert_eq!(values.len(), 17);
        assert_eq!(values[4].as_address().and_then(|a| a.nwk()), Some(Nwk(0xC643)));
        assert_eq!(values[6].as_u16(), Some(0x0104));
        assert_eq!(values[8].as_bytes(), Some(&[0x18, 0x1F][..]));
        assert_eq!(values[11].as_u8(), Some(0xFF));
        assert_eq!(values[16].as_i8(), Some(-47));
    }

    #[test]
    fn test_decode_truncated_is_error() {
        assert!(decode_command(CommandId::ApsDataIndication, &[0x08, 0x00, 0x01, 0x00, 0x22]).is_err());
    }
}
