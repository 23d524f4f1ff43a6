//! Wire types and their little-endian encodings.
//!
//! Every type implements [`Wire`]: encoding appends to a byte vector and
//! decoding consumes a prefix of the input, returning the value together with
//! the unconsumed remainder. Decoding never panics on short or malformed
//! input.

use std::fmt;
use std::str::FromStr;

use bytes::BufMut;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::status::{KnownValue, Open};

/// A type with a fixed wire encoding.
pub trait Wire: Sized {
    /// Append the encoding of `self` to `out`.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode a value from the front of `data`.
    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError>;

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Split `n` bytes off the front of `data`.
pub(crate) fn take(data: &[u8], n: usize) -> Result<(&[u8], &[u8]), ProtocolError> {
    if data.len() < n {
        return Err(ProtocolError::eof(n, data.len()));
    }
    Ok(data.split_at(n))
}

fn take_array<const N: usize>(data: &[u8]) -> Result<([u8; N], &[u8]), ProtocolError> {
    let (head, rest) = take(data, N)?;
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(head);
    Ok((bytes, rest))
}

impl Wire for u8 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(*self);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (bytes, rest) = take_array::<1>(data)?;
        Ok((bytes[0], rest))
    }
}

impl Wire for i8 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_i8(*self);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (bytes, rest) = take_array::<1>(data)?;
        Ok((i8::from_le_bytes(bytes), rest))
    }
}

impl Wire for u16 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16_le(*self);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (bytes, rest) = take_array::<2>(data)?;
        Ok((u16::from_le_bytes(bytes), rest))
    }
}

impl Wire for u32 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u32_le(*self);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (bytes, rest) = take_array::<4>(data)?;
        Ok((u32::from_le_bytes(bytes), rest))
    }
}

impl<T: KnownValue> Wire for Open<T> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.raw());
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (raw, rest) = u8::decode(data)?;
        Ok((Open::from_raw(raw), rest))
    }
}

/// 16-bit network (short) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Nwk(pub u16);

impl fmt::Display for Nwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl Wire for Nwk {
    fn encode(&self, out: &mut Vec<u8>) {
        self.0.encode(out);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (value, rest) = u16::decode(data)?;
        Ok((Nwk(value), rest))
    }
}

/// 64-bit IEEE address, stored in wire (little-endian) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Ieee(pub [u8; 8]);

impl Ieee {
    /// Build from the conventional big-endian integer form.
    pub fn from_u64(value: u64) -> Self {
        Ieee(value.to_le_bytes())
    }

    /// The conventional big-endian integer form.
    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }
}

/// Displayed most significant byte first, `00:0d:6f:...`.
impl fmt::Display for Ieee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().rev().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for Ieee {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 8 {
            return Err(ProtocolError::InvalidData(format!(
                "ieee address needs 8 octets: {s}"
            )));
        }
        let mut bytes = [0u8; 8];
        for (slot, part) in bytes.iter_mut().rev().zip(parts) {
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| ProtocolError::InvalidData(format!("bad octet {part:?} in {s}")))?;
        }
        Ok(Ieee(bytes))
    }
}

impl Wire for Ieee {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_slice(&self.0);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (bytes, rest) = take_array::<8>(data)?;
        Ok((Ieee(bytes), rest))
    }
}

/// 128-bit security key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Key(pub [u8; 16]);

// Keys stay out of logs.
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

impl Wire for Key {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_slice(&self.0);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (bytes, rest) = take_array::<16>(data)?;
        Ok((Key(bytes), rest))
    }
}

/// Tagged address: a mode byte followed by the mode-specific address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Group address.
    Group(u16),
    /// Network address.
    Nwk(Nwk),
    /// IEEE address.
    Ieee(Ieee),
    /// Network address followed by the IEEE address.
    NwkAndIeee(Nwk, Ieee),
}

impl Address {
    /// Address mode byte.
    pub fn mode(&self) -> u8 {
        match self {
            Address::Group(_) => ADDRESS_MODE_GROUP,
            Address::Nwk(_) => ADDRESS_MODE_NWK,
            Address::Ieee(_) => ADDRESS_MODE_IEEE,
            Address::NwkAndIeee(_, _) => ADDRESS_MODE_NWK_AND_IEEE,
        }
    }

    /// Short address, if the mode carries one.
    pub fn nwk(&self) -> Option<Nwk> {
        match self {
            Address::Nwk(nwk) | Address::NwkAndIeee(nwk, _) => Some(*nwk),
            _ => None,
        }
    }

    /// IEEE address, if the mode carries one.
    pub fn ieee(&self) -> Option<Ieee> {
        match self {
            Address::Ieee(ieee) | Address::NwkAndIeee(_, ieee) => Some(*ieee),
            _ => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Group(group) => write!(f, "group 0x{:04X}", group),
            Address::Nwk(nwk) => write!(f, "{}", nwk),
            Address::Ieee(ieee) => write!(f, "{}", ieee),
            Address::NwkAndIeee(nwk, ieee) => write!(f, "{}/{}", nwk, ieee),
        }
    }
}

impl Wire for Address {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.mode());
        match self {
            Address::Group(group) => group.encode(out),
            Address::Nwk(nwk) => nwk.encode(out),
            Address::Ieee(ieee) => ieee.encode(out),
            Address::NwkAndIeee(nwk, ieee) => {
                nwk.encode(out);
                ieee.encode(out);
            }
        }
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (mode, rest) = u8::decode(data)?;
        match mode {
            ADDRESS_MODE_GROUP => {
                let (group, rest) = u16::decode(rest)?;
                Ok((Address::Group(group), rest))
            }
            ADDRESS_MODE_NWK => {
                let (nwk, rest) = Nwk::decode(rest)?;
                Ok((Address::Nwk(nwk), rest))
            }
            ADDRESS_MODE_IEEE => {
                let (ieee, rest) = Ieee::decode(rest)?;
                Ok((Address::Ieee(ieee), rest))
            }
            ADDRESS_MODE_NWK_AND_IEEE => {
                let (nwk, rest) = Nwk::decode(rest)?;
                let (ieee, rest) = Ieee::decode(rest)?;
                Ok((Address::NwkAndIeee(nwk, ieee), rest))
            }
            other => Err(ProtocolError::InvalidAddressMode(other)),
        }
    }
}

/// An [`Address`] plus endpoint.
///
/// Group addresses carry no endpoint on the wire; `endpoint` is ignored when
/// encoding them and decodes as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressEndpoint {
    /// Destination address.
    pub address: Address,
    /// Destination endpoint.
    pub endpoint: u8,
}

impl AddressEndpoint {
    /// Group destination.
    pub fn group(group: u16) -> Self {
        AddressEndpoint {
            address: Address::Group(group),
            endpoint: 0,
        }
    }

    /// Short-address destination.
    pub fn nwk(nwk: u16, endpoint: u8) -> Self {
        AddressEndpoint {
            address: Address::Nwk(Nwk(nwk)),
            endpoint,
        }
    }

    /// IEEE destination.
    pub fn ieee(ieee: Ieee, endpoint: u8) -> Self {
        AddressEndpoint {
            address: Address::Ieee(ieee),
            endpoint,
        }
    }
}

impl Wire for AddressEndpoint {
    fn encode(&self, out: &mut Vec<u8>) {
        self.address.encode(out);
        if !matches!(self.address, Address::Group(_)) {
            out.put_u8(self.endpoint);
        }
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (address, rest) = Address::decode(data)?;
        let (endpoint, rest) = match address {
            Address::Group(_) => (0, rest),
            _ => u8::decode(rest)?,
        };
        Ok((AddressEndpoint { address, endpoint }, rest))
    }
}

/// Count-prefixed list of short addresses (u8 count).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NwkList(pub Vec<Nwk>);

impl NwkList {
    /// Largest list the count byte can describe.
    pub const MAX_LEN: usize = u8::MAX as usize;
}

impl Wire for NwkList {
    /// Lists longer than [`NwkList::MAX_LEN`] are rejected by the schema
    /// layer before they get here.
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.0.len() as u8);
        for nwk in &self.0 {
            nwk.encode(out);
        }
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (count, mut rest) = u8::decode(data)?;
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (nwk, next) = Nwk::decode(rest)?;
            items.push(nwk);
            rest = next;
        }
        Ok((NwkList(items), rest))
    }
}

/// Bytes with a u16 length prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LvBytes(pub Vec<u8>);

impl LvBytes {
    /// Largest payload the length prefix can describe.
    pub const MAX_LEN: usize = u16::MAX as usize;
}

impl Wire for LvBytes {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u16_le(self.0.len() as u16);
        out.put_slice(&self.0);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (len, rest) = u16::decode(data)?;
        let (bytes, rest) = take(rest, len as usize)?;
        Ok((LvBytes(bytes.to_vec()), rest))
    }
}

/// Unprefixed bytes running to the end of the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl Wire for Bytes {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_slice(&self.0);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        Ok((Bytes(data.to_vec()), &data[data.len()..]))
    }
}

/// Endpoint description used when configuring firmware endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SimpleDescriptor {
    /// Endpoint number.
    pub endpoint: u8,
    /// Application profile id.
    pub profile: u16,
    /// Device type id.
    pub device_type: u16,
    /// Device version.
    pub device_version: u8,
    /// Server-side clusters.
    pub input_clusters: Vec<u16>,
    /// Client-side clusters.
    pub output_clusters: Vec<u16>,
}

fn encode_cluster_list(clusters: &[u16], out: &mut Vec<u8>) {
    out.put_u8(clusters.len() as u8);
    for cluster in clusters {
        out.put_u16_le(*cluster);
    }
}

fn decode_cluster_list(data: &[u8]) -> Result<(Vec<u16>, &[u8]), ProtocolError> {
    let (count, mut rest) = u8::decode(data)?;
    let mut clusters = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (cluster, next) = u16::decode(rest)?;
        clusters.push(cluster);
        rest = next;
    }
    Ok((clusters, rest))
}

impl Wire for SimpleDescriptor {
    fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.endpoint);
        out.put_u16_le(self.profile);
        out.put_u16_le(self.device_type);
        out.put_u8(self.device_version);
        encode_cluster_list(&self.input_clusters, out);
        encode_cluster_list(&self.output_clusters, out);
    }

    fn decode(data: &[u8]) -> Result<(Self, &[u8]), ProtocolError> {
        let (endpoint, rest) = u8::decode(data)?;
        let (profile, rest) = u16::decode(rest)?;
        let (device_type, rest) = u16::decode(rest)?;
        let (device_version, rest) = u8::decode(rest)?;
        let (input_clusters, rest) = decode_cluster_list(rest)?;
        let (output_clusters, rest) = decode_cluster_list(rest)?;
        Ok((
            SimpleDescriptor {
                endpoint,
                profile,
                device_type,
                device_version,
                input_clusters,
                output_clusters,
            },
            rest,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_little_endian() {
        assert_eq!(0x1234u16.to_bytes(), vec![0x34, 0x12]);
        assert_eq!(0x0102_0304u32.to_bytes(), vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!((-1i8).to_bytes(), vec![0xFF]);

        let (value, rest) = u16::decode(&[0x34, 0x12, 0xAA]).unwrap();
        assert_eq!(value, 0x1234);
        assert_eq!(rest, &[0xAA]);

        let (rssi, rest) = i8::decode(&[0xC4]).unwrap();
        assert_eq!(rssi, -60);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_short_input_is_eof() {
        assert_eq!(u32::decode(&[1, 2]), Err(ProtocolError::eof(4, 2)));
        assert!(Ieee::decode(&[0; 7]).is_err());
        assert!(LvBytes::decode(&[0x05, 0x00, 1, 2]).is_err());
        assert!(NwkList::decode(&[0x02, 0x01, 0x00]).is_err());
    }

    #[test]
    fn test_ieee_display_msb_first() {
        let ieee = Ieee([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(ieee.to_string(), "08:07:06:05:04:03:02:01");
        assert_eq!("08:07:06:05:04:03:02:01".parse::<Ieee>().unwrap(), ieee);
        assert_eq!(ieee.as_u64(), 0x0807_0605_0403_0201);
        assert_eq!(Ieee::from_u64(0x0807_0605_0403_0201), ieee);
        assert!("08:07".parse::<Ieee>().is_err());
    }

    #[test]
    fn test_address_modes() {
        let ieee = Ieee::from_u64(0x00212E_FFFF_0102_03);

        assert_eq!(Address::Group(0x0010).to_bytes(), vec![0x01, 0x10, 0x00]);
        assert_eq!(Address::Nwk(Nwk(0x1234)).to_bytes(), vec![0x02, 0x34, 0x12]);

        let encoded = Address::Ieee(ieee).to_bytes();
        assert_eq!(encoded[0], ADDRESS_MODE_IEEE);
        assert_eq!(&encoded[1..], &ieee.0);

        let both = Address::NwkAndIeee(Nwk(0xABCD), ieee);
        let encoded = both.to_bytes();
        assert_eq!(encoded.len(), 1 + 2 + 8);
        let (decoded, rest) = Address::decode(&encoded).unwrap();
        assert_eq!(decoded, both);
        assert!(rest.is_empty());
        assert_eq!(decoded.nwk(), Some(Nwk(0xABCD)));
        assert_eq!(decoded.ieee(), Some(ieee));
    }

    #[test]
    fn test_unknown_address_mode_is_error() {
        assert_eq!(
            Address::decode(&[0x09, 0x00, 0x00]),
            Err(ProtocolError::InvalidAddressMode(0x09))
        );
        assert_eq!(
            AddressEndpoint::decode(&[0x00]),
            Err(ProtocolError::InvalidAddressMode(0x00))
        );
    }

    #[test]
    fn test_address_endpoint_group_has_no_endpoint() {
        let group = AddressEndpoint::group(0x0001);
        assert_eq!(group.to_bytes(), vec![0x01, 0x01, 0x00]);

        let nwk = AddressEndpoint::nwk(0x0000, 0x01);
        assert_eq!(nwk.to_bytes(), vec![0x02, 0x00, 0x00, 0x01]);

        let (decoded, rest) = AddressEndpoint::decode(&[0x02, 0x00, 0x00, 0x01, 0xFF]).unwrap();
        assert_eq!(decoded, nwk);
        assert_eq!(rest, &[0xFF]);
    }

    #[test]
    fn test_lists_and_bytes() {
        let relays = NwkList(vec![Nwk(0x1111), Nwk(0x2222)]);
        assert_eq!(relays.to_bytes(), vec![0x02, 0x11, 0x11, 0x22, 0x22]);

        let lv = LvBytes(vec![0xAA, 0xBB]);
        assert_eq!(lv.to_bytes(), vec![0x02, 0x00, 0xAA, 0xBB]);

        let (rest_bytes, rest) = Bytes::decode(&[1, 2, 3]).unwrap();
        assert_eq!(rest_bytes, Bytes(vec![1, 2, 3]));
        assert!(rest.is_empty());
    }

    #[test]
    fn test_simple_descriptor() {
        let descriptor = SimpleDescriptor {
            endpoint: 1,
            profile: 0x0104,
            device_type: 0x0005,
            device_version: 0,
            input_clusters: vec![0x0000, 0x0006],
            output_clusters: vec![0x0019],
        };
        let encoded = descriptor.to_bytes();
        assert_eq!(
            encoded,
            vec![
                0x01, 0x04, 0x01, 0x05, 0x00, 0x00, 0x02, 0x00, 0x00, 0x06, 0x00, 0x01, 0x19,
                0x00
            ]
        );
        let (decoded, rest) = SimpleDescriptor::decode(&encoded).unwrap();
        assert_eq!(decoded, descriptor);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_key_debug_hides_material() {
        let key = Key([0x5A; 16]);
        assert_eq!(format!("{:?}", key), "Key(..)");
        assert_eq!(key.to_bytes().len(), 16);
    }
}
