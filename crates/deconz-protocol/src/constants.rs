//! Protocol constants
//!
//! Byte values for the SLIP framing layer, frame geometry, addressing modes
//! and the flag bits used inside command payloads.

// ============================================================================
// SLIP framing
// ============================================================================

/// Frame delimiter, sent before and after every frame.
pub const SLIP_END: u8 = 0xC0;
/// Escape marker.
pub const SLIP_ESC: u8 = 0xDB;
/// Escaped form of [`SLIP_END`] (follows [`SLIP_ESC`]).
pub const SLIP_ESC_END: u8 = 0xDC;
/// Escaped form of [`SLIP_ESC`] (follows [`SLIP_ESC`]).
pub const SLIP_ESC_ESC: u8 = 0xDD;

// ============================================================================
// Frame geometry
// ============================================================================

/// Header: command id, sequence, status, frame length (2 bytes).
pub const FRAME_HEADER_SIZE: usize = 5;
/// Trailing 16-bit checksum.
pub const FRAME_CRC_SIZE: usize = 2;
/// Largest unescaped frame (header + payload + CRC) accepted from the wire.
pub const MAX_FRAME_SIZE: usize = 1024;

// ============================================================================
// Addressing
// ============================================================================

/// 16-bit group address.
pub const ADDRESS_MODE_GROUP: u8 = 0x01;
/// 16-bit network (short) address.
pub const ADDRESS_MODE_NWK: u8 = 0x02;
/// 64-bit IEEE (extended) address.
pub const ADDRESS_MODE_IEEE: u8 = 0x03;
/// Short address followed by the IEEE address.
pub const ADDRESS_MODE_NWK_AND_IEEE: u8 = 0x04;

// ============================================================================
// Device state bits
// ============================================================================

/// Mask for the 2-bit network state in the device state byte.
pub const DEVICE_STATE_NETWORK_MASK: u8 = 0x03;
/// An APS data confirm is waiting to be read.
pub const DEVICE_STATE_APSDE_DATA_CONFIRM: u8 = 0x04;
/// An APS data indication is waiting to be read.
pub const DEVICE_STATE_APSDE_DATA_INDICATION: u8 = 0x08;
/// The firmware configuration changed.
pub const DEVICE_STATE_CONF_CHANGED: u8 = 0x10;
/// The firmware has free APS data request slots.
pub const DEVICE_STATE_APSDE_DATA_REQUEST_SLOTS_AVAILABLE: u8 = 0x20;

// ============================================================================
// APS data request
// ============================================================================

/// No request flags.
pub const SEND_DATA_FLAGS_NONE: u8 = 0x00;
/// A relay (source route) list follows the radius byte.
pub const SEND_DATA_FLAGS_RELAYS: u8 = 0x02;

/// Use APS acknowledgements.
pub const TX_OPTIONS_ACK: u8 = 0x04;

/// Fixed part of the aps_data_request length field: request id, flags,
/// profile, cluster, source endpoint, payload length, tx options, radius.
pub const APS_DATA_REQUEST_FIXED_LEN: usize = 11;

// ============================================================================
// APS data indication
// ============================================================================

/// Default indication flags requested when draining indications.
pub const APS_DATA_INDICATION_FLAGS_DEFAULT: u8 = 0x01;
/// Indication flags requesting the extended (with IEEE) source address.
pub const APS_DATA_INDICATION_FLAGS_EXTENDED: u8 = 0x04;

// ============================================================================
// Version negotiation
// ============================================================================

/// First protocol version that accepts extended indication flags.
pub const PROTO_VER_APS_IND_FLAGS: u16 = 0x010B;
/// Platform byte of first-generation ConBee firmware.
pub const FIRMWARE_PLATFORM_CONBEE: u8 = 0x05;
