//! Status codes with forward-compatible decoding.
//!
//! Firmware revisions add status codes over time, so every status byte is
//! decoded into an [`Open`] value: either a variant the driver knows, or an
//! [`Open::Undefined`] carrying the raw byte. Neither direction can fail.

use std::borrow::Cow;
use std::fmt;

/// A closed set of known values for an open byte-sized enumeration.
pub trait KnownValue: Copy + Eq + fmt::Debug {
    /// Look up a known variant.
    fn from_raw(raw: u8) -> Option<Self>;
    /// The byte this variant encodes to.
    fn raw(self) -> u8;
    /// Protocol name of the variant, e.g. `APS_NO_ACK`.
    fn name(self) -> &'static str;
}

/// A byte-sized enumeration value that tolerates unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Open<T> {
    /// A value the driver knows.
    Known(T),
    /// A value outside the known set, kept verbatim.
    Undefined(u8),
}

impl<T: KnownValue> Open<T> {
    /// Decode a raw byte.
    pub fn from_raw(raw: u8) -> Self {
        match T::from_raw(raw) {
            Some(known) => Open::Known(known),
            None => Open::Undefined(raw),
        }
    }

    /// The raw byte.
    pub fn raw(&self) -> u8 {
        match self {
            Open::Known(known) => known.raw(),
            Open::Undefined(raw) => *raw,
        }
    }

    /// Protocol name, or `undefined_0x..` for unknown values.
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Open::Known(known) => Cow::Borrowed(known.name()),
            Open::Undefined(raw) => Cow::Owned(format!("undefined_0x{:02x}", raw)),
        }
    }

    /// The known variant, if any.
    pub fn known(&self) -> Option<T> {
        match self {
            Open::Known(known) => Some(*known),
            Open::Undefined(_) => None,
        }
    }

    /// Whether this is an undefined value.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Open::Undefined(_))
    }
}

impl<T: KnownValue> From<u8> for Open<T> {
    fn from(raw: u8) -> Self {
        Open::from_raw(raw)
    }
}

impl<T: KnownValue> From<Open<T>> for u8 {
    fn from(value: Open<T>) -> Self {
        value.raw()
    }
}

impl<T: KnownValue> PartialEq<T> for Open<T> {
    fn eq(&self, other: &T) -> bool {
        self.known() == Some(*other)
    }
}

impl<T: KnownValue> fmt::Display for Open<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

macro_rules! known_values {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl KnownValue for $name {
            fn from_raw(raw: u8) -> Option<Self> {
                match raw {
                    $( $value => Some($name::$variant), )+
                    _ => None,
                }
            }

            fn raw(self) -> u8 {
                match self {
                    $( $name::$variant => $value, )+
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }

        impl From<$name> for Open<$name> {
            fn from(value: $name) -> Self {
                Open::Known(value)
            }
        }
    };
}

known_values! {
    /// Status byte carried by every solicited response.
    pub enum Status {
        /// Command succeeded.
        Success = 0x00 => "SUCCESS",
        /// Generic failure.
        Failure = 0x01 => "FAILURE",
        /// Firmware is busy, try again later.
        Busy = 0x02 => "BUSY",
        /// Firmware-side timeout.
        Timeout = 0x03 => "TIMEOUT",
        /// Command or parameter not supported.
        Unsupported = 0x04 => "UNSUPPORTED",
        /// Internal error.
        Error = 0x05 => "ERROR",
        /// No network.
        NoNetwork = 0x06 => "NO_NETWORK",
        /// Invalid argument value.
        InvalidValue = 0x07 => "INVALID_VALUE",
    }
}

known_values! {
    /// Delivery status of an APS data request, reported in the data confirm.
    pub enum TxStatus {
        Success = 0x00 => "SUCCESS",

        // MAC layer
        MacPanAtCapacity = 0x01 => "MAC_PAN_AT_CAPACITY",
        MacPanAccessDenied = 0x02 => "MAC_PAN_ACCESS_DENIED",
        MacCounterError = 0xDB => "MAC_COUNTER_ERROR",
        MacImproperKeyType = 0xDC => "MAC_IMPROPER_KEY_TYPE",
        MacImproperSecurityLevel = 0xDD => "MAC_IMPROPER_SECURITY_LEVEL",
        MacUnsupportedLegacy = 0xDE => "MAC_UNSUPPORTED_LEGACY",
        MacUnsupportedSecurity = 0xDF => "MAC_UNSUPPORTED_SECURITY",
        MacBeaconLoss = 0xE0 => "MAC_BEACON_LOSS",
        MacChannelAccessFailure = 0xE1 => "MAC_CHANNEL_ACCESS_FAILURE",
        MacDenied = 0xE2 => "MAC_DENIED",
        MacDisableTrxFailure = 0xE3 => "MAC_DISABLE_TRX_FAILURE",
        MacSecurityError = 0xE4 => "MAC_SECURITY_ERROR",
        MacFrameTooLong = 0xE5 => "MAC_FRAME_TOO_LONG",
        MacInvalidGts = 0xE6 => "MAC_INVALID_GTS",
        MacInvalidHandle = 0xE7 => "MAC_INVALID_HANDLE",
        MacInvalidParameter = 0xE8 => "MAC_INVALID_PARAMETER",
        MacNoAck = 0xE9 => "MAC_NO_ACK",
        MacNoBeacon = 0xEA => "MAC_NO_BEACON",
        MacNoData = 0xEB => "MAC_NO_DATA",
        MacNoShortAddress = 0xEC => "MAC_NO_SHORT_ADDRESS",
        MacOutOfCap = 0xED => "MAC_OUT_OF_CAP",
        MacPanIdConflict = 0xEE => "MAC_PAN_ID_CONFLICT",
        MacRealignment = 0xEF => "MAC_REALIGNMENT",
        MacTransactionExpired = 0xF0 => "MAC_TRANSACTION_EXPIRED",
        MacTransactionOverflow = 0xF1 => "MAC_TRANSACTION_OVERFLOW",
        MacTxActive = 0xF2 => "MAC_TX_ACTIVE",
        MacUnavailableKey = 0xF3 => "MAC_UNAVAILABLE_KEY",
        MacUnsupportedAttribute = 0xF4 => "MAC_UNSUPPORTED_ATTRIBUTE",
        MacInvalidAddress = 0xF5 => "MAC_INVALID_ADDRESS",
        MacOnTimeTooLong = 0xF6 => "MAC_ON_TIME_TOO_LONG",
        MacPastTime = 0xF7 => "MAC_PAST_TIME",
        MacTrackingOff = 0xF8 => "MAC_TRACKING_OFF",
        MacInvalidIndex = 0xF9 => "MAC_INVALID_INDEX",
        MacLimitReached = 0xFA => "MAC_LIMIT_REACHED",
        MacReadOnly = 0xFB => "MAC_READ_ONLY",
        MacScanInProgress = 0xFC => "MAC_SCAN_IN_PROGRESS",
        MacSuperframeOverlap = 0xFD => "MAC_SUPERFRAME_OVERLAP",

        // NWK layer
        NwkInvalidParameter = 0xC1 => "NWK_INVALID_PARAMETER",
        NwkInvalidRequest = 0xC2 => "NWK_INVALID_REQUEST",
        NwkNotPermitted = 0xC3 => "NWK_NOT_PERMITTED",
        NwkStartupFailure = 0xC4 => "NWK_STARTUP_FAILURE",
        NwkAlreadyPresent = 0xC5 => "NWK_ALREADY_PRESENT",
        NwkSyncFailure = 0xC6 => "NWK_SYNC_FAILURE",
        NwkNeighborTableFull = 0xC7 => "NWK_NEIGHBOR_TABLE_FULL",
        NwkUnknownDevice = 0xC8 => "NWK_UNKNOWN_DEVICE",
        NwkUnsupportedAttribute = 0xC9 => "NWK_UNSUPPORTED_ATTRIBUTE",
        NwkNoNetworks = 0xCA => "NWK_NO_NETWORKS",
        NwkMaxFrmCounter = 0xCC => "NWK_MAX_FRM_COUNTER",
        NwkNoKey = 0xCD => "NWK_NO_KEY",
        NwkBadCcmOutput = 0xCE => "NWK_BAD_CCM_OUTPUT",
        NwkNoRoutingCapacity = 0xCF => "NWK_NO_ROUTING_CAPACITY",
        NwkRouteDiscoveryFailed = 0xD0 => "NWK_ROUTE_DISCOVERY_FAILED",
        NwkRouteError = 0xD1 => "NWK_ROUTE_ERROR",
        NwkBtTableFull = 0xD2 => "NWK_BT_TABLE_FULL",
        NwkFrameNotBuffered = 0xD3 => "NWK_FRAME_NOT_BUFFERED",

        // APS layer
        ApsAsduTooLong = 0xA0 => "APS_ASDU_TOO_LONG",
        ApsDefragDeferred = 0xA1 => "APS_DEFRAG_DEFERRED",
        ApsDefragUnsupported = 0xA2 => "APS_DEFRAG_UNSUPPORTED",
        ApsIllegalRequest = 0xA3 => "APS_ILLEGAL_REQUEST",
        ApsInvalidBinding = 0xA4 => "APS_INVALID_BINDING",
        ApsInvalidGroup = 0xA5 => "APS_INVALID_GROUP",
        ApsInvalidParameter = 0xA6 => "APS_INVALID_PARAMETER",
        ApsNoAck = 0xA7 => "APS_NO_ACK",
        ApsNoBoundDevice = 0xA8 => "APS_NO_BOUND_DEVICE",
        ApsNoShortAddress = 0xA9 => "APS_NO_SHORT_ADDRESS",
        ApsNotSupported = 0xAA => "APS_NOT_SUPPORTED",
        ApsSecuredLinkKey = 0xAB => "APS_SECURED_LINK_KEY",
        ApsSecuredNwkKey = 0xAC => "APS_SECURED_NWK_KEY",
        ApsSecurityFail = 0xAD => "APS_SECURITY_FAIL",
        ApsTableFull = 0xAE => "APS_TABLE_FULL",
        ApsUnsecured = 0xAF => "APS_UNSECURED",
        ApsUnsupportedAttribute = 0xB0 => "APS_UNSUPPORTED_ATTRIBUTE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_status_names() {
        let cases = [
            (0x00, "SUCCESS"),
            (0xA0, "APS_ASDU_TOO_LONG"),
            (0x01, "MAC_PAN_AT_CAPACITY"),
            (0xC9, "NWK_UNSUPPORTED_ATTRIBUTE"),
            (0xFE, "undefined_0xfe"),
        ];

        for (raw, name) in cases {
            let status = Open::<TxStatus>::from_raw(raw);
            assert_eq!(status.raw(), raw);
            assert_eq!(status.name(), name);
            assert_eq!(status.to_string(), name);
        }
    }

    #[test]
    fn test_undefined_value_is_not_an_error() {
        let status = Open::<TxStatus>::from_raw(0xFE);
        assert_eq!(status, Open::Undefined(0xFE));
        assert!(status.is_undefined());
        assert_eq!(u8::from(status), 0xFE);
    }

    #[test]
    fn test_every_byte_round_trips() {
        for raw in 0..=u8::MAX {
            assert_eq!(Open::<Status>::from_raw(raw).raw(), raw);
            assert_eq!(Open::<TxStatus>::from_raw(raw).raw(), raw);
        }
    }

    #[test]
    fn test_compare_with_known() {
        let busy: Open<Status> = 0x02.into();
        assert_eq!(busy, Status::Busy);
        assert!(busy != Status::Success);
        assert!(Open::<Status>::Undefined(0x42) != Status::Success);
    }
}
