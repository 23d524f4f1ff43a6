//! Command identifiers.

use std::fmt;

/// Command id carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandId {
    ApsDataConfirm = 0x04,
    DeviceState = 0x07,
    ChangeNetworkState = 0x08,
    ReadParameter = 0x0A,
    WriteParameter = 0x0B,
    Version = 0x0D,
    DeviceStateChanged = 0x0E,
    ApsDataRequest = 0x12,
    ApsDataIndication = 0x17,
    ZigbeeGreenPower = 0x19,
    MacPoll = 0x1C,
    AddNeighbour = 0x1D,
    SimplifiedBeacon = 0x1F,
}

impl CommandId {
    /// Every command, in id order.
    pub const ALL: [CommandId; 13] = [
        CommandId::ApsDataConfirm,
        CommandId::DeviceState,
        CommandId::ChangeNetworkState,
        CommandId::ReadParameter,
        CommandId::WriteParameter,
        CommandId::Version,
        CommandId::DeviceStateChanged,
        CommandId::ApsDataRequest,
        CommandId::ApsDataIndication,
        CommandId::ZigbeeGreenPower,
        CommandId::MacPoll,
        CommandId::AddNeighbour,
        CommandId::SimplifiedBeacon,
    ];

    /// Look up a command by its wire id.
    pub fn from_u8(id: u8) -> Option<Self> {
        CommandId::ALL.into_iter().find(|cmd| *cmd as u8 == id)
    }

    /// Snake-case command name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            CommandId::ApsDataConfirm => "aps_data_confirm",
            CommandId::DeviceState => "device_state",
            CommandId::ChangeNetworkState => "change_network_state",
            CommandId::ReadParameter => "read_parameter",
            CommandId::WriteParameter => "write_parameter",
            CommandId::Version => "version",
            CommandId::DeviceStateChanged => "device_state_changed",
            CommandId::ApsDataRequest => "aps_data_request",
            CommandId::ApsDataIndication => "aps_data_indication",
            CommandId::ZigbeeGreenPower => "zigbee_green_power",
            CommandId::MacPoll => "mac_poll",
            CommandId::AddNeighbour => "add_neighbour",
            CommandId::SimplifiedBeacon => "simplified_beacon",
        }
    }
}

impl From<CommandId> for u8 {
    fn from(cmd: CommandId) -> Self {
        cmd as u8
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
