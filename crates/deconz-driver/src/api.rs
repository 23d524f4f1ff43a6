//! Public driver API.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use deconz_protocol::{
    AddressEndpoint, CommandId, DeviceState, Ieee, NetworkParameter, NetworkState, Nwk, NwkList,
    ParameterKey, ProtocolError, Value, APS_DATA_INDICATION_FLAGS_DEFAULT,
    APS_DATA_INDICATION_FLAGS_EXTENDED, APS_DATA_REQUEST_FIXED_LEN, FIRMWARE_PLATFORM_CONBEE,
    PROTO_VER_APS_IND_FLAGS, SEND_DATA_FLAGS_NONE, SEND_DATA_FLAGS_RELAYS, TX_OPTIONS_ACK,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::{DeviceConfig, DriverConfig};
use crate::confirm::TxConfirmTracker;
use crate::engine::{spawn_worker, CommandClient, WorkerHandle};
use crate::error::DriverError;
use crate::events::EventSink;
use crate::metrics::metric_defs;
use crate::monitor::DeviceStateMonitor;
use crate::transport;
use crate::Result;

/// An outgoing APS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApsDataRequest {
    /// Id echoed back in the data confirm.
    pub request_id: u8,
    /// Destination address and endpoint.
    pub dst: AddressEndpoint,
    /// Application profile.
    pub profile_id: u16,
    /// Cluster.
    pub cluster_id: u16,
    /// Source endpoint.
    pub src_ep: u8,
    /// APS payload.
    pub payload: Vec<u8>,
    /// Transmit options.
    pub tx_options: u8,
    /// Maximum hops; 0 lets the stack choose.
    pub radius: u8,
    /// Source route. Empty or `None` sends without one.
    pub relays: Option<Vec<Nwk>>,
}

impl ApsDataRequest {
    /// A request with APS acknowledgement, default radius and no source route.
    pub fn new(
        request_id: u8,
        dst: AddressEndpoint,
        profile_id: u16,
        cluster_id: u16,
        src_ep: u8,
        payload: Vec<u8>,
    ) -> Self {
        ApsDataRequest {
            request_id,
            dst,
            profile_id,
            cluster_id,
            src_ep,
            payload,
            tx_options: TX_OPTIONS_ACK,
            radius: 0,
            relays: None,
        }
    }

    /// Field values for the `aps_data_request` command.
    fn to_values(&self) -> Result<Vec<Value>> {
        let relays = self
            .relays
            .as_ref()
            .filter(|relays| !relays.is_empty())
            .map(|relays| Value::NwkList(NwkList(relays.clone())));
        let dst = Value::AddressEndpoint(self.dst);

        let length = dst.encoded_len()
            + self.payload.len()
            + APS_DATA_REQUEST_FIXED_LEN
            + relays.as_ref().map_or(0, Value::encoded_len);
        let flags = if relays.is_some() {
            SEND_DATA_FLAGS_RELAYS
        } else {
            SEND_DATA_FLAGS_NONE
        };

        let mut values = vec![
            Value::U16(length_field(length)?),
            Value::U8(self.request_id),
            Value::U8(flags),
            dst,
            Value::U16(self.profile_id),
            Value::U16(self.cluster_id),
            Value::U8(self.src_ep),
            Value::LvBytes(self.payload.clone()),
            Value::U8(self.tx_options),
            Value::U8(self.radius),
        ];
        values.extend(relays);
        Ok(values)
    }
}

fn length_field(length: usize) -> Result<u16> {
    u16::try_from(length).map_err(|_| {
        ProtocolError::FrameTooLong {
            max: usize::from(u16::MAX),
            actual: length,
        }
        .into()
    })
}

fn missing(what: &str) -> DriverError {
    ProtocolError::InvalidData(format!("response missing {what}")).into()
}

/// Indication flags for a firmware, from its protocol version and version
/// word.
pub fn indication_flags_for(protocol_version: u16, version: u32) -> u8 {
    let platform = ((version >> 8) & 0xFF) as u8;
    if protocol_version >= PROTO_VER_APS_IND_FLAGS && platform == FIRMWARE_PLATFORM_CONBEE {
        APS_DATA_INDICATION_FLAGS_EXTENDED
    } else {
        APS_DATA_INDICATION_FLAGS_DEFAULT
    }
}

struct Link {
    client: CommandClient,
    monitor: Arc<DeviceStateMonitor>,
    worker: WorkerHandle,
}

/// A deCONZ coprocessor session.
///
/// ```rust,ignore
/// use deconz_driver::{Deconz, DeviceConfig, DriverConfig, EventSink};
///
/// let (events, mut rx) = EventSink::channel();
/// let mut api = Deconz::new(DriverConfig::default(), DeviceConfig::new("/dev/ttyACM0"), events);
/// api.connect().await?;
/// let (state, _, _) = api.device_state().await?;
/// println!("{state}");
/// ```
pub struct Deconz {
    config: DriverConfig,
    device: DeviceConfig,
    events: EventSink,
    confirms: TxConfirmTracker,
    indication_flags: Arc<AtomicU8>,
    link: Option<Link>,
}

impl Deconz {
    /// Create an unconnected session.
    pub fn new(config: DriverConfig, device: DeviceConfig, events: EventSink) -> Self {
        Deconz {
            config,
            device,
            events,
            confirms: TxConfirmTracker::new(),
            indication_flags: Arc::new(AtomicU8::new(APS_DATA_INDICATION_FLAGS_DEFAULT)),
            link: None,
        }
    }

    /// Open the configured serial device and start the command worker.
    pub async fn connect(&mut self) -> Result<()> {
        let io = transport::open(&self.device)?;
        self.connect_with(io).await;
        info!(path = %self.device.path, "connected");
        Ok(())
    }

    /// Start the command worker on an already open byte stream. Any previous
    /// link is closed first.
    pub async fn connect_with<T>(&mut self, io: T)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.close().await;

        let (client, queue) =
            CommandClient::channel(self.config.request_queue_depth, self.config.command_timeout());
        let monitor = DeviceStateMonitor::new(
            client.clone(),
            self.events.clone(),
            self.confirms.clone(),
            Arc::clone(&self.indication_flags),
        );
        let worker = spawn_worker(io, queue, monitor.handlers(), self.events.clone());

        self.link = Some(Link {
            client,
            monitor,
            worker,
        });
    }

    /// Stop the worker and release the link. Does nothing when not connected.
    pub async fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.worker.shutdown().await;
            info!("closed");
        }
    }

    /// Whether the link is open and its worker alive.
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.worker.is_running() && !link.client.is_closed())
    }

    fn client(&self) -> Result<&CommandClient> {
        self.link
            .as_ref()
            .map(|link| &link.client)
            .ok_or(DriverError::NotConnected)
    }

    /// Tracker resolving APS data requests by request id.
    pub fn tx_confirms(&self) -> &TxConfirmTracker {
        &self.confirms
    }

    /// Current indication flags byte.
    pub fn indication_flags(&self) -> u8 {
        self.indication_flags.load(Ordering::SeqCst)
    }

    /// The device state monitor of the current link.
    pub fn monitor(&self) -> Option<&Arc<DeviceStateMonitor>> {
        self.link.as_ref().map(|link| &link.monitor)
    }

    /// Send any command and return its decoded response fields.
    pub async fn send_command(&self, command: CommandId, values: &[Value]) -> Result<Vec<Value>> {
        self.client()?.send(command, values).await
    }

    /// Read device state. Also feeds the device state monitor.
    pub async fn device_state(&self) -> Result<(DeviceState, u8, u8)> {
        let values = self
            .send_command(
                CommandId::DeviceState,
                &[Value::U8(0), Value::U8(0), Value::U8(0)],
            )
            .await?;
        match values.as_slice() {
            [Value::DeviceState(state), Value::U8(a), Value::U8(b)] => Ok((*state, *a, *b)),
            _ => Err(missing("device state")),
        }
    }

    /// Read a network parameter, by name, id or enum. `args` are the key
    /// fields some parameters take (e.g. an endpoint index).
    pub async fn read_parameter(
        &self,
        key: impl Into<ParameterKey>,
        args: &[Value],
    ) -> Result<Vec<Value>> {
        let key = key.into();
        let param = key
            .resolve()
            .ok_or_else(|| DriverError::UnknownParameter(key.to_string()))?;
        let data = param.encode_read(args)?;

        let values = self
            .send_command(
                CommandId::ReadParameter,
                &[
                    Value::U16(length_field(1 + data.len())?),
                    Value::U8(param.id()),
                    Value::Bytes(data),
                ],
            )
            .await?;

        if values.get(1).and_then(Value::as_u8) != Some(param.id()) {
            warn!(%param, ?values, "read_parameter response for a different parameter");
        }
        let data = values
            .get(2)
            .and_then(Value::as_bytes)
            .ok_or_else(|| missing("parameter data"))?;
        let value = param.decode_value(data)?;
        debug!(%param, ?value, "read parameter");
        Ok(value)
    }

    /// Write a network parameter.
    pub async fn write_parameter(&self, key: impl Into<ParameterKey>, values: &[Value]) -> Result<()> {
        let key = key.into();
        let param = key
            .resolve()
            .ok_or_else(|| DriverError::UnknownParameter(key.to_string()))?;
        let data = param.encode_write(values)?;

        self.send_command(
            CommandId::WriteParameter,
            &[
                Value::U16(length_field(1 + data.len())?),
                Value::U8(param.id()),
                Value::Bytes(data),
            ],
        )
        .await?;
        debug!(%param, ?values, "wrote parameter");
        Ok(())
    }

    /// Queue an APS frame for transmission, retrying while the firmware
    /// reports it is busy.
    ///
    /// Delivery is reported later through a data confirm; use
    /// [`Deconz::tx_confirms`] to wait for it.
    pub async fn aps_data_request(&self, request: &ApsDataRequest) -> Result<()> {
        let values = request.to_values()?;
        let delays = self.config.busy_retry_delays();
        let mut attempt = 0;

        loop {
            match self.send_command(CommandId::ApsDataRequest, &values).await {
                Err(err) if err.is_busy() && attempt < delays.len() => {
                    let delay = delays[attempt];
                    attempt += 1;
                    ::metrics::counter!(metric_defs::APS_BUSY_RETRIES.name).increment(1);
                    debug!(
                        request_id = request.request_id,
                        attempt,
                        ?delay,
                        "firmware busy, retrying APS data request"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result.map(|_| ()),
            }
        }
    }

    /// Firmware protocol version.
    pub async fn protocol_version(&self) -> Result<u16> {
        let values = self
            .read_parameter(NetworkParameter::ProtocolVersion, &[])
            .await?;
        values
            .first()
            .and_then(Value::as_u16)
            .ok_or_else(|| missing("protocol version"))
    }

    /// Firmware version word. Also selects the indication flags the firmware
    /// understands.
    pub async fn version(&self) -> Result<u32> {
        let protocol_version = self.protocol_version().await?;
        let values = self
            .send_command(CommandId::Version, &[Value::U32(0)])
            .await?;
        let version = values
            .first()
            .and_then(Value::as_u32)
            .ok_or_else(|| missing("version"))?;

        let flags = indication_flags_for(protocol_version, version);
        self.indication_flags.store(flags, Ordering::SeqCst);
        info!(
            version = format_args!("0x{version:08X}"),
            protocol_version = format_args!("0x{protocol_version:04X}"),
            indication_flags = flags,
            "firmware version"
        );
        Ok(version)
    }

    /// Ask the firmware to join or leave the network.
    pub async fn change_network_state(&self, state: NetworkState) -> Result<()> {
        self.send_command(CommandId::ChangeNetworkState, &[Value::U8(state.into())])
            .await?;
        Ok(())
    }

    /// Add a device to the firmware's neighbour table.
    pub async fn add_neighbour(&self, nwk: Nwk, ieee: Ieee, mac_capability_flags: u8) -> Result<()> {
        self.send_command(
            CommandId::AddNeighbour,
            &[
                Value::U16(12),
                Value::U8(1),
                Value::Nwk(nwk),
                Value::Ieee(ieee),
                Value::U8(mac_capability_flags),
            ],
        )
        .await?;
        Ok(())
    }

    /// Whether a deCONZ device answers at `device`. Never fails: open errors
    /// and timeouts report `false`.
    pub async fn probe(device: DeviceConfig, config: DriverConfig) -> bool {
        match transport::open(&device) {
            Ok(io) => Self::probe_with(io, config).await,
            Err(err) => {
                debug!(%err, "probe failed to open device");
                false
            }
        }
    }

    /// As [`Deconz::probe`], over an already open byte stream.
    pub async fn probe_with<T>(io: T, config: DriverConfig) -> bool
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let timeout = config.probe_timeout();
        let mut api = Deconz::new(config, DeviceConfig::default(), EventSink::none());
        api.connect_with(io).await;

        let result = match api.client() {
            Ok(client) => {
                client
                    .send_with_timeout(
                        CommandId::DeviceState,
                        &[Value::U8(0), Value::U8(0), Value::U8(0)],
                        timeout,
                    )
                    .await
            }
            Err(err) => Err(err),
        };
        api.close().await;

        match result {
            Ok(_) => true,
            Err(err) => {
                debug!(%err, "probe got no device state");
                false
            }
        }
    }
}
