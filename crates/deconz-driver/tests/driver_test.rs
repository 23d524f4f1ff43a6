//! Integration tests for the deCONZ driver.
//!
//! A scripted fake firmware sits on the far end of an in-memory duplex link
//! and answers the driver frame by frame. Timeout tests run on a paused
//! clock so they finish instantly.

use std::time::Duration;

use deconz_driver::transport::FrameTransport;
use deconz_driver::{
    ApsDataRequest, Deconz, DeviceConfig, DriverConfig, DriverError, Event, EventSink,
};
use deconz_protocol::{
    Address, AddressEndpoint, CommandId, DeviceState, Frame, Ieee, NetworkState, Nwk, Status,
    TxStatus, Value,
};
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Far end of the serial link.
struct FakeFirmware {
    link: FrameTransport<DuplexStream>,
}

impl FakeFirmware {
    /// Read the next request and check its command.
    async fn expect(&mut self, command: CommandId) -> Frame {
        let frame = self
            .link
            .next_frame()
            .await
            .expect("link read should succeed")
            .expect("driver should send a frame");
        assert_eq!(frame.command(), Some(command), "unexpected request {frame:?}");
        frame
    }

    /// Answer `request` with the given status and payload.
    async fn reply(&mut self, request: &Frame, status: u8, payload: Vec<u8>) {
        let frame = Frame {
            command_id: request.command_id,
            sequence: request.sequence,
            status,
            payload,
        };
        self.link.send(&frame).await.expect("reply should be written");
    }

    /// Push an unsolicited frame.
    async fn push(&mut self, command: CommandId, status: u8, payload: Vec<u8>) {
        let frame = Frame {
            command_id: command.into(),
            sequence: 0,
            status,
            payload,
        };
        self.link.send(&frame).await.expect("push should be written");
    }

    /// Assert the driver writes nothing for a while.
    async fn expect_silence(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(50), self.link.next_frame()).await;
        assert!(next.is_err(), "driver sent an unexpected frame: {next:?}");
    }
}

async fn connected(config: DriverConfig) -> (Deconz, FakeFirmware, UnboundedReceiver<Event>) {
    init_tracing();
    let (host, device) = duplex(4096);
    let (events, rx) = EventSink::channel();
    let mut api = Deconz::new(config, DeviceConfig::default(), events);
    api.connect_with(host).await;
    let firmware = FakeFirmware {
        link: FrameTransport::new(device),
    };
    (api, firmware, rx)
}

/// `aps_data_indication` response: nwk 0xC643 ep 1 -> nwk 0x0000 ep 1,
/// profile 0x0104, cluster 0x0000, lqi 255, rssi -47.
fn indication_payload() -> Vec<u8> {
    let mut payload = vec![0x3F, 0x00, 0x22, 0x02, 0x00, 0x00, 0x01, 0x02, 0x43, 0xC6, 0x01];
    payload.extend_from_slice(&[0x04, 0x01, 0x00, 0x00, 0x02, 0x00, 0x18, 0x1F]);
    payload.extend_from_slice(&[0x00, 0xAF, 0xFF, 0xBA, 0x19, 0x4E, 0x03, 0xD1]);
    payload
}

const DEVICE_STATE_REQUEST: [u8; 3] = [0x00, 0x00, 0x00];

// ============================================================================
// Command engine
// ============================================================================

#[tokio::test]
async fn test_device_state_round_trip() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

    let (result, ()) = tokio::join!(api.device_state(), async {
        let request = firmware.expect(CommandId::DeviceState).await;
        assert_eq!(request.payload, DEVICE_STATE_REQUEST);
        assert_eq!(request.status, 0);
        firmware.reply(&request, 0x00, vec![0x22, 0x00, 0x00]).await;
    });

    let (state, _, _) = result.expect("device_state should succeed");
    assert_eq!(state.network_state, NetworkState::Connected);
    assert!(state.request_slots_available());
    assert!(api.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_serialized() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

    let (a, b, c, ()) = tokio::join!(
        api.device_state(),
        api.device_state(),
        api.device_state(),
        async {
            let mut sequences = Vec::new();
            for _ in 0..3 {
                let request = firmware.expect(CommandId::DeviceState).await;
                // Nothing else goes out until this one is answered.
                firmware.expect_silence().await;
                sequences.push(request.sequence);
                firmware.reply(&request, 0x00, vec![0x02, 0x00, 0x00]).await;
            }
            assert_eq!(sequences, vec![0, 1, 2]);
        }
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_response_discarded() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;
    let args = [Value::U32(0)];

    let (result, request) = tokio::join!(
        api.send_command(CommandId::Version, &args),
        firmware.expect(CommandId::Version),
    );
    assert!(matches!(
        result,
        Err(DriverError::Timeout {
            command: CommandId::Version
        })
    ));

    // The late answer must not complete the next call.
    firmware
        .reply(&request, 0x00, vec![0xDD, 0x05, 0x34, 0x12])
        .await;

    let (result, ()) = tokio::join!(api.device_state(), async {
        let request = firmware.expect(CommandId::DeviceState).await;
        firmware.reply(&request, 0x00, vec![0x02, 0x00, 0x00]).await;
    });
    let (state, _, _) = result.expect("device_state after timeout");
    assert_eq!(state.network_state, NetworkState::Connected);
}

#[tokio::test]
async fn test_failure_status_reported() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

    let (result, ()) = tokio::join!(api.device_state(), async {
        let request = firmware.expect(CommandId::DeviceState).await;
        // Payload is not decodable; the status alone decides.
        firmware.reply(&request, 0x05, vec![0xFF]).await;
    });

    match result {
        Err(DriverError::Command { command, status }) => {
            assert_eq!(command, CommandId::DeviceState);
            assert_eq!(status, Status::Error);
        }
        other => panic!("expected command failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_busy_retried_four_times() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;
    let request = ApsDataRequest::new(
        0x00,
        AddressEndpoint::nwk(0x55AA, 0x01),
        0x0104,
        0x0007,
        0x01,
        b"aps payload".to_vec(),
    );

    let (result, ()) = tokio::join!(api.aps_data_request(&request), async {
        for _ in 0..4 {
            let frame = firmware.expect(CommandId::ApsDataRequest).await;
            firmware.reply(&frame, 0x02, vec![]).await;
        }
        firmware.expect_silence().await;
    });

    let err = result.expect_err("busy should surface after retries");
    assert!(err.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_busy_then_success() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;
    let mut request = ApsDataRequest::new(
        0x11,
        AddressEndpoint::group(0x0001),
        0x0104,
        0x0006,
        0x01,
        vec![0x01, 0x00, 0x02],
    );
    request.relays = Some(vec![Nwk(0x1234)]);

    let (result, ()) = tokio::join!(api.aps_data_request(&request), async {
        let frame = firmware.expect(CommandId::ApsDataRequest).await;
        firmware.reply(&frame, 0x02, vec![]).await;

        let frame = firmware.expect(CommandId::ApsDataRequest).await;
        // request id, then the relays flag
        assert_eq!(frame.payload[2], 0x11);
        assert_eq!(frame.payload[3], 0x02);
        firmware.reply(&frame, 0x00, vec![0x04, 0x00, 0x22, 0x11]).await;
    });

    result.expect("second attempt should succeed");
}

#[tokio::test]
async fn test_read_parameter() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

    let no_key: [Value; 0] = [];

    let (result, ()) = tokio::join!(api.read_parameter("nwk_panid", &no_key), async {
        let request = firmware.expect(CommandId::ReadParameter).await;
        assert_eq!(request.payload, vec![0x01, 0x00, 0x05]);
        firmware
            .reply(&request, 0x00, vec![0x03, 0x00, 0x05, 0xAA, 0x55])
            .await;
    });

    assert_eq!(result.expect("read_parameter"), vec![Value::U16(0x55AA)]);
}

#[tokio::test]
async fn test_write_parameter() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;
    let ieee: Ieee = "00:21:2e:ff:ff:05:73:17".parse().expect("valid ieee");
    let value = [Value::Ieee(ieee)];

    let (result, ()) = tokio::join!(
        api.write_parameter(0x08u8, &value),
        async {
            let request = firmware.expect(CommandId::WriteParameter).await;
            assert_eq!(&request.payload[..3], &[0x09, 0x00, 0x08]);
            assert_eq!(&request.payload[3..], &ieee.0);
            firmware.reply(&request, 0x00, vec![0x01, 0x00, 0x08]).await;
        }
    );

    result.expect("write_parameter");
}

#[tokio::test]
async fn test_unknown_parameter_writes_nothing() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

    let err = api
        .read_parameter("not_a_parameter", &[])
        .await
        .expect_err("unknown name");
    assert!(matches!(err, DriverError::UnknownParameter(_)));

    let err = api
        .write_parameter(0xEEu8, &[Value::U8(0)])
        .await
        .expect_err("unknown id");
    assert!(matches!(err, DriverError::UnknownParameter(_)));

    firmware.expect_silence().await;
}

#[tokio::test]
async fn test_version_selects_indication_flags() {
    let cases = [
        (0x010Au16, 0x1234_05DDu32, 0x01u8),
        (0x010B, 0x1234_05DD, 0x04),
        (0x010B, 0x1234_07DD, 0x01),
    ];

    for (protocol_version, version, flags) in cases {
        let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

        let (result, ()) = tokio::join!(api.version(), async {
            let request = firmware.expect(CommandId::ReadParameter).await;
            let mut payload = vec![0x03, 0x00, 0x22];
            payload.extend_from_slice(&protocol_version.to_le_bytes());
            firmware.reply(&request, 0x00, payload).await;

            let request = firmware.expect(CommandId::Version).await;
            firmware
                .reply(&request, 0x00, version.to_le_bytes().to_vec())
                .await;
        });

        assert_eq!(result.expect("version"), version);
        assert_eq!(api.indication_flags(), flags);
    }
}

#[tokio::test]
async fn test_change_network_state_and_add_neighbour() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;
    let ieee = Ieee::from_u64(0x0021_2EFF_FF05_7317);

    let (result, ()) = tokio::join!(api.change_network_state(NetworkState::Connected), async {
        let request = firmware.expect(CommandId::ChangeNetworkState).await;
        assert_eq!(request.payload, vec![0x02]);
        firmware.reply(&request, 0x00, vec![0x02]).await;
    });
    result.expect("change_network_state");

    let (result, ()) = tokio::join!(api.add_neighbour(Nwk(0x1234), ieee, 0x80), async {
        let request = firmware.expect(CommandId::AddNeighbour).await;
        assert_eq!(&request.payload[..5], &[0x0C, 0x00, 0x01, 0x34, 0x12]);
        assert_eq!(request.payload[13], 0x80);
        firmware.reply(&request, 0x00, request.payload.clone()).await;
    });
    result.expect("add_neighbour");
}

// ============================================================================
// Device state monitor
// ============================================================================

#[tokio::test]
async fn test_unsolicited_state_drains_indication() {
    let (api, mut firmware, mut events) = connected(DriverConfig::default()).await;

    // The status byte of an unsolicited frame is not a status.
    firmware
        .push(CommandId::DeviceStateChanged, 0xAB, vec![0x2A, 0x00])
        .await;

    let request = firmware.expect(CommandId::ApsDataIndication).await;
    assert_eq!(request.payload, vec![0x01, 0x00, 0x01]);
    firmware.reply(&request, 0x00, indication_payload()).await;

    match events.recv().await {
        Some(Event::ApsDataIndication(indication)) => {
            assert_eq!(indication.src, Address::Nwk(Nwk(0xC643)));
            assert_eq!(indication.dst, Address::Nwk(Nwk(0x0000)));
            assert_eq!(indication.profile_id, 0x0104);
            assert_eq!(indication.payload, vec![0x18, 0x1F]);
            assert_eq!(indication.lqi, 0xFF);
            assert_eq!(indication.rssi, -47);
        }
        other => panic!("expected indication, got {other:?}"),
    }
    drop(api);
}

#[tokio::test(start_paused = true)]
async fn test_indication_drain_not_duplicated() {
    let (api, mut firmware, mut events) = connected(DriverConfig::default()).await;

    firmware
        .push(CommandId::DeviceStateChanged, 0x00, vec![0x2A, 0x00])
        .await;
    firmware
        .push(CommandId::DeviceStateChanged, 0x00, vec![0x2A, 0x00])
        .await;

    let request = firmware.expect(CommandId::ApsDataIndication).await;
    firmware.expect_silence().await;
    firmware.reply(&request, 0x00, indication_payload()).await;

    assert!(matches!(
        events.recv().await,
        Some(Event::ApsDataIndication(_))
    ));
    firmware.expect_silence().await;
    drop(api);
}

#[tokio::test]
async fn test_confirm_drain_resolves_tracker() {
    let (api, mut firmware, mut events) = connected(DriverConfig::default()).await;
    let confirm = api.tx_confirms().register(7);

    firmware
        .push(CommandId::DeviceStateChanged, 0x00, vec![0x26, 0x00])
        .await;

    let request = firmware.expect(CommandId::ApsDataConfirm).await;
    assert_eq!(request.payload, vec![0x00, 0x00]);
    firmware
        .reply(
            &request,
            0x00,
            vec![
                0x0B, 0x00, 0x22, 0x07, 0x02, 0xFF, 0x26, 0x01, 0x01, 0xE9, 0x00, 0x00, 0x00, 0x00,
            ],
        )
        .await;

    match events.recv().await {
        Some(Event::ApsDataConfirm(event)) => {
            assert_eq!(event.request_id, 7);
            assert_eq!(event.dst, AddressEndpoint::nwk(0x26FF, 0x01));
        }
        other => panic!("expected confirm, got {other:?}"),
    }
    assert_eq!(confirm.await.expect("confirm delivered"), TxStatus::MacNoAck);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_drain_not_duplicated() {
    let (api, mut firmware, mut events) = connected(DriverConfig::default()).await;

    firmware
        .push(CommandId::DeviceStateChanged, 0x00, vec![0x26, 0x00])
        .await;
    firmware
        .push(CommandId::DeviceStateChanged, 0x00, vec![0x26, 0x00])
        .await;

    let request = firmware.expect(CommandId::ApsDataConfirm).await;
    firmware.expect_silence().await;
    firmware
        .reply(
            &request,
            0x00,
            vec![
                0x0B, 0x00, 0x22, 0x07, 0x02, 0xFF, 0x26, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
            ],
        )
        .await;

    assert!(matches!(
        events.recv().await,
        Some(Event::ApsDataConfirm(_))
    ));
    firmware.expect_silence().await;
    drop(api);
}

#[tokio::test]
async fn test_failed_indication_clears_flag() {
    let (api, mut firmware, _events) = connected(DriverConfig::default()).await;

    firmware
        .push(CommandId::DeviceStateChanged, 0x00, vec![0x2A, 0x00])
        .await;
    let request = firmware.expect(CommandId::ApsDataIndication).await;
    firmware
        .reply(&request, 0x00, vec![0x08, 0x00, 0x01, 0x00, 0x22])
        .await;

    // A fresh report starts a new drain once the failed one has finished.
    let monitor = api.monitor().expect("connected").clone();
    while monitor.indication_running() {
        tokio::task::yield_now().await;
    }
    monitor.handle_device_state(DeviceState::from_byte(0x2A));
    firmware.expect(CommandId::ApsDataIndication).await;
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_connection_lost_fails_pending_and_emits_once() {
    let (api, mut firmware, mut events) = connected(DriverConfig::default()).await;

    let (result, ()) = tokio::join!(api.device_state(), async {
        firmware.expect(CommandId::DeviceState).await;
        drop(firmware);
    });
    assert!(matches!(result, Err(DriverError::ConnectionLost)));

    assert!(matches!(
        events.recv().await,
        Some(Event::ConnectionLost(None))
    ));
    assert!(events.try_recv().is_err());

    assert!(matches!(
        api.device_state().await,
        Err(DriverError::NotConnected)
    ));
}

#[tokio::test]
async fn test_close_emits_nothing() {
    let (mut api, _firmware, mut events) = connected(DriverConfig::default()).await;
    assert!(api.is_connected());

    api.close().await;
    api.close().await;

    assert!(!api.is_connected());
    assert!(events.try_recv().is_err());
    assert!(matches!(
        api.device_state().await,
        Err(DriverError::NotConnected)
    ));
}

#[tokio::test]
async fn test_probe_answers() {
    init_tracing();
    let (host, device) = duplex(1024);
    let firmware = tokio::spawn(async move {
        let mut firmware = FakeFirmware {
            link: FrameTransport::new(device),
        };
        let request = firmware.expect(CommandId::DeviceState).await;
        firmware.reply(&request, 0x00, vec![0x00, 0x00, 0x00]).await;
    });

    assert!(Deconz::probe_with(host, DriverConfig::default()).await);
    firmware.await.expect("firmware task");
}

#[tokio::test(start_paused = true)]
async fn test_probe_silent_device() {
    init_tracing();
    let (host, _device) = duplex(1024);
    assert!(!Deconz::probe_with(host, DriverConfig::default()).await);
}

#[tokio::test]
async fn test_probe_missing_device() {
    init_tracing();
    let device = DeviceConfig::new("/dev/does-not-exist-deconz");
    assert!(!Deconz::probe(device, DriverConfig::default()).await);
}
