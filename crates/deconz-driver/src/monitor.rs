//! Device state monitor.
//!
//! Every frame that carries a device-state byte is fed to
//! [`DeviceStateMonitor::handle_device_state`]. When the firmware reports a
//! queued data confirm or indication the monitor starts a drain task that
//! reads it back, at most one drain of each kind at a time.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use deconz_protocol::{CommandId, DeviceState, Value, APS_DATA_INDICATION_FLAGS_DEFAULT};
use tracing::{debug, trace, warn};

use crate::confirm::TxConfirmTracker;
use crate::engine::{CommandClient, Handler, Handlers};
use crate::error::DriverError;
use crate::events::{ApsConfirm, ApsIndication, Event, EventSink};
use crate::metrics::metric_defs;

/// Commands whose decoded fields include the current device state.
const DEVICE_STATE_CARRIERS: [CommandId; 5] = [
    CommandId::DeviceState,
    CommandId::DeviceStateChanged,
    CommandId::ApsDataRequest,
    CommandId::ApsDataConfirm,
    CommandId::ApsDataIndication,
];

/// Unsolicited commands that are only logged.
const LOGGED_ONLY: [CommandId; 4] = [
    CommandId::MacPoll,
    CommandId::SimplifiedBeacon,
    CommandId::ZigbeeGreenPower,
    CommandId::AddNeighbour,
];

#[derive(Debug, Clone, Copy)]
enum Drain {
    Confirm,
    Indication,
}

impl Drain {
    fn label(self) -> &'static str {
        match self {
            Drain::Confirm => "confirm",
            Drain::Indication => "indication",
        }
    }
}

/// Clears a drain flag when the drain ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Watches device state and drains pending confirms and indications.
pub struct DeviceStateMonitor {
    client: CommandClient,
    events: EventSink,
    confirms: TxConfirmTracker,
    confirm_running: AtomicBool,
    indication_running: AtomicBool,
    indication_flags: Arc<AtomicU8>,
}

impl DeviceStateMonitor {
    /// Create a monitor issuing its reads through `client`.
    ///
    /// `indication_flags` is shared with the owner so a version negotiation
    /// can change it later.
    pub fn new(
        client: CommandClient,
        events: EventSink,
        confirms: TxConfirmTracker,
        indication_flags: Arc<AtomicU8>,
    ) -> Arc<Self> {
        Arc::new(DeviceStateMonitor {
            client,
            events,
            confirms,
            confirm_running: AtomicBool::new(false),
            indication_running: AtomicBool::new(false),
            indication_flags,
        })
    }

    /// A monitor with the default indication flags.
    pub fn with_default_flags(
        client: CommandClient,
        events: EventSink,
        confirms: TxConfirmTracker,
    ) -> Arc<Self> {
        Self::new(
            client,
            events,
            confirms,
            Arc::new(AtomicU8::new(APS_DATA_INDICATION_FLAGS_DEFAULT)),
        )
    }

    /// Flags byte sent with indication reads.
    pub fn indication_flags(&self) -> u8 {
        self.indication_flags.load(Ordering::SeqCst)
    }

    /// Change the flags byte sent with indication reads.
    pub fn set_indication_flags(&self, flags: u8) {
        self.indication_flags.store(flags, Ordering::SeqCst);
    }

    /// Whether a confirm drain is in progress.
    pub fn confirm_running(&self) -> bool {
        self.confirm_running.load(Ordering::SeqCst)
    }

    /// Whether an indication drain is in progress.
    pub fn indication_running(&self) -> bool {
        self.indication_running.load(Ordering::SeqCst)
    }

    /// React to a reported device state. Must be called from within a tokio
    /// runtime.
    pub fn handle_device_state(self: &Arc<Self>, state: DeviceState) {
        trace!(%state, "device state");

        if state.data_confirm() && claim(&self.confirm_running) {
            self.spawn_drain(Drain::Confirm);
        }
        if state.data_indication() && claim(&self.indication_running) {
            self.spawn_drain(Drain::Indication);
        }
    }

    fn spawn_drain(self: &Arc<Self>, drain: Drain) {
        ::metrics::counter!(metric_defs::DRAIN_STARTED.name, "kind" => drain.label()).increment(1);
        debug!(kind = drain.label(), "starting drain");

        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            match drain {
                Drain::Confirm => {
                    let _guard = RunningGuard(&monitor.confirm_running);
                    monitor.drain_confirm().await;
                }
                Drain::Indication => {
                    let _guard = RunningGuard(&monitor.indication_running);
                    monitor.drain_indication().await;
                }
            }
        });
    }

    async fn drain_confirm(&self) {
        let values = match self
            .client
            .send(CommandId::ApsDataConfirm, &[Value::U16(0)])
            .await
        {
            Ok(values) => values,
            Err(DriverError::Timeout { .. }) => {
                debug!("no APS data confirm retrieved before timeout");
                return;
            }
            Err(err) => {
                warn!(%err, "failed to read APS data confirm");
                return;
            }
        };

        match ApsConfirm::from_values(&values) {
            Ok(confirm) => {
                debug!(
                    request_id = confirm.request_id,
                    status = %confirm.status,
                    "APS data confirm"
                );
                self.confirms
                    .handle_tx_confirm(confirm.request_id, confirm.status);
                self.events.emit(Event::ApsDataConfirm(confirm));
            }
            Err(err) => warn!(%err, "malformed APS data confirm"),
        }
    }

    async fn drain_indication(&self) {
        let flags = self.indication_flags();
        let values = match self
            .client
            .send(
                CommandId::ApsDataIndication,
                &[Value::U16(1), Value::U8(flags)],
            )
            .await
        {
            Ok(values) => values,
            Err(DriverError::Timeout { .. }) => {
                debug!("no APS data indication retrieved before timeout");
                return;
            }
            Err(err) => {
                warn!(%err, "failed to read APS data indication");
                return;
            }
        };

        match ApsIndication::from_values(&values) {
            Ok(indication) => {
                debug!(
                    src = %indication.src,
                    profile = indication.profile_id,
                    cluster = indication.cluster_id,
                    len = indication.payload.len(),
                    "APS data indication"
                );
                self.events.emit(Event::ApsDataIndication(indication));
            }
            Err(err) => warn!(%err, "malformed APS data indication"),
        }
    }

    /// Handler table for the command engine.
    pub fn handlers(self: &Arc<Self>) -> Handlers {
        let mut handlers = Handlers::new();

        for command in DEVICE_STATE_CARRIERS {
            let monitor = Arc::clone(self);
            let handler: Handler = Arc::new(move |values: &[Value]| {
                if let Some(state) = values.iter().find_map(Value::as_device_state) {
                    monitor.handle_device_state(state);
                }
            });
            handlers.insert(command, handler);
        }

        for command in LOGGED_ONLY {
            let handler: Handler = Arc::new(move |values: &[Value]| {
                debug!(%command, ?values, "unsolicited frame");
            });
            handlers.insert(command, handler);
        }

        handlers
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}
