//! Command engine.
//!
//! One worker task per connection owns the [`FrameTransport`], the sequence
//! counter and the single pending-call slot. Callers hold a cloneable
//! [`CommandClient`] that encodes arguments and queues requests on an mpsc
//! channel; the worker takes the next request only once the previous one has
//! been answered, timed out or abandoned, so at most one command is ever in
//! flight.
//!
//! Inbound frames are demultiplexed by [`Correlator::dispatch`]: responses
//! complete the pending call, unsolicited frames go to the registered
//! handler, everything else is logged and dropped.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use deconz_protocol::{
    decode_command, encode_command, is_solicited, CommandId, Frame, Open, Status, Value,
    FRAME_CRC_SIZE, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::events::{Event, EventSink};
use crate::metrics::metric_defs;
use crate::transport::FrameTransport;
use crate::Result;

/// Callback for decoded frames of one command.
pub type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Handler table, keyed by command.
pub type Handlers = HashMap<CommandId, Handler>;

type Reply = oneshot::Sender<Result<Vec<Value>>>;

/// A queued command.
struct Request {
    command: CommandId,
    payload: Vec<u8>,
    timeout: Duration,
    reply: Reply,
}

/// Receiving end of the request queue, handed to [`spawn_worker`].
pub struct RequestQueue {
    rx: mpsc::Receiver<Request>,
}

/// Handle for issuing commands to a connection's worker.
#[derive(Clone)]
pub struct CommandClient {
    requests: mpsc::Sender<Request>,
    timeout: Duration,
}

impl fmt::Debug for CommandClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandClient")
            .field("timeout", &self.timeout)
            .field("closed", &self.requests.is_closed())
            .finish()
    }
}

impl CommandClient {
    /// Create a client and the queue its requests land on.
    pub fn channel(depth: usize, timeout: Duration) -> (CommandClient, RequestQueue) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (
            CommandClient {
                requests: tx,
                timeout,
            },
            RequestQueue { rx },
        )
    }

    /// Send a command and wait for its decoded response.
    pub async fn send(&self, command: CommandId, values: &[Value]) -> Result<Vec<Value>> {
        self.send_with_timeout(command, values, self.timeout).await
    }

    /// As [`CommandClient::send`], with a per-call timeout.
    ///
    /// Arguments are checked against the command's transmit schema before
    /// anything is queued. Dropping the returned future abandons the call.
    pub async fn send_with_timeout(
        &self,
        command: CommandId,
        values: &[Value],
        timeout: Duration,
    ) -> Result<Vec<Value>> {
        let payload = encode_command(command, values)?;
        let frame_len = FRAME_HEADER_SIZE + payload.len() + FRAME_CRC_SIZE;
        if frame_len > MAX_FRAME_SIZE {
            return Err(deconz_protocol::ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: frame_len,
            }
            .into());
        }

        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request {
                command,
                payload,
                timeout,
                reply,
            })
            .await
            .map_err(|_| DriverError::NotConnected)?;

        // The worker always answers before dropping a request it accepted.
        response.await.map_err(|_| DriverError::NotConnected)?
    }

    /// Whether the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }
}

struct PendingCall {
    command: CommandId,
    sequence: u8,
    deadline: Instant,
    reply: Reply,
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Command id not in the receive table.
    UnknownCommand(u8),
    /// A response nobody is waiting for.
    Unmatched(CommandId),
    /// Response completed the pending call.
    Resolved(CommandId),
    /// Response carried a failure status; the call failed without decoding.
    Failed(CommandId, Open<Status>),
    /// Payload did not match the receive schema.
    Malformed(CommandId),
    /// Unsolicited frame decoded and dispatched.
    Unsolicited(CommandId),
}

/// Sequence numbering and the pending-call slot.
#[derive(Default)]
pub struct Correlator {
    next_sequence: u8,
    pending: Option<PendingCall>,
    /// Sequence of the last call that timed out, to recognise its late response.
    expired: Option<u8>,
}

impl Correlator {
    /// Create an idle correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a call is in flight.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|call| call.deadline)
    }

    fn next_sequence(&mut self) -> u8 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    fn begin(&mut self, command: CommandId, sequence: u8, deadline: Instant, reply: Reply) {
        self.pending = Some(PendingCall {
            command,
            sequence,
            deadline,
            reply,
        });
    }

    fn expire(&mut self) {
        if let Some(call) = self.pending.take() {
            debug!(command = %call.command, seq = call.sequence, "command timed out");
            ::metrics::counter!(metric_defs::COMMANDS_TIMEOUT.name).increment(1);
            self.expired = Some(call.sequence);
            let _ = call.reply.send(Err(DriverError::Timeout {
                command: call.command,
            }));
        }
    }

    fn abandon(&mut self) {
        if let Some(call) = self.pending.take() {
            debug!(command = %call.command, seq = call.sequence, "caller abandoned command");
        }
    }

    fn fail(&mut self, err: impl Fn() -> DriverError) {
        if let Some(call) = self.pending.take() {
            let _ = call.reply.send(Err(err()));
        }
    }

    /// Route one inbound frame.
    pub fn dispatch(&mut self, frame: Frame, handlers: &Handlers) -> Inbound {
        let Some(command) = frame.command() else {
            warn!(command = frame.command_id, "unknown command id, dropping frame");
            return Inbound::UnknownCommand(frame.command_id);
        };

        if !is_solicited(command) {
            return match decode_command(command, &frame.payload) {
                Ok(values) => {
                    if let Some(handler) = handlers.get(&command) {
                        handler(&values);
                    }
                    Inbound::Unsolicited(command)
                }
                Err(err) => {
                    warn!(%command, %err, "failed to decode unsolicited frame");
                    Inbound::Malformed(command)
                }
            };
        }

        // Responses are matched on sequence alone and decoded with the schema
        // of the command id they carry.
        let matches = self
            .pending
            .as_ref()
            .is_some_and(|call| call.sequence == frame.sequence);
        if !matches {
            if self.expired == Some(frame.sequence) {
                ::metrics::counter!(metric_defs::COMMANDS_LATE_RESPONSE.name).increment(1);
                debug!(%command, seq = frame.sequence, "late response after timeout, discarding");
            } else {
                debug!(%command, seq = frame.sequence, "no pending call for response, discarding");
            }
            return Inbound::Unmatched(command);
        }
        let Some(call) = self.pending.take() else {
            return Inbound::Unmatched(command);
        };
        if call.command != command {
            debug!(expected = %call.command, %command, seq = frame.sequence, "response command differs from request");
        }

        let status = Open::<Status>::from_raw(frame.status);
        if status != Status::Success {
            ::metrics::counter!(metric_defs::COMMANDS_FAILED.name).increment(1);
            debug!(%command, %status, "command failed");
            let _ = call.reply.send(Err(DriverError::Command { command, status }));
            return Inbound::Failed(command, status);
        }

        match decode_command(command, &frame.payload) {
            Ok(values) => {
                let _ = call.reply.send(Ok(values.clone()));
                if let Some(handler) = handlers.get(&command) {
                    handler(&values);
                }
                Inbound::Resolved(command)
            }
            Err(err) => {
                warn!(%command, %err, "failed to decode response");
                let _ = call.reply.send(Err(err.into()));
                Inbound::Malformed(command)
            }
        }
    }
}

async fn reply_closed(pending: &mut Option<PendingCall>) {
    match pending {
        Some(call) => call.reply.closed().await,
        None => std::future::pending().await,
    }
}

enum Exit {
    Closed,
    Lost(Option<io::Error>),
}

/// Handle to a running worker.
pub struct WorkerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Whether the worker is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the worker and wait for it to release the link. Outstanding
    /// callers fail with [`DriverError::NotConnected`]; no connection-lost
    /// event is emitted.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(err) = (&mut self.task).await {
            warn!(%err, "command worker ended abnormally");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Start the worker for a connection.
pub fn spawn_worker<T>(
    io: T,
    queue: RequestQueue,
    handlers: Handlers,
    events: EventSink,
) -> WorkerHandle
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(run_worker(
        FrameTransport::new(io),
        queue.rx,
        handlers,
        events,
        shutdown_rx,
    ));
    WorkerHandle {
        shutdown: Some(shutdown_tx),
        task,
    }
}

async fn run_worker<T>(
    mut transport: FrameTransport<T>,
    mut requests: mpsc::Receiver<Request>,
    handlers: Handlers,
    events: EventSink,
    mut shutdown: oneshot::Receiver<()>,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut correlator = Correlator::new();

    let exit = loop {
        let idle = !correlator.is_busy();
        let deadline = correlator.deadline();

        tokio::select! {
            biased;

            _ = &mut shutdown => break Exit::Closed,

            inbound = transport.next_frame() => match inbound {
                Ok(Some(frame)) => {
                    correlator.dispatch(frame, &handlers);
                }
                Ok(None) => break Exit::Lost(None),
                Err(err) => break Exit::Lost(Some(err)),
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                correlator.expire();
            }

            _ = reply_closed(&mut correlator.pending), if !idle => {
                correlator.abandon();
            }

            // Reads pause while the request frame is written and flushed.
            request = requests.recv(), if idle => match request {
                Some(request) => {
                    if let Err(err) = start_request(&mut transport, &mut correlator, request).await {
                        break Exit::Lost(Some(err));
                    }
                }
                None => break Exit::Closed,
            },
        }
    };

    requests.close();
    match exit {
        Exit::Closed => {
            info!("connection closed");
            correlator.fail(|| DriverError::NotConnected);
            while let Ok(request) = requests.try_recv() {
                let _ = request.reply.send(Err(DriverError::NotConnected));
            }
        }
        Exit::Lost(err) => {
            match &err {
                Some(err) => warn!(%err, "connection lost"),
                None => info!("connection lost: device closed the link"),
            }
            correlator.fail(|| DriverError::ConnectionLost);
            while let Ok(request) = requests.try_recv() {
                let _ = request.reply.send(Err(DriverError::ConnectionLost));
            }
            events.emit(Event::ConnectionLost(err.map(Arc::new)));
        }
    }
}

async fn start_request<T>(
    transport: &mut FrameTransport<T>,
    correlator: &mut Correlator,
    request: Request,
) -> std::result::Result<(), io::Error>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    if request.reply.is_closed() {
        debug!(command = %request.command, "skipping abandoned request");
        return Ok(());
    }

    let sequence = correlator.next_sequence();
    let frame = Frame::request(request.command, sequence, request.payload);
    match transport.send(&frame).await {
        Ok(()) => {
            debug!(command = %request.command, seq = sequence, "command sent");
            correlator.begin(
                request.command,
                sequence,
                Instant::now() + request.timeout,
                request.reply,
            );
            Ok(())
        }
        Err(DriverError::Io(err)) => {
            let _ = request.reply.send(Err(DriverError::ConnectionLost));
            Err(err)
        }
        Err(err) => {
            let _ = request.reply.send(Err(err));
            Ok(())
        }
    }
}
