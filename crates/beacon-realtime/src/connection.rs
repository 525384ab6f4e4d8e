//! Connection state machine.
//!
//! One supervisor task runs per `connect()`. It opens the transport, runs
//! the session (inbound frames, heartbeat, liveness deadline), and on
//! failure walks the backoff schedule until the attempt budget is spent.
//!
//! ```text
//!            connect()               open ok
//! DISCONNECTED ──────► CONNECTING ───────────► CONNECTED
//!      ▲                   │                    │   ▲
//!      │  budget spent /   │ error              │   │ open ok
//!      │  policy close /   ▼                    ▼   │
//!      └────────────── RECONNECTING ◄──── abnormal close / liveness timeout
//! ```
//!
//! Every state change carries an epoch. `connect`, `disconnect`, and
//! `reconnect` start a new epoch, so a supervisor that lost a race with
//! one of them can never move the state again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use beacon_core::errors::RealtimeError;
use beacon_core::events::ServerEvent;
use beacon_core::wire::{ClientMessage, ControlFrame, InboundFrame, parse_inbound};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::ack::AckGateway;
use crate::config::ConnectionConfig;
use crate::dispatcher::Dispatcher;
use crate::listeners::{ListenerGuard, ListenerSet};
use crate::outbox::Outbox;
use crate::subscriptions::SubscriptionManager;
use crate::transport::{CloseKind, Transport, TransportLink, TransportSignal};

/// Connectivity as seen by the client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link and no pending attempt.
    #[default]
    Disconnected,
    /// First open attempt in flight.
    Connecting,
    /// Link open; heartbeat running.
    Connected,
    /// Waiting out a backoff delay or retrying an open.
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase name for logs and status lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivered to state listeners on every actual change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange {
    /// State before the change.
    pub previous: ConnectionState,
    /// State after the change.
    pub current: ConnectionState,
}

struct StateCell {
    state: ConnectionState,
    epoch: u64,
}

struct Shared {
    cell: Mutex<StateCell>,
    attempt: AtomicU32,
    last_error: Mutex<Option<RealtimeError>>,
    client_id: Mutex<Option<String>>,
    state_listeners: ListenerSet<StateChange>,
    error_listeners: ListenerSet<RealtimeError>,
    outbox: Outbox,
    dispatcher: Arc<Dispatcher>,
    subscriptions: SubscriptionManager,
    acks: AckGateway,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        self.cell.lock().state
    }

    /// Start a new epoch in `next`, detaching any link. Listeners are not
    /// notified; the caller does that once its own locks are released.
    fn restart(&self, next: ConnectionState) -> (u64, StateChange) {
        let mut cell = self.cell.lock();
        cell.epoch += 1;
        self.outbox.detach();
        let previous = std::mem::replace(&mut cell.state, next);
        (
            cell.epoch,
            StateChange {
                previous,
                current: next,
            },
        )
    }

    /// Move to `next` if `epoch` is still current. A sender attaches a new
    /// link; `None` detaches the current one.
    fn advance(
        &self,
        epoch: u64,
        next: ConnectionState,
        link: Option<mpsc::UnboundedSender<String>>,
    ) -> bool {
        let change = {
            let mut cell = self.cell.lock();
            if cell.epoch != epoch {
                return false;
            }
            match link {
                Some(tx) => self.outbox.attach(tx),
                None => self.outbox.detach(),
            }
            StateChange {
                previous: std::mem::replace(&mut cell.state, next),
                current: next,
            }
        };
        self.notify(change);
        true
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.cell.lock().epoch == epoch
    }

    fn notify(&self, change: StateChange) {
        if change.previous == change.current {
            return;
        }
        debug!(from = %change.previous, to = %change.current, "connection state changed");
        self.state_listeners.emit(&change);
    }

    fn report(&self, err: RealtimeError) {
        warn!(code = err.code(), error = %err, "connection error");
        *self.last_error.lock() = Some(err.clone());
        self.error_listeners.emit(&err);
    }
}

/// Owns the link to the server and keeps it alive.
///
/// `connect` must be called from within a Tokio runtime; the supervisor is
/// spawned onto it.
pub struct Connection {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    config: Option<ConnectionConfig>,
    cancel: Option<CancellationToken>,
}

impl Connection {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        outbox: Outbox,
        dispatcher: Arc<Dispatcher>,
        subscriptions: SubscriptionManager,
        acks: AckGateway,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cell: Mutex::new(StateCell {
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                }),
                attempt: AtomicU32::new(0),
                last_error: Mutex::new(None),
                client_id: Mutex::new(None),
                state_listeners: ListenerSet::new("state"),
                error_listeners: ListenerSet::new("error"),
                outbox,
                dispatcher,
                subscriptions,
                acks,
            }),
            transport,
            control: Mutex::new(Control::default()),
        }
    }

    /// Open the link. A no-op while CONNECTED; otherwise any in-flight
    /// attempt or backoff wait is abandoned and a fresh attempt starts with
    /// the attempt counter reset.
    ///
    /// Failures are never returned here. They arrive on
    /// [`on_error`](Self::on_error) and in the state.
    pub fn connect(&self, config: ConnectionConfig) {
        let (epoch, change, cancel) = {
            let mut control = self.control.lock();
            if self.shared.state() == ConnectionState::Connected {
                debug!("connect ignored, already connected");
                return;
            }
            if let Some(previous) = control.cancel.take() {
                previous.cancel();
            }
            self.shared.attempt.store(0, Ordering::SeqCst);
            let (epoch, change) = self.shared.restart(ConnectionState::Connecting);
            let cancel = CancellationToken::new();
            control.cancel = Some(cancel.clone());
            control.config = Some(config.clone());
            (epoch, change, cancel)
        };

        info!(url = %config.url, "connecting");
        self.shared.notify(change);

        let supervisor = supervise(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            config,
            epoch,
        );
        drop(tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {}
                () = supervisor => {}
            }
        }));
    }

    /// Stop everything: pending reconnect, heartbeat, and the link.
    /// Idempotent; listeners only hear about an actual change.
    pub fn disconnect(&self) {
        let change = {
            let mut control = self.control.lock();
            if let Some(cancel) = control.cancel.take() {
                cancel.cancel();
            }
            self.shared.restart(ConnectionState::Disconnected).1
        };
        if change.previous != change.current {
            info!("disconnected by caller");
        }
        self.shared.notify(change);
    }

    /// Disconnect, then connect again with the last configuration and a
    /// fresh attempt counter. Returns `false` if `connect` was never called.
    pub fn reconnect(&self) -> bool {
        let Some(config) = self.control.lock().config.clone() else {
            warn!("reconnect requested before any connect");
            return false;
        };
        self.disconnect();
        self.connect(config);
        true
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the state is CONNECTED.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Listen for state changes.
    pub fn on_state_change(
        &self,
        listener: impl Fn(&StateChange) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.shared.state_listeners.add(listener)
    }

    /// Listen for connection-level errors.
    pub fn on_error(
        &self,
        listener: impl Fn(&RealtimeError) + Send + Sync + 'static,
    ) -> ListenerGuard {
        self.shared.error_listeners.add(listener)
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempt(&self) -> u32 {
        self.shared.attempt.load(Ordering::SeqCst)
    }

    /// Most recent connection-level error.
    pub fn last_error(&self) -> Option<RealtimeError> {
        self.shared.last_error.lock().clone()
    }

    /// Client ID assigned by the server's greeting, if one arrived.
    pub fn client_id(&self) -> Option<String> {
        self.shared.client_id.lock().clone()
    }

    /// Configuration of the last `connect`.
    pub fn config(&self) -> Option<ConnectionConfig> {
        self.control.lock().config.clone()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(cancel) = self.control.get_mut().cancel.take() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("attempt", &self.reconnect_attempt())
            .finish_non_exhaustive()
    }
}

/// How a session ended.
enum SessionEnd {
    /// A newer epoch took over.
    Superseded,
    /// The server closed on purpose.
    Policy { code: u16, reason: String },
    /// The link failed.
    Failed(RealtimeError),
}

#[instrument(skip_all, fields(url = %config.url, epoch = epoch))]
async fn supervise(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    epoch: u64,
) {
    loop {
        let opened = time::timeout(
            config.connection_timeout,
            transport.open(&config.url, config.token.as_deref()),
        )
        .await;

        let failure = match opened {
            Ok(Ok(link)) => match run_session(&shared, &config, epoch, link).await {
                SessionEnd::Superseded => return,
                SessionEnd::Policy { code, reason } => {
                    info!(code, %reason, "server closed the connection");
                    let _ = shared.advance(epoch, ConnectionState::Disconnected, None);
                    return;
                }
                SessionEnd::Failed(err) => err,
            },
            Ok(Err(err)) => err,
            Err(_) => RealtimeError::transport(format!(
                "connect timed out after {}ms",
                millis(config.connection_timeout)
            )),
        };

        if !shared.is_current(epoch) {
            return;
        }

        let retry = config.auto_reconnect && !failure.is_terminal();
        let attempt = if retry {
            shared.attempt.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            shared.attempt.load(Ordering::SeqCst)
        };
        let exhausted = retry && !config.backoff.allows(attempt);
        let next = if retry && !exhausted {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Disconnected
        };

        if !shared.advance(epoch, next, None) {
            return;
        }
        shared.report(failure);

        if exhausted {
            error!(attempts = config.backoff.max_attempts, "giving up on reconnect");
            shared.report(RealtimeError::MaxAttemptsExceeded {
                attempts: config.backoff.max_attempts,
            });
            return;
        }
        if !retry {
            return;
        }

        let delay = config.backoff.delay_for(attempt);
        info!(attempt, delay_ms = millis(delay), "reconnect scheduled");
        time::sleep(delay).await;
    }
}

async fn run_session(
    shared: &Shared,
    config: &ConnectionConfig,
    epoch: u64,
    link: TransportLink,
) -> SessionEnd {
    let TransportLink { outbound, mut inbound } = link;

    shared.attempt.store(0, Ordering::SeqCst);
    if !shared.advance(epoch, ConnectionState::Connected, Some(outbound)) {
        return SessionEnd::Superseded;
    }
    info!("connected");
    // Nothing inbound is read until the channel set is back on the server.
    let _ = shared.subscriptions.replay();

    let interval = config.heartbeat_interval.max(Duration::from_millis(1));
    let mut ping = time::interval_at(Instant::now() + interval, interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_reply = Instant::now();

    loop {
        let deadline = last_reply + config.liveness_deadline();
        tokio::select! {
            signal = inbound.recv() => match signal {
                Some(TransportSignal::Frame(text)) => {
                    // A newer epoch owns the dispatcher now.
                    if !shared.is_current(epoch) {
                        return SessionEnd::Superseded;
                    }
                    if config.debug {
                        debug!(frame = %text, "inbound frame");
                    }
                    if handle_frame(shared, &text) {
                        last_reply = Instant::now();
                    }
                }
                Some(TransportSignal::Closed(CloseKind::Policy { code, reason })) => {
                    return SessionEnd::Policy { code, reason };
                }
                Some(TransportSignal::Closed(CloseKind::Abnormal { reason })) => {
                    return SessionEnd::Failed(RealtimeError::transport(reason));
                }
                None => {
                    return SessionEnd::Failed(RealtimeError::transport("link dropped"));
                }
            },
            _ = ping.tick() => {
                if shared.outbox.send(&ClientMessage::Ping) {
                    trace!("ping sent");
                }
            }
            () = time::sleep_until(deadline) => {
                let elapsed_ms = millis(last_reply.elapsed());
                warn!(elapsed_ms, "liveness deadline passed");
                return SessionEnd::Failed(RealtimeError::LivenessTimeout { elapsed_ms });
            }
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Route one inbound frame. Returns `true` for a liveness reply.
fn handle_frame(shared: &Shared, text: &str) -> bool {
    match parse_inbound(text) {
        Ok(InboundFrame::Control(ControlFrame::Pong { .. })) => true,
        Ok(InboundFrame::Control(ControlFrame::Ack { id, data, error })) => {
            let _ = shared.acks.settle(&id, data, error);
            false
        }
        Ok(InboundFrame::Event(event)) => {
            if let ServerEvent::ConnectionEstablished(hello) = &event {
                info!(client_id = %hello.client_id, "server greeting");
                *shared.client_id.lock() = Some(hello.client_id.clone());
            }
            let _ = shared.dispatcher.dispatch(&event);
            false
        }
        Err(e) => {
            debug!(error = %e, len = text.len(), "dropping unrecognised frame");
            false
        }
    }
}
