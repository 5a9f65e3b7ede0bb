//! Streaming session: owns one live transport connection for one
//! subscription, with automatic recovery.
//!
//! Each session runs as an independent tokio task with a single-consumer
//! message loop: exactly one logical reader processes inbound frames in
//! arrival order. The task owns its connection and all timers, so dropping
//! out of the loop (explicit close, exhausted retries) tears everything down
//! without leaking callbacks onto a dead session.

pub mod throttle;
pub mod transport;

use crate::{
    error::StreamError,
    event::StreamEvent,
    exchange::message::classify,
    session::{
        throttle::{DEFAULT_THROTTLE_WINDOW, UpdateThrottle},
        transport::{CLOSE_CODE_GOING_AWAY, CLOSE_CODE_NORMAL, Connection, Frame, Transport},
    },
};
use derive_more::Constructor;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

/// Connection lifecycle state observable by consumers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub enum SessionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    /// Terminal: automatic recovery exhausted. Requires an explicit
    /// `reconnect()` from the consumer.
    Error,
}

/// State plus the error context surfaced alongside it.
#[derive(Clone, Debug, Default, PartialEq, Constructor)]
pub struct SessionStatus {
    pub state: SessionState,
    pub error: Option<String>,
}

/// Tunable session policy. These are policy, not protocol; defaults match
/// the dashboard's production values.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Cadence of the liveness check while `Connected`.
    pub heartbeat_interval: Duration,
    /// Inbound silence beyond this bound forces a close-and-reconnect cycle.
    pub stale_after: Duration,
    /// Base delay for exponential reconnect backoff.
    pub reconnect_base_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Consecutive failures tolerated before the session parks in
    /// `SessionState::Error`.
    pub max_reconnect_attempts: u32,
    /// Minimum spacing between non-critical update deliveries.
    pub throttle_window: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            stale_after: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
        }
    }
}

impl SessionConfig {
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    pub fn with_reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_throttle_window(mut self, window: Duration) -> Self {
        self.throttle_window = window;
        self
    }
}

/// Delay before reconnect attempt `attempts`: `min(base * 2^attempts, cap)`.
pub fn reconnect_delay(config: &SessionConfig, attempts: u32) -> Duration {
    config
        .reconnect_base_delay
        .saturating_mul(2u32.saturating_pow(attempts))
        .min(config.reconnect_max_delay)
}

/// Consumer-facing delivery slot. Swappable via the handle without touching
/// the connection, so replacing a consumer's callbacks never tears down the
/// transport.
pub type EventSink = Arc<Mutex<Box<dyn FnMut(StreamEvent) + Send>>>;

enum Command {
    Reconnect,
    Close,
}

/// Why the connected message loop exited.
enum LoopExit {
    /// Explicit unsubscribe or peer normal close. Terminal, no reconnect.
    Intentional,
    /// Consumer requested a fresh transport. Reconnect immediately with the
    /// attempt counter reset.
    Forced,
    /// Transport error, abnormal close, or heartbeat staleness. Follows the
    /// reconnection policy.
    Abnormal(Option<String>),
}

/// Handle to a spawned session. Dropping the handle does not stop the task;
/// call `close()` for deterministic teardown.
#[derive(Debug)]
pub struct SessionHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<SessionStatus>,
    pub(crate) task: JoinHandle<()>,
}

impl SessionHandle {
    /// Reset the attempt counter and force a fresh connection. The only way
    /// out of terminal `SessionState::Error`.
    pub fn reconnect(&self) {
        let _ = self.command_tx.send(Command::Reconnect);
    }

    /// Tear the session down deterministically: the transport is closed with
    /// the intentional code and every pending timer dies with the task.
    pub fn close(&self) {
        let _ = self.command_tx.send(Command::Close);
    }

    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.status_rx.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn error(&self) -> Option<String> {
        self.status_rx.borrow().error.clone()
    }

    /// Watch channel carrying every state transition.
    pub fn status_watch(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }
}

/// Spawn a session task for one subscription.
pub fn spawn<T>(
    id: SmolStr,
    endpoint: String,
    transport: T,
    config: SessionConfig,
    sink: EventSink,
) -> SessionHandle
where
    T: Transport,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus::default());

    let throttle = UpdateThrottle::new(config.throttle_window);
    let session = Session {
        id,
        endpoint,
        transport,
        config,
        sink,
        status_tx,
        command_rx,
        reconnect_attempts: 0,
        last_activity: Instant::now(),
        throttle,
    };

    let task = tokio::spawn(session.run());

    SessionHandle {
        command_tx,
        status_rx,
        task,
    }
}

struct Session<T: Transport> {
    id: SmolStr,
    endpoint: String,
    transport: T,
    config: SessionConfig,
    sink: EventSink,
    status_tx: watch::Sender<SessionStatus>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    reconnect_attempts: u32,
    last_activity: Instant,
    throttle: UpdateThrottle,
}

impl<T: Transport> Session<T> {
    async fn run(mut self) {
        loop {
            self.publish(SessionState::Connecting, None);

            match self.transport.connect(&self.endpoint).await {
                Ok(mut connection) => {
                    info!(session = %self.id, endpoint = %self.endpoint, "connected");
                    self.reconnect_attempts = 0;
                    self.last_activity = Instant::now();
                    self.publish(SessionState::Connected, None);

                    match self.drive(&mut connection).await {
                        LoopExit::Intentional => {
                            info!(session = %self.id, "session closed");
                            self.publish(SessionState::Disconnected, None);
                            return;
                        }
                        LoopExit::Forced => {
                            self.reconnect_attempts = 0;
                            continue;
                        }
                        LoopExit::Abnormal(reason) => {
                            warn!(session = %self.id, ?reason, "connection lost");
                            self.publish(SessionState::Disconnected, reason);
                        }
                    }
                }
                Err(err) => {
                    warn!(session = %self.id, %err, "failed to connect");
                    self.publish(SessionState::Disconnected, Some(err.to_string()));
                }
            }

            if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                let err = StreamError::ExhaustedRetries {
                    attempts: self.reconnect_attempts,
                };
                error!(session = %self.id, %err, "automatic recovery stopped");
                self.publish(SessionState::Error, Some(err.to_string()));

                // Park until the consumer explicitly retries or unsubscribes.
                loop {
                    match self.command_rx.recv().await {
                        Some(Command::Reconnect) => {
                            self.reconnect_attempts = 0;
                            break;
                        }
                        Some(Command::Close) | None => {
                            self.publish(SessionState::Disconnected, None);
                            return;
                        }
                    }
                }
                continue;
            }

            let delay = reconnect_delay(&self.config, self.reconnect_attempts);
            self.reconnect_attempts += 1;
            debug!(
                session = %self.id,
                attempt = self.reconnect_attempts,
                ?delay,
                "scheduling reconnect"
            );

            tokio::select! {
                _ = time::sleep(delay) => {}
                command = self.command_rx.recv() => match command {
                    Some(Command::Reconnect) => {
                        self.reconnect_attempts = 0;
                    }
                    Some(Command::Close) | None => {
                        self.publish(SessionState::Disconnected, None);
                        return;
                    }
                },
            }
        }
    }

    /// Connected message loop. Returns when the connection ends, for whatever
    /// reason; the connection and heartbeat timer are dropped before any
    /// reconnect is attempted, so a superseded transport can never deliver
    /// late frames.
    async fn drive(&mut self, connection: &mut T::Conn) -> LoopExit {
        let mut heartbeat = time::interval_at(
            Instant::now() + self.config.heartbeat_interval,
            self.config.heartbeat_interval,
        );

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(Command::Close) | None => {
                        let _ = connection.close(CLOSE_CODE_NORMAL).await;
                        return LoopExit::Intentional;
                    }
                    Some(Command::Reconnect) => {
                        let _ = connection.close(CLOSE_CODE_GOING_AWAY).await;
                        return LoopExit::Forced;
                    }
                },
                _ = heartbeat.tick() => {
                    if self.last_activity.elapsed() > self.config.stale_after {
                        warn!(
                            session = %self.id,
                            idle = ?self.last_activity.elapsed(),
                            "no inbound activity, forcing reconnect"
                        );
                        let _ = connection.close(CLOSE_CODE_GOING_AWAY).await;
                        return LoopExit::Abnormal(Some("heartbeat timeout".to_string()));
                    }
                    if let Err(err) = connection.send(Frame::Ping).await {
                        return LoopExit::Abnormal(Some(err.to_string()));
                    }
                },
                frame = connection.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        self.last_activity = Instant::now();
                        self.dispatch(&text);
                    }
                    Some(Ok(Frame::Ping)) | Some(Ok(Frame::Pong)) => {
                        self.last_activity = Instant::now();
                    }
                    Some(Ok(Frame::Close(code))) => {
                        return if code == Some(CLOSE_CODE_NORMAL) {
                            LoopExit::Intentional
                        } else {
                            LoopExit::Abnormal(Some(format!(
                                "connection closed by peer (code {code:?})"
                            )))
                        };
                    }
                    Some(Err(err)) => return LoopExit::Abnormal(Some(err.to_string())),
                    None => return LoopExit::Abnormal(Some("transport stream ended".to_string())),
                },
            }
        }
    }

    /// Classify one inbound frame and push it through the throttle to the
    /// current handler slot. Malformed frames are logged and dropped without
    /// affecting connection state.
    fn dispatch(&mut self, raw: &str) {
        let event = match classify(raw) {
            Ok(StreamEvent::Unrecognized) => return,
            Ok(event) => event,
            Err(err) => {
                warn!(session = %self.id, %err, "dropping malformed frame");
                debug!(
                    session = %self.id,
                    payload = %truncate_payload(raw, 256),
                    "malformed frame payload"
                );
                return;
            }
        };

        let critical = match &event {
            StreamEvent::Liquidation(_) => true,
            StreamEvent::Kline(kline) => kline.is_closed,
            StreamEvent::Unrecognized => return,
        };

        if self.throttle.admit(critical) {
            (*self.sink.lock())(event);
        }
    }

    fn publish(&self, state: SessionState, error: Option<String>) {
        let _ = self.status_tx.send(SessionStatus::new(state, error));
    }
}

/// Truncate a payload for logging without slicing inside a multi-byte
/// character.
fn truncate_payload(raw: &str, limit: usize) -> &str {
    let mut cut = raw.len().min(limit);
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    &raw[..cut]
}
