//! Gateway connection driver
//!
//! Owns one reconnect-capable connection to the gateway: it dials the socket,
//! runs the Hello/Identify (or Resume) handshake, pumps inbound frames into
//! session tracking and event dispatch, and decides resume-vs-reidentify when
//! the socket drops. The driver is the sole writer of both the session state
//! and the published [`ConnectionState`].

use crate::events::{Event, EventType};
use crate::heartbeat::{Heartbeat, HeartbeatMonitor};
use crate::protocol::{
    close_policy, CloseCode, ClosePolicy, GatewayMessage, IdentifyPayload, OpCode, ReadyPayload,
    ResumePayload, GATEWAY_VERSION,
};
use crate::session::{SequenceOutcome, SessionManager};
use futures_util::{SinkExt, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tern_common::{ClientConfig, GatewayError, RestError, TransportEncoding};
use tern_rest::RequestExecutor;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

/// Capacity of the channel feeding the socket writer task
const OUTBOUND_BUFFER: usize = 64;

/// Close code reported when the stream ends without a close frame
const ABNORMAL_CLOSURE: u16 = 1006;

/// Observable lifecycle of the gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the initial state and the state after a clean shutdown
    Disconnected,
    /// Dialing the socket and waiting for Hello
    Connecting,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for replay and RESUMED
    Resuming,
    /// Session live; events are flowing
    Connected,
    /// Connection lost, backing off before the next attempt
    Reconnecting,
    /// A terminal failure; the driver has stopped
    FatalError,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::FatalError => "fatal-error",
        };
        f.write_str(name)
    }
}

/// How one connection attempt ended
enum Exit {
    /// The client was shut down
    Shutdown,
    /// The socket is gone; re-enter the reconnect loop
    Reconnect {
        /// Whether the session survives and a Resume should be attempted
        resumable: bool,
        /// Whether this attempt reached Connected before ending
        was_connected: bool,
    },
}

/// Everything the read loop can observe next
enum Incoming {
    Frame(GatewayMessage),
    Close { code: u16, reason: String },
    Shutdown,
    /// The heartbeat task declared the connection dead
    Dead,
    /// No frame at all within the heartbeat timeout
    TimedOut,
}

/// The reconnect-capable gateway connection
pub struct GatewayConnection {
    config: ClientConfig,
    rest: Arc<RequestExecutor>,
    session: Arc<SessionManager>,
    monitor: Arc<HeartbeatMonitor>,
    events: mpsc::Sender<Event>,
    state_tx: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
}

impl GatewayConnection {
    /// Create a connection driver and the state watch it publishes on
    ///
    /// Nothing happens until [`run`](Self::run) is awaited; the watch starts
    /// at [`ConnectionState::Disconnected`].
    #[must_use]
    pub fn new(
        config: ClientConfig,
        rest: Arc<RequestExecutor>,
        session: Arc<SessionManager>,
        events: mpsc::Sender<Event>,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let connection = Self {
            config,
            rest,
            session,
            monitor: Arc::new(HeartbeatMonitor::default()),
            events,
            state_tx,
            cancel,
        };
        (connection, state_rx)
    }

    /// Shared heartbeat monitor, for latency reporting
    #[must_use]
    pub fn monitor(&self) -> Arc<HeartbeatMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Session manager shared with this driver
    #[must_use]
    pub fn session(&self) -> Arc<SessionManager> {
        Arc::clone(&self.session)
    }

    /// Drive the connection until shutdown or a terminal error
    ///
    /// Recoverable failures re-enter the reconnect loop with a linear
    /// back-off, bounded by `max_reconnect_attempts` counted since the last
    /// successful session. Terminal errors leave the state at
    /// [`ConnectionState::FatalError`].
    pub async fn run(self) -> Result<(), GatewayError> {
        let mut attempts: u32 = 0;

        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }

            let exit = match self.connect_once().await {
                Ok(exit) => exit,
                Err(GatewayError::Cancelled) => break Ok(()),
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(%error, "Connection attempt failed");
                    Exit::Reconnect {
                        resumable: true,
                        was_connected: false,
                    }
                }
                Err(error) => break Err(error),
            };

            match exit {
                Exit::Shutdown => break Ok(()),
                Exit::Reconnect {
                    resumable,
                    was_connected,
                } => {
                    self.session.mark_closed(resumable);
                    if was_connected {
                        attempts = 0;
                    }
                    attempts += 1;
                    if attempts > self.config.gateway.max_reconnect_attempts {
                        break Err(GatewayError::ReconnectsExhausted {
                            attempts: attempts - 1,
                        });
                    }

                    self.set_state(ConnectionState::Reconnecting);
                    let backoff = Duration::from_secs(u64::from(attempts.min(6)));
                    tracing::info!(
                        attempt = attempts,
                        resumable,
                        backoff_secs = backoff.as_secs(),
                        "Reconnecting to the gateway"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => break Ok(()),
                        () = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        match &result {
            Ok(()) => {
                self.set_state(ConnectionState::Disconnected);
                tracing::info!("Gateway connection shut down");
            }
            Err(error) => {
                self.set_state(ConnectionState::FatalError);
                tracing::error!(%error, "Gateway connection failed fatally");
            }
        }
        result
    }

    /// One full connection attempt: dial, handshake, read until the socket ends
    async fn connect_once(&self) -> Result<Exit, GatewayError> {
        self.set_state(ConnectionState::Connecting);

        let endpoint = match self.session.resume_url().filter(|_| self.session.resumable()) {
            Some(url) => url,
            None => self.fetch_endpoint().await?,
        };
        let url = Self::connect_url(&endpoint, self.config.gateway.encoding);

        tracing::debug!(%url, "Opening gateway socket");
        let (socket, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(Exit::Shutdown),
            connected = tokio_tungstenite::connect_async(url.as_str()) => connected?,
        };
        let (mut sink, mut stream) = socket.split();

        // the writer task serializes all outbound frames, so the heartbeat
        // task and the read loop never contend for the sink
        let (outbound, mut outbound_rx) = mpsc::channel::<GatewayMessage>(OUTBOUND_BUFFER);
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match frame.to_json() {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::error!(%error, "Failed to encode outbound frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let stop = CancellationToken::new();
        let dead = CancellationToken::new();
        self.monitor.reset();

        let result = self.drive(&mut stream, &outbound, &stop, &dead).await;

        stop.cancel();
        drop(outbound);
        writer.abort();
        result
    }

    /// Handshake plus the steady-state read loop for one socket
    async fn drive<S>(
        &self,
        stream: &mut S,
        outbound: &mpsc::Sender<GatewayMessage>,
        stop: &CancellationToken,
        dead: &CancellationToken,
    ) -> Result<Exit, GatewayError>
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        // the server speaks first, and its first frame must be Hello
        let hello = match self.next_incoming(stream, dead).await? {
            Incoming::Frame(frame) if frame.op == OpCode::Hello => frame
                .as_hello()
                .ok_or_else(|| GatewayError::Handshake("malformed hello payload".to_string()))?,
            Incoming::Frame(frame) => {
                return Err(GatewayError::Handshake(format!(
                    "expected hello, got op {}",
                    frame.op
                )))
            }
            Incoming::Close { code, reason } => return self.handle_close(code, &reason, false),
            Incoming::Shutdown => return Ok(Exit::Shutdown),
            Incoming::Dead | Incoming::TimedOut => {
                return Err(GatewayError::Handshake(
                    "no hello within the heartbeat timeout".to_string(),
                ))
            }
        };
        let interval = Duration::from_millis(hello.heartbeat_interval);
        tracing::debug!(heartbeat_interval_ms = hello.heartbeat_interval, "Hello received");

        if let Some((session_id, seq)) =
            self.session.resume_info().filter(|_| self.session.resumable())
        {
            self.set_state(ConnectionState::Resuming);
            tracing::info!(%session_id, seq, "Resuming session");
            let resume = GatewayMessage::resume(&ResumePayload {
                token: self.config.token.clone(),
                session_id,
                seq,
            });
            Self::send_outbound(outbound, resume).await?;
        } else {
            self.set_state(ConnectionState::Identifying);
            tracing::info!("Identifying new session");
            let identify = GatewayMessage::identify(&IdentifyPayload {
                token: self.config.token.clone(),
                capabilities: self.config.capabilities,
                properties: self.config.properties.clone().into(),
            });
            Self::send_outbound(outbound, identify).await?;
        }

        // detached; the stop token ends it when this attempt unwinds
        let _heartbeat = Heartbeat::new(
            interval,
            self.config.gateway.heartbeat_jitter,
            outbound.clone(),
            Arc::clone(&self.session),
            Arc::clone(&self.monitor),
            dead.clone(),
            stop.clone(),
        )
        .spawn();

        let mut was_connected = false;
        loop {
            match self.next_incoming(stream, dead).await? {
                Incoming::Shutdown => return Ok(Exit::Shutdown),
                Incoming::Dead => {
                    tracing::warn!("Heartbeat acks missed, dropping the connection");
                    return Ok(Exit::Reconnect {
                        resumable: true,
                        was_connected,
                    });
                }
                Incoming::TimedOut => {
                    tracing::warn!(
                        timeout = ?self.config.gateway.heartbeat_timeout,
                        "No frames within the heartbeat timeout"
                    );
                    return Ok(Exit::Reconnect {
                        resumable: true,
                        was_connected,
                    });
                }
                Incoming::Close { code, reason } => {
                    return self.handle_close(code, &reason, was_connected)
                }
                Incoming::Frame(frame) => match frame.op {
                    OpCode::Dispatch => {
                        if let Some(connected) = self.handle_dispatch(&frame).await? {
                            was_connected = was_connected || connected;
                        }
                    }
                    OpCode::Heartbeat => {
                        // server demands an immediate beat outside the cadence
                        let beat = GatewayMessage::heartbeat(self.session.sequence());
                        Self::send_outbound(outbound, beat).await?;
                    }
                    OpCode::HeartbeatAck => {
                        self.monitor.ack();
                        tracing::trace!(latency = ?self.monitor.latency(), "Heartbeat acknowledged");
                    }
                    OpCode::Reconnect => {
                        tracing::info!("Server requested a reconnect");
                        return Ok(Exit::Reconnect {
                            resumable: true,
                            was_connected,
                        });
                    }
                    OpCode::InvalidSession => {
                        let resumable = frame.invalid_session_resumable();
                        tracing::warn!(resumable, "Session invalidated by the server");
                        if !resumable {
                            self.session.invalidate();
                        }
                        return Ok(Exit::Reconnect {
                            resumable,
                            was_connected,
                        });
                    }
                    OpCode::Hello | OpCode::Identify | OpCode::Resume => {
                        tracing::warn!(op = %frame.op, "Ignoring unexpected frame");
                    }
                },
            }
        }
    }

    /// Decode one dispatch frame, update the session, and hand the event off
    ///
    /// Returns `Ok(Some(true))` when the frame completed the handshake
    /// (READY or RESUMED), `Ok(None)` when the event was a dropped replay.
    async fn handle_dispatch(&self, frame: &GatewayMessage) -> Result<Option<bool>, GatewayError> {
        let Some((tag, sequence, data)) = frame.as_dispatch() else {
            return Err(GatewayError::Protocol(
                "dispatch frame missing event type or sequence".to_string(),
            ));
        };

        match self.session.record_sequence(sequence) {
            Ok(SequenceOutcome::Applied) => {}
            Ok(SequenceOutcome::Duplicate) => {
                tracing::debug!(sequence, event_type = tag, "Dropping replayed event");
                return Ok(None);
            }
            Err(error) => return Err(GatewayError::Protocol(error.to_string())),
        }

        let event_type = EventType::from(tag);
        let mut connected = false;
        match event_type {
            EventType::Ready => {
                let ready: ReadyPayload = serde_json::from_value(data.clone())
                    .map_err(|e| GatewayError::Protocol(format!("malformed READY payload: {e}")))?;
                tracing::info!(session_id = %ready.session_id, sequence, "Session established");
                self.session.establish(ready.session_id, ready.resume_gateway_url);
                self.set_state(ConnectionState::Connected);
                connected = true;
            }
            EventType::Resumed => {
                tracing::info!(sequence, "Session resumed");
                self.set_state(ConnectionState::Connected);
                connected = true;
            }
            _ => {}
        }

        let event = Event::new(event_type, sequence, data);
        if self.events.send(event).await.is_err() {
            // the dispatcher only goes away during shutdown
            return Err(GatewayError::Cancelled);
        }
        Ok(Some(connected))
    }

    /// Wait for the next thing the read loop must react to
    async fn next_incoming<S>(
        &self,
        stream: &mut S,
        dead: &CancellationToken,
    ) -> Result<Incoming, GatewayError>
    where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => return Ok(Incoming::Shutdown),
                () = dead.cancelled() => return Ok(Incoming::Dead),
                next = tokio::time::timeout(
                    self.config.gateway.heartbeat_timeout,
                    stream.next(),
                ) => next,
            };

            let Ok(item) = next else {
                return Ok(Incoming::TimedOut);
            };
            let Some(item) = item else {
                // stream ended without a close frame
                return Ok(Incoming::Close {
                    code: ABNORMAL_CLOSURE,
                    reason: String::new(),
                });
            };

            match item? {
                Message::Text(text) => {
                    return GatewayMessage::from_json(&text)
                        .map(Incoming::Frame)
                        .map_err(|e| GatewayError::Protocol(format!("malformed frame: {e}")))
                }
                Message::Close(close) => {
                    let (code, reason) = close
                        .map(|frame| (u16::from(frame.code), frame.reason.to_string()))
                        .unwrap_or((ABNORMAL_CLOSURE, String::new()));
                    return Ok(Incoming::Close { code, reason });
                }
                // pings are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Map a close code onto the reconnect policy
    fn handle_close(
        &self,
        code: u16,
        reason: &str,
        was_connected: bool,
    ) -> Result<Exit, GatewayError> {
        match close_policy(code) {
            ClosePolicy::Fatal => {
                let reason = if reason.is_empty() {
                    "closed by server".to_string()
                } else {
                    reason.to_string()
                };
                if code == CloseCode::AuthenticationFailed.as_u16() {
                    Err(GatewayError::AuthenticationFailed(reason))
                } else {
                    Err(GatewayError::Closed { code, reason })
                }
            }
            ClosePolicy::Resume => {
                tracing::warn!(code, reason, "Socket closed, will resume");
                Ok(Exit::Reconnect {
                    resumable: true,
                    was_connected,
                })
            }
            ClosePolicy::Reidentify => {
                tracing::info!(code, reason, "Socket closed, session discarded");
                self.session.invalidate();
                Ok(Exit::Reconnect {
                    resumable: false,
                    was_connected,
                })
            }
        }
    }

    async fn send_outbound(
        outbound: &mpsc::Sender<GatewayMessage>,
        frame: GatewayMessage,
    ) -> Result<(), GatewayError> {
        outbound
            .send(frame)
            .await
            .map_err(|_| GatewayError::Handshake("socket writer stopped".to_string()))
    }

    /// Build the socket URL from a discovered endpoint
    ///
    /// Endpoints are advertised host-only; the upgrade request target needs
    /// a path before the query string.
    fn connect_url(endpoint: &str, encoding: TransportEncoding) -> String {
        format!(
            "{}/?v={GATEWAY_VERSION}&encoding={}",
            endpoint.trim_end_matches('/'),
            encoding.as_str()
        )
    }

    /// Discover the connect endpoint through the REST surface
    async fn fetch_endpoint(&self) -> Result<String, GatewayError> {
        self.rest.get_gateway().await.map_err(|error| match error {
            RestError::Cancelled => GatewayError::Cancelled,
            other => GatewayError::Handshake(format!("failed to fetch gateway endpoint: {other}")),
        })
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
    }
}
