//! Client facade
//!
//! Wires the REST executor, the gateway connection driver, and the event
//! dispatcher behind one handle. All recovery (retries, reconnects, resumes)
//! happens below this surface; the facade only exposes the typed results.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tern_common::{ClientConfig, ClientError, ClientResult, GatewayError};
use tern_gateway::connection::{ConnectionState, GatewayConnection};
use tern_gateway::dispatch::{DispatcherConfig, EventDispatcher, EventListener, ListenerId};
use tern_gateway::heartbeat::HeartbeatMonitor;
use tern_gateway::session::SessionManager;
use tern_gateway::EventType;
use tern_rest::{ApiRequest, ApiResponse, RequestExecutor};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type DriverHandle = JoinHandle<Result<(), GatewayError>>;

/// One client: a gateway connection plus a rate-limited REST executor
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Client {
    rest: Arc<RequestExecutor>,
    dispatcher: EventDispatcher,
    monitor: Arc<HeartbeatMonitor>,
    session: Arc<SessionManager>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    connection: Mutex<Option<GatewayConnection>>,
    driver: Mutex<Option<DriverHandle>>,
}

impl Client {
    /// Build a client from its configuration
    ///
    /// Must run inside a tokio runtime; the event dispatch task is spawned
    /// here. The gateway is not dialed until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let cancel = CancellationToken::new();
        let rest = Arc::new(
            RequestExecutor::new(config.rest.clone(), config.token.clone(), cancel.child_token())
                .map_err(ClientError::from)?,
        );
        let dispatcher = EventDispatcher::new(DispatcherConfig::default(), cancel.child_token());
        let session = Arc::new(SessionManager::new());
        let (connection, state_rx) = GatewayConnection::new(
            config,
            Arc::clone(&rest),
            Arc::clone(&session),
            dispatcher.sender(),
            cancel.child_token(),
        );
        let monitor = connection.monitor();

        Ok(Self {
            rest,
            dispatcher,
            monitor,
            session,
            state_rx,
            cancel,
            connection: Mutex::new(Some(connection)),
            driver: Mutex::new(None),
        })
    }

    /// Connect to the gateway and wait until the session is live
    ///
    /// Spawns the connection driver on the first call and suspends until the
    /// connection reaches [`ConnectionState::Connected`]. A terminal failure
    /// (rejected credentials, reconnects exhausted) surfaces as the driver's
    /// error; the driver does not restart after that.
    pub async fn connect(&self) -> ClientResult<()> {
        if let Some(connection) = self.connection.lock().take() {
            *self.driver.lock() = Some(tokio::spawn(connection.run()));
        }

        let mut state_rx = self.state_rx.clone();
        let reached = state_rx
            .wait_for(|state| {
                matches!(
                    state,
                    ConnectionState::Connected | ConnectionState::FatalError
                )
            })
            .await
            .map(|state| *state)
            .map_err(|_| GatewayError::Cancelled)
            .map_err(ClientError::from)?;

        if reached == ConnectionState::FatalError {
            return Err(self.take_fatal_error().await.into());
        }
        Ok(())
    }

    /// Shut the client down and wait for the driver to finish
    ///
    /// Idempotent; in-flight REST calls and the dispatch task observe the
    /// cancellation at their next suspension point.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(Ok(())) | Ok(Err(GatewayError::Cancelled)) => {}
                Ok(Err(error)) => {
                    tracing::debug!(%error, "Driver exited with an error during shutdown");
                }
                Err(join_error) => {
                    tracing::error!(panicked = join_error.is_panic(), "Driver task aborted");
                }
            }
        }
        tracing::info!("Client disconnected");
    }

    /// Execute a REST request under the rate limiter
    ///
    /// Fails fast without touching the network once the gateway has failed
    /// fatally; a fresh client is required after that.
    pub async fn send(&self, request: &ApiRequest) -> ClientResult<ApiResponse> {
        if self.state() == ConnectionState::FatalError {
            return Err(ClientError::from(GatewayError::NotConnected(
                "gateway connection failed fatally".to_string(),
            )));
        }
        self.rest.execute(request).await.map_err(ClientError::from)
    }

    /// Register a listener for an event type
    pub fn on(&self, event_type: EventType, listener: Arc<dyn EventListener>) -> ListenerId {
        self.dispatcher.register(event_type, listener)
    }

    /// Remove a previously registered listener
    pub fn off(&self, id: ListenerId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch receiver for observing connection state transitions
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Most recent heartbeat round-trip time, if one completed
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.monitor.latency()
    }

    /// Last gateway sequence number applied to the session
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.session.sequence()
    }

    /// The REST executor, for callers that build their own routes
    #[must_use]
    pub fn rest(&self) -> &Arc<RequestExecutor> {
        &self.rest
    }

    /// Join the finished driver to recover its terminal error
    async fn take_fatal_error(&self) -> GatewayError {
        let handle = self.driver.lock().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(Err(error)) => error,
                Ok(Ok(())) => GatewayError::NotConnected("driver already stopped".to_string()),
                Err(_) => GatewayError::NotConnected("driver task aborted".to_string()),
            },
            None => GatewayError::NotConnected("gateway connection failed fatally".to_string()),
        }
    }
}
