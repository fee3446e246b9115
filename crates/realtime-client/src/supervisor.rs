// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

//! Connection lifecycle driver. All mutable state lives inside a single
//! spawned task; public methods and background callbacks (resolver results,
//! transport signals, retry timers) post events into one serialized stream,
//! so transitions are handled one at a time in arrival order. Every attempt
//! carries an epoch, and signals tagged with a superseded epoch are dropped —
//! a slow, abandoned attempt can never resurrect state the supervisor has
//! already moved past.

use crate::auth::{resolve_credentials, Credentials, SessionProvider};
use crate::backoff::BackoffPolicy;
use crate::config::{ConfigPatch, ConnectionConfig};
use crate::transport::{LinkEvent, Transport, TransportLink, WebSocketTransport};
use realtime_core::{
    ConnectionState, ConnectionStatus, Error, Frame, Result, Session, SessionStatus,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Command {
    Connect,
    Disconnect,
    Reconnect,
    Send { event: String, data: Value },
    UpdateConfig(ConfigPatch),
    SessionChanged(Session),
    Shutdown,
}

enum Event {
    Command(Command),
    Resolved {
        epoch: u64,
        result: Result<Credentials>,
    },
    Opened {
        epoch: u64,
        result: Result<TransportLink>,
    },
    LinkClosed {
        epoch: u64,
        server_initiated: bool,
        reason: String,
    },
    RetryElapsed {
        epoch: u64,
    },
}

/// Owner of one logical connection: resolves credentials, opens the
/// transport, classifies failures, and retries with capped exponential
/// backoff. Callers observe [`ConnectionState`]; nothing here throws across
/// the public surface.
pub struct ConnectionSupervisor {
    events: mpsc::UnboundedSender<Event>,
    state: watch::Receiver<ConnectionState>,
    driver: JoinHandle<()>,
}

impl ConnectionSupervisor {
    pub fn new(
        config: ConnectionConfig,
        provider: Arc<dyn SessionProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());

        let driver = Driver {
            backoff: BackoffPolicy::new(
                Duration::from_millis(config.retry.base_delay_ms),
                Duration::from_millis(config.retry.max_delay_ms),
            ),
            config,
            transport,
            provider,
            events: event_tx.clone(),
            state: state_tx,
            session: Session::loading(),
            epoch: 0,
            link: None,
            retry_timer: None,
        };

        Self {
            events: event_tx,
            state: state_rx,
            driver: tokio::spawn(driver.run(event_rx)),
        }
    }

    /// Supervisor over the default WebSocket transport.
    pub fn websocket(config: ConnectionConfig, provider: Arc<dyn SessionProvider>) -> Self {
        Self::new(config, provider, Arc::new(WebSocketTransport))
    }

    /// Starts the connection flow. No-op while already
    /// connecting/authenticating/connected.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Universal cancellation: tears down any attempt, timer, and live
    /// connection. Idempotent, always ends disconnected.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Forces an immediate re-attempt, bypassing any pending backoff wait.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Best-effort outbound send. Dropped with a warning unless the live
    /// transport reports itself open; never queued, never raises.
    pub fn send(&self, event: impl Into<String>, data: Value) {
        self.command(Command::Send {
            event: event.into(),
            data,
        });
    }

    /// Merges a partial config. Does not itself trigger reconnection.
    pub fn update_config(&self, patch: ConfigPatch) {
        self.command(Command::UpdateConfig(patch));
    }

    /// Called by the external session provider on every status change.
    pub fn notify_session_changed(&self, session: Session) {
        self.command(Command::SessionChanged(session));
    }

    /// Current snapshot of the connection lifecycle.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch handle for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Disconnects and stops the driver task.
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    fn command(&self, command: Command) {
        if self.events.send(Event::Command(command)).is_err() {
            warn!("supervisor driver is gone, command dropped");
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

struct Driver {
    config: ConnectionConfig,
    backoff: BackoffPolicy,
    transport: Arc<dyn Transport>,
    provider: Arc<dyn SessionProvider>,
    events: mpsc::UnboundedSender<Event>,
    state: watch::Sender<ConnectionState>,
    session: Session,
    epoch: u64,
    link: Option<TransportLink>,
    retry_timer: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            match event {
                Event::Command(Command::Shutdown) => {
                    self.disconnect();
                    break;
                }
                Event::Command(command) => self.handle_command(command),
                Event::Resolved { epoch, result } => self.on_resolved(epoch, result),
                Event::Opened { epoch, result } => self.on_opened(epoch, result),
                Event::LinkClosed {
                    epoch,
                    server_initiated,
                    reason,
                } => self.on_link_closed(epoch, server_initiated, reason),
                Event::RetryElapsed { epoch } => self.on_retry_elapsed(epoch),
            }
        }
        debug!("supervisor driver stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Reconnect => self.reconnect(),
            Command::Send { event, data } => self.forward(event, data),
            Command::UpdateConfig(patch) => {
                self.config.merge(patch);
                self.backoff = BackoffPolicy::new(
                    Duration::from_millis(self.config.retry.base_delay_ms),
                    Duration::from_millis(self.config.retry.max_delay_ms),
                );
            }
            Command::SessionChanged(session) => self.session_changed(session),
            Command::Shutdown => unreachable!("handled in run"),
        }
    }

    fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    fn update(&self, mutate: impl FnOnce(&mut ConnectionState)) {
        self.state.send_modify(mutate);
    }

    fn connect(&mut self) {
        match self.status() {
            ConnectionStatus::Connecting
            | ConnectionStatus::Authenticating
            | ConnectionStatus::Connected => {
                debug!(status = ?self.status(), "connect ignored, already active");
            }
            ConnectionStatus::Disconnected
            | ConnectionStatus::Reconnecting
            | ConnectionStatus::Error => self.begin_attempt(),
        }
    }

    fn reconnect(&mut self) {
        match self.status() {
            ConnectionStatus::Connecting | ConnectionStatus::Authenticating => {
                debug!("reconnect ignored, attempt already in flight");
            }
            _ => {
                info!("forcing reconnect");
                self.begin_attempt();
            }
        }
    }

    fn disconnect(&mut self) {
        self.epoch += 1;
        self.cancel_retry_timer();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.update(|state| *state = ConnectionState::default());
        info!("disconnected");
    }

    /// Starts one connection attempt under a fresh epoch. Anything still in
    /// flight from an earlier epoch becomes stale the moment this runs.
    fn begin_attempt(&mut self) {
        self.cancel_retry_timer();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.epoch += 1;
        let epoch = self.epoch;

        self.update(|state| {
            state.status = ConnectionStatus::Connecting;
            state.error = None;
            state.connection_id = None;
        });

        let config = self.config.clone();
        let provider = self.provider.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = resolve_credentials(&config, provider.as_ref()).await;
            let _ = events.send(Event::Resolved { epoch, result });
        });
    }

    fn on_resolved(&mut self, epoch: u64, result: Result<Credentials>) {
        if epoch != self.epoch || self.status() != ConnectionStatus::Connecting {
            debug!("stale credential resolution ignored");
            return;
        }

        match result {
            Ok(credentials) => {
                self.update(|state| state.status = ConnectionStatus::Authenticating);

                let config = self.config.clone();
                let transport = self.transport.clone();
                let events = self.events.clone();
                let attempt_timeout = self.config.connect_timeout();
                tokio::spawn(async move {
                    let open = transport.open(&config, &credentials);
                    let result = match tokio::time::timeout(attempt_timeout, open).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout),
                    };
                    let _ = events.send(Event::Opened { epoch, result });
                });
            }
            Err(e) => {
                // Not a transport retry: the attempt counter stays put and
                // no timer is scheduled until the caller supplies a session
                // or reconfigures.
                warn!("credential resolution failed: {}", e);
                self.update(|state| {
                    state.status = ConnectionStatus::Error;
                    state.error = Some(e.reason());
                });
            }
        }
    }

    fn on_opened(&mut self, epoch: u64, result: Result<TransportLink>) {
        if epoch != self.epoch || self.status() != ConnectionStatus::Authenticating {
            if let Ok(link) = result {
                debug!(connection_id = %link.id(), "discarding stale transport open");
                link.close();
            }
            return;
        }

        match result {
            Ok(mut link) => {
                if let Some(mut signals) = link.take_events() {
                    let events = self.events.clone();
                    tokio::spawn(async move {
                        while let Some(LinkEvent::Closed {
                            server_initiated,
                            reason,
                        }) = signals.recv().await
                        {
                            let _ = events.send(Event::LinkClosed {
                                epoch,
                                server_initiated,
                                reason,
                            });
                        }
                    });
                }

                info!(connection_id = %link.id(), "connected");
                self.update(|state| {
                    state.status = ConnectionStatus::Connected;
                    state.error = None;
                    state.attempts = 0;
                    state.connected_at = Some(SystemTime::now());
                    state.connection_id = Some(link.id());
                });
                self.link = Some(link);
            }
            Err(e) => {
                let reason = e.reason();
                self.record_failure(ConnectionStatus::Error, reason);
            }
        }
    }

    fn on_link_closed(&mut self, epoch: u64, server_initiated: bool, reason: String) {
        if epoch != self.epoch {
            debug!("stale close signal ignored");
            return;
        }
        if let Some(link) = self.link.take() {
            link.close();
        }

        if server_initiated {
            // The server explicitly ended the session; the caller must
            // re-initiate. Never a retry, never a timer.
            info!("server closed the connection: {}", reason);
            self.epoch += 1;
            self.update(|state| {
                state.status = ConnectionStatus::Disconnected;
                state.error = None;
                state.connection_id = None;
            });
            return;
        }

        self.record_failure(ConnectionStatus::Reconnecting, reason);
    }

    /// Shared retry bookkeeping for failed opens and unexpected closes:
    /// count the failure, give up at the ceiling, otherwise schedule the
    /// backoff timer and settle into `interim` while waiting.
    fn record_failure(&mut self, interim: ConnectionStatus, reason: String) {
        let failures = self.state.borrow().attempts;
        let attempts = failures + 1;

        if attempts >= self.config.retry.max_attempts {
            warn!(attempts, "giving up after {}: {}", reason, Error::MaxRetriesExceeded);
            self.update(|state| {
                state.status = ConnectionStatus::Error;
                state.attempts = attempts;
                state.error = Some(Error::MaxRetriesExceeded.reason());
                state.connection_id = None;
            });
            return;
        }

        let delay = self.backoff.delay(failures);
        warn!(attempts, "connection lost ({}), retrying in {:?}", reason, delay);
        self.update(|state| {
            state.status = interim;
            state.attempts = attempts;
            state.error = Some(reason);
            state.connection_id = None;
        });
        self.schedule_retry(delay);
    }

    fn on_retry_elapsed(&mut self, epoch: u64) {
        if epoch != self.epoch {
            debug!("stale retry timer ignored");
            return;
        }
        match self.status() {
            ConnectionStatus::Reconnecting | ConnectionStatus::Error => {
                info!("backoff elapsed, retrying");
                self.begin_attempt();
            }
            _ => {}
        }
    }

    fn forward(&mut self, event: String, data: Value) {
        let connected = self.status() == ConnectionStatus::Connected;
        let live = self
            .link
            .as_ref()
            .filter(|link| connected && link.is_open());
        match live {
            Some(link) => {
                if let Err(e) = link.send(Frame::event(event, data)) {
                    warn!("send failed, dropping event: {}", e);
                }
            }
            None => warn!(event = %event, "not connected, dropping outbound event"),
        }
    }

    fn session_changed(&mut self, session: Session) {
        self.session = session;

        let authenticated = self.session.status == SessionStatus::Authenticated
            && self.session.token.is_some();
        if self.status() == ConnectionStatus::Disconnected
            && self.config.retry.auto_connect
            && authenticated
            && self.link.is_none()
        {
            info!("session authenticated, auto-connecting");
            self.begin_attempt();
        }
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_retry_timer();
        let epoch = self.epoch;
        let events = self.events.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::RetryElapsed { epoch });
        }));
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }
}
