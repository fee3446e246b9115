// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use realtime_client::{
    ConnectionConfig, LinkController, LinkEvent, SessionProvider, Transport, TransportLink,
};
use realtime_core::{classify_transport_error, ConnectionState, ConnectionStatus, Error, Session};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realtime_client=debug".into()),
        )
        .try_init();
}

/// Config tuned for fast tests: tiny backoff, no heartbeat.
pub fn test_config() -> ConnectionConfig {
    let mut config = ConnectionConfig::new("ws://127.0.0.1:1/socket");
    config.endpoint.connect_timeout_ms = 2_000;
    config.endpoint.heartbeat_interval_ms = 0;
    config.retry.max_attempts = 5;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 40;
    config
}

pub async fn wait_for(
    state: &mut watch::Receiver<ConnectionState>,
    predicate: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(5), state.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("supervisor driver gone")
        .clone()
}

pub async fn wait_for_status(
    state: &mut watch::Receiver<ConnectionState>,
    status: ConnectionStatus,
) -> ConnectionState {
    wait_for(state, |s| s.status == status).await
}

// ── Session providers ───────────────────────────────────────────────────────

/// Provider returning whatever snapshot was last stored.
pub struct StaticSessions(RwLock<Session>);

impl StaticSessions {
    pub fn new(session: Session) -> Arc<Self> {
        Arc::new(Self(RwLock::new(session)))
    }

    pub fn set(&self, session: Session) {
        *self.0.write().unwrap() = session;
    }
}

#[async_trait]
impl SessionProvider for StaticSessions {
    async fn current_session(&self) -> Session {
        self.0.read().unwrap().clone()
    }
}

/// Provider that must never be consulted (widget-mode paths).
pub struct FailingSessions;

#[async_trait]
impl SessionProvider for FailingSessions {
    async fn current_session(&self) -> Session {
        panic!("session provider must not be consulted");
    }
}

// ── Scripted transport ──────────────────────────────────────────────────────

#[derive(Clone)]
pub enum OpenPlan {
    /// Open succeeds; the paired `LinkController` is handed to the test.
    Succeed,
    /// Open fails with this raw transport error.
    Fail(String),
    /// Open never completes (exercises the per-attempt timeout).
    Hang,
    /// Open blocks until `ScriptedTransport::gate` is released, then
    /// succeeds. Used to race attempts against disconnects.
    Gated,
}

pub struct ScriptedTransport {
    plan: Mutex<VecDeque<OpenPlan>>,
    fallback: OpenPlan,
    opens: AtomicUsize,
    controllers: mpsc::UnboundedSender<LinkController>,
    pub gate: Notify,
}

impl ScriptedTransport {
    pub fn new(fallback: OpenPlan) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkController>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            plan: Mutex::new(VecDeque::new()),
            fallback,
            opens: AtomicUsize::new(0),
            controllers: tx,
            gate: Notify::new(),
        });
        (transport, rx)
    }

    pub fn enqueue(&self, plan: OpenPlan) {
        self.plan.lock().unwrap().push_back(plan);
    }

    /// Total open attempts made so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        _config: &ConnectionConfig,
        _credentials: &realtime_client::Credentials,
    ) -> realtime_core::Result<TransportLink> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match plan {
            OpenPlan::Succeed => {
                let (link, controller) = TransportLink::channel(Uuid::new_v4());
                let _ = self.controllers.send(controller);
                Ok(link)
            }
            OpenPlan::Fail(raw) => Err(Error::Transport(classify_transport_error(&raw))),
            OpenPlan::Hang => {
                std::future::pending::<realtime_core::Result<TransportLink>>().await
            }
            OpenPlan::Gated => {
                self.gate.notified().await;
                let (link, controller) = TransportLink::channel(Uuid::new_v4());
                let _ = self.controllers.send(controller);
                Ok(link)
            }
        }
    }
}

/// Terminates a scripted link the way a real transport would: the link stops
/// reporting open, then the close signal fires.
pub fn emit_close(controller: &LinkController, server_initiated: bool, reason: &str) {
    controller.open.store(false, Ordering::SeqCst);
    let _ = controller.events.send(LinkEvent::Closed {
        server_initiated,
        reason: reason.to_string(),
    });
}

// ── Real WebSocket server ───────────────────────────────────────────────────

pub struct WsTestServer {
    pub url: String,
    pub conns: mpsc::UnboundedReceiver<WsServerConn>,
    _accept_task: JoinHandle<()>,
}

pub struct WsServerConn {
    pub headers: HashMap<String, String>,
    /// Text frames received from the client.
    pub frames: mpsc::UnboundedReceiver<String>,
    close: mpsc::UnboundedSender<()>,
}

impl WsServerConn {
    /// Makes the server side perform an orderly close.
    pub fn close_from_server(&self) {
        let _ = self.close.send(());
    }
}

impl WsTestServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_tx = conn_tx.clone();
                tokio::spawn(async move {
                    let headers = Arc::new(Mutex::new(HashMap::new()));
                    let captured = headers.clone();
                    let callback = move |req: &Request, resp: Response| {
                        let mut headers = captured.lock().unwrap();
                        for (name, value) in req.headers() {
                            headers.insert(
                                name.as_str().to_string(),
                                value.to_str().unwrap_or("").to_string(),
                            );
                        }
                        Ok(resp)
                    };

                    let mut ws = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };

                    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
                    let (close_tx, mut close_rx) = mpsc::unbounded_channel();
                    let _ = conn_tx.send(WsServerConn {
                        headers: headers.lock().unwrap().clone(),
                        frames: frame_rx,
                        close: close_tx,
                    });

                    loop {
                        tokio::select! {
                            cmd = close_rx.recv() => {
                                if cmd.is_some() {
                                    let _ = ws
                                        .send(Message::Close(Some(CloseFrame {
                                            code: CloseCode::Normal,
                                            reason: "server going away".into(),
                                        })))
                                        .await;
                                    // let the close handshake finish
                                    while let Some(Ok(_)) = ws.next().await {}
                                }
                                break;
                            }
                            msg = ws.next() => match msg {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = frame_tx.send(text);
                                }
                                Some(Ok(Message::Ping(payload))) => {
                                    let _ = ws.send(Message::Pong(payload)).await;
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{}/socket", port),
            conns: conn_rx,
            _accept_task: accept_task,
        }
    }

    pub async fn next_conn(&mut self) -> WsServerConn {
        tokio::time::timeout(Duration::from_secs(5), self.conns.recv())
            .await
            .expect("timed out waiting for server-side connection")
            .expect("server accept loop gone")
    }
}
