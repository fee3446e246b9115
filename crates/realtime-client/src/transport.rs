// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use crate::auth::Credentials;
use crate::config::ConnectionConfig;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use realtime_core::{classify_transport_error, codec, Error, Frame, PingMessage, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use uuid::Uuid;

/// Emitted exactly once per link, after a successful open, when the
/// connection terminates. `server_initiated` is true only when the remote
/// end performed an orderly close that this side did not start.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Closed {
        server_initiated: bool,
        reason: String,
    },
}

#[derive(Debug)]
pub enum LinkCommand {
    Frame(Frame),
    Close,
}

/// Handle to one open connection. The supervisor holds at most one live
/// link; a link that has been closed or superseded is never reused.
pub struct TransportLink {
    id: Uuid,
    open: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<LinkCommand>,
    events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
}

/// Counterpart of [`TransportLink::channel`]: the side a transport
/// implementation (or a test double) drives.
pub struct LinkController {
    pub open: Arc<AtomicBool>,
    pub events: mpsc::UnboundedSender<LinkEvent>,
    pub outbound: mpsc::UnboundedReceiver<LinkCommand>,
}

impl TransportLink {
    pub fn channel(id: Uuid) -> (TransportLink, LinkController) {
        let open = Arc::new(AtomicBool::new(true));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let link = TransportLink {
            id,
            open: open.clone(),
            outbound: outbound_tx,
            events: Some(event_rx),
        };
        let controller = LinkController {
            open,
            events: event_tx,
            outbound: outbound_rx,
        };
        (link, controller)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn send(&self, frame: Frame) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Transport("link closed".to_string()));
        }
        self.outbound
            .send(LinkCommand::Frame(frame))
            .map_err(|_| Error::Transport("link closed".to_string()))
    }

    /// Idempotent teardown. Late events from this link are filtered out by
    /// the supervisor's epoch check.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(LinkCommand::Close);
        }
    }

    /// Hands out the link's event stream once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<LinkEvent>> {
        self.events.take()
    }
}

/// One real connection attempt per `open` call. `Ok` means the underlying
/// transport reported itself open; `Err` carries the classified reason.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(
        &self,
        config: &ConnectionConfig,
        credentials: &Credentials,
    ) -> Result<TransportLink>;
}

/// Default duplex transport over tokio-tungstenite.
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &self,
        config: &ConnectionConfig,
        credentials: &Credentials,
    ) -> Result<TransportLink> {
        let mut request = config
            .endpoint
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Transport(classify_transport_error(&e.to_string())))?;
        apply_auth_headers(&mut request, credentials)?;

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Transport(classify_transport_error(&e.to_string())))?;

        let (link, controller) = TransportLink::channel(Uuid::new_v4());
        spawn_socket_io(stream, controller, config.heartbeat_interval());
        Ok(link)
    }
}

fn apply_auth_headers(request: &mut Request, credentials: &Credentials) -> Result<()> {
    let header = |value: &str| {
        HeaderValue::from_str(value)
            .map_err(|_| Error::Transport("credential not encodable as header".to_string()))
    };
    let headers = request.headers_mut();

    match credentials {
        Credentials::Session { token } => {
            headers.insert("authorization", header(&format!("Bearer {}", token))?);
        }
        Credentials::Widget {
            widget_key,
            scope_id,
            permissions,
            allow_anonymous,
        } => {
            headers.insert("x-widget-key", header(widget_key)?);
            headers.insert("x-widget-scope", header(scope_id)?);
            if !permissions.is_empty() {
                headers.insert("x-widget-permissions", header(&permissions.join(","))?);
            }
            headers.insert("x-widget-anonymous", header(&allow_anonymous.to_string())?);
        }
    }
    Ok(())
}

/// Bridges the socket and the link channels until either side terminates,
/// then reports the single close event.
fn spawn_socket_io(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    controller: LinkController,
    heartbeat: Option<Duration>,
) {
    tokio::spawn(async move {
        let LinkController {
            open,
            events,
            mut outbound,
        } = controller;
        let (mut write, mut read) = stream.split();
        let mut ticker = heartbeat.map(|period| {
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });

        let closed = loop {
            tokio::select! {
                cmd = outbound.recv() => match cmd {
                    Some(LinkCommand::Frame(frame)) => {
                        let text = match codec::encode_frame(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!("dropping unencodable frame: {}", e);
                                continue;
                            }
                        };
                        if write.send(Message::Text(text)).await.is_err() {
                            break LinkEvent::Closed {
                                server_initiated: false,
                                reason: "write failed".to_string(),
                            };
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break LinkEvent::Closed {
                            server_initiated: false,
                            reason: "closed by client".to_string(),
                        };
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Close(frame))) => {
                        let locally_closed = !open.load(Ordering::SeqCst);
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string());
                        break LinkEvent::Closed {
                            server_initiated: !locally_closed,
                            reason,
                        };
                    }
                    Some(Ok(Message::Text(text))) => handle_inbound(&text, &mut write).await,
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = write.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break LinkEvent::Closed {
                            server_initiated: false,
                            reason: classify_transport_error(&e.to_string()),
                        };
                    }
                    None => {
                        break LinkEvent::Closed {
                            server_initiated: false,
                            reason: "connection closed".to_string(),
                        };
                    }
                },
                _ = tick(&mut ticker) => {
                    let ping = Frame::Ping(PingMessage { timestamp: now_secs() });
                    if let Ok(text) = codec::encode_frame(&ping) {
                        if write.send(Message::Text(text)).await.is_err() {
                            break LinkEvent::Closed {
                                server_initiated: false,
                                reason: "write failed".to_string(),
                            };
                        }
                    }
                }
            }
        };

        open.store(false, Ordering::SeqCst);
        let _ = events.send(closed);
    });
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn handle_inbound<S>(text: &str, write: &mut S)
where
    S: futures::Sink<Message> + Unpin,
{
    match codec::decode_frame(text) {
        Ok(Frame::Ping(ping)) => {
            let pong = Frame::Pong(realtime_core::PongMessage {
                timestamp: ping.timestamp,
            });
            if let Ok(text) = codec::encode_frame(&pong) {
                let _ = write.send(Message::Text(text)).await;
            }
        }
        Ok(Frame::Error(e)) => {
            warn!(code = %e.code, "server error: {}", classify_transport_error(&e.message));
        }
        Ok(frame) => {
            debug!("inbound {} frame", frame.frame_type());
        }
        Err(e) => {
            debug!("undecodable inbound frame: {}", e);
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
