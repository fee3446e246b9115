// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

pub mod auth;
pub mod backoff;
pub mod config;
pub mod supervisor;
pub mod transport;

pub use auth::{resolve_credentials, Credentials, SessionProvider};
pub use backoff::BackoffPolicy;
pub use config::{ConfigPatch, ConnectionConfig, WidgetConfig};
pub use supervisor::ConnectionSupervisor;
pub use transport::{
    LinkCommand, LinkController, LinkEvent, Transport, TransportLink, WebSocketTransport,
};
