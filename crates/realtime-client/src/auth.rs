// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use crate::config::ConnectionConfig;
use async_trait::async_trait;
use realtime_core::{Error, Result, Session};
use serde::Serialize;

/// External source of the current identity/session. Implementations fetch
/// whatever the host application considers the session of record; the
/// supervisor never caches through this call.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self) -> Session;
}

/// Auth payload handed to the transport for one connection attempt.
#[derive(Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Credentials {
    Widget {
        widget_key: String,
        scope_id: String,
        permissions: Vec<String>,
        allow_anonymous: bool,
    },
    Session {
        token: String,
    },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Widget {
                widget_key,
                scope_id,
                permissions,
                allow_anonymous,
            } => f
                .debug_struct("Widget")
                .field("widget_key", widget_key)
                .field("scope_id", scope_id)
                .field("permissions", permissions)
                .field("allow_anonymous", allow_anonymous)
                .finish(),
            Credentials::Session { .. } => f
                .debug_struct("Session")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Picks the auth payload for a connection attempt. Widget-mode configs are
/// self-contained and never consult the provider; everything else requires a
/// session token at the moment of connecting. No retries here — retry policy
/// belongs to the supervisor.
pub async fn resolve_credentials(
    config: &ConnectionConfig,
    provider: &dyn SessionProvider,
) -> Result<Credentials> {
    if let Some(widget) = &config.widget {
        return Ok(Credentials::Widget {
            widget_key: widget.widget_key.clone(),
            scope_id: widget.scope_id.clone(),
            permissions: widget.permissions.clone(),
            allow_anonymous: widget.allow_anonymous.unwrap_or(true),
        });
    }

    let session = provider.current_session().await;
    match session.token {
        Some(token) if !token.is_empty() => Ok(Credentials::Session { token }),
        _ => Err(Error::NoCredentialsAvailable),
    }
}
