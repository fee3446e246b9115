// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Reconnecting,
    Error,
}

/// Snapshot of the supervisor's lifecycle state, published on every
/// transition. Callers observe this instead of catching errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Classified reason for the most recent failure, if any.
    pub error: Option<String>,
    /// Consecutive failed attempts since the last successful connection.
    pub attempts: u32,
    pub connected_at: Option<SystemTime>,
    /// Opaque id assigned by the transport on a successful open.
    pub connection_id: Option<Uuid>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            error: None,
            attempts: 0,
            connected_at: None,
            connection_id: None,
        }
    }
}
