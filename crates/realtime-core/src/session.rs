// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the external identity/session signal. Read-only here: the
/// supervisor observes transitions, it never mutates them.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub status: SessionStatus,
    pub token: Option<String>,
}

impl Session {
    pub fn loading() -> Self {
        Self {
            status: SessionStatus::Loading,
            token: None,
        }
    }

    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            token: Some(token.into()),
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            status: SessionStatus::Unauthenticated,
            token: None,
        }
    }
}

// Tokens are opaque secrets and must never leak into logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("status", &self.status)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
