// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid frame type: {0}")]
    InvalidFrameType(String),

    #[error("no credentials available")]
    NoCredentialsAvailable,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("max reconnection attempts reached")]
    MaxRetriesExceeded,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Reason string surfaced to callers through `ConnectionState.error`.
    /// Transport failures carry only the classified reason, without the
    /// "transport failure:" prefix.
    pub fn reason(&self) -> String {
        match self {
            Error::Transport(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Maps raw transport error text to a human-readable reason. Classification
/// never changes control flow, only what the caller sees.
pub fn classify_transport_error(raw: &str) -> String {
    let lower = raw.to_lowercase();

    // "unauthorized" would also match the bare "auth" probe, so the
    // status-code bucket is checked first.
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
    {
        "access denied".to_string()
    } else if lower.contains("auth") || lower.contains("token") {
        "authentication failed".to_string()
    } else if lower.contains("404") || lower.contains("not found") {
        "service not found".to_string()
    } else {
        raw.to_string()
    }
}
