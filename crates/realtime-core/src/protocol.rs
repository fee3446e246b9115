// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Event(EventMessage),
    Ping(PingMessage),
    Pong(PongMessage),
    Error(ErrorMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub event: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: String,
    pub message: String,
}

impl Frame {
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Frame::Event(EventMessage {
            event: name.into(),
            data,
        })
    }

    pub fn frame_type(&self) -> &'static str {
        match self {
            Frame::Event(_) => "event",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Error(_) => "error",
        }
    }
}
