// Copyright (c) 2026 Roman Barinov <rbarinov@gmail.com>
// Licensed under the FSL-1.1-NC.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Widget-mode credentials. When present, connecting never consults the
    /// external session; when absent, a session token is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub url: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Heartbeat period while connected; 0 disables.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_auto_connect")]
    pub auto_connect: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub widget_key: String,
    pub scope_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_anonymous: Option<bool>,
}

/// Partial config accepted by `ConnectionSupervisor::update_config`. Merging
/// never triggers a reconnection by itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    pub url: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub auto_connect: Option<bool>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub widget: Option<WidgetConfig>,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    20_000
}

fn default_auto_connect() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            auto_connect: default_auto_connect(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            endpoint: EndpointConfig {
                url: url.into(),
                connect_timeout_ms: default_connect_timeout_ms(),
                heartbeat_interval_ms: default_heartbeat_interval_ms(),
            },
            retry: RetryConfig::default(),
            widget: None,
        }
    }

    pub fn load(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config: Self = match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            None => Self::new(String::new()),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("REALTIME_ENDPOINT_URL") {
            self.endpoint.url = val;
        }
        if let Ok(val) = env::var("REALTIME_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.endpoint.connect_timeout_ms = ms;
            }
        }
        if let Ok(val) = env::var("REALTIME_AUTO_CONNECT") {
            if let Ok(enabled) = val.parse() {
                self.retry.auto_connect = enabled;
            }
        }
        if let Ok(val) = env::var("REALTIME_MAX_ATTEMPTS") {
            if let Ok(attempts) = val.parse() {
                self.retry.max_attempts = attempts;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.endpoint.url.is_empty() {
            anyhow::bail!("endpoint url is required");
        }
        if let Some(widget) = &self.widget {
            if widget.widget_key.is_empty() || widget.scope_id.is_empty() {
                anyhow::bail!("widget mode requires both widget_key and scope_id");
            }
        }
        Ok(())
    }

    /// True when the config declares the anonymous widget-mode auth path.
    pub fn is_widget_mode(&self) -> bool {
        self.widget.is_some()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.endpoint.heartbeat_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn merge(&mut self, patch: ConfigPatch) {
        if let Some(url) = patch.url {
            self.endpoint.url = url;
        }
        if let Some(ms) = patch.connect_timeout_ms {
            self.endpoint.connect_timeout_ms = ms;
        }
        if let Some(ms) = patch.heartbeat_interval_ms {
            self.endpoint.heartbeat_interval_ms = ms;
        }
        if let Some(enabled) = patch.auto_connect {
            self.retry.auto_connect = enabled;
        }
        if let Some(attempts) = patch.max_attempts {
            self.retry.max_attempts = attempts;
        }
        if let Some(ms) = patch.base_delay_ms {
            self.retry.base_delay_ms = ms;
        }
        if let Some(ms) = patch.max_delay_ms {
            self.retry.max_delay_ms = ms;
        }
        if let Some(widget) = patch.widget {
            self.widget = Some(widget);
        }
    }
}
