//! Settings types with compiled defaults.

use std::fmt;

use serde::{Deserialize, Serialize};

/// WebSocket scheme used to reach the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain WebSocket.
    #[default]
    Ws,
    /// TLS WebSocket.
    Wss,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ws => write!(f, "ws"),
            Self::Wss => write!(f, "wss"),
        }
    }
}

impl Protocol {
    /// Parse from `"ws"` / `"wss"` (case-insensitive). Returns `None`
    /// for anything else.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ws" => Some(Self::Ws),
            "wss" => Some(Self::Wss),
            _ => None,
        }
    }
}

/// Transport and reconnect configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Backend address as `host:port`.
    pub address: String,
    /// WebSocket scheme.
    pub protocol: Protocol,
    /// Connect immediately on client construction.
    pub auto_connect: bool,
    /// Reconnect automatically after connection loss.
    pub reconnect_enabled: bool,
    /// Fixed delay between reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9500".into(),
            protocol: Protocol::Ws,
            auto_connect: true,
            reconnect_enabled: true,
            reconnect_delay_ms: 1000,
        }
    }
}

/// Credentials forwarded on the authenticate exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// User name; the backend accepts `"anonymous"` when anonymous
    /// access is allowed.
    pub user_name: String,
    /// Password, when authenticating with credentials.
    pub password: Option<String>,
    /// API token forwarded alongside the credentials.
    pub api_token: Option<String>,
    /// Stay usable without authenticating.
    pub allow_anonymous: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            user_name: "anonymous".into(),
            password: None,
            api_token: None,
            allow_anonymous: true,
        }
    }
}

/// Request/response correlation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Interval of the pending-call timeout sweep, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Default query timeout applied when a call specifies none.
    /// `None` means such calls wait until response or connection loss.
    pub default_timeout_ms: Option<u64>,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            sweep_interval_ms: 100,
            default_timeout_ms: None,
        }
    }
}

/// Full client configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Transport and reconnect configuration.
    pub connection: ConnectionSettings,
    /// Credentials.
    pub auth: AuthSettings,
    /// Correlation configuration.
    pub rpc: RpcSettings,
}
