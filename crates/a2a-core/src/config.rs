//! Client settings.
//!
//! Resolved once by the process that owns the client (usually from the
//! environment) and passed explicitly into `connect`. Nothing in the client
//! reads the environment on its own.

use serde::{Deserialize, Serialize};

/// Environment variable naming the SPIFFE Workload API socket.
pub const ENV_IDENTITY_SOCKET: &str = "SPIFFE_ENDPOINT_SOCKET";

/// Environment variable enabling insecure (plaintext, unauthenticated) mode.
pub const ENV_INSECURE: &str = "A2A_INSECURE";

/// Default Workload API socket exposed by the SPIRE agent.
pub const DEFAULT_IDENTITY_SOCKET: &str = "unix:///run/spire/sockets/agent.sock";

/// Transport-independent client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Disable identity verification and TLS entirely. Development only.
    pub insecure: bool,
    /// Address of the local identity agent (`unix:///path` or a bare path).
    pub identity_socket: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            insecure: false,
            identity_socket: DEFAULT_IDENTITY_SOCKET.to_string(),
        }
    }
}

impl ClientSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let identity_socket = lookup(ENV_IDENTITY_SOCKET)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IDENTITY_SOCKET.to_string());
        let insecure = lookup(ENV_INSECURE).is_some_and(|v| parse_flag(&v));
        if insecure {
            tracing::warn!("{ENV_INSECURE} is set: identity verification and TLS are disabled");
        }
        Self {
            insecure,
            identity_socket,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
