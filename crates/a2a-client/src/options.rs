//! Connection options.

use std::sync::Arc;
use std::time::Duration;

use a2a_core::ClientSettings;
use a2a_identity::{IdentityProvider, SpiffeId, WorkloadApiClient};

/// WebSocket path used when none is configured.
pub const DEFAULT_SOCKET_PATH: &str = "/ws/a2a";

/// Upper bound on establishing one transport, identity fetch included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for [`A2aClient::connect`](crate::A2aClient::connect).
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    expected_peer: Option<SpiffeId>,
    prefer_structured: bool,
    socket_path: String,
    connect_timeout: Duration,
    settings: ClientSettings,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            expected_peer: None,
            prefer_structured: true,
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            settings: ClientSettings::default(),
            identity: None,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the peer to present exactly this SPIFFE ID.
    #[must_use]
    pub fn with_expected_peer(mut self, id: SpiffeId) -> Self {
        self.expected_peer = Some(id);
        self
    }

    /// Try gRPC before WebSocket (the default). When disabled only the
    /// WebSocket transport is attempted.
    #[must_use]
    pub const fn with_prefer_structured(mut self, prefer: bool) -> Self {
        self.prefer_structured = prefer;
        self
    }

    /// HTTP path of the WebSocket endpoint; a leading `/` is added if missing.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.socket_path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        self
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `provider` instead of the Workload API socket from the settings.
    #[must_use]
    pub fn with_identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    pub const fn expected_peer(&self) -> Option<&SpiffeId> {
        self.expected_peer.as_ref()
    }

    pub const fn prefer_structured(&self) -> bool {
        self.prefer_structured
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// The identity provider for establishment attempts.
    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        self.identity.clone().unwrap_or_else(|| {
            Arc::new(WorkloadApiClient::new(&self.settings.identity_socket))
        })
    }
}
