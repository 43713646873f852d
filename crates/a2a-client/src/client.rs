//! Unified A2A client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use a2a_core::{ClientSettings, TaskRequest, TaskResponse};
use a2a_identity::SpiffeId;

use crate::error::ClientError;
use crate::options::ConnectOptions;
use crate::transport::{
    EventStream, GrpcFactory, Transport, TransportFactory, TransportKind, TransportState,
    WsFactory,
};

/// Client bound to exactly one transport for its whole lifetime.
///
/// Callers never choose the wire protocol: `connect` tries gRPC first and
/// falls back to WebSocket, and the bound transport is then fixed.
pub struct A2aClient {
    target: String,
    transport: Box<dyn Transport>,
    closed: AtomicBool,
}

impl A2aClient {
    /// Connect to `target` (`host:port`), preferring gRPC.
    pub async fn connect(target: &str, options: ConnectOptions) -> Result<Self, ClientError> {
        let factories: Vec<Box<dyn TransportFactory>> = if options.prefer_structured() {
            vec![Box::new(GrpcFactory), Box::new(WsFactory)]
        } else {
            vec![Box::new(WsFactory)]
        };
        Self::connect_with(target, options, &factories).await
    }

    /// Connect to `service` with default options and environment settings.
    pub async fn remote(service: &str, expected_peer: Option<&str>) -> Result<Self, ClientError> {
        let mut options = ConnectOptions::new().with_settings(ClientSettings::from_env());
        if let Some(peer) = expected_peer {
            options = options.with_expected_peer(SpiffeId::parse(peer)?);
        }
        Self::connect(service, options).await
    }

    /// Try each factory in order and bind the first transport that connects.
    ///
    /// Every attempt fetches its own identity material and is bounded by the
    /// connect timeout. Establishment failures are logged, not surfaced,
    /// unless every factory fails.
    pub async fn connect_with(
        target: &str,
        options: ConnectOptions,
        factories: &[Box<dyn TransportFactory>],
    ) -> Result<Self, ClientError> {
        if target.trim().is_empty() {
            return Err(ClientError::ConnectionUnavailable {
                last: Box::new(ClientError::Config("target must not be empty".into())),
            });
        }

        let mut last = None;
        for factory in factories {
            let kind = factory.kind();
            debug!(%target, transport = %kind, "Attempting transport");
            let attempt = tokio::time::timeout(
                options.connect_timeout(),
                factory.connect(target, &options),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ClientError::TransportUnavailable(format!(
                    "{kind} connect timed out after {:?}",
                    options.connect_timeout()
                )))
            });

            match attempt {
                Ok(transport) => {
                    info!(%target, transport = %kind, "A2A client connected");
                    return Ok(Self {
                        target: target.to_string(),
                        transport,
                        closed: AtomicBool::new(false),
                    });
                }
                Err(e) => {
                    warn!(%target, transport = %kind, error = %e, "Transport establishment failed");
                    last = Some(e);
                }
            }
        }

        Err(ClientError::ConnectionUnavailable {
            last: Box::new(
                last.unwrap_or_else(|| ClientError::Config("no transports configured".into())),
            ),
        })
    }

    /// Connect, run `f` with the client, then close it whatever `f` returned.
    pub async fn scoped<F, Fut, T>(
        target: &str,
        options: ConnectOptions,
        f: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let client = Arc::new(Self::connect(target, options).await?);
        let outcome = f(Arc::clone(&client)).await;
        let closed = client.close().await;
        let value = outcome?;
        closed?;
        Ok(value)
    }

    pub async fn send(&self, request: TaskRequest) -> Result<TaskResponse, ClientError> {
        self.ensure_open()?;
        self.transport.send(request).await
    }

    pub async fn stream(&self, topic: &str) -> Result<EventStream, ClientError> {
        self.ensure_open()?;
        self.transport.stream(topic).await
    }

    /// Close the bound transport. Only the first call reaches it.
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(target = %self.target, "Closing A2A client");
        self.transport.close().await
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::Acquire) {
            Err(ClientError::ClientClosed)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for A2aClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("A2aClient")
            .field("target", &self.target)
            .field("transport", &self.transport.kind())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
