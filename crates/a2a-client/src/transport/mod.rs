//! Wire transports.
//!
//! Every transport speaks the same task/event contract; the facade holds one
//! as a `Box<dyn Transport>` and never names the concrete type.

pub mod grpc;
mod tls;
pub mod ws;

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::Stream;

use a2a_core::{Event, TaskRequest, TaskResponse};

use crate::error::ClientError;
use crate::options::ConnectOptions;

pub use grpc::GrpcTransport;
pub use ws::WsTransport;

/// Server-pushed events. Dropping the stream cancels the subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, ClientError>> + Send>>;

/// Which wire protocol a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Grpc,
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Grpc => f.write_str("grpc"),
            Self::WebSocket => f.write_str("websocket"),
        }
    }
}

/// Lifecycle of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Unconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closed = 3,
}

impl TransportState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

/// Lock-free holder for a [`TransportState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(TransportState::Unconnected as u8))
    }

    pub(crate) fn get(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: TransportState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Store `state` and return the previous one.
    pub(crate) fn replace(&self, state: TransportState) -> TransportState {
        TransportState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

/// A connected wire transport.
#[tonic::async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    fn state(&self) -> TransportState;

    /// Submit one task and wait for its reply.
    async fn send(&self, request: TaskRequest) -> Result<TaskResponse, ClientError>;

    /// Subscribe to events on `topic`.
    async fn stream(&self, topic: &str) -> Result<EventStream, ClientError>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Establishes one kind of transport.
#[tonic::async_trait]
pub trait TransportFactory: Send + Sync {
    fn kind(&self) -> TransportKind;

    async fn connect(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Transport>, ClientError>;
}

/// Factory for [`GrpcTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GrpcFactory;

#[tonic::async_trait]
impl TransportFactory for GrpcFactory {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    async fn connect(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Transport>, ClientError> {
        Ok(Box::new(GrpcTransport::connect(target, options).await?))
    }
}

/// Factory for [`WsTransport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WsFactory;

#[tonic::async_trait]
impl TransportFactory for WsFactory {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn connect(
        &self,
        target: &str,
        options: &ConnectOptions,
    ) -> Result<Box<dyn Transport>, ClientError> {
        Ok(Box::new(WsTransport::connect(target, options).await?))
    }
}
