//! A2A Remote Client
//!
//! Issues typed task requests and subscribes to server-pushed events on a
//! remote peer. The wire transport is chosen at connect time:
//!
//! - **gRPC** over mTLS is tried first
//! - **WebSocket** (`wss://`) is the fallback when gRPC cannot be established
//!
//! Both authenticate with the workload's SPIFFE X.509-SVID, fetched fresh
//! from the local identity agent for every attempt, and verify the peer's
//! SPIFFE ID during the TLS handshake.

pub mod client;
pub mod error;
pub mod options;
pub mod transport;

pub use a2a_core::{ClientSettings, Event, Priority, TaskRequest, TaskResponse};
pub use client::A2aClient;
pub use error::ClientError;
pub use options::ConnectOptions;
pub use transport::{
    EventStream, GrpcFactory, Transport, TransportFactory, TransportKind, TransportState,
    WsFactory,
};
