//! A2A Protocol Buffers
//!
//! Generated protobuf code for the remote-swarm gRPC surface.
//!
//! This crate contains:
//! - `Router` for task submission and topic event streams
//! - `SpiffeWorkloadAPI` for fetching X.509-SVIDs from the local SPIFFE agent

#![allow(clippy::derive_partial_eq_without_eq)]

/// A2A v1 API definitions.
pub mod v1 {
    tonic::include_proto!("a2a.v1");
}

/// SPIFFE Workload API definitions.
///
/// The upstream proto declares no package, so the generated code lives in `_.rs`
/// and the service path stays `/SpiffeWorkloadAPI/FetchX509SVID`.
pub mod workload {
    tonic::include_proto!("_");
}

// Re-export v1 as the default API version for convenience
pub use v1::*;

/// Metadata key the Workload API requires on every call.
pub const WORKLOAD_API_HEADER: &str = "workload.spiffe.io";
