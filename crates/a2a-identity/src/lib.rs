//! A2A Workload Identity Library
//!
//! Authenticates A2A connections with short-lived SPIFFE X.509-SVIDs instead
//! of static secrets.
//!
//! ## Pieces
//!
//! - **Provider**: fetches identity material (leaf chain, key, trust bundle)
//!   from the local SPIFFE Workload API on every call; nothing is cached
//! - **Material**: parsed SVID with its SPIFFE ID and expiry
//! - **Verification**: rustls client config that validates the peer chain
//!   against the bundle and then enforces the expected peer SPIFFE ID

#[cfg(any(test, feature = "certs"))]
pub mod certs;
pub mod error;
pub mod material;
pub mod provider;
pub mod spiffe_id;
pub mod verify;
pub mod workload;

pub use error::IdentityError;
pub use material::IdentityMaterial;
pub use provider::{IdentityProvider, StaticIdentityProvider};
pub use spiffe_id::{SpiffeId, extract_spiffe_id};
pub use verify::{SpiffeServerVerifier, build_client_config};
pub use workload::WorkloadApiClient;
