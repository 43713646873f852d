//! Identity error types.

/// Errors from fetching, parsing or using workload identity material.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity agent unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid identity material: {0}")]
    InvalidMaterial(String),

    #[error("Identity material for {spiffe_id} has expired")]
    Expired { spiffe_id: String },

    #[error("Invalid SPIFFE ID {id:?}: {reason}")]
    InvalidSpiffeId { id: String, reason: &'static str },

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
