//! Client error types.

use std::error::Error as StdError;
use std::io;

use a2a_identity::IdentityError;

/// Errors surfaced by [`A2aClient`](crate::A2aClient) and its transports.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No usable identity material could be obtained from the identity agent.
    #[error("Identity unavailable: {0}")]
    IdentityUnavailable(String),

    /// The TLS handshake failed, including a peer presenting the wrong SPIFFE ID.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The transport could not be established for a non-TLS reason.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Every candidate transport failed; carries the last failure.
    #[error("No transport could be established: {last}")]
    ConnectionUnavailable { last: Box<ClientError> },

    /// The peer sent something that does not follow the wire contract.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Client is closed")]
    ClientClosed,

    /// Failure on an established connection (RPC status, socket I/O).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// The innermost establishment failure, looking through
    /// [`ClientError::ConnectionUnavailable`].
    pub fn root(&self) -> &Self {
        match self {
            Self::ConnectionUnavailable { last } => last.root(),
            other => other,
        }
    }
}

impl From<IdentityError> for ClientError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidSpiffeId { .. } => Self::Config(e.to_string()),
            _ => Self::IdentityUnavailable(e.to_string()),
        }
    }
}

impl From<a2a_core::Error> for ClientError {
    fn from(e: a2a_core::Error) -> Self {
        Self::ProtocolViolation(e.to_string())
    }
}

/// Classify a failure to establish a connection.
///
/// Any `rustls::Error` in the source chain (certificate rejected, peer
/// identity mismatch, alert from the peer) makes it a handshake failure;
/// everything else means the transport was unreachable.
pub(crate) fn classify_connect_error(err: &(dyn StdError + 'static)) -> ClientError {
    match find_tls_error(err) {
        Some(tls) => ClientError::HandshakeFailed(tls.to_string()),
        None => ClientError::TransportUnavailable(describe(err)),
    }
}

fn find_tls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls);
        }
        // io::Error::source() skips the wrapped error itself.
        if let Some(tls) = e
            .downcast_ref::<io::Error>()
            .and_then(io::Error::get_ref)
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return Some(tls);
        }
        current = e.source();
    }
    None
}

/// Render an error followed by its `source()` chain.
pub(crate) fn describe(err: &dyn StdError) -> String {
    let chain = error_chain(err);
    if chain.is_empty() {
        err.to_string()
    } else {
        format!("{err}: {chain}")
    }
}

/// Walk the `source()` chain of an error and join into a single string.
fn error_chain(err: &dyn StdError) -> String {
    let mut chain = Vec::new();
    let mut current = err.source();
    while let Some(e) = current {
        chain.push(e.to_string());
        current = e.source();
    }
    chain.join(" -> ")
}
