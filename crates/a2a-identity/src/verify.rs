//! mTLS configuration with SPIFFE peer authentication.
//!
//! SPIFFE peers are authenticated by the URI SAN of their SVID, not by DNS
//! name. The verifier here runs ordinary chain validation against the trust
//! bundle and then, if an expected peer was given, requires the leaf to carry
//! exactly that SPIFFE ID.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::verify_server_cert_signed_by_trust_anchor;
use rustls::crypto::{
    CryptoProvider, WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, OtherError, RootCertStore,
    SignatureScheme,
};
use tracing::debug;

use crate::error::IdentityError;
use crate::material::IdentityMaterial;
use crate::spiffe_id::{SpiffeId, extract_spiffe_id};

/// Peer presented a valid chain but the wrong (or no) identity.
#[derive(Debug, thiserror::Error)]
pub enum PeerIdentityError {
    #[error("peer identity mismatch: expected {expected}, presented {presented}")]
    Mismatch { expected: String, presented: String },

    #[error("peer certificate carries no SPIFFE ID (expected {expected})")]
    Missing { expected: String },
}

impl From<PeerIdentityError> for rustls::Error {
    fn from(e: PeerIdentityError) -> Self {
        Self::InvalidCertificate(CertificateError::Other(OtherError(Arc::new(e))))
    }
}

/// Server certificate verifier for SPIFFE peers.
#[derive(Debug)]
pub struct SpiffeServerVerifier {
    roots: Arc<RootCertStore>,
    expected: Option<SpiffeId>,
    algorithms: WebPkiSupportedAlgorithms,
}

impl SpiffeServerVerifier {
    /// Verify chains against `roots`; when `expected` is set, additionally
    /// require the leaf's SPIFFE ID to equal it.
    pub fn new(
        roots: Arc<RootCertStore>,
        expected: Option<SpiffeId>,
        provider: &CryptoProvider,
    ) -> Self {
        Self {
            roots,
            expected,
            algorithms: provider.signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for SpiffeServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let cert = ParsedCertificate::try_from(end_entity)?;
        verify_server_cert_signed_by_trust_anchor(
            &cert,
            &self.roots,
            intermediates,
            now,
            self.algorithms.all,
        )?;

        let Some(expected) = &self.expected else {
            return Ok(ServerCertVerified::assertion());
        };
        match extract_spiffe_id(end_entity) {
            Some(presented) if presented == *expected => {
                debug!(peer = %presented, "Peer SPIFFE ID verified");
                Ok(ServerCertVerified::assertion())
            }
            Some(presented) => Err(PeerIdentityError::Mismatch {
                expected: expected.to_string(),
                presented: presented.to_string(),
            }
            .into()),
            None => Err(PeerIdentityError::Missing {
                expected: expected.to_string(),
            }
            .into()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

/// Build a client config that presents `material` as the client credential
/// and trusts peers chained to its bundle.
///
/// `alpn` is set verbatim (`h2` for gRPC, empty for WebSocket). The material
/// can be dropped once this returns.
pub fn build_client_config(
    material: &IdentityMaterial,
    expected_peer: Option<&SpiffeId>,
    alpn: &[&[u8]],
) -> Result<Arc<ClientConfig>, IdentityError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = SpiffeServerVerifier::new(
        Arc::new(material.root_store()?),
        expected_peer.cloned(),
        &provider,
    );

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_client_auth_cert(material.cert_chain().to_vec(), material.private_key())?;
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}
