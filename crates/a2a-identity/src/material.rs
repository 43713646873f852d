//! Parsed X.509-SVID identity material.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rustls::RootCertStore;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use x509_parser::parse_x509_certificate;
use zeroize::Zeroizing;

use crate::error::IdentityError;
use crate::spiffe_id::{SpiffeId, extract_spiffe_id};

/// Leaf certificate chain, private key and trust bundle for one workload.
///
/// Material is short-lived and may be rotated by the identity agent at any
/// time, so it is fetched for a single connection attempt and then dropped.
/// The private key is zeroized on drop.
pub struct IdentityMaterial {
    spiffe_id: SpiffeId,
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: Zeroizing<Vec<u8>>,
    trust_bundle: Vec<CertificateDer<'static>>,
    not_after: SystemTime,
}

impl IdentityMaterial {
    /// Build material from DER buffers as returned by the Workload API.
    ///
    /// `chain` and `bundle` are concatenations of DER certificates; `key` is a
    /// PKCS#8 DER private key.
    pub fn from_der(chain: &[u8], key: &[u8], bundle: &[u8]) -> Result<Self, IdentityError> {
        Self::from_parts(
            split_der_certificates(chain)?,
            key.to_vec(),
            split_der_certificates(bundle)?,
        )
    }

    /// Build material from PEM documents (as written by spiffe-helper or rcgen).
    pub fn from_pem(chain: &[u8], key: &[u8], bundle: &[u8]) -> Result<Self, IdentityError> {
        let key = match PrivateKeyDer::from_pem_slice(key)
            .map_err(|e| IdentityError::InvalidMaterial(format!("private key: {e}")))?
        {
            PrivateKeyDer::Pkcs8(k) => k.secret_pkcs8_der().to_vec(),
            _ => {
                return Err(IdentityError::InvalidMaterial(
                    "private key must be PKCS#8".into(),
                ));
            }
        };
        Self::from_parts(pem_certificates(chain)?, key, pem_certificates(bundle)?)
    }

    /// Assemble material from already-split certificates and a PKCS#8 key.
    pub fn from_parts(
        cert_chain: Vec<CertificateDer<'static>>,
        private_key: Vec<u8>,
        trust_bundle: Vec<CertificateDer<'static>>,
    ) -> Result<Self, IdentityError> {
        let private_key = Zeroizing::new(private_key);
        let leaf = cert_chain
            .first()
            .ok_or_else(|| IdentityError::InvalidMaterial("certificate chain is empty".into()))?;
        if trust_bundle.is_empty() {
            return Err(IdentityError::InvalidMaterial("trust bundle is empty".into()));
        }
        if private_key.is_empty() {
            return Err(IdentityError::InvalidMaterial("private key is empty".into()));
        }
        let spiffe_id = extract_spiffe_id(leaf).ok_or_else(|| {
            IdentityError::InvalidMaterial("leaf certificate carries no SPIFFE ID".into())
        })?;
        let not_after = not_after(leaf)?;

        Ok(Self {
            spiffe_id,
            cert_chain,
            private_key,
            trust_bundle,
            not_after,
        })
    }

    pub const fn spiffe_id(&self) -> &SpiffeId {
        &self.spiffe_id
    }

    /// Leaf first, followed by any intermediates.
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    pub fn trust_bundle(&self) -> &[CertificateDer<'static>] {
        &self.trust_bundle
    }

    /// A copy of the private key in the form rustls expects.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.private_key.to_vec()))
    }

    /// Expiry of the leaf certificate.
    pub const fn not_after(&self) -> SystemTime {
        self.not_after
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.not_after
    }

    /// Whether the leaf expires within `window` from now (or already has).
    pub fn expires_within(&self, window: Duration) -> bool {
        SystemTime::now()
            .checked_add(window)
            .is_none_or(|deadline| deadline >= self.not_after)
    }

    /// Trust bundle as a rustls root store.
    pub fn root_store(&self) -> Result<RootCertStore, IdentityError> {
        let mut store = RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(self.trust_bundle.iter().cloned());
        if ignored > 0 {
            tracing::warn!(ignored, "Skipped unparsable trust bundle certificates");
        }
        if added == 0 {
            return Err(IdentityError::InvalidMaterial(
                "trust bundle has no usable certificates".into(),
            ));
        }
        Ok(store)
    }
}

impl fmt::Debug for IdentityMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMaterial")
            .field("spiffe_id", &self.spiffe_id)
            .field("cert_chain_len", &self.cert_chain.len())
            .field("trust_bundle_len", &self.trust_bundle.len())
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// Split a concatenation of DER certificates.
fn split_der_certificates(mut buf: &[u8]) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
    let mut certs = Vec::new();
    while !buf.is_empty() {
        let (rest, _) = parse_x509_certificate(buf)
            .map_err(|e| IdentityError::InvalidMaterial(format!("DER certificate: {e}")))?;
        let len = buf.len() - rest.len();
        certs.push(CertificateDer::from(buf[..len].to_vec()));
        buf = rest;
    }
    Ok(certs)
}

fn pem_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, IdentityError> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| IdentityError::InvalidMaterial(format!("PEM certificate: {e}")))
}

fn not_after(cert_der: &[u8]) -> Result<SystemTime, IdentityError> {
    let (_, cert) = parse_x509_certificate(cert_der)
        .map_err(|e| IdentityError::InvalidMaterial(format!("leaf certificate: {e}")))?;
    let secs = u64::try_from(cert.validity().not_after.timestamp())
        .map_err(|_| IdentityError::InvalidMaterial("leaf expiry predates 1970".into()))?;
    Ok(UNIX_EPOCH + Duration::from_secs(secs))
}
