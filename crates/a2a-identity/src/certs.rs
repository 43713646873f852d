//! Development SPIFFE PKI.
//!
//! Generates a trust-domain CA and X.509-SVIDs carrying a `spiffe://` URI SAN,
//! shaped like the ones a SPIRE server issues. Used by tests and local
//! development peers; production identities always come from the Workload API.
//!
//! Requires the `certs` feature to be enabled.

use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyPair,
    KeyUsagePurpose, SanType, date_time_ymd,
};

use crate::error::IdentityError;
use crate::material::IdentityMaterial;

/// CA material for signing SVIDs in one trust domain.
pub struct CaBundle {
    /// CA certificate parameters (needed for signing).
    pub params: CertificateParams,
    /// CA key pair.
    pub key_pair: KeyPair,
    /// PEM-encoded CA certificate.
    pub ca_cert_pem: String,
    /// DER-encoded CA certificate.
    pub ca_cert_der: Vec<u8>,
}

/// An issued X.509-SVID together with its trust bundle.
pub struct SvidBundle {
    pub spiffe_id: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_der: Vec<u8>,
    /// PKCS#8 DER private key.
    pub key_der: Vec<u8>,
    pub ca_cert_pem: String,
    pub ca_cert_der: Vec<u8>,
}

impl SvidBundle {
    /// Parse this bundle into identity material.
    pub fn material(&self) -> Result<IdentityMaterial, IdentityError> {
        IdentityMaterial::from_pem(
            self.cert_pem.as_bytes(),
            self.key_pem.as_bytes(),
            self.ca_cert_pem.as_bytes(),
        )
    }
}

/// Certificate generation errors.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// An error occurred during certificate generation or signing.
    #[error("Certificate generation error: {0}")]
    Generation(String),
}

impl From<rcgen::Error> for CertError {
    fn from(e: rcgen::Error) -> Self {
        Self::Generation(e.to_string())
    }
}

/// Generate a self-signed CA for `trust_domain`.
pub fn generate_ca(trust_domain: &str) -> Result<CaBundle, CertError> {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, format!("{trust_domain} CA"));
    params
        .distinguished_name
        .push(DnType::OrganizationName, "SPIFFE");
    params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    params.key_usages.push(KeyUsagePurpose::CrlSign);

    let key_pair = KeyPair::generate()?;
    let ca_cert = params.self_signed(&key_pair)?;

    Ok(CaBundle {
        ca_cert_pem: ca_cert.pem(),
        ca_cert_der: ca_cert.der().to_vec(),
        params,
        key_pair,
    })
}

/// Issue an SVID for `spiffe_id`, valid for both client and server auth.
pub fn issue_svid(ca: &CaBundle, spiffe_id: &str) -> Result<SvidBundle, CertError> {
    issue(ca, spiffe_id, |_| {})
}

/// Issue an SVID whose validity window ended in 2001.
pub fn issue_expired_svid(ca: &CaBundle, spiffe_id: &str) -> Result<SvidBundle, CertError> {
    issue(ca, spiffe_id, |params| {
        params.not_before = date_time_ymd(2000, 1, 1);
        params.not_after = date_time_ymd(2001, 1, 1);
    })
}

pub(crate) fn issue(
    ca: &CaBundle,
    spiffe_id: &str,
    adjust: impl FnOnce(&mut CertificateParams),
) -> Result<SvidBundle, CertError> {
    let issuer = Issuer::from_params(&ca.params, &ca.key_pair);

    let mut params = CertificateParams::default();
    params.is_ca = IsCa::ExplicitNoCa;
    params
        .subject_alt_names
        .push(SanType::URI(Ia5String::try_from(spiffe_id)?));
    params.key_usages.push(KeyUsagePurpose::DigitalSignature);
    params.key_usages.push(KeyUsagePurpose::KeyEncipherment);
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ServerAuth);
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ClientAuth);
    adjust(&mut params);

    let key = KeyPair::generate()?;
    let cert = params.signed_by(&key, &issuer)?;

    Ok(SvidBundle {
        spiffe_id: spiffe_id.to_string(),
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        cert_der: cert.der().to_vec(),
        key_der: key.serialize_der(),
        ca_cert_pem: ca.ca_cert_pem.clone(),
        ca_cert_der: ca.ca_cert_der.clone(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generate_ca_produces_valid_pem() {
        let ca = generate_ca("td").unwrap();
        assert!(ca.ca_cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(!ca.ca_cert_der.is_empty());
    }

    #[test]
    fn svids_differ_but_share_ca() {
        let ca = generate_ca("td").unwrap();
        let a = issue_svid(&ca, "spiffe://td/a").unwrap();
        let b = issue_svid(&ca, "spiffe://td/b").unwrap();

        assert!(a.key_pem.contains("BEGIN PRIVATE KEY"));
        assert_ne!(a.cert_pem, b.cert_pem);
        assert_ne!(a.key_der, b.key_der);
        assert_eq!(a.ca_cert_pem, b.ca_cert_pem);
    }
}
