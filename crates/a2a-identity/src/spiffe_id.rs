//! SPIFFE ID parsing and extraction from X.509 certificates.

use std::fmt;
use std::str::FromStr;

use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;

use crate::error::IdentityError;

const SCHEME: &str = "spiffe://";

/// A validated SPIFFE ID, e.g. `spiffe://alpha-factory/agency/finance-agent`.
///
/// Two IDs are equal only if their string forms are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpiffeId {
    raw: String,
    /// Byte length of the trust domain, which starts right after the scheme.
    trust_domain_len: usize,
}

impl SpiffeId {
    pub fn parse(id: &str) -> Result<Self, IdentityError> {
        let invalid = |reason| IdentityError::InvalidSpiffeId {
            id: id.to_string(),
            reason,
        };

        let rest = id
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("scheme must be spiffe://"))?;
        let (trust_domain, path) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));

        if trust_domain.is_empty() {
            return Err(invalid("trust domain is empty"));
        }
        if !trust_domain
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"-._".contains(&b))
        {
            return Err(invalid("trust domain contains invalid characters"));
        }

        if !path.is_empty() {
            for segment in path[1..].split('/') {
                match segment {
                    "" => return Err(invalid("path contains an empty segment")),
                    "." | ".." => return Err(invalid("path contains a relative segment")),
                    s if !s
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b"-._".contains(&b)) =>
                    {
                        return Err(invalid("path contains invalid characters"));
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            raw: id.to_string(),
            trust_domain_len: trust_domain.len(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn trust_domain(&self) -> &str {
        &self.raw[SCHEME.len()..SCHEME.len() + self.trust_domain_len]
    }

    /// Path component including its leading slash; empty for a trust domain ID.
    pub fn path(&self) -> &str {
        &self.raw[SCHEME.len() + self.trust_domain_len..]
    }
}

impl fmt::Display for SpiffeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for SpiffeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Extract the SPIFFE ID from a DER-encoded certificate.
///
/// Returns `None` when the certificate does not parse, has no `spiffe://` URI
/// SAN, or has more than one (an SVID must carry exactly one).
pub fn extract_spiffe_id(cert_der: &[u8]) -> Option<SpiffeId> {
    let (_, cert) = parse_x509_certificate(cert_der).ok()?;
    let san = cert.subject_alternative_name().ok()??;

    let mut ids = san.value.general_names.iter().filter_map(|name| match name {
        GeneralName::URI(uri) if uri.starts_with(SCHEME) => Some(*uri),
        _ => None,
    });
    let first = ids.next()?;
    if ids.next().is_some() {
        return None;
    }
    SpiffeId::parse(first).ok()
}
