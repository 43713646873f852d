//! Identity providers.
//!
//! A provider hands out fresh [`IdentityMaterial`] on every call. Providers
//! never cache parsed material: the identity agent can rotate or revoke an
//! SVID at any time, and a stale one must not be presented to a peer.

use std::fmt;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use crate::error::IdentityError;
use crate::material::IdentityMaterial;

/// Source of workload identity material.
#[tonic::async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// Fetch current material. Fails with [`IdentityError::Unavailable`] when
    /// no usable material can be obtained.
    async fn fetch(&self) -> Result<IdentityMaterial, IdentityError>;
}

/// Provider backed by PEM documents held in memory or mounted as files.
///
/// Files are re-read on every fetch, so a sidecar that rewrites them on
/// rotation is picked up without restarting.
#[derive(Clone)]
pub struct StaticIdentityProvider {
    source: PemSource,
}

#[derive(Clone)]
enum PemSource {
    Memory {
        cert_chain: Vec<u8>,
        private_key: Zeroizing<Vec<u8>>,
        trust_bundle: Vec<u8>,
    },
    Files {
        cert_chain: PathBuf,
        private_key: PathBuf,
        trust_bundle: PathBuf,
    },
}

impl StaticIdentityProvider {
    pub fn from_pem(
        cert_chain: impl Into<Vec<u8>>,
        private_key: impl Into<Vec<u8>>,
        trust_bundle: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            source: PemSource::Memory {
                cert_chain: cert_chain.into(),
                private_key: Zeroizing::new(private_key.into()),
                trust_bundle: trust_bundle.into(),
            },
        }
    }

    pub fn from_pem_files(
        cert_chain: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
        trust_bundle: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: PemSource::Files {
                cert_chain: cert_chain.into(),
                private_key: private_key.into(),
                trust_bundle: trust_bundle.into(),
            },
        }
    }
}

impl fmt::Debug for StaticIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            PemSource::Memory { .. } => f
                .debug_struct("StaticIdentityProvider")
                .field("source", &"memory")
                .finish(),
            PemSource::Files {
                cert_chain,
                private_key,
                trust_bundle,
            } => f
                .debug_struct("StaticIdentityProvider")
                .field("cert_chain", cert_chain)
                .field("private_key", private_key)
                .field("trust_bundle", trust_bundle)
                .finish(),
        }
    }
}

#[tonic::async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn fetch(&self) -> Result<IdentityMaterial, IdentityError> {
        let material = match &self.source {
            PemSource::Memory {
                cert_chain,
                private_key,
                trust_bundle,
            } => IdentityMaterial::from_pem(cert_chain, private_key, trust_bundle)?,
            PemSource::Files {
                cert_chain,
                private_key,
                trust_bundle,
            } => {
                let chain = read(cert_chain).await?;
                let key = Zeroizing::new(read(private_key).await?);
                let bundle = read(trust_bundle).await?;
                IdentityMaterial::from_pem(&chain, &key, &bundle)?
            }
        };
        if material.is_expired() {
            return Err(IdentityError::Expired {
                spiffe_id: material.spiffe_id().to_string(),
            });
        }
        Ok(material)
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, IdentityError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| IdentityError::Unavailable(format!("{}: {e}", path.display())))
}
