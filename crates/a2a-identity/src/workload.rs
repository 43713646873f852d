//! SPIFFE Workload API client.
//!
//! Talks gRPC to the local identity agent (e.g. the SPIRE agent) over a Unix
//! domain socket and fetches the workload's current X.509-SVID.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tonic::metadata::MetadataValue;
use tonic::transport::Channel;
use tracing::{debug, info};

use a2a_proto::WORKLOAD_API_HEADER;
use a2a_proto::workload::X509svidRequest;
use a2a_proto::workload::spiffe_workload_api_client::SpiffeWorkloadApiClient;

use crate::error::IdentityError;
use crate::material::IdentityMaterial;
use crate::provider::IdentityProvider;

/// Upper bound on connecting to the agent and receiving the first SVID.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the SPIFFE Workload API socket.
#[derive(Debug, Clone)]
pub struct WorkloadApiClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl WorkloadApiClient {
    /// Create a client for `addr`, either `unix:///path/to/agent.sock` or a
    /// bare filesystem path.
    pub fn new(addr: &str) -> Self {
        Self {
            socket_path: socket_path_from_addr(addr),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Override the fetch timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Fetch the first X.509-SVID the agent offers.
    ///
    /// Opens a new connection per call and closes it once the first response
    /// arrives; the agent's rotation stream is not followed.
    pub async fn fetch_x509_svid(&self) -> Result<IdentityMaterial, IdentityError> {
        tokio::time::timeout(self.timeout, self.fetch_once())
            .await
            .map_err(|_| {
                IdentityError::Unavailable(format!(
                    "{}: no SVID within {:?}",
                    self.socket_path.display(),
                    self.timeout
                ))
            })?
    }

    async fn fetch_once(&self) -> Result<IdentityMaterial, IdentityError> {
        let channel = self.connect().await?;
        let mut client = SpiffeWorkloadApiClient::new(channel);

        let mut request = tonic::Request::new(X509svidRequest {});
        request
            .metadata_mut()
            .insert(WORKLOAD_API_HEADER, MetadataValue::from_static("true"));

        let mut stream = client
            .fetch_x509svid(request)
            .await
            .map_err(|s| self.unavailable(&format!("FetchX509SVID failed: {}", s.message())))?
            .into_inner();

        let response = stream
            .message()
            .await
            .map_err(|s| self.unavailable(&format!("SVID stream failed: {}", s.message())))?
            .ok_or_else(|| self.unavailable("SVID stream closed before any response"))?;

        let svid = response
            .svids
            .into_iter()
            .next()
            .ok_or_else(|| self.unavailable("agent returned no SVIDs"))?;
        debug!(spiffe_id = %svid.spiffe_id, hint = %svid.hint, "Received X.509-SVID");

        let material = IdentityMaterial::from_der(&svid.x509_svid, &svid.x509_svid_key, &svid.bundle)?;
        if !svid.spiffe_id.is_empty() && svid.spiffe_id != material.spiffe_id().as_str() {
            return Err(IdentityError::InvalidMaterial(format!(
                "agent labelled SVID {} but the certificate says {}",
                svid.spiffe_id,
                material.spiffe_id()
            )));
        }
        if material.is_expired() {
            return Err(IdentityError::Expired {
                spiffe_id: material.spiffe_id().to_string(),
            });
        }

        info!(
            spiffe_id = %material.spiffe_id(),
            not_after = ?material.not_after(),
            "Fetched workload identity"
        );
        Ok(material)
    }

    #[cfg(unix)]
    async fn connect(&self) -> Result<Channel, IdentityError> {
        use hyper_util::rt::TokioIo;
        use tokio::net::UnixStream;
        use tonic::transport::{Endpoint, Uri};
        use tower::service_fn;

        let path = self.socket_path.clone();
        // The URI is required by tonic but ignored by the connector.
        Endpoint::from_static("http://localhost")
            .connect_timeout(self.timeout)
            .connect_with_connector(service_fn(move |_: Uri| {
                let path = path.clone();
                async move {
                    let stream = UnixStream::connect(path).await?;
                    Ok::<_, std::io::Error>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| self.unavailable(&format!("connect failed: {e}")))
    }

    #[cfg(not(unix))]
    async fn connect(&self) -> Result<Channel, IdentityError> {
        Err(self.unavailable("Unix domain sockets are not supported on this platform"))
    }

    fn unavailable(&self, reason: &str) -> IdentityError {
        IdentityError::Unavailable(format!("{}: {reason}", self.socket_path.display()))
    }
}

#[tonic::async_trait]
impl IdentityProvider for WorkloadApiClient {
    async fn fetch(&self) -> Result<IdentityMaterial, IdentityError> {
        self.fetch_x509_svid().await
    }
}

/// Strip the `unix://` (or `unix:`) scheme from a Workload API address.
pub fn socket_path_from_addr(addr: &str) -> PathBuf {
    let path = addr
        .strip_prefix("unix://")
        .or_else(|| addr.strip_prefix("unix:"))
        .unwrap_or(addr);
    PathBuf::from(path)
}
