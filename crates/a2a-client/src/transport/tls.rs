//! TCP + rustls dialing shared by both transports.

use std::io;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls::pki_types::ServerName;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::ClientError;

/// TLS server name for `host:port`.
///
/// SPIFFE verification ignores it, but rustls needs one for SNI.
pub(crate) fn server_name(target: &str) -> Result<ServerName<'static>, ClientError> {
    let host = target
        .rsplit_once(':')
        .map_or(target, |(host, _port)| host)
        .trim_start_matches('[')
        .trim_end_matches(']');
    ServerName::try_from(host.to_string())
        .map_err(|e| ClientError::Config(format!("invalid target host {host:?}: {e}")))
}

/// Open a TCP connection to `target` and run the TLS handshake on it.
pub(crate) async fn dial(
    target: &str,
    name: ServerName<'static>,
    config: Arc<ClientConfig>,
) -> io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(target).await?;
    tcp.set_nodelay(true)?;
    TlsConnector::from(config).connect(name, tcp).await
}
