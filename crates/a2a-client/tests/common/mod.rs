//! In-process peers and test PKI shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_tungstenite::tungstenite::Message;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tonic::{Request, Response, Status};

use a2a_client::{ClientSettings, ConnectOptions};
use a2a_identity::certs::{CaBundle, SvidBundle, generate_ca, issue_svid};
use a2a_identity::{
    IdentityError, IdentityMaterial, IdentityProvider, SpiffeId, StaticIdentityProvider,
};
use a2a_proto::v1 as pb;
use a2a_proto::v1::router_server::{Router, RouterServer};

pub const TRUST_DOMAIN: &str = "alpha-factory";
pub const SERVER_ID: &str = "spiffe://alpha-factory/router";
pub const CLIENT_ID: &str = "spiffe://alpha-factory/agency/finance-agent";

/// One trust domain with a server and a client SVID.
pub struct Pki {
    pub ca: CaBundle,
    pub server: SvidBundle,
    pub client: SvidBundle,
}

pub fn pki() -> Pki {
    let ca = generate_ca(TRUST_DOMAIN).unwrap();
    let server = issue_svid(&ca, SERVER_ID).unwrap();
    let client = issue_svid(&ca, CLIENT_ID).unwrap();
    Pki { ca, server, client }
}

/// Identity provider that counts fetches.
#[derive(Debug)]
pub struct CountingProvider {
    inner: StaticIdentityProvider,
    pub fetches: AtomicUsize,
}

#[tonic::async_trait]
impl IdentityProvider for CountingProvider {
    async fn fetch(&self) -> Result<IdentityMaterial, IdentityError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch().await
    }
}

pub fn client_identity(pki: &Pki) -> Arc<CountingProvider> {
    Arc::new(CountingProvider {
        inner: StaticIdentityProvider::from_pem(
            pki.client.cert_pem.as_bytes(),
            pki.client.key_pem.as_bytes(),
            pki.client.ca_cert_pem.as_bytes(),
        ),
        fetches: AtomicUsize::new(0),
    })
}

/// Secure options with the client SVID, expecting `expected_peer`.
pub fn secure_options(identity: Arc<CountingProvider>, expected_peer: &str) -> ConnectOptions {
    ConnectOptions::new()
        .with_identity(identity)
        .with_expected_peer(SpiffeId::parse(expected_peer).unwrap())
}

pub fn insecure_options(identity: Arc<CountingProvider>) -> ConnectOptions {
    ConnectOptions::new()
        .with_identity(identity)
        .with_settings(ClientSettings {
            insecure: true,
            ..ClientSettings::default()
        })
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

// --- gRPC router -----------------------------------------------------------

type EventResult = Result<pb::Event, Status>;

/// Echoes each task back as its result.
///
/// Agent `"fail"` gets an error reply; topic `"bad"` emits a non-object event.
#[derive(Default)]
pub struct EchoRouter;

#[tonic::async_trait]
impl Router for EchoRouter {
    async fn send_task(
        &self,
        request: Request<pb::TaskRequest>,
    ) -> Result<Response<pb::TaskReply>, Status> {
        let req = request.into_inner();
        let task_id = uuid::Uuid::new_v4().to_string();
        if req.agent_id == "fail" {
            return Ok(Response::new(pb::TaskReply {
                task_id,
                status: "FAILED".into(),
                result: String::new(),
                error: "agent crashed".into(),
            }));
        }
        let payload: Value = serde_json::from_str(&req.payload)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let result = json!({
            "agent_id": req.agent_id,
            "payload": payload,
            "priority": req.priority().as_str_name(),
        });
        Ok(Response::new(pb::TaskReply {
            task_id,
            status: "COMPLETED".into(),
            result: result.to_string(),
            error: String::new(),
        }))
    }

    type EventStreamStream = Pin<Box<dyn Stream<Item = EventResult> + Send>>;

    async fn event_stream(
        &self,
        request: Request<pb::EventStreamRequest>,
    ) -> Result<Response<Self::EventStreamStream>, Status> {
        let payloads: Vec<String> = if request.get_ref().topic == "bad" {
            vec![r#"{"a":1}"#.into(), "[1,2]".into()]
        } else {
            (1..=3).map(|i| json!({ "a": i }).to_string()).collect()
        };
        let events = payloads
            .into_iter()
            .map(|payload| Ok(pb::Event { payload }));
        Ok(Response::new(Box::pin(tokio_stream::iter(events))))
    }
}

/// Start the router with mTLS, requiring client SVIDs from the test CA.
pub async fn spawn_grpc_tls(pki: &Pki) -> SocketAddr {
    let tls = ServerTlsConfig::new()
        .identity(Identity::from_pem(&pki.server.cert_pem, &pki.server.key_pem))
        .client_ca_root(Certificate::from_pem(&pki.ca.ca_cert_pem));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::builder()
        .tls_config(tls)
        .unwrap()
        .add_service(RouterServer::new(EchoRouter));
    tokio::spawn(async move {
        server
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

/// Start the router in plaintext.
pub async fn spawn_grpc_plain() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        Server::builder()
            .add_service(RouterServer::new(EchoRouter))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });
    addr
}

// --- WebSocket peer --------------------------------------------------------

/// Text frames received by the WebSocket peer, in order.
pub type Frames = Arc<Mutex<Vec<Value>>>;

fn server_tls_config(pki: &Pki) -> Arc<rustls::ServerConfig> {
    use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
    use rustls::server::WebPkiClientVerifier;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = rustls::RootCertStore::empty();
    roots
        .add(CertificateDer::from(pki.ca.ca_cert_der.clone()))
        .unwrap();
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .unwrap();
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(verifier)
        .with_single_cert(
            vec![CertificateDer::from(pki.server.cert_der.clone())],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pki.server.key_der.clone())),
        )
        .unwrap();
    Arc::new(config)
}

/// Start a WebSocket peer over mTLS.
pub async fn spawn_ws_tls(pki: &Pki) -> (SocketAddr, Frames) {
    spawn_ws(Some(TlsAcceptor::from(server_tls_config(pki)))).await
}

/// Start a plaintext WebSocket peer.
pub async fn spawn_ws_plain() -> (SocketAddr, Frames) {
    spawn_ws(None).await
}

async fn spawn_ws(acceptor: Option<TlsAcceptor>) -> (SocketAddr, Frames) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let frames: Frames = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&frames);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let frames = Arc::clone(&recorded);
            tokio::spawn(async move {
                match acceptor {
                    Some(acceptor) => {
                        // Handshake failures are expected in rejection tests.
                        if let Ok(tls) = acceptor.accept(tcp).await {
                            serve_socket(tls, frames).await;
                        }
                    }
                    None => serve_socket(tcp, frames).await,
                }
            });
        }
    });
    (addr, frames)
}

/// Echo tasks and answer subscriptions with `{"a":1}`, `{"a":2}`, `{"a":3}`.
///
/// Topic `"alerts"` then closes the socket; other topics keep it open.
/// Agent `"silent"` never gets a reply, `"garbled"` gets a non-JSON text
/// frame, `"binary"` a binary frame and `"hangup"` a close frame.
async fn serve_socket<S>(stream: S, frames: Frames)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
        frames.lock().await.push(frame.clone());

        if frame["action"] == "subscribe" {
            for i in 1..=3 {
                let event = json!({ "a": i }).to_string();
                ws.send(Message::text(event)).await.unwrap();
            }
            if frame["topic"] == "alerts" {
                let _ = ws.close(None).await;
                return;
            }
            continue;
        }
        match frame["agent_id"].as_str() {
            Some("silent") => continue,
            Some("garbled") => {
                let _ = ws.send(Message::text("{oops")).await;
                continue;
            }
            Some("binary") => {
                let _ = ws.send(Message::binary(vec![1u8, 2, 3])).await;
                continue;
            }
            Some("hangup") => {
                let _ = ws.close(None).await;
                return;
            }
            _ => {}
        }
        let reply = json!({
            "task_id": uuid::Uuid::new_v4().to_string(),
            "status": "COMPLETED",
            "result": { "echo": frame },
        });
        if ws.send(Message::text(reply.to_string())).await.is_err() {
            return;
        }
    }
}

/// Plain TCP listener that accepts connections and never answers.
pub async fn spawn_black_hole() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held: Vec<TcpStream> = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            held.push(tcp);
        }
    });
    addr
}
