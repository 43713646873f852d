//! gRPC transport over the `a2a.v1.Router` service.

use futures::StreamExt;
use hyper_util::rt::TokioIo;
use tokio::sync::RwLock;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, info, warn};

use a2a_core::task::decode_object;
use a2a_core::{Priority, TaskRequest, TaskResponse};
use a2a_identity::build_client_config;
use a2a_proto::v1 as pb;
use a2a_proto::v1::router_client::RouterClient;

use super::{EventStream, StateCell, Transport, TransportKind, TransportState, tls};
use crate::error::{ClientError, classify_connect_error};
use crate::options::ConnectOptions;

const ALPN_H2: &[u8] = b"h2";

/// Structured-RPC transport.
pub struct GrpcTransport {
    target: String,
    client: RwLock<Option<RouterClient<Channel>>>,
    state: StateCell,
}

impl GrpcTransport {
    /// Connect to `target` (`host:port`).
    ///
    /// In insecure mode this is a plaintext HTTP/2 channel and no identity is
    /// fetched. Otherwise fresh identity material is fetched and the channel
    /// runs over mTLS with the peer's SPIFFE ID checked during the handshake.
    pub async fn connect(target: &str, options: &ConnectOptions) -> Result<Self, ClientError> {
        let state = StateCell::new();
        state.set(TransportState::Connecting);

        let endpoint = Endpoint::from_shared(format!("http://{target}"))
            .map_err(|e| ClientError::Config(format!("invalid target {target:?}: {e}")))?
            .connect_timeout(options.connect_timeout());

        let channel = if options.settings().insecure {
            warn!(%target, "Connecting without TLS or identity verification");
            endpoint
                .connect()
                .await
                .map_err(|e| classify_connect_error(&e))?
        } else {
            let tls_config = {
                let material = options.identity().fetch().await?;
                debug!(spiffe_id = %material.spiffe_id(), "Using workload identity");
                build_client_config(&material, options.expected_peer(), &[ALPN_H2])?
            };
            let name = tls::server_name(target)?;
            let addr = target.to_string();
            endpoint
                .connect_with_connector(service_fn(move |_: Uri| {
                    let (addr, name, config) = (addr.clone(), name.clone(), tls_config.clone());
                    async move { tls::dial(&addr, name, config).await.map(TokioIo::new) }
                }))
                .await
                .map_err(|e| classify_connect_error(&e))?
        };

        state.set(TransportState::Connected);
        info!(%target, secure = !options.settings().insecure, "gRPC transport connected");
        Ok(Self {
            target: target.to_string(),
            client: RwLock::new(Some(RouterClient::new(channel))),
            state,
        })
    }

    async fn client(&self) -> Result<RouterClient<Channel>, ClientError> {
        self.client
            .read()
            .await
            .clone()
            .ok_or(ClientError::ClientClosed)
    }
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    async fn send(&self, request: TaskRequest) -> Result<TaskResponse, ClientError> {
        let mut client = self.client().await?;
        let reply = client
            .send_task(to_proto(&request)?)
            .await
            .map_err(status_error)?
            .into_inner();
        debug!(task_id = %reply.task_id, status = %reply.status, "SendTask reply");
        from_reply(reply)
    }

    async fn stream(&self, topic: &str) -> Result<EventStream, ClientError> {
        let mut client = self.client().await?;
        let events = client
            .event_stream(pb::EventStreamRequest {
                topic: topic.to_string(),
            })
            .await
            .map_err(status_error)?
            .into_inner();
        debug!(%topic, "Subscribed to event stream");
        Ok(Box::pin(events.map(|item| match item {
            Ok(event) => decode_object(&event.payload).map_err(ClientError::from),
            Err(status) => Err(status_error(status)),
        })))
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.state.replace(TransportState::Closed) == TransportState::Closed {
            return Ok(());
        }
        // Dropping the last client handle tears down the HTTP/2 connection.
        self.client.write().await.take();
        info!(target = %self.target, "gRPC transport closed");
        Ok(())
    }
}

fn to_proto(request: &TaskRequest) -> Result<pb::TaskRequest, ClientError> {
    let payload = serde_json::to_string(request.payload())
        .map_err(|e| ClientError::ProtocolViolation(format!("payload: {e}")))?;
    Ok(pb::TaskRequest {
        agent_id: request.agent_id().to_string(),
        payload,
        priority: priority_to_proto(request.priority()) as i32,
    })
}

const fn priority_to_proto(priority: Priority) -> pb::Priority {
    match priority {
        Priority::Low => pb::Priority::Low,
        Priority::Normal => pb::Priority::Normal,
        Priority::High => pb::Priority::High,
    }
}

fn from_reply(reply: pb::TaskReply) -> Result<TaskResponse, ClientError> {
    let result = if reply.result.is_empty() {
        None
    } else {
        Some(decode_object(&reply.result).map_err(|e| {
            ClientError::ProtocolViolation(format!("task {} result: {e}", reply.task_id))
        })?)
    };
    Ok(TaskResponse {
        task_id: reply.task_id,
        status: reply.status,
        result,
        error: (!reply.error.is_empty()).then_some(reply.error),
    })
}

fn status_error(status: tonic::Status) -> ClientError {
    ClientError::Transport(format!("{:?}: {}", status.code(), status.message()))
}
