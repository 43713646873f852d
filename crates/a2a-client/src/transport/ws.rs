//! WebSocket transport.
//!
//! One JSON document per text message. A task request is answered by exactly
//! one response frame; after a subscribe frame every data frame is an event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_with_config};
use tracing::{debug, info, warn};

use a2a_core::task::decode_object;
use a2a_core::{TaskRequest, TaskResponse};
use a2a_identity::build_client_config;

use super::{EventStream, StateCell, Transport, TransportKind, TransportState, tls};
use crate::error::{ClientError, classify_connect_error};
use crate::options::ConnectOptions;

/// Largest message or frame accepted from the peer.
pub const MAX_MESSAGE_SIZE: usize = 1 << 20;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reader = Arc<Mutex<Option<SplitStream<Socket>>>>;

#[derive(Serialize)]
struct SubscribeFrame<'a> {
    action: &'static str,
    topic: &'a str,
}

/// Persistent-socket transport.
///
/// The write and read halves sit behind separate async mutexes, always
/// locked writer first. A `send` holds both for the whole request/response
/// exchange; an event stream holds the read half until it is dropped.
pub struct WsTransport {
    url: String,
    writer: Mutex<Option<SplitSink<Socket, Message>>>,
    reader: Reader,
    /// Set when a `send` was cancelled between writing the request and
    /// reading the response, or an event stream was dropped while the peer
    /// may still push events. The framing can no longer be trusted.
    poisoned: Arc<AtomicBool>,
    closed_tx: watch::Sender<bool>,
    state: StateCell,
}

impl WsTransport {
    /// Connect to `wss://{target}{socket_path}`, or `ws://` in insecure mode.
    pub async fn connect(target: &str, options: &ConnectOptions) -> Result<Self, ClientError> {
        let state = StateCell::new();
        state.set(TransportState::Connecting);

        let insecure = options.settings().insecure;
        let scheme = if insecure { "ws" } else { "wss" };
        let url = format!("{scheme}://{target}{}", options.socket_path());

        let stream = if insecure {
            warn!(%url, "Connecting without TLS or identity verification");
            let tcp = TcpStream::connect(target)
                .await
                .map_err(|e| classify_connect_error(&e))?;
            MaybeTlsStream::Plain(tcp)
        } else {
            let tls_config = {
                let material = options.identity().fetch().await?;
                debug!(spiffe_id = %material.spiffe_id(), "Using workload identity");
                build_client_config(&material, options.expected_peer(), &[])?
            };
            let tls = tls::dial(target, tls::server_name(target)?, tls_config)
                .await
                .map_err(|e| classify_connect_error(&e))?;
            MaybeTlsStream::Rustls(tls)
        };

        let config = WebSocketConfig::default()
            .max_message_size(Some(MAX_MESSAGE_SIZE))
            .max_frame_size(Some(MAX_MESSAGE_SIZE));
        let (socket, _response) = client_async_with_config(url.as_str(), stream, Some(config))
            .await
            .map_err(|e| classify_connect_error(&e))?;
        let (writer, reader) = socket.split();

        state.set(TransportState::Connected);
        info!(%url, "WebSocket transport connected");
        Ok(Self {
            url,
            writer: Mutex::new(Some(writer)),
            reader: Arc::new(Mutex::new(Some(reader))),
            poisoned: Arc::new(AtomicBool::new(false)),
            closed_tx: watch::Sender::new(false),
            state,
        })
    }

    fn ensure_usable(&self) -> Result<(), ClientError> {
        if self.state.get() == TransportState::Closed {
            return Err(ClientError::ClientClosed);
        }
        if self.poisoned.load(Ordering::Acquire) {
            return Err(ClientError::Transport(
                "connection poisoned by a cancelled request or event stream; close and reconnect"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl Transport for WsTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    async fn send(&self, request: TaskRequest) -> Result<TaskResponse, ClientError> {
        self.ensure_usable()?;
        let frame = serde_json::to_string(&request)
            .map_err(|e| ClientError::ProtocolViolation(format!("request: {e}")))?;

        let mut closed = self.closed_tx.subscribe();
        let mut writer = self.writer.lock().await;
        let mut reader = self.reader.try_lock().map_err(|_| {
            ClientError::Transport("socket is reserved by an active event stream".into())
        })?;
        let (Some(sink), Some(source)) = (writer.as_mut(), reader.as_mut()) else {
            return Err(ClientError::ClientClosed);
        };

        let in_flight = InFlight::new(Arc::clone(&self.poisoned));
        sink.send(Message::text(frame)).await.map_err(ws_error)?;
        // `close` signals first so it never waits on a silent peer.
        let text = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => Err(ClientError::ClientClosed),
            text = next_text(source) => text,
        }?;
        in_flight.complete();

        let response: TaskResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::ProtocolViolation(format!("response frame: {e}")))?;
        debug!(task_id = %response.task_id, status = %response.status, "Task reply");
        Ok(response)
    }

    async fn stream(&self, topic: &str) -> Result<EventStream, ClientError> {
        self.ensure_usable()?;
        let frame = serde_json::to_string(&SubscribeFrame {
            action: "subscribe",
            topic,
        })
        .map_err(|e| ClientError::ProtocolViolation(format!("subscribe frame: {e}")))?;

        let mut writer = self.writer.lock().await;
        let mut reader = Arc::clone(&self.reader)
            .try_lock_owned()
            .map_err(|_| ClientError::Transport("socket already has an active event stream".into()))?;
        let Some(sink) = writer.as_mut() else {
            return Err(ClientError::ClientClosed);
        };
        if reader.is_none() {
            return Err(ClientError::ClientClosed);
        }
        sink.send(Message::text(frame)).await.map_err(ws_error)?;
        drop(writer);
        debug!(%topic, "Subscribed to event stream");

        let mut closed = self.closed_tx.subscribe();
        // Without an unsubscribe frame the peer keeps pushing events for this
        // topic, so a stream dropped before it ends poisons the socket.
        let in_flight = InFlight::new(Arc::clone(&self.poisoned));
        Ok(Box::pin(async_stream::stream! {
            loop {
                if *closed.borrow_and_update() {
                    break;
                }
                let Some(source) = reader.as_mut() else {
                    break;
                };
                let next = tokio::select! {
                    _ = closed.changed() => None,
                    msg = source.next() => Some(msg),
                };
                match next {
                    None | Some(None | Some(Ok(Message::Close(_)))) => break,
                    Some(Some(Ok(Message::Text(text)))) => {
                        yield decode_object(text.as_str()).map_err(ClientError::from);
                    }
                    Some(Some(Ok(Message::Binary(_)))) => {
                        yield Err(ClientError::ProtocolViolation("binary frame on event stream".into()));
                    }
                    Some(Some(Ok(_))) => {}
                    Some(Some(Err(e))) => {
                        yield Err(ws_error(e));
                        break;
                    }
                }
            }
            in_flight.complete();
        }))
    }

    async fn close(&self) -> Result<(), ClientError> {
        if self.state.replace(TransportState::Closed) == TransportState::Closed {
            return Ok(());
        }
        self.closed_tx.send_replace(true);

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!(url = %self.url, error = %e, "Close frame not delivered");
            }
        }
        // An event stream that is still alive releases the read half itself.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        info!(url = %self.url, "WebSocket transport closed");
        Ok(())
    }
}

/// Poisons the transport if dropped before [`InFlight::complete`].
struct InFlight {
    poisoned: Arc<AtomicBool>,
    done: bool,
}

impl InFlight {
    fn new(poisoned: Arc<AtomicBool>) -> Self {
        Self {
            poisoned,
            done: false,
        }
    }

    fn complete(mut self) {
        self.done = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.done {
            self.poisoned.store(true, Ordering::Release);
        }
    }
}

/// Read the next data frame, skipping control frames.
async fn next_text(source: &mut SplitStream<Socket>) -> Result<String, ClientError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Binary(_))) => {
                return Err(ClientError::ProtocolViolation(
                    "expected a text frame, got binary".into(),
                ));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Transport(
                    "connection closed while awaiting a response".into(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ws_error(e)),
        }
    }
}

fn ws_error(e: tokio_tungstenite::tungstenite::Error) -> ClientError {
    ClientError::Transport(e.to_string())
}
