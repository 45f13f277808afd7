//! Streamable HTTP transport (protocol date 2025-03-26).
//!
//! A single endpoint takes every client→server POST; each response is either
//! empty (202), one JSON message, or an SSE upgrade streaming any number of
//! messages. Session affinity rides on the `Mcp-Session-Id` header learned
//! from the `initialize` response.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use conduit_protocol::{Error, JsonRpcMessage, PROTOCOL_VERSION, Result};

use crate::Transport;
use crate::sse::SseParser;
use crate::wire::{decode_message, encode_message};

/// Configuration for [`StreamableHttpTransport`].
#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    /// The MCP endpoint URL.
    pub url: String,
    /// Additional headers sent on every request.
    pub headers: HashMap<String, String>,
    /// Bearer token attached as `Authorization` when set.
    pub auth_token: Option<String>,
    /// Protocol date advertised in `MCP-Protocol-Version`.
    pub protocol_version: String,
    /// Timeout until response headers arrive; SSE bodies are unbounded.
    pub request_timeout: Duration,
}

impl StreamableHttpConfig {
    /// Configuration for the given endpoint URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            auth_token: None,
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

type InboundTx = mpsc::Sender<Result<JsonRpcMessage>>;
type InboundRx = mpsc::Receiver<Result<JsonRpcMessage>>;

/// Streamable HTTP client transport.
pub struct StreamableHttpTransport {
    config: StreamableHttpConfig,
    http: reqwest::Client,
    connected: AtomicBool,
    closed: AtomicBool,
    session_id: Arc<RwLock<Option<String>>>,
    last_event_id: Arc<RwLock<Option<String>>>,
    /// Shared inbound channel; taking the sender on close ends the stream
    /// exactly once even with SSE readers still alive.
    inbound_tx: Mutex<Option<InboundTx>>,
    inbound_rx: Mutex<Option<InboundRx>>,
    stream_tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
    stream_counter: AtomicU64,
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("url", &self.config.url)
            .field("connected", &self.connected)
            .finish()
    }
}

impl StreamableHttpTransport {
    /// Create an unconnected transport.
    pub fn new(config: StreamableHttpConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("default reqwest client");
        let (tx, rx) = mpsc::channel::<Result<JsonRpcMessage>>(64);
        Self {
            config,
            http,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            session_id: Arc::new(RwLock::new(None)),
            last_event_id: Arc::new(RwLock::new(None)),
            inbound_tx: Mutex::new(Some(tx)),
            inbound_rx: Mutex::new(Some(rx)),
            stream_tasks: Mutex::new(HashMap::new()),
            stream_counter: AtomicU64::new(0),
        }
    }

    /// The session id assigned by the server, once learned.
    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn build_request(&self, body: String) -> reqwest::RequestBuilder {
        let mut request = self
            .http
            .post(&self.config.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .header("MCP-Protocol-Version", &self.config.protocol_version)
            .body(body);
        if let Some(session_id) = self.session_id.read().await.as_ref() {
            request = request.header("Mcp-Session-Id", session_id);
        }
        if let Some(last_event_id) = self.last_event_id.read().await.as_ref() {
            request = request.header("Last-Event-ID", last_event_id);
        }
        if let Some(token) = &self.config.auth_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        request
    }

    async fn inbound_sender(&self) -> Result<InboundTx> {
        self.inbound_tx
            .lock()
            .await
            .clone()
            .ok_or(Error::NotConnected)
    }

    fn spawn_sse_reader(&self, response: reqwest::Response, tx: InboundTx) -> (u64, JoinHandle<()>) {
        let stream_id = self.stream_counter.fetch_add(1, Ordering::SeqCst);
        let last_event_id = Arc::clone(&self.last_event_id);
        let task = tokio::spawn(async move {
            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(stream = stream_id, "error reading SSE response: {e}");
                        break;
                    }
                };
                for event in parser.push(&bytes) {
                    if let Some(id) = &event.id {
                        *last_event_id.write().await = Some(id.clone());
                    }
                    if event.data.trim().is_empty() {
                        continue;
                    }
                    if tx.send(decode_message(&event.data)).await.is_err() {
                        return;
                    }
                }
            }
            trace!(stream = stream_id, "SSE response stream finished");
        });
        (stream_id, task)
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn name(&self) -> &'static str {
        "streamable-http"
    }

    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }
        // Nothing to establish up front: the first POST opens the session.
        debug!(url = %self.config.url, "streamable-http transport connected");
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let is_initialize = message.is_request_for("initialize");
        let line = encode_message(&message)?;

        let request = self.build_request(line).await;
        let response = tokio::time::timeout(self.config.request_timeout, request.send())
            .await
            .map_err(|_| Error::transport("streamable-http", "send", "POST timed out"))?
            .map_err(|e| Error::transport("streamable-http", "send", e.to_string()))?;

        let status = response.status();
        if status.is_success()
            && let Some(session_id) = response
                .headers()
                .get("Mcp-Session-Id")
                .and_then(|v| v.to_str().ok())
        {
            *self.session_id.write().await = Some(session_id.to_string());
        }

        match status.as_u16() {
            202 => Ok(()),
            200 => {
                let content_type = response
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                if content_type.contains("application/json") {
                    let body =
                        tokio::time::timeout(self.config.request_timeout, response.text())
                            .await
                            .map_err(|_| {
                                Error::transport("streamable-http", "send", "response body timed out")
                            })?
                            .map_err(|e| Error::transport("streamable-http", "send", e.to_string()))?;
                    let tx = self.inbound_sender().await?;
                    tx.send(decode_message(&body)).await.map_err(|_| {
                        Error::transport("streamable-http", "send", "inbound channel closed")
                    })?;
                    Ok(())
                } else if content_type.contains("text/event-stream") {
                    let tx = self.inbound_sender().await?;
                    let (stream_id, task) = self.spawn_sse_reader(response, tx);
                    self.stream_tasks.lock().await.insert(stream_id, task);
                    Ok(())
                } else {
                    // 200 with no meaningful body; nothing to deliver.
                    Ok(())
                }
            }
            401 => Err(Error::Authentication(format!(
                "server rejected credentials ({status})"
            ))),
            403 => Err(Error::transport(
                "streamable-http",
                "send",
                "server returned 403 Forbidden",
            )),
            429 => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                Err(Error::RateLimited {
                    retry_after,
                    message: "server returned 429 Too Many Requests".to_string(),
                })
            }
            404 | 405 if is_initialize => Err(Error::LegacyEndpointRequired),
            _ => {
                let body = response.text().await.unwrap_or_default();
                if let Ok(JsonRpcMessage::Response(reply)) =
                    serde_json::from_str::<JsonRpcMessage>(&body)
                    && let Some(err) = reply.error_payload()
                {
                    return Err(Error::Protocol {
                        code: err.code,
                        message: err.message.clone(),
                        data: err.data.clone(),
                    });
                }
                Err(Error::transport(
                    "streamable-http",
                    "send",
                    format!("POST returned HTTP {status}"),
                ))
            }
        }
    }

    async fn receive(&self) -> Result<Option<JsonRpcMessage>> {
        let mut guard = self.inbound_rx.lock().await;
        let rx = guard.as_mut().ok_or(Error::NotConnected)?;
        match rx.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for (_, task) in self.stream_tasks.lock().await.drain() {
            task.abort();
        }
        // Dropping the sender closes the shared inbound channel exactly once.
        self.inbound_tx.lock().await.take();

        if let Some(session_id) = self.session_id.read().await.clone() {
            let request = self
                .http
                .delete(&self.config.url)
                .header("Mcp-Session-Id", session_id)
                .timeout(Duration::from_secs(5));
            if let Err(e) = request.send().await {
                debug!("session DELETE failed: {e}");
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        debug!("streamable-http transport closed");
        Ok(())
    }
}
