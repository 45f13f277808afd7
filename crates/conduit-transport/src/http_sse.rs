//! Legacy HTTP+SSE transport (protocol date 2024-11-05).
//!
//! A long-lived GET carries server→client traffic as an SSE stream; the
//! first `endpoint` event on that stream names the URL for client→server
//! POSTs. The endpoint slot is a oneshot wired up *before* the stream reader
//! starts, so `connect` cannot miss a fast early event.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

use conduit_protocol::{Error, JsonRpcMessage, Result};

use crate::Transport;
use crate::sse::SseParser;
use crate::wire::{decode_message, encode_message};

/// Configuration for [`HttpSseTransport`].
#[derive(Debug, Clone)]
pub struct HttpSseConfig {
    /// SSE endpoint URL (the GET target).
    pub url: String,
    /// Additional headers sent on every request.
    pub headers: HashMap<String, String>,
    /// Bearer token attached as `Authorization` when set.
    pub auth_token: Option<String>,
    /// Timeout for the POST leg and for endpoint discovery.
    pub request_timeout: Duration,
}

impl HttpSseConfig {
    /// Configuration for the given SSE URL with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

type Inbound = mpsc::Receiver<Result<JsonRpcMessage>>;

/// Legacy HTTP+SSE client transport.
pub struct HttpSseTransport {
    config: HttpSseConfig,
    http: reqwest::Client,
    connected: AtomicBool,
    closed: AtomicBool,
    endpoint: Arc<RwLock<Option<Url>>>,
    last_event_id: Arc<RwLock<Option<String>>>,
    inbound: Mutex<Option<Inbound>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for HttpSseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSseTransport")
            .field("url", &self.config.url)
            .field("connected", &self.connected)
            .finish()
    }
}

impl HttpSseTransport {
    /// Create an unconnected transport.
    pub fn new(config: HttpSseConfig) -> Self {
        // No whole-request timeout on the shared client: the SSE stream is
        // long-lived. The POST leg applies `request_timeout` per call.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("default reqwest client");
        Self {
            config,
            http,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            endpoint: Arc::new(RwLock::new(None)),
            last_event_id: Arc::new(RwLock::new(None)),
            inbound: Mutex::new(None),
            reader_task: Mutex::new(None),
        }
    }

    /// The last SSE event id seen on the stream, for resumption.
    pub async fn last_event_id(&self) -> Option<String> {
        self.last_event_id.read().await.clone()
    }

    fn apply_common_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.config.auth_token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        request
    }
}

#[async_trait]
impl Transport for HttpSseTransport {
    fn name(&self) -> &'static str {
        "http+sse"
    }

    async fn connect(&self) -> Result<()> {
        let base = Url::parse(&self.config.url)
            .map_err(|e| Error::validation("url", format!("{}: {e}", self.config.url)))?;
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }

        let request = self
            .apply_common_headers(self.http.get(&self.config.url))
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");

        let response = tokio::time::timeout(self.config.request_timeout, request.send())
            .await
            .map_err(|_| Error::transport("http+sse", "connect", "timed out opening SSE stream"))?
            .map_err(|e| Error::transport("http+sse", "connect", e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            self.connected.store(false, Ordering::SeqCst);
            return Err(Error::Authentication(format!(
                "SSE stream rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(Error::transport(
                "http+sse",
                "connect",
                format!("SSE stream returned HTTP {status}"),
            ));
        }

        // The endpoint slot must exist before the reader can observe the
        // event, or a fast server could win the race against us.
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Url>();
        let (tx, rx) = mpsc::channel::<Result<JsonRpcMessage>>(64);

        let endpoint_slot = Arc::clone(&self.endpoint);
        let last_event_id = Arc::clone(&self.last_event_id);
        let reader_task = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut parser = SseParser::new();
            let mut stream = response.bytes_stream();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("error reading SSE stream: {e}");
                        break;
                    }
                };
                for event in parser.push(&bytes) {
                    if let Some(id) = &event.id {
                        *last_event_id.write().await = Some(id.clone());
                    }
                    match event.event.as_deref() {
                        Some("endpoint") => match base.join(event.data.trim()) {
                            Ok(resolved) => {
                                debug!(endpoint = %resolved, "discovered POST endpoint");
                                *endpoint_slot.write().await = Some(resolved.clone());
                                if let Some(tx) = endpoint_tx.take() {
                                    let _ = tx.send(resolved);
                                }
                            }
                            Err(e) => warn!("unresolvable endpoint event {:?}: {e}", event.data),
                        },
                        Some("message") | None => {
                            if event.data.trim().is_empty() {
                                continue;
                            }
                            if tx.send(decode_message(&event.data)).await.is_err() {
                                return;
                            }
                        }
                        Some(other) => trace!("ignoring SSE event type {other:?}"),
                    }
                }
            }
            debug!("SSE stream ended");
        });

        *self.reader_task.lock().await = Some(reader_task);
        *self.inbound.lock().await = Some(rx);

        match tokio::time::timeout(self.config.request_timeout, endpoint_rx).await {
            Ok(Ok(_)) => {
                debug!(url = %self.config.url, "http+sse transport connected");
                Ok(())
            }
            _ => {
                let _ = self.close().await;
                Err(Error::transport(
                    "http+sse",
                    "connect",
                    "stream ended before an endpoint event arrived",
                ))
            }
        }
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let endpoint = self
            .endpoint
            .read()
            .await
            .clone()
            .ok_or(Error::NotConnected)?;
        let line = encode_message(&message)?;

        let request = self
            .apply_common_headers(self.http.post(endpoint))
            .header(header::CONTENT_TYPE, "application/json")
            .body(line);

        let response = tokio::time::timeout(self.config.request_timeout, request.send())
            .await
            .map_err(|_| Error::transport("http+sse", "send", "POST timed out"))?
            .map_err(|e| Error::transport("http+sse", "send", e.to_string()))?;

        match response.status().as_u16() {
            200 | 202 => Ok(()),
            401 => Err(Error::Authentication(format!(
                "POST rejected credentials ({})",
                response.status()
            ))),
            status => Err(Error::transport(
                "http+sse",
                "send",
                format!("POST returned HTTP {status}"),
            )),
        }
    }

    async fn receive(&self) -> Result<Option<JsonRpcMessage>> {
        let mut guard = self.inbound.lock().await;
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
        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        self.inbound.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        debug!("http+sse transport closed");
        Ok(())
    }
}
