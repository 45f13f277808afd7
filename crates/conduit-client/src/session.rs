//! The client session: workers, correlation, handshake, and typed
//! operations.
//!
//! A [`Session`] owns two workers. The sender is the sole consumer of a
//! bounded outbound queue, which makes every write to the transport totally
//! ordered; each queued frame carries an acknowledgement slot that the
//! sender always resolves. The receiver reads inbound frames and dispatches
//! them: responses to their pending callers by id, notifications onto a
//! lossy fan-out channel, and server-initiated requests to a tiny handler
//! that answers `ping` and refuses everything else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use conduit_protocol::jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponsePayload, METHOD_NOT_FOUND, RequestId,
};
use conduit_protocol::types::{
    CallToolRequest, CallToolResult, CancelledParams, ClientCapabilities, Cursor,
    GetPromptRequest, GetPromptResult, Implementation, InitializeRequest, InitializeResult,
    ListPromptsResult, ListResourcesResult, ListToolsResult, LoggingLevel, ReadResourceRequest,
    ReadResourceResult, Resource, ServerCapabilities, SetLevelRequest, SubscribeRequest,
    UnsubscribeRequest,
};
use conduit_protocol::{
    Error, ProtocolVersion, Result, generate_request_id, version::PROTOCOL_VERSION,
};
use conduit_transport::Transport;

use crate::bridge::{ToolDefinition, convert_call_result, convert_tool};
use crate::message::Message;

/// Outbound queue depth; a full queue blocks callers until drained.
const OUTBOUND_CAPACITY: usize = 64;
/// Notification fan-out depth; overflow drops, it never backpressures the
/// receiver.
const NOTIFICATION_CAPACITY: usize = 256;

type PendingMap = Arc<StdMutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

struct OutboundFrame {
    message: JsonRpcMessage,
    ack: oneshot::Sender<Result<()>>,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Client identification sent in the handshake.
    pub client_info: Implementation,
    /// Client capabilities sent in the handshake.
    pub capabilities: ClientCapabilities,
    /// Protocol date advertised to the server.
    pub protocol_version: String,
    /// Applied to requests when the caller does not choose a timeout.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: "conduit".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ClientCapabilities::default(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// An initialized MCP client session.
pub struct Session {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    connected: Arc<AtomicBool>,
    initialized: AtomicBool,
    closed: AtomicBool,
    pending: PendingMap,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    notifications: StdMutex<Option<mpsc::Receiver<JsonRpcNotification>>>,
    server_info: OnceLock<Implementation>,
    server_capabilities: OnceLock<ServerCapabilities>,
    instructions: OnceLock<Option<String>>,
    negotiated_version: OnceLock<ProtocolVersion>,
    shutdown: CancellationToken,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("transport", &self.transport.name())
            .field("connected", &self.connected)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Session {
    /// Connect the transport, start the workers, and perform the MCP
    /// handshake. Any failure tears the session back down and returns the
    /// error.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Result<Arc<Self>> {
        let client_version = ProtocolVersion::parse(&config.protocol_version)?;

        transport.connect().await?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_CAPACITY);
        let (notify_tx, notify_rx) = mpsc::channel::<JsonRpcNotification>(NOTIFICATION_CAPACITY);
        let pending: PendingMap = Arc::new(StdMutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();

        let session = Arc::new(Self {
            transport: transport.clone(),
            config,
            connected: connected.clone(),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pending: pending.clone(),
            outbound_tx: outbound_tx.clone(),
            notifications: StdMutex::new(Some(notify_rx)),
            server_info: OnceLock::new(),
            server_capabilities: OnceLock::new(),
            instructions: OnceLock::new(),
            negotiated_version: OnceLock::new(),
            shutdown: shutdown.clone(),
            workers: StdMutex::new(Vec::new()),
        });

        let sender = tokio::spawn(sender_loop(
            transport.clone(),
            outbound_rx,
            shutdown.clone(),
        ));
        let receiver = tokio::spawn(receiver_loop(
            transport,
            pending,
            notify_tx,
            outbound_tx,
            shutdown,
            connected,
        ));
        session
            .workers
            .lock()
            .expect("workers mutex poisoned")
            .extend([sender, receiver]);

        if let Err(e) = session.handshake(client_version).await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }

    async fn handshake(&self, client_version: ProtocolVersion) -> Result<()> {
        let params = InitializeRequest {
            protocol_version: self.config.protocol_version.clone(),
            capabilities: self.config.capabilities.clone(),
            client_info: self.config.client_info.clone(),
        };
        let raw = self
            .request("initialize", Some(serde_json::to_value(&params)?))
            .await?;
        let init: InitializeResult = serde_json::from_value(raw)?;

        let server_version = ProtocolVersion::parse(&init.protocol_version)?;
        if server_version > client_version {
            return Err(Error::VersionMismatch {
                client: self.config.protocol_version.clone(),
                server: init.protocol_version,
            });
        }

        let _ = self.negotiated_version.set(server_version);
        let _ = self.server_info.set(init.server_info);
        let _ = self.server_capabilities.set(init.capabilities);
        let _ = self.instructions.set(init.instructions);
        self.initialized.store(true, Ordering::SeqCst);
        debug!(server = ?self.server_info.get(), "session initialized");

        self.notify("notifications/initialized", None).await
    }

    /// Whether the transport is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the handshake completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Server identification from the handshake.
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.get()
    }

    /// Server capabilities from the handshake.
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.get()
    }

    /// Server usage instructions from the handshake.
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.get().and_then(|i| i.as_deref())
    }

    /// The protocol version the server announced.
    pub fn negotiated_version(&self) -> Option<ProtocolVersion> {
        self.negotiated_version.get().copied()
    }

    /// Hand out the notification stream. Yields each server notification in
    /// arrival order; the channel drops on overflow and closes on shutdown.
    /// Only the first caller gets the receiver.
    pub fn notifications(&self) -> Option<mpsc::Receiver<JsonRpcNotification>> {
        self.notifications
            .lock()
            .expect("notifications mutex poisoned")
            .take()
    }

    async fn enqueue(&self, message: JsonRpcMessage) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.outbound_tx
            .send(OutboundFrame {
                message,
                ack: ack_tx,
            })
            .await
            .map_err(|_| Error::Cancelled)?;
        match ack_rx.await {
            Ok(result) => result,
            // The sender dropped the slot without reporting: shutdown.
            Err(_) => Err(Error::Cancelled),
        }
    }

    /// Issue a request with the session's default timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.request_with_timeout(method, params, self.config.request_timeout)
            .await
    }

    /// Issue a request with an explicit timeout.
    ///
    /// On timeout the pending entry is removed and a best-effort
    /// `notifications/cancelled` is emitted for the abandoned id.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }

        let id = RequestId::String(generate_request_id());
        let (tx, rx) = oneshot::channel();
        // Register before sending so a response cannot race past us.
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .insert(id.clone(), tx);

        let message = JsonRpcMessage::Request(JsonRpcRequest::new(method, params, id.clone()));
        if let Err(e) = self.enqueue(message).await {
            self.remove_pending(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => match response.payload {
                JsonRpcResponsePayload::Success { result } => Ok(result),
                JsonRpcResponsePayload::Error { error } => Err(Error::Protocol {
                    code: error.code,
                    message: error.message,
                    data: error.data,
                }),
            },
            // Closed without a reply: session shut down or transport gone.
            Ok(Err(_)) => Err(Error::Cancelled),
            Err(_) => {
                self.remove_pending(&id);
                if let Err(e) = self.send_cancellation(&id, "request timed out").await {
                    debug!(%id, "could not emit cancellation: {e}");
                }
                Err(Error::Timeout)
            }
        }
    }

    /// Send a notification; no response is tracked.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        self.enqueue(JsonRpcMessage::Notification(JsonRpcNotification::new(
            method, params,
        )))
        .await
    }

    /// Abandon a request: drop its pending entry and tell the server via
    /// `notifications/cancelled`.
    pub async fn cancel_request(&self, id: &RequestId, reason: impl Into<String>) -> Result<()> {
        self.remove_pending(id);
        let reason = reason.into();
        self.send_cancellation(id, &reason).await
    }

    fn remove_pending(&self, id: &RequestId) {
        self.pending
            .lock()
            .expect("pending mutex poisoned")
            .remove(id);
    }

    async fn send_cancellation(&self, id: &RequestId, reason: &str) -> Result<()> {
        let params = CancelledParams {
            request_id: id.clone(),
            reason: (!reason.is_empty()).then(|| reason.to_string()),
        };
        self.notify("notifications/cancelled", Some(serde_json::to_value(&params)?))
            .await
    }

    /// Shut the session down: stop both workers, wake every in-flight
    /// caller, and close the transport. Safe to call any number of times
    /// from any number of tasks.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("closing session");
        self.shutdown.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().expect("workers mutex poisoned"));
        for worker in workers {
            let _ = worker.await;
        }

        drain_pending(&self.pending);
        self.connected.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
        self.transport.close().await
    }

    // ----- typed operations -------------------------------------------------

    fn require_initialized(&self) -> Result<&ServerCapabilities> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(Error::NotInitialized);
        }
        self.server_capabilities.get().ok_or(Error::NotInitialized)
    }

    fn require_tools(&self) -> Result<()> {
        let caps = self.require_initialized()?;
        if caps.tools.is_none() {
            return Err(Error::unsupported(
                "tools",
                "server did not advertise the tools capability",
            ));
        }
        Ok(())
    }

    fn require_resources(&self) -> Result<()> {
        let caps = self.require_initialized()?;
        if caps.resources.is_none() {
            return Err(Error::unsupported(
                "resources",
                "server did not advertise the resources capability",
            ));
        }
        Ok(())
    }

    fn require_prompts(&self) -> Result<()> {
        let caps = self.require_initialized()?;
        if caps.prompts.is_none() {
            return Err(Error::unsupported(
                "prompts",
                "server did not advertise the prompts capability",
            ));
        }
        Ok(())
    }

    fn cursor_params(cursor: Option<&Cursor>) -> Option<Value> {
        cursor.map(|cursor| json!({ "cursor": cursor }))
    }

    /// List every tool the server offers, following pagination, converted
    /// into the generic model.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        self.require_tools()?;
        let mut tools = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let raw = self
                .request("tools/list", Self::cursor_params(cursor.as_ref()))
                .await?;
            let page: ListToolsResult = serde_json::from_value(raw)?;
            for tool in &page.tools {
                tools.push(convert_tool(tool)?);
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }
    }

    /// Invoke a tool and convert its result into a generic message.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
    ) -> Result<Message> {
        self.require_tools()?;
        if name.trim().is_empty() {
            return Err(Error::validation("name", "tool name cannot be empty"));
        }
        let params = CallToolRequest {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        let raw = self
            .request("tools/call", Some(serde_json::to_value(&params)?))
            .await?;
        let result: CallToolResult = serde_json::from_value(raw)?;
        convert_call_result(&generate_request_id(), &result)
    }

    /// List every resource the server offers, following pagination.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        self.require_resources()?;
        let mut resources = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let raw = self
                .request("resources/list", Self::cursor_params(cursor.as_ref()))
                .await?;
            let page: ListResourcesResult = serde_json::from_value(raw)?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(resources),
            }
        }
    }

    /// Read one resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        self.require_resources()?;
        if uri.is_empty() {
            return Err(Error::validation("uri", "resource URI cannot be empty"));
        }
        let params = ReadResourceRequest {
            uri: uri.to_string(),
        };
        let raw = self
            .request("resources/read", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Subscribe to change notifications for a resource. Requires the
    /// server's `resources.subscribe` flag.
    pub async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        let caps = self.require_initialized()?;
        let subscribable = caps
            .resources
            .as_ref()
            .is_some_and(|r| r.subscribe == Some(true));
        if !subscribable {
            return Err(Error::unsupported(
                "resources/subscribe",
                "server did not advertise resource subscription support",
            ));
        }
        if uri.is_empty() {
            return Err(Error::validation("uri", "resource URI cannot be empty"));
        }
        let params = SubscribeRequest {
            uri: uri.to_string(),
        };
        self.request("resources/subscribe", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(())
    }

    /// Cancel a resource subscription.
    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        self.require_resources()?;
        if uri.is_empty() {
            return Err(Error::validation("uri", "resource URI cannot be empty"));
        }
        let params = UnsubscribeRequest {
            uri: uri.to_string(),
        };
        self.request(
            "resources/unsubscribe",
            Some(serde_json::to_value(&params)?),
        )
        .await?;
        Ok(())
    }

    /// List every prompt the server offers, following pagination.
    pub async fn list_prompts(&self) -> Result<Vec<conduit_protocol::types::Prompt>> {
        self.require_prompts()?;
        let mut prompts = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let raw = self
                .request("prompts/list", Self::cursor_params(cursor.as_ref()))
                .await?;
            let page: ListPromptsResult = serde_json::from_value(raw)?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(prompts),
            }
        }
    }

    /// Instantiate a prompt template.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        self.require_prompts()?;
        if name.trim().is_empty() {
            return Err(Error::validation("name", "prompt name cannot be empty"));
        }
        let params = GetPromptRequest {
            name: name.to_string(),
            arguments,
        };
        let raw = self
            .request("prompts/get", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Set the server's minimum log level. Requires the `logging`
    /// capability.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<()> {
        let caps = self.require_initialized()?;
        if caps.logging.is_none() {
            return Err(Error::unsupported(
                "logging",
                "server did not advertise the logging capability",
            ));
        }
        let params = SetLevelRequest { level };
        self.request("logging/setLevel", Some(serde_json::to_value(&params)?))
            .await?;
        Ok(())
    }

    /// Liveness check; no capability gate.
    pub async fn ping(&self) -> Result<()> {
        self.require_initialized()?;
        self.request("ping", None).await?;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Best effort: stop the workers even if close() was never awaited.
        self.shutdown.cancel();
    }
}

fn drain_pending(pending: &PendingMap) {
    // Dropping the senders closes every waiter's channel; they surface
    // Cancelled.
    pending
        .lock()
        .expect("pending mutex poisoned")
        .drain()
        .for_each(drop);
}

async fn sender_loop(
    transport: Arc<dyn Transport>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = outbound.recv() => {
                let Some(OutboundFrame { message, ack }) = frame else { break };
                let result = transport.send(message).await;
                if let Err(e) = &result {
                    debug!("outbound send failed: {e}");
                }
                // The slot is always resolved, error first; a dropped
                // receiver just means the caller stopped waiting.
                let _ = ack.send(result);
            }
        }
    }
    debug!("sender worker finished");
}

async fn receiver_loop(
    transport: Arc<dyn Transport>,
    pending: PendingMap,
    notifications: mpsc::Sender<JsonRpcNotification>,
    outbound: mpsc::Sender<OutboundFrame>,
    shutdown: CancellationToken,
    connected: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = transport.receive() => match frame {
                Ok(Some(message)) => {
                    dispatch(message, &pending, &notifications, &outbound).await;
                }
                Ok(None) => {
                    debug!("transport ended the inbound stream");
                    connected.store(false, Ordering::SeqCst);
                    break;
                }
                Err(e) => warn!("discarding undecodable inbound frame: {e}"),
            }
        }
    }
    // No further response can arrive; wake every in-flight caller.
    drain_pending(&pending);
    debug!("receiver worker finished");
}

async fn dispatch(
    message: JsonRpcMessage,
    pending: &PendingMap,
    notifications: &mpsc::Sender<JsonRpcNotification>,
    outbound: &mpsc::Sender<OutboundFrame>,
) {
    match message {
        JsonRpcMessage::Response(response) => {
            let Some(id) = response.id.as_request_id().cloned() else {
                warn!("discarding response with null id");
                return;
            };
            let slot = pending
                .lock()
                .expect("pending mutex poisoned")
                .remove(&id);
            match slot {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => warn!(%id, "no pending request for response"),
            }
        }
        JsonRpcMessage::Notification(notification) => {
            match notifications.try_send(notification) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(n)) => {
                    warn!(method = %n.method, "notification queue full, dropping");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        JsonRpcMessage::Request(request) => {
            let response = answer_server_request(request);
            let (ack, _ack_rx) = oneshot::channel();
            // Fire and forget through the ordered outbound queue.
            let _ = outbound
                .send(OutboundFrame {
                    message: JsonRpcMessage::Response(response),
                    ack,
                })
                .await;
        }
    }
}

fn answer_server_request(request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        "ping" => JsonRpcResponse::success(json!({}), request.id),
        "sampling/createMessage" => JsonRpcResponse::error(
            JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: "sampling not supported".to_string(),
                data: None,
            },
            request.id,
        ),
        _ => JsonRpcResponse::error(
            JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: "method not supported".to_string(),
                data: None,
            },
            request.id,
        ),
    }
}
