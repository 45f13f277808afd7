//! Auto-detecting HTTP transport.
//!
//! Starts on the Streamable HTTP flavour; when the server answers
//! `initialize` with HTTP 404/405 the transport connects a legacy HTTP+SSE
//! instance, swaps it in under an exclusive lock, and retries the send.
//! Concurrent senders that hit the same sentinel observe the already-swapped
//! transport and simply retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use conduit_protocol::{Error, JsonRpcMessage, Result};

use crate::Transport;
use crate::http_sse::{HttpSseConfig, HttpSseTransport};
use crate::streamable_http::{StreamableHttpConfig, StreamableHttpTransport};

enum ActiveTransport {
    Streamable(Arc<StreamableHttpTransport>),
    Legacy(Arc<HttpSseTransport>),
}

impl ActiveTransport {
    fn as_transport(&self) -> Arc<dyn Transport> {
        match self {
            Self::Streamable(t) => t.clone(),
            Self::Legacy(t) => t.clone(),
        }
    }
}

/// HTTP transport that negotiates between the modern and legacy flavours.
pub struct AutoHttpTransport {
    legacy_config: HttpSseConfig,
    inner: RwLock<ActiveTransport>,
    /// Bumped on every swap so blocked receivers can tell teardown of the
    /// old transport apart from teardown of the whole session.
    generation: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for AutoHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoHttpTransport")
            .field("url", &self.legacy_config.url)
            .finish()
    }
}

impl AutoHttpTransport {
    /// Create an auto-detecting transport for the given endpoint.
    pub fn new(config: StreamableHttpConfig) -> Self {
        let legacy_config = HttpSseConfig {
            url: config.url.clone(),
            headers: config.headers.clone(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
        };
        Self {
            legacy_config,
            inner: RwLock::new(ActiveTransport::Streamable(Arc::new(
                StreamableHttpTransport::new(config),
            ))),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    async fn active(&self) -> (u64, Arc<dyn Transport>) {
        let guard = self.inner.read().await;
        (self.generation.load(Ordering::SeqCst), guard.as_transport())
    }

    /// Swap in a freshly connected legacy transport. First swapper wins;
    /// callers that observed a stale generation find the work already done.
    async fn fall_back(&self, observed_generation: u64) -> Result<()> {
        let mut guard = self.inner.write().await;
        if self.generation.load(Ordering::SeqCst) != observed_generation {
            return Ok(());
        }
        let ActiveTransport::Streamable(old) = &*guard else {
            return Ok(());
        };
        let old = old.clone();

        debug!("server requires legacy HTTP+SSE, falling back");
        let legacy = Arc::new(HttpSseTransport::new(self.legacy_config.clone()));
        legacy.connect().await?;
        *guard = ActiveTransport::Legacy(legacy);
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(guard);

        // Closed only after the swap is visible, so a receiver observing the
        // old stream ending will re-check the generation and move over.
        let _ = old.close().await;
        Ok(())
    }
}

#[async_trait]
impl Transport for AutoHttpTransport {
    fn name(&self) -> &'static str {
        "auto-http"
    }

    async fn connect(&self) -> Result<()> {
        let (_, transport) = self.active().await;
        transport.connect().await
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        let (generation, transport) = self.active().await;
        match transport.send(message.clone()).await {
            Err(Error::LegacyEndpointRequired) => {
                self.fall_back(generation).await?;
                let (_, transport) = self.active().await;
                transport.send(message).await
            }
            other => other,
        }
    }

    async fn receive(&self) -> Result<Option<JsonRpcMessage>> {
        loop {
            let (generation, transport) = self.active().await;
            match transport.receive().await {
                Ok(None)
                    if self.generation.load(Ordering::SeqCst) != generation
                        && !self.closed.load(Ordering::SeqCst) =>
                {
                    // The old flavour was torn down by a swap; resume on the
                    // new one.
                    continue;
                }
                other => return other,
            }
        }
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (_, transport) = self.active().await;
        transport.close().await
    }
}
