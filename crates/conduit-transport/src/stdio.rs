//! Subprocess transport: newline-delimited JSON over a child's stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, trace, warn};

use conduit_protocol::{Error, JsonRpcMessage, Result};

use crate::Transport;
use crate::wire::{decode_message, encode_message};

/// Callback invoked with each line the server writes to stderr.
pub type StderrHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// How long to wait for a natural exit after closing the server's stdin.
const GRACEFUL_EXIT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to wait after SIGTERM before resorting to SIGKILL.
const TERM_EXIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Environment variables forwarded to the server by default.
///
/// MCP servers inherit only a curated subset of the parent environment;
/// anything else must be passed explicitly via
/// [`StdioTransportConfig::env`].
#[cfg(unix)]
const DEFAULT_ENV_VARS: &[&str] = &[
    "HOME", "LOGNAME", "PATH", "SHELL", "USER", "LANG", "LC_ALL", "TERM", "TMPDIR", "TZ",
];

#[cfg(windows)]
const DEFAULT_ENV_VARS: &[&str] = &[
    "PATH",
    "PATHEXT",
    "USERNAME",
    "USERDOMAIN",
    "USERPROFILE",
    "TEMP",
    "TMP",
];

/// Configuration for [`StdioTransport`].
#[derive(Clone)]
pub struct StdioTransportConfig {
    /// Program to spawn.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables for the server process.
    pub env: HashMap<String, String>,
    /// Forward the full parent environment instead of the curated default
    /// set.
    pub inherit_full_env: bool,
    /// Receives each stderr line; unset lines go to `tracing` at debug.
    pub stderr_handler: Option<StderrHandler>,
}

impl StdioTransportConfig {
    /// Configuration for the given program with default settings.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            inherit_full_env: false,
            stderr_handler: None,
        }
    }

    /// Set the program arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add environment variables for the server process.
    #[must_use]
    pub fn env(mut self, env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>) -> Self {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Install a stderr line handler.
    #[must_use]
    pub fn stderr_handler(mut self, handler: StderrHandler) -> Self {
        self.stderr_handler = Some(handler);
        self
    }
}

impl std::fmt::Debug for StdioTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransportConfig")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("inherit_full_env", &self.inherit_full_env)
            .field("stderr_handler", &self.stderr_handler.as_ref().map(|_| "<handler>"))
            .finish()
    }
}

type StdinWriter = FramedWrite<ChildStdin, LinesCodec>;
type Inbound = mpsc::Receiver<Result<JsonRpcMessage>>;

/// Transport over a spawned MCP server process.
pub struct StdioTransport {
    config: StdioTransportConfig,
    connected: AtomicBool,
    closed: AtomicBool,
    child: Mutex<Option<Child>>,
    writer: Mutex<Option<StdinWriter>>,
    inbound: Mutex<Option<Inbound>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("program", &self.config.program)
            .field("connected", &self.connected)
            .finish()
    }
}

impl StdioTransport {
    /// Create an unconnected transport for the configured server command.
    pub fn new(config: StdioTransportConfig) -> Self {
        Self {
            config,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            child: Mutex::new(None),
            writer: Mutex::new(None),
            inbound: Mutex::new(None),
            reader_task: Mutex::new(None),
            stderr_task: Mutex::new(None),
        }
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.config.program);
        command.args(&self.config.args);
        if !self.config.inherit_full_env {
            command.env_clear();
            for var in DEFAULT_ENV_VARS {
                if let Ok(value) = std::env::var(var) {
                    command.env(var, value);
                }
            }
        }
        command.envs(&self.config.env);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyConnected);
        }

        let mut child = self.build_command().spawn().map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            Error::transport("stdio", "spawn", format!("{}: {e}", self.config.program))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::transport("stdio", "spawn", "child stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::transport("stdio", "spawn", "child stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::transport("stdio", "spawn", "child stderr was not piped"))?;

        let (tx, rx) = mpsc::channel::<Result<JsonRpcMessage>>(64);

        let reader_task = tokio::spawn(async move {
            let mut frames = FramedRead::new(stdout, LinesCodec::new());
            while let Some(item) = frames.next().await {
                let forwarded = match item {
                    Ok(line) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        trace!(bytes = line.len(), "stdio frame received");
                        decode_message(&line)
                    }
                    Err(e) => Err(Error::transport("stdio", "receive", e.to_string())),
                };
                if tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            debug!("stdio reader task finished");
        });

        let stderr_task = {
            let handler = self.config.stderr_handler.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match &handler {
                        Some(handler) => handler(&line),
                        None => debug!(target: "conduit::stdio::stderr", "{line}"),
                    }
                }
            })
        };

        *self.writer.lock().await = Some(FramedWrite::new(stdin, LinesCodec::new()));
        *self.inbound.lock().await = Some(rx);
        *self.child.lock().await = Some(child);
        *self.reader_task.lock().await = Some(reader_task);
        *self.stderr_task.lock().await = Some(stderr_task);

        debug!(program = %self.config.program, "stdio transport connected");
        Ok(())
    }

    async fn send(&self, message: JsonRpcMessage) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) || !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let line = encode_message(&message)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        writer
            .send(line)
            .await
            .map_err(|e| Error::transport("stdio", "send", e.to_string()))
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

        // Dropping stdin sends EOF; well-behaved servers exit on their own.
        self.writer.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            let exited = tokio::time::timeout(GRACEFUL_EXIT_TIMEOUT, child.wait())
                .await
                .is_ok();
            if !exited {
                warn!(
                    program = %self.config.program,
                    "server did not exit after stdin close, escalating"
                );
                #[cfg(unix)]
                if let Some(pid) = child.id() {
                    // SAFETY: pid names our own child process.
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                }
                #[cfg(not(unix))]
                let _ = child.start_kill();

                if tokio::time::timeout(TERM_EXIT_TIMEOUT, child.wait())
                    .await
                    .is_err()
                {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        }

        if let Some(task) = self.reader_task.lock().await.take() {
            task.abort();
        }
        if let Some(task) = self.stderr_task.lock().await.take() {
            task.abort();
        }
        self.inbound.lock().await.take();
        self.connected.store(false, Ordering::SeqCst);
        debug!("stdio transport closed");
        Ok(())
    }
}
