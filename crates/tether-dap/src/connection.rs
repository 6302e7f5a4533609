//! A live connection to one debug adapter.
//!
//! Outgoing requests go through a writer task; a reader task routes
//! responses to their waiting callers by `request_seq` and forwards
//! events on an unbounded channel. When the adapter goes away every
//! pending request fails with [`DapError::Terminated`] and the event
//! channel closes.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

use crate::error::DapError;
use crate::protocol::{Event, ProtocolMessage, Request, Response};
use crate::transport::{encode_message, read_message};

/// Default timeout for requests (seconds).
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// `None` once the reader has seen the end of the stream.
type PendingMap = Arc<Mutex<Option<HashMap<i64, oneshot::Sender<Response>>>>>;

/// Receiving half for adapter events.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Request/response channel to a debug adapter.
pub struct DapConnection {
    seq: Arc<AtomicI64>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    pending: PendingMap,
    request_timeout: Duration,
    child: Mutex<Option<Child>>,
}

impl DapConnection {
    /// Spawn an adapter process and connect to its stdio.
    pub fn spawn<I, S>(program: &str, args: I) -> Result<(Self, EventReceiver), DapError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DapError::Transport("could not capture adapter stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DapError::Transport("could not capture adapter stdout".into()))?;

        tracing::info!(program, pid = ?child.id(), "spawned debug adapter");
        let (mut conn, events) = Self::from_streams(stdout, stdin);
        conn.child = Mutex::new(Some(child));
        Ok((conn, events))
    }

    /// Connect over an arbitrary reader/writer pair.
    pub fn from_streams<R, W>(reader: R, writer: W) -> (Self, EventReceiver)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(msg) = writer_rx.recv().await {
                if writer.write_all(&msg).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        let seq = Arc::new(AtomicI64::new(1));
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            BufReader::new(reader),
            pending.clone(),
            events_tx,
            writer_tx.clone(),
            seq.clone(),
        ));

        let conn = Self {
            seq,
            writer_tx,
            pending,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            child: Mutex::new(None),
        };
        (conn, events_rx)
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Whether the adapter stream has ended.
    pub fn is_closed(&self) -> bool {
        self.pending
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Send a request and wait for the response body.
    pub async fn request_value(
        &self,
        command: &str,
        arguments: Option<Value>,
    ) -> Result<Option<Value>, DapError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock().map_err(|_| DapError::Terminated)?;
            let pending = guard.as_mut().ok_or(DapError::Terminated)?;
            pending.insert(seq, tx);
        }

        let message = ProtocolMessage::Request(Request {
            seq,
            command: command.to_string(),
            arguments,
        });
        let bytes = encode_message(&message)?;
        tracing::trace!(seq, command, "dap request");
        if self.writer_tx.send(bytes).await.is_err() {
            self.forget(seq);
            return Err(DapError::Terminated);
        }

        let response = match timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(DapError::Terminated),
            Err(_) => {
                self.forget(seq);
                return Err(DapError::Timeout {
                    command: command.to_string(),
                });
            }
        };

        if !response.success {
            return Err(DapError::Rejected {
                command: command.to_string(),
                message: response.message.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(response.body)
    }

    /// Send a request with typed arguments and decode the typed body.
    pub async fn request<A, R>(&self, command: &str, arguments: &A) -> Result<R, DapError>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let arguments = serde_json::to_value(arguments)
            .map_err(|e| DapError::Transport(format!("serialize failed: {e}")))?;
        let body = self.request_value(command, Some(arguments)).await?;
        serde_json::from_value(body.unwrap_or(Value::Null))
            .map_err(|e| DapError::InvalidResponse(format!("{command}: {e}")))
    }

    /// Send a request whose response body is not needed.
    pub async fn send<A: Serialize>(&self, command: &str, arguments: &A) -> Result<(), DapError> {
        let arguments = serde_json::to_value(arguments)
            .map_err(|e| DapError::Transport(format!("serialize failed: {e}")))?;
        self.request_value(command, Some(arguments)).await?;
        Ok(())
    }

    /// Wait up to `grace` for the adapter process to exit, then kill it.
    pub async fn close(&self, grace: Duration) {
        let child = self.child.lock().ok().and_then(|mut guard| guard.take());
        let Some(mut child) = child else {
            return;
        };
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "debug adapter exited"),
            Ok(Err(e)) => tracing::warn!("waiting for debug adapter failed: {e}"),
            Err(_) => {
                tracing::warn!("debug adapter did not exit, killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!("failed to kill debug adapter: {e}");
                }
            }
        }
    }

    fn forget(&self, seq: i64) {
        if let Ok(mut guard) = self.pending.lock() {
            if let Some(pending) = guard.as_mut() {
                pending.remove(&seq);
            }
        }
    }
}

async fn read_loop<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    events_tx: mpsc::UnboundedSender<Event>,
    writer_tx: mpsc::Sender<Vec<u8>>,
    seq: Arc<AtomicI64>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                tracing::debug!("debug adapter closed its output");
                break;
            }
            Err(DapError::InvalidResponse(e)) => {
                tracing::warn!("skipping unparseable adapter message: {e}");
                continue;
            }
            Err(e) => {
                tracing::warn!("debug adapter stream failed: {e}");
                break;
            }
        };

        match message {
            ProtocolMessage::Response(response) => {
                let waiter = pending
                    .lock()
                    .ok()
                    .and_then(|mut guard| guard.as_mut()?.remove(&response.request_seq));
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!(
                        request_seq = response.request_seq,
                        "response for unknown request"
                    ),
                }
            }
            ProtocolMessage::Event(event) => {
                tracing::trace!(event = %event.event, "dap event");
                let _ = events_tx.send(event);
            }
            ProtocolMessage::Request(request) => {
                // Reverse requests (runInTerminal, startDebugging) are declined.
                tracing::debug!(command = %request.command, "declining reverse request");
                let reply = ProtocolMessage::Response(Response {
                    seq: seq.fetch_add(1, Ordering::SeqCst),
                    request_seq: request.seq,
                    success: false,
                    command: request.command,
                    message: Some("not supported".into()),
                    body: None,
                });
                if let Ok(bytes) = encode_message(&reply) {
                    let _ = writer_tx.send(bytes).await;
                }
            }
        }
    }

    // Dropping the senders wakes every waiter with an error.
    if let Ok(mut guard) = pending.lock() {
        guard.take();
    }
}
