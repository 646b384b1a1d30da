//! RPC client - the requesting side of a connection.
//!
//! Flow:
//! 1. `invoke` registers a fresh ID in the connection's correlation table
//! 2. The request envelope is written through the single, mutex-guarded writer
//! 3. The caller suspends on its own pending reply
//! 4. A reader task decodes replies and resolves callers by ID, in any order
//! 5. On EOF, a framing error, or a broken pipe every pending caller is failed
//!
//! A caller's deadline covers all of 2 and 3, including the wait for the
//! writer lock. A request write that misses its deadline may have left half a
//! frame on the wire, so it fails the whole connection.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{DEFAULT_MAX_FRAME_LENGTH, JsonCodec};
use crate::bridge::protocol::{Envelope, Request, RequestId};
use crate::commands::Command;
use crate::config::BridgeConfig;
use crate::correlation::{CorrelationTable, Outcome};

type EnvelopeWriter = FramedWrite<Pin<Box<dyn AsyncWrite + Send>>, JsonCodec<Envelope>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The remote handler reported a failure. Connection stays usable.
    #[error("{message}")]
    Remote { message: String },

    /// The stream failed or closed before a reply arrived. Connection is gone.
    #[error("connection failed: {0}")]
    Transport(String),

    /// The caller's deadline elapsed first. A late reply is discarded.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid arguments for {command}: {reason}")]
    InvalidArguments { command: String, reason: String },

    #[error("unexpected result for {command}: {reason}")]
    Decode { command: String, reason: String },
}

impl ClientError {
    /// Framing and transport failures, as opposed to per-request ones.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Deadline applied by `invoke`/`call`; `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    pub max_frame_length: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl From<&BridgeConfig> for ClientConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            max_frame_length: config.max_frame_length,
        }
    }
}

/// One connection's requesting side. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    state: Arc<ConnectionState>,
    writer: Mutex<EnvelopeWriter>,
    request_timeout: Option<Duration>,
    reader: JoinHandle<()>,
}

/// Shared by callers and the reader task.
struct ConnectionState {
    table: CorrelationTable,
    closed: watch::Sender<bool>,
}

impl ConnectionState {
    /// Fail every pending request and mark the connection closed.
    fn fail(&self, reason: String) {
        let drained = self.table.drain_all(reason);
        if drained > 0 {
            tracing::warn!(drained, "Failed pending requests on connection close");
        }
        self.closed.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    fn after(limit: Duration) -> Self {
        Self {
            at: Instant::now() + limit,
            limit,
        }
    }
}

/// Run `fut` to completion, or until `deadline` passes.
async fn until<F: Future>(deadline: Option<Deadline>, fut: F) -> Result<F::Output, ClientError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, fut)
            .await
            .map_err(|_| ClientError::Timeout(deadline.limit)),
        None => Ok(fut.await),
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Removes the caller's table entry if it stops waiting (deadline, or its
/// future was dropped). A no-op once the entry has been resolved.
struct PendingGuard<'a> {
    table: &'a CorrelationTable,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.cancel(&self.id) {
            tracing::debug!(id = %self.id, "Abandoned pending request");
        }
    }
}

impl RpcClient {
    /// Start a client over a split duplex stream. Must be called inside a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W, config: ClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let (closed, _) = watch::channel(false);
        let state = Arc::new(ConnectionState {
            table: CorrelationTable::new(),
            closed,
        });

        let frames = FramedRead::new(
            reader,
            JsonCodec::<Envelope>::with_max_frame_length(config.max_frame_length),
        );
        let writer: Pin<Box<dyn AsyncWrite + Send>> = Box::pin(writer);
        let writer = FramedWrite::new(
            writer,
            JsonCodec::<Envelope>::with_max_frame_length(config.max_frame_length),
        );

        let reader = tokio::spawn(read_replies(frames, Arc::clone(&state)));

        Self {
            inner: Arc::new(ClientInner {
                state,
                writer: Mutex::new(writer),
                request_timeout: config.request_timeout,
                reader,
            }),
        }
    }

    /// Invoke `command` with the client's configured deadline.
    pub async fn invoke(&self, command: &str, args: Map<String, Value>) -> Result<Value, ClientError> {
        self.invoke_with_timeout(command, args, self.inner.request_timeout)
            .await
    }

    /// Invoke `command`, taking at most `timeout` from start to reply
    /// (`None`: until reply or transport failure).
    pub async fn invoke_with_timeout(
        &self,
        command: &str,
        args: Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let deadline = timeout.map(Deadline::after);
        let state = &self.inner.state;
        let table = &state.table;
        let pending = table
            .register()
            .map_err(|e| ClientError::Transport(e.reason))?;
        let id = pending.id().clone();
        let _guard = PendingGuard {
            table,
            id: id.clone(),
        };

        tracing::debug!(%id, command, "Sending request");
        let request = Request::new(id.clone(), command, args);
        {
            let mut writer = until(deadline, self.inner.writer.lock())
                .await
                .inspect_err(|_| {
                    tracing::warn!(%id, command, "Request timed out waiting for the writer");
                })?;
            match until(deadline, writer.send(Envelope::from(request))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_transport() => {
                    tracing::error!(%id, command, error = %e, "Failed to write request");
                    state.fail(format!("write failed: {e}"));
                    return Err(ClientError::Transport(e.to_string()));
                }
                Ok(Err(e)) => {
                    return Err(ClientError::InvalidArguments {
                        command: command.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(timed_out) => {
                    tracing::error!(%id, command, "Request write timed out, closing connection");
                    state.fail("request write timed out".to_string());
                    return Err(timed_out);
                }
            }
        }

        let outcome = until(deadline, pending.wait()).await.inspect_err(|e| {
            tracing::warn!(%id, command, error = %e, "Request timed out");
        })?;

        match outcome {
            Outcome::Success(payload) => {
                tracing::trace!(%id, command, "Request succeeded");
                Ok(payload)
            }
            Outcome::Remote(message) => {
                tracing::debug!(%id, command, %message, "Request failed remotely");
                Err(ClientError::Remote { message })
            }
            Outcome::Closed(reason) => Err(ClientError::Transport(reason)),
        }
    }

    /// Invoke a strongly typed command.
    pub async fn call<C: Command>(&self, request: &C) -> Result<C::Output, ClientError> {
        let args = match serde_json::to_value(request) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(ClientError::InvalidArguments {
                    command: C::NAME.to_string(),
                    reason: format!("expected an object, got {other}"),
                });
            }
            Err(e) => {
                return Err(ClientError::InvalidArguments {
                    command: C::NAME.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let payload = self.invoke(C::NAME, args).await?;
        serde_json::from_value(payload).map_err(|e| ClientError::Decode {
            command: C::NAME.to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolves once the connection has closed and all pending requests were failed.
    pub async fn closed(&self) {
        let mut rx = self.inner.state.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.table.is_closed()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.state.table.len()
    }
}

async fn read_replies<R>(
    mut frames: FramedRead<R, JsonCodec<Envelope>>,
    state: Arc<ConnectionState>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        match frames.next().await {
            Some(Ok(envelope)) => {
                let reply = match envelope.into_reply() {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!(error = %e, "Malformed reply, closing connection");
                        break e.to_string();
                    }
                };
                let id = reply.id.clone();
                if !state.table.resolve(&id, Outcome::from_reply(reply.result)) {
                    tracing::warn!(%id, "Discarding reply with no pending request");
                }
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Reply stream error");
                break e.to_string();
            }
            None => {
                tracing::debug!("Reply stream closed");
                break "connection closed by peer".to_string();
            }
        }
    };

    state.fail(reason);
}
