//! Request router - the serving side of a connection.
//!
//! Reads request frames one at a time and dispatches each to its handler on
//! its own task, so a slow handler never holds up the next request. Replies
//! are written as handlers finish, in completion order, through a single
//! mutex-guarded writer so frames never interleave.
//!
//! A failed reply write is logged and affects only that request. Any read
//! failure (EOF, framing, schema) closes the connection: in-flight handlers
//! are aborted and `serve` returns.

use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{CodecError, DEFAULT_MAX_FRAME_LENGTH, JsonCodec};
use crate::bridge::protocol::{Envelope, Reply, Request};
use crate::config::BridgeConfig;
use crate::handler::{Handler, HandlerTable};
use crate::permit::{HandlerPermit, HandlerPermits};

type SharedWriter = Arc<Mutex<FramedWrite<Pin<Box<dyn AsyncWrite + Send>>, JsonCodec<Envelope>>>>;

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    /// Incoming bytes could not be read as a request; the stream is unrecoverable.
    #[error("failed to read request: {0}")]
    Read(CodecError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// `None` runs every request as soon as it is read.
    pub max_concurrent_handlers: Option<NonZeroUsize>,
    pub max_frame_length: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: None,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl From<&BridgeConfig> for RouterConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            max_concurrent_handlers: config.max_concurrent_handlers,
            max_frame_length: config.max_frame_length,
        }
    }
}

pub struct Router {
    handlers: Arc<HandlerTable>,
    permits: HandlerPermits,
    max_frame_length: usize,
}

impl Router {
    pub fn new(handlers: HandlerTable, config: RouterConfig) -> Self {
        Self {
            handlers: Arc::new(handlers),
            permits: HandlerPermits::new(config.max_concurrent_handlers),
            max_frame_length: config.max_frame_length,
        }
    }

    /// Serve one connection until the peer closes it or the stream fails.
    ///
    /// A clean EOF at a frame boundary returns `Ok(())`.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ServeError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Send + 'static,
    {
        let mut frames = FramedRead::new(
            reader,
            JsonCodec::<Envelope>::with_max_frame_length(self.max_frame_length),
        );
        let writer: Pin<Box<dyn AsyncWrite + Send>> = Box::pin(writer);
        let writer: SharedWriter = Arc::new(Mutex::new(FramedWrite::new(
            writer,
            JsonCodec::<Envelope>::with_max_frame_length(self.max_frame_length),
        )));
        let mut tasks: JoinSet<Result<(), CodecError>> = JoinSet::new();

        let result = loop {
            tokio::select! {
                biased;

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::error!(error = %e, "Failed to write reply"),
                        Err(e) if e.is_panic() => {
                            tracing::error!(error = %e, "Handler task panicked");
                        }
                        Err(_) => {}
                    }
                }

                frame = frames.next() => {
                    let envelope = match frame {
                        Some(Ok(envelope)) => envelope,
                        Some(Err(e)) => break Err(ServeError::Read(e)),
                        None => {
                            tracing::debug!("Peer closed connection");
                            break Ok(());
                        }
                    };
                    let request = match envelope.into_request() {
                        Ok(request) => request,
                        Err(e) => break Err(ServeError::Read(e)),
                    };

                    let Some(handler) = self.handlers.get(&request.command) else {
                        tracing::warn!(id = %request.id, command = %request.command, "Unknown command");
                        let reply = Reply::unknown_command(request.id, &request.command);
                        let writer = Arc::clone(&writer);
                        tasks.spawn(async move { write_reply(&writer, reply).await });
                        continue;
                    };

                    tracing::trace!(
                        id = %request.id,
                        command = %request.command,
                        in_flight = self.permits.in_flight(),
                        "Dispatching request"
                    );
                    let permit = self.permits.acquire().await;
                    tasks.spawn(run_handler(handler, request, permit, Arc::clone(&writer)));
                }
            }
        };

        if !tasks.is_empty() {
            tracing::debug!(in_flight = tasks.len(), "Aborting in-flight handlers");
        }
        tasks.shutdown().await;

        if let Err(e) = &result {
            tracing::error!(error = %e, "Connection closed with error");
        }
        result
    }
}

async fn run_handler(
    handler: Arc<dyn Handler>,
    request: Request,
    _permit: HandlerPermit,
    writer: SharedWriter,
) -> Result<(), CodecError> {
    let Request { id, command, args } = request;

    let reply = match AssertUnwindSafe(handler.handle(args)).catch_unwind().await {
        Ok(Ok(payload)) => Reply::success(id, payload),
        Ok(Err(e)) => {
            tracing::debug!(%id, %command, error = %e, "Handler failed");
            Reply::failure(id, e.into_message())
        }
        Err(_) => {
            tracing::error!(%id, %command, "Handler panicked");
            Reply::failure(id, format!("handler for {command} panicked"))
        }
    };

    write_reply(&writer, reply).await
}

/// Write one reply. A reply that cannot be encoded (e.g. over the frame limit)
/// is replaced by an error reply so the requester is not left waiting.
async fn write_reply(writer: &SharedWriter, reply: Reply) -> Result<(), CodecError> {
    let id = reply.id.clone();
    let mut writer = writer.lock().await;
    match writer.send(Envelope::from(reply)).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_transport() => Err(e),
        Err(e) => {
            tracing::warn!(%id, error = %e, "Failed to encode reply, sending error instead");
            writer
                .send(Reply::failure(id, format!("failed to encode reply: {e}")).into())
                .await
        }
    }
}
