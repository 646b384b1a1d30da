//! Relay handlers: serve a command by forwarding it over another connection.
//!
//! The host routes each CLI request through one of these to the browser side
//! and hands the browser's reply (or error message) back unchanged.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client::{ClientError, RpcClient};
use crate::commands::COMMAND_NAMES;
use crate::handler::{Handler, HandlerError, HandlerTable};

pub struct RelayHandler {
    command: String,
    upstream: RpcClient,
    timeout: Option<Duration>,
}

impl RelayHandler {
    /// Forward `command` using the upstream client's own deadline.
    pub fn new(command: impl Into<String>, upstream: RpcClient) -> Self {
        Self {
            command: command.into(),
            upstream,
            timeout: None,
        }
    }

    /// Override the upstream deadline, e.g. to give up before the requester does.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Handler for RelayHandler {
    async fn handle(&self, args: Map<String, Value>) -> Result<Value, HandlerError> {
        let result = match self.timeout {
            Some(limit) => {
                self.upstream
                    .invoke_with_timeout(&self.command, args, Some(limit))
                    .await
            }
            None => self.upstream.invoke(&self.command, args).await,
        };

        result.map_err(|e| match e {
            // The browser's message is passed through verbatim.
            ClientError::Remote { message } => HandlerError::new(message),
            other => {
                tracing::warn!(command = %self.command, error = %other, "Relay failed");
                HandlerError::new(format!("browser unavailable: {other}"))
            }
        })
    }
}

/// A table relaying every known command to `upstream`, each with `timeout`
/// (`None`: the upstream client's own deadline).
pub fn relay_table(upstream: &RpcClient, timeout: Option<Duration>) -> HandlerTable {
    let mut table = HandlerTable::new();
    for &name in COMMAND_NAMES {
        table.register(
            name,
            RelayHandler::new(name, upstream.clone()).with_timeout(timeout),
        );
    }
    table
}
