//! Command handlers and the dispatch table the router looks them up in.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::commands::Command;

/// A handler failed; the message is sent back verbatim in the reply's `error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

/// Executes one named command.
///
/// Receives the request's command-specific fields (the payload minus `command`)
/// and returns the reply payload. `Value::Null` is a valid result for void
/// operations.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, args: Map<String, Value>) -> Result<Value, HandlerError>;
}

/// Handler over raw JSON arguments, built from an async closure.
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, args: Map<String, Value>) -> Result<Value, HandlerError> {
        (self.f)(args).await
    }
}

/// Handler for a strongly typed command: arguments are decoded into `C` and
/// the result encoded from `C::Output`.
pub struct TypedHandler<C, F> {
    f: F,
    _command: PhantomData<fn(C)>,
}

#[async_trait]
impl<C, F, Fut> Handler for TypedHandler<C, F>
where
    C: Command,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C::Output, HandlerError>> + Send + 'static,
{
    async fn handle(&self, args: Map<String, Value>) -> Result<Value, HandlerError> {
        let request: C = serde_json::from_value(Value::Object(args))
            .map_err(|e| HandlerError::new(format!("invalid arguments for {}: {e}", C::NAME)))?;
        let output = (self.f)(request).await?;
        serde_json::to_value(output).map_err(|e| {
            HandlerError::new(format!("failed to encode result of {}: {e}", C::NAME))
        })
    }
}

/// Command name to handler. Built at startup, read-only while serving.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler) -> &mut Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), Arc::new(handler)).is_some() {
            tracing::warn!(command = %name, "Replacing existing handler");
        }
        self
    }

    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.register(name, FnHandler { f })
    }

    /// Register a typed handler under `C::NAME`.
    pub fn register_typed<C, F, Fut>(&mut self, f: F) -> &mut Self
    where
        C: Command,
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<C::Output, HandlerError>> + Send + 'static,
    {
        self.register(
            C::NAME,
            TypedHandler {
                f,
                _command: PhantomData::<fn(C)>,
            },
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
