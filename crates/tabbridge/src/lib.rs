//! tabbridge: request/response RPC over browser native-messaging streams.
//!
//! Both directions of a connection carry the same length-prefixed JSON
//! envelope. An [`RpcClient`] issues requests and matches replies to callers
//! by ID; a [`Router`] serves requests by dispatching them to registered
//! handlers, concurrently, replying in completion order.

pub mod bridge;
pub mod client;
pub mod commands;
pub mod config;
pub mod correlation;
pub mod handler;
pub mod logging;
pub mod permit;
pub mod relay;
pub mod router;

pub use bridge::codec::{CodecError, JsonCodec};
pub use bridge::protocol::{Envelope, Reply, Request, RequestId};
pub use client::{ClientConfig, ClientError, RpcClient};
pub use commands::{COMMAND_NAMES, Command};
pub use config::{BridgeConfig, ConfigError};
pub use handler::{Handler, HandlerError, HandlerTable};
pub use logging::init_tracing;
pub use relay::{RelayHandler, relay_table};
pub use router::{Router, RouterConfig, ServeError};
