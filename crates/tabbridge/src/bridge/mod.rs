//! Wire layer for the CLI / host / browser bridge.
//!
//! # Architecture
//!
//! - **protocol**: Envelope plus the tagged Request/Reply views of it
//! - **codec**: length-prefixed JSON framing for AsyncRead/AsyncWrite
//! - **transport**: local unix socket between CLI and host

pub mod codec;
pub mod protocol;
pub mod transport;
