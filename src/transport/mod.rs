//! HTTP transport for the chat proxy.

pub mod http;

pub use http::{HttpTransport, TransportConfig};
