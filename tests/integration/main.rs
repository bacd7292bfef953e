//! Integration tests against mock HTTP servers.

mod cancellation;
mod hanging_server;
