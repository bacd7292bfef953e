//! # chat-connector
//!
//! Client-side connector for a proxied, streaming chat-completion service.
//!
//! ## Overview
//!
//! A [`ChatClient`] sends chat messages under a caller-defined rate budget, recovers from
//! transient failures (throttling, 5xx responses, dropped connections, expired sessions),
//! and decodes the streamed response incrementally. Every wait is cancellable.
//!
//! ```text
//! caller → ChatClient → RateLimiter (gate) → SessionManager (ensure session)
//!        → POST /api/chats/{id}/continue → StreamDecoder → text increments → full text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_connector::{ChatClient, ChatOutcome, RateLimitPolicy};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> chat_connector::Result<()> {
//!     let client = ChatClient::builder("https://proxy.example.com")
//!         .policy(RateLimitPolicy::new().with_min_interval(Duration::from_millis(500)))
//!         .build()?;
//!
//!     let cancel = CancellationToken::new();
//!     match client.send_message("Hello!", &cancel).await? {
//!         ChatOutcome::Completed { text, .. } => println!("{text}"),
//!         ChatOutcome::Cancelled { .. } => println!("cancelled"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Orchestrator, session manager, builder |
//! | [`resilience`] | Rate limiter and backoff |
//! | [`pipeline`] | Incremental stream decoder |
//! | [`transport`] | HTTP transport |
//! | [`usage`] | Usage notifications |

pub mod client;
pub mod pipeline;
pub mod resilience;
pub mod transport;
pub mod usage;
pub mod utils;

pub use client::{
    CallStats, ChatClient, ChatClientBuilder, ChatEvent, ChatOutcome, ChatSession, ChatStream,
    ClientSignals,
};
pub use pipeline::{DecodedEvent, StreamDecoder};
pub use resilience::{Backoff, BudgetDecision, BudgetReason, RateLimitPolicy, RateLimiter};
pub use usage::{UsageEvent, UsageSink};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ErrorKind};
