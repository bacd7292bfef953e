//! Chat client: the request orchestrator and its collaborators.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod chat;
pub mod core;
mod error_classification;
mod execution;
mod policy;
pub mod session;
pub mod signals;
pub mod types;

pub use builder::ChatClientBuilder;
pub use chat::ChatStream;
pub use core::ChatClient;
pub use session::{ChatSession, SessionManager};
pub use signals::ClientSignals;
pub use types::{CallStats, ChatEvent, ChatOutcome};
