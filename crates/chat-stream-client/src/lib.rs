//! Streaming chat client with transcript reconciliation.
//!
//! A turn posts a prompt, reads the server-sent event stream incrementally,
//! renders speculative state while it arrives, and replaces that state with
//! the server's transcript once the turn ends.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chat_stream_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let backend = Arc::new(HttpChatBackend::from_env()?);
//! let reconciler = Arc::new(TranscriptReconciler::new(SessionId::new("s-1"), backend));
//! let session = StreamSession::new(reconciler.clone(), Arc::new(NoopObserver));
//!
//! let outcome = session.start("Which region sold the most?").await?;
//! println!("{outcome:?}: {} entries", reconciler.entries().len());
//! # Ok(())
//! # }
//! ```

/// Chat backend contract and its HTTP implementation.
pub mod backend;
/// Public error types.
pub mod errors;
/// Domain events decoded from the wire.
pub mod event;
/// Incremental `data:` line framing over arbitrary byte chunks.
pub mod frame;
/// Per-turn event interpretation.
pub mod interpreter;
/// Transcript entries, roles, artifacts and tool status.
pub mod model;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Turn lifecycle, live status, and cancellation.
pub mod session;
/// Transcript ownership and reconciliation.
pub mod transcript;

#[cfg(test)]
mod testing;

pub use backend::{ChatBackend, ChunkStream, ClientConfig, HttpChatBackend};
pub use errors::{ChatError, TransportError};
pub use event::DomainEvent;
pub use frame::FrameDecoder;
pub use interpreter::{Effect, TextEndPolicy, TurnState};
pub use model::{Artifact, Role, SessionId, ToolCallStatus, ToolPhase, TranscriptEntry};
pub use observability::init_observability;
pub use session::{
    CancelHandle, LiveStatus, NoopObserver, SessionOptions, StreamSession, TurnObserver,
    TurnOutcome, TurnPhase,
};
pub use transcript::{RefreshOutcome, Transcript, TranscriptReconciler};
