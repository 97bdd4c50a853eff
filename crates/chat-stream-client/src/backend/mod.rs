//! Transport seam between the streaming client and the chat backend.
//!
//! A turn stream is a cancellable byte-chunk producer: a boxed
//! `futures::Stream` of `Bytes`. Dropping it releases the connection.
mod config;
mod http;

use std::pin::Pin;

pub use config::ClientConfig;
pub use http::HttpChatBackend;

use crate::errors::TransportError;
use crate::model::{SessionId, TranscriptEntry};

/// Raw body chunks of one turn stream, in arrival order.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Backend operations the streaming client depends on.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Opens the event stream for one turn carrying `prompt`.
    ///
    /// Errors returned here (connection failure, non-success status) happen
    /// before any frame was received.
    async fn open_turn(&self, session: &SessionId, prompt: &str)
    -> Result<ChunkStream, TransportError>;

    /// Fetches the authoritative, ordered transcript of `session`.
    async fn fetch_messages(&self, session: &SessionId)
    -> Result<Vec<TranscriptEntry>, TransportError>;
}
