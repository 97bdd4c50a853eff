//! Common imports for typical client usage.
pub use crate::{
    CancelHandle, ChatBackend, ChatError, ClientConfig, HttpChatBackend, LiveStatus, NoopObserver,
    SessionId, SessionOptions, StreamSession, TextEndPolicy, ToolCallStatus, TranscriptEntry,
    TranscriptReconciler, TurnObserver, TurnOutcome,
};
