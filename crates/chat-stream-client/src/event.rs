use crate::model::Artifact;

/// Typed events decoded from the turn stream.
#[derive(Clone, Debug, PartialEq)]
pub enum DomainEvent {
    /// Incremental fragment of assistant text.
    TextDelta { text: String },
    /// End of the current text run.
    TextEnd,
    /// A tool invocation was requested.
    ToolStart { call_id: String, name: String },
    /// The tool began running.
    ToolExecuting { call_id: String, name: String },
    /// A tool finished. May be re-delivered with the same `call_id`.
    ToolResult {
        call_id: String,
        name: String,
        output: serde_json::Value,
        artifact: Option<Artifact>,
    },
    /// The server reported a failure mid-stream. Not terminal by itself.
    StreamError { message: String },
    /// Sentinel terminator.
    StreamDone,
}

impl DomainEvent {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::TextEnd => "text_end",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolExecuting { .. } => "tool_executing",
            Self::ToolResult { .. } => "tool_result",
            Self::StreamError { .. } => "stream_error",
            Self::StreamDone => "stream_done",
        }
    }
}
