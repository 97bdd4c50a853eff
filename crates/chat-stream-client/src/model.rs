use std::fmt;

use chrono::{DateTime, Utc};

/// Prefix carried by every locally generated (speculative) transcript id.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Server-side identifier of a chat session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the session id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Author of a transcript entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Human,
    #[serde(alias = "assistant")]
    Ai,
    Tool,
    System,
}

/// Rendering payload attached to a tool result.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Artifact {
    /// Tabular query result.
    Table {
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<serde_json::Value>>,
    },
    /// Chart specification, passed through untouched to the renderer.
    Chart { spec: serde_json::Value },
    /// Tool-level failure shown inline.
    Error { message: String },
    /// Reference to a file produced or uploaded by the tool.
    File {
        #[serde(alias = "fileId")]
        file_id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl Artifact {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Progress of a single tool invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPhase {
    Calling,
    Executing,
    Completed,
    Error,
}

/// Transient status of the tool call currently shown to the user.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallStatus {
    pub call_id: String,
    pub name: String,
    pub phase: ToolPhase,
}

impl ToolCallStatus {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, phase: ToolPhase) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            phase,
        }
    }
}

/// One item of a session transcript.
///
/// Entries fetched from the backend carry server ids; entries built while a
/// turn streams carry ids starting with [`TEMP_ID_PREFIX`].
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TranscriptEntry {
    pub id: String,
    #[serde(default, alias = "turnSeq", skip_serializing_if = "Option::is_none")]
    pub turn_seq: Option<u64>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, alias = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl TranscriptEntry {
    /// Builds the speculative entry for a tool result.
    pub fn speculative_tool(
        call_id: &str,
        tool_name: impl Into<String>,
        content: impl Into<String>,
        artifact: Option<Artifact>,
    ) -> Self {
        Self {
            id: temporary_tool_entry_id(call_id),
            turn_seq: None,
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(call_id.to_string()),
            tool_name: Some(tool_name.into()),
            artifact,
            created_at: Utc::now(),
        }
    }

    /// Builds a speculative assistant-text entry.
    pub fn speculative_text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turn_seq: None,
            role: Role::Ai,
            content: content.into(),
            tool_call_id: None,
            tool_name: None,
            artifact: None,
            created_at: Utc::now(),
        }
    }

    /// True for entries that were created locally and not yet confirmed by
    /// the backend.
    pub fn is_speculative(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// Temporary id of the transcript entry for tool call `call_id`.
///
/// Deterministic, so the same tool result always maps to the same entry.
pub fn temporary_tool_entry_id(call_id: &str) -> String {
    format!("{TEMP_ID_PREFIX}tool-{call_id}")
}
