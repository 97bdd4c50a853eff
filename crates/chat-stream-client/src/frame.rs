//! Line framing and frame decoding for the turn stream.
//!
//! The stream is a sequence of `\n`-terminated lines. Only lines of the form
//! `data: <payload>` matter; `<payload>` is either the `[DONE]` sentinel or a
//! JSON object with a `type` discriminant.

use tracing::{debug, warn};

use crate::event::DomainEvent;
use crate::model::Artifact;

/// Prefix of every frame line that carries a payload.
pub const DATA_PREFIX: &str = "data:";
/// Payload that terminates a turn stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Splits byte chunks into complete lines.
///
/// Unterminated bytes are carried over to the next chunk. Buffering happens
/// on raw bytes, so a UTF-8 sequence split across two reads is decoded only
/// once the whole line has arrived.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Appends a chunk and returns every line it completed, in order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(idx) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=idx).collect();
            lines.push(line_to_string(&line[..idx]));
        }
        lines
    }

    /// Flushes the unterminated tail at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buf);
        Some(line_to_string(&tail))
    }

    /// `push_chunk` followed by [`decode_line`] on each completed line.
    pub fn decode_chunk(&mut self, chunk: &[u8]) -> Vec<DomainEvent> {
        self.push_chunk(chunk)
            .iter()
            .filter_map(|line| decode_line(line))
            .collect()
    }

    /// `finish` followed by [`decode_line`].
    pub fn finish_events(&mut self) -> Vec<DomainEvent> {
        self.finish()
            .and_then(|line| decode_line(&line))
            .into_iter()
            .collect()
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

fn line_to_string(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_end_matches('\r').to_string()
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WireEvent {
    TextDelta {
        #[serde(alias = "text")]
        delta: String,
    },
    TextEnd,
    #[serde(alias = "tool-call-start")]
    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", default)]
        tool_name: String,
    },
    #[serde(alias = "tool-call-executing")]
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", default)]
        tool_name: String,
    },
    #[serde(alias = "tool-result")]
    ToolOutputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName", default)]
        tool_name: String,
        #[serde(default)]
        output: serde_json::Value,
        #[serde(default)]
        artifact: Option<serde_json::Value>,
    },
    Error {
        #[serde(rename = "errorText", alias = "message", default)]
        error_text: String,
    },
    #[serde(other)]
    Unrecognized,
}

/// Decodes one line into a domain event.
///
/// Returns `None` for lines that carry nothing for the client: blank lines,
/// comments, non-`data` fields, unknown event types, and malformed JSON. The
/// last case is logged and dropped so a single bad frame cannot end a turn.
pub fn decode_line(line: &str) -> Option<DomainEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();
    if payload.is_empty() {
        return None;
    }
    if payload.trim_end() == DONE_SENTINEL {
        return Some(DomainEvent::StreamDone);
    }

    let wire: WireEvent = match serde_json::from_str(payload) {
        Ok(wire) => wire,
        Err(err) => {
            warn!(error = %err, frame_len = payload.len(), "dropping malformed stream frame");
            return None;
        }
    };

    match wire {
        WireEvent::TextDelta { delta } => Some(DomainEvent::TextDelta { text: delta }),
        WireEvent::TextEnd => Some(DomainEvent::TextEnd),
        WireEvent::ToolInputStart {
            tool_call_id,
            tool_name,
        } => Some(DomainEvent::ToolStart {
            call_id: tool_call_id,
            name: tool_name,
        }),
        WireEvent::ToolInputAvailable {
            tool_call_id,
            tool_name,
        } => Some(DomainEvent::ToolExecuting {
            call_id: tool_call_id,
            name: tool_name,
        }),
        WireEvent::ToolOutputAvailable {
            tool_call_id,
            tool_name,
            output,
            artifact,
        } => Some(DomainEvent::ToolResult {
            artifact: artifact.and_then(|raw| decode_artifact(&tool_call_id, raw)),
            call_id: tool_call_id,
            name: tool_name,
            output,
        }),
        WireEvent::Error { error_text } => Some(DomainEvent::StreamError {
            message: if error_text.is_empty() {
                "stream reported an error".to_string()
            } else {
                error_text
            },
        }),
        WireEvent::Unrecognized => {
            debug!(frame_len = payload.len(), "ignoring unrecognized stream event type");
            None
        }
    }
}

fn decode_artifact(call_id: &str, raw: serde_json::Value) -> Option<Artifact> {
    if raw.is_null() {
        return None;
    }
    match serde_json::from_value(raw) {
        Ok(artifact) => Some(artifact),
        Err(err) => {
            warn!(call_id, error = %err, "dropping undecodable tool artifact");
            None
        }
    }
}
