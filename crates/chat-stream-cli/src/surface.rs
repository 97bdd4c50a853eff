use std::io::Write as _;
use std::sync::Mutex;

use chat_stream_client::{ToolCallStatus, TranscriptEntry, TurnObserver, TurnOutcome};
use chat_stream_client::model::{Role, ToolPhase};

/// Renders a turn on the terminal.
///
/// Assistant text goes to stdout as it grows; tool activity, warnings and
/// errors go to stderr.
#[derive(Default)]
pub struct TerminalSurface {
    printed: Mutex<String>,
}

impl TerminalSurface {
    fn end_line(&self) {
        let mut printed = lock(&self.printed);
        if !printed.is_empty() {
            println!();
            printed.clear();
        }
    }
}

#[async_trait::async_trait]
impl TurnObserver for TerminalSurface {
    fn on_progress_text(&self, text: &str) {
        if text.is_empty() {
            self.end_line();
            return;
        }
        let mut printed = lock(&self.printed);
        let mut out = std::io::stdout().lock();
        match unprinted_suffix(&printed, text) {
            Some(suffix) => {
                let _ = out.write_all(suffix.as_bytes());
            }
            None => {
                let _ = write!(out, "\n{text}");
            }
        }
        let _ = out.flush();
        text.clone_into(&mut printed);
    }

    fn on_tool_status(&self, status: &ToolCallStatus) {
        self.end_line();
        eprintln!("[{}] {}", status.name, phase_label(status.phase));
    }

    fn on_message(&self, entry: &TranscriptEntry) {
        if entry.role == Role::Tool {
            eprintln!("[{}] {}", entry.tool_name.as_deref().unwrap_or("tool"), preview(&entry.content));
        }
    }

    fn on_error(&self, message: &str) {
        self.end_line();
        eprintln!("error: {message}");
    }

    fn on_warning(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn on_stopped(&self) {
        self.end_line();
        eprintln!("stopped");
    }

    async fn on_turn_complete(&self, _outcome: &TurnOutcome) {
        self.end_line();
    }
}

fn lock(m: &Mutex<String>) -> std::sync::MutexGuard<'_, String> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Part of `text` not yet on screen, or `None` when it no longer extends what
/// was printed.
pub fn unprinted_suffix<'a>(printed: &str, text: &'a str) -> Option<&'a str> {
    text.strip_prefix(printed)
}

pub fn phase_label(phase: ToolPhase) -> &'static str {
    match phase {
        ToolPhase::Calling => "calling",
        ToolPhase::Executing => "running",
        ToolPhase::Completed => "done",
        ToolPhase::Error => "failed",
    }
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::Human => "you",
        Role::Ai => "assistant",
        Role::Tool => "tool",
        Role::System => "system",
    }
}

const PREVIEW_CHARS: usize = 200;

/// First line of `content`, cut to a terminal-friendly length.
pub fn preview(content: &str) -> String {
    let line = content.lines().next().unwrap_or_default();
    let mut out: String = line.chars().take(PREVIEW_CHARS).collect();
    if line.chars().count() > PREVIEW_CHARS || content.lines().nth(1).is_some() {
        out.push_str(" ...");
    }
    out
}
