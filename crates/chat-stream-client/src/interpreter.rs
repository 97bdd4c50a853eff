//! Folds domain events into per-turn state and the effects a caller applies.
//!
//! Nothing here performs I/O or calls back into the UI: `TurnState::apply`
//! only returns effects, in the order they must be applied.

use std::collections::HashSet;

use tracing::debug;

use crate::event::DomainEvent;
use crate::model::{TEMP_ID_PREFIX, ToolCallStatus, ToolPhase, TranscriptEntry};

/// What to do with accumulated assistant text when a text run ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEndPolicy {
    /// Drop it; the durable assistant message arrives with the post-turn
    /// refetch.
    #[default]
    Discard,
    /// Append a speculative assistant entry with the accumulated text.
    Synthesize,
}

/// Externally observable consequence of one event.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Cumulative assistant text of the current run.
    Progress(String),
    /// The current text run ended; progress text resets to empty.
    ClearProgress,
    /// Tool status changed.
    ToolStatus(ToolCallStatus),
    /// Append a speculative entry to the transcript.
    AppendEntry(TranscriptEntry),
    /// Server-reported error to surface.
    Error(String),
    /// Stream finished; reconcile with the authoritative transcript.
    Reconcile,
}

/// Mutable state of one turn. Never shared across turns.
#[derive(Debug)]
pub struct TurnState {
    turn_id: uuid::Uuid,
    policy: TextEndPolicy,
    accumulated_text: String,
    active_tool_call: Option<ToolCallStatus>,
    emitted_tool_call_ids: HashSet<String>,
    next_temp_seq: u64,
    done: bool,
}

impl TurnState {
    pub fn new(policy: TextEndPolicy) -> Self {
        Self {
            turn_id: uuid::Uuid::new_v4(),
            policy,
            accumulated_text: String::new(),
            active_tool_call: None,
            emitted_tool_call_ids: HashSet::new(),
            next_temp_seq: 0,
            done: false,
        }
    }

    pub fn turn_id(&self) -> uuid::Uuid {
        self.turn_id
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated_text
    }

    pub fn active_tool_call(&self) -> Option<&ToolCallStatus> {
        self.active_tool_call.as_ref()
    }

    /// True once `StreamDone` has been applied.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn has_emitted(&self, call_id: &str) -> bool {
        self.emitted_tool_call_ids.contains(call_id)
    }

    /// Applies one event and returns the resulting effects in order.
    pub fn apply(&mut self, event: DomainEvent) -> Vec<Effect> {
        match event {
            DomainEvent::TextDelta { text } => {
                if text.is_empty() {
                    return Vec::new();
                }
                self.accumulated_text.push_str(&text);
                vec![Effect::Progress(self.accumulated_text.clone())]
            }
            DomainEvent::TextEnd => {
                let text = std::mem::take(&mut self.accumulated_text);
                let mut effects = Vec::with_capacity(2);
                if self.policy == TextEndPolicy::Synthesize && !text.is_empty() {
                    let id = self.next_temp_id("ai");
                    effects.push(Effect::AppendEntry(TranscriptEntry::speculative_text(
                        id, text,
                    )));
                }
                effects.push(Effect::ClearProgress);
                effects
            }
            DomainEvent::ToolStart { call_id, name } => {
                self.set_tool_status(ToolCallStatus::new(call_id, name, ToolPhase::Calling))
            }
            DomainEvent::ToolExecuting { call_id, name } => {
                self.set_tool_status(ToolCallStatus::new(call_id, name, ToolPhase::Executing))
            }
            DomainEvent::ToolResult {
                call_id,
                name,
                output,
                artifact,
            } => {
                let name = if name.is_empty() {
                    self.active_tool_call
                        .as_ref()
                        .filter(|active| active.call_id == call_id)
                        .map(|active| active.name.clone())
                        .unwrap_or_default()
                } else {
                    name
                };
                let phase = if artifact.as_ref().is_some_and(|a| a.is_error()) {
                    ToolPhase::Error
                } else {
                    ToolPhase::Completed
                };

                let mut effects = Vec::with_capacity(2);
                if self.emitted_tool_call_ids.insert(call_id.clone()) {
                    let content = match &output {
                        serde_json::Value::String(text) => text.clone(),
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    effects.push(Effect::AppendEntry(TranscriptEntry::speculative_tool(
                        &call_id,
                        name.clone(),
                        content,
                        artifact,
                    )));
                } else {
                    debug!(turn_id = %self.turn_id, call_id = %call_id, "duplicate tool result suppressed");
                }
                effects.extend(self.set_tool_status(ToolCallStatus::new(call_id, name, phase)));
                effects
            }
            DomainEvent::StreamError { message } => vec![Effect::Error(message)],
            DomainEvent::StreamDone => {
                self.done = true;
                vec![Effect::Reconcile]
            }
        }
    }

    fn set_tool_status(&mut self, status: ToolCallStatus) -> Vec<Effect> {
        self.active_tool_call = Some(status.clone());
        vec![Effect::ToolStatus(status)]
    }

    fn next_temp_id(&mut self, kind: &str) -> String {
        let seq = self.next_temp_seq;
        self.next_temp_seq += 1;
        format!("{TEMP_ID_PREFIX}{kind}-{}-{seq}", self.turn_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Artifact, Role};

    fn delta(text: &str) -> DomainEvent {
        DomainEvent::TextDelta { text: text.into() }
    }

    fn tool_result(call_id: &str) -> DomainEvent {
        DomainEvent::ToolResult {
            call_id: call_id.into(),
            name: "run_sql".into(),
            output: serde_json::json!({"rows": 2}),
            artifact: None,
        }
    }

    fn run(state: &mut TurnState, events: Vec<DomainEvent>) -> Vec<Effect> {
        events.into_iter().flat_map(|e| state.apply(e)).collect()
    }

    #[test]
    fn text_deltas_emit_cumulative_progress_then_clear() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        let effects = run(
            &mut state,
            vec![delta("Hel"), delta("lo"), DomainEvent::TextEnd, DomainEvent::StreamDone],
        );
        assert_eq!(
            effects,
            vec![
                Effect::Progress("Hel".into()),
                Effect::Progress("Hello".into()),
                Effect::ClearProgress,
                Effect::Reconcile,
            ]
        );
        assert_eq!(state.accumulated_text(), "");
        assert!(state.is_done());
    }

    #[test]
    fn empty_delta_has_no_effect() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        assert!(state.apply(delta("")).is_empty());
    }

    #[test]
    fn duplicate_tool_result_appends_once_but_still_updates_status() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        let first = state.apply(tool_result("abc"));
        let second = state.apply(tool_result("abc"));

        let appends = |effects: &[Effect]| {
            effects
                .iter()
                .filter(|e| matches!(e, Effect::AppendEntry(_)))
                .count()
        };
        assert_eq!(appends(&first), 1);
        assert_eq!(appends(&second), 0);
        assert!(matches!(
            second.as_slice(),
            [Effect::ToolStatus(ToolCallStatus { phase: ToolPhase::Completed, .. })]
        ));
        assert!(state.has_emitted("abc"));
    }

    #[test]
    fn tool_lifecycle_moves_through_phases() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        let effects = run(
            &mut state,
            vec![
                DomainEvent::ToolStart {
                    call_id: "c1".into(),
                    name: "chart".into(),
                },
                DomainEvent::ToolExecuting {
                    call_id: "c1".into(),
                    name: "chart".into(),
                },
                DomainEvent::ToolResult {
                    call_id: "c1".into(),
                    name: String::new(),
                    output: serde_json::Value::String("rendered".into()),
                    artifact: None,
                },
            ],
        );
        let phases: Vec<ToolPhase> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::ToolStatus(s) => Some(s.phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![ToolPhase::Calling, ToolPhase::Executing, ToolPhase::Completed]
        );

        let entry = effects
            .iter()
            .find_map(|e| match e {
                Effect::AppendEntry(entry) => Some(entry),
                _ => None,
            })
            .expect("tool entry");
        assert_eq!(entry.tool_name.as_deref(), Some("chart"));
        assert_eq!(entry.content, "rendered");
        assert_eq!(entry.id, "tmp-tool-c1");
        assert_eq!(
            state.active_tool_call().map(|s| s.phase),
            Some(ToolPhase::Completed)
        );
    }

    #[test]
    fn tool_result_without_start_is_applied() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        let effects = state.apply(tool_result("orphan"));
        assert!(matches!(
            effects.as_slice(),
            [Effect::AppendEntry(entry), Effect::ToolStatus(_)] if entry.tool_call_id.as_deref() == Some("orphan")
        ));
    }

    #[test]
    fn error_artifact_marks_tool_as_failed() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        let effects = state.apply(DomainEvent::ToolResult {
            call_id: "c9".into(),
            name: "python".into(),
            output: serde_json::Value::Null,
            artifact: Some(Artifact::Error {
                message: "NameError".into(),
            }),
        });
        assert!(matches!(
            effects.last(),
            Some(Effect::ToolStatus(ToolCallStatus { phase: ToolPhase::Error, .. }))
        ));
    }

    #[test]
    fn effects_follow_input_order() {
        let mut state = TurnState::new(TextEndPolicy::Discard);
        let effects = run(
            &mut state,
            vec![
                delta("a"),
                DomainEvent::StreamError {
                    message: "tool failed".into(),
                },
                tool_result("t1"),
                delta("b"),
            ],
        );
        let kinds: Vec<&str> = effects
            .iter()
            .map(|e| match e {
                Effect::Progress(_) => "progress",
                Effect::ClearProgress => "clear",
                Effect::ToolStatus(_) => "status",
                Effect::AppendEntry(_) => "append",
                Effect::Error(_) => "error",
                Effect::Reconcile => "reconcile",
            })
            .collect();
        assert_eq!(kinds, vec!["progress", "error", "append", "status", "progress"]);
        assert_eq!(effects.last(), Some(&Effect::Progress("ab".into())));
    }

    #[test]
    fn synthesize_policy_appends_ai_entry_with_turn_scoped_ids() {
        let mut state = TurnState::new(TextEndPolicy::Synthesize);
        let effects = run(
            &mut state,
            vec![delta("first"), DomainEvent::TextEnd, delta("second"), DomainEvent::TextEnd],
        );
        let ids: Vec<String> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::AppendEntry(entry) => {
                    assert_eq!(entry.role, Role::Ai);
                    Some(entry.id.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(ids.iter().all(|id| id.contains(&state.turn_id().to_string())));

        let other_turn = TurnState::new(TextEndPolicy::Synthesize);
        assert_ne!(other_turn.turn_id(), state.turn_id());
    }

    #[test]
    fn synthesize_policy_skips_empty_runs() {
        let mut state = TurnState::new(TextEndPolicy::Synthesize);
        assert_eq!(state.apply(DomainEvent::TextEnd), vec![Effect::ClearProgress]);
    }
}
