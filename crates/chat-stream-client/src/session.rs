//! One streaming turn at a time for one chat session.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::backend::ChatBackend;
use crate::errors::{ChatError, TransportError};
use crate::frame::FrameDecoder;
use crate::interpreter::{Effect, TextEndPolicy, TurnState};
use crate::model::{SessionId, ToolCallStatus, TranscriptEntry};
use crate::transcript::TranscriptReconciler;

/// Per-session behaviour options.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// Upper bound for a whole turn. Expiry cancels the turn and reports an
    /// error.
    pub turn_timeout: Option<Duration>,
    /// Handling of accumulated text at the end of a text run.
    pub text_end_policy: TextEndPolicy,
}

impl SessionOptions {
    pub fn turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    pub fn text_end_policy(mut self, policy: TextEndPolicy) -> Self {
        self.text_end_policy = policy;
        self
    }
}

/// Lifecycle phase of the current or last turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnPhase {
    #[default]
    Idle,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

/// Live, read-only view of a session for rendering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveStatus {
    pub generating: bool,
    /// Cumulative assistant text of the running text run.
    pub progress_text: String,
    pub active_tool: Option<ToolCallStatus>,
    pub phase: TurnPhase,
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream finished. `reconciled` is false when the transcript refetch
    /// failed and speculative entries were kept.
    Completed { reconciled: bool },
    /// Transport failure.
    Errored { message: String },
    /// Stopped by the caller.
    Cancelled,
    /// Stopped by the turn timeout.
    TimedOut,
}

impl TurnOutcome {
    pub fn phase(&self) -> TurnPhase {
        match self {
            Self::Completed { .. } => TurnPhase::Completed,
            Self::Errored { .. } => TurnPhase::Errored,
            Self::Cancelled | Self::TimedOut => TurnPhase::Cancelled,
        }
    }
}

/// Callbacks invoked from inside the read loop.
///
/// The synchronous methods run between two chunk reads and must not block.
/// `on_turn_complete` is awaited before the session accepts another turn.
#[async_trait::async_trait]
pub trait TurnObserver: Send + Sync {
    /// Cumulative text of the current run; empty when a run ends.
    fn on_progress_text(&self, _text: &str) {}
    fn on_tool_status(&self, _status: &ToolCallStatus) {}
    /// A speculative entry was appended to the transcript.
    fn on_message(&self, _entry: &TranscriptEntry) {}
    fn on_error(&self, _message: &str) {}
    /// Non-fatal problem, such as a failed transcript refetch.
    fn on_warning(&self, _message: &str) {}
    /// The turn was cancelled by the caller.
    fn on_stopped(&self) {}
    async fn on_turn_complete(&self, _outcome: &TurnOutcome) {}
}

/// Observer that ignores every callback.
pub struct NoopObserver;

#[async_trait::async_trait]
impl TurnObserver for NoopObserver {}

/// Handle used to cancel the running turn of a `StreamSession`.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation of the running turn.
    ///
    /// The read loop sees the request before any further chunk and ends the
    /// turn as `TurnOutcome::Cancelled`. Without a running turn this is a
    /// no-op.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Drives streaming turns of one session, at most one at a time.
pub struct StreamSession {
    session: SessionId,
    backend: Arc<dyn ChatBackend>,
    reconciler: Arc<TranscriptReconciler>,
    observer: Arc<dyn TurnObserver>,
    options: SessionOptions,
    status: watch::Sender<LiveStatus>,
    cancel: watch::Sender<bool>,
}

impl StreamSession {
    /// Creates a session bound to the reconciler's session and backend.
    pub fn new(reconciler: Arc<TranscriptReconciler>, observer: Arc<dyn TurnObserver>) -> Self {
        let (status, _) = watch::channel(LiveStatus::default());
        let (cancel, _) = watch::channel(false);
        Self {
            session: reconciler.session_id().clone(),
            backend: reconciler.backend(),
            reconciler,
            observer,
            options: SessionOptions::default(),
            status,
            cancel,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub fn reconciler(&self) -> &Arc<TranscriptReconciler> {
        &self.reconciler
    }

    pub fn status(&self) -> LiveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LiveStatus> {
        self.status.subscribe()
    }

    pub fn is_generating(&self) -> bool {
        self.status.borrow().generating
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel.clone(),
        }
    }

    /// Cancels the running turn, if any.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Runs one turn for `prompt` to a terminal state.
    ///
    /// Returns `ChatError::TurnInProgress` without side effects while another
    /// turn is generating. Failures during the turn are reported through the
    /// observer and the returned outcome.
    pub async fn start(&self, prompt: &str) -> Result<TurnOutcome, ChatError> {
        if prompt.trim().is_empty() {
            return Err(ChatError::validation("prompt must not be empty"));
        }
        let Some(_turn) = TurnGuard::acquire(&self.status, &self.cancel, &self.reconciler) else {
            debug!(session = %self.session, "start rejected while generating");
            return Err(ChatError::TurnInProgress {
                session: self.session.clone(),
            });
        };

        let mut cancel_rx = self.cancel.subscribe();
        let turn = TurnState::new(self.options.text_end_policy);
        let span = info_span!("turn", session = %self.session, turn_id = %turn.turn_id());
        Ok(self.drive(prompt, turn, &mut cancel_rx).instrument(span).await)
    }

    async fn drive(
        &self,
        prompt: &str,
        mut turn: TurnState,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> TurnOutcome {
        let deadline = self.options.turn_timeout.map(|t| Instant::now() + t);
        info!(prompt_len = prompt.len(), "turn started");

        let opened = tokio::select! {
            biased;
            () = cancel_requested(cancel_rx) => return self.finish_cancelled(),
            () = deadline_reached(deadline) => return self.finish_timed_out(),
            opened = self.backend.open_turn(&self.session, prompt) => opened,
        };
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(err) => return self.finish_errored(&err),
        };

        let mut decoder = FrameDecoder::default();
        loop {
            let next = tokio::select! {
                biased;
                () = cancel_requested(cancel_rx) => return self.finish_cancelled(),
                () = deadline_reached(deadline) => return self.finish_timed_out(),
                next = chunks.next() => next,
            };
            let (events, closed) = match next {
                Some(Ok(chunk)) => (decoder.decode_chunk(&chunk), false),
                Some(Err(err)) => return self.finish_errored(&err),
                None => (decoder.finish_events(), true),
            };

            for event in events {
                debug!(event = event.kind(), "stream event");
                for effect in turn.apply(event) {
                    self.apply_effect(effect);
                }
                if turn.is_done() {
                    break;
                }
            }
            if turn.is_done() {
                break;
            }
            if closed {
                debug!("stream closed without done sentinel");
                break;
            }
        }
        drop(chunks);

        self.finish_completed().await
    }

    fn apply_effect(&self, effect: Effect) {
        match effect {
            Effect::Progress(text) => {
                self.status.send_modify(|s| s.progress_text.clone_from(&text));
                self.observer.on_progress_text(&text);
            }
            Effect::ClearProgress => {
                self.status.send_modify(|s| s.progress_text.clear());
                self.observer.on_progress_text("");
            }
            Effect::ToolStatus(status) => {
                debug!(call_id = %status.call_id, tool = %status.name, phase = ?status.phase, "tool status");
                self.status
                    .send_modify(|s| s.active_tool = Some(status.clone()));
                self.observer.on_tool_status(&status);
            }
            Effect::AppendEntry(entry) => {
                if self.reconciler.append_speculative(entry.clone()) {
                    self.observer.on_message(&entry);
                }
            }
            Effect::Error(message) => {
                warn!(error = %message, "stream reported an error");
                self.observer.on_error(&message);
            }
            // The read loop stops on `TurnState::is_done`.
            Effect::Reconcile => {}
        }
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.status.send_modify(|s| s.phase = phase);
    }

    /// Drops progress text that the reconciled transcript now carries.
    fn clear_progress(&self) {
        let cleared = self.status.send_if_modified(|s| {
            let had_text = !s.progress_text.is_empty();
            s.progress_text.clear();
            had_text
        });
        if cleared {
            self.observer.on_progress_text("");
        }
    }

    fn finish_cancelled(&self) -> TurnOutcome {
        info!("turn cancelled");
        self.set_phase(TurnPhase::Cancelled);
        self.observer.on_stopped();
        TurnOutcome::Cancelled
    }

    fn finish_timed_out(&self) -> TurnOutcome {
        let timeout = self.options.turn_timeout.unwrap_or_default();
        let message = format!("turn timed out after {}s", timeout.as_secs_f32());
        warn!(timeout = ?timeout, "turn timed out");
        self.set_phase(TurnPhase::Cancelled);
        self.observer.on_error(&message);
        TurnOutcome::TimedOut
    }

    fn finish_errored(&self, err: &TransportError) -> TurnOutcome {
        let message = err.to_string();
        warn!(error = %message, "turn failed");
        self.set_phase(TurnPhase::Errored);
        self.observer.on_error(&message);
        TurnOutcome::Errored { message }
    }

    async fn finish_completed(&self) -> TurnOutcome {
        let reconciled = match self.reconciler.on_turn_end().await {
            Ok(_) => {
                self.clear_progress();
                true
            }
            Err(err) => {
                self.observer
                    .on_warning(&format!("could not refresh the transcript: {err}"));
                false
            }
        };
        self.set_phase(TurnPhase::Completed);
        let outcome = TurnOutcome::Completed { reconciled };
        self.observer.on_turn_complete(&outcome).await;
        info!(reconciled, "turn completed");
        outcome
    }
}

/// Holds the generating flag for the duration of one turn.
///
/// Dropping it, on any path including a dropped `start` future, clears the
/// flag and the active tool and closes the reconciler's turn.
struct TurnGuard<'a> {
    status: &'a watch::Sender<LiveStatus>,
    reconciler: &'a TranscriptReconciler,
}

impl<'a> TurnGuard<'a> {
    /// Publishes `generating` for a new turn, or returns `None` while one
    /// runs. A stale cancel request is cleared before the flag becomes
    /// visible, so a cancel issued once `generating` is observed applies to
    /// this turn.
    fn acquire(
        status: &'a watch::Sender<LiveStatus>,
        cancel: &watch::Sender<bool>,
        reconciler: &'a TranscriptReconciler,
    ) -> Option<Self> {
        let acquired = status.send_if_modified(|s| {
            if s.generating {
                return false;
            }
            cancel.send_replace(false);
            *s = LiveStatus {
                generating: true,
                phase: TurnPhase::Streaming,
                ..LiveStatus::default()
            };
            true
        });
        if !acquired {
            return None;
        }
        reconciler.begin_turn();
        Some(Self { status, reconciler })
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.status.send_modify(|s| {
            s.generating = false;
            s.active_tool = None;
            if s.phase == TurnPhase::Streaming {
                s.phase = TurnPhase::Cancelled;
            }
        });
        self.reconciler.abandon_turn();
    }
}

async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
