//! Local transcript of one session: speculative entries during a turn, the
//! authoritative sequence afterwards.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;
use crate::errors::ChatError;
use crate::model::{SessionId, TranscriptEntry};

/// Published view of the transcript.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    turn_in_progress: bool,
    epoch: u64,
}

impl Transcript {
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn turn_in_progress(&self) -> bool {
        self.turn_in_progress
    }

    /// Number of entries not yet confirmed by the backend.
    pub fn speculative_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_speculative()).count()
    }
}

/// Result of a background refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The fetched sequence replaced the local one.
    Applied,
    /// A turn was running (or started meanwhile); the fetch was ignored.
    Suppressed,
}

/// Sole owner of a session's in-memory transcript.
///
/// Readers get snapshots or a `watch::Receiver`; every mutation goes through
/// this type.
pub struct TranscriptReconciler {
    session: SessionId,
    backend: Arc<dyn ChatBackend>,
    state: watch::Sender<Transcript>,
}

impl TranscriptReconciler {
    pub fn new(session: SessionId, backend: Arc<dyn ChatBackend>) -> Self {
        let (state, _) = watch::channel(Transcript::default());
        Self {
            session,
            backend,
            state,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    pub(crate) fn backend(&self) -> Arc<dyn ChatBackend> {
        self.backend.clone()
    }

    /// Subscribes to transcript changes.
    pub fn subscribe(&self) -> watch::Receiver<Transcript> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Transcript {
        self.state.borrow().clone()
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.state.borrow().entries.clone()
    }

    pub fn turn_in_progress(&self) -> bool {
        self.state.borrow().turn_in_progress
    }

    /// Marks a turn as running; background refreshes are ignored until it ends.
    pub(crate) fn begin_turn(&self) {
        self.state.send_modify(|t| {
            t.turn_in_progress = true;
            t.epoch = t.epoch.wrapping_add(1);
        });
    }

    /// Ends a turn without refetching. Speculative entries stay.
    pub(crate) fn abandon_turn(&self) {
        self.state.send_if_modified(|t| {
            let was_running = t.turn_in_progress;
            t.turn_in_progress = false;
            was_running
        });
    }

    /// Appends a speculative entry unless one with the same id exists.
    ///
    /// Returns whether the entry was appended.
    pub fn append_speculative(&self, entry: TranscriptEntry) -> bool {
        let id = entry.id.clone();
        let appended = self.state.send_if_modified(move |t| {
            if t.entries.iter().any(|existing| existing.id == entry.id) {
                return false;
            }
            t.entries.push(entry);
            true
        });
        if !appended {
            debug!(session = %self.session, entry_id = %id, "speculative entry already present");
        }
        appended
    }

    /// Replaces the whole local sequence with the authoritative one and ends
    /// the turn.
    ///
    /// On fetch failure the speculative entries are kept, the turn is still
    /// ended, and the error is returned.
    pub async fn on_turn_end(&self) -> Result<usize, ChatError> {
        match self.backend.fetch_messages(&self.session).await {
            Ok(entries) => {
                let count = entries.len();
                self.state.send_modify(|t| {
                    t.entries = entries;
                    t.turn_in_progress = false;
                });
                info!(session = %self.session, entries = count, "transcript reconciled");
                Ok(count)
            }
            Err(err) => {
                self.abandon_turn();
                warn!(session = %self.session, error = %err, "transcript refetch failed; keeping speculative entries");
                Err(err.into())
            }
        }
    }

    /// Fetches the transcript outside of a turn and applies it.
    ///
    /// Suppressed while a turn runs, and also when a turn started while the
    /// fetch was in flight.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ChatError> {
        let epoch = {
            let current = self.state.borrow();
            if current.turn_in_progress {
                debug!(session = %self.session, "refresh suppressed during turn");
                return Ok(RefreshOutcome::Suppressed);
            }
            current.epoch
        };

        let entries = self.backend.fetch_messages(&self.session).await?;
        Ok(self.replace_if_idle(entries, Some(epoch)))
    }

    /// Applies an externally fetched transcript unless a turn is running.
    pub fn apply_background_refresh(&self, entries: Vec<TranscriptEntry>) -> RefreshOutcome {
        self.replace_if_idle(entries, None)
    }

    fn replace_if_idle(&self, entries: Vec<TranscriptEntry>, epoch: Option<u64>) -> RefreshOutcome {
        let applied = self.state.send_if_modified(move |t| {
            if t.turn_in_progress || epoch.is_some_and(|e| e != t.epoch) {
                return false;
            }
            t.entries = entries;
            true
        });
        if applied {
            RefreshOutcome::Applied
        } else {
            debug!(session = %self.session, "background refresh discarded");
            RefreshOutcome::Suppressed
        }
    }
}
