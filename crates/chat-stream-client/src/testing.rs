//! Scripted backend and recording observer shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::stream;
use tokio::sync::{Notify, mpsc, watch};

use crate::backend::{ChatBackend, ChunkStream};
use crate::errors::TransportError;
use crate::model::{Role, SessionId, ToolCallStatus, TranscriptEntry};
use crate::session::{LiveStatus, TurnObserver, TurnOutcome};

pub(crate) type ChunkSender = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

pub(crate) enum TurnScript {
    /// Pre-recorded chunks, then a clean close.
    Chunks(Vec<Result<Bytes, TransportError>>),
    /// Chunks fed by the test; the stream closes when the sender drops.
    Channel(mpsc::UnboundedReceiver<Result<Bytes, TransportError>>),
    /// `open_turn` fails.
    Fail(TransportError),
    /// Opens, then never yields.
    Pending,
}

impl TurnScript {
    /// One chunk per line, each terminated by `\n`.
    pub(crate) fn lines(lines: &[&str]) -> Self {
        Self::Chunks(
            lines
                .iter()
                .map(|line| Ok(Bytes::from(format!("{line}\n"))))
                .collect(),
        )
    }

    pub(crate) fn channel() -> (Self, ChunkSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::Channel(rx), tx)
    }
}

pub(crate) fn chunk(text: &str) -> Result<Bytes, TransportError> {
    Ok(Bytes::from(text.to_string()))
}

pub(crate) fn server_entry(id: &str, role: Role, content: &str) -> TranscriptEntry {
    TranscriptEntry {
        id: id.to_string(),
        turn_seq: Some(1),
        role,
        content: content.to_string(),
        tool_call_id: None,
        tool_name: None,
        artifact: None,
        created_at: chrono::Utc::now(),
    }
}

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    turns: Mutex<VecDeque<TurnScript>>,
    messages: Vec<TranscriptEntry>,
    message_batches: Mutex<VecDeque<Vec<TranscriptEntry>>>,
    fetch_error: Option<TransportError>,
    fetch_gate: Option<Arc<Notify>>,
    status_probe: Mutex<Option<watch::Receiver<LiveStatus>>>,
    pub(crate) generating_during_fetch: Mutex<Vec<bool>>,
    pub(crate) prompts: Mutex<Vec<String>>,
    pub(crate) open_calls: AtomicUsize,
    pub(crate) fetch_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn with_turn(self, script: TurnScript) -> Self {
        self.turns.lock().unwrap().push_back(script);
        self
    }

    pub(crate) fn with_messages(mut self, messages: Vec<TranscriptEntry>) -> Self {
        self.messages = messages;
        self
    }

    /// One transcript per fetch, in call order; `with_messages` serves the rest.
    pub(crate) fn with_message_batches(self, batches: Vec<Vec<TranscriptEntry>>) -> Self {
        self.message_batches.lock().unwrap().extend(batches);
        self
    }

    pub(crate) fn with_fetch_error(mut self, err: TransportError) -> Self {
        self.fetch_error = Some(err);
        self
    }

    /// Makes the first `fetch_messages` call wait until `open_fetch_gate` is
    /// called. Its response is chosen when the call starts.
    pub(crate) fn with_fetch_gate(mut self) -> Self {
        self.fetch_gate = Some(Arc::new(Notify::new()));
        self
    }

    pub(crate) fn open_fetch_gate(&self) {
        if let Some(gate) = &self.fetch_gate {
            gate.notify_one();
        }
    }

    /// Records the session's `generating` flag whenever a fetch happens.
    pub(crate) fn probe_status(&self, rx: watch::Receiver<LiveStatus>) {
        *self.status_probe.lock().unwrap() = Some(rx);
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn open_turn(
        &self,
        _session: &SessionId,
        prompt: &str,
    ) -> Result<ChunkStream, TransportError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let script = self.turns.lock().unwrap().pop_front();
        match script {
            Some(TurnScript::Chunks(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(TurnScript::Channel(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            }))),
            Some(TurnScript::Fail(err)) => Err(err),
            Some(TurnScript::Pending) => Ok(Box::pin(stream::pending::<Result<Bytes, TransportError>>())),
            None => Err(TransportError::network("no scripted turn left")),
        }
    }

    async fn fetch_messages(
        &self,
        _session: &SessionId,
    ) -> Result<Vec<TranscriptEntry>, TransportError> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let batch = self.message_batches.lock().unwrap().pop_front();
        if call == 0
            && let Some(gate) = &self.fetch_gate
        {
            gate.notified().await;
        }
        let generating = self
            .status_probe
            .lock()
            .unwrap()
            .as_ref()
            .map(|rx| rx.borrow().generating);
        if let Some(generating) = generating {
            self.generating_during_fetch.lock().unwrap().push(generating);
        }
        match &self.fetch_error {
            Some(err) => Err(err.clone()),
            None => Ok(batch.unwrap_or_else(|| self.messages.clone())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Observed {
    Progress(String),
    Tool(ToolCallStatus),
    Message(String),
    Error(String),
    Warning(String),
    Stopped,
    Complete(TurnOutcome),
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: Mutex<Vec<Observed>>,
}

impl RecordingObserver {
    pub(crate) fn events(&self) -> Vec<Observed> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn progress(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Progress(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Message(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Observed::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Observed) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl TurnObserver for RecordingObserver {
    fn on_progress_text(&self, text: &str) {
        self.push(Observed::Progress(text.to_string()));
    }

    fn on_tool_status(&self, status: &ToolCallStatus) {
        self.push(Observed::Tool(status.clone()));
    }

    fn on_message(&self, entry: &TranscriptEntry) {
        self.push(Observed::Message(entry.id.clone()));
    }

    fn on_error(&self, message: &str) {
        self.push(Observed::Error(message.to_string()));
    }

    fn on_warning(&self, message: &str) {
        self.push(Observed::Warning(message.to_string()));
    }

    fn on_stopped(&self) {
        self.push(Observed::Stopped);
    }

    async fn on_turn_complete(&self, outcome: &TurnOutcome) {
        self.push(Observed::Complete(outcome.clone()));
    }
}
