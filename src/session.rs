//! One conversation with the local model.
//!
//! A session owns its history and generation settings. Each submitted turn
//! re-checks the backend, renders the prompt from the messages before the
//! turn, and streams the reply back as a [`TurnStream`]. The stream borrows
//! the session mutably, so a second turn cannot start while one is running.

use crate::ai::{
    ChatError, ChatResult, InferenceBackend, OllamaBackend, ProgressEvent, Snapshot,
};
use crate::config::KestrelConfig;
use crate::context::build_prompt;
use crate::types::{BackendState, ChatMessage, ChatStats, GenerationSettings};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

const CANCELLED_REPLY: &str = "⚠️ Generation cancelled";

pub struct ChatSession {
    backend: Arc<dyn InferenceBackend>,
    history: Vec<ChatMessage>,
    settings: GenerationSettings,
    turn_limit: usize,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &KestrelConfig) -> Self {
        Self {
            backend,
            history: Vec::new(),
            settings: config.settings,
            turn_limit: config.turn_limit,
        }
    }

    /// Session against the Ollama server described by `config`.
    pub fn connect(config: &KestrelConfig) -> Self {
        Self::new(Arc::new(OllamaBackend::new(config)), config)
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn stats(&self) -> ChatStats {
        ChatStats::from_history(&self.history)
    }

    pub fn settings(&self) -> GenerationSettings {
        self.settings
    }

    /// Takes effect from the next turn. Clamped to `0.0..=2.0`.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.settings.set_temperature(temperature);
    }

    /// Takes effect from the next turn. Clamped to `100..=2000`.
    pub fn set_max_output_tokens(&mut self, max_output_tokens: u32) {
        self.settings.set_max_output_tokens(max_output_tokens);
    }

    pub fn reset(&mut self) {
        info!(cleared = self.history.len(), "chat history cleared");
        self.history.clear();
    }

    pub async fn backend_state(&self) -> BackendState {
        let state = self.backend.state().await;
        debug!(?state, model = self.model(), "backend state");
        state
    }

    /// Downloads the session's model.
    pub fn download_model(&self) -> BoxStream<'static, ChatResult<ProgressEvent>> {
        info!(model = self.model(), "requesting model download");
        self.backend.pull(self.model())
    }

    /// Starts a turn. Fails without touching history when the text is blank,
    /// the server is down or the model is missing.
    pub async fn submit(&mut self, text: &str) -> ChatResult<TurnStream<'_>> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyPrompt);
        }
        match self.backend_state().await {
            BackendState::Ready => {}
            BackendState::ModelMissing => {
                warn!(model = self.model(), "turn rejected, model not installed");
                return Err(ChatError::ModelAbsent(self.model().to_string()));
            }
            state => {
                warn!(?state, "turn rejected");
                return Err(ChatError::NotReady(state));
            }
        }

        let prompt = build_prompt(&self.history, text, self.turn_limit);
        self.history.push(ChatMessage::user(text));
        let snapshots = self.backend.generate(&prompt, self.settings);

        Ok(TurnStream {
            history: &mut self.history,
            snapshots,
            latest: String::new(),
            finished: false,
        })
    }

    /// Runs a whole turn, handing every snapshot to `on_snapshot`, and
    /// returns the reply that was stored.
    pub async fn send<F>(&mut self, text: &str, mut on_snapshot: F) -> ChatResult<String>
    where
        F: FnMut(&Snapshot),
    {
        let mut turn = self.submit(text).await?;
        while let Some(snapshot) = turn.next().await {
            on_snapshot(&snapshot);
        }
        Ok(turn.reply().to_string())
    }
}

/// Snapshots of one reply. The final text is stored as the assistant
/// message when the terminal snapshot arrives, or when the stream is dropped
/// early.
pub struct TurnStream<'a> {
    history: &'a mut Vec<ChatMessage>,
    snapshots: BoxStream<'static, Snapshot>,
    latest: String,
    finished: bool,
}

impl TurnStream<'_> {
    /// Latest text seen so far.
    pub fn reply(&self) -> &str {
        &self.latest
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self, content: String) {
        if !self.finished {
            self.finished = true;
            self.history.push(ChatMessage::assistant(content));
        }
    }
}

impl Stream for TurnStream<'_> {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.snapshots.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(snapshot)) => {
                this.latest.clone_from(&snapshot.text);
                if snapshot.is_terminal() {
                    let content = this.latest.clone();
                    this.finish(content);
                }
                Poll::Ready(Some(snapshot))
            }
            Poll::Ready(None) => {
                let content = this.latest.clone();
                this.finish(content);
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for TurnStream<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("turn dropped before the reply finished");
        let content = if self.latest.is_empty() {
            CANCELLED_REPLY.to_string()
        } else {
            std::mem::take(&mut self.latest)
        };
        self.finish(content);
    }
}
