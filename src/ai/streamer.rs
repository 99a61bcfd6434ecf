use super::ndjson::{EventStream, open_event_stream};
use super::{ChatError, ChatResult};
use crate::config::KestrelConfig;
use crate::types::GenerationSettings;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotStatus {
    Streaming,
    Done,
    Failed,
}

/// Full reply text so far. Every snapshot repeats what came before it, so a
/// renderer can replace its output instead of appending deltas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub text: String,
    pub status: SnapshotStatus,
}

impl Snapshot {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, SnapshotStatus::Streaming)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateLine {
    response: Option<String>,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// Text accumulated over one generation.
#[derive(Debug, Default)]
pub(crate) struct Accumulator {
    text: String,
}

impl Accumulator {
    /// Queues the snapshots produced by `line`. Returns true once the
    /// generation is over.
    pub(crate) fn observe(&mut self, line: GenerateLine, out: &mut VecDeque<Snapshot>) -> bool {
        if let Some(error) = line.error {
            out.push_back(self.fail(&ChatError::Backend(error)));
            return true;
        }
        if let Some(fragment) = line.response
            && !fragment.is_empty()
        {
            self.text.push_str(&fragment);
            out.push_back(self.snapshot(SnapshotStatus::Streaming));
        }
        if line.done {
            out.push_back(self.snapshot(SnapshotStatus::Done));
            return true;
        }
        false
    }

    /// Terminal snapshot that keeps whatever already arrived.
    pub(crate) fn fail(&self, err: &ChatError) -> Snapshot {
        let text = if self.text.is_empty() {
            format!("❌ Error: {err}")
        } else {
            format!("{}\n\n❌ Error: {err}", self.text)
        };
        Snapshot {
            text,
            status: SnapshotStatus::Failed,
        }
    }

    fn snapshot(&self, status: SnapshotStatus) -> Snapshot {
        Snapshot {
            text: self.text.clone(),
            status,
        }
    }
}

enum Phase {
    Pending(BoxFuture<'static, ChatResult<EventStream<GenerateLine>>>),
    Streaming(EventStream<GenerateLine>),
    Closed,
}

struct GenerateState {
    phase: Phase,
    accumulator: Accumulator,
    queued: VecDeque<Snapshot>,
}

async fn advance(mut state: GenerateState) -> Option<(Snapshot, GenerateState)> {
    loop {
        if let Some(snapshot) = state.queued.pop_front() {
            return Some((snapshot, state));
        }
        match std::mem::replace(&mut state.phase, Phase::Closed) {
            Phase::Closed => return None,
            Phase::Pending(open) => match open.await {
                Ok(events) => state.phase = Phase::Streaming(events),
                Err(err) => {
                    warn!(error = %err, "generate request failed");
                    let failed = state.accumulator.fail(&err);
                    state.queued.push_back(failed);
                }
            },
            Phase::Streaming(mut events) => match events.next().await {
                Some(Ok(line)) => {
                    if !state.accumulator.observe(line, &mut state.queued) {
                        state.phase = Phase::Streaming(events);
                    }
                }
                Some(Err(err)) => {
                    warn!(error = %err, "generation interrupted");
                    let failed = state.accumulator.fail(&err);
                    state.queued.push_back(failed);
                }
                None => {
                    warn!("generation stream closed without a done event");
                    let failed = state.accumulator.fail(&ChatError::Truncated);
                    state.queued.push_back(failed);
                }
            },
        }
    }
}

fn snapshots(phase: Phase) -> BoxStream<'static, Snapshot> {
    let state = GenerateState {
        phase,
        accumulator: Accumulator::default(),
        queued: VecDeque::new(),
    };
    stream::unfold(state, advance).boxed()
}

#[cfg(test)]
pub(crate) fn snapshot_stream(events: EventStream<GenerateLine>) -> BoxStream<'static, Snapshot> {
    snapshots(Phase::Streaming(events))
}

/// Streams completions from `POST /api/generate`.
#[derive(Clone)]
pub struct CompletionStreamer {
    client: Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl CompletionStreamer {
    pub fn new(client: Client, config: &KestrelConfig) -> Self {
        Self {
            client,
            url: config.endpoint("/api/generate"),
            model: config.model.clone(),
            timeout: config.generate_timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Lazily generates a reply to `prompt`.
    ///
    /// Yields one `Streaming` snapshot per received fragment and ends with
    /// exactly one terminal snapshot: `Done` when the server says so, `Failed`
    /// otherwise. A failure never yields an error item; the error text is
    /// folded into the final snapshot instead.
    pub fn generate(&self, prompt: &str, settings: GenerationSettings) -> BoxStream<'static, Snapshot> {
        debug!(
            model = %self.model,
            prompt_chars = prompt.len(),
            temperature = settings.temperature(),
            num_predict = settings.max_output_tokens(),
            "starting generation"
        );
        let request = self.client.post(&self.url).json(&GenerateRequest {
            model: &self.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: settings.temperature(),
                num_predict: settings.max_output_tokens(),
            },
        });
        snapshots(Phase::Pending(open_event_stream(request, self.timeout)))
    }
}
