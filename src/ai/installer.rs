use super::ndjson::{EventStream, open_event_stream};
use super::{ChatError, ChatResult};
use crate::config::KestrelConfig;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// One step of a model download, ready to display.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub message: String,
    /// Share of the current layer downloaded, when the server reports sizes.
    pub fraction: Option<f64>,
    /// Set on the last event of a successful download.
    pub finished: bool,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PullLine {
    status: Option<String>,
    completed: Option<f64>,
    total: Option<f64>,
    done: Option<bool>,
    error: Option<String>,
}

pub(crate) enum PullStep {
    Progress(ProgressEvent),
    Finished(ProgressEvent),
    Failed(ChatError),
}

/// Folds pull events into progress reports. The last status is remembered
/// because size-only events carry no text.
#[derive(Debug, Default)]
pub(crate) struct PullTracker {
    message: String,
}

impl PullTracker {
    pub(crate) fn observe(&mut self, line: PullLine) -> PullStep {
        if let Some(error) = line.error {
            return PullStep::Failed(ChatError::Backend(error));
        }
        if let Some(status) = line.status {
            self.message = status;
        }

        let completed = self.message == "success" || line.done == Some(true);
        if completed {
            return PullStep::Finished(ProgressEvent {
                message: self.message.clone(),
                fraction: Some(1.0),
                finished: true,
            });
        }

        let fraction = match (line.completed, line.total) {
            (Some(done), Some(total)) if total > 0.0 => Some((done / total).clamp(0.0, 1.0)),
            _ => None,
        };
        PullStep::Progress(ProgressEvent {
            message: self.message.clone(),
            fraction,
            finished: false,
        })
    }
}

enum Phase {
    Pending(BoxFuture<'static, ChatResult<EventStream<PullLine>>>),
    Streaming(EventStream<PullLine>, PullTracker),
    Closed,
}

struct PullState {
    model: String,
    phase: Phase,
}

async fn advance(mut state: PullState) -> Option<(ChatResult<ProgressEvent>, PullState)> {
    loop {
        match std::mem::replace(&mut state.phase, Phase::Closed) {
            Phase::Closed => return None,
            Phase::Pending(open) => match open.await {
                Ok(events) => {
                    info!(model = %state.model, "model download started");
                    state.phase = Phase::Streaming(events, PullTracker::default());
                }
                Err(err) => {
                    warn!(model = %state.model, error = %err, "model download request failed");
                    return Some((Err(err), state));
                }
            },
            Phase::Streaming(mut events, mut tracker) => match events.next().await {
                Some(Ok(line)) => match tracker.observe(line) {
                    PullStep::Progress(event) => {
                        state.phase = Phase::Streaming(events, tracker);
                        return Some((Ok(event), state));
                    }
                    PullStep::Finished(event) => {
                        info!(model = %state.model, "model download finished");
                        return Some((Ok(event), state));
                    }
                    PullStep::Failed(err) => {
                        warn!(model = %state.model, error = %err, "model download aborted");
                        return Some((Err(err), state));
                    }
                },
                Some(Err(err)) => {
                    warn!(model = %state.model, error = %err, "model download interrupted");
                    return Some((Err(err), state));
                }
                None => return Some((Err(ChatError::Truncated), state)),
            },
        }
    }
}

#[cfg(test)]
pub(crate) fn progress_stream(
    model: String,
    events: EventStream<PullLine>,
) -> BoxStream<'static, ChatResult<ProgressEvent>> {
    let state = PullState {
        model,
        phase: Phase::Streaming(events, PullTracker::default()),
    };
    stream::unfold(state, advance).boxed()
}

/// Downloads models through `POST /api/pull`.
#[derive(Clone)]
pub struct ModelInstaller {
    client: Client,
    url: String,
    timeout: Duration,
}

impl ModelInstaller {
    pub fn new(client: Client, config: &KestrelConfig) -> Self {
        Self {
            client,
            url: config.endpoint("/api/pull"),
            timeout: config.pull_timeout,
        }
    }

    /// Starts downloading `name`. The request is sent on first poll; the
    /// stream ends after the completion event or the first error, and
    /// dropping it closes the connection.
    pub fn pull(&self, name: &str) -> BoxStream<'static, ChatResult<ProgressEvent>> {
        let request = self
            .client
            .post(&self.url)
            .json(&PullRequest { name });
        let state = PullState {
            model: name.to_string(),
            phase: Phase::Pending(open_event_stream(request, self.timeout)),
        };
        stream::unfold(state, advance).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::ndjson::event_stream;
    use crate::ai::ndjson::tests::chunks;

    async fn run(parts: &[&str]) -> Vec<ChatResult<ProgressEvent>> {
        let events = event_stream(chunks(parts), Duration::from_secs(1));
        progress_stream("internlm2:1.8b".into(), events).collect().await
    }

    #[tokio::test]
    async fn reports_fraction_and_finishes_at_one() {
        let items = run(&[
            "{\"status\":\"pulling manifest\"}\n",
            "{\"status\":\"pulling 8934d96d3f08\",\"total\":200,\"completed\":50}\n",
            "{\"total\":200,\"completed\":200}\n",
            "{\"status\":\"success\"}\n",
            "{\"status\":\"ignored after success\"}\n",
        ])
        .await;

        let events: Vec<ProgressEvent> = items.into_iter().map(|i| i.unwrap()).collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].message, "pulling manifest");
        assert_eq!(events[0].fraction, None);
        assert_eq!(events[1].fraction, Some(0.25));
        assert_eq!(events[2].message, "pulling 8934d96d3f08");
        assert_eq!(events[2].fraction, Some(1.0));
        let last = events.last().unwrap();
        assert!(last.finished);
        assert_eq!(last.fraction, Some(1.0));
    }

    #[tokio::test]
    async fn zero_total_omits_fraction() {
        let items = run(&["{\"status\":\"verifying\",\"total\":0,\"completed\":0}\n"]).await;
        assert_eq!(items[0].as_ref().unwrap().fraction, None);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let items = run(&["{\"status\":\"pull", "ing\"}\n{oops\n", "{\"done\":true}\n"]).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().message, "pulling");
        assert!(items[1].as_ref().unwrap().finished);
    }

    #[tokio::test]
    async fn server_error_line_ends_with_failure() {
        let items = run(&[
            "{\"status\":\"pulling manifest\"}\n",
            "{\"error\":\"pull model manifest: file does not exist\"}\n",
        ])
        .await;
        assert_eq!(
            items.last().unwrap(),
            &Err(ChatError::Backend(
                "pull model manifest: file does not exist".into()
            ))
        );
    }

    #[tokio::test]
    async fn missing_completion_is_truncation() {
        let items = run(&["{\"status\":\"pulling manifest\"}\n"]).await;
        assert_eq!(items.last().unwrap(), &Err(ChatError::Truncated));
    }
}
