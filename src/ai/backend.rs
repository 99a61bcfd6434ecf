use super::{BackendProbe, ChatResult, CompletionStreamer, ModelInstaller, ProgressEvent, Snapshot};
use crate::config::KestrelConfig;
use crate::types::{BackendState, GenerationSettings};
use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::Client;

/// What a chat session needs from an inference server.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Model used for generation.
    fn model(&self) -> &str;

    async fn is_reachable(&self) -> bool;

    async fn has_model(&self, name: &str) -> bool;

    /// Recomputed from scratch on every call.
    async fn state(&self) -> BackendState {
        if !self.is_reachable().await {
            return BackendState::Unreachable;
        }
        if self.has_model(self.model()).await {
            BackendState::Ready
        } else {
            BackendState::ModelMissing
        }
    }

    fn pull(&self, name: &str) -> BoxStream<'static, ChatResult<ProgressEvent>>;

    fn generate(&self, prompt: &str, settings: GenerationSettings) -> BoxStream<'static, Snapshot>;
}

/// Ollama's HTTP API.
#[derive(Clone)]
pub struct OllamaBackend {
    probe: BackendProbe,
    installer: ModelInstaller,
    streamer: CompletionStreamer,
}

impl OllamaBackend {
    pub fn new(config: &KestrelConfig) -> Self {
        let client = Client::new();
        Self {
            probe: BackendProbe::new(client.clone(), config),
            installer: ModelInstaller::new(client.clone(), config),
            streamer: CompletionStreamer::new(client, config),
        }
    }

    pub fn probe(&self) -> &BackendProbe {
        &self.probe
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn model(&self) -> &str {
        self.streamer.model()
    }

    async fn is_reachable(&self) -> bool {
        self.probe.is_reachable().await
    }

    async fn has_model(&self, name: &str) -> bool {
        self.probe.has_model(name).await
    }

    fn pull(&self, name: &str) -> BoxStream<'static, ChatResult<ProgressEvent>> {
        self.installer.pull(name)
    }

    fn generate(&self, prompt: &str, settings: GenerationSettings) -> BoxStream<'static, Snapshot> {
        self.streamer.generate(prompt, settings)
    }
}
