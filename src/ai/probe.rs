use super::{ChatError, ChatResult};
use crate::config::KestrelConfig;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// An installed model as listed by `GET /api/tags`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

/// Liveness and inventory checks against the inference server.
///
/// Nothing is cached: the server can be started, stopped or given new models
/// at any time by someone else.
#[derive(Clone)]
pub struct BackendProbe {
    client: Client,
    url: String,
    timeout: Duration,
}

impl BackendProbe {
    pub fn new(client: Client, config: &KestrelConfig) -> Self {
        Self {
            client,
            url: config.endpoint("/api/tags"),
            timeout: config.probe_timeout,
        }
    }

    async fn fetch_tags(&self) -> ChatResult<reqwest::Response> {
        self.client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ChatError::from_transport(err, self.timeout))
    }

    /// True only when the inventory endpoint answers 200.
    pub async fn is_reachable(&self) -> bool {
        match self.fetch_tags().await {
            Ok(response) => {
                let status = response.status();
                debug!(%status, "inference server probe");
                status == StatusCode::OK
            }
            Err(err) => {
                debug!(error = %err, "inference server probe failed");
                false
            }
        }
    }

    pub async fn list_models(&self) -> ChatResult<Vec<ModelEntry>> {
        let response = self.fetch_tags().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let body = response
            .text()
            .await
            .map_err(|err| ChatError::from_transport(err, self.timeout))?;
        let tags: TagsResponse = serde_json::from_str(&body)
            .map_err(|err| ChatError::MalformedEvent(err.to_string()))?;
        Ok(tags.models)
    }

    /// Exact name match against the inventory; any failure counts as absent.
    pub async fn has_model(&self, name: &str) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|model| model.name == name),
            Err(err) => {
                debug!(model = name, error = %err, "model lookup failed");
                false
            }
        }
    }
}
