use crate::context::DEFAULT_TURN_LIMIT;
use crate::types::GenerationSettings;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "internlm2:1.8b";
const DEFAULT_PORT: u16 = 11434;

#[derive(Clone, Debug, PartialEq)]
pub struct KestrelConfig {
    /// Inference server root, without a trailing slash.
    pub base_url: String,
    pub model: String,
    pub probe_timeout: Duration,
    /// Bound on connecting and on each read while a model downloads.
    pub pull_timeout: Duration,
    /// Bound on connecting and on each read while a reply streams.
    pub generate_timeout: Duration,
    pub turn_limit: usize,
    pub settings: GenerationSettings,
}

impl Default for KestrelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            probe_timeout: Duration::from_secs(5),
            pull_timeout: Duration::from_secs(600),
            generate_timeout: Duration::from_secs(60),
            turn_limit: DEFAULT_TURN_LIMIT,
            settings: GenerationSettings::default(),
        }
    }
}

impl KestrelConfig {
    /// Defaults overridden by the process environment:
    ///
    /// - `OLLAMA_HOST` - server address, `host:port` or a full URL
    /// - `KESTREL_MODEL` - model to chat with
    /// - `KESTREL_TURN_LIMIT` - prior messages carried into each prompt
    /// - `KESTREL_TEMPERATURE`, `KESTREL_MAX_TOKENS` - initial settings
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let base_url = lookup("OLLAMA_HOST")
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| normalize_host(&raw))
            .unwrap_or(defaults.base_url);
        let model = lookup("KESTREL_MODEL")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or(defaults.model);
        let turn_limit = parse_or(&lookup, "KESTREL_TURN_LIMIT", defaults.turn_limit);
        let settings = GenerationSettings::new(
            parse_or(&lookup, "KESTREL_TEMPERATURE", defaults.settings.temperature()),
            parse_or(&lookup, "KESTREL_MAX_TOKENS", defaults.settings.max_output_tokens()),
        );

        Self {
            base_url,
            model,
            turn_limit,
            settings,
            ..defaults
        }
    }

    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = normalize_host(base_url.as_ref());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
    }
}

/// Accepts what `OLLAMA_HOST` usually holds: `host`, `host:port` or a URL.
fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return trimmed.to_string();
    }
    if trimmed.contains(':') {
        format!("http://{trimmed}")
    } else {
        format!("http://{trimmed}:{DEFAULT_PORT}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> KestrelConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KestrelConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config_from(&[]), KestrelConfig::default());
    }

    #[test]
    fn host_forms_are_normalized() {
        assert_eq!(normalize_host("127.0.0.1:9000"), "http://127.0.0.1:9000");
        assert_eq!(normalize_host("gpu-box"), "http://gpu-box:11434");
        assert_eq!(normalize_host("https://llm.lan/"), "https://llm.lan");
    }

    #[test]
    fn overrides_apply() {
        let config = config_from(&[
            ("OLLAMA_HOST", "10.0.0.2:11434"),
            ("KESTREL_MODEL", "qwen2:0.5b"),
            ("KESTREL_TURN_LIMIT", "8"),
            ("KESTREL_TEMPERATURE", "1.2"),
            ("KESTREL_MAX_TOKENS", "400"),
        ]);
        assert_eq!(config.endpoint("/api/tags"), "http://10.0.0.2:11434/api/tags");
        assert_eq!(config.model, "qwen2:0.5b");
        assert_eq!(config.turn_limit, 8);
        assert_eq!(config.settings.temperature(), 1.2);
        assert_eq!(config.settings.max_output_tokens(), 400);
        assert_eq!(config.generate_timeout, Duration::from_secs(60));
    }

    #[test]
    fn bad_values_fall_back() {
        let config = config_from(&[("KESTREL_TURN_LIMIT", "many"), ("KESTREL_MAX_TOKENS", "9000")]);
        assert_eq!(config.turn_limit, DEFAULT_TURN_LIMIT);
        assert_eq!(config.settings.max_output_tokens(), 2000);
    }
}
