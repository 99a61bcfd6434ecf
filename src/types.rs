use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used in the prompt transcript.
    pub fn transcript_label(self) -> &'static str {
        match self {
            Role::User => "Human",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MIN_OUTPUT_TOKENS: u32 = 100;
pub const MAX_OUTPUT_TOKENS: u32 = 2000;

/// Sampling options forwarded with every generate request.
///
/// Values are clamped into their slider ranges on construction and on every
/// setter call, so a settings value is always valid to send.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    temperature: f32,
    max_output_tokens: u32,
}

impl GenerationSettings {
    pub fn new(temperature: f32, max_output_tokens: u32) -> Self {
        let mut settings = Self::default();
        settings.set_temperature(temperature);
        settings.set_max_output_tokens(max_output_tokens);
        settings
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = if temperature.is_nan() {
            Self::default().temperature
        } else {
            temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        };
    }

    pub fn set_max_output_tokens(&mut self, max_output_tokens: u32) {
        self.max_output_tokens = max_output_tokens.clamp(MIN_OUTPUT_TOKENS, MAX_OUTPUT_TOKENS);
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 1000,
        }
    }
}

/// Availability of the inference server and the session's model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendState {
    Unreachable,
    ModelMissing,
    Ready,
}

impl BackendState {
    pub fn is_ready(self) -> bool {
        matches!(self, BackendState::Ready)
    }

    pub fn describe(self) -> &'static str {
        match self {
            BackendState::Unreachable => "inference server is not running",
            BackendState::ModelMissing => "model is not installed",
            BackendState::Ready => "ready to chat",
        }
    }
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Message counters shown next to the conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ChatStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
}

impl ChatStats {
    pub fn from_history(history: &[ChatMessage]) -> Self {
        let user_messages = history.iter().filter(|m| m.role == Role::User).count();
        Self {
            total_messages: history.len(),
            user_messages,
            assistant_messages: history.len() - user_messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let msg = ChatMessage::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn settings_clamp_into_range() {
        let settings = GenerationSettings::new(3.5, 50);
        assert_eq!(settings.temperature(), MAX_TEMPERATURE);
        assert_eq!(settings.max_output_tokens(), MIN_OUTPUT_TOKENS);

        let settings = GenerationSettings::new(-1.0, 10_000);
        assert_eq!(settings.temperature(), MIN_TEMPERATURE);
        assert_eq!(settings.max_output_tokens(), MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn nan_temperature_falls_back_to_default() {
        let settings = GenerationSettings::new(f32::NAN, 500);
        assert_eq!(settings.temperature(), 0.7);
        assert_eq!(settings.max_output_tokens(), 500);
    }

    #[test]
    fn stats_count_roles() {
        let history = vec![
            ChatMessage::user("a"),
            ChatMessage::assistant("b"),
            ChatMessage::user("c"),
        ];
        let stats = ChatStats::from_history(&history);
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.assistant_messages, 1);
    }
}
