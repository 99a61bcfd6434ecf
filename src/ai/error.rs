use crate::types::BackendState;
use std::time::Duration;

/// Everything that can go wrong while talking to the inference server.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("cannot reach the inference server: {0}")]
    NetworkUnavailable(String),

    #[error("request timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    #[error("inference server returned {status}: {body}")]
    Http { status: u16, body: String },

    /// A single stream line failed to decode. Skipped by the line decoder.
    #[error("malformed stream event: {0}")]
    MalformedEvent(String),

    #[error("model `{0}` is not installed")]
    ModelAbsent(String),

    #[error("inference server reported: {0}")]
    Backend(String),

    #[error("stream closed before the server signalled completion")]
    Truncated,

    #[error("cannot chat yet: {0}")]
    NotReady(BackendState),

    #[error("message is empty")]
    EmptyPrompt,
}

impl ChatError {
    pub(crate) fn from_transport(err: reqwest::Error, limit: Duration) -> Self {
        if err.is_timeout() {
            ChatError::Timeout(limit)
        } else if let Some(status) = err.status() {
            ChatError::Http {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            ChatError::NetworkUnavailable(err.to_string())
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            ChatError::Timeout(Duration::from_secs(60)).to_string(),
            "request timed out after 60s"
        );
        assert_eq!(
            ChatError::Http {
                status: 500,
                body: "boom".into()
            }
            .to_string(),
            "inference server returned 500: boom"
        );
        assert_eq!(
            ChatError::NotReady(BackendState::Unreachable).to_string(),
            "cannot chat yet: inference server is not running"
        );
    }
}
