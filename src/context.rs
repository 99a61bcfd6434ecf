use crate::types::ChatMessage;

/// Prior messages carried into each prompt.
pub const DEFAULT_TURN_LIMIT: usize = 5;

/// Renders the plain-text transcript sent as the generate prompt.
///
/// Only the last `turn_limit` messages of `history` are included, oldest
/// first, and the prompt always ends with the new user line followed by an
/// open assistant line.
pub fn build_prompt(history: &[ChatMessage], new_user_text: &str, turn_limit: usize) -> String {
    let start = history.len().saturating_sub(turn_limit);
    let mut prompt = String::new();
    for message in &history[start..] {
        prompt.push_str(message.role.transcript_label());
        prompt.push_str(": ");
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("Human: ");
    prompt.push_str(new_user_text);
    prompt.push_str("\nAssistant: ");
    prompt
}
