use crate::models::chat::{ ChatMessage, Turn };

/// Flattens stored turns into role-tagged messages, a user message followed by
/// an assistant message for each turn.
pub fn normalize(history: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2);
    for turn in history {
        messages.push(ChatMessage::user(turn.user.as_str()));
        messages.push(ChatMessage::assistant(turn.assistant.as_str()));
    }
    messages
}
