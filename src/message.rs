//! Chat message model shared by the conversation buffer, the history store
//! and the completion backend.
//!
//! Messages serialize as `{"role": "...", "content": "..."}`, which is both the
//! wire shape of the completion endpoint and the plaintext history format.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

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

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Select the messages that belong in the history file: system messages are
/// dropped and only the most recent `max_turns` turn-pairs are kept, in
/// chronological order.
pub fn persistable(messages: &[Message], max_turns: usize) -> Vec<Message> {
    let turns: Vec<&Message> = messages.iter().filter(|m| !m.is_system()).collect();
    let keep = max_turns.saturating_mul(2);
    let skip = turns.len().saturating_sub(keep);
    turns.into_iter().skip(skip).cloned().collect()
}

/// Assemble the outbound conversation buffer for a fresh invocation.
///
/// An empty system prompt means no system message at all.
pub fn assemble(system_prompt: Option<&str>, history: &[Message], max_turns: usize) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        messages.push(Message::system(prompt));
    }
    messages.extend(persistable(history, max_turns));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<Message> {
        (0..n)
            .flat_map(|i| {
                [
                    Message::user(format!("q{}", i)),
                    Message::assistant(format!("a{}", i)),
                ]
            })
            .collect()
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);

        let parsed: Message = serde_json::from_str(r#"{"role":"system","content":"x"}"#).unwrap();
        assert_eq!(parsed, Message::system("x"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let parsed = serde_json::from_str::<Message>(r#"{"role":"tool","content":"x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_persistable_keeps_most_recent_pairs() {
        let messages = turns(5);
        let kept = persistable(&messages, 2);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0], Message::user("q3"));
        assert_eq!(kept[1], Message::assistant("a3"));
        assert_eq!(kept[3], Message::assistant("a4"));
    }

    #[test]
    fn test_persistable_excludes_system() {
        let mut messages = vec![Message::system("be nice")];
        messages.extend(turns(1));
        let kept = persistable(&messages, 10);
        assert_eq!(kept, turns(1));
    }

    #[test]
    fn test_persistable_zero_keeps_nothing() {
        assert!(persistable(&turns(3), 0).is_empty());
    }

    #[test]
    fn test_assemble_skips_empty_system_prompt() {
        let messages = assemble(Some(""), &[], 10);
        assert!(messages.is_empty());

        let messages = assemble(Some("sys"), &turns(3), 1);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], Message::system("sys"));
        assert_eq!(messages[1], Message::user("q2"));
    }
}
