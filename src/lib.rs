pub mod chat;
pub mod constants;
pub mod context;
pub mod error;
pub mod extractor;
pub mod image_describer;
pub mod llm_interaction;
pub mod prompt;
pub mod web_server;

use chrono::Local;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Bot => "Bot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub timestamp: String,
    pub role: Role,
    pub content: String,
    // Bot turn carrying a completion failure rendered as text
    pub failed: bool,
}

impl Message {
    fn new(role: Role, content: String, failed: bool) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            role,
            content,
            failed,
        }
    }

    /// One-line rendering used by the terminal chat, e.g. `You: hello`.
    pub fn render(&self) -> String {
        format!("{}: {}", self.role.label(), self.content)
    }
}

/// Append-only chat log for one session. Messages are never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::User, content.into(), false));
    }

    pub fn push_bot(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Bot, content.into(), false));
    }

    pub fn push_failed_bot(&mut self, content: impl Into<String>) {
        self.messages.push(Message::new(Role::Bot, content.into(), true));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|msg| format!("[{}] {}", msg.timestamp, msg.render()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_new() {
        let conversation = Conversation::new();
        assert!(conversation.is_empty());
        assert_eq!(conversation.len(), 0);
        assert!(conversation.last().is_none());
    }

    #[test]
    fn test_push_preserves_order_and_roles() {
        let mut conversation = Conversation::new();
        conversation.push_user("Hello");
        conversation.push_bot("Hi there!");
        conversation.push_user("How much is the Vios?");

        let messages = conversation.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].role, Role::Bot);
        assert_eq!(messages[1].content, "Hi there!");
        assert_eq!(messages[2].content, "How much is the Vios?");
        assert!(messages.iter().all(|m| !m.failed));
    }

    #[test]
    fn test_failed_bot_message_is_tagged() {
        let mut conversation = Conversation::new();
        conversation.push_failed_bot("Error: timed out");
        let last = conversation.last().unwrap();
        assert_eq!(last.role, Role::Bot);
        assert!(last.failed);
    }

    #[test]
    fn test_transcript_labels_speakers() {
        let mut conversation = Conversation::new();
        conversation.push_user("Hello");
        conversation.push_bot("Hi there!");

        let transcript = conversation.transcript();
        assert!(transcript.contains("You: Hello"));
        assert!(transcript.contains("Bot: Hi there!"));
        assert_eq!(transcript.lines().count(), 2);
    }

    #[test]
    fn test_role_serialises_lowercase() {
        assert_eq!(serde_json::to_value(Role::Bot).unwrap(), "bot");
    }
}
