//! Gather conversation and database context for prompts
//!
//! This module renders the recent conversation and, for the bounded
//! context round-trip, the stored records the model asked about. Both are
//! plain text appended to the user prompt.

use crate::store::Entity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Who said a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

/// Prompt context for one extraction
pub struct ConversationContext {
    /// Date relative expressions ("today", "tomorrow") resolve against
    pub today: NaiveDate,
    /// Most recent messages, oldest first
    pub recent: Vec<Message>,
    /// Stored records gathered for a context re-prompt; `None` until a
    /// lookup has run
    pub entities: Option<Vec<Entity>>,
}

impl ConversationContext {
    /// Keep only the last `limit` messages of `history`
    pub fn new(today: NaiveDate, history: &[Message], limit: usize) -> Self {
        let skip = history.len().saturating_sub(limit);
        Self {
            today,
            recent: history[skip..].to_vec(),
            entities: None,
        }
    }

    pub fn with_entities(mut self, entities: Vec<Entity>) -> Self {
        self.entities = Some(entities);
        self
    }

    /// A lookup ran, even if it found nothing
    pub fn has_lookup(&self) -> bool {
        self.entities.is_some()
    }

    /// Generate the context block placed before the user message
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str(&format!("Today: {}\n", self.today.format("%Y-%m-%d (%A)")));

        if !self.recent.is_empty() {
            s.push_str("\nRecent Conversation:\n");
            for message in &self.recent {
                let speaker = match message.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                s.push_str(&format!("{}: {}\n", speaker, message.content));
            }
        }

        if let Some(entities) = &self.entities {
            s.push_str("\nDatabase Context:\n");
            if entities.is_empty() {
                s.push_str("No matching records.\n");
            }
            for entity in entities {
                s.push_str(&format!(
                    "- [{}] {} id={} {}\n",
                    entity.entity_type.noun().to_uppercase(),
                    entity.title,
                    entity.id,
                    entity.summary_line()
                ));
            }
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_empty_context() {
        let ctx = ConversationContext::new(today(), &[], 6);
        assert!(ctx.recent.is_empty());
        assert!(!ctx.has_lookup());
        assert_eq!(ctx.summary(), "Today: 2024-05-10 (Friday)\n");
    }

    #[test]
    fn test_history_limit() {
        let history: Vec<_> = (0..10).map(|i| Message::user(format!("msg {}", i))).collect();
        let ctx = ConversationContext::new(today(), &history, 3);

        assert_eq!(ctx.recent.len(), 3);
        assert_eq!(ctx.recent[0].content, "msg 7");
        assert_eq!(ctx.recent[2].content, "msg 9");
    }

    #[test]
    fn test_summary_lists_speakers() {
        let history = vec![
            Message::user("add milk to my list"),
            Message::assistant("Created task \"Milk\""),
        ];
        let summary = ConversationContext::new(today(), &history, 6).summary();
        assert!(summary.contains("User: add milk to my list"));
        assert!(summary.contains("Assistant: Created task \"Milk\""));
        assert!(!summary.contains("Database Context"));
    }

    #[test]
    fn test_empty_lookup_is_rendered() {
        let ctx = ConversationContext::new(today(), &[], 6).with_entities(Vec::new());
        assert!(ctx.has_lookup());
        assert_eq!(
            ctx.summary(),
            "Today: 2024-05-10 (Friday)\n\nDatabase Context:\nNo matching records.\n"
        );
    }
}
