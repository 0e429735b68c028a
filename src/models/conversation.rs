use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single message in a text conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            direction: None,
            sent_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Conversation as handed over by the calling page. Never mutated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Option<Vec<Message>>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl Conversation {
    pub fn new(id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            started_at,
            messages: None,
            transcript: None,
            status: "completed".to_string(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_transcript(mut self, transcript: impl Into<String>) -> Self {
        self.transcript = Some(transcript.into());
        self
    }

    /// Structured messages that carry a body, if there are any
    pub fn non_empty_messages(&self) -> Vec<&Message> {
        self.messages
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|m| !m.is_empty())
            .collect()
    }
}

/// Full conversation content as returned by the conversation service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchedConversation {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_messages_filters_blank_bodies() {
        let conversation = Conversation::new("c1", Utc::now()).with_messages(vec![
            Message::new("hi"),
            Message::new(""),
            Message::new("there"),
        ]);

        let bodies: Vec<&str> = conversation
            .non_empty_messages()
            .iter()
            .map(|m| m.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["hi", "there"]);
    }

    #[test]
    fn test_conversation_deserializes_camel_case() {
        let json = r#"{
            "id": "conv-1",
            "startedAt": "2025-06-09T10:00:00Z",
            "transcript": "Hello world",
            "status": "closed"
        }"#;

        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.id, "conv-1");
        assert!(conversation.messages.is_none());
        assert_eq!(conversation.transcript.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_fetched_conversation_missing_messages_is_empty() {
        let fetched: FetchedConversation = serde_json::from_str("{}").unwrap();
        assert!(fetched.messages.is_empty());
    }
}
