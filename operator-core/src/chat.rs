//! Trading assistant chat types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    /// Grows while `streaming` is set, frozen afterwards
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub streaming: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::User,
            content: content.into(),
            created_at: Utc::now(),
            streaming: false,
        }
    }

    /// Empty assistant message awaiting streamed content
    pub fn assistant_placeholder() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            streaming: true,
        }
    }
}

/// Conversation with the assistant
///
/// The ID is assigned by the server on the first turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Request body for the streaming chat endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_id: Option<String>,
}

/// One `data:` payload of the streaming chat response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatPayload {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    /// Either an error string or a `true` flag with the text in `content`
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

const ERROR_PREFIX: &str = "Error: ";

impl ChatPayload {
    pub fn is_done(&self) -> bool {
        self.done.unwrap_or(false)
    }

    /// Operator-facing error text, if this payload aborts the turn
    pub fn error_text(&self) -> Option<String> {
        let detail = match self.error.as_ref()? {
            serde_json::Value::Null | serde_json::Value::Bool(false) => return None,
            serde_json::Value::Bool(true) => self
                .content
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "unknown error".to_string()),
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(obj) => match obj.get("message").and_then(|m| m.as_str()) {
                Some(message) => message.to_string(),
                None => serde_json::Value::Object(obj.clone()).to_string(),
            },
            other => other.to_string(),
        };

        if detail.starts_with(ERROR_PREFIX.trim_end()) {
            Some(detail)
        } else {
            Some(format!("{}{}", ERROR_PREFIX, detail))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> ChatPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_payload_fields_optional() {
        let p = payload(r#"{"content": "Hi"}"#);
        assert_eq!(p.content.as_deref(), Some("Hi"));
        assert!(p.conversation_id.is_none());
        assert!(!p.is_done());
        assert!(p.error_text().is_none());
    }

    #[test]
    fn test_error_string() {
        let p = payload(r#"{"error": "rate limited"}"#);
        assert_eq!(p.error_text().as_deref(), Some("Error: rate limited"));
    }

    #[test]
    fn test_error_flag_uses_content() {
        let p = payload(r#"{"content": "Error: overloaded", "done": true, "error": true}"#);
        assert_eq!(p.error_text().as_deref(), Some("Error: overloaded"));

        let p = payload(r#"{"error": true}"#);
        assert_eq!(p.error_text().as_deref(), Some("Error: unknown error"));
    }

    #[test]
    fn test_error_false_is_not_an_error() {
        let p = payload(r#"{"content": "ok", "error": false}"#);
        assert!(p.error_text().is_none());
        let p = payload(r#"{"error": null}"#);
        assert!(p.error_text().is_none());
    }

    #[test]
    fn test_error_object_message() {
        let p = payload(r#"{"error": {"message": "bad key"}}"#);
        assert_eq!(p.error_text().as_deref(), Some("Error: bad key"));
    }

    #[test]
    fn test_request_serializes_null_conversation() {
        let req = ChatRequest {
            message: "hello".to_string(),
            conversation_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message"], "hello");
        assert!(json["conversation_id"].is_null());
    }
}
