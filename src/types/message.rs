use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::block::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Blocks,
}

/// Message content. The variant is the message kind, so kind and content
/// shape cannot disagree.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    Text(String),
    Blocks(Vec<Block>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMessage", into = "RawMessage")]
pub struct Message {
    pub role: Role,
    pub body: MessageBody,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<Block>) -> Self {
        Self {
            role: Role::Assistant,
            body: MessageBody::Blocks(blocks),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self.body {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::Blocks(_) => MessageKind::Blocks,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Blocks(_) => None,
        }
    }

    pub fn blocks(&self) -> Option<&[Block]> {
        match &self.body {
            MessageBody::Blocks(blocks) => Some(blocks),
            MessageBody::Text(_) => None,
        }
    }
}

/// Storage shape: `{ role, kind, content }` where content is a string or
/// `{ blocks: [...] }`. Records written without `kind` infer it from content.
#[derive(Serialize, Deserialize)]
struct RawMessage {
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kind: Option<MessageKind>,
    #[serde(default)]
    content: Value,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let blocks = raw.content.get("blocks").and_then(Block::list_from_value);
        let body = match (raw.kind, blocks) {
            (Some(MessageKind::Text), _) | (None, None) => {
                MessageBody::Text(raw.content.as_str().unwrap_or_default().to_string())
            }
            (Some(MessageKind::Blocks), blocks) | (None, blocks @ Some(_)) => {
                MessageBody::Blocks(blocks.unwrap_or_default())
            }
        };
        Message {
            role: raw.role,
            body,
        }
    }
}

impl From<Message> for RawMessage {
    fn from(message: Message) -> Self {
        let kind = message.kind();
        let content = match message.body {
            MessageBody::Text(text) => Value::String(text),
            MessageBody::Blocks(blocks) => json!({ "blocks": blocks }),
        };
        RawMessage {
            role: message.role,
            kind: Some(kind),
            content,
        }
    }
}

/// One persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    /// Recency key: last update, falling back to creation time.
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_round_trips_with_kind() {
        let message = Message::assistant_text("Hello");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"role": "assistant", "kind": "text", "content": "Hello"})
        );
        assert_eq!(serde_json::from_value::<Message>(value).unwrap(), message);
    }

    #[test]
    fn test_blocks_message_serializes_content_object() {
        let message = Message::assistant_blocks(vec![Block::Text {
            content: "A".to_string(),
        }]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["kind"], "blocks");
        assert_eq!(
            value["content"],
            json!({"blocks": [{"type": "text", "content": "A"}]})
        );
    }

    #[test]
    fn test_missing_kind_is_inferred_from_content_shape() {
        let legacy: Message = serde_json::from_value(json!({
            "role": "assistant",
            "content": {"blocks": [{"type": "image", "url": "u"}]}
        }))
        .unwrap();
        assert_eq!(legacy.kind(), MessageKind::Blocks);

        let plain: Message =
            serde_json::from_value(json!({"role": "user", "content": "hi"})).unwrap();
        assert_eq!(plain.text(), Some("hi"));
    }

    #[test]
    fn test_text_kind_never_holds_blocks() {
        let message: Message = serde_json::from_value(json!({
            "role": "assistant",
            "kind": "text",
            "content": {"blocks": []}
        }))
        .unwrap();
        assert_eq!(message.text(), Some(""));
        assert!(message.blocks().is_none());
    }
}
