use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::block::Block;

/// One decoded record of the event stream, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub event: String,
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Payload text of `data.text` when it is a string.
    pub fn text(&self) -> Option<&str> {
        self.data.get("text").and_then(Value::as_str)
    }
}

/// A named tool invocation carried by a `tool` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    json!({})
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "name": self.name, "args": self.args })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Token { text: String },
    Tool(ToolCall),
    /// Authoritative override; blocks win over text when both are present.
    Final {
        text: Option<String>,
        blocks: Option<Vec<Block>>,
    },
    Message { blocks: Vec<Block> },
    Done,
    /// Any other record, including `message` records without blocks.
    Other { kind: String, payload: Value },
}

impl Event {
    pub fn from_frame(frame: Frame) -> Self {
        match frame.event.as_str() {
            "token" => match frame.text() {
                Some(text) => Event::Token {
                    text: text.to_string(),
                },
                None => Event::other(frame),
            },
            "tool" => match serde_json::from_value::<ToolCall>(frame.data.clone()) {
                Ok(call) => Event::Tool(call),
                Err(_) => Event::other(frame),
            },
            "final" => {
                let blocks = frame.data.get("blocks").and_then(Block::list_from_value);
                let text = frame.text().map(ToOwned::to_owned);
                if blocks.is_none() && text.is_none() {
                    Event::other(frame)
                } else {
                    Event::Final { text, blocks }
                }
            }
            "message" => match frame.data.get("blocks").and_then(Block::list_from_value) {
                Some(blocks) => Event::Message { blocks },
                None => Event::other(frame),
            },
            "done" => Event::Done,
            _ => Event::other(frame),
        }
    }

    fn other(frame: Frame) -> Self {
        Event::Other {
            kind: frame.event,
            payload: frame.data,
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Event::Token { .. } => "token",
            Event::Tool(_) => "tool",
            Event::Final { .. } => "final",
            Event::Message { .. } => "message",
            Event::Done => "done",
            Event::Other { kind, .. } => kind,
        }
    }

    /// Text carried by an unrecognized record, which is treated as a legacy token.
    pub fn legacy_text(&self) -> Option<&str> {
        match self {
            Event::Other { payload, .. } => payload
                .get("text")
                .and_then(Value::as_str)
                .filter(|text| !text.is_empty()),
            _ => None,
        }
    }
}
