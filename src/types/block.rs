use crate::html::sanitize;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One table cell. Tool payloads carry strings, numbers, booleans, objects or null.
pub type Cell = Value;

/// Playback options for an animation block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnimationControls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#loop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// A self-contained unit of renderable, persistable content.
///
/// Rendering order is array order. Blocks are never mutated after they are
/// appended to a persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// Markdown source.
    Text { content: String },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    /// Declarative chart grammar spec.
    Chart {
        spec: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Diagram-as-text source.
    Diagram { code: String },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
    Animation {
        json: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        controls: Option<AnimationControls>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Already sanitized markup.
    Html { html: String },
    /// Anything that could not be mapped; kept verbatim, never dropped.
    Unknown { raw: Value },
}

impl Block {
    /// Lenient decode used for persisted and streamed block arrays: a value that
    /// does not match any variant becomes [`Block::Unknown`] instead of failing.
    /// Html markup is sanitized on the way in.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Block>(value.clone()) {
            Ok(Block::Html { html }) => Block::Html {
                html: sanitize(&html),
            },
            Ok(block) => block,
            Err(_) => Block::Unknown { raw: value },
        }
    }

    pub fn list_from_value(value: &Value) -> Option<Vec<Block>> {
        value
            .as_array()
            .map(|items| items.iter().cloned().map(Block::from_value).collect())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Block::Text { .. } => "text",
            Block::Table { .. } => "table",
            Block::Chart { .. } => "chart",
            Block::Diagram { .. } => "diagram",
            Block::Image { .. } => "image",
            Block::Animation { .. } => "animation",
            Block::Html { .. } => "html",
            Block::Unknown { .. } => "unknown",
        }
    }
}
