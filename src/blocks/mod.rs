//! Tool-call normalization and block rendering dispatch.

pub mod engines;
mod error;
mod render;

pub use engines::{EngineCache, EngineLoader, RenderEngine, SharedEngine};
pub use error::RenderError;
pub use render::{BlockContainer, BlockRenderer};

use crate::html::sanitize;
use crate::types::{AnimationControls, Block, Cell, ToolCall};
use serde_json::{json, Value};

pub const DEFAULT_DIAGRAM: &str = "flowchart LR; A-->B;";

/// Map one tool invocation to exactly one block. Unrecognized names become
/// [`Block::Unknown`] carrying the whole call; only a nameless call yields `None`.
pub fn to_block(call: &ToolCall) -> Option<Block> {
    if call.name.trim().is_empty() {
        return None;
    }
    let args = &call.args;

    let block = match call.name.as_str() {
        "render_table" => Block::Table {
            columns: columns(args.get("columns")),
            rows: rows(args.get("rows")),
            caption: string_arg(args, "caption"),
        },
        "render_chart" => Block::Chart {
            spec: chart_spec(args),
            title: string_arg(args, "title"),
        },
        "render_mermaid" => Block::Diagram {
            code: string_arg(args, "code").unwrap_or_else(|| DEFAULT_DIAGRAM.to_string()),
        },
        "render_image" => Block::Image {
            url: string_arg(args, "url").unwrap_or_default(),
            alt: string_arg(args, "alt"),
        },
        "render_html" => Block::Html {
            html: sanitize(args.get("html").and_then(Value::as_str).unwrap_or_default()),
        },
        "render_lottie" => Block::Animation {
            json: args.get("json").cloned().unwrap_or_else(|| json!({})),
            data: args.get("data").filter(|data| !data.is_null()).cloned(),
            controls: args
                .get("controls")
                .and_then(|controls| serde_json::from_value::<AnimationControls>(controls.clone()).ok()),
            title: string_arg(args, "title"),
        },
        _ => Block::Unknown {
            raw: call.to_value(),
        },
    };
    Some(block)
}

fn string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn columns(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(cell_text).collect())
        .unwrap_or_default()
}

fn rows(value: Option<&Value>) -> Vec<Vec<Cell>> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|row| match row {
            Value::Array(cells) => cells.clone(),
            other => vec![other.clone()],
        })
        .collect()
}

/// Display text of a table cell: strings verbatim, everything else as JSON.
pub fn cell_text(cell: &Cell) -> String {
    match cell {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn chart_spec(args: &Value) -> Value {
    let mut spec = args
        .get("vegalite_spec")
        .or_else(|| args.get("spec"))
        .filter(|spec| !spec.is_null())
        .cloned()
        .unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut spec {
        map.entry("width").or_insert_with(|| json!("container"));
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new(name, args)
    }

    #[test]
    fn test_image_tool_maps_to_image_block() {
        let block = to_block(&call(
            "render_image",
            json!({"url": "http://x/i.png", "alt": "cat"}),
        ));
        assert_eq!(
            block,
            Some(Block::Image {
                url: "http://x/i.png".to_string(),
                alt: Some("cat".to_string())
            })
        );
    }

    #[test]
    fn test_table_rows_and_columns_are_normalized() {
        let block = to_block(&call(
            "render_table",
            json!({"columns": ["a", 2], "rows": [[1, "x"], "solo"], "caption": "Totals"}),
        ))
        .unwrap();
        assert_eq!(
            block,
            Block::Table {
                columns: vec!["a".to_string(), "2".to_string()],
                rows: vec![vec![json!(1), json!("x")], vec![json!("solo")]],
                caption: Some("Totals".to_string()),
            }
        );
    }

    #[test]
    fn test_chart_spec_prefers_vegalite_and_adds_container_width() {
        let block = to_block(&call(
            "render_chart",
            json!({"vegalite_spec": {"mark": "bar"}, "spec": {"mark": "line"}}),
        ))
        .unwrap();
        let Block::Chart { spec, .. } = block else {
            panic!("expected chart");
        };
        assert_eq!(spec, json!({"mark": "bar", "width": "container"}));

        let block = to_block(&call("render_chart", json!({"spec": {"width": 300}}))).unwrap();
        let Block::Chart { spec, .. } = block else {
            panic!("expected chart");
        };
        assert_eq!(spec, json!({"width": 300}));
    }

    #[test]
    fn test_mermaid_without_code_uses_default_diagram() {
        assert_eq!(
            to_block(&call("render_mermaid", json!({}))),
            Some(Block::Diagram {
                code: DEFAULT_DIAGRAM.to_string()
            })
        );
    }

    #[test]
    fn test_html_is_sanitized_at_normalization() {
        let block = to_block(&call(
            "render_html",
            json!({"html": "<div onclick=\"x()\">hi<script>bad()</script></div>"}),
        ));
        assert_eq!(
            block,
            Some(Block::Html {
                html: "<div>hi</div>".to_string()
            })
        );
    }

    #[test]
    fn test_lottie_controls_and_data() {
        let block = to_block(&call(
            "render_lottie",
            json!({"json": {"layers": []}, "controls": {"loop": false, "speed": 2.0}}),
        ))
        .unwrap();
        assert_eq!(
            block,
            Block::Animation {
                json: json!({"layers": []}),
                data: None,
                controls: Some(AnimationControls {
                    r#loop: Some(false),
                    autoplay: None,
                    speed: Some(2.0)
                }),
                title: None,
            }
        );
    }

    #[test]
    fn test_unknown_tool_keeps_raw_call() {
        let block = to_block(&call("render_map", json!({"lat": 1}))).unwrap();
        assert_eq!(
            block,
            Block::Unknown {
                raw: json!({"name": "render_map", "args": {"lat": 1}})
            }
        );
    }

    #[test]
    fn test_nameless_call_yields_nothing() {
        assert_eq!(to_block(&call("", json!({}))), None);
    }
}
