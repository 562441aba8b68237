use super::cell_text;
use super::engines::EngineCache;
use super::error::RenderError;
use crate::html::{escape_attr, escape_text, has_blocked_scheme, sanitize};
use crate::markdown;
use crate::types::Block;
use std::sync::Arc;

/// Where mounted block fragments go, in mount order.
pub trait BlockContainer: Send {
    fn push_fragment(&mut self, html: String);
}

impl BlockContainer for Vec<String> {
    fn push_fragment(&mut self, html: String) {
        self.push(html);
    }
}

/// Turns blocks into HTML fragments, loading engines through the cache on
/// first use.
#[derive(Clone)]
pub struct BlockRenderer {
    engines: Arc<EngineCache>,
}

impl Default for BlockRenderer {
    fn default() -> Self {
        Self::new(EngineCache::global())
    }
}

impl BlockRenderer {
    pub fn new(engines: Arc<EngineCache>) -> Self {
        Self { engines }
    }

    /// Render one block. Engine failures degrade to an inline placeholder for
    /// this block only.
    pub async fn render(&self, block: &Block) -> String {
        match block {
            Block::Text { content } => {
                format!("<div class=\"block text\">{}</div>", markdown::render(content))
            }
            Block::Table {
                columns,
                rows,
                caption,
            } => {
                let mut html = render_table(columns, rows);
                if let Some(caption) = caption {
                    html.push_str(&render_caption(caption));
                }
                html
            }
            Block::Chart { title, .. } => {
                let mut html = self.render_with_engine(block).await;
                if let Some(title) = title {
                    html.push_str(&render_caption(title));
                }
                html
            }
            Block::Animation { title, .. } => {
                let mut html = self.render_with_engine(block).await;
                if let Some(title) = title {
                    html.push_str(&render_caption(title));
                }
                html
            }
            Block::Diagram { .. } => self.render_with_engine(block).await,
            Block::Image { url, alt } => render_image(url, alt.as_deref()),
            Block::Html { html } => format!("<div class=\"block html\">{}</div>", sanitize(html)),
            Block::Unknown { raw } => {
                let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
                format!("<pre class=\"block unknown\">{}</pre>", escape_text(&pretty))
            }
        }
    }

    /// Mount `block` into `container`. The render is awaited before this
    /// returns, so awaiting mounts one after another preserves block order.
    pub async fn mount(&self, block: &Block, container: &mut dyn BlockContainer) {
        let html = self.render(block).await;
        container.push_fragment(html);
    }

    pub async fn mount_all(&self, blocks: &[Block], container: &mut dyn BlockContainer) {
        for block in blocks {
            self.mount(block, container).await;
        }
    }

    async fn render_with_engine(&self, block: &Block) -> String {
        let kind = block.kind();
        let rendered = async {
            let engine = self.engines.engine_for(kind).await?;
            engine.render(block).await
        }
        .await;
        rendered.unwrap_or_else(|error: RenderError| {
            tracing::warn!(kind, %error, "block render failed");
            render_error_placeholder(kind, &error)
        })
    }
}

fn render_table(columns: &[String], rows: &[Vec<serde_json::Value>]) -> String {
    let mut html = String::from("<div class=\"block table\"><table class=\"ai-table\"><thead><tr>");
    for column in columns {
        html.push_str("<th>");
        html.push_str(&escape_text(column));
        html.push_str("</th>");
    }
    html.push_str("</tr></thead><tbody>");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(&escape_text(&cell_text(cell)));
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table></div>");
    html
}

fn render_caption(text: &str) -> String {
    format!(
        "<div class=\"block caption\"><p><b>{}</b></p></div>",
        escape_text(text.trim())
    )
}

fn render_image(url: &str, alt: Option<&str>) -> String {
    let alt = alt.unwrap_or_default();
    let src = if has_blocked_scheme(url) {
        String::new()
    } else {
        format!(" src=\"{}\"", escape_attr(url))
    };
    let mut html = format!(
        "<figure class=\"block image\"><img{src} alt=\"{}\" loading=\"lazy\">",
        escape_attr(alt)
    );
    if !alt.is_empty() {
        html.push_str(&format!("<figcaption>{}</figcaption>", escape_text(alt)));
    }
    html.push_str("</figure>");
    html
}

fn render_error_placeholder(kind: &str, error: &RenderError) -> String {
    let label = match kind {
        "chart" => "Chart",
        "diagram" => "Diagram",
        "animation" => "Animation",
        _ => "Block",
    };
    format!(
        "<div class=\"block {kind} render-error\" role=\"alert\">{label} render error: {}</div>",
        escape_text(&error.to_string())
    )
}
