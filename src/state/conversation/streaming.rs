use super::state::FALLBACK_ERROR_NOTICE;
use crate::types::{Block, Message};
use aho_corasick::AhoCorasick;

/// Raw structural markup that narration text may not carry.
const MARKUP_MARKERS: &[&str] = &[
    "<style",
    "</style",
    "<table",
    "</table",
    "role=\"table\"",
    "role='table'",
    "role=table",
];

pub(crate) struct MarkupFilter {
    matcher: Option<AhoCorasick>,
}

impl MarkupFilter {
    pub(crate) fn new() -> Self {
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(MARKUP_MARKERS)
            .map_err(|error| tracing::warn!(%error, "markup matcher unavailable, using plain search"))
            .ok();
        Self { matcher }
    }

    /// True when the token carries none of the markers.
    pub(crate) fn allows(&self, token: &str) -> bool {
        match &self.matcher {
            Some(matcher) => !matcher.is_match(token),
            None => {
                let lowered = token.to_ascii_lowercase();
                !MARKUP_MARKERS.iter().any(|marker| lowered.contains(marker))
            }
        }
    }
}

/// Per-request buffer of text and blocks before finalization.
#[derive(Debug, Default)]
pub(super) struct TurnAccumulator {
    pub(super) text: String,
    pending: Vec<String>,
    tool_blocks: Vec<Block>,
    terminal_blocks: Option<Vec<Block>>,
}

impl TurnAccumulator {
    pub(super) fn push_chunk(&mut self, chunk: &str) {
        self.pending.push(chunk.to_string());
    }

    /// Move buffered chunks into the text. Returns true if anything moved.
    pub(super) fn fold_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        for chunk in self.pending.drain(..) {
            self.text.push_str(&chunk);
        }
        true
    }

    pub(super) fn push_tool_block(&mut self, block: Block) {
        self.tool_blocks.push(block);
    }

    /// Authoritative text from a terminal event.
    pub(super) fn replace_text(&mut self, text: String) {
        self.pending.clear();
        self.text = text;
    }

    /// Blocks from a terminal event override everything collected so far.
    pub(super) fn replace_with_blocks(&mut self, blocks: Vec<Block>) {
        self.pending.clear();
        self.text.clear();
        self.tool_blocks.clear();
        self.terminal_blocks = Some(blocks);
    }

    pub(super) fn is_block_structured(&self) -> bool {
        !self.tool_blocks.is_empty() || self.terminal_blocks.is_some()
    }

    pub(super) fn is_empty(&self) -> bool {
        self.text.is_empty() && self.pending.is_empty() && !self.is_block_structured()
    }

    /// Build the one assistant message this turn persists.
    pub(super) fn into_message(mut self, failed: bool) -> Message {
        self.fold_pending();
        if self.is_block_structured() {
            let mut blocks = Vec::with_capacity(self.tool_blocks.len() + 1);
            if !self.text.trim().is_empty() {
                blocks.push(Block::Text { content: self.text });
            }
            blocks.append(&mut self.tool_blocks);
            blocks.extend(self.terminal_blocks.unwrap_or_default());
            return Message::assistant_blocks(blocks);
        }
        if failed && self.text.is_empty() {
            return Message::assistant_text(FALLBACK_ERROR_NOTICE);
        }
        Message::assistant_text(self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markup_filter_is_case_insensitive() {
        let filter = MarkupFilter::new();
        assert!(filter.allows("Here is the table you asked for:"));
        assert!(!filter.allows("<TABLE class=x>"));
        assert!(!filter.allows("<div role=\"table\">"));
        assert!(!filter.allows("</Style>"));
    }

    #[test]
    fn test_text_only_turn() {
        let mut acc = TurnAccumulator::default();
        acc.push_chunk("Hel");
        acc.push_chunk("lo");
        assert_eq!(acc.into_message(false), Message::assistant_text("Hello"));
    }

    #[test]
    fn test_failure_without_content_uses_fallback_notice() {
        let acc = TurnAccumulator::default();
        assert_eq!(
            acc.into_message(true),
            Message::assistant_text(FALLBACK_ERROR_NOTICE)
        );
    }

    #[test]
    fn test_failure_keeps_partial_text() {
        let mut acc = TurnAccumulator::default();
        acc.push_chunk("partial");
        assert_eq!(acc.into_message(true), Message::assistant_text("partial"));
    }

    #[test]
    fn test_block_order_is_text_then_tools_then_terminal() {
        let mut acc = TurnAccumulator::default();
        acc.push_chunk("intro");
        acc.fold_pending();
        acc.push_tool_block(Block::Diagram {
            code: "graph TD".to_string(),
        });
        let message = acc.into_message(false);
        assert_eq!(
            message.blocks().unwrap(),
            &[
                Block::Text {
                    content: "intro".to_string()
                },
                Block::Diagram {
                    code: "graph TD".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_terminal_blocks_override_earlier_content() {
        let mut acc = TurnAccumulator::default();
        acc.push_chunk("draft");
        acc.push_tool_block(Block::Html {
            html: "<p>x</p>".to_string(),
        });
        acc.replace_with_blocks(vec![Block::Image {
            url: "http://x/i.png".to_string(),
            alt: None,
        }]);
        let message = acc.into_message(false);
        assert_eq!(message.blocks().unwrap().len(), 1);
        assert_eq!(message.blocks().unwrap()[0].kind(), "image");
    }

    #[test]
    fn test_replace_text_drops_pending_chunks() {
        let mut acc = TurnAccumulator::default();
        acc.push_chunk("stale");
        acc.replace_text("final".to_string());
        assert_eq!(acc.into_message(false), Message::assistant_text("final"));
    }
}
