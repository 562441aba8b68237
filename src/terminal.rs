use crate::blocks::BlockContainer;
use crate::html;
use crate::state::LiveView;
use crate::types::Message;
use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use std::io::{self, Stdout, Write};
use unicode_width::UnicodeWidthChar;

const FALLBACK_WIDTH: usize = 80;
const THINKING_LINE: &str = "…";

/// Draws one streaming assistant message in place below the cursor.
///
/// Markup is projected to plain text. Every redraw moves back over the rows
/// the previous draw used and repaints from there.
pub struct TerminalView<W: Write + Send> {
    out: W,
    width: usize,
    thinking: bool,
    text: String,
    fragments: Vec<String>,
    rows_drawn: usize,
}

impl TerminalView<Stdout> {
    pub fn stdout() -> Self {
        let width = terminal::size()
            .map(|(cols, _)| usize::from(cols))
            .unwrap_or(FALLBACK_WIDTH);
        Self::new(io::stdout(), width)
    }
}

impl<W: Write + Send> TerminalView<W> {
    pub fn new(out: W, width: usize) -> Self {
        Self {
            out,
            width: width.max(1),
            thinking: false,
            text: String::new(),
            fragments: Vec::new(),
            rows_drawn: 0,
        }
    }

    pub fn rows_drawn(&self) -> usize {
        self.rows_drawn
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn lines(&self) -> Vec<&str> {
        if self.thinking {
            return vec![THINKING_LINE];
        }
        let mut lines: Vec<&str> = Vec::new();
        for section in std::iter::once(&self.text).chain(self.fragments.iter()) {
            if section.is_empty() {
                continue;
            }
            if !lines.is_empty() {
                lines.push("");
            }
            lines.extend(section.lines());
        }
        lines
    }

    fn redraw(&mut self) {
        if let Err(error) = self.try_redraw() {
            tracing::debug!(%error, "terminal redraw failed");
        }
    }

    fn try_redraw(&mut self) -> io::Result<()> {
        if self.rows_drawn > 0 {
            let up = u16::try_from(self.rows_drawn).unwrap_or(u16::MAX);
            queue!(self.out, MoveUp(up))?;
        }
        queue!(self.out, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;

        let lines: Vec<String> = self.lines().into_iter().map(str::to_string).collect();
        let mut rows = 0;
        for line in &lines {
            queue!(self.out, Print(line), Print("\r\n"))?;
            rows += display_rows(line, self.width);
        }
        self.rows_drawn = rows;
        self.out.flush()
    }
}

impl<W: Write + Send> BlockContainer for TerminalView<W> {
    fn push_fragment(&mut self, html: String) {
        self.thinking = false;
        self.fragments.push(html::to_plain_text(&html));
        self.redraw();
    }
}

impl<W: Write + Send> LiveView for TerminalView<W> {
    fn show_thinking(&mut self) {
        self.thinking = true;
        self.redraw();
    }

    fn render_text(&mut self, html: &str) {
        self.thinking = false;
        self.text = html::to_plain_text(html);
        self.redraw();
    }

    fn replace_blocks(&mut self, fragments: Vec<String>) {
        self.thinking = false;
        self.fragments = fragments
            .iter()
            .map(|fragment| html::to_plain_text(fragment))
            .collect();
        self.redraw();
    }

    fn finish(&mut self, _message: &Message) {
        self.thinking = false;
        self.redraw();
        // Leave the finished message on screen; the next draw starts below it.
        self.rows_drawn = 0;
    }
}

/// Terminal rows `line` occupies when wrapped at `width` columns.
pub fn display_rows(line: &str, width: usize) -> usize {
    let width = width.max(1);
    let mut rows = 1;
    let mut col = 0;
    for ch in line.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if col + ch_width > width && col > 0 {
            rows += 1;
            col = 0;
        }
        col += ch_width;
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(view: TerminalView<Vec<u8>>) -> String {
        String::from_utf8(view.into_inner()).unwrap()
    }

    #[test]
    fn test_display_rows_wraps_by_display_width() {
        assert_eq!(display_rows("", 10), 1);
        assert_eq!(display_rows("abcdef", 3), 2);
        assert_eq!(display_rows("abcdefg", 3), 3);
        assert_eq!(display_rows("日本語", 4), 2);
    }

    #[test]
    fn test_redraw_moves_back_over_previous_rows() {
        let mut view = TerminalView::new(Vec::new(), 40);
        view.render_text("<p>Hello</p>");
        assert_eq!(view.rows_drawn(), 1);

        view.render_text("<p>Hello</p><p>world</p>");
        assert_eq!(view.rows_drawn(), 3);

        let text = output(view);
        assert!(text.contains("Hello\r\n"));
        assert!(text.contains("\x1b[1A"));
        assert!(text.contains("world\r\n"));
    }

    #[test]
    fn test_fragments_draw_below_text_as_plain_text() {
        let mut view = TerminalView::new(Vec::new(), 40);
        view.show_thinking();
        view.render_text("<p>Intro</p>");
        view.push_fragment(
            "<div class=\"block table\"><table><tr><th>x</th><th>y</th></tr></table></div>"
                .to_string(),
        );
        view.finish(&Message::assistant_text("Intro"));
        assert_eq!(view.rows_drawn(), 0);

        let text = output(view);
        assert!(text.contains(THINKING_LINE));
        assert!(text.contains("Intro\r\n\r\nx | y\r\n"));
    }
}
