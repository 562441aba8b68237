//! Small, bounded Markdown dialect for assistant text.
//!
//! Supported: fenced code, `#`..`###` headings, `- ` lists, `**bold**`,
//! `*italic*`, `` `code` ``, `[text](http(s)://…)` links, pipe tables with a
//! separator row, and paragraphs. Everything else is literal text. The output
//! never contains markup that did not come from one of these rules.

use crate::html::{escape_attr, escape_text};

const FENCE: &str = "```";
const BLOCK_OPEN: char = '\u{E000}';
const BLOCK_CLOSE: char = '\u{E001}';
const INLINE_OPEN: char = '\u{E002}';
const INLINE_CLOSE: char = '\u{E003}';

struct FencedCode {
    lang: Option<String>,
    body: String,
}

/// Render Markdown source to an HTML fragment. Empty input renders as "".
pub fn render(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }

    let cleaned: String = text
        .replace("\r\n", "\n")
        .chars()
        .filter(|&c| !matches!(c, BLOCK_OPEN | BLOCK_CLOSE | INLINE_OPEN | INLINE_CLOSE))
        .collect();

    // Code is lifted out before escaping and escaped on restore, so its
    // content is escaped exactly once and no later rule can touch it.
    let (without_code, fences) = extract_fences(&cleaned);
    let escaped = escape_text(&without_code);
    let html = render_blocks(&escaped);
    restore_fences(&html, &fences)
}

fn extract_fences(text: &str) -> (String, Vec<FencedCode>) {
    let mut out = String::with_capacity(text.len());
    let mut fences = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let Some(close) = after_open.find(FENCE) else {
            break;
        };

        let inner = &after_open[..close];
        let (lang, body) = match inner.split_once('\n') {
            Some((first, body)) if is_language_tag(first.trim()) => {
                (Some(first.trim().to_string()), body)
            }
            Some((first, body)) if first.trim().is_empty() => (None, body),
            _ => (None, inner),
        };

        out.push_str(&rest[..open]);
        out.push('\n');
        out.push(BLOCK_OPEN);
        out.push_str(&fences.len().to_string());
        out.push(BLOCK_CLOSE);
        out.push('\n');
        fences.push(FencedCode {
            lang,
            body: body.strip_suffix('\n').unwrap_or(body).to_string(),
        });
        rest = &after_open[close + FENCE.len()..];
    }

    out.push_str(rest);
    (out, fences)
}

fn is_language_tag(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= 32
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '#' | '_' | '.'))
}

fn restore_fences(html: &str, fences: &[FencedCode]) -> String {
    let mut out = html.to_string();
    for (index, fence) in fences.iter().enumerate() {
        let marker = format!("{BLOCK_OPEN}{index}{BLOCK_CLOSE}");
        let class = fence
            .lang
            .as_deref()
            .map(|lang| format!(" class=\"language-{}\"", escape_attr(lang)))
            .unwrap_or_default();
        let rendered = format!(
            "<pre><code{class}>{}</code></pre>",
            escape_text(&fence.body)
        );
        out = out.replacen(&marker, &rendered, 1);
    }
    out
}

fn is_block_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed
        .strip_prefix(BLOCK_OPEN)
        .and_then(|rest| rest.strip_suffix(BLOCK_CLOSE))
        .is_some_and(|index| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()))
}

fn heading(line: &str) -> Option<(u8, &str)> {
    // Most specific first so "### x" never renders as an h1 of "## x".
    [("### ", 3), ("## ", 2), ("# ", 1)]
        .into_iter()
        .find_map(|(prefix, level)| line.strip_prefix(prefix).map(|rest| (level, rest)))
}

fn render_blocks(escaped: &str) -> String {
    let lines: Vec<&str> = escaped.split('\n').collect();
    let mut out = String::with_capacity(escaped.len() + 64);
    let mut paragraph: Vec<&str> = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];

        if line.trim().is_empty() {
            flush_paragraph(&mut paragraph, &mut out);
            index += 1;
            continue;
        }

        if is_block_marker(line) {
            flush_paragraph(&mut paragraph, &mut out);
            out.push_str(line.trim());
            index += 1;
            continue;
        }

        if let Some((level, content)) = heading(line) {
            flush_paragraph(&mut paragraph, &mut out);
            out.push_str(&format!(
                "<h{level}>{}</h{level}>",
                render_inline(content.trim())
            ));
            index += 1;
            continue;
        }

        if line.starts_with("- ") {
            flush_paragraph(&mut paragraph, &mut out);
            out.push_str("<ul>");
            while let Some(item) = lines.get(index).and_then(|l| l.strip_prefix("- ")) {
                out.push_str(&format!("<li>{}</li>", render_inline(item.trim())));
                index += 1;
            }
            out.push_str("</ul>");
            continue;
        }

        if let Some(consumed) = try_table(&lines[index..], &mut out, &mut paragraph) {
            index += consumed;
            continue;
        }

        paragraph.push(line);
        index += 1;
    }

    flush_paragraph(&mut paragraph, &mut out);
    out
}

fn flush_paragraph(paragraph: &mut Vec<&str>, out: &mut String) {
    if paragraph.is_empty() {
        return;
    }
    let body = paragraph
        .iter()
        .map(|line| render_inline(line))
        .collect::<Vec<_>>()
        .join("<br/>");
    out.push_str("<p>");
    out.push_str(&body);
    out.push_str("</p>");
    paragraph.clear();
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_separator_cell(cell: &str) -> bool {
    let body = cell.strip_prefix(':').unwrap_or(cell);
    let body = body.strip_suffix(':').unwrap_or(body);
    !body.is_empty() && body.chars().all(|c| c == '-')
}

/// A pipe block is a table only when its second line is a separator row with
/// one dashed cell per header column.
fn is_separator_row(line: &str, columns: usize) -> bool {
    let cells = split_row(line);
    cells.len() == columns && cells.iter().all(|cell| is_separator_cell(cell))
}

fn try_table<'a>(
    lines: &[&'a str],
    out: &mut String,
    paragraph: &mut Vec<&'a str>,
) -> Option<usize> {
    let header = *lines.first()?;
    if !header.contains('|') {
        return None;
    }
    let columns = split_row(header);
    let separator = lines.get(1)?;
    if !is_separator_row(separator, columns.len()) {
        return None;
    }

    flush_paragraph(paragraph, out);
    out.push_str("<table><thead><tr>");
    for cell in &columns {
        out.push_str(&format!("<th>{}</th>", render_inline(cell)));
    }
    out.push_str("</tr></thead><tbody>");

    let mut consumed = 2;
    for line in &lines[2..] {
        if line.trim().is_empty() || !line.contains('|') {
            break;
        }
        out.push_str("<tr>");
        let cells = split_row(line);
        for column in 0..columns.len() {
            let cell = cells.get(column).map(String::as_str).unwrap_or_default();
            out.push_str(&format!("<td>{}</td>", render_inline(cell)));
        }
        out.push_str("</tr>");
        consumed += 1;
    }
    out.push_str("</tbody></table>");
    Some(consumed)
}

/// Inline rules over already-escaped text.
fn render_inline(text: &str) -> String {
    let mut protected: Vec<String> = Vec::new();
    let with_code = replace_code_spans(text, &mut protected);
    let with_links = replace_links(&with_code, &mut protected);
    let emphasized = replace_emphasis(&with_links);
    restore_inline(&emphasized, &protected)
}

fn protect(html: String, protected: &mut Vec<String>) -> String {
    let marker = format!("{INLINE_OPEN}{}{INLINE_CLOSE}", protected.len());
    protected.push(html);
    marker
}

fn restore_inline(text: &str, protected: &[String]) -> String {
    let mut out = text.to_string();
    // Link text may itself hold protected code spans, so restore newest first.
    for (index, html) in protected.iter().enumerate().rev() {
        let marker = format!("{INLINE_OPEN}{index}{INLINE_CLOSE}");
        out = out.replacen(&marker, html, 1);
    }
    out
}

fn replace_code_spans(text: &str, protected: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('`') {
        let after = &rest[open + 1..];
        match after.find('`') {
            Some(close) if close > 0 => {
                out.push_str(&rest[..open]);
                let html = format!("<code>{}</code>", &after[..close]);
                out.push_str(&protect(html, protected));
                rest = &after[close + 1..];
            }
            _ => {
                out.push_str(&rest[..open + 1]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_safe_link_target(url: &str) -> bool {
    let host_and_path = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    host_and_path.is_some_and(|rest| !rest.is_empty())
        && !url
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '<' | '>'))
}

fn replace_links(text: &str, protected: &mut Vec<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let parsed = after.find("](").and_then(|mid| {
            let label = &after[..mid];
            let target_start = &after[mid + 2..];
            let close = target_start.find(')')?;
            let url = &target_start[..close];
            let valid = !label.is_empty() && !label.contains('[') && is_safe_link_target(url);
            valid.then(|| (label, url, mid + 2 + close + 1))
        });

        match parsed {
            Some((label, url, consumed)) => {
                out.push_str(&rest[..open]);
                let html = format!(
                    "<a href=\"{url}\" target=\"_blank\" rel=\"nofollow noopener\">{}</a>",
                    replace_emphasis(label)
                );
                out.push_str(&protect(html, protected));
                rest = &after[consumed..];
            }
            None => {
                out.push_str(&rest[..open + 1]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn replace_emphasis(text: &str) -> String {
    // Longest delimiter first: the shorter rules would otherwise split `***x***`.
    let both = replace_delimited(text, "***", "<b><i>", "</i></b>");
    let bold = replace_delimited(&both, "**", "<b>", "</b>");
    replace_delimited(&bold, "*", "<i>", "</i>")
}

// Input is escaped, so any tag present was emitted by an earlier pass. A span
// may only wrap complete elements.
fn is_balanced(inner: &str) -> bool {
    ["b", "i"].iter().all(|tag| {
        inner.matches(&format!("<{tag}>")).count() == inner.matches(&format!("</{tag}>")).count()
    })
}

fn replace_delimited(text: &str, delimiter: &str, open_tag: &str, close_tag: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(delimiter) {
        let after = &rest[open + delimiter.len()..];
        let close = after.find(delimiter).filter(|close| {
            let inner = &after[..*close];
            !inner.is_empty()
                && !inner.starts_with(char::is_whitespace)
                && !inner.ends_with(char::is_whitespace)
                && is_balanced(inner)
        });
        match close {
            Some(close) => {
                out.push_str(&rest[..open]);
                out.push_str(open_tag);
                out.push_str(&after[..close]);
                out.push_str(close_tag);
                rest = &after[close + delimiter.len()..];
            }
            None => {
                out.push_str(&rest[..open + delimiter.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
