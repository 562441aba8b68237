pub mod parse;
mod sanitize;

pub use sanitize::{has_blocked_scheme, sanitize, ALLOWED_ATTRS, ALLOWED_TAGS};

use parse::{parse_fragment, Node};

/// Escape the three HTML metacharacters.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape for a double-quoted attribute value.
pub fn escape_attr(text: &str) -> String {
    escape_text(text).replace('"', "&quot;")
}

/// Decode the named entities a model realistically emits plus numeric references.
/// Unknown entities are left untouched.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];
        match candidate.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&candidate[..end]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &candidate[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = candidate;
                }
            },
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    let named = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let numeric = name.strip_prefix('#')?;
    let code = match numeric.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => numeric.parse::<u32>().ok()?,
    };
    char::from_u32(code).filter(|ch| *ch != '\0')
}

const BLOCK_TAGS: &[&str] = &[
    "div",
    "p",
    "ul",
    "ol",
    "li",
    "pre",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "table",
    "tr",
    "figure",
    "figcaption",
    "br",
];

/// Project markup onto readable plain text: block elements break lines, list
/// items get a bullet, table cells are separated by `" | "`.
pub fn to_plain_text(html: &str) -> String {
    let mut out = String::new();
    write_plain(&parse_fragment(html), &mut out);
    let mut lines: Vec<&str> = Vec::new();
    for line in out.lines().map(str::trim_end) {
        if line.trim().is_empty() && lines.last().map_or(true, |last| last.trim().is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|last| last.trim().is_empty()) {
        lines.pop();
    }
    lines.join("\n")
}

fn write_plain(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                if element.is_raw_text() {
                    continue;
                }
                let name = element.name.as_str();
                let block = BLOCK_TAGS.contains(&name);
                if block && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                match name {
                    "li" => out.push_str("• "),
                    "td" | "th" if !out.is_empty() && !out.ends_with('\n') => out.push_str(" | "),
                    "img" => {
                        if let Some((_, alt)) = element.attrs.iter().find(|(key, _)| key == "alt") {
                            out.push_str(&format!("[image: {alt}]"));
                        }
                    }
                    _ => {}
                }
                write_plain(&element.children, out);
                if block && !out.ends_with('\n') {
                    out.push('\n');
                }
                if matches!(name, "p" | "table" | "pre" | "ul" | "ol") {
                    out.push('\n');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text_handles_metacharacters_once() {
        assert_eq!(escape_text("a & b < c > d"), "a &amp; b &lt; c &gt; d");
        assert_eq!(escape_attr("say \"hi\""), "say &quot;hi&quot;");
    }

    #[test]
    fn test_decode_entities_named_numeric_and_unknown() {
        assert_eq!(decode_entities("&lt;b&gt; &amp; &#65;&#x42;"), "<b> & AB");
        assert_eq!(decode_entities("fish &chips; AT&T"), "fish &chips; AT&T");
        assert_eq!(decode_entities("&#0;"), "&#0;");
    }

    #[test]
    fn test_plain_text_projection() {
        let text = to_plain_text(
            "<h1>Title</h1><p>one<br/>two</p><ul><li>a</li><li>b</li></ul>\
             <table><tr><th>x</th><th>y</th></tr></table>",
        );
        assert_eq!(text, "Title\none\ntwo\n\n• a\n• b\n\nx | y");
    }
}
