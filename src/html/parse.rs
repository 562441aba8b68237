//! Tolerant HTML fragment parser producing a detached node tree.
//!
//! It accepts whatever a remote model emits: unclosed elements are closed at
//! the end of input, stray end tags are ignored, comments and doctypes are
//! dropped. `script` and `style` contents are read as raw text.

use super::decode_entities;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title", "xmp"];

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    pub fn is_void(&self) -> bool {
        is_void(&self.name)
    }

    pub fn is_raw_text(&self) -> bool {
        RAW_TEXT_ELEMENTS.contains(&self.name.as_str())
    }

    /// Concatenated text of all descendants, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
        }
    }
}

/// Parse a fragment into its top-level nodes.
pub fn parse_fragment(input: &str) -> Vec<Node> {
    let mut builder = TreeBuilder::default();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(lt) = rest.find('<') else {
            builder.text(rest);
            break;
        };
        if lt > 0 {
            builder.text(&rest[..lt]);
            rest = &rest[lt..];
        }

        let after = &rest[1..];
        if let Some(comment) = after.strip_prefix("!--") {
            rest = match comment.find("-->") {
                Some(end) => &comment[end + 3..],
                None => "",
            };
        } else if after.starts_with('!') || after.starts_with('?') {
            rest = match after.find('>') {
                Some(end) => &after[end + 1..],
                None => "",
            };
        } else if let Some(closing) = after.strip_prefix('/') {
            match read_name(closing) {
                Some((name, tail)) => {
                    builder.close(&name);
                    rest = match tail.find('>') {
                        Some(end) => &tail[end + 1..],
                        None => "",
                    };
                }
                None => {
                    builder.text("</");
                    rest = closing;
                }
            }
        } else {
            match read_start_tag(after) {
                Some((tag, tail)) => {
                    let raw_text = RAW_TEXT_ELEMENTS.contains(&tag.name.as_str());
                    let name = tag.name.clone();
                    let self_closing = tag.self_closing;
                    builder.open(tag);
                    rest = tail;
                    if raw_text && !self_closing {
                        let (body, tail) = split_raw_text(rest, &name);
                        builder.text(body);
                        builder.close(&name);
                        rest = tail;
                    }
                }
                None => {
                    builder.text("<");
                    rest = after;
                }
            }
        }
    }

    builder.finish()
}

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

#[derive(Default)]
struct TreeBuilder {
    roots: Vec<Node>,
    stack: Vec<Element>,
}

impl TreeBuilder {
    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.roots.push(node),
        }
    }

    fn text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let decoded = decode_entities(raw);
        let siblings = match self.stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        if let Some(Node::Text(previous)) = siblings.last_mut() {
            previous.push_str(&decoded);
        } else {
            siblings.push(Node::Text(decoded));
        }
    }

    fn open(&mut self, tag: StartTag) {
        let element = Element::new(tag.name, tag.attrs);
        if tag.self_closing || element.is_void() {
            self.push_node(Node::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    fn close(&mut self, name: &str) {
        if !self.stack.iter().any(|element| element.name == name) {
            return;
        }
        while let Some(element) = self.stack.pop() {
            let matched = element.name == name;
            self.push_node(Node::Element(element));
            if matched {
                break;
            }
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while let Some(element) = self.stack.pop() {
            self.push_node(Node::Element(element));
        }
        self.roots
    }
}

fn read_name(input: &str) -> Option<(String, &str)> {
    let first = input.chars().next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    let end = input
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_'))
        .unwrap_or(input.len());
    Some((input[..end].to_ascii_lowercase(), &input[end..]))
}

fn read_start_tag(input: &str) -> Option<(StartTag, &str)> {
    let (name, mut rest) = read_name(input)?;
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        if let Some(tail) = rest.strip_prefix("/>") {
            self_closing = true;
            rest = tail;
            break;
        }
        if let Some(tail) = rest.strip_prefix('>') {
            rest = tail;
            break;
        }
        if let Some(tail) = rest.strip_prefix('/') {
            rest = tail;
            continue;
        }

        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=' || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let attr_name = rest[..name_end].to_ascii_lowercase();
        rest = rest[name_end..].trim_start();
        if name_end == 0 {
            // Lone quote or similar junk; skip one char so parsing always advances.
            let skip = rest.chars().next().map_or(0, char::len_utf8);
            rest = &rest[skip..];
            continue;
        }

        let mut value = String::new();
        if let Some(tail) = rest.strip_prefix('=') {
            let tail = tail.trim_start();
            let (raw, after) = read_attr_value(tail);
            value = decode_entities(raw);
            rest = after;
        }
        if !attrs.iter().any(|(existing, _)| existing == &attr_name) {
            attrs.push((attr_name, value));
        }
    }

    Some((
        StartTag {
            name,
            attrs,
            self_closing,
        },
        rest,
    ))
}

fn read_attr_value(input: &str) -> (&str, &str) {
    match input.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = &input[1..];
            match body.find(quote) {
                Some(end) => (&body[..end], &body[end + 1..]),
                None => (body, ""),
            }
        }
        _ => {
            let end = input
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(input.len());
            (&input[..end], &input[end..])
        }
    }
}

fn split_raw_text<'a>(input: &'a str, name: &str) -> (&'a str, &'a str) {
    let lower = input.to_ascii_lowercase();
    let needle = format!("</{name}");
    match lower.find(&needle) {
        Some(start) => {
            let after = &input[start..];
            match after.find('>') {
                Some(end) => (&input[..start], &after[end + 1..]),
                None => (&input[..start], ""),
            }
        }
        None => (input, ""),
    }
}
