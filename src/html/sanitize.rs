use super::parse::{parse_fragment, Element, Node};
use super::{escape_attr, escape_text};

/// Tags that survive sanitization.
pub const ALLOWED_TAGS: &[&str] = &[
    "div",
    "span",
    "p",
    "b",
    "i",
    "strong",
    "em",
    "br",
    "ul",
    "ol",
    "li",
    "code",
    "pre",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "table",
    "caption",
    "thead",
    "tbody",
    "tfoot",
    "tr",
    "th",
    "td",
    "figure",
    "img",
    "figcaption",
    "a",
];

/// Attributes that survive on allowed tags.
pub const ALLOWED_ATTRS: &[&str] = &[
    "class",
    "role",
    "style",
    "href",
    "target",
    "rel",
    "src",
    "alt",
    "aria-label",
    "aria-live",
    "aria-role",
];

const BLOCKED_SCHEMES: &[&str] = &["javascript:", "vbscript:", "data:", "livescript:"];
const BLOCKED_STYLE_FRAGMENTS: &[&str] = &["javascript:", "expression(", "behavior:", "-moz-binding"];

/// Elements whose body is program text rather than inline content; dropping
/// them does not lose anything a reader would see.
const OPAQUE_TAGS: &[&str] = &["script", "style"];

/// Reduce arbitrary markup to the allow-listed tag and attribute set.
///
/// A disallowed element is replaced by its text content, so its inline text
/// stays visible while its structure goes away.
pub fn sanitize(html: &str) -> String {
    let nodes = parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    write_nodes(&nodes, &mut out);
    out
}

fn write_nodes(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(element) => write_element(element, out),
        }
    }
}

fn write_element(element: &Element, out: &mut String) {
    if !ALLOWED_TAGS.contains(&element.name.as_str()) {
        if !OPAQUE_TAGS.contains(&element.name.as_str()) {
            out.push_str(&escape_text(&element.text_content()));
        }
        return;
    }

    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attrs {
        if !attribute_allowed(name, value) {
            continue;
        }
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    out.push('>');

    if element.is_void() {
        return;
    }
    write_nodes(&element.children, out);
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn attribute_allowed(name: &str, value: &str) -> bool {
    if !ALLOWED_ATTRS.contains(&name) {
        return false;
    }
    match name {
        "href" | "src" => !has_blocked_scheme(value),
        "style" => {
            let lowered = compact_lower(value);
            !BLOCKED_STYLE_FRAGMENTS
                .iter()
                .any(|fragment| lowered.contains(fragment))
        }
        _ => true,
    }
}

/// True when a URL would execute script or embed inline data once followed.
pub fn has_blocked_scheme(url: &str) -> bool {
    let compact = compact_lower(url);
    BLOCKED_SCHEMES
        .iter()
        .any(|scheme| compact.starts_with(scheme))
}

// Browsers ignore whitespace and control characters inside a scheme
// ("java\tscript:"), so compare with those removed.
fn compact_lower(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect()
}
