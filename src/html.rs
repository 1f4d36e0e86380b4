//! HTML escaping and the code highlighter used for displayed snippets.
//!
//! Highlighting works on text that has already been escaped: [`encode`]
//! turns `;` into `&semi;` as well as the usual entities, so the patterns
//! below can anchor on `&semi;`, `&lt;`, `&gt;` and `&quot;` without ever
//! matching markup produced by an earlier pass.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// `  property: value;` at the start of a line.
static CSS_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^(\s+[a-z0-9-]+:)(.+?)&semi;").expect("CSS property pattern is valid")
});

/// `/* ... */`, possibly spanning lines.
static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment pattern is valid"));

/// Tag name right after an escaped `<`.
static OPEN_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&lt;([a-z0-9_-]+)").expect("open tag pattern is valid"));

/// Tag name right before an escaped `>`.
static CLOSE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([a-z0-9_-]+)&gt;").expect("close tag pattern is valid"));

/// `name=&quot;value&quot;` attribute pairs.
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([a-z0-9_-]+)=(&quot;.*?&quot;)").expect("attribute pattern is valid")
});

/// Escape `& < > ' " ;` as entities.
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            ';' => out.push_str("&semi;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap tag names that follow `&lt;` and are themselves followed by
/// whitespace or `&gt;`.
fn highlight_open_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in OPEN_TAG.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let rest = &text[whole.end()..];
        let at_boundary =
            rest.starts_with("&gt;") || rest.chars().next().is_some_and(char::is_whitespace);
        if !at_boundary {
            continue;
        }
        out.push_str(&text[last..whole.start()]);
        out.push_str("&lt;<span class=\"tag-name\">");
        out.push_str(&caps[1]);
        out.push_str("</span>");
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Escape `code` and mark up CSS properties, comments, tag names and
/// attributes with `<span>`s.
///
/// The passes run in a fixed order and each one sees the output of the
/// previous one.  A missing snippet renders as the empty string.
pub fn highlight(code: Option<&str>) -> String {
    let Some(code) = code else {
        return String::new();
    };
    let escaped = encode(code);

    let text = CSS_PROPERTY.replace_all(&escaped, |caps: &Captures| {
        format!(
            "<span class=\"css-property\">{}</span><span class=\"css-property-value\">{}</span>&semi;",
            &caps[1], &caps[2]
        )
    });
    let text = COMMENT.replace_all(&text, |caps: &Captures| {
        format!("<span class=\"comment\">{}</span>", &caps[0])
    });
    let text = highlight_open_tags(&text);
    let text = CLOSE_TAG.replace_all(&text, |caps: &Captures| {
        format!("<span class=\"tag-name\">{}</span>&gt;", &caps[1])
    });
    let text = ATTRIBUTE.replace_all(&text, |caps: &Captures| {
        format!(
            "<span class=\"attribute-name\">{}</span>=<span class=\"attribute-value\">{}</span>",
            &caps[1], &caps[2]
        )
    });
    text.into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
