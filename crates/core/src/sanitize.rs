//! Chapter HTML → well-formed XHTML body fragment.
//!
//! The editor hands over browser `innerHTML`. It is parsed with the HTML5
//! tree builder (via `scraper`), walked, and re-serialized as XML:
//!
//! 1. `<pre>`/`<code>` text is written as-is (no entity rewriting, no whitespace collapse).
//! 2. `script`, `style`, `link` (and other non-content elements) are dropped with their content.
//! 3. `on*`, `style` and `data-*` attributes are dropped, except the endnote link attributes.
//! 4. `h4`–`h6` become `h3`.
//! 5. `div` becomes `p`; empty and `<br>`-only paragraphs are dropped.
//! 6. Empty lists and list items are dropped.
//! 7. Void elements are self-closed.
//! 8. Named entities become numeric references (see [`crate::entities`]).
//! 9. Whitespace runs collapse; whitespace between block tags is removed.
//! 10. A final string pass strips any forbidden element that survived.
//!
//! Output is a fixed point: sanitizing sanitized output returns it unchanged.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

use crate::entities::{is_table_char, normalize_entities};
use crate::error::SanitizeError;
use crate::security::{check_chapter_size, check_nesting_depth, SecurityLimits};

/// Elements removed together with everything inside them.
const DROPPED_ELEMENTS: &[&str] = &[
    "script", "style", "link", "object", "embed", "iframe", "form", "input", "button",
    "textarea", "select", "meta", "base", "title", "template", "noscript",
];

/// Re-stripped from the serialized output as a last line.
const FORBIDDEN_ELEMENTS: &[&str] = &[
    "script", "style", "object", "embed", "iframe", "form", "input", "button",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "br", "col", "hr", "img", "source", "track", "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "details", "div", "dl", "dt",
    "figcaption", "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "nav", "ol", "p", "pre", "section", "summary", "table", "tbody",
    "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Dropped when nothing but whitespace and line breaks remain inside.
const DROP_WHEN_EMPTY: &[&str] = &["p", "ul", "ol", "li", "h1", "h2", "h3"];

/// Attributes that start with `on` but are not event handlers.
const NON_HANDLER_ATTRIBUTES: &[&str] = &["open"];

/// Extra passes allowed for the output to settle under the HTML parser.
const MAX_SETTLE_PASSES: usize = 4;

/// Namespaced attributes XHTML readers understand.
const NAMESPACED_ATTRIBUTES: &[&str] = &["epub:type", "xml:lang"];

static FORBIDDEN_SELF_CLOSING_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FORBIDDEN_ELEMENTS
        .iter()
        .map(|t| Regex::new(&format!(r"(?is)<{t}\b[^>]*/>")).expect("valid self-closing regex"))
        .collect()
});

static FORBIDDEN_PAIR_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FORBIDDEN_ELEMENTS
        .iter()
        .map(|t| Regex::new(&format!(r"(?is)<{t}\b[^>]*>.*?</{t}\s*>")).expect("valid pair regex"))
        .collect()
});

static FORBIDDEN_TAG_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    FORBIDDEN_ELEMENTS
        .iter()
        .map(|t| Regex::new(&format!(r"(?is)</?{t}\b[^>]*>")).expect("valid tag regex"))
        .collect()
});

static VOID_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(img|br|hr)\b([^>]*?)\s*/?>").expect("valid void tag regex")
});

/// Result of converting one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedChapter {
    pub xhtml: String,
    /// The full conversion failed and the fallback pass was used.
    pub degraded: bool,
}

/// Convert one chapter, falling back to the minimal pass if the full
/// conversion refuses the input. Never fails.
pub fn sanitize_chapter(html: &str, limits: &SecurityLimits) -> SanitizedChapter {
    match to_xhtml(html, limits) {
        Ok(xhtml) => SanitizedChapter {
            xhtml,
            degraded: false,
        },
        Err(e) => {
            tracing::warn!("XHTML conversion failed ({}), using fallback pass", e);
            SanitizedChapter {
                xhtml: fallback_xhtml(html),
                degraded: true,
            }
        }
    }
}

/// Full conversion. The result is re-parsed until the HTML tree builder
/// reads it back unchanged.
pub fn to_xhtml(html: &str, limits: &SecurityLimits) -> Result<String, SanitizeError> {
    check_chapter_size(html.len(), limits)?;

    let mut current = convert_once(html, limits)?;
    for _ in 0..MAX_SETTLE_PASSES {
        let next = convert_once(&current, limits)?;
        if next == current {
            return Ok(current);
        }
        current = next;
    }
    tracing::warn!("XHTML output did not settle after {} passes", MAX_SETTLE_PASSES);
    Ok(current)
}

fn convert_once(html: &str, limits: &SecurityLimits) -> Result<String, SanitizeError> {
    let normalized = normalize_entities(html);
    let fragment = Html::parse_fragment(&normalized);
    let walker = Walker { limits };

    let mut out = String::with_capacity(html.len());
    walker.write_children(fragment.root_element(), &mut out, 1, Scope::default())?;
    Ok(strip_forbidden_markup(&out))
}

/// Minimal pass: entity fix, self-closed void tags, forbidden markup removed.
pub fn fallback_xhtml(html: &str) -> String {
    let normalized = normalize_entities(html);
    let closed = VOID_TAG_RE.replace_all(&normalized, "<$1$2/>");
    strip_forbidden_markup(&closed)
}

/// Remove forbidden elements: self-closing tags first, then matched pairs
/// with their content, then any stray tag left behind.
pub fn strip_forbidden_markup(html: &str) -> String {
    let mut out = html.to_string();
    let passes = FORBIDDEN_SELF_CLOSING_RES
        .iter()
        .chain(FORBIDDEN_PAIR_RES.iter())
        .chain(FORBIDDEN_TAG_RES.iter());
    for re in passes {
        if re.is_match(&out) {
            out = re.replace_all(&out, "").into_owned();
        }
    }
    out
}

struct Walker<'l> {
    limits: &'l SecurityLimits,
}

/// What the already-open output elements allow inside them.
#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    /// Inside `pre` or `code`: text is written verbatim.
    preserve: bool,
    in_pre: bool,
    /// Inside a `code` that is not part of a `pre` block.
    in_inline_code: bool,
    in_heading: bool,
    in_paragraph: bool,
}

impl Scope {
    /// Elements the HTML parser would move out of the open element on
    /// re-reading. Their children are written in place instead.
    fn unwraps(self, tag: &str) -> bool {
        if self.in_inline_code && BLOCK_ELEMENTS.contains(&tag) {
            return true;
        }
        let breaks_heading = is_heading(tag) || tag == "li";
        (breaks_heading && (self.in_heading || self.in_paragraph)) || (tag == "p" && self.in_paragraph)
    }

    fn enter(self, tag: &str) -> Self {
        let in_pre = self.in_pre || tag == "pre";
        Self {
            preserve: self.preserve || tag == "pre" || tag == "code",
            in_pre,
            in_inline_code: self.in_inline_code || (tag == "code" && !in_pre),
            in_heading: self.in_heading || is_heading(tag),
            in_paragraph: self.in_paragraph || tag == "p",
        }
    }
}

impl Walker<'_> {
    fn write_children(
        &self,
        parent: ElementRef<'_>,
        out: &mut String,
        depth: u32,
        scope: Scope,
    ) -> Result<(), SanitizeError> {
        for child in parent.children() {
            match child.value() {
                Node::Text(text) => {
                    if scope.preserve {
                        push_text(out, text);
                        continue;
                    }
                    let mut collapsed = collapse_whitespace(text);
                    if collapsed.trim_matches(' ').is_empty() {
                        let prev_inline = child.prev_sibling().is_some_and(|n| is_inline(n.value()));
                        let next_inline = child.next_sibling().is_some_and(|n| is_inline(n.value()));
                        if !(prev_inline && next_inline) {
                            continue;
                        }
                    }
                    // Unwrapped and dropped siblings can leave two runs touching.
                    if out.ends_with(' ') && collapsed.starts_with(' ') {
                        collapsed.remove(0);
                    }
                    push_text(out, &collapsed);
                }
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.write_element(el, out, depth + 1, scope)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn write_element(
        &self,
        el: ElementRef<'_>,
        out: &mut String,
        depth: u32,
        scope: Scope,
    ) -> Result<(), SanitizeError> {
        let name = el.value().name();
        if DROPPED_ELEMENTS.contains(&name) {
            return Ok(());
        }
        check_nesting_depth(depth, self.limits)?;

        // Namespaced leftovers from word processors (`o:p`) carry no meaning.
        if name.contains(':') {
            return self.write_children(el, out, depth, scope);
        }

        let tag = match name {
            "h4" | "h5" | "h6" => "h3",
            "div" if has_block_descendant(el) => return self.write_children(el, out, depth, scope),
            "div" => "p",
            other => other,
        };
        if scope.unwraps(tag) {
            return self.write_children(el, out, depth, scope);
        }

        let attrs = filtered_attributes(el, tag);
        if VOID_ELEMENTS.contains(&tag) {
            out.push('<');
            out.push_str(tag);
            out.push_str(&attrs);
            out.push_str("/>");
            return Ok(());
        }

        let mut inner = String::new();
        self.write_children(el, &mut inner, depth, scope.enter(tag))?;

        // The HTML parser eats one newline right after `<pre>`.
        if tag == "pre" && inner.starts_with('\n') {
            inner.insert(0, '\n');
        }
        if !scope.preserve && DROP_WHEN_EMPTY.contains(&tag) && is_blank(&inner) {
            return Ok(());
        }

        out.push('<');
        out.push_str(tag);
        out.push_str(&attrs);
        out.push('>');
        out.push_str(&inner);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
        Ok(())
    }
}

/// A `div` only becomes `p` when that cannot nest a block inside the paragraph.
fn has_block_descendant(el: ElementRef<'_>) -> bool {
    el.descendants().skip(1).any(|c| match c.value() {
        Node::Element(e) => BLOCK_ELEMENTS.contains(&e.name()),
        _ => false,
    })
}

fn is_heading(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Inline content a whitespace run can sit between without being dropped.
fn is_inline(node: &Node) -> bool {
    match node {
        Node::Text(t) => t.chars().any(|c| !c.is_ascii_whitespace()),
        Node::Element(e) => {
            let name = e.name();
            !BLOCK_ELEMENTS.contains(&name)
                && !DROPPED_ELEMENTS.contains(&name)
                && !name.contains(':')
        }
        _ => false,
    }
}

fn is_blank(inner: &str) -> bool {
    inner.replace("<br/>", "").trim_matches(|c: char| c.is_ascii_whitespace()).is_empty()
}

fn keep_attribute(name: &str, value: &str) -> bool {
    if is_event_handler(name) || name == "style" || name.starts_with("xmlns") {
        return false;
    }
    if let Some(rest) = name.strip_prefix("data-") {
        return rest == "back-to-ref" || rest.starts_with("endnote");
    }
    if (name == "href" || name == "src")
        && value.trim_start().to_ascii_lowercase().starts_with("javascript:")
    {
        return false;
    }
    NAMESPACED_ATTRIBUTES.contains(&name) || is_xml_name(name)
}

/// `onclick`, `onload`, ... but not `open`.
fn is_event_handler(name: &str) -> bool {
    name.strip_prefix("on")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_alphabetic()))
        && !NON_HANDLER_ATTRIBUTES.contains(&name)
}

fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Serialized attribute list, sorted by name so output is stable across passes.
fn filtered_attributes(el: ElementRef<'_>, tag: &str) -> String {
    let mut attrs: Vec<(&str, &str)> = el
        .value()
        .attrs()
        .filter(|(name, value)| keep_attribute(name, value))
        .collect();
    if tag == "img" && !attrs.iter().any(|(name, _)| *name == "alt") {
        attrs.push(("alt", ""));
    }
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    attrs.dedup_by(|a, b| a.0 == b.0);

    let mut out = String::new();
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        push_attr_value(&mut out, value);
        out.push('"');
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn push_char(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '\t' | '\n' | '\r' => out.push(c),
        // Not allowed anywhere in an XML 1.0 document.
        c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
        c if is_table_char(c) => {
            out.push_str("&#");
            out.push_str(&(c as u32).to_string());
            out.push(';');
        }
        c => out.push(c),
    }
}

fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        push_char(out, c);
    }
}

fn push_attr_value(out: &mut String, value: &str) {
    for c in value.chars() {
        if c == '"' {
            out.push_str("&quot;");
        } else {
            push_char(out, c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn convert(html: &str) -> String {
        to_xhtml(html, &SecurityLimits::default()).unwrap()
    }

    #[test]
    fn test_scripts_styles_links_removed() {
        let out = convert("<p>a</p><script>alert(1)</script><style>p{}</style><link rel=\"x\"><p>b</p>");
        assert_eq!(out, "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_event_style_and_data_attributes() {
        let out = convert(
            r#"<p onclick="x()" style="color:red" data-id="7" data-back-to-ref="ref1" data-endnote-id="e1" class="c">t</p>"#,
        );
        assert!(!out.contains("onclick"));
        assert!(!out.contains("style="));
        assert!(!out.contains("data-id"));
        assert!(out.contains(r#"data-back-to-ref="ref1""#));
        assert!(out.contains(r#"data-endnote-id="e1""#));
        assert!(out.contains(r#"class="c""#));
    }

    #[test]
    fn test_heading_levels_capped() {
        assert_eq!(convert("<h4>a</h4><h5>b</h5><h6>c</h6><h2>d</h2>"), "<h3>a</h3><h3>b</h3><h3>c</h3><h2>d</h2>");
    }

    #[test]
    fn test_div_to_p_and_empty_paragraphs() {
        assert_eq!(convert("<div>one</div><p></p><p><br></p><p>  </p>"), "<p>one</p>");
    }

    #[test]
    fn test_div_with_block_children_unwrapped() {
        assert_eq!(convert("<div><div>a</div><p>b</p></div>"), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_empty_lists_dropped() {
        assert_eq!(convert("<ul><li></li></ul><ol></ol><ul><li>x</li><li> </li></ul>"), "<ul><li>x</li></ul>");
    }

    #[test]
    fn test_void_elements_self_closed() {
        let out = convert(r#"<p>a<br>b<img src="images/image1.png"></p><hr>"#);
        assert_eq!(out, r#"<p>a<br/>b<img alt="" src="images/image1.png"/></p><hr/>"#);
    }

    #[test]
    fn test_entities_numeric_and_unknown_to_space() {
        let out = convert("<p>&nbsp;&rsquo;&unknownentity;x &amp; y</p>");
        assert_eq!(out, "<p>&#160;&#8217; x &amp; y</p>");
    }

    #[test]
    fn test_whitespace_collapsed_between_tags() {
        let out = convert("<p>a   b</p>\n\n  <p><b>x</b> <i>y</i></p>");
        assert_eq!(out, "<p>a b</p><p><b>x</b> <i>y</i></p>");
    }

    #[test]
    fn test_code_blocks_preserved() {
        let out = convert("<pre><code>fn main() {\n    a  &lt; b;\n}</code></pre><p>&hearts;</p>");
        assert_eq!(out, "<pre><code>fn main() {\n    a  &lt; b;\n}</code></pre>");
    }

    #[test]
    fn test_forbidden_elements_removed() {
        let out = convert(r#"<p>a</p><iframe src="x"></iframe><form><input name="q"><button>go</button></form><object></object><embed src="e">"#);
        assert_eq!(out, "<p>a</p>");
    }

    #[test]
    fn test_strip_forbidden_markup_string_pass() {
        assert_eq!(strip_forbidden_markup("a<script src=\"x\"/>b<script>c</script>d<embed/>"), "abd");
    }

    #[test]
    fn test_javascript_urls_dropped() {
        let out = convert(r#"<p><a href="javascript:alert(1)">x</a></p>"#);
        assert_eq!(out, "<p><a>x</a></p>");
    }

    #[test]
    fn test_namespaced_elements_unwrapped() {
        assert_eq!(convert("<p>a<o:p>b</o:p></p>"), "<p>ab</p>");
    }

    #[test]
    fn test_endnote_marker_survives() {
        let html = r##"<p>Text<sup><a id="ref1" href="#end1" data-endnote-id="n1">1</a></sup></p>"##;
        let out = convert(html);
        assert!(out.contains(r##"href="#end1""##));
        assert!(out.contains(r#"id="ref1""#));
        assert!(out.contains(r#"data-endnote-id="n1""#));
    }

    #[test]
    fn test_excessive_nesting_falls_back() {
        let limits = SecurityLimits {
            max_nesting_depth: 5,
            ..SecurityLimits::default()
        };
        let html = format!("{}x<br>{}", "<span>".repeat(10), "</span>".repeat(10));
        assert!(matches!(to_xhtml(&html, &limits), Err(SanitizeError::ExcessiveNesting { .. })));

        let result = sanitize_chapter(&html, &limits);
        assert!(result.degraded);
        assert!(result.xhtml.contains("<br/>"));
    }

    #[test]
    fn test_fallback_pass() {
        let out = fallback_xhtml(r#"<p>a&nbsp;b<br><img src="x.png"></p><script>bad()</script>"#);
        assert_eq!(out, r#"<p>a&#160;b<br/><img src="x.png"/></p>"#);
    }

    #[test]
    fn test_div_with_nested_block_unwrapped() {
        assert_eq!(convert("<div><b><p>x</p></b></div>"), "<b><p>x</p></b>");
    }

    #[test]
    fn test_touching_space_runs_merged() {
        assert_eq!(convert("a <script>x</script> b"), "a b");
        assert_eq!(convert("text  <div>  more<p>z</p></div>"), "text more<p>z</p>");
    }

    #[test]
    fn test_idempotent_on_sample() {
        let html = r#"<div>Hello&nbsp;<b>world</b></div><h5 style="x">Deep</h5><pre>
  keep   this</pre><ul><li></li><li>one</li></ul><img src="images/image1.png" data-x="1">"#;
        let once = convert(html);
        assert_eq!(convert(&once), once);
    }

    #[test]
    fn test_heading_inside_heading_collapses() {
        for html in ["<h5><div><h5>", "<h5><div><h1>", "<h5><o:p><h5>"] {
            let once = convert(html);
            assert_eq!(once, "", "input {html}");
            assert_eq!(convert(&once), once);
        }
    }

    #[test]
    fn test_nested_heading_text_kept() {
        assert_eq!(convert("<h5>Title<div><h5>Sub</h5></div></h5>"), "<h3>TitleSub</h3>");
    }

    #[test]
    fn test_empty_headings_dropped() {
        assert_eq!(convert("<h1></h1><h2> </h2><h3><br></h3><h2>kept</h2>"), "<h2>kept</h2>");
    }

    #[test]
    fn test_no_list_item_inside_inline_code() {
        let once = convert("<li><table><code><li>");
        assert_eq!(once, "<li><code></code><table></table></li>");
        assert_eq!(convert(&once), once);
    }

    #[test]
    fn test_blocks_inside_inline_code_unwrapped() {
        assert_eq!(convert("<code>a<div>b</div></code>"), "<code>ab</code>");
    }

    #[test]
    fn test_open_attribute_kept_handlers_dropped() {
        let out = convert(r#"<details open onclick="x()" onmouseover="y()"><summary>s</summary>body</details>"#);
        assert_eq!(out, r#"<details open=""><summary>s</summary>body</details>"#);
    }

    #[test]
    fn test_event_handler_names() {
        assert!(is_event_handler("onclick"));
        assert!(is_event_handler("onload"));
        assert!(!is_event_handler("open"));
        assert!(!is_event_handler("on"));
        assert!(!is_event_handler("class"));
    }

    fn fragment() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "<p>", "</p>", "<div>", "</div>", "text", "more words", "  ", "\n", "&nbsp;",
            "&mdash;", "&unknown;", "&amp;", "<br>", "<b>", "</b>", "<i>x</i>", "<h5>", "</h5>",
            "<h1>", "<o:p>", "<li>", "<table>", "<code>", "</code>",
            "<img src=\"a.png\">", "<pre>\n  code  </pre>", "<code>&lt;x&gt;</code>",
            "<script>x()</script>", "<ul><li></li><li>item</li></ul>",
            "<span style=\"c\" data-x=\"1\" data-endnote-id=\"e\">y</span>",
            "<a href=\"#end1\" id=\"ref1\">1</a>",
        ])
    }

    proptest! {
        #[test]
        fn prop_sanitize_is_idempotent(parts in prop::collection::vec(fragment(), 0..24)) {
            let html = parts.concat();
            let once = convert(&html);
            let twice = convert(&once);
            prop_assert_eq!(twice, once);
        }
    }
}
