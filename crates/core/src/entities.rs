//! Named HTML entities → numeric XML character references.
//!
//! XHTML content documents are parsed as XML, which only knows five named
//! entities. Everything else must be numeric or the whole document fails.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// The five entities XML defines itself.
pub const XML_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

/// Named entities the editor and pasted content commonly produce.
pub const NAMED_ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160),
    ("ensp", 8194),
    ("emsp", 8195),
    ("thinsp", 8201),
    ("shy", 173),
    ("mdash", 8212),
    ("ndash", 8211),
    ("hellip", 8230),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("sbquo", 8218),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("bdquo", 8222),
    ("laquo", 171),
    ("raquo", 187),
    ("prime", 8242),
    ("Prime", 8243),
    ("bull", 8226),
    ("middot", 183),
    ("dagger", 8224),
    ("Dagger", 8225),
    ("sect", 167),
    ("para", 182),
    ("copy", 169),
    ("reg", 174),
    ("trade", 8482),
    ("deg", 176),
    ("times", 215),
    ("divide", 247),
    ("frac12", 189),
    ("frac14", 188),
    ("frac34", 190),
    ("cent", 162),
    ("pound", 163),
    ("euro", 8364),
    ("yen", 165),
    ("iexcl", 161),
    ("iquest", 191),
    ("aacute", 225),
    ("agrave", 224),
    ("acirc", 226),
    ("auml", 228),
    ("ccedil", 231),
    ("eacute", 233),
    ("egrave", 232),
    ("ecirc", 234),
    ("euml", 235),
    ("iacute", 237),
    ("icirc", 238),
    ("iuml", 239),
    ("ntilde", 241),
    ("oacute", 243),
    ("ocirc", 244),
    ("ouml", 246),
    ("uacute", 250),
    ("ugrave", 249),
    ("uuml", 252),
    ("szlig", 223),
    ("Eacute", 201),
    ("Ntilde", 209),
    ("Ouml", 214),
    ("Uuml", 220),
];

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&([A-Za-z][A-Za-z0-9]{0,31});").expect("valid entity regex"));

static CODE_REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<pre\b.*?</pre\s*>|<code\b.*?</code\s*>").expect("valid code region regex")
});

static TABLE_CODEPOINTS: LazyLock<HashSet<u32>> =
    LazyLock::new(|| NAMED_ENTITIES.iter().map(|(_, cp)| *cp).collect());

pub fn codepoint(name: &str) -> Option<u32> {
    NAMED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, cp)| *cp)
}

/// Whether the serializer should write `c` as a numeric reference.
pub fn is_table_char(c: char) -> bool {
    TABLE_CODEPOINTS.contains(&(c as u32))
}

/// Replace table entities with numeric references and every other
/// non-XML named entity with a single space. `<pre>` and `<code>` regions
/// are copied through untouched.
pub fn normalize_entities(html: &str) -> String {
    if !html.contains('&') {
        return html.to_string();
    }
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in CODE_REGION_RE.find_iter(html) {
        out.push_str(&replace_named(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&replace_named(&html[last..]));
    out
}

fn replace_named(segment: &str) -> String {
    ENTITY_RE
        .replace_all(segment, |caps: &Captures| {
            let name = &caps[1];
            if XML_ENTITIES.contains(&name) {
                caps[0].to_string()
            } else if let Some(cp) = codepoint(name) {
                format!("&#{};", cp)
            } else {
                " ".to_string()
            }
        })
        .into_owned()
}
