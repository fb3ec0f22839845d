//! Stylesheet generation from a typography preset.

use std::fmt::Write;

use crate::model::TypographyPreset;

pub const STYLESHEET_FILENAME: &str = "styles.css";

/// The knobs a preset turns. Everything else in the stylesheet is fixed.
#[derive(Debug, Clone, Copy)]
pub struct PresetStyle {
    pub font_family: &'static str,
    pub line_height: f32,
    /// First-line indent; `None` means block spacing between paragraphs.
    pub paragraph_indent: Option<&'static str>,
    pub paragraph_spacing: &'static str,
    pub justify: bool,
    pub hyphenate: bool,
    pub title_align: &'static str,
}

impl PresetStyle {
    pub fn for_preset(preset: TypographyPreset) -> Self {
        match preset {
            TypographyPreset::Novel => Self {
                font_family: "Georgia, \"Times New Roman\", serif",
                line_height: 1.6,
                paragraph_indent: Some("1.5em"),
                paragraph_spacing: "0",
                justify: true,
                hyphenate: true,
                title_align: "center",
            },
            TypographyPreset::Nonfiction => Self {
                font_family: "\"Palatino Linotype\", Palatino, \"Book Antiqua\", serif",
                line_height: 1.5,
                paragraph_indent: None,
                paragraph_spacing: "0.8em",
                justify: true,
                hyphenate: true,
                title_align: "left",
            },
            TypographyPreset::Technical => Self {
                font_family: "\"Helvetica Neue\", Helvetica, Arial, sans-serif",
                line_height: 1.5,
                paragraph_indent: None,
                paragraph_spacing: "0.75em",
                justify: false,
                hyphenate: false,
                title_align: "left",
            },
            TypographyPreset::Poetry => Self {
                font_family: "Garamond, \"EB Garamond\", Georgia, serif",
                line_height: 1.8,
                paragraph_indent: None,
                paragraph_spacing: "1em",
                justify: false,
                hyphenate: false,
                title_align: "center",
            },
            TypographyPreset::Default => Self {
                font_family: "Georgia, serif",
                line_height: 1.5,
                paragraph_indent: Some("1em"),
                paragraph_spacing: "0",
                justify: false,
                hyphenate: true,
                title_align: "center",
            },
        }
    }
}

/// Complete `styles.css` for `preset`.
pub fn stylesheet(preset: TypographyPreset) -> String {
    let s = PresetStyle::for_preset(preset);
    let mut css = String::with_capacity(2048);
    write_preset_rules(&mut css, preset.name(), &s);
    css.push_str(FIXED_RULES);
    css
}

fn write_preset_rules(css: &mut String, name: &str, s: &PresetStyle) {
    let align = if s.justify { "justify" } else { "left" };
    let hyphens = if s.hyphenate { "auto" } else { "manual" };

    // fmt::Write into a String cannot fail
    let _ = writeln!(css, "/* typography: {} */", name);
    let _ = writeln!(
        css,
        "body {{\n  font-family: {};\n  line-height: {};\n  margin: 0 5%;\n  text-align: {};\n  -webkit-hyphens: {hy};\n  hyphens: {hy};\n}}\n",
        s.font_family, s.line_height, align, hy = hyphens
    );
    let _ = writeln!(
        css,
        "h1, h2, h3 {{\n  line-height: 1.2;\n  text-align: {};\n  -webkit-hyphens: manual;\n  hyphens: manual;\n  page-break-after: avoid;\n}}\n",
        s.title_align
    );
    let _ = writeln!(
        css,
        "h1.chapter-title {{\n  font-size: 1.8em;\n  margin: 2em 0 1.5em;\n  text-align: {};\n}}\n",
        s.title_align
    );
    match s.paragraph_indent {
        Some(indent) => {
            let _ = writeln!(
                css,
                "p {{\n  margin: 0;\n  text-indent: {};\n}}\n\nh1 + p, h2 + p, h3 + p, hr + p, .chapter-content > p:first-child {{\n  text-indent: 0;\n}}\n",
                indent
            );
        }
        None => {
            let _ = writeln!(
                css,
                "p {{\n  margin: 0 0 {};\n  text-indent: 0;\n}}\n",
                s.paragraph_spacing
            );
        }
    }
}

const FIXED_RULES: &str = r#"hr {
  border: none;
  margin: 1.5em 0;
  text-align: center;
}

hr::after {
  content: "* * *";
  letter-spacing: 0.5em;
}

sup, a.footnote-ref {
  font-size: 0.75em;
  line-height: 0;
  vertical-align: super;
  text-decoration: none;
}

img {
  max-width: 100%;
  height: auto;
}

figure {
  margin: 1em 0;
  text-align: center;
}

figcaption {
  font-size: 0.9em;
  font-style: italic;
}

table {
  border-collapse: collapse;
  margin: 1em 0;
  width: 100%;
}

th, td {
  border: 1px solid #999;
  padding: 0.3em 0.5em;
  text-align: left;
}

pre {
  font-size: 0.85em;
  line-height: 1.4;
  margin: 1em 0;
  overflow-wrap: break-word;
  white-space: pre-wrap;
  text-align: left;
  -webkit-hyphens: none;
  hyphens: none;
}

code {
  font-family: "Courier New", Courier, monospace;
}

blockquote {
  margin: 1em 2em;
  font-style: italic;
}

.cover {
  margin: 0;
  padding: 0;
  text-align: center;
}

.cover img {
  max-height: 100%;
}

@media print {
  body {
    margin: 0;
    font-size: 11pt;
  }

  h1.chapter-title {
    page-break-before: always;
  }

  a {
    color: inherit;
    text-decoration: none;
  }
}
"#;
