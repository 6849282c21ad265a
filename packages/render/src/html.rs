//! HTML output helpers

use std::fmt::Write;

/// Elements written without a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "command", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_attribute`]
pub fn unescape_attribute(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Append-only output buffer with optional one-node-per-line layout
#[derive(Debug, Default)]
pub struct HtmlWriter {
    out: String,
    indent: bool,
}

impl HtmlWriter {
    pub fn new(indent: bool) -> Self {
        Self {
            out: String::new(),
            indent,
        }
    }

    /// Line break plus indentation for `depth` (indent mode only)
    pub fn line(&mut self, depth: usize) {
        if self.indent && !self.out.is_empty() {
            self.out.push('\n');
            for _ in 0..depth {
                self.out.push_str("  ");
            }
        }
    }

    pub fn push_str(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// ` name="value"`, value already escaped as needed
    pub fn attribute(&mut self, name: &str, value: &str) -> std::fmt::Result {
        write!(self.out, " {}=\"{}\"", name, value)
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl Write for HtmlWriter {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.out.push_str(s);
        Ok(())
    }
}
