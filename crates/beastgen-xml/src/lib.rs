//! Append-only XML document builder.
//!
//! [`DocumentBuilder`] writes elements, attributes, text, comments and
//! `idref` reference tags into a string. It enforces strict LIFO tag
//! discipline: every `open_tag` is matched by exactly one `close_tag` of the
//! same name, innermost first. A violation is a defect in the caller and is
//! reported as an internal [`GenerationError`].
//!
//! The builder does not check that identifiers are unique or that references
//! resolve; it only records them so callers can.

use beastgen_types::{GenerationError, Result};

const INDENT: &str = "\t";

// ---------------------------------------------------------------------------
// Attributes and number formatting
// ---------------------------------------------------------------------------

/// One `key="value"` pair. Emitted in the order supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

/// Build an attribute from anything displayable.
pub fn attr(key: &str, value: impl std::fmt::Display) -> Attribute {
    Attribute {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Build an attribute from a floating-point value using [`number`].
pub fn num_attr(key: &str, value: f64) -> Attribute {
    attr(key, number(value))
}

/// Render a float the way the engine reads it back: integral values keep a
/// trailing `.0`, large and small magnitudes use exponent notation.
pub fn number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{value:?}")
    }
}

/// Space-separated list of numbers.
pub fn numbers(values: &[f64]) -> String {
    values.iter().map(|v| number(*v)).collect::<Vec<_>>().join(" ")
}

pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// DocumentBuilder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DocumentBuilder {
    out: String,
    open: Vec<String>,
    minted: Vec<String>,
    referenced: Vec<String>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the XML declaration. Only meaningful as the first call.
    pub fn declaration(&mut self) {
        self.out.push_str("<?xml version=\"1.0\" standalone=\"yes\"?>\n");
    }

    pub fn open_tag(&mut self, name: &str, attributes: &[Attribute]) {
        self.write_start(name, attributes, false);
        self.open.push(name.to_string());
    }

    /// Close the innermost open element, which must be `name`.
    pub fn close_tag(&mut self, name: &str) -> Result<()> {
        match self.open.last() {
            None => return Err(GenerationError::EmptyDocument(name.to_string())),
            Some(expected) if expected != name => {
                return Err(GenerationError::TagMismatch {
                    expected: expected.clone(),
                    found: name.to_string(),
                });
            }
            Some(_) => {}
        }
        self.open.pop();
        self.indent();
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
        Ok(())
    }

    /// A complete element with no children: `<name .../>` when
    /// `self_closing`, otherwise `<name ...></name>`.
    pub fn tag(&mut self, name: &str, attributes: &[Attribute], self_closing: bool) {
        if self_closing {
            self.write_start(name, attributes, true);
        } else {
            self.indent();
            self.write_head(name, attributes);
            self.out.push_str("></");
            self.out.push_str(name);
            self.out.push_str(">\n");
        }
    }

    /// An element holding only text: `<name ...>value</name>`.
    pub fn text_element(&mut self, name: &str, attributes: &[Attribute], value: &str) {
        self.indent();
        self.write_head(name, attributes);
        self.out.push('>');
        self.out.push_str(&escape_text(value));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push_str(">\n");
    }

    /// A text node on its own line inside the current element.
    pub fn text(&mut self, value: &str) {
        self.indent();
        self.out.push_str(&escape_text(value));
        self.out.push('\n');
    }

    /// A reference tag: `<name idref="target"/>`.
    pub fn reference(&mut self, name: &str, target_id: &str) {
        self.tag(name, &[attr("idref", target_id)], true);
    }

    /// One comment per line. `--` is not allowed inside comments, so it is
    /// collapsed to a single dash.
    pub fn comment(&mut self, lines: &[&str]) {
        for line in lines {
            self.indent();
            self.out.push_str("<!-- ");
            let mut clean = line.to_string();
            while clean.contains("--") {
                clean = clean.replace("--", "-");
            }
            self.out.push_str(&clean);
            self.out.push_str(" -->\n");
        }
    }

    pub fn blank_line(&mut self) {
        self.out.push('\n');
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Names of the currently open elements, outermost first.
    pub fn open_tags(&self) -> &[String] {
        &self.open
    }

    /// Identifiers minted so far via `id` attributes, in document order.
    pub fn minted_ids(&self) -> &[String] {
        &self.minted
    }

    /// Identifiers referenced so far via `idref` attributes, in document order.
    pub fn referenced_ids(&self) -> &[String] {
        &self.referenced
    }

    /// Text written so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Finalize the document. Fails if any element is still open.
    pub fn finish(self) -> Result<String> {
        if !self.open.is_empty() {
            return Err(GenerationError::UnclosedTags(self.open));
        }
        Ok(self.out)
    }

    /// Finalize and also hand back the id bookkeeping.
    pub fn finish_with_ids(self) -> Result<(String, Vec<String>, Vec<String>)> {
        if !self.open.is_empty() {
            return Err(GenerationError::UnclosedTags(self.open));
        }
        Ok((self.out, self.minted, self.referenced))
    }

    // --- internals ---

    fn indent(&mut self) {
        for _ in 0..self.open.len() {
            self.out.push_str(INDENT);
        }
    }

    fn write_start(&mut self, name: &str, attributes: &[Attribute], self_closing: bool) {
        self.indent();
        self.write_head(name, attributes);
        self.out.push_str(if self_closing { "/>\n" } else { ">\n" });
    }

    fn write_head(&mut self, name: &str, attributes: &[Attribute]) {
        self.out.push('<');
        self.out.push_str(name);
        for a in attributes {
            match a.key.as_str() {
                "id" => self.minted.push(a.value.clone()),
                "idref" => self.referenced.push(a.value.clone()),
                _ => {}
            }
            self.out.push(' ');
            self.out.push_str(&a.key);
            self.out.push_str("=\"");
            self.out.push_str(&escape_attribute(&a.value));
            self.out.push('"');
        }
    }
}
