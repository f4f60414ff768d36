//! Minimal XML tree for vector markup.
//!
//! # Responsibility
//! - Parse one well-formed document into an element tree, dropping the
//!   prolog, comments and processing instructions.
//! - Serialize a tree back into canonical markup.
//!
//! # Invariants
//! - Entity declarations are refused; only the five predefined entities and
//!   numeric character references are decoded.
//! - Nesting deeper than the configured limit is refused without recursion.
//! - `serialize(parse(serialize(tree))) == serialize(tree)`.

use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    NotUtf8,
    UnexpectedEof,
    Unexpected { offset: usize, found: String },
    MismatchedTag { expected: String, found: String },
    DuplicateAttribute(String),
    UnknownEntity(String),
    EntityDeclaration,
    TooDeep(usize),
    TooManyUseElements(usize),
    MissingRoot,
    NotSvgRoot(String),
}

impl Display for MarkupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotUtf8 => write!(f, "document is not valid UTF-8"),
            Self::UnexpectedEof => write!(f, "document ends inside markup"),
            Self::Unexpected { offset, found } => {
                write!(f, "unexpected `{found}` at byte {offset}")
            }
            Self::MismatchedTag { expected, found } => {
                write!(f, "closing tag `{found}` does not match `{expected}`")
            }
            Self::DuplicateAttribute(name) => write!(f, "attribute `{name}` repeated"),
            Self::UnknownEntity(name) => write!(f, "undeclared entity `&{name};`"),
            Self::EntityDeclaration => write!(f, "document declares entities"),
            Self::TooDeep(limit) => write!(f, "elements nest deeper than {limit}"),
            Self::TooManyUseElements(limit) => write!(f, "more than {limit} <use> elements"),
            Self::MissingRoot => write!(f, "document has no root element"),
            Self::NotSvgRoot(name) => write!(f, "root element is `{name}`, not `svg`"),
        }
    }
}

impl Error for MarkupError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Name without a namespace prefix.
    pub fn local_name(&self) -> &str {
        self.name
            .rsplit_once(':')
            .map_or(self.name.as_str(), |(_, local)| local)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parses `input` and returns its root element.
pub fn parse(input: &str, max_depth: usize) -> Result<Element, MarkupError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let mut cursor = Cursor { input, pos: 0 };

    cursor.skip_misc(true)?;
    if !cursor.starts_with("<") || cursor.eof() {
        return Err(MarkupError::MissingRoot);
    }
    let root = cursor.parse_root(max_depth)?;
    cursor.skip_misc(false)?;
    if !cursor.eof() {
        return Err(cursor.unexpected());
    }
    Ok(root)
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.rest().starts_with(prefix)
    }

    fn unexpected(&self) -> MarkupError {
        if self.eof() {
            return MarkupError::UnexpectedEof;
        }
        MarkupError::Unexpected {
            offset: self.pos,
            found: self.rest().chars().take(12).collect(),
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), MarkupError> {
        if !self.starts_with(token) {
            return Err(self.unexpected());
        }
        self.pos += token.len();
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t', '\r', '\n']);
        self.pos += rest.len() - trimmed.len();
    }

    /// Returns the text before `terminator` and moves past it.
    fn take_until(&mut self, terminator: &str) -> Result<&'a str, MarkupError> {
        let rest = self.rest();
        let end = rest.find(terminator).ok_or(MarkupError::UnexpectedEof)?;
        self.pos += end + terminator.len();
        Ok(&rest[..end])
    }

    /// Skips whitespace, comments, processing instructions and, before the
    /// root only, one doctype.
    fn skip_misc(&mut self, before_root: bool) -> Result<(), MarkupError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<!--") {
                self.pos += 4;
                self.take_until("-->")?;
            } else if self.starts_with("<?") {
                self.pos += 2;
                self.take_until("?>")?;
            } else if before_root && self.starts_with("<!DOCTYPE") {
                self.skip_doctype()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_doctype(&mut self) -> Result<(), MarkupError> {
        self.pos += "<!DOCTYPE".len();
        let rest = self.rest();
        let close = rest.find('>').ok_or(MarkupError::UnexpectedEof)?;
        if let Some(open) = rest[..close].find('[') {
            let subset_end = rest[open..].find(']').ok_or(MarkupError::UnexpectedEof)? + open;
            if rest[open..subset_end].contains("<!ENTITY") {
                return Err(MarkupError::EntityDeclaration);
            }
            self.pos += subset_end + 1;
            self.skip_whitespace();
            return self.expect(">");
        }
        self.pos += close + 1;
        Ok(())
    }

    fn parse_name(&mut self) -> Result<String, MarkupError> {
        let rest = self.rest();
        let mut end = 0;
        for (index, c) in rest.char_indices() {
            let valid = if index == 0 {
                c.is_alphabetic() || c == '_' || c == ':'
            } else {
                c.is_alphanumeric() || matches!(c, '_' | ':' | '.' | '-')
            };
            if !valid {
                break;
            }
            end = index + c.len_utf8();
        }
        if end == 0 {
            return Err(self.unexpected());
        }
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    /// Parses a start tag after `<`. Returns the element and whether it was
    /// self-closing.
    fn parse_start_tag(&mut self) -> Result<(Element, bool), MarkupError> {
        let name = self.parse_name()?;
        let mut attributes: Vec<(String, String)> = Vec::new();
        loop {
            let before = self.pos;
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok((Element::new(name, attributes), true));
            }
            if self.starts_with(">") {
                self.pos += 1;
                return Ok((Element::new(name, attributes), false));
            }
            if self.pos == before {
                return Err(self.unexpected());
            }
            let key = self.parse_name()?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let quote = match self.rest().chars().next() {
                Some(quote @ ('"' | '\'')) => quote,
                _ => return Err(self.unexpected()),
            };
            self.pos += 1;
            let raw = self.take_until(if quote == '"' { "\"" } else { "'" })?;
            if raw.contains('<') {
                return Err(MarkupError::Unexpected {
                    offset: self.pos,
                    found: "<".to_string(),
                });
            }
            if attributes.iter().any(|(existing, _)| *existing == key) {
                return Err(MarkupError::DuplicateAttribute(key));
            }
            attributes.push((key, decode_entities(raw)?));
        }
    }

    fn parse_root(&mut self, max_depth: usize) -> Result<Element, MarkupError> {
        self.expect("<")?;
        let (root, self_closing) = self.parse_start_tag()?;
        if self_closing {
            return Ok(root);
        }

        let mut stack: Vec<Element> = vec![root];
        loop {
            if self.eof() {
                return Err(MarkupError::UnexpectedEof);
            }
            if !self.starts_with("<") {
                let rest = self.rest();
                let end = rest.find('<').unwrap_or(rest.len());
                let text = decode_entities(&rest[..end])?;
                self.pos += end;
                push_child(&mut stack, Node::Text(text));
                continue;
            }
            if self.starts_with("</") {
                self.pos += 2;
                let name = self.parse_name()?;
                self.skip_whitespace();
                self.expect(">")?;
                let Some(element) = stack.pop() else {
                    return Err(MarkupError::MissingRoot);
                };
                if element.name != name {
                    return Err(MarkupError::MismatchedTag {
                        expected: element.name,
                        found: name,
                    });
                }
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(element)),
                    None => return Ok(element),
                }
                continue;
            }
            if self.starts_with("<!--") {
                self.pos += 4;
                self.take_until("-->")?;
                continue;
            }
            if self.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let data = self.take_until("]]>")?;
                push_child(&mut stack, Node::CData(data.to_string()));
                continue;
            }
            if self.starts_with("<?") {
                self.pos += 2;
                self.take_until("?>")?;
                continue;
            }
            if self.starts_with("<!") {
                return Err(self.unexpected());
            }

            self.pos += 1;
            let (element, self_closing) = self.parse_start_tag()?;
            if self_closing {
                push_child(&mut stack, Node::Element(element));
                continue;
            }
            if stack.len() >= max_depth {
                return Err(MarkupError::TooDeep(max_depth));
            }
            stack.push(element);
        }
    }
}

/// Text split by a comment or processing instruction joins its neighbor.
fn push_child(stack: &mut [Element], node: Node) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let (Node::Text(text), Some(Node::Text(previous))) = (&node, parent.children.last_mut()) {
        previous.push_str(text);
        return;
    }
    parent.children.push(node);
}

fn decode_entities(raw: &str) -> Result<String, MarkupError> {
    if !raw.contains('&') {
        return Ok(raw.to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find(';')
            .ok_or_else(|| MarkupError::UnknownEntity(after.chars().take(8).collect()))?;
        let name = &after[..end];
        let decoded = match name {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => decode_char_ref(name).ok_or_else(|| MarkupError::UnknownEntity(name.to_string()))?,
        };
        out.push(decoded);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn decode_char_ref(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code).filter(|c| *c != '\0')
}

/// Serializes `root` with double-quoted attributes and self-closed empty
/// elements.
pub fn serialize(root: &Element) -> String {
    let mut out = String::new();
    write_element(root, &mut out);
    out
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_into(value, true, out);
        out.push('"');
    }
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &element.children {
        match child {
            Node::Element(inner) => write_element(inner, out),
            Node::Text(text) => escape_into(text, false, out),
            Node::CData(data) => {
                out.push_str("<![CDATA[");
                out.push_str(data);
                out.push_str("]]>");
            }
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_into(value: &str, attribute: bool, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
