//! Generic, namespace-resolved XML element tree.
//!
//! `parse` turns raw text into an [`Element`] tree using quick-xml's
//! `NsReader`, so every element and attribute name arrives already bound
//! to its namespace URI. `write` is the inverse: it chooses prefixes for
//! the URIs in the tree and serializes it with quick-xml's `Writer`.
//!
//! This tree is the intermediate form between text and the typed STIX
//! model; it knows nothing about the STIX vocabulary.

use crate::errors::{CodecError, Position};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, QName, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The XML Schema instance namespace (`xsi:type`, `xsi:schemaLocation`).
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Bound to `xml` in every document; it is never declared.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// An expanded name: namespace URI plus local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub local: String,
}

impl QualifiedName {
    pub fn new(namespace: &str, local: &str) -> Self {
        QualifiedName {
            namespace: Some(namespace.to_string()),
            local: local.to_string(),
        }
    }

    /// A name in no namespace (the usual case for attributes).
    pub fn unqualified(local: &str) -> Self {
        QualifiedName {
            namespace: None,
            local: local.to_string(),
        }
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local == local
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A namespace declaration. `prefix: None` is a default namespace
/// declaration (`xmlns="..."`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    pub uri: String,
}

impl NamespaceBinding {
    pub fn new(prefix: &str, uri: &str) -> Self {
        NamespaceBinding {
            prefix: Some(prefix.to_string()),
            uri: uri.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: QualifiedName,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub name: QualifiedName,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,

    /// The resolved value of `xsi:type`, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xsi_type: Option<QualifiedName>,

    /// Declarations made on this element.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<NamespaceBinding>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,

    /// Where the start tag was found; diagnostic only.
    #[serde(skip)]
    pub position: Option<Position>,
}

// Source positions are diagnostics, not content.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.attributes == other.attributes
            && self.xsi_type == other.xsi_type
            && self.namespaces == other.namespaces
            && self.children == other.children
    }
}

impl Eq for Element {}

impl Element {
    pub fn new(name: QualifiedName) -> Self {
        Element {
            name,
            attributes: Vec::new(),
            xsi_type: None,
            namespaces: Vec::new(),
            children: Vec::new(),
            position: None,
        }
    }

    pub fn set_attribute(&mut self, name: QualifiedName, value: impl Into<String>) {
        self.attributes.push(Attribute {
            name,
            value: value.into(),
        });
    }

    pub fn attribute(&self, name: &QualifiedName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| &a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn push_element(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        self.children.push(Node::Text(text.into()));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Concatenated direct text content, as written.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }
}

// --- Parsing ---

fn malformed(text: &str, offset: usize, message: impl Into<String>) -> CodecError {
    CodecError::MalformedInput {
        message: message.into(),
        position: Position::locate(text, offset),
    }
}

/// Locate the `<` of the tag that ends just before `offset`.
fn tag_start(text: &str, offset: usize) -> Position {
    let start = text.get(..offset).and_then(|s| s.rfind('<')).unwrap_or(0);
    Position::locate(text, start)
}

fn utf8<'a>(bytes: &'a [u8], position: Position) -> Result<&'a str, CodecError> {
    std::str::from_utf8(bytes).map_err(|e| CodecError::MalformedInput {
        message: format!("invalid UTF-8 in name: {}", e),
        position,
    })
}

fn bound_namespace(
    resolved: ResolveResult,
    position: Position,
) -> Result<Option<String>, CodecError> {
    match resolved {
        ResolveResult::Bound(Namespace(uri)) => Ok(Some(utf8(uri, position)?.to_string())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(CodecError::MalformedInput {
            message: format!(
                "undeclared namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            ),
            position,
        }),
    }
}

fn open_element(
    reader: &NsReader<&[u8]>,
    start: &BytesStart,
    position: Position,
) -> Result<Element, CodecError> {
    let (resolved, local) = reader.resolve_element(start.name());
    let name = QualifiedName {
        namespace: bound_namespace(resolved, position)?,
        local: utf8(local.as_ref(), position)?.to_string(),
    };
    let mut element = Element::new(name);
    element.position = Some(position);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| CodecError::MalformedInput {
            message: e.to_string(),
            position,
        })?;
        let value = attr
            .unescape_value()
            .map_err(|e| CodecError::MalformedInput {
                message: e.to_string(),
                position,
            })?
            .into_owned();

        let key = attr.key.as_ref();
        if key == b"xmlns" {
            element.namespaces.push(NamespaceBinding { prefix: None, uri: value });
            continue;
        }
        if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            if prefix == b"xml" {
                continue;
            }
            element.namespaces.push(NamespaceBinding {
                prefix: Some(utf8(prefix, position)?.to_string()),
                uri: value,
            });
            continue;
        }

        let (resolved, local) = reader.resolve_attribute(attr.key);
        let name = QualifiedName {
            namespace: bound_namespace(resolved, position)?,
            local: utf8(local.as_ref(), position)?.to_string(),
        };

        if name.is(XSI_NAMESPACE, "type") {
            // The value is itself a QName, resolved against the same scope.
            let (resolved, local) = reader.resolve_element(QName(value.trim().as_bytes()));
            element.xsi_type = Some(QualifiedName {
                namespace: bound_namespace(resolved, position)?,
                local: utf8(local.as_ref(), position)?.to_string(),
            });
            continue;
        }

        element.attributes.push(Attribute { name, value });
    }

    Ok(element)
}

// Whitespace between child elements is layout, not content.
fn drop_layout(element: &mut Element) {
    if element.child_elements().next().is_some() {
        element.children.retain(|n| match n {
            Node::Text(t) => !t.trim().is_empty(),
            Node::Element(_) => true,
        });
    }
}

fn attach(
    text: &str,
    offset: usize,
    mut element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), CodecError> {
    drop_layout(&mut element);
    match stack.last_mut() {
        Some(parent) => parent.push_element(element),
        None if root.is_some() => {
            return Err(malformed(text, offset, "more than one root element"));
        }
        None => *root = Some(element),
    }
    Ok(())
}

fn append_text(
    text: &str,
    offset: usize,
    value: String,
    stack: &mut [Element],
) -> Result<(), CodecError> {
    match stack.last_mut() {
        Some(parent) => {
            if !value.is_empty() {
                parent.push_text(value);
            }
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(malformed(text, offset, "text outside the root element")),
    }
}

/// Parse well-formed XML text into an element tree.
///
/// Text is kept as written, except whitespace-only runs inside elements
/// that also have child elements. Comments, processing instructions, the
/// XML declaration and a leading byte order mark are dropped.
pub fn parse(text: &str) -> Result<Element, CodecError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = NsReader::from_str(text);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(text, reader.buffer_position() as usize, e.to_string()))?;
        let offset = reader.buffer_position() as usize;

        match event {
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(malformed(text, offset, "more than one root element"));
                }
                let at = tag_start(text, offset);
                let element = open_element(&reader, &start, at)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let at = tag_start(text, offset);
                let element = open_element(&reader, &start, at)?;
                attach(text, offset, element, &mut stack, &mut root)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed(text, offset, "unexpected end tag"))?;
                attach(text, offset, element, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                let value = t
                    .unescape()
                    .map_err(|e| malformed(text, offset, e.to_string()))?
                    .into_owned();
                append_text(text, offset, value, &mut stack)?;
            }
            Event::CData(c) => {
                let value = std::str::from_utf8(&c)
                    .map_err(|e| malformed(text, offset, format!("invalid UTF-8 in CDATA: {}", e)))?
                    .to_string();
                append_text(text, offset, value, &mut stack)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(
            text,
            text.len(),
            format!("unexpected end of input: <{}> is not closed", open.name.local),
        ));
    }

    root.ok_or_else(|| malformed(text, text.len(), "document has no root element"))
}

// --- Writing ---

/// Prefix bindings in scope while writing, innermost last.
struct Scope {
    bindings: Vec<NamespaceBinding>,
    generated: usize,
}

impl Scope {
    fn resolve_prefix(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|b| b.prefix.as_deref() == prefix)
            .map(|b| b.uri.as_str())
    }

    /// A prefix currently bound to `uri` and not shadowed by an inner binding.
    fn prefix_for(&self, uri: &str) -> Option<String> {
        if uri == XML_NAMESPACE {
            return Some("xml".to_string());
        }
        self.bindings
            .iter()
            .rev()
            .filter(|b| b.uri == uri)
            .filter_map(|b| b.prefix.as_deref())
            .find(|p| self.resolve_prefix(Some(*p)) == Some(uri))
            .map(str::to_string)
    }

    fn default_namespace(&self) -> Option<&str> {
        self.resolve_prefix(None).filter(|uri| !uri.is_empty())
    }

    fn generate(&mut self, uri: &str, declared: &mut Vec<NamespaceBinding>) -> String {
        loop {
            self.generated += 1;
            let candidate = format!("ns{}", self.generated);
            if self.resolve_prefix(Some(&candidate)).is_none() {
                let binding = NamespaceBinding::new(&candidate, uri);
                self.bindings.push(binding.clone());
                declared.push(binding);
                return candidate;
            }
        }
    }

    /// Render an element name, declaring a prefix if none is in scope.
    fn element_name(&mut self, name: &QualifiedName, declared: &mut Vec<NamespaceBinding>) -> String {
        match &name.namespace {
            Some(uri) if self.default_namespace() == Some(uri.as_str()) => name.local.clone(),
            Some(uri) => {
                let prefix = match self.prefix_for(uri) {
                    Some(p) => p,
                    None => self.generate(uri, declared),
                };
                format!("{}:{}", prefix, name.local)
            }
            None => {
                if self.default_namespace().is_some() {
                    let undeclare = NamespaceBinding {
                        prefix: None,
                        uri: String::new(),
                    };
                    self.bindings.push(undeclare.clone());
                    declared.push(undeclare);
                }
                name.local.clone()
            }
        }
    }

    /// Render an attribute name; the default namespace never applies.
    fn attribute_name(&mut self, name: &QualifiedName, declared: &mut Vec<NamespaceBinding>) -> String {
        match &name.namespace {
            Some(uri) => {
                let prefix = match self.prefix_for(uri) {
                    Some(p) => p,
                    None => self.generate(uri, declared),
                };
                format!("{}:{}", prefix, name.local)
            }
            None => name.local.clone(),
        }
    }
}

fn serialization(e: impl fmt::Display) -> CodecError {
    CodecError::Serialization(e.to_string())
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    scope: &mut Scope,
) -> Result<(), CodecError> {
    let mark = scope.bindings.len();

    for binding in &element.namespaces {
        if let Some(prefix) = &binding.prefix {
            if !crate::schema::is_ncname(prefix) || prefix.to_ascii_lowercase().starts_with("xml") {
                return Err(CodecError::Serialization(format!(
                    "cannot declare namespace prefix '{}'",
                    prefix
                )));
            }
        }
        scope.bindings.push(binding.clone());
    }

    let mut declared = Vec::new();
    let qname = scope.element_name(&element.name, &mut declared);

    let mut attributes = Vec::with_capacity(element.attributes.len() + 1);
    if let Some(xsi_type) = &element.xsi_type {
        let key = scope.attribute_name(&QualifiedName::new(XSI_NAMESPACE, "type"), &mut declared);
        let value = match &xsi_type.namespace {
            Some(uri) if scope.default_namespace() == Some(uri.as_str()) => xsi_type.local.clone(),
            Some(uri) => {
                let prefix = match scope.prefix_for(uri) {
                    Some(p) => p,
                    None => scope.generate(uri, &mut declared),
                };
                format!("{}:{}", prefix, xsi_type.local)
            }
            None => xsi_type.local.clone(),
        };
        attributes.push((key, value));
    }
    for attr in &element.attributes {
        let key = scope.attribute_name(&attr.name, &mut declared);
        attributes.push((key, attr.value.clone()));
    }

    let mut start = BytesStart::new(qname.clone());
    for binding in element.namespaces.iter().chain(declared.iter()) {
        match &binding.prefix {
            Some(prefix) => start.push_attribute((format!("xmlns:{}", prefix).as_str(), binding.uri.as_str())),
            None => start.push_attribute(("xmlns", binding.uri.as_str())),
        }
    }
    for (key, value) in &attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(serialization)?;
    } else {
        writer.write_event(Event::Start(start)).map_err(serialization)?;
        for child in &element.children {
            match child {
                Node::Element(e) => write_element(writer, e, scope)?,
                Node::Text(t) => writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(serialization)?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(qname)))
            .map_err(serialization)?;
    }

    scope.bindings.truncate(mark);
    Ok(())
}

/// Serialize an element tree as an indented UTF-8 document.
///
/// Declarations recorded on each element are written where they were
/// recorded; any namespace still unbound gets a generated `nsN` prefix on
/// the element that first needs it.
pub fn write(root: &Element) -> Result<String, CodecError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(serialization)?;

    let mut scope = Scope {
        bindings: Vec::new(),
        generated: 0,
    };
    write_element(&mut writer, root, &mut scope)?;

    String::from_utf8(writer.into_inner()).map_err(serialization)
}
