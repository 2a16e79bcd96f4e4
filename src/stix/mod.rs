//! STIX 1.x binding: the typed model and its mapping to the XML tree.
//!
//! `decode` walks an [`Element`] tree and builds a [`Package`]; `encode`
//! goes the other way. Both look every name up through the [`Schema`], so
//! the vocabulary lives in the schema artifact, not in this code.

pub mod decode;
pub mod document;
pub mod encode;

pub use document::*;

use crate::codec::Strictness;
use crate::errors::CodecError;
use crate::xml_tree::{Element, Node, QualifiedName};
use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use log::warn;

/// Tracks which attributes and children of an element the binding consumed,
/// so whatever is left over can be rejected or preserved.
pub(crate) struct Fields<'a> {
    element: &'a Element,
    path: String,
    strictness: Strictness,
    attributes_used: Vec<bool>,
    children_used: Vec<bool>,
    xsi_type_used: bool,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(element: &'a Element, path: String, strictness: Strictness) -> Self {
        Fields {
            element,
            path,
            strictness,
            attributes_used: vec![false; element.attributes.len()],
            children_used: vec![false; element.children.len()],
            xsi_type_used: false,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn mismatch(&self, message: impl Into<String>) -> CodecError {
        CodecError::mismatch(self.path.clone(), message, self.element.position)
    }

    fn take_attribute(&mut self, name: &QualifiedName) -> Option<&'a str> {
        let element = self.element;
        let index = element.attributes.iter().position(|a| &a.name == name)?;
        self.attributes_used[index] = true;
        Some(element.attributes[index].value.as_str())
    }

    /// An unqualified attribute.
    pub(crate) fn attr(&mut self, local: &str) -> Option<&'a str> {
        self.take_attribute(&QualifiedName::unqualified(local))
    }

    pub(crate) fn attr_ns(&mut self, namespace: &str, local: &str) -> Option<&'a str> {
        self.take_attribute(&QualifiedName::new(namespace, local))
    }

    pub(crate) fn required_attr(&mut self, local: &str) -> Result<&'a str, CodecError> {
        self.attr(local)
            .ok_or_else(|| self.mismatch(format!("missing required attribute '{}'", local)))
    }

    pub(crate) fn xsi_type(&mut self) -> Option<&'a QualifiedName> {
        self.xsi_type_used = true;
        self.element.xsi_type.as_ref()
    }

    /// All children named `{namespace}local`, each with its path.
    pub(crate) fn children(&mut self, namespace: &str, local: &str) -> Vec<(&'a Element, String)> {
        let element = self.element;
        let mut found = Vec::new();
        for (index, node) in element.children.iter().enumerate() {
            if let Node::Element(child) = node {
                if child.name.is(namespace, local) {
                    self.children_used[index] = true;
                    found.push(child);
                }
            }
        }
        let many = found.len() > 1;
        found
            .into_iter()
            .enumerate()
            .map(|(i, child)| {
                let path = if many {
                    format!("{}/{}[{}]", self.path, local, i + 1)
                } else {
                    format!("{}/{}", self.path, local)
                };
                (child, path)
            })
            .collect()
    }

    /// At most one child named `{namespace}local`.
    pub(crate) fn child(
        &mut self,
        namespace: &str,
        local: &str,
    ) -> Result<Option<(&'a Element, String)>, CodecError> {
        let mut found = self.children(namespace, local);
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            n => Err(CodecError::mismatch(
                format!("{}/{}", self.path, local),
                format!("expected at most one element, found {}", n),
                found[1].0.position,
            )),
        }
    }

    /// Text of a leaf element as written; child elements are not allowed.
    pub(crate) fn text(&mut self) -> Result<String, CodecError> {
        if let Some(child) = self.element.child_elements().next() {
            return Err(CodecError::mismatch(
                self.path.clone(),
                format!("expected text content, found element {}", child.name),
                child.position,
            ));
        }
        for used in self.children_used.iter_mut() {
            *used = true;
        }
        Ok(self.element.text())
    }

    /// Close a complex element: leftovers are rejected (strict) or returned
    /// as extras (lenient).
    pub(crate) fn finish(self) -> Result<Extras, CodecError> {
        self.settle(true)
    }

    /// Close an element whose leftovers cannot be preserved; lenient mode
    /// drops them with a warning.
    pub(crate) fn finish_dropping(self) -> Result<(), CodecError> {
        self.settle(false).map(|_| ())
    }

    fn settle(self, keep: bool) -> Result<Extras, CodecError> {
        let lenient = self.strictness == Strictness::Lenient;
        let mut extras = Extras::default();

        if let Some(xsi_type) = &self.element.xsi_type {
            if !self.xsi_type_used {
                if !lenient {
                    return Err(self.mismatch(format!("unexpected xsi:type {}", xsi_type)));
                }
                warn!("{}: ignoring unexpected xsi:type {}", self.path, xsi_type);
            }
        }

        for (attr, used) in self.element.attributes.iter().zip(&self.attributes_used) {
            if *used {
                continue;
            }
            if !lenient {
                return Err(self.mismatch(format!("unexpected attribute {}", attr.name)));
            }
            if keep {
                warn!("{}: preserving unknown attribute {}", self.path, attr.name);
                extras.attributes.push(attr.clone());
            } else {
                warn!("{}: dropping unknown attribute {}", self.path, attr.name);
            }
        }

        for (node, used) in self.element.children.iter().zip(&self.children_used) {
            if *used {
                continue;
            }
            match node {
                Node::Text(t) if t.trim().is_empty() => {}
                Node::Text(_) => {
                    if !lenient {
                        return Err(self.mismatch("unexpected text content"));
                    }
                    warn!("{}: ignoring unexpected text content", self.path);
                }
                Node::Element(child) => {
                    if !lenient {
                        return Err(CodecError::mismatch(
                            self.path.clone(),
                            format!("unexpected element {}", child.name),
                            child.position,
                        ));
                    }
                    if keep {
                        warn!("{}: preserving unknown element {}", self.path, child.name);
                        extras.elements.push(child.clone());
                    } else {
                        warn!("{}: dropping unknown element {}", self.path, child.name);
                    }
                }
            }
        }

        Ok(extras)
    }
}

/// Parse an `xs:dateTime`. A value without a zone designator is read as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Result<Timestamp, String> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts);
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.from_utc_datetime(&naive).into())
        .map_err(|e| format!("'{}' is not a valid xs:dateTime ({})", value, e))
}

/// Render an `xs:dateTime`. Only four-digit years survive a round trip.
pub(crate) fn format_timestamp(ts: &Timestamp) -> Result<String, String> {
    if !(0..=9999).contains(&ts.year()) {
        return Err(format!(
            "year {} is outside the four-digit range of xs:dateTime",
            ts.year()
        ));
    }
    Ok(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

pub(crate) fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("'{}' is not a valid xs:boolean", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml_tree::parse;

    #[test]
    fn test_parse_timestamp_with_zone() {
        let ts = parse_timestamp("2014-05-08T09:00:00.000000Z").unwrap();
        assert_eq!(format_timestamp(&ts).unwrap(), "2014-05-08T09:00:00Z");
    }

    #[test]
    fn test_parse_timestamp_keeps_offset() {
        let ts = parse_timestamp("2015-01-02T03:04:05.5+02:00").unwrap();
        assert_eq!(format_timestamp(&ts).unwrap(), "2015-01-02T03:04:05.500+02:00");
    }

    #[test]
    fn test_parse_timestamp_without_zone_is_utc() {
        let ts = parse_timestamp("2014-05-08T09:00:00").unwrap();
        assert_eq!(ts, parse_timestamp("2014-05-08T09:00:00Z").unwrap());
    }

    #[test]
    fn test_format_timestamp_rejects_five_digit_year() {
        let ts: Timestamp = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap().into();
        assert!(format_timestamp(&ts).unwrap_err().contains("10000"));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("yes").is_err());
    }

    #[test]
    fn test_fields_strict_rejects_leftovers() {
        let el = parse(r#"<a known="1" extra="2"/>"#).unwrap();
        let mut fields = Fields::new(&el, "a".to_string(), Strictness::Strict);
        assert_eq!(fields.attr("known"), Some("1"));
        let err = fields.finish().unwrap_err();
        assert!(err.to_string().contains("extra"));
    }

    #[test]
    fn test_fields_lenient_keeps_leftovers() {
        let el = parse(r#"<a extra="2"><b/><c>x</c></a>"#).unwrap();
        let mut fields = Fields::new(&el, "a".to_string(), Strictness::Lenient);
        assert!(fields.children("", "b").is_empty());
        let extras = fields.finish().unwrap();
        assert_eq!(extras.attributes.len(), 1);
        assert_eq!(extras.elements.len(), 2);
    }

    #[test]
    fn test_child_rejects_duplicates() {
        let el = parse(r#"<a xmlns:n="urn:n"><n:b/><n:b/></a>"#).unwrap();
        let mut fields = Fields::new(&el, "a".to_string(), Strictness::Strict);
        let err = fields.child("urn:n", "b").unwrap_err();
        assert!(matches!(err, CodecError::SchemaMismatch { .. }));
    }
}
