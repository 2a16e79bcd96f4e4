//! Typed in-memory model of a STIX 1.x package.
//!
//! These structures are what `decode` produces and `encode` consumes. Every
//! optional STIX field is an `Option` or a `Vec`; the only field required
//! for encoding is [`Package::version`].

use crate::xml_tree::{Attribute, Element, NamespaceBinding};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An `xs:dateTime` value with its original offset.
pub type Timestamp = DateTime<FixedOffset>;

/// Default list delimiter of CybOX pattern fields.
pub const DEFAULT_DELIMITER: &str = "##comma##";

/// A STIX package, the root of every document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Package {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idref: Option<String>,

    /// STIX language version (e.g., "1.2"); required when encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    /// Value of `xsi:schemaLocation`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_location: Option<String>,

    /// Instance namespaces declared on the root, such as the one that binds
    /// the `example:` prefix used in ids. Vocabulary namespaces are not kept
    /// here; they are re-declared from the schema on encode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<NamespaceBinding>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observables: Option<Observables>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indicators: Vec<Indicator>,

    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub extras: Extras,
}

impl Package {
    /// An empty package with the given version and a fresh id in the
    /// `example` namespace.
    pub fn new(version: &str) -> Self {
        Package {
            id: Some(generate_id("example", "Package")),
            version: Some(version.to_string()),
            namespaces: vec![NamespaceBinding::new("example", "http://example.com/")],
            ..Default::default()
        }
    }
}

/// Build a STIX-style id such as `example:Indicator-<uuid>`.
pub fn generate_id(prefix: &str, kind: &str) -> String {
    format!("{}:{}-{}", prefix, kind, uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_intents: Vec<ControlledVocab>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<StructuredText>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_descriptions: Vec<StructuredText>,

    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub extras: Extras,
}

/// The `stix:Observables` container and its CybOX version attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observables {
    pub cybox_major_version: String,
    pub cybox_minor_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cybox_update_version: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observables: Vec<Observable>,

    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub extras: Extras,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Indicator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub negate: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<ControlledVocab>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<StructuredText>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_descriptions: Vec<StructuredText>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_time_positions: Vec<ValidTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observable: Option<Observable>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,

    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub extras: Extras,
}

impl Indicator {
    /// A new indicator with a fresh id and the given title.
    pub fn titled(title: &str) -> Self {
        Indicator {
            id: Some(generate_id("example", "Indicator")),
            title: Some(title.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Confidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ControlledVocab>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub descriptions: Vec<StructuredText>,
}

/// A CybOX observable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Observable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<StructuredText>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<CyboxObject>,

    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub extras: Extras,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CyboxObject {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idref: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<ObjectProperties>,

    #[serde(default, skip_serializing_if = "Extras::is_empty")]
    pub extras: Extras,
}

/// Object properties, selected by the `xsi:type` of `cybox:Properties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectProperties {
    DomainName(DomainNameProperties),
    Address(AddressProperties),
    Uri(UriProperties),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DomainNameProperties {
    /// "FQDN" or "TLD"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<PatternField>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddressProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_source: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_destination: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_value: Option<PatternField>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UriProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<PatternField>,
}

/// A CybOX property value that may carry a matching pattern.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatternField {
    pub value: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub apply_condition: Option<ApplyCondition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl PatternField {
    pub fn equals(value: &str) -> Self {
        PatternField {
            value: value.to_string(),
            condition: Some(Condition::Equals),
            ..Default::default()
        }
    }

    /// Split a list-valued field on its delimiter.
    pub fn values(&self) -> Vec<&str> {
        let delimiter = self.delimiter.as_deref().unwrap_or(DEFAULT_DELIMITER);
        self.value.split(delimiter).map(str::trim).collect()
    }
}

/// A controlled-vocabulary value; `vocab` is the resolved `xsi:type`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlledVocab {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab: Option<crate::xml_tree::QualifiedName>,
    pub value: String,
}

impl ControlledVocab {
    pub fn plain(value: &str) -> Self {
        ControlledVocab {
            vocab: None,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredText {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structuring_format: Option<String>,
    pub value: String,
}

impl StructuredText {
    pub fn plain(value: &str) -> Self {
        StructuredText {
            structuring_format: None,
            value: value.to_string(),
        }
    }
}

/// Unrecognized structure kept in lenient mode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Extras {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<Element>,
}

impl Extras {
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.elements.is_empty()
    }
}

macro_rules! literal_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "'{}' is not one of: {}",
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

literal_enum! {
    /// CybOX `ConditionTypeEnum`.
    Condition {
        Equals => "Equals",
        DoesNotEqual => "DoesNotEqual",
        Contains => "Contains",
        DoesNotContain => "DoesNotContain",
        StartsWith => "StartsWith",
        EndsWith => "EndsWith",
        GreaterThan => "GreaterThan",
        GreaterThanOrEqual => "GreaterThanOrEqual",
        LessThan => "LessThan",
        LessThanOrEqual => "LessThanOrEqual",
        FitsPattern => "FitsPattern",
        BitwiseAnd => "BitwiseAnd",
        BitwiseOr => "BitwiseOr",
    }
}

literal_enum! {
    /// How a condition applies to a list-valued field.
    ApplyCondition {
        All => "ALL",
        Any => "ANY",
        None => "NONE",
    }
}
