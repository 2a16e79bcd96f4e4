//! Loads and validates the schema artifact that fixes the XML vocabulary.
//!
//! The codec never hard-codes namespace URIs: every element it reads or
//! writes is looked up through a [`Schema`], which names the root element,
//! the supported `version` values and the namespace URI/prefix for each
//! vocabulary role. Supporting another STIX 1.x revision means supplying a
//! different artifact.

use crate::errors::CodecError;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// The STIX 1.2 artifact shipped with the crate.
const BUNDLED_STIX_1_2: &str = include_str!("../schemas/stix-1.2.json");

/// The vocabulary roles the binding layer needs a namespace for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceRole {
    Stix,
    StixCommon,
    Indicator,
    Cybox,
    Vocabs,
    DomainNameObject,
    AddressObject,
    UriObject,
}

impl NamespaceRole {
    pub const ALL: [NamespaceRole; 8] = [
        NamespaceRole::Stix,
        NamespaceRole::StixCommon,
        NamespaceRole::Indicator,
        NamespaceRole::Cybox,
        NamespaceRole::Vocabs,
        NamespaceRole::DomainNameObject,
        NamespaceRole::AddressObject,
        NamespaceRole::UriObject,
    ];

    /// Get the artifact key (e.g., "stix_common")
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceRole::Stix => "stix",
            NamespaceRole::StixCommon => "stix_common",
            NamespaceRole::Indicator => "indicator",
            NamespaceRole::Cybox => "cybox",
            NamespaceRole::Vocabs => "vocabs",
            NamespaceRole::DomainNameObject => "domain_name_object",
            NamespaceRole::AddressObject => "address_object",
            NamespaceRole::UriObject => "uri_object",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A namespace URI together with the prefix preferred when writing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub prefix: String,
    pub uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaArtifact {
    name: String,
    root: String,
    versions: Vec<String>,
    namespaces: BTreeMap<NamespaceRole, NamespaceDecl>,
}

/// An immutable, validated schema artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    root: String,
    versions: Vec<String>,
    namespaces: Vec<NamespaceDecl>,
}

impl Schema {
    /// Parse and validate a schema artifact from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let artifact: SchemaArtifact = serde_json::from_str(text)
            .map_err(|e| CodecError::SchemaArtifact(format!("Failed to parse artifact: {}", e)))?;
        Self::validate(artifact)
    }

    /// Load a schema artifact from a file.
    pub fn from_file(path: &Path) -> Result<Self, CodecError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CodecError::Io(e, format!("Failed to read schema artifact {}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// The STIX 1.2 vocabulary embedded in the crate.
    pub fn bundled() -> Result<Self, CodecError> {
        Self::from_json(BUNDLED_STIX_1_2)
    }

    fn validate(artifact: SchemaArtifact) -> Result<Self, CodecError> {
        let SchemaArtifact {
            name,
            root,
            versions,
            mut namespaces,
        } = artifact;

        if name.trim().is_empty() {
            return Err(CodecError::SchemaArtifact("name must not be empty".to_string()));
        }
        if !is_ncname(&root) {
            return Err(CodecError::SchemaArtifact(format!(
                "root element '{}' is not a valid XML name",
                root
            )));
        }
        if versions.is_empty() || versions.iter().any(|v| v.trim().is_empty()) {
            return Err(CodecError::SchemaArtifact(
                "versions must list at least one non-empty version".to_string(),
            ));
        }

        let mut ordered = Vec::with_capacity(NamespaceRole::ALL.len());
        for role in NamespaceRole::ALL {
            let decl = namespaces.remove(&role).ok_or_else(|| {
                CodecError::SchemaArtifact(format!("missing namespace for role '{}'", role.as_str()))
            })?;
            if decl.uri.trim().is_empty() {
                return Err(CodecError::SchemaArtifact(format!(
                    "namespace URI for role '{}' is empty",
                    role.as_str()
                )));
            }
            if !is_ncname(&decl.prefix) || decl.prefix.to_ascii_lowercase().starts_with("xml") {
                return Err(CodecError::SchemaArtifact(format!(
                    "prefix '{}' for role '{}' is not usable",
                    decl.prefix,
                    role.as_str()
                )));
            }
            if let Some(clash) = ordered
                .iter()
                .find(|d: &&NamespaceDecl| d.uri == decl.uri || d.prefix == decl.prefix)
            {
                return Err(CodecError::SchemaArtifact(format!(
                    "role '{}' reuses the prefix or URI of '{}' ({})",
                    role.as_str(),
                    clash.prefix,
                    clash.uri
                )));
            }
            ordered.push(decl);
        }

        debug!(
            "Loaded schema artifact {} (root {}, versions {:?})",
            name, root, versions
        );

        Ok(Schema {
            name,
            root,
            versions,
            namespaces: ordered,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local name of the root element, in the `stix` namespace.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v == version)
    }

    pub fn uri(&self, role: NamespaceRole) -> &str {
        &self.namespaces[role.index()].uri
    }

    pub fn prefix(&self, role: NamespaceRole) -> &str {
        &self.namespaces[role.index()].prefix
    }

    /// All vocabulary namespaces in role order.
    pub fn namespaces(&self) -> &[NamespaceDecl] {
        &self.namespaces
    }

    /// The role a namespace URI plays in this schema, if any.
    pub fn role_of(&self, uri: &str) -> Option<NamespaceRole> {
        NamespaceRole::ALL
            .into_iter()
            .find(|role| self.namespaces[role.index()].uri == uri)
    }
}

/// Check the XML `NCName` production (a name without a colon).
pub(crate) fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
