//! The document codec: raw XML text ⇄ typed [`Package`].
//!
//! A `DocumentCodec` holds an immutable [`Schema`] and its options and is
//! otherwise stateless, so one instance can serve any number of threads.

use crate::errors::CodecError;
use crate::schema::Schema;
use crate::stix::{self, Package};
use crate::xml_tree;
use log::debug;

/// What to do with elements and attributes the schema does not describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Reject unknown structure with a schema mismatch.
    #[default]
    Strict,
    /// Keep unknown structure in `extras` and write it back out.
    Lenient,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    pub strictness: Strictness,
}

#[derive(Debug, Clone)]
pub struct DocumentCodec {
    schema: Schema,
    options: CodecOptions,
}

impl DocumentCodec {
    pub fn new(schema: Schema, options: CodecOptions) -> Self {
        Self { schema, options }
    }

    /// A strict codec over the bundled STIX 1.2 vocabulary.
    pub fn stix() -> Result<Self, CodecError> {
        Ok(Self::new(Schema::bundled()?, CodecOptions::default()))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    /// Decode XML text into a package.
    pub fn decode(&self, text: &str) -> Result<Package, CodecError> {
        let root = xml_tree::parse(text)?;
        let package = stix::decode::package(&root, &self.schema, self.options.strictness)?;
        debug!(
            "Decoded {} {} package: {} indicator(s), {} observable(s)",
            self.schema.name(),
            package.version.as_deref().unwrap_or("?"),
            package.indicators.len(),
            package
                .observables
                .as_ref()
                .map(|o| o.observables.len())
                .unwrap_or(0)
        );
        Ok(package)
    }

    /// Encode a package as indented UTF-8 XML with an XML declaration.
    pub fn encode(&self, doc: &Package) -> Result<String, CodecError> {
        let root = stix::encode::package(doc, &self.schema)?;
        let text = xml_tree::write(&root)?;
        debug!("Encoded package into {} bytes of XML", text.len());
        Ok(text)
    }
}
