//! Output format selection.
//!
//! Packages are always read as XML; they can be written back as XML or
//! dumped as JSON for inspection.

use crate::errors::CodecError;
use clap::ValueEnum;
use std::path::Path;

/// Supported output formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// XML format
    Xml,
    /// JSON dump of the decoded model
    Json,
}

impl Format {
    /// Detect format from file extension
    pub fn from_extension(path: &Path) -> Result<Self, CodecError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                CodecError::InvalidInput(format!(
                    "Could not determine file extension for: {}",
                    path.display()
                ))
            })?;

        match extension.to_lowercase().as_str() {
            "xml" | "stix" => Ok(Format::Xml),
            "json" => Ok(Format::Json),
            ext => Err(CodecError::InvalidInput(format!(
                "Unsupported file format: .{}. Supported formats: .xml, .json",
                ext
            ))),
        }
    }
}
