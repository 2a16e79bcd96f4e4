//! Defines the custom error types for the codec.
//!
//! This uses `thiserror` for clean, boilerplate-free error handling. The
//! three document-level failures (`MalformedInput`, `SchemaMismatch`,
//! `IncompleteDocument`) carry enough context to point at the offending
//! element or field.

use std::fmt;
use thiserror::Error;

/// A 1-based line/column location inside the decoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Translate a byte offset into a line/column pair.
    ///
    /// Offsets past the end of `text` are clamped to the end.
    pub fn locate(text: &str, offset: usize) -> Self {
        let mut end = offset.min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let before = &text[..end];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

fn at(position: &Option<Position>) -> String {
    match position {
        Some(p) => format!(" ({})", p),
        None => String::new(),
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Malformed XML at {position}: {message}")]
    MalformedInput { message: String, position: Position },

    #[error("Schema mismatch at {path}{}: {message}", at(.position))]
    SchemaMismatch {
        path: String,
        message: String,
        position: Option<Position>,
    },

    #[error("Incomplete document at {path}: {message}")]
    IncompleteDocument { path: String, message: String },

    #[error("Schema Artifact Error: {0}")]
    SchemaArtifact(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("I/O Error: {1} - {0}")]
    Io(#[source] std::io::Error, String),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Fetch Error: {0}")]
    Fetch(String),

    #[error("Invalid Input: {0}")]
    InvalidInput(String),
}

impl CodecError {
    pub(crate) fn mismatch(
        path: impl Into<String>,
        message: impl Into<String>,
        position: Option<Position>,
    ) -> Self {
        CodecError::SchemaMismatch {
            path: path.into(),
            message: message.into(),
            position,
        }
    }

    pub(crate) fn incomplete(path: impl Into<String>, message: impl Into<String>) -> Self {
        CodecError::IncompleteDocument {
            path: path.into(),
            message: message.into(),
        }
    }
}

// Implement From<io::Error> for easier error handling
impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err, "IO operation failed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_first_line() {
        assert_eq!(Position::locate("<a/>", 0), Position { line: 1, column: 1 });
        assert_eq!(Position::locate("<a/>", 3), Position { line: 1, column: 4 });
    }

    #[test]
    fn test_locate_after_newlines() {
        let text = "<a>\n  <b/>\n</a>";
        assert_eq!(Position::locate(text, 6), Position { line: 2, column: 3 });
        assert_eq!(Position::locate(text, 1000), Position { line: 3, column: 5 });
    }

    #[test]
    fn test_mismatch_display_includes_position() {
        let err = CodecError::mismatch(
            "STIX_Package",
            "unexpected root",
            Some(Position { line: 2, column: 7 }),
        );
        assert_eq!(
            err.to_string(),
            "Schema mismatch at STIX_Package (line 2, column 7): unexpected root"
        );
    }
}
