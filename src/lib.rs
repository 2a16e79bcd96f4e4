//! Main library for the STIX codec.
//!
//! This crate decodes STIX 1.x packages from XML into a typed model and
//! encodes them back, following the vocabulary of a schema artifact.

pub mod codec;
pub mod errors;
pub mod fetch;
pub mod formats;
pub mod schema;
pub mod stix;
pub mod xml_tree;

pub use codec::{CodecOptions, DocumentCodec, Strictness};
pub use errors::CodecError;
pub use schema::Schema;
pub use stix::Package;

/// The typed document produced by `decode`.
pub type Document = Package;

use fetch::Source;
use log::info;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// Top-level configuration for a round-trip run.
#[derive(Debug)]
pub struct Config {
    pub input: Source,
    pub output_file: Option<PathBuf>,
    pub output_format: Option<formats::Format>,
    pub strictness: Strictness,
    pub schema_file: Option<PathBuf>,
}

/// Read, decode, re-encode and write one document.
///
/// Nothing is written unless every step succeeds.
pub fn run(config: Config) -> Result<(), CodecError> {
    let start_time = Instant::now();
    info!("Starting round trip");
    info!("  Input: {}", config.input.describe());
    if let Some(output) = &config.output_file {
        info!("  Output: {}", output.display());
    }

    let output_format = config.output_format.unwrap_or_else(|| {
        config
            .output_file
            .as_deref()
            .and_then(|p| formats::Format::from_extension(p).ok())
            .unwrap_or(formats::Format::Xml)
    });
    info!("  Output format: {:?}", output_format);
    info!("  Strictness: {:?}", config.strictness);

    // --- 1. Schema ---
    let schema = match &config.schema_file {
        Some(path) => {
            info!("Loading schema artifact {}", path.display());
            Schema::from_file(path)?
        }
        None => Schema::bundled()?,
    };
    let codec = DocumentCodec::new(
        schema,
        CodecOptions {
            strictness: config.strictness,
        },
    );

    // --- 2. Input ---
    let text = fetch::read_source(&config.input)?;
    info!("Read {} bytes of input", text.len());

    // --- 3. Decode ---
    let decode_start = Instant::now();
    let package = codec.decode(&text)?;
    info!(
        "Decoded {} indicator(s). (Took {:.2?})",
        package.indicators.len(),
        decode_start.elapsed()
    );

    // --- 4. Encode ---
    let rendered = match output_format {
        formats::Format::Xml => codec.encode(&package)?,
        formats::Format::Json => serde_json::to_string_pretty(&package)?,
    };

    // --- 5. Output ---
    match &config.output_file {
        Some(path) => std::fs::write(path, rendered.as_bytes()).map_err(|e| {
            CodecError::Io(e, format!("Failed to write output file {}", path.display()))
        })?,
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| CodecError::Io(e, "Failed to write stdout".to_string()))?;
        }
    }

    info!("Total execution time: {:.2?}", start_time.elapsed());
    Ok(())
}
