//! Where the input text comes from: a file, stdin, or (with the `fetch`
//! feature) an HTTP URL. The codec itself never sees the origin.

use crate::errors::CodecError;
use log::info;
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Stdin,
    Url(String),
}

impl Source {
    pub fn describe(&self) -> String {
        match self {
            Source::File(path) => path.display().to_string(),
            Source::Stdin => "<stdin>".to_string(),
            Source::Url(url) => url.clone(),
        }
    }
}

/// Read the whole input as UTF-8 text.
pub fn read_source(source: &Source) -> Result<String, CodecError> {
    match source {
        Source::File(path) => std::fs::read_to_string(path).map_err(|e| {
            CodecError::Io(e, format!("Failed to read input file {}", path.display()))
        }),
        Source::Stdin => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| CodecError::Io(e, "Failed to read stdin".to_string()))?;
            Ok(text)
        }
        Source::Url(url) => fetch_url(url),
    }
}

#[cfg(feature = "fetch")]
fn fetch_url(url: &str) -> Result<String, CodecError> {
    use std::time::Duration;

    info!("Fetching {}", url);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("stix-codec/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CodecError::Fetch(format!("Failed to build HTTP client: {}", e)))?;

    let response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| CodecError::Fetch(format!("GET {} failed: {}", url, e)))?;

    let text = response
        .text()
        .map_err(|e| CodecError::Fetch(format!("Failed to read body of {}: {}", url, e)))?;
    info!("Fetched {} bytes", text.len());
    Ok(text)
}

#[cfg(not(feature = "fetch"))]
fn fetch_url(url: &str) -> Result<String, CodecError> {
    info!("Refusing to fetch {}", url);
    Err(CodecError::Fetch(
        "URL input requires building with the `fetch` feature".to_string(),
    ))
}
