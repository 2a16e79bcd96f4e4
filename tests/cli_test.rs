//! Integration tests for the stix-codec binary.
//!
//! These run the full executable against files in `tests/data` and
//! against documents written on the fly.

use predicates::prelude::*;
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use assert_cmd::Command;
use tempfile::tempdir;

// --- Helper Functions ---

fn get_cmd() -> Command {
    Command::cargo_bin("stix-codec").unwrap()
}

fn watchlist() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("STIX_Domain_Watchlist.xml")
}

// --- Test Cases ---

#[test]
fn test_file_roundtrip_to_xml() {
    let dir = tempdir().unwrap();
    let output_path = dir.path().join("out.xml");

    get_cmd()
        .arg("--input")
        .arg(watchlist())
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let output = fs::read_to_string(&output_path).unwrap();
    assert!(output.starts_with("<?xml"));
    assert!(output.contains("malicious1.example.com##comma##malicious2.example.com"));
    assert!(output.contains("<stix:Title>Example watchlist that contains domain information.</stix:Title>"));
}

#[test]
fn test_json_output_by_extension() {
    let dir = tempdir().unwrap();
    let output_path = dir.path().join("out.json");

    get_cmd()
        .arg("-i")
        .arg(watchlist())
        .arg("-o")
        .arg(&output_path)
        .assert()
        .success();

    let output: Value = serde_json::from_str(&fs::read_to_string(&output_path).unwrap()).unwrap();
    assert_eq!(output["version"], "1.2");
    let indicators = output["indicators"].as_array().unwrap();
    assert_eq!(indicators.len(), 1);
    let properties = &indicators[0]["observable"]["object"]["properties"];
    assert_eq!(properties["kind"], "domain_name");
    assert_eq!(properties["domain_type"], "FQDN");
}

#[test]
fn test_json_format_flag_on_stdout() {
    get_cmd()
        .arg("--input")
        .arg(watchlist())
        .arg("--format")
        .arg("json")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Domain Watchlist\""));
}

#[test]
fn test_reads_stdin() {
    let xml = r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:indicator="http://stix.mitre.org/Indicator-2" version="1.0">
  <stix:Indicators>
    <stix:Indicator id="example:indicator-1">
      <indicator:Title>Known malicious domain</indicator:Title>
    </stix:Indicator>
  </stix:Indicators>
</stix:STIX_Package>"#;

    get_cmd()
        .write_stdin(xml)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "<indicator:Title>Known malicious domain</indicator:Title>",
        ));
}

#[test]
fn test_malformed_file_fails_without_output() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("broken.xml");
    let output_path = dir.path().join("out.xml");

    let mut input_file = File::create(&input_path).unwrap();
    writeln!(
        input_file,
        "<stix:STIX_Package xmlns:stix=\"http://stix.mitre.org/stix-1\" version=\"1.2\">"
    )
    .unwrap();

    get_cmd()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed XML"));

    assert!(!output_path.exists());
}

#[test]
fn test_strict_rejects_unknown_element_and_lenient_keeps_it() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("ext.xml");
    fs::write(
        &input_path,
        r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:acme="http://acme.example/ext" version="1.2">
  <acme:Marking>internal</acme:Marking>
</stix:STIX_Package>"#,
    )
    .unwrap();

    get_cmd()
        .arg("--input")
        .arg(&input_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("STIX_Package"));

    get_cmd()
        .arg("--input")
        .arg(&input_path)
        .arg("--lenient")
        .assert()
        .success()
        .stdout(predicate::str::contains("<acme:Marking>internal</acme:Marking>"));
}

#[test]
fn test_missing_input_file_fails() {
    get_cmd()
        .arg("--input")
        .arg("does-not-exist.xml")
        .assert()
        .failure();
}

#[test]
fn test_input_with_byte_order_mark() {
    let dir = tempdir().unwrap();
    let input_path = dir.path().join("bom.xml");
    fs::write(
        &input_path,
        "\u{feff}<stix:STIX_Package xmlns:stix=\"http://stix.mitre.org/stix-1\" version=\"1.2\"/>",
    )
    .unwrap();

    get_cmd()
        .arg("--input")
        .arg(&input_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("<stix:STIX_Package"));
}

#[test]
fn test_non_xml_input_is_malformed() {
    get_cmd()
        .write_stdin("this is not xml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed XML at line 1"));
}

#[test]
fn test_custom_schema_file() {
    let dir = tempdir().unwrap();
    let schema_path = dir.path().join("vocabulary.json");
    let input_path = dir.path().join("bundle.xml");
    fs::write(
        &schema_path,
        r#"{
  "name": "Test Vocabulary",
  "root": "Bundle",
  "versions": ["2.0"],
  "namespaces": {
    "stix": { "prefix": "s", "uri": "urn:test:stix" },
    "stix_common": { "prefix": "c", "uri": "urn:test:common" },
    "indicator": { "prefix": "i", "uri": "urn:test:indicator" },
    "cybox": { "prefix": "o", "uri": "urn:test:cybox" },
    "vocabs": { "prefix": "v", "uri": "urn:test:vocabs" },
    "domain_name_object": { "prefix": "dn", "uri": "urn:test:domain" },
    "address_object": { "prefix": "ad", "uri": "urn:test:address" },
    "uri_object": { "prefix": "u", "uri": "urn:test:uri" }
  }
}"#,
    )
    .unwrap();
    fs::write(
        &input_path,
        r#"<s:Bundle xmlns:s="urn:test:stix" version="2.0"/>"#,
    )
    .unwrap();

    get_cmd()
        .arg("--input")
        .arg(&input_path)
        .arg("--schema")
        .arg(&schema_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("<s:Bundle"));
}

#[test]
fn test_bad_schema_file_fails_without_output() {
    let dir = tempdir().unwrap();
    let schema_path = dir.path().join("broken.json");
    let output_path = dir.path().join("out.xml");
    fs::write(
        &schema_path,
        r#"{ "name": "Broken", "root": "STIX_Package", "versions": [], "namespaces": {} }"#,
    )
    .unwrap();

    get_cmd()
        .arg("--input")
        .arg(watchlist())
        .arg("--schema")
        .arg(&schema_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schema Artifact Error"));

    assert!(!output_path.exists());
}
