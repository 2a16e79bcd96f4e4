//! Round-trip tests for the STIX codec.
//!
//! These decode real and hand-written STIX packages, encode them back
//! and check that nothing of meaning is lost on the way.

use pretty_assertions::assert_eq;
use std::fs;
use std::path::PathBuf;
use stix_codec::stix::{ApplyCondition, Condition, Indicator, ObjectProperties, Package};
use stix_codec::{CodecError, CodecOptions, DocumentCodec, Schema, Strictness};

// --- Helper Functions ---

fn codec() -> DocumentCodec {
    DocumentCodec::stix().unwrap()
}

fn lenient_codec() -> DocumentCodec {
    DocumentCodec::new(
        Schema::bundled().unwrap(),
        CodecOptions {
            strictness: Strictness::Lenient,
        },
    )
}

fn data_file(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name);
    fs::read_to_string(&path).unwrap()
}

const MINIMAL: &str = r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:indicator="http://stix.mitre.org/Indicator-2" version="1.0">
  <stix:Indicators>
    <stix:Indicator id="example:indicator-1">
      <indicator:Title>Known malicious domain</indicator:Title>
    </stix:Indicator>
  </stix:Indicators>
</stix:STIX_Package>"#;

// --- Tests ---

#[test]
fn test_minimal_package_roundtrip() {
    let codec = codec();
    let doc = codec.decode(MINIMAL).unwrap();

    assert_eq!(doc.version.as_deref(), Some("1.0"));
    assert_eq!(doc.indicators.len(), 1);
    assert_eq!(
        doc.indicators[0].title.as_deref(),
        Some("Known malicious domain")
    );
    assert_eq!(doc.indicators[0].id.as_deref(), Some("example:indicator-1"));

    let xml = codec.encode(&doc).unwrap();
    let again = codec.decode(&xml).unwrap();
    assert_eq!(again.indicators.len(), 1);
    assert_eq!(
        again.indicators[0].title.as_deref(),
        Some("Known malicious domain")
    );
    assert_eq!(again, doc);
}

#[test]
fn test_domain_watchlist_decodes() {
    let doc = codec().decode(&data_file("STIX_Domain_Watchlist.xml")).unwrap();

    assert_eq!(
        doc.id.as_deref(),
        Some("example:Package-2fb96bef-1b11-436e-af4a-15588ac3198b")
    );
    assert_eq!(doc.version.as_deref(), Some("1.2"));
    assert!(doc.schema_location.is_some());

    let header = doc.header.as_ref().unwrap();
    assert_eq!(
        header.title.as_deref(),
        Some("Example watchlist that contains domain information.")
    );
    assert_eq!(header.package_intents.len(), 1);
    assert_eq!(header.package_intents[0].value, "Indicators - Watchlist");
    assert_eq!(
        header.package_intents[0].vocab.as_ref().unwrap().local,
        "PackageIntentVocab-1.0"
    );

    assert_eq!(doc.indicators.len(), 1);
    let indicator = &doc.indicators[0];
    assert_eq!(indicator.types[0].value, "Domain Watchlist");
    assert_eq!(
        indicator.descriptions[0].value,
        "Sample domain Indicator for this watchlist"
    );

    let object = indicator
        .observable
        .as_ref()
        .and_then(|o| o.object.as_ref())
        .unwrap();
    let domain = match object.properties.as_ref().unwrap() {
        ObjectProperties::DomainName(d) => d,
        other => panic!("Expected domain name properties, got {:?}", other),
    };
    assert_eq!(domain.domain_type.as_deref(), Some("FQDN"));

    let value = domain.value.as_ref().unwrap();
    assert_eq!(value.condition, Some(Condition::Equals));
    assert_eq!(value.apply_condition, Some(ApplyCondition::Any));
    assert_eq!(
        value.values(),
        vec![
            "malicious1.example.com",
            "malicious2.example.com",
            "malicious3.example.com"
        ]
    );
}

#[test]
fn test_domain_watchlist_roundtrip_is_stable() {
    let codec = codec();
    let doc = codec.decode(&data_file("STIX_Domain_Watchlist.xml")).unwrap();

    let first = codec.encode(&doc).unwrap();
    let decoded = codec.decode(&first).unwrap();
    assert_eq!(decoded, doc);

    let second = codec.encode(&decoded).unwrap();
    assert_eq!(second, first);
}

#[test]
fn test_encoded_output_has_declaration_and_prefixes() {
    let codec = codec();
    let doc = codec.decode(&data_file("STIX_Domain_Watchlist.xml")).unwrap();
    let xml = codec.encode(&doc).unwrap();

    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<stix:STIX_Package"));
    assert!(xml.contains("xmlns:DomainNameObj=\"http://cybox.mitre.org/objects#DomainNameObject-1\""));
    assert!(xml.contains("xsi:type=\"DomainNameObj:DomainNameObjectType\""));
    assert!(xml.contains("xmlns:example=\"http://example.com/\""));
}

#[test]
fn test_malformed_input_is_rejected() {
    let result = codec().decode("<stix:STIX_Package xmlns:stix=\"http://stix.mitre.org/stix-1\" version=\"1.2\"><stix:STIX_Header></stix:STIX_Package>");
    match result {
        Err(CodecError::MalformedInput { position, .. }) => assert_eq!(position.line, 1),
        other => panic!("Expected MalformedInput, got {:?}", other),
    }
}

#[test]
fn test_truncated_input_is_rejected() {
    let text = data_file("STIX_Domain_Watchlist.xml");
    let truncated = &text[..text.len() / 2];
    assert!(matches!(
        codec().decode(truncated),
        Err(CodecError::MalformedInput { .. })
    ));
}

#[test]
fn test_unrelated_vocabulary_is_rejected() {
    let xml = r#"<?xml version="1.0"?>
<bom xmlns="http://cyclonedx.org/schema/bom/1.6" version="1">
  <components/>
</bom>"#;
    match codec().decode(xml) {
        Err(CodecError::SchemaMismatch { path, .. }) => assert_eq!(path, "/"),
        other => panic!("Expected SchemaMismatch, got {:?}", other),
    }
}

#[test]
fn test_empty_package_cannot_be_encoded() {
    assert!(matches!(
        codec().encode(&Package::default()),
        Err(CodecError::IncompleteDocument { .. })
    ));
}

#[test]
fn test_unknown_element_strict_vs_lenient() {
    let xml = r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:indicator="http://stix.mitre.org/Indicator-2"
    xmlns:acme="http://acme.example/ext" version="1.2">
  <stix:Indicators>
    <stix:Indicator id="example:indicator-1" acme:score="7">
      <indicator:Title>Tagged</indicator:Title>
      <acme:Note>kept as is</acme:Note>
    </stix:Indicator>
  </stix:Indicators>
</stix:STIX_Package>"#;

    match codec().decode(xml) {
        Err(CodecError::SchemaMismatch { path, .. }) => {
            assert!(path.starts_with("STIX_Package/Indicators/Indicator"))
        }
        other => panic!("Expected SchemaMismatch, got {:?}", other),
    }

    let lenient = lenient_codec();
    let doc = lenient.decode(xml).unwrap();
    let extras = &doc.indicators[0].extras;
    assert_eq!(extras.attributes.len(), 1);
    assert_eq!(extras.elements.len(), 1);
    assert_eq!(extras.elements[0].text(), "kept as is");

    let reencoded = lenient.decode(&lenient.encode(&doc).unwrap()).unwrap();
    assert_eq!(reencoded, doc);
}

#[test]
fn test_lenient_roundtrip_keeps_xml_lang() {
    let xml = r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1"
    xmlns:indicator="http://stix.mitre.org/Indicator-2" version="1.2">
  <stix:Indicators>
    <stix:Indicator id="example:indicator-1" xml:lang="en">
      <indicator:Title>Localized</indicator:Title>
    </stix:Indicator>
  </stix:Indicators>
</stix:STIX_Package>"#;

    let codec = lenient_codec();
    let doc = codec.decode(xml).unwrap();
    assert_eq!(doc.indicators[0].extras.attributes.len(), 1);

    let encoded = codec.encode(&doc).unwrap();
    assert!(encoded.contains("xml:lang=\"en\""));
    assert!(!encoded.contains("http://www.w3.org/XML/1998/namespace"));
    assert_eq!(codec.decode(&encoded).unwrap(), doc);
}

#[test]
fn test_padded_text_roundtrip() {
    let codec = codec();
    let mut doc = Package::new("1.2");
    let mut indicator = Indicator::titled("  padded  ");
    indicator.alternative_ids.push("\tALT-1 ".to_string());
    doc.indicators.push(indicator);

    let again = codec.decode(&codec.encode(&doc).unwrap()).unwrap();
    assert_eq!(again.indicators[0].title.as_deref(), Some("  padded  "));
    assert_eq!(again, doc);
}

#[test]
fn test_nested_instance_namespace_is_declared_on_encode() {
    let xml = r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1" version="1.2">
  <stix:Indicators>
    <stix:Indicator xmlns:example="http://example.com/" id="example:Indicator-1"/>
  </stix:Indicators>
</stix:STIX_Package>"#;

    let codec = codec();
    let doc = codec.decode(xml).unwrap();
    let encoded = codec.encode(&doc).unwrap();
    assert!(encoded.contains("xmlns:example=\"http://example.com/\""));
    assert_eq!(codec.decode(&encoded).unwrap(), doc);
}

const CUSTOM_SCHEMA: &str = r#"{
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
}"#;

#[test]
fn test_custom_schema_artifact_roundtrip() {
    let custom = DocumentCodec::new(
        Schema::from_json(CUSTOM_SCHEMA).unwrap(),
        CodecOptions::default(),
    );
    let xml = r#"<s:Bundle xmlns:s="urn:test:stix" xmlns:i="urn:test:indicator" version="2.0">
  <s:Indicators>
    <s:Indicator>
      <i:Title>Custom vocabulary</i:Title>
    </s:Indicator>
  </s:Indicators>
</s:Bundle>"#;

    let doc = custom.decode(xml).unwrap();
    assert_eq!(doc.version.as_deref(), Some("2.0"));
    assert_eq!(doc.indicators[0].title.as_deref(), Some("Custom vocabulary"));

    let encoded = custom.encode(&doc).unwrap();
    assert!(encoded.contains("<s:Bundle"));
    assert!(encoded.contains("xmlns:i=\"urn:test:indicator\""));
    assert!(encoded.contains("xsi:type=\"i:IndicatorType\""));
    assert!(!encoded.contains("stix.mitre.org"));
    assert_eq!(custom.decode(&encoded).unwrap(), doc);

    assert!(matches!(
        codec().decode(xml),
        Err(CodecError::SchemaMismatch { .. })
    ));
}
