//! Element tree → typed [`Package`].

use super::{parse_bool, parse_timestamp, Fields};
use super::document::*;
use crate::codec::Strictness;
use crate::errors::CodecError;
use crate::schema::{NamespaceRole, Schema};
use crate::xml_tree::{Element, NamespaceBinding, XSI_NAMESPACE};
use log::warn;

struct Decoder<'s> {
    schema: &'s Schema,
    strictness: Strictness,
}

/// Map a parsed root element onto a [`Package`].
pub fn package(
    root: &Element,
    schema: &Schema,
    strictness: Strictness,
) -> Result<Package, CodecError> {
    Decoder { schema, strictness }.package(root)
}

impl<'s> Decoder<'s> {
    fn ns(&self, role: NamespaceRole) -> &'s str {
        self.schema.uri(role)
    }

    fn fields<'a>(&self, element: &'a Element, path: String) -> Fields<'a> {
        Fields::new(element, path, self.strictness)
    }

    fn package(&self, root: &Element) -> Result<Package, CodecError> {
        let stix = self.ns(NamespaceRole::Stix);
        if !root.name.is(stix, self.schema.root()) {
            return Err(CodecError::mismatch(
                "/",
                format!(
                    "expected root element {{{}}}{} of schema {}, found {}",
                    stix,
                    self.schema.root(),
                    self.schema.name(),
                    root.name
                ),
                root.position,
            ));
        }

        let mut f = self.fields(root, self.schema.root().to_string());

        let version = f.required_attr("version")?.trim().to_string();
        if !self.schema.supports_version(&version) {
            return Err(f.mismatch(format!(
                "version '{}' is not supported by schema {} (supported: {})",
                version,
                self.schema.name(),
                self.schema.versions().join(", ")
            )));
        }

        let id = f.attr("id").map(str::to_string);
        let idref = f.attr("idref").map(str::to_string);
        let timestamp = self.timestamp_attr(&mut f, "timestamp")?;
        let schema_location = f
            .attr_ns(XSI_NAMESPACE, "schemaLocation")
            .map(str::to_string);

        let namespaces = self.instance_namespaces(root);

        let header = match f.child(stix, "STIX_Header")? {
            Some((el, path)) => Some(self.header(el, path)?),
            None => None,
        };

        let observables = match f.child(stix, "Observables")? {
            Some((el, path)) => Some(self.observables(el, path)?),
            None => None,
        };

        let mut indicators = Vec::new();
        if let Some((el, path)) = f.child(stix, "Indicators")? {
            let mut list = self.fields(el, path);
            for (child, child_path) in list.children(stix, "Indicator") {
                indicators.push(self.indicator(child, child_path)?);
            }
            list.finish_dropping()?;
        }

        let extras = f.finish()?;

        Ok(Package {
            id,
            idref,
            version: Some(version),
            timestamp,
            schema_location,
            namespaces,
            header,
            observables,
            indicators,
            extras,
        })
    }

    /// Non-vocabulary declarations: all of the root's, then prefixed ones
    /// from nested elements in document order whose prefix and URI are
    /// still free.
    fn instance_namespaces(&self, root: &Element) -> Vec<NamespaceBinding> {
        let is_instance = |b: &NamespaceBinding| {
            b.uri != XSI_NAMESPACE && self.schema.role_of(&b.uri).is_none()
        };
        let mut found: Vec<NamespaceBinding> =
            root.namespaces.iter().filter(|b| is_instance(b)).cloned().collect();

        let mut pending: Vec<&Element> = root.child_elements().collect();
        pending.reverse();
        while let Some(element) = pending.pop() {
            for binding in &element.namespaces {
                let free = binding.prefix.is_some()
                    && !found
                        .iter()
                        .any(|b| b.prefix == binding.prefix || b.uri == binding.uri);
                if free && is_instance(binding) {
                    found.push(binding.clone());
                }
            }
            let start = pending.len();
            pending.extend(element.child_elements());
            pending[start..].reverse();
        }
        found
    }

    fn header(&self, element: &Element, path: String) -> Result<Header, CodecError> {
        let stix = self.ns(NamespaceRole::Stix);
        let mut f = self.fields(element, path);

        let title = self.optional_text(&mut f, stix, "Title")?;
        let package_intents = f
            .children(stix, "Package_Intent")
            .into_iter()
            .map(|(el, path)| self.vocab(el, path))
            .collect::<Result<Vec<_>, _>>()?;
        let descriptions = self.structured_list(&mut f, stix, "Description")?;
        let short_descriptions = self.structured_list(&mut f, stix, "Short_Description")?;
        let extras = f.finish()?;

        Ok(Header {
            title,
            package_intents,
            descriptions,
            short_descriptions,
            extras,
        })
    }

    fn observables(&self, element: &Element, path: String) -> Result<Observables, CodecError> {
        let cybox = self.ns(NamespaceRole::Cybox);
        let mut f = self.fields(element, path);

        let cybox_major_version = f.required_attr("cybox_major_version")?.to_string();
        let cybox_minor_version = f.required_attr("cybox_minor_version")?.to_string();
        let cybox_update_version = f.attr("cybox_update_version").map(str::to_string);

        let observables = f
            .children(cybox, "Observable")
            .into_iter()
            .map(|(el, path)| self.observable(el, path))
            .collect::<Result<Vec<_>, _>>()?;
        let extras = f.finish()?;

        Ok(Observables {
            cybox_major_version,
            cybox_minor_version,
            cybox_update_version,
            observables,
            extras,
        })
    }

    fn indicator(&self, element: &Element, path: String) -> Result<Indicator, CodecError> {
        let ind = self.ns(NamespaceRole::Indicator);
        let common = self.ns(NamespaceRole::StixCommon);
        let mut f = self.fields(element, path);

        if let Some(xsi_type) = f.xsi_type() {
            if !xsi_type.is(ind, "IndicatorType") {
                return Err(f.mismatch(format!(
                    "unsupported indicator type {}, expected {{{}}}IndicatorType",
                    xsi_type, ind
                )));
            }
        }

        let id = f.attr("id").map(str::to_string);
        let idref = f.attr("idref").map(str::to_string);
        let version = f.attr("version").map(str::to_string);
        let timestamp = self.timestamp_attr(&mut f, "timestamp")?;
        let negate = self.bool_attr(&mut f, "negate")?;

        let title = self.optional_text(&mut f, ind, "Title")?;
        let types = f
            .children(ind, "Type")
            .into_iter()
            .map(|(el, path)| self.vocab(el, path))
            .collect::<Result<Vec<_>, _>>()?;
        let alternative_ids = f
            .children(ind, "Alternative_ID")
            .into_iter()
            .map(|(el, path)| self.leaf_text(el, path))
            .collect::<Result<Vec<_>, _>>()?;
        let descriptions = self.structured_list(&mut f, ind, "Description")?;
        let short_descriptions = self.structured_list(&mut f, ind, "Short_Description")?;

        let valid_time_positions = f
            .children(ind, "Valid_Time_Position")
            .into_iter()
            .map(|(el, path)| self.valid_time(el, path))
            .collect::<Result<Vec<_>, _>>()?;

        let observable = match f.child(ind, "Observable")? {
            Some((el, path)) => Some(self.observable(el, path)?),
            None => None,
        };

        let confidence = match f.child(ind, "Confidence")? {
            Some((el, path)) => Some(self.confidence(el, path, common)?),
            None => None,
        };

        let extras = f.finish()?;

        Ok(Indicator {
            id,
            idref,
            version,
            timestamp,
            negate,
            title,
            types,
            alternative_ids,
            descriptions,
            short_descriptions,
            valid_time_positions,
            observable,
            confidence,
            extras,
        })
    }

    fn valid_time(&self, element: &Element, path: String) -> Result<ValidTime, CodecError> {
        let ind = self.ns(NamespaceRole::Indicator);
        let mut f = self.fields(element, path);
        let start = self.timestamp_child(&mut f, ind, "Start_Time")?;
        let end = self.timestamp_child(&mut f, ind, "End_Time")?;
        f.finish_dropping()?;
        Ok(ValidTime { start, end })
    }

    fn confidence(
        &self,
        element: &Element,
        path: String,
        common: &str,
    ) -> Result<Confidence, CodecError> {
        let mut f = self.fields(element, path);
        let timestamp = self.timestamp_attr(&mut f, "timestamp")?;
        let value = match f.child(common, "Value")? {
            Some((el, path)) => Some(self.vocab(el, path)?),
            None => None,
        };
        let descriptions = self.structured_list(&mut f, common, "Description")?;
        f.finish_dropping()?;
        Ok(Confidence {
            timestamp,
            value,
            descriptions,
        })
    }

    fn observable(&self, element: &Element, path: String) -> Result<Observable, CodecError> {
        let cybox = self.ns(NamespaceRole::Cybox);
        let mut f = self.fields(element, path);

        let id = f.attr("id").map(str::to_string);
        let idref = f.attr("idref").map(str::to_string);
        let title = self.optional_text(&mut f, cybox, "Title")?;
        let description = match f.child(cybox, "Description")? {
            Some((el, path)) => Some(self.structured(el, path)?),
            None => None,
        };
        let object = match f.child(cybox, "Object")? {
            Some((el, path)) => Some(self.object(el, path)?),
            None => None,
        };
        let extras = f.finish()?;

        Ok(Observable {
            id,
            idref,
            title,
            description,
            object,
            extras,
        })
    }

    fn object(&self, element: &Element, path: String) -> Result<CyboxObject, CodecError> {
        let cybox = self.ns(NamespaceRole::Cybox);
        let mut f = self.fields(element, path);

        let id = f.attr("id").map(str::to_string);
        let idref = f.attr("idref").map(str::to_string);
        let properties = match f.child(cybox, "Properties")? {
            Some((el, path)) => Some(self.properties(el, path)?),
            None => None,
        };
        let extras = f.finish()?;

        Ok(CyboxObject {
            id,
            idref,
            properties,
            extras,
        })
    }

    fn properties(&self, element: &Element, path: String) -> Result<ObjectProperties, CodecError> {
        let mut f = self.fields(element, path);
        let xsi_type = f
            .xsi_type()
            .ok_or_else(|| f.mismatch("cybox:Properties requires an xsi:type"))?;

        let domain = self.ns(NamespaceRole::DomainNameObject);
        let address = self.ns(NamespaceRole::AddressObject);
        let uri = self.ns(NamespaceRole::UriObject);

        let properties = if xsi_type.is(domain, "DomainNameObjectType") {
            let domain_type = f.attr("type").map(str::to_string);
            let value = self.pattern_child(&mut f, domain, "Value")?;
            ObjectProperties::DomainName(DomainNameProperties { domain_type, value })
        } else if xsi_type.is(address, "AddressObjectType") {
            let category = f.attr("category").map(str::to_string);
            let is_source = self.bool_attr(&mut f, "is_source")?;
            let is_destination = self.bool_attr(&mut f, "is_destination")?;
            let address_value = self.pattern_child(&mut f, address, "Address_Value")?;
            ObjectProperties::Address(AddressProperties {
                category,
                is_source,
                is_destination,
                address_value,
            })
        } else if xsi_type.is(uri, "URIObjectType") {
            let uri_type = f.attr("type").map(str::to_string);
            let value = self.pattern_child(&mut f, uri, "Value")?;
            ObjectProperties::Uri(UriProperties { uri_type, value })
        } else {
            return Err(f.mismatch(format!("unsupported object properties type {}", xsi_type)));
        };

        f.finish_dropping()?;
        Ok(properties)
    }

    // --- leaves ---

    fn leaf_text(&self, element: &Element, path: String) -> Result<String, CodecError> {
        let mut f = self.fields(element, path);
        let text = f.text()?;
        f.finish_dropping()?;
        Ok(text)
    }

    fn optional_text(
        &self,
        f: &mut Fields,
        namespace: &str,
        local: &str,
    ) -> Result<Option<String>, CodecError> {
        match f.child(namespace, local)? {
            Some((el, path)) => Ok(Some(self.leaf_text(el, path)?)),
            None => Ok(None),
        }
    }

    fn structured(&self, element: &Element, path: String) -> Result<StructuredText, CodecError> {
        let mut f = self.fields(element, path);
        let structuring_format = f.attr("structuring_format").map(str::to_string);
        let value = f.text()?;
        f.finish_dropping()?;
        Ok(StructuredText {
            structuring_format,
            value,
        })
    }

    fn structured_list(
        &self,
        f: &mut Fields,
        namespace: &str,
        local: &str,
    ) -> Result<Vec<StructuredText>, CodecError> {
        f.children(namespace, local)
            .into_iter()
            .map(|(el, path)| self.structured(el, path))
            .collect()
    }

    fn vocab(&self, element: &Element, path: String) -> Result<ControlledVocab, CodecError> {
        let mut f = self.fields(element, path);
        let vocab = f.xsi_type().cloned();
        let value = f.text()?;
        if value.trim().is_empty() {
            return Err(f.mismatch("controlled vocabulary value is empty"));
        }
        if let Some(vocab) = &vocab {
            let known = vocab.namespace.as_deref() == Some(self.ns(NamespaceRole::Vocabs));
            if !known {
                warn!("{}: vocabulary {} is not a default STIX vocabulary", f.path(), vocab);
            }
        }
        f.finish_dropping()?;
        Ok(ControlledVocab { vocab, value })
    }

    fn pattern_child(
        &self,
        f: &mut Fields,
        namespace: &str,
        local: &str,
    ) -> Result<Option<PatternField>, CodecError> {
        let Some((element, path)) = f.child(namespace, local)? else {
            return Ok(None);
        };
        let mut p = self.fields(element, path);

        let condition = match p.attr("condition") {
            Some(raw) => Some(raw.trim().parse::<Condition>().map_err(|e| p.mismatch(e))?),
            None => None,
        };
        let apply_condition = match p.attr("apply_condition") {
            Some(raw) => Some(raw.trim().parse::<ApplyCondition>().map_err(|e| p.mismatch(e))?),
            None => None,
        };
        let delimiter = p.attr("delimiter").map(str::to_string);
        let value = p.text()?;
        if value.trim().is_empty() {
            return Err(p.mismatch("property value is empty"));
        }
        p.finish_dropping()?;

        Ok(Some(PatternField {
            value,
            condition,
            apply_condition,
            delimiter,
        }))
    }

    fn timestamp_attr(&self, f: &mut Fields, local: &str) -> Result<Option<Timestamp>, CodecError> {
        match f.attr(local) {
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .map_err(|e| f.mismatch(format!("attribute '{}': {}", local, e))),
            None => Ok(None),
        }
    }

    fn timestamp_child(
        &self,
        f: &mut Fields,
        namespace: &str,
        local: &str,
    ) -> Result<Option<Timestamp>, CodecError> {
        let Some((element, path)) = f.child(namespace, local)? else {
            return Ok(None);
        };
        let mut t = self.fields(element, path);
        // precision is informational only
        let _ = t.attr("precision");
        let raw = t.text()?;
        let ts = parse_timestamp(&raw).map_err(|e| t.mismatch(e))?;
        t.finish_dropping()?;
        Ok(Some(ts))
    }

    fn bool_attr(&self, f: &mut Fields, local: &str) -> Result<Option<bool>, CodecError> {
        match f.attr(local) {
            Some(raw) => parse_bool(raw)
                .map(Some)
                .map_err(|e| f.mismatch(format!("attribute '{}': {}", local, e))),
            None => Ok(None),
        }
    }
}
