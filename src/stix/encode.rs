//! Typed [`Package`] → element tree.

use super::document::*;
use super::format_timestamp;
use crate::errors::CodecError;
use crate::schema::{NamespaceRole, Schema};
use crate::xml_tree::{Element, NamespaceBinding, QualifiedName, XSI_NAMESPACE};

struct Encoder<'s> {
    schema: &'s Schema,
}

/// Build the element tree for a package, checking required data first.
pub fn package(doc: &Package, schema: &Schema) -> Result<Element, CodecError> {
    Encoder { schema }.package(doc)
}

fn extend(element: &mut Element, extras: &Extras) {
    element.attributes.extend(extras.attributes.iter().cloned());
    for extra in &extras.elements {
        element.push_element(extra.clone());
    }
}

fn set_opt(element: &mut Element, local: &str, value: Option<&str>) {
    if let Some(value) = value {
        element.set_attribute(QualifiedName::unqualified(local), value);
    }
}

fn timestamp_text(ts: &Timestamp, path: &str) -> Result<String, CodecError> {
    format_timestamp(ts).map_err(|e| CodecError::incomplete(path, e))
}

fn set_timestamp(
    element: &mut Element,
    local: &str,
    value: Option<&Timestamp>,
    path: &str,
) -> Result<(), CodecError> {
    if let Some(ts) = value {
        let text = timestamp_text(ts, &format!("{}/@{}", path, local))?;
        element.set_attribute(QualifiedName::unqualified(local), text);
    }
    Ok(())
}

fn set_bool(element: &mut Element, local: &str, value: Option<bool>) {
    if let Some(b) = value {
        element.set_attribute(QualifiedName::unqualified(local), b.to_string());
    }
}

impl<'s> Encoder<'s> {
    fn element(&self, role: NamespaceRole, local: &str) -> Element {
        Element::new(QualifiedName::new(self.schema.uri(role), local))
    }

    fn leaf(&self, role: NamespaceRole, local: &str, text: &str) -> Element {
        let mut el = self.element(role, local);
        if !text.is_empty() {
            el.push_text(text);
        }
        el
    }

    fn root_namespaces(&self, doc: &Package) -> Vec<NamespaceBinding> {
        let mut bindings = doc.namespaces.clone();
        let vocabulary = self
            .schema
            .namespaces()
            .iter()
            .map(|decl| (decl.prefix.as_str(), decl.uri.as_str()))
            .chain(std::iter::once(("xsi", XSI_NAMESPACE)));

        for (prefix, uri) in vocabulary {
            let taken = bindings
                .iter()
                .any(|b| b.prefix.as_deref() == Some(prefix) || b.uri == uri);
            if !taken {
                bindings.push(NamespaceBinding::new(prefix, uri));
            }
        }
        bindings
    }

    fn package(&self, doc: &Package) -> Result<Element, CodecError> {
        let root_path = self.schema.root();
        let version = doc.version.as_deref().map(str::trim).unwrap_or_default();
        if version.is_empty() {
            return Err(CodecError::incomplete(
                format!("{}/@version", root_path),
                "required attribute is not set",
            ));
        }
        if !self.schema.supports_version(version) {
            return Err(CodecError::incomplete(
                format!("{}/@version", root_path),
                format!(
                    "version '{}' is not declared by schema {}",
                    version,
                    self.schema.name()
                ),
            ));
        }

        let mut root = self.element(NamespaceRole::Stix, root_path);
        root.namespaces = self.root_namespaces(doc);
        set_opt(&mut root, "id", doc.id.as_deref());
        set_opt(&mut root, "idref", doc.idref.as_deref());
        set_opt(&mut root, "version", Some(version));
        set_timestamp(&mut root, "timestamp", doc.timestamp.as_ref(), root_path)?;
        if let Some(location) = &doc.schema_location {
            root.set_attribute(QualifiedName::new(XSI_NAMESPACE, "schemaLocation"), location.as_str());
        }

        if let Some(header) = &doc.header {
            root.push_element(self.header(header, &format!("{}/STIX_Header", root_path))?);
        }

        if let Some(observables) = &doc.observables {
            root.push_element(self.observables(observables, &format!("{}/Observables", root_path))?);
        }

        if !doc.indicators.is_empty() {
            let mut list = self.element(NamespaceRole::Stix, "Indicators");
            for (i, indicator) in doc.indicators.iter().enumerate() {
                let path = format!("{}/Indicators/Indicator[{}]", root_path, i + 1);
                list.push_element(self.indicator(indicator, &path)?);
            }
            root.push_element(list);
        }

        extend(&mut root, &doc.extras);
        Ok(root)
    }

    fn header(&self, header: &Header, path: &str) -> Result<Element, CodecError> {
        let mut el = self.element(NamespaceRole::Stix, "STIX_Header");
        if let Some(title) = &header.title {
            el.push_element(self.leaf(NamespaceRole::Stix, "Title", title));
        }
        for (i, intent) in header.package_intents.iter().enumerate() {
            let intent_path = format!("{}/Package_Intent[{}]", path, i + 1);
            el.push_element(self.vocab(NamespaceRole::Stix, "Package_Intent", intent, &intent_path)?);
        }
        for text in &header.descriptions {
            el.push_element(self.structured(NamespaceRole::Stix, "Description", text));
        }
        for text in &header.short_descriptions {
            el.push_element(self.structured(NamespaceRole::Stix, "Short_Description", text));
        }
        extend(&mut el, &header.extras);
        Ok(el)
    }

    fn observables(&self, observables: &Observables, path: &str) -> Result<Element, CodecError> {
        if observables.cybox_major_version.trim().is_empty() {
            return Err(CodecError::incomplete(
                format!("{}/@cybox_major_version", path),
                "required attribute is not set",
            ));
        }
        if observables.cybox_minor_version.trim().is_empty() {
            return Err(CodecError::incomplete(
                format!("{}/@cybox_minor_version", path),
                "required attribute is not set",
            ));
        }

        let mut el = self.element(NamespaceRole::Stix, "Observables");
        set_opt(&mut el, "cybox_major_version", Some(observables.cybox_major_version.as_str()));
        set_opt(&mut el, "cybox_minor_version", Some(observables.cybox_minor_version.as_str()));
        set_opt(&mut el, "cybox_update_version", observables.cybox_update_version.as_deref());
        for (i, observable) in observables.observables.iter().enumerate() {
            let child_path = format!("{}/Observable[{}]", path, i + 1);
            el.push_element(self.observable(
                self.element(NamespaceRole::Cybox, "Observable"),
                observable,
                &child_path,
            )?);
        }
        extend(&mut el, &observables.extras);
        Ok(el)
    }

    fn indicator(&self, indicator: &Indicator, path: &str) -> Result<Element, CodecError> {
        let ind = NamespaceRole::Indicator;
        let mut el = self.element(NamespaceRole::Stix, "Indicator");
        el.xsi_type = Some(QualifiedName::new(self.schema.uri(ind), "IndicatorType"));
        set_opt(&mut el, "id", indicator.id.as_deref());
        set_opt(&mut el, "idref", indicator.idref.as_deref());
        set_opt(&mut el, "version", indicator.version.as_deref());
        set_timestamp(&mut el, "timestamp", indicator.timestamp.as_ref(), path)?;
        set_bool(&mut el, "negate", indicator.negate);

        if let Some(title) = &indicator.title {
            el.push_element(self.leaf(ind, "Title", title));
        }
        for (i, kind) in indicator.types.iter().enumerate() {
            let type_path = format!("{}/Type[{}]", path, i + 1);
            el.push_element(self.vocab(ind, "Type", kind, &type_path)?);
        }
        for alt in &indicator.alternative_ids {
            el.push_element(self.leaf(ind, "Alternative_ID", alt));
        }
        for text in &indicator.descriptions {
            el.push_element(self.structured(ind, "Description", text));
        }
        for text in &indicator.short_descriptions {
            el.push_element(self.structured(ind, "Short_Description", text));
        }
        for (i, window) in indicator.valid_time_positions.iter().enumerate() {
            let window_path = format!("{}/Valid_Time_Position[{}]", path, i + 1);
            let mut vt = self.element(ind, "Valid_Time_Position");
            if let Some(start) = &window.start {
                let text = timestamp_text(start, &format!("{}/Start_Time", window_path))?;
                vt.push_element(self.leaf(ind, "Start_Time", &text));
            }
            if let Some(end) = &window.end {
                let text = timestamp_text(end, &format!("{}/End_Time", window_path))?;
                vt.push_element(self.leaf(ind, "End_Time", &text));
            }
            el.push_element(vt);
        }
        if let Some(observable) = &indicator.observable {
            el.push_element(self.observable(
                self.element(ind, "Observable"),
                observable,
                &format!("{}/Observable", path),
            )?);
        }
        if let Some(confidence) = &indicator.confidence {
            el.push_element(self.confidence(confidence, &format!("{}/Confidence", path))?);
        }
        extend(&mut el, &indicator.extras);
        Ok(el)
    }

    fn confidence(&self, confidence: &Confidence, path: &str) -> Result<Element, CodecError> {
        let common = NamespaceRole::StixCommon;
        let mut el = self.element(NamespaceRole::Indicator, "Confidence");
        set_timestamp(&mut el, "timestamp", confidence.timestamp.as_ref(), path)?;
        if let Some(value) = &confidence.value {
            el.push_element(self.vocab(common, "Value", value, &format!("{}/Value", path))?);
        }
        for text in &confidence.descriptions {
            el.push_element(self.structured(common, "Description", text));
        }
        Ok(el)
    }

    /// `el` is the (already named) observable element; indicators and the
    /// package-level list use different element names for the same type.
    fn observable(
        &self,
        mut el: Element,
        observable: &Observable,
        path: &str,
    ) -> Result<Element, CodecError> {
        let cybox = NamespaceRole::Cybox;
        set_opt(&mut el, "id", observable.id.as_deref());
        set_opt(&mut el, "idref", observable.idref.as_deref());
        if let Some(title) = &observable.title {
            el.push_element(self.leaf(cybox, "Title", title));
        }
        if let Some(description) = &observable.description {
            el.push_element(self.structured(cybox, "Description", description));
        }
        if let Some(object) = &observable.object {
            el.push_element(self.object(object, &format!("{}/Object", path))?);
        }
        extend(&mut el, &observable.extras);
        Ok(el)
    }

    fn object(&self, object: &CyboxObject, path: &str) -> Result<Element, CodecError> {
        let mut el = self.element(NamespaceRole::Cybox, "Object");
        set_opt(&mut el, "id", object.id.as_deref());
        set_opt(&mut el, "idref", object.idref.as_deref());
        if let Some(properties) = &object.properties {
            el.push_element(self.properties(properties, &format!("{}/Properties", path))?);
        }
        extend(&mut el, &object.extras);
        Ok(el)
    }

    fn properties(&self, properties: &ObjectProperties, path: &str) -> Result<Element, CodecError> {
        let mut el = self.element(NamespaceRole::Cybox, "Properties");
        match properties {
            ObjectProperties::DomainName(p) => {
                let role = NamespaceRole::DomainNameObject;
                el.xsi_type = Some(QualifiedName::new(self.schema.uri(role), "DomainNameObjectType"));
                set_opt(&mut el, "type", p.domain_type.as_deref());
                if let Some(value) = &p.value {
                    el.push_element(self.pattern(role, "Value", value, &format!("{}/Value", path))?);
                }
            }
            ObjectProperties::Address(p) => {
                let role = NamespaceRole::AddressObject;
                el.xsi_type = Some(QualifiedName::new(self.schema.uri(role), "AddressObjectType"));
                set_opt(&mut el, "category", p.category.as_deref());
                set_bool(&mut el, "is_source", p.is_source);
                set_bool(&mut el, "is_destination", p.is_destination);
                if let Some(value) = &p.address_value {
                    el.push_element(self.pattern(
                        role,
                        "Address_Value",
                        value,
                        &format!("{}/Address_Value", path),
                    )?);
                }
            }
            ObjectProperties::Uri(p) => {
                let role = NamespaceRole::UriObject;
                el.xsi_type = Some(QualifiedName::new(self.schema.uri(role), "URIObjectType"));
                set_opt(&mut el, "type", p.uri_type.as_deref());
                if let Some(value) = &p.value {
                    el.push_element(self.pattern(role, "Value", value, &format!("{}/Value", path))?);
                }
            }
        }
        Ok(el)
    }

    fn pattern(
        &self,
        role: NamespaceRole,
        local: &str,
        field: &PatternField,
        path: &str,
    ) -> Result<Element, CodecError> {
        if field.value.trim().is_empty() {
            return Err(CodecError::incomplete(path, "property value is empty"));
        }
        let mut el = self.leaf(role, local, &field.value);
        set_opt(&mut el, "condition", field.condition.map(|c| c.as_str()));
        set_opt(&mut el, "apply_condition", field.apply_condition.map(|c| c.as_str()));
        set_opt(&mut el, "delimiter", field.delimiter.as_deref());
        Ok(el)
    }

    fn vocab(
        &self,
        role: NamespaceRole,
        local: &str,
        vocab: &ControlledVocab,
        path: &str,
    ) -> Result<Element, CodecError> {
        if vocab.value.trim().is_empty() {
            return Err(CodecError::incomplete(path, "controlled vocabulary value is empty"));
        }
        let mut el = self.leaf(role, local, &vocab.value);
        el.xsi_type = vocab.vocab.clone();
        Ok(el)
    }

    fn structured(&self, role: NamespaceRole, local: &str, text: &StructuredText) -> Element {
        let mut el = self.leaf(role, local, &text.value);
        set_opt(&mut el, "structuring_format", text.structuring_format.as_deref());
        el
    }
}
