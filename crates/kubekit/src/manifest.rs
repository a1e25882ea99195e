//! Multi-document manifest handling.

use crate::error::{Error, Result};
use crate::types::ResourceRef;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

/// Split a YAML stream into documents.
///
/// Any line starting with `---` separates documents. Documents are
/// returned verbatim, empty ones included; see [`is_empty_document`].
pub fn split_documents(text: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();
    let mut seen_separator = false;

    for line in text.lines() {
        if line.starts_with("---") {
            if seen_separator || !current.is_empty() {
                docs.push(std::mem::take(&mut current));
            }
            seen_separator = true;
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.is_empty() || seen_separator {
        docs.push(current);
    }

    docs
}

/// Whether a document holds no content (only whitespace or comments, or
/// an empty mapping).
pub fn is_empty_document(doc: &str) -> bool {
    if doc.trim().is_empty() {
        return true;
    }
    match serde_yaml::from_str::<Value>(doc) {
        Ok(Value::Null) => true,
        Ok(Value::Mapping(m)) => m.is_empty(),
        _ => false,
    }
}

/// Read the identity of the object described by `doc`.
pub fn resource_ref(doc: &str) -> Result<ResourceRef> {
    let value: Value = serde_yaml::from_str(doc)?;
    ref_of(&value)
}

/// Add `labels` to the object in `doc`; returns the updated document and
/// the object's identity.
///
/// Existing labels with other keys are kept; equal keys are overwritten.
pub fn stamp_labels(doc: &str, labels: &BTreeMap<String, String>) -> Result<(String, ResourceRef)> {
    let mut value: Value = serde_yaml::from_str(doc)?;
    let r = ref_of(&value)?;

    let metadata = value
        .as_mapping_mut()
        .and_then(|m| m.get_mut("metadata"))
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| Error::Manifest(format!("{r}: metadata is not a mapping")))?;

    if metadata.get("labels").is_none_or(Value::is_null) {
        metadata.insert(Value::from("labels"), Value::Mapping(Mapping::new()));
    }
    let target = metadata
        .get_mut("labels")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| Error::Manifest(format!("{r}: metadata.labels is not a mapping")))?;
    for (k, v) in labels {
        target.insert(Value::from(k.as_str()), Value::from(v.as_str()));
    }

    Ok((serde_yaml::to_string(&value)?, r))
}

fn ref_of(value: &Value) -> Result<ResourceRef> {
    fn text(v: Option<&Value>) -> &str {
        v.and_then(Value::as_str).unwrap_or_default()
    }

    let api_version = text(value.get("apiVersion"));
    let kind = text(value.get("kind"));
    let metadata = value.get("metadata");
    let name = text(metadata.and_then(|m| m.get("name")));
    let namespace = text(metadata.and_then(|m| m.get("namespace")));

    if api_version.is_empty() || kind.is_empty() || name.is_empty() {
        return Err(Error::Manifest(
            "document needs apiVersion, kind and metadata.name".to_string(),
        ));
    }

    Ok(ResourceRef::new(api_version, kind, namespace, name))
}
