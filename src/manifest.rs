//! Validated manifest documents
//!
//! A [`ManifestDocument`] is any JSON/YAML object that carries `apiVersion`,
//! `kind` and `metadata.name`. Everything else is opaque to the engine.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct ManifestDocument {
    value: Value,
}

impl ManifestDocument {
    /// Validate `value` as a manifest.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::MalformedManifest(
                "manifest must be an object".to_string(),
            ));
        }
        required_str(&value, "/apiVersion")?;
        required_str(&value, "/kind")?;
        if !value.get("metadata").is_some_and(Value::is_object) {
            return Err(Error::MalformedManifest(
                "metadata is missing or not an object".to_string(),
            ));
        }
        required_str(&value, "/metadata/name")?;
        Ok(Self { value })
    }

    /// Parse a JSON or YAML document.
    pub fn parse(input: &str) -> Result<Self> {
        let value: Value = if input.trim_start().starts_with('{') {
            serde_json::from_str(input)
                .map_err(|e| Error::MalformedManifest(format!("invalid JSON: {}", e)))?
        } else {
            serde_yaml::from_str(input)
                .map_err(|e| Error::MalformedManifest(format!("invalid YAML: {}", e)))?
        };
        Self::from_value(value)
    }

    pub fn api_version(&self) -> &str {
        self.str_at("/apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.str_at("/kind")
    }

    pub fn name(&self) -> &str {
        self.str_at("/metadata/name")
    }

    /// Namespace declared by the document itself, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.value
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
    }

    /// The `metadata` object, validated to exist.
    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.value.get("metadata").and_then(Value::as_object)
    }

    pub fn as_value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    fn str_at(&self, pointer: &str) -> &str {
        self.value
            .pointer(pointer)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Look up a string at a JSON pointer, describing the missing segment on failure.
pub fn required_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str> {
    required(value, pointer)?.as_str().ok_or_else(|| {
        Error::MalformedManifest(format!("{} must be a string", dotted(pointer)))
    })
}

/// Look up a value at a JSON pointer.
///
/// Walks the pointer one segment at a time so the error names the first
/// segment that is absent or of the wrong shape.
pub fn required<'a>(value: &'a Value, pointer: &str) -> Result<&'a Value> {
    let mut current = value;
    let mut walked = String::new();
    for segment in pointer.split('/').skip(1) {
        walked.push('/');
        walked.push_str(segment);
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| Error::MalformedManifest(format!("{} is missing", dotted(&walked))))?;
    }
    Ok(current)
}

/// `/spec/template/0/name` -> `spec.template[0].name`
fn dotted(pointer: &str) -> String {
    let mut out = String::new();
    for segment in pointer.split('/').skip(1) {
        if segment.parse::<usize>().is_ok() {
            out.push_str(&format!("[{}]", segment));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
    }
    out
}
