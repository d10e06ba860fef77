//! The `kubectl.kubernetes.io/last-applied-configuration` annotation
//!
//! The annotation stores the document as it was last applied, minus the
//! annotation itself. It is the "original" side of every three-way patch.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// `desired` with the annotation set to its own serialized form.
///
/// Any stale annotation already on `desired` is dropped before
/// serialization, so the stored configuration never nests itself.
pub fn modified_configuration(desired: &Value) -> Result<Value> {
    let mut stripped = desired.clone();
    remove_annotation(&mut stripped);
    let serialized = serde_json::to_string(&stripped)?;

    let mut modified = stripped;
    annotations_mut(&mut modified)?.insert(
        LAST_APPLIED_ANNOTATION.to_string(),
        Value::String(serialized),
    );
    Ok(modified)
}

/// The last-applied document recorded on a live object, if any.
pub fn original_configuration(live: &Value) -> Result<Option<Value>> {
    let raw = live
        .pointer("/metadata/annotations")
        .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        .and_then(Value::as_str)
        .unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw).map(Some).map_err(|e| {
        Error::MalformedManifest(format!(
            "{} annotation is not valid JSON: {}",
            LAST_APPLIED_ANNOTATION, e
        ))
    })
}

fn remove_annotation(object: &mut Value) {
    let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    let now_empty = match metadata.get_mut("annotations").and_then(Value::as_object_mut) {
        Some(annotations) => {
            annotations.remove(LAST_APPLIED_ANNOTATION);
            annotations.is_empty()
        }
        None => false,
    };
    if now_empty {
        metadata.remove("annotations");
    }
}

fn annotations_mut(object: &mut Value) -> Result<&mut Map<String, Value>> {
    let metadata = object
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| Error::MalformedManifest("metadata is missing".to_string()))?;
    metadata
        .entry("annotations")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| {
            Error::MalformedManifest("metadata.annotations must be an object".to_string())
        })
}
