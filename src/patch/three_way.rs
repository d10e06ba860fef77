//! Three-way patch computation
//!
//! Given the last-applied configuration (`original`), the new desired
//! configuration (`modified`) and the live object (`current`):
//!
//! - fields present in `original` but absent from `modified` are deleted
//!   (`null` in the patch);
//! - fields of `modified` whose value differs from `current` are set;
//! - fields only present in `current` are left to whoever owns them.
//!
//! Under [`PatchStrategy::StrategicMerge`] lists with a merge key are merged
//! element by element; removed elements become `$patch: delete` directives and
//! the desired order is sent as `$setElementOrder/<field>`. Scalar lists with
//! the merge strategy (`metadata.finalizers`) send only added values, and
//! removed ones under `$deleteFromPrimitiveList/<field>`.

use serde_json::{json, Map, Value};

use super::strategy::{list_strategy, ListStrategy, PatchStrategy};
use super::PatchDocument;
use crate::error::{Error, Result};

/// Compute the patch that moves `current` to `modified`.
pub fn three_way_patch(
    strategy: PatchStrategy,
    original: Option<&Value>,
    modified: &Value,
    current: &Value,
) -> Result<PatchDocument> {
    let modified = modified
        .as_object()
        .ok_or_else(|| Error::MalformedManifest("desired object must be a map".to_string()))?;
    let current = current
        .as_object()
        .ok_or_else(|| Error::MalformedManifest("live object must be a map".to_string()))?;

    let differ = Differ { strategy };
    let body = Value::Object(differ.diff_map(
        None,
        original.and_then(Value::as_object),
        modified,
        Some(current),
    ));

    Ok(match strategy {
        PatchStrategy::StrategicMerge => PatchDocument::Strategic(body),
        PatchStrategy::JsonMerge => PatchDocument::Merge(body),
    })
}

enum ListPatch {
    Replace,
    Merge {
        items: Vec<Value>,
        order: Vec<Value>,
    },
    Primitive {
        added: Vec<Value>,
        deleted: Vec<Value>,
        order: Vec<Value>,
    },
}

struct Differ {
    strategy: PatchStrategy,
}

impl Differ {
    /// `parent` is the field name holding these maps, used for merge keys.
    fn diff_map(
        &self,
        parent: Option<&str>,
        original: Option<&Map<String, Value>>,
        modified: &Map<String, Value>,
        current: Option<&Map<String, Value>>,
    ) -> Map<String, Value> {
        let mut patch = Map::new();

        if let Some(original) = original {
            for key in original.keys() {
                if !modified.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
        }

        for (key, desired) in modified {
            let live = current.and_then(|c| c.get(key));
            let last = original.and_then(|o| o.get(key));

            match desired {
                Value::Object(desired_map) => match live {
                    Some(Value::Object(live_map)) => {
                        let sub = self.diff_map(
                            Some(key.as_str()),
                            last.and_then(Value::as_object),
                            desired_map,
                            Some(live_map),
                        );
                        if !sub.is_empty() {
                            patch.insert(key.clone(), Value::Object(sub));
                        }
                    }
                    _ => {
                        patch.insert(key.clone(), desired.clone());
                    }
                },
                Value::Array(desired_items) => {
                    match self.diff_list(parent, key, last, desired_items, live) {
                        Some(ListPatch::Replace) => {
                            patch.insert(key.clone(), desired.clone());
                        }
                        Some(ListPatch::Merge { items, order }) => {
                            patch.insert(key.clone(), Value::Array(items));
                            patch.insert(format!("$setElementOrder/{}", key), Value::Array(order));
                        }
                        Some(ListPatch::Primitive {
                            added,
                            deleted,
                            order,
                        }) => {
                            if !added.is_empty() {
                                patch.insert(key.clone(), Value::Array(added));
                            }
                            if !deleted.is_empty() {
                                patch.insert(
                                    format!("$deleteFromPrimitiveList/{}", key),
                                    Value::Array(deleted),
                                );
                            }
                            patch.insert(format!("$setElementOrder/{}", key), Value::Array(order));
                        }
                        None => {}
                    }
                }
                scalar => {
                    if live.unwrap_or(&Value::Null) != scalar {
                        patch.insert(key.clone(), scalar.clone());
                    }
                }
            }
        }

        patch
    }

    fn diff_list(
        &self,
        parent: Option<&str>,
        field: &str,
        original: Option<&Value>,
        modified: &[Value],
        current: Option<&Value>,
    ) -> Option<ListPatch> {
        let live_items = current.and_then(Value::as_array);
        let last_items: &[Value] = original
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let list = match self.strategy {
            PatchStrategy::StrategicMerge => list_strategy(parent, field),
            PatchStrategy::JsonMerge => ListStrategy::Atomic,
        };

        let key = match (list, live_items) {
            (ListStrategy::MergeByKey(key), Some(_))
                if modified.iter().all(|item| item.get(key).is_some()) =>
            {
                key
            }
            (ListStrategy::MergePrimitive, _) => {
                return primitive_list_patch(last_items, modified, live_items);
            }
            _ => {
                return (live_items.map(Vec::as_slice) != Some(modified))
                    .then_some(ListPatch::Replace);
            }
        };
        let live_items: &[Value] = live_items.map(Vec::as_slice).unwrap_or_default();
        let mut items = Vec::new();
        for desired in modified {
            let id = &desired[key];
            let Some(desired_map) = desired.as_object() else {
                continue;
            };
            match find_by_key(live_items, key, id) {
                None => items.push(desired.clone()),
                Some(live_map) => {
                    let mut sub = self.diff_map(
                        Some(field),
                        find_by_key(last_items, key, id),
                        desired_map,
                        Some(live_map),
                    );
                    if !sub.is_empty() {
                        sub.insert(key.to_string(), id.clone());
                        items.push(Value::Object(sub));
                    }
                }
            }
        }

        for last in last_items {
            let Some(id) = last.get(key) else { continue };
            if !modified.iter().any(|item| item.get(key) == Some(id)) {
                items.push(json!({ key: id, "$patch": "delete" }));
            }
        }

        if items.is_empty() {
            return None;
        }
        let order = modified
            .iter()
            .map(|item| json!({ key: item[key].clone() }))
            .collect();
        Some(ListPatch::Merge { items, order })
    }
}

/// Set-like diff of a scalar list: values missing from the live list are
/// added, values dropped since the last apply are deleted.
fn primitive_list_patch(
    original: &[Value],
    modified: &[Value],
    current: Option<&Vec<Value>>,
) -> Option<ListPatch> {
    let live: &[Value] = current.map(Vec::as_slice).unwrap_or_default();
    let added: Vec<Value> = modified
        .iter()
        .filter(|v| !live.contains(v))
        .cloned()
        .collect();
    let deleted: Vec<Value> = original
        .iter()
        .filter(|v| !modified.contains(v))
        .cloned()
        .collect();

    if added.is_empty() && deleted.is_empty() {
        return None;
    }
    Some(ListPatch::Primitive {
        added,
        deleted,
        order: modified.to_vec(),
    })
}

fn find_by_key<'a>(items: &'a [Value], key: &str, id: &Value) -> Option<&'a Map<String, Value>> {
    items
        .iter()
        .find(|item| item.get(key) == Some(id))
        .and_then(Value::as_object)
}
