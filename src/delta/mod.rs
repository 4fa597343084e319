//! Incremental assembly of streamed JSON patches.
//!
//! [`apply`] folds one delta into an accumulated value:
//!
//! - a list is a sparse patch list; every element names its target slot via
//!   `index` and the remaining fields are merged into that slot
//! - `null` clears the value
//! - an object merges key by key, recursively
//! - a string is appended to the existing string
//! - any other scalar replaces the existing value
//!
//! Accumulated lists may contain holes, so the accumulator has its own value
//! type, [`Assembled`], rather than `serde_json::Value`.

pub mod message;

pub use message::{PartialAssistantMessage, PartialChoice, PartialToolCall};

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Largest list slot a patch may address.
pub const MAX_PATCH_INDEX: u64 = 1 << 16;

/// A malformed patch. Patches are never partially dropped: the whole
/// `apply` call fails instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    #[error("list patch element {position} is not an object")]
    NotAnObject { position: usize },

    #[error("list patch element {position} has no `index`")]
    MissingIndex { position: usize },

    #[error("list patch element {position} has a non-integer `index`: {found}")]
    InvalidIndex { position: usize, found: String },

    #[error("list patch index {index} is out of range")]
    IndexOutOfRange { index: u64 },
}

/// An accumulated JSON-shaped value whose lists may be sparse.
#[derive(Debug, Clone, PartialEq)]
pub enum Assembled {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// `None` marks a slot no patch has addressed yet.
    List(Vec<Option<Assembled>>),
    Object(BTreeMap<String, Assembled>),
}

impl Assembled {
    pub fn get(&self, key: &str) -> Option<&Assembled> {
        match self {
            Self::Object(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Slot `index` of a list, `None` when absent or not a list.
    pub fn at(&self, index: usize) -> Option<&Assembled> {
        match self {
            Self::List(items) => items.get(index).and_then(Option::as_ref),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Assembled> {
        match self {
            Self::Object(fields) => fields.get_mut(key),
            _ => None,
        }
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Assembled> {
        match self {
            Self::List(items) => items.get_mut(index).and_then(Option::as_mut),
            _ => None,
        }
    }

    /// Drop `key` from an object. No-op on anything else.
    pub fn remove(&mut self, key: &str) -> Option<Assembled> {
        match self {
            Self::Object(fields) => fields.remove(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Option<Assembled>]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert to plain JSON. Absent list slots become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|slot| slot.as_ref().map_or(Value::Null, Assembled::to_json))
                    .collect(),
            ),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<&Value> for Assembled {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(|v| Some(v.into())).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Assembled::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Fold `delta` into `accumulated`.
///
/// The delta is checked before anything is merged, so a malformed patch
/// fails without consuming the accumulated value's contents.
pub fn apply(accumulated: Option<Assembled>, delta: &Value) -> Result<Assembled, DeltaError> {
    check(delta)?;
    Ok(merge(accumulated, delta))
}

/// Validate every list patch reachable from `delta`.
pub fn check(delta: &Value) -> Result<(), DeltaError> {
    match delta {
        Value::Array(patches) => {
            for (position, patch) in patches.iter().enumerate() {
                let Value::Object(fields) = patch else {
                    return Err(DeltaError::NotAnObject { position });
                };
                patch_index(position, fields)?;
                for (key, value) in fields {
                    if key != "index" {
                        check(value)?;
                    }
                }
            }
            Ok(())
        }
        Value::Object(fields) => fields.values().try_for_each(check),
        _ => Ok(()),
    }
}

/// Merge a delta that already passed [`check`].
pub(crate) fn merge(accumulated: Option<Assembled>, delta: &Value) -> Assembled {
    match delta {
        Value::Null => Assembled::Null,
        Value::Array(patches) => merge_list(accumulated, patches),
        Value::Object(fields) => merge_object(accumulated, fields, None),
        Value::String(fragment) => match accumulated {
            Some(Assembled::String(mut existing)) => {
                existing.push_str(fragment);
                Assembled::String(existing)
            }
            _ => Assembled::String(fragment.clone()),
        },
        Value::Bool(b) => Assembled::Bool(*b),
        Value::Number(n) => Assembled::Number(n.clone()),
    }
}

fn merge_object(
    accumulated: Option<Assembled>,
    fields: &Map<String, Value>,
    skip: Option<&str>,
) -> Assembled {
    let mut entries = fields
        .iter()
        .filter(|(key, _)| Some(key.as_str()) != skip)
        .peekable();
    if entries.peek().is_none() {
        return accumulated.unwrap_or_else(|| Assembled::Object(BTreeMap::new()));
    }
    let mut merged = match accumulated {
        Some(Assembled::Object(existing)) => existing,
        _ => BTreeMap::new(),
    };
    for (key, value) in entries {
        let previous = merged.remove(key);
        merged.insert(key.clone(), merge(previous, value));
    }
    Assembled::Object(merged)
}

fn merge_list(accumulated: Option<Assembled>, patches: &[Value]) -> Assembled {
    let mut items = match accumulated {
        Some(Assembled::List(existing)) => existing,
        Some(other) if patches.is_empty() => return other,
        _ => Vec::new(),
    };
    for (position, patch) in patches.iter().enumerate() {
        let Value::Object(fields) = patch else {
            continue;
        };
        let Ok(index) = patch_index(position, fields) else {
            continue;
        };
        if items.len() <= index {
            items.resize(index + 1, None);
        }
        let slot = items[index].take();
        items[index] = Some(merge_object(slot, fields, Some("index")));
    }
    Assembled::List(items)
}

fn patch_index(position: usize, fields: &Map<String, Value>) -> Result<usize, DeltaError> {
    let raw = fields
        .get("index")
        .ok_or(DeltaError::MissingIndex { position })?;
    let index = raw.as_u64().ok_or_else(|| DeltaError::InvalidIndex {
        position,
        found: raw.to_string(),
    })?;
    if index > MAX_PATCH_INDEX {
        return Err(DeltaError::IndexOutOfRange { index });
    }
    usize::try_from(index).map_err(|_| DeltaError::IndexOutOfRange { index })
}

/// Stateful wrapper around [`apply`] for a single accumulated value.
#[derive(Debug, Clone, Default)]
pub struct DeltaAssembler {
    value: Option<Assembled>,
}

impl DeltaAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta. On error the accumulated value is left untouched.
    pub fn apply(&mut self, delta: &Value) -> Result<&Assembled, DeltaError> {
        check(delta)?;
        let next = merge(self.value.take(), delta);
        Ok(self.value.insert(next))
    }

    pub fn value(&self) -> Option<&Assembled> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Assembled> {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fold(deltas: &[Value]) -> Result<Option<Assembled>, DeltaError> {
        let mut acc = None;
        for delta in deltas {
            acc = Some(apply(acc, delta)?);
        }
        Ok(acc)
    }

    #[test]
    fn strings_concatenate() {
        let ab = Assembled::String("ab".into());
        assert_eq!(apply(Some(ab), &json!("cd")).unwrap(), Assembled::String("abcd".into()));
        assert_eq!(apply(None, &json!("x")).unwrap(), Assembled::String("x".into()));
    }

    #[test]
    fn null_delta_clears() {
        let acc = Assembled::String("keep?".into());
        assert_eq!(apply(Some(acc), &Value::Null).unwrap(), Assembled::Null);
    }

    #[test]
    fn empty_object_delta_is_identity() {
        let acc = Assembled::from(&json!({ "content": "hello", "n": 3 }));
        assert_eq!(apply(Some(acc.clone()), &json!({})).unwrap(), acc);

        let text = Assembled::String("plain".into());
        assert_eq!(apply(Some(text.clone()), &json!({})).unwrap(), text);
    }

    #[test]
    fn scalars_replace() {
        let acc = Assembled::from(&json!(1));
        assert_eq!(apply(Some(acc), &json!(2)).unwrap(), Assembled::from(&json!(2)));
        assert_eq!(apply(None, &json!(true)).unwrap(), Assembled::Bool(true));
    }

    #[test]
    fn list_patch_grows_sparsely() {
        let result = apply(Some(Assembled::List(vec![])), &json!([{ "index": 2, "text": "z" }]))
            .unwrap();

        let items = result.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert!(items[0].is_none());
        assert!(items[1].is_none());
        assert_eq!(items[2], Some(Assembled::from(&json!({ "text": "z" }))));
    }

    #[test]
    fn list_patch_merges_into_existing_slot_without_index_key() {
        let acc = fold(&[
            json!({ "tool_calls": [{ "index": 0, "id": "call_1", "function": { "name": "get_", "arguments": "" } }] }),
            json!({ "tool_calls": [{ "index": 0, "function": { "name": "weather", "arguments": "{\"city\":" } }] }),
            json!({ "tool_calls": [{ "index": 0, "function": { "arguments": "\"Oslo\"}" } }] }),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(
            acc.to_json(),
            json!({
                "tool_calls": [{
                    "id": "call_1",
                    "function": { "name": "get_weather", "arguments": "{\"city\":\"Oslo\"}" }
                }]
            })
        );
    }

    #[test]
    fn nested_objects_merge_per_key() {
        let acc = fold(&[
            json!({ "role": "assistant", "content": "He" }),
            json!({ "content": "llo" }),
            json!({ "extra": { "a": 1 } }),
            json!({ "extra": { "b": 2 } }),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(
            acc.to_json(),
            json!({ "role": "assistant", "content": "Hello", "extra": { "a": 1, "b": 2 } })
        );
    }

    #[test]
    fn same_sequence_twice_is_deterministic() {
        let deltas = vec![
            json!({ "choices": [{ "index": 0, "delta": { "content": "a" } }] }),
            json!({ "choices": [{ "index": 1, "delta": { "content": "b" } }] }),
            json!({ "choices": [{ "index": 0, "delta": { "content": "c" } }] }),
            json!({}),
            json!({}),
        ];

        assert_eq!(fold(&deltas).unwrap(), fold(&deltas).unwrap());
    }

    #[test]
    fn patch_without_index_fails_fast() {
        let err = apply(None, &json!([{ "index": 0 }, { "text": "lost" }])).unwrap_err();
        assert_eq!(err, DeltaError::MissingIndex { position: 1 });
    }

    #[test]
    fn non_object_patch_element_is_rejected() {
        let err = apply(None, &json!(["bare"])).unwrap_err();
        assert_eq!(err, DeltaError::NotAnObject { position: 0 });
    }

    #[test]
    fn negative_index_is_rejected() {
        let err = apply(None, &json!([{ "index": -1 }])).unwrap_err();
        assert!(matches!(err, DeltaError::InvalidIndex { position: 0, .. }));
    }

    #[test]
    fn huge_index_is_rejected() {
        let err = apply(None, &json!([{ "index": MAX_PATCH_INDEX + 1 }])).unwrap_err();
        assert!(matches!(err, DeltaError::IndexOutOfRange { .. }));
    }

    #[test]
    fn assembler_keeps_state_on_error() {
        let mut assembler = DeltaAssembler::new();
        assembler.apply(&json!({ "content": "ok" })).unwrap();

        assert!(assembler.apply(&json!({ "items": [{ "no_index": true }] })).is_err());
        assert_eq!(
            assembler.value().map(Assembled::to_json),
            Some(json!({ "content": "ok" }))
        );
    }

    #[test]
    fn nested_malformed_patch_is_caught_before_merging() {
        let mut assembler = DeltaAssembler::new();
        assembler.apply(&json!({ "content": "ok" })).unwrap();

        let err = assembler
            .apply(&json!({
                "content": " more",
                "items": [{ "index": 0, "parts": [{ "text": "no index" }] }]
            }))
            .unwrap_err();

        assert_eq!(err, DeltaError::MissingIndex { position: 0 });
        assert_eq!(
            assembler.value().map(Assembled::to_json),
            Some(json!({ "content": "ok" }))
        );
    }
}
