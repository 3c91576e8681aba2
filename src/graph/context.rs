//! Context: the ordered nested mapping that serves as compiled task
//! descriptor and as running scratch state during execution.
//!
//! Keys keep insertion order (`serde_json` is built with `preserve_order`),
//! so a Context serializes exactly in the order nodes contributed to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the compiled `(label, name)` order for one output root.
pub const EXECUTION_QUEUE: &str = "ExecutionQueue";

/// One compiled execution step: `(node type label, node instance name)`.
///
/// Serializes as a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry(pub String, pub String);

impl QueueEntry {
    pub fn new(label: impl Into<String>, name: impl Into<String>) -> Self {
        Self(label.into(), name.into())
    }

    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.1
    }
}

/// Ordered string-keyed mapping of scalars, lists and nested mappings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Walk nested mappings along `path`.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        Some(current)
    }

    /// Return the list stored at `key`, creating it when absent.
    ///
    /// A non-list value at `key` is replaced by an empty list.
    pub fn ensure_list(&mut self, key: &str) -> &mut Vec<Value> {
        ensure_list_in(&mut self.0, key)
    }

    /// Return the mapping stored at `key`, creating it when absent.
    ///
    /// A non-mapping value at `key` is replaced by an empty mapping.
    pub fn ensure_map(&mut self, key: &str) -> &mut Map<String, Value> {
        ensure_map_in(&mut self.0, key)
    }

    /// Auto-vivify a chain of nested mappings and return the innermost one.
    pub fn ensure_path(&mut self, path: &[&str]) -> &mut Map<String, Value> {
        let mut current = &mut self.0;
        for key in path {
            current = ensure_map_in(current, key);
        }
        current
    }

    /// Append `value` to the list at `key` unless an equal value is already there.
    pub fn push_unique(&mut self, key: &str, value: impl Into<Value>) -> bool {
        push_unique_in(self.ensure_list(key), value.into())
    }

    /// Deep-merge `other` into `self`: nested mappings merge key by key,
    /// everything else overwrites.
    pub fn merge(&mut self, other: Context) -> &mut Self {
        merge_maps(&mut self.0, other.0);
        self
    }

    /// Append one step to this root's execution queue.
    pub fn push_queue(&mut self, entry: QueueEntry) {
        self.ensure_list(EXECUTION_QUEUE).push(Value::Array(vec![
            Value::String(entry.0),
            Value::String(entry.1),
        ]));
    }

    /// Decode the execution queue. A missing queue is empty.
    pub fn execution_queue(&self) -> serde_json::Result<Vec<QueueEntry>> {
        match self.0.get(EXECUTION_QUEUE) {
            Some(value) => serde_json::from_value(value.clone()),
            None => Ok(Vec::new()),
        }
    }

    /// Read a list of strings, skipping non-string items.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        Value::Object(ctx.0)
    }
}

pub(crate) fn ensure_list_in<'m>(map: &'m mut Map<String, Value>, key: &str) -> &'m mut Vec<Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        tracing::debug!("Replacing non-list value at {key}");
        *slot = Value::Array(Vec::new());
    }
    match slot {
        Value::Array(items) => items,
        _ => unreachable!("slot holds an array"),
    }
}

pub(crate) fn ensure_map_in<'m>(
    map: &'m mut Map<String, Value>,
    key: &str,
) -> &'m mut Map<String, Value> {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        tracing::debug!("Replacing non-mapping value at {key}");
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot holds a mapping"),
    }
}

pub(crate) fn push_unique_in(list: &mut Vec<Value>, value: Value) -> bool {
    if list.contains(&value) {
        return false;
    }
    list.push(value);
    true
}

fn merge_maps(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Object(inner) => merge_maps(ensure_map_in(target, &key), inner),
            other => {
                target.insert(key, other);
            }
        }
    }
}
