//! Transformation stages applied by derived nodes

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::DeferredResult;
use crate::core::error::Result;
use crate::core::predicate::Predicate;
use crate::core::reference::{NAMESPACE_TAG_FIELD, Reference};

/// Produces the namespace → id → document map used by reference replacement
pub type LookupProvider = Arc<dyn Fn() -> DeferredResult + Send + Sync>;

/// Generic computation over a settled value
pub type MapFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// Path segment matching every member of an object
pub const WILDCARD: &str = "*";

/// Closed set of transformations a derived node can apply
///
/// Paths are dotted store paths. Arrays are descended transparently and a
/// [`WILDCARD`] segment addresses every member of an object, so
/// `"*.*.friend"` reaches into the documents of a namespace → id → document
/// lookup map.
pub enum Transform {
    AsReference {
        namespace: String,
    },
    ReplaceReferences {
        path: String,
        provider: LookupProvider,
        lookup: OnceLock<DeferredResult>,
    },
    FilterEmbeddedArray {
        path: String,
        spec: Value,
        predicate: Predicate,
    },
    Distinct {
        path: String,
    },
    Map {
        description: String,
        f: MapFn,
    },
}

impl Transform {
    pub(crate) fn replace_references(path: String, provider: LookupProvider) -> Self {
        Transform::ReplaceReferences {
            path,
            provider,
            lookup: OnceLock::new(),
        }
    }

    /// Second input of the transform, if it has one
    ///
    /// The lookup provider runs on the first call only; later calls return
    /// the same node.
    pub fn lookup(&self) -> Option<DeferredResult> {
        match self {
            Transform::ReplaceReferences {
                provider, lookup, ..
            } => Some(lookup.get_or_init(|| provider()).clone()),
            _ => None,
        }
    }

    /// Apply to a settled source value, waiting for the lookup if needed
    pub fn apply(&self, value: Value) -> BoxFuture<'_, Result<Value>> {
        async move {
            let lookup_map = match self.lookup() {
                Some(lookup) => Some(lookup.settled().await?),
                None => None,
            };
            self.apply_settled(value, lookup_map.as_ref())
        }
        .boxed()
    }

    /// Apply once every input has settled
    ///
    /// `lookup_map` is the settled value of [`lookup`](Self::lookup); a
    /// reference replacement without one leaves the value untouched.
    pub fn apply_settled(&self, value: Value, lookup_map: Option<&Value>) -> Result<Value> {
        match self {
            Transform::AsReference { namespace } => Ok(as_reference(value, namespace)),
            Transform::ReplaceReferences { path, .. } => Ok(match lookup_map {
                Some(lookup_map) => replace_references(value, &split_path(path), lookup_map),
                None => value,
            }),
            Transform::FilterEmbeddedArray {
                path, predicate, ..
            } => Ok(filter_embedded_array(value, &split_path(path), predicate)),
            Transform::Distinct { path } => Ok(distinct(&value, &split_path(path))),
            Transform::Map { f, .. } => f(value),
        }
    }

    /// Short description used in provenance chains
    ///
    /// Never runs the lookup provider; a lookup not asked for yet shows as
    /// `lookup(..)`.
    pub fn describe(&self) -> String {
        match self {
            Transform::AsReference { namespace } => format!("asReference('{}')", namespace),
            Transform::ReplaceReferences { path, lookup, .. } => match lookup.get() {
                Some(node) => format!("replaceReferences('{}', {:?})", path, node),
                None => format!("replaceReferences('{}', lookup(..))", path),
            },
            Transform::FilterEmbeddedArray { path, spec, .. } => {
                format!("filterEmbeddedArray('{}', {})", path, spec)
            }
            Transform::Distinct { path } => format!("distinct('{}')", path),
            Transform::Map { description, .. } => format!("map('{}')", description),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Dotted path to segments; the empty path addresses the value itself
fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('.').collect()
    }
}

fn as_reference(value: Value, namespace: &str) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Array(ids) => Value::Array(
            ids.into_iter()
                .map(|id| match id {
                    Value::Null => Value::Null,
                    id => Reference::new(namespace, id).to_value(),
                })
                .collect(),
        ),
        id => Reference::new(namespace, id).to_value(),
    }
}

fn replace_references(value: Value, path: &[&str], lookup: &Value) -> Value {
    match (path.split_first(), value) {
        (_, Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item| replace_references(item, path, lookup))
                .collect(),
        ),
        (None, value) => substitute(value, lookup),
        (Some((&WILDCARD, rest)), Value::Object(map)) => Value::Object(
            map.into_iter()
                .map(|(key, child)| (key, replace_references(child, rest, lookup)))
                .collect(),
        ),
        (Some((head, rest)), Value::Object(mut map)) => {
            if let Some(child) = map.get_mut(*head) {
                *child = replace_references(std::mem::take(child), rest, lookup);
            }
            Value::Object(map)
        }
        (Some(_), value) => value,
    }
}

fn substitute(value: Value, lookup: &Value) -> Value {
    let Some(reference) = Reference::from_value(&value) else {
        return value;
    };
    match lookup
        .get(&reference.namespace)
        .and_then(|docs| docs.get(reference.id_key()))
    {
        Some(Value::Object(doc)) => {
            let mut doc = doc.clone();
            doc.insert(
                NAMESPACE_TAG_FIELD.to_string(),
                Value::String(reference.namespace),
            );
            Value::Object(doc)
        }
        _ => value,
    }
}

fn filter_embedded_array(value: Value, path: &[&str], predicate: &Predicate) -> Value {
    match (path.split_first(), value) {
        (None, Value::Array(mut items)) => {
            items.retain(|item| predicate.matches(item));
            Value::Array(items)
        }
        (None, value) => value,
        (Some(_), Value::Array(docs)) => Value::Array(
            docs.into_iter()
                .map(|doc| filter_embedded_array(doc, path, predicate))
                .collect(),
        ),
        (Some((&WILDCARD, rest)), Value::Object(map)) => Value::Object(
            map.into_iter()
                .map(|(key, child)| (key, filter_embedded_array(child, rest, predicate)))
                .collect(),
        ),
        (Some((head, rest)), Value::Object(mut map)) => {
            if let Some(child) = map.get_mut(*head) {
                *child = filter_embedded_array(std::mem::take(child), rest, predicate);
            }
            Value::Object(map)
        }
        (Some(_), value) => value,
    }
}

fn distinct(value: &Value, path: &[&str]) -> Value {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    collect_distinct(value, path, &mut seen, &mut out);
    Value::Array(out)
}

fn collect_distinct(value: &Value, path: &[&str], seen: &mut HashSet<String>, out: &mut Vec<Value>) {
    match (path.split_first(), value) {
        (_, Value::Null) => {}
        (_, Value::Array(items)) => {
            for item in items {
                collect_distinct(item, path, seen, out);
            }
        }
        (None, leaf) => {
            if seen.insert(leaf.to_string()) {
                out.push(leaf.clone());
            }
        }
        (Some((&WILDCARD, rest)), Value::Object(map)) => {
            for child in map.values() {
                collect_distinct(child, rest, seen, out);
            }
        }
        (Some((head, rest)), Value::Object(map)) => {
            if let Some(child) = map.get(*head) {
                collect_distinct(child, rest, seen, out);
            }
        }
        (Some(_), _) => {}
    }
}
