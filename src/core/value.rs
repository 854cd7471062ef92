//! Values accumulated by contexts
//!
//! While the visitor walks a request, hooks collect literal values but also
//! values that only exist once another operation has run (for example the id
//! of a document created by a nested mutation). [`ContextValue`] holds both,
//! and [`ContextValue::complete`] turns it into plain JSON once every pending
//! part has settled.

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::core::error::Result;
use crate::execution::deferred::DeferredResult;

/// A JSON value that may still contain pending deferred results
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// A plain, fully known value
    Value(Value),
    /// A value produced later by the dependency graph
    Deferred(DeferredResult),
    /// An object whose members may be pending
    Object(IndexMap<String, ContextValue>),
    /// A list whose items may be pending
    List(Vec<ContextValue>),
}

impl ContextValue {
    /// Empty object, the starting point for nested upserts
    pub fn object() -> Self {
        ContextValue::Object(IndexMap::new())
    }

    /// Whether any part of this value is still pending
    pub fn is_pending(&self) -> bool {
        match self {
            ContextValue::Value(_) => false,
            ContextValue::Deferred(_) => true,
            ContextValue::Object(map) => map.values().any(ContextValue::is_pending),
            ContextValue::List(items) => items.iter().any(ContextValue::is_pending),
        }
    }

    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            ContextValue::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Plain JSON if nothing inside is pending
    pub fn try_plain(&self) -> Option<Value> {
        match self {
            ContextValue::Value(v) => Some(v.clone()),
            ContextValue::Deferred(_) => None,
            ContextValue::Object(map) => {
                let mut out = Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.try_plain()?);
                }
                Some(Value::Object(out))
            }
            ContextValue::List(items) => items
                .iter()
                .map(ContextValue::try_plain)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Wait for every pending part and build the plain JSON value
    ///
    /// A rejected deferred result anywhere inside fails the whole value with
    /// that same error.
    pub fn complete(&self) -> BoxFuture<'_, Result<Value>> {
        async move {
            match self {
                ContextValue::Value(v) => Ok(v.clone()),
                ContextValue::Deferred(deferred) => deferred.settled().await,
                ContextValue::Object(map) => {
                    let mut out = Map::new();
                    for (key, value) in map {
                        out.insert(key.clone(), value.complete().await?);
                    }
                    Ok(Value::Object(out))
                }
                ContextValue::List(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(item.complete().await?);
                    }
                    Ok(Value::Array(out))
                }
            }
        }
        .boxed()
    }

    /// Snapshot of the value with pending parts rendered by provenance
    ///
    /// Used for diagnostics only; never sent to an executor.
    pub fn describe(&self) -> Value {
        match self {
            ContextValue::Value(v) => v.clone(),
            ContextValue::Deferred(deferred) => {
                Value::String(format!("DeferredResult {{ {} }}", deferred.provenance()))
            }
            ContextValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.describe()))
                    .collect(),
            ),
            ContextValue::List(items) => {
                Value::Array(items.iter().map(ContextValue::describe).collect())
            }
        }
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        ContextValue::Value(value)
    }
}

impl From<DeferredResult> for ContextValue {
    fn from(deferred: DeferredResult) -> Self {
        ContextValue::Deferred(deferred)
    }
}

impl From<IndexMap<String, ContextValue>> for ContextValue {
    fn from(map: IndexMap<String, ContextValue>) -> Self {
        ContextValue::Object(map)
    }
}

impl From<Vec<ContextValue>> for ContextValue {
    fn from(items: Vec<ContextValue>) -> Self {
        ContextValue::List(items)
    }
}

/// Convert a map of plain JSON into context values
pub fn context_map(map: Map<String, Value>) -> IndexMap<String, ContextValue> {
    map.into_iter()
        .map(|(k, v)| (k, ContextValue::Value(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_complete_plain_value() {
        let value = ContextValue::from(json!({"title": "hello"}));
        assert!(!value.is_pending());
        assert_eq!(value.complete().await.expect("should complete"), json!({"title": "hello"}));
    }

    #[tokio::test]
    async fn test_complete_substitutes_deferred_parts() {
        let mut map = IndexMap::new();
        map.insert("title".to_string(), ContextValue::from(json!("hello")));
        map.insert(
            "owner".to_string(),
            ContextValue::from(DeferredResult::from_value(json!("user-1"))),
        );
        let value = ContextValue::List(vec![ContextValue::Object(map)]);

        assert!(value.is_pending());
        let completed = value.complete().await.expect("should complete");
        assert_eq!(completed, json!([{"title": "hello", "owner": "user-1"}]));
    }

    #[tokio::test]
    async fn test_complete_propagates_rejection() {
        let deferred = DeferredResult::for_operation("Read-0 users");
        deferred
            .reject(crate::core::error::GraphexError::validation("nope"))
            .expect("first reject should succeed");
        let value = ContextValue::from(deferred);

        let err = value.complete().await.expect_err("should fail");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_try_plain_refuses_pending_values() {
        let mut map = IndexMap::new();
        map.insert("k".to_string(), ContextValue::from(json!("a")));
        let plain = ContextValue::Object(map.clone());
        assert_eq!(plain.try_plain(), Some(json!({"k": "a"})));

        map.insert(
            "owner".to_string(),
            ContextValue::from(DeferredResult::for_operation("Read-0 users")),
        );
        assert!(ContextValue::Object(map).try_plain().is_none());
    }

    #[test]
    fn test_describe_renders_provenance() {
        let value = ContextValue::from(DeferredResult::for_operation("Create-1 users"));
        assert_eq!(
            value.describe(),
            json!("DeferredResult { Create-1 users }")
        );
    }
}
