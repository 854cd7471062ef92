//! Data (document payload) context

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::value::{ContextValue, context_map};

/// Update operator collecting dotted-path assignments
pub const SET_OPERATOR: &str = "$set";

/// Field name (or update operator) → value
#[derive(Debug, Clone, Default)]
pub struct DataContext {
    data: IndexMap<String, ContextValue>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: IndexMap<String, ContextValue>) -> Self {
        Self { data }
    }

    /// Data from a plain JSON object; other values give an empty context
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(context_map(map)),
            _ => Self::new(),
        }
    }

    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn set_data(&mut self, data: IndexMap<String, ContextValue>) {
        self.data = data;
    }

    /// Record `path = value` under `$set`
    ///
    /// The path is kept as one dotted key (`"a.b.c"`), which is how update
    /// executors address nested fields. Writing the same path twice keeps the
    /// last value.
    pub fn upsert_set(&mut self, path: impl Into<String>, value: impl Into<ContextValue>) {
        let entry = self
            .data
            .entry(SET_OPERATOR.to_string())
            .or_insert_with(ContextValue::object);
        if !matches!(entry, ContextValue::Object(_)) {
            *entry = ContextValue::object();
        }
        if let ContextValue::Object(set) = entry {
            set.insert(path.into(), value.into());
        }
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.data.get(key)
    }

    pub fn data(&self) -> &IndexMap<String, ContextValue> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn to_value(&self) -> ContextValue {
        ContextValue::Object(self.data.clone())
    }

    pub fn into_value(self) -> ContextValue {
        ContextValue::Object(self.data)
    }
}
