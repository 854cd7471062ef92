//! Selector (filter) context

use indexmap::IndexMap;
use serde_json::Value;

use crate::core::value::{ContextValue, context_map};

/// How several selectors are combined into one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    fn operator(&self) -> &'static str {
        match self {
            Combinator::And => "$and",
            Combinator::Or => "$or",
        }
    }
}

/// Field name → filter value (a literal or an `{operator: value}` object)
#[derive(Debug, Clone, Default)]
pub struct SelectorContext {
    selector: IndexMap<String, ContextValue>,
}

impl SelectorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(selector: IndexMap<String, ContextValue>) -> Self {
        Self { selector }
    }

    /// Selector from a plain JSON object; other values give an empty selector
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_map(context_map(map)),
            _ => Self::new(),
        }
    }

    /// Combine selectors under `$and` / `$or`
    ///
    /// Empty selectors are dropped; a single remaining selector is returned
    /// as is.
    pub fn combine(combinator: Combinator, selectors: Vec<SelectorContext>) -> Self {
        let mut parts: Vec<SelectorContext> =
            selectors.into_iter().filter(|s| !s.is_empty()).collect();
        if parts.len() <= 1 {
            return parts.pop().unwrap_or_default();
        }

        let list = parts
            .into_iter()
            .map(SelectorContext::into_value)
            .collect::<Vec<_>>();
        let mut selector = IndexMap::new();
        selector.insert(combinator.operator().to_string(), ContextValue::List(list));
        Self { selector }
    }

    /// Set a condition, replacing any previous one for the same key
    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.selector.insert(key.into(), value.into());
    }

    /// Add a condition, AND-ing it with an existing one for the same key
    pub fn and_value(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        let key = key.into();
        let value = value.into();
        let Some(previous) = self.selector.shift_remove(&key) else {
            self.selector.insert(key, value);
            return;
        };

        let mut clauses = match self.selector.shift_remove("$and") {
            Some(ContextValue::List(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        clauses.push(single(&key, previous));
        clauses.push(single(&key, value));
        self.selector
            .insert("$and".to_string(), ContextValue::List(clauses));
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.selector.get(key)
    }

    pub fn selector(&self) -> &IndexMap<String, ContextValue> {
        &self.selector
    }

    pub fn is_empty(&self) -> bool {
        self.selector.is_empty()
    }

    /// Snapshot for an operation or a parent context
    pub fn to_value(&self) -> ContextValue {
        ContextValue::Object(self.selector.clone())
    }

    pub fn into_value(self) -> ContextValue {
        ContextValue::Object(self.selector)
    }
}

fn single(key: &str, value: ContextValue) -> ContextValue {
    let mut map = IndexMap::new();
    map.insert(key.to_string(), value);
    ContextValue::Object(map)
}
