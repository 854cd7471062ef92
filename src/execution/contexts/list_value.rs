//! Ordered list of values, used for multi-document payloads

use serde_json::Value;

use crate::core::value::ContextValue;

#[derive(Debug, Clone, Default)]
pub struct ListValueContext {
    values: Vec<ContextValue>,
}

impl ListValueContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            values: values.into_iter().map(ContextValue::Value).collect(),
        }
    }

    pub fn from_context_values(values: Vec<ContextValue>) -> Self {
        Self { values }
    }

    pub fn add_value(&mut self, value: impl Into<ContextValue>) {
        self.values.push(value.into());
    }

    pub fn values(&self) -> &[ContextValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_value(&self) -> ContextValue {
        ContextValue::List(self.values.clone())
    }

    pub fn into_value(self) -> ContextValue {
        ContextValue::List(self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_values_keep_insertion_order() {
        let mut list = ListValueContext::from_values(vec![json!({"title": "a"})]);
        list.add_value(json!({"title": "b"}));
        assert_eq!(list.len(), 2);
        assert_eq!(
            list.to_value().describe(),
            json!([{"title": "a"}, {"title": "b"}])
        );
    }
}
