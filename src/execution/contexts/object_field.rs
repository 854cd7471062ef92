//! Single-value holder for one input field or argument

use crate::core::value::ContextValue;

/// Value of one field while its subtree is walked
///
/// `field_name` is the store name of the field; it is what the stack joins
/// when computing a dotted path since an operation.
#[derive(Debug, Clone, Default)]
pub struct ObjectFieldContext {
    field_name: Option<String>,
    array_filter: Option<String>,
    value: Option<ContextValue>,
}

impl ObjectFieldContext {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: Some(field_name.into()),
            array_filter: None,
            value: None,
        }
    }

    /// Holder for the elements of an embedded array matched by an array filter
    ///
    /// The path segment becomes `field.$[identifier]`, which is how update
    /// executors address the matched elements.
    pub fn for_array_filter(field_name: &str, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            field_name: Some(format!("{}.$[{}]", field_name, identifier)),
            array_filter: Some(identifier),
            value: None,
        }
    }

    /// Holder that does not contribute a path segment
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// Array filter identifier, if this holder addresses filtered elements
    pub fn array_filter(&self) -> Option<&str> {
        self.array_filter.as_deref()
    }

    pub fn set_value(&mut self, value: impl Into<ContextValue>) {
        self.value = Some(value.into());
    }

    pub fn value(&self) -> Option<&ContextValue> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> Option<&mut ContextValue> {
        self.value.as_mut()
    }

    pub fn into_value(self) -> Option<ContextValue> {
        self.value
    }
}
