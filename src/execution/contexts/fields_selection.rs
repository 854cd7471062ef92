//! Projected fields context

/// Ordered list of store field names to return
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldsSelectionContext {
    fields: Vec<String>,
}

impl FieldsSelectionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut context = Self::new();
        for field in fields {
            context.add_field(field);
        }
        context
    }

    /// Append a field; selecting a field twice keeps its first position
    pub fn add_field(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
