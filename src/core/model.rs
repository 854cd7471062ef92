//! Collection metadata consulted while shaping requests

use serde_json::Value;
use std::collections::HashMap;

/// Metadata for one logical collection
///
/// When several models share a physical collection (single-table
/// inheritance), each gets its own logical name and a discriminator that is
/// added to the selector of every read, update and delete.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// Model (type) name, for diagnostics
    pub name: String,
    /// Physical collection the executor should target
    pub store_collection: String,
    /// Field holding the discriminator value
    pub discriminator_field: Option<String>,
    /// Discriminator value identifying this model
    pub discriminator: Option<Value>,
}

impl ModelInfo {
    /// Model stored in its own collection, no discriminator
    pub fn new(name: impl Into<String>, store_collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_collection: store_collection.into(),
            discriminator_field: None,
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.discriminator_field = Some(field.into());
        self.discriminator = Some(value.into());
        self
    }

    /// Field/value pair to add to selectors, if this model has one
    pub fn discriminator_condition(&self) -> Option<(&str, &Value)> {
        match (&self.discriminator_field, &self.discriminator) {
            (Some(field), Some(value)) => Some((field.as_str(), value)),
            _ => None,
        }
    }
}

/// Collection name → model metadata for one request
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, ModelInfo>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata under the collection name operations use
    pub fn register(&mut self, collection: impl Into<String>, model: ModelInfo) {
        self.models.insert(collection.into(), model);
    }

    pub fn get(&self, collection: &str) -> Option<&ModelInfo> {
        self.models.get(collection)
    }

    /// Physical collection for a logical name (identity when unregistered)
    pub fn store_collection<'a>(&'a self, collection: &'a str) -> &'a str {
        self.models
            .get(collection)
            .map(|m| m.store_collection.as_str())
            .unwrap_or(collection)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ModelInfo)> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
