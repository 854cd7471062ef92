//! Configuration loading and management
//!
//! Model metadata (which physical collection a logical collection lives in,
//! and which discriminator singles it out) is declared in YAML:
//!
//! ```yaml
//! engine:
//!   root_query_type: Query
//!   root_mutation_type: Mutation
//! models:
//!   - name: Admin
//!     collection: admins
//!     store_collection: users
//!     discriminator_field: role
//!     discriminator: admin
//!   - name: Post
//!     collection: posts
//! ```

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::core::model::{ModelInfo, ModelRegistry};
use crate::execution::schema::{DEFAULT_MUTATION_TYPE, DEFAULT_QUERY_TYPE};

/// Configuration for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model (type) name
    pub name: String,

    /// Logical collection name used by operations
    pub collection: String,

    /// Physical collection, when several models share one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_collection: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator_field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<Value>,
}

impl ModelConfig {
    fn to_model_info(&self) -> ModelInfo {
        let store = self
            .store_collection
            .clone()
            .unwrap_or_else(|| self.collection.clone());
        let model = ModelInfo::new(self.name.clone(), store);
        match (&self.discriminator_field, &self.discriminator) {
            (Some(field), Some(value)) => model.with_discriminator(field.clone(), value.clone()),
            _ => model,
        }
    }
}

/// Engine-wide options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Type whose fields are the roots of queries
    #[serde(default = "default_query_type")]
    pub root_query_type: String,

    /// Type whose fields are the roots of mutations
    #[serde(default = "default_mutation_type")]
    pub root_mutation_type: String,
}

fn default_query_type() -> String {
    DEFAULT_QUERY_TYPE.to_string()
}

fn default_mutation_type() -> String {
    DEFAULT_MUTATION_TYPE.to_string()
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            root_query_type: default_query_type(),
            root_mutation_type: default_mutation_type(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub engine: EngineOptions,

    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl ModelsConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    ///
    /// The configuration is validated before it is returned.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that collection names are unique and discriminators complete
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.collection.is_empty() {
                bail!("Model '{}' has an empty collection name", model.name);
            }
            if !seen.insert(model.collection.as_str()) {
                bail!("Collection '{}' is declared twice", model.collection);
            }
            if model.discriminator_field.is_some() != model.discriminator.is_some() {
                bail!(
                    "Model '{}' must set discriminator_field and discriminator together",
                    model.name
                );
            }
        }
        Ok(())
    }

    /// Find the configuration of a logical collection
    pub fn find_model(&self, collection: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.collection == collection)
    }

    /// Registry consulted by operations while shaping requests
    pub fn to_registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        for model in &self.models {
            registry.register(model.collection.clone(), model.to_model_info());
        }
        registry
    }
}
