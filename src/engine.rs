//! QueryEngine facade
//!
//! Ties the pieces together for callers that only have request text: parse,
//! walk with the schema hooks, execute every operation, then assemble the
//! `{"data": {...}}` response from the bound results.

use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::config::ModelsConfig;
use crate::core::error::{GraphexError, Result};
use crate::core::executor::Executor;
use crate::core::model::ModelRegistry;
use crate::execution::schema::SchemaInfo;
use crate::execution::transaction::Transaction;
use crate::execution::visitor::{parse_document, visit};

/// Compiles and executes requests against one executor
///
/// # Example
///
/// ```ignore
/// let engine = QueryEngine::builder()
///     .with_schema(schema)
///     .with_config_file("graphex.yaml")?
///     .with_executor(InMemoryExecutor::new())
///     .build()?;
///
/// let response = engine.execute("{ posts { title } }", None).await?;
/// ```
pub struct QueryEngine {
    schema: SchemaInfo,
    models: ModelRegistry,
    executor: Arc<dyn Executor>,
}

impl QueryEngine {
    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::new()
    }

    pub fn schema(&self) -> &SchemaInfo {
        &self.schema
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Execute the first operation of `query`
    pub async fn execute(&self, query: &str, variables: Option<&Map<String, Value>>) -> Result<Value> {
        self.execute_operation(query, None, variables).await
    }

    /// Execute the operation named `operation_name` of `query`
    pub async fn execute_operation(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: Option<&Map<String, Value>>,
    ) -> Result<Value> {
        let transaction = self.prepare(query, operation_name, variables)?;
        transaction.execute(self.executor.as_ref()).await?;
        let data = transaction.response().await?;
        Ok(json!({ "data": data }))
    }

    /// Build the transaction for a request without executing it
    pub fn prepare(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: Option<&Map<String, Value>>,
    ) -> Result<Transaction> {
        let document = parse_document(query)?;
        let empty = Map::new();
        let mut transaction = Transaction::new(self.models.clone());
        visit(
            &self.schema,
            &document,
            operation_name,
            variables.unwrap_or(&empty),
            &mut transaction,
        )?;
        tracing::debug!(
            transaction_id = %transaction.id(),
            operations = transaction.operations().len(),
            "request compiled"
        );
        Ok(transaction)
    }
}

/// Builder for [`QueryEngine`]
#[derive(Default)]
pub struct QueryEngineBuilder {
    schema: Option<SchemaInfo>,
    config: Option<ModelsConfig>,
    models: Option<ModelRegistry>,
    executor: Option<Arc<dyn Executor>>,
}

impl QueryEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hook schema (required)
    pub fn with_schema(mut self, schema: SchemaInfo) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Set the executor (required)
    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    /// Share an executor that is also used elsewhere
    pub fn with_shared_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Use an explicit model registry
    pub fn with_models(mut self, models: ModelRegistry) -> Self {
        self.models = Some(models);
        self
    }

    /// Take models and root type names from a configuration
    pub fn with_config(mut self, config: ModelsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the configuration from a YAML file
    pub fn with_config_file(self, path: &str) -> Result<Self> {
        let config = ModelsConfig::from_yaml_file(path).map_err(config_error)?;
        Ok(self.with_config(config))
    }

    pub fn build(self) -> Result<QueryEngine> {
        let mut schema = self.schema.ok_or_else(|| GraphexError::Config {
            message: "QueryEngine needs a schema".to_string(),
        })?;
        let executor = self.executor.ok_or_else(|| GraphexError::Config {
            message: "QueryEngine needs an executor".to_string(),
        })?;

        let mut models = self.models.unwrap_or_default();
        if let Some(config) = self.config {
            config.validate().map_err(config_error)?;
            schema = schema.with_root_types(
                config.engine.root_query_type.clone(),
                config.engine.root_mutation_type.clone(),
            );
            models = merge_registry(models, &config);
        }

        Ok(QueryEngine {
            schema,
            models,
            executor,
        })
    }
}

/// Explicitly registered models win over configured ones
fn merge_registry(explicit: ModelRegistry, config: &ModelsConfig) -> ModelRegistry {
    let mut merged = config.to_registry();
    for (collection, model) in explicit.iter() {
        merged.register(collection.clone(), model.clone());
    }
    merged
}

fn config_error(e: anyhow::Error) -> GraphexError {
    GraphexError::Config {
        message: e.to_string(),
    }
}
