//! Transaction: the operations of one request
//!
//! The transaction is the arena that owns every [`Operation`] built while the
//! visitor walks a request, together with the collection → model registry.
//! It is only mutated during the (synchronous) build phase; [`execute`]
//! borrows it immutably and runs every operation concurrently.
//!
//! [`execute`]: Transaction::execute

use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::core::error::{GraphexError, Result};
use crate::core::executor::Executor;
use crate::core::model::ModelRegistry;
use crate::execution::deferred::DeferredResult;
use crate::execution::operation::{Operation, OperationId, OperationKind, OperationParams};

#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    operations: Vec<Operation>,
    models: ModelRegistry,
    bindings: IndexMap<String, DeferredResult>,
}

impl Transaction {
    pub fn new(models: ModelRegistry) -> Self {
        Self {
            id: Uuid::new_v4(),
            operations: Vec::new(),
            models,
            bindings: IndexMap::new(),
        }
    }

    /// Unique id, used to correlate log lines of one request
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    /// Create an operation and register it with this transaction
    pub fn create_operation(
        &mut self,
        kind: OperationKind,
        params: OperationParams,
    ) -> Result<OperationId> {
        let id = OperationId::new(self.operations.len());
        let operation = Operation::new(id, kind, params)?;
        tracing::trace!(
            transaction_id = %self.id,
            operation = %operation.identifier(),
            "operation created"
        );
        self.operations.push(operation);
        Ok(id)
    }

    pub fn operation(&self, id: OperationId) -> Result<&Operation> {
        self.operations
            .get(id.index())
            .ok_or_else(|| unknown_operation(id))
    }

    pub fn operation_mut(&mut self, id: OperationId) -> Result<&mut Operation> {
        self.operations
            .get_mut(id.index())
            .ok_or_else(|| unknown_operation(id))
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Raw result node of an operation
    pub fn result(&self, id: OperationId) -> Result<DeferredResult> {
        Ok(self.operation(id)?.result().clone())
    }

    /// Expose a node under `key` in the response
    ///
    /// Binding the same key again replaces the previous node.
    pub fn bind_result(&mut self, key: impl Into<String>, result: DeferredResult) {
        self.bindings.insert(key.into(), result);
    }

    pub fn bindings(&self) -> &IndexMap<String, DeferredResult> {
        &self.bindings
    }

    /// Execute every operation against `executor`
    ///
    /// All operations are started together and awaited until each of them
    /// has settled; nothing is cancelled when one fails. The error returned
    /// is the first one observed. Operations that succeeded keep their
    /// effects: there is no rollback.
    pub async fn execute(&self, executor: &dyn Executor) -> Result<()> {
        let span = tracing::debug_span!(
            "transaction",
            transaction_id = %self.id,
            operations = self.operations.len()
        );

        async {
            let mut pending: FuturesUnordered<_> = self
                .operations
                .iter()
                .map(|operation| operation.execute(executor, &self.models))
                .collect();

            let mut first_error: Option<GraphexError> = None;
            while let Some(outcome) = pending.next().await {
                if let Err(err) = outcome {
                    if first_error.is_none() {
                        tracing::warn!(error = %err, "operation failed");
                        first_error = Some(err);
                    }
                }
            }

            match first_error {
                Some(err) => Err(err),
                None => {
                    tracing::debug!("transaction completed");
                    Ok(())
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Response object built from the bound nodes, in binding order
    pub async fn response(&self) -> Result<Value> {
        let mut data = Map::new();
        for (key, result) in &self.bindings {
            data.insert(key.clone(), result.settled().await?);
        }
        Ok(Value::Object(data))
    }
}

fn unknown_operation(id: OperationId) -> GraphexError {
    GraphexError::build(id.to_string(), "unknown operation")
}
