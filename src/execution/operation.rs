//! Operations
//!
//! An [`Operation`] is one back-end call under construction. Hooks create it
//! when the visitor enters a field, fill its contexts while the visitor walks
//! the field's arguments and sub-selections, and the [`Transaction`] executes
//! it once the walk is over.
//!
//! Every operation owns exactly one [`DeferredResult`]. Other operations and
//! result bindings depend on it by holding clones of that node.
//!
//! [`Transaction`]: crate::execution::Transaction

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::fmt;

use crate::core::error::{GraphexError, Result};
use crate::core::executor::{Executor, ExecutorRequest, RequestKind, RequestOptions};
use crate::core::model::ModelRegistry;
use crate::core::reference::{id_key, references_from_value};
use crate::core::value::ContextValue;
use crate::execution::contexts::{
    DataContext, FieldsSelectionContext, ListValueContext, SelectorContext,
};
use crate::execution::deferred::DeferredResult;

/// Prefix of the positional identifiers given to array filters
pub const ARRAY_FILTER_PREFIX: &str = "arrFltr";

/// Index of an operation inside its transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(usize);

impl OperationId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Read,
    Create,
    Update,
    Delete,
    /// Count of matching documents
    Aggregate,
    /// Batched lookup of documents by reference
    ReadByReference,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "Read",
            OperationKind::Create => "Create",
            OperationKind::Update => "Update",
            OperationKind::Delete => "Delete",
            OperationKind::Aggregate => "Aggregate",
            OperationKind::ReadByReference => "ReadByReference",
        }
    }

    /// Whether the target model's discriminator restricts this operation
    fn uses_discriminator(&self) -> bool {
        matches!(
            self,
            OperationKind::Read
                | OperationKind::Update
                | OperationKind::Delete
                | OperationKind::Aggregate
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction parameters
///
/// Only `collection` (or `references` for reference lookups) is required;
/// hooks usually fill the rest while the walk goes on.
#[derive(Debug, Clone, Default)]
pub struct OperationParams {
    pub collection: Option<String>,
    pub many: bool,
    pub selector: Option<SelectorContext>,
    pub data: Option<DataContext>,
    pub data_list: Option<ListValueContext>,
    pub fields_selection: Option<FieldsSelectionContext>,
    pub order_by: Option<ContextValue>,
    pub skip: Option<u64>,
    pub first: Option<u64>,
    /// References to look up (ReadByReference only)
    pub references: Option<ContextValue>,
}

impl OperationParams {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    /// Parameters for a lookup driven by a list of references
    pub fn for_references(references: impl Into<ContextValue>) -> Self {
        Self {
            references: Some(references.into()),
            ..Default::default()
        }
    }

    pub fn many(mut self, many: bool) -> Self {
        self.many = many;
        self
    }

    pub fn selector(mut self, selector: SelectorContext) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn data(mut self, data: DataContext) -> Self {
        self.data = Some(data);
        self
    }

    pub fn data_list(mut self, data_list: ListValueContext) -> Self {
        self.data_list = Some(data_list);
        self
    }

    pub fn fields_selection(mut self, fields: FieldsSelectionContext) -> Self {
        self.fields_selection = Some(fields);
        self
    }

    pub fn order_by(mut self, order_by: impl Into<ContextValue>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn first(mut self, first: u64) -> Self {
        self.first = Some(first);
        self
    }
}

/// Positional filter for the elements of an embedded array (update only)
#[derive(Debug, Clone)]
pub struct ArrayFilter {
    pub identifier: String,
    pub filter: Option<ContextValue>,
}

#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    identifier: String,
    params: OperationParams,
    array_filters: Vec<ArrayFilter>,
    result: DeferredResult,
    output: Option<DeferredResult>,
}

impl Operation {
    /// New operation; the transaction assigns `id`
    pub(crate) fn new(id: OperationId, kind: OperationKind, params: OperationParams) -> Result<Self> {
        let identifier = match &params.collection {
            Some(collection) => format!("{}-{} {}", kind, id.index(), collection),
            None => format!("{}-{}", kind, id.index()),
        };

        match kind {
            OperationKind::ReadByReference if params.references.is_none() => {
                return Err(GraphexError::build(
                    identifier,
                    "reference lookup needs a list of references",
                ));
            }
            OperationKind::ReadByReference => {}
            _ if params.collection.is_none() => {
                return Err(GraphexError::build(identifier, "operation needs a collection"));
            }
            _ => {}
        }

        let result = DeferredResult::for_operation(identifier.clone());
        Ok(Self {
            id,
            kind,
            identifier,
            params,
            array_filters: Vec::new(),
            result,
            output: None,
        })
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Diagnostic name, e.g. `Read-0 posts`
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn collection(&self) -> Option<&str> {
        self.params.collection.as_deref()
    }

    pub fn many(&self) -> bool {
        self.params.many
    }

    pub fn set_many(&mut self, many: bool) {
        self.params.many = many;
    }

    /// The raw back-end response, once executed
    pub fn result(&self) -> &DeferredResult {
        &self.result
    }

    /// The value presented to callers
    ///
    /// Starts as the raw result; hooks replace it with derived nodes
    /// (resolved relations, filtered embedded arrays).
    pub fn output(&self) -> DeferredResult {
        self.output.clone().unwrap_or_else(|| self.result.clone())
    }

    pub fn set_output(&mut self, output: DeferredResult) {
        self.output = Some(output);
    }

    // === Contexts ===

    pub fn selector(&self) -> Option<&SelectorContext> {
        self.params.selector.as_ref()
    }

    pub fn selector_mut(&mut self) -> &mut SelectorContext {
        self.params.selector.get_or_insert_with(SelectorContext::new)
    }

    pub fn set_selector(&mut self, selector: SelectorContext) {
        self.params.selector = Some(selector);
    }

    pub fn data(&self) -> Option<&DataContext> {
        self.params.data.as_ref()
    }

    pub fn data_mut(&mut self) -> &mut DataContext {
        self.params.data.get_or_insert_with(DataContext::new)
    }

    pub fn set_data(&mut self, data: DataContext) {
        self.params.data = Some(data);
    }

    pub fn data_list(&self) -> Option<&ListValueContext> {
        self.params.data_list.as_ref()
    }

    pub fn set_data_list(&mut self, data_list: ListValueContext) {
        self.params.data_list = Some(data_list);
    }

    pub fn fields_selection(&self) -> Option<&FieldsSelectionContext> {
        self.params.fields_selection.as_ref()
    }

    pub fn fields_selection_mut(&mut self) -> &mut FieldsSelectionContext {
        self.params
            .fields_selection
            .get_or_insert_with(FieldsSelectionContext::new)
    }

    pub fn set_fields_selection(&mut self, fields: FieldsSelectionContext) {
        self.params.fields_selection = Some(fields);
    }

    pub fn set_order_by(&mut self, order_by: impl Into<ContextValue>) {
        self.params.order_by = Some(order_by.into());
    }

    pub fn set_skip(&mut self, skip: u64) {
        self.params.skip = Some(skip);
    }

    pub fn set_first(&mut self, first: u64) {
        self.params.first = Some(first);
    }

    pub fn set_references(&mut self, references: impl Into<ContextValue>) {
        self.params.references = Some(references.into());
    }

    /// Reserve a positional array filter and return its identifier
    ///
    /// Identifiers are `arrFltr0`, `arrFltr1`, … in creation order.
    pub fn create_array_filter(&mut self) -> String {
        let identifier = format!("{}{}", ARRAY_FILTER_PREFIX, self.array_filters.len());
        self.array_filters.push(ArrayFilter {
            identifier: identifier.clone(),
            filter: None,
        });
        identifier
    }

    pub fn set_array_filter(&mut self, identifier: &str, filter: impl Into<ContextValue>) -> Result<()> {
        let slot = self
            .array_filters
            .iter_mut()
            .find(|f| f.identifier == identifier)
            .ok_or_else(|| {
                GraphexError::build(
                    self.identifier.clone(),
                    format!("unknown array filter '{}'", identifier),
                )
            })?;
        slot.filter = Some(filter.into());
        Ok(())
    }

    pub fn array_filters(&self) -> &[ArrayFilter] {
        &self.array_filters
    }

    // === Execution ===

    /// Run the operation and settle its result
    ///
    /// The returned error, if any, is the one the result was rejected with.
    pub async fn execute(&self, executor: &dyn Executor, models: &ModelRegistry) -> Result<()> {
        let outcome = match self.kind {
            OperationKind::ReadByReference => self.execute_lookup(executor, models).await,
            _ => match self.build_request(models).await {
                Ok(request) => self.dispatch(executor, request).await,
                Err(err) => Err(err),
            },
        };

        let reported = outcome.as_ref().map(|_| ()).map_err(Clone::clone);
        match outcome {
            Ok(value) => self.result.resolve(value)?,
            Err(err) => self.result.reject(err)?,
        }
        reported
    }

    async fn dispatch(&self, executor: &dyn Executor, request: ExecutorRequest) -> Result<Value> {
        tracing::debug!(
            operation = %self.identifier,
            request_type = %request.kind,
            collection = %request.collection,
            "dispatching operation"
        );
        let response = executor
            .execute(request)
            .await
            .map_err(|err| GraphexError::executor(self.identifier.clone(), err))?;
        tracing::debug!(operation = %self.identifier, "operation settled");
        Ok(response)
    }

    /// Plain executor request for this operation
    ///
    /// Waits for every pending value held in the contexts. Not used for
    /// reference lookups, which issue one request per namespace.
    pub async fn build_request(&self, models: &ModelRegistry) -> Result<ExecutorRequest> {
        let logical = self.params.collection.as_deref().ok_or_else(|| {
            GraphexError::build(self.identifier.clone(), "operation has no collection")
        })?;
        let many = self.params.many;

        let kind = match self.kind {
            OperationKind::Read if many => RequestKind::Find,
            OperationKind::Read => RequestKind::FindOne,
            OperationKind::Create if many => RequestKind::InsertMany,
            OperationKind::Create => RequestKind::InsertOne,
            OperationKind::Update => RequestKind::UpdateOne,
            OperationKind::Delete if many => RequestKind::DeleteMany,
            OperationKind::Delete => RequestKind::DeleteOne,
            OperationKind::Aggregate => RequestKind::Aggregate,
            OperationKind::ReadByReference => {
                return Err(GraphexError::build(
                    self.identifier.clone(),
                    "reference lookups issue one request per namespace",
                ));
            }
        };

        let mut request = ExecutorRequest::new(kind, models.store_collection(logical));
        let discriminator = models
            .get(logical)
            .and_then(|model| model.discriminator_condition());

        if self.kind.uses_discriminator() {
            let mut selector = match &self.params.selector {
                Some(selector) => Some(selector.to_value().complete().await?),
                None => None,
            };
            if let Some((field, value)) = discriminator {
                tag_document(
                    selector.get_or_insert_with(|| Value::Object(Map::new())),
                    field,
                    value,
                );
            }
            request.selector = selector;
        }

        if !matches!(self.kind, OperationKind::Delete | OperationKind::Aggregate) {
            request.fields = self
                .params
                .fields_selection
                .as_ref()
                .map(|fields| fields.fields().to_vec());
        }

        match self.kind {
            OperationKind::Read => {
                let sort = match &self.params.order_by {
                    Some(order_by) => Some(order_by.complete().await?),
                    None => None,
                };
                request.options = Some(RequestOptions {
                    sort,
                    skip: self.params.skip,
                    limit: self.params.first,
                    ..Default::default()
                });
            }
            OperationKind::Create if many => {
                let mut docs = match (&self.params.data_list, &self.params.data) {
                    (Some(list), _) => match list.to_value().complete().await? {
                        Value::Array(docs) => docs,
                        other => vec![other],
                    },
                    (None, Some(data)) => vec![data.to_value().complete().await?],
                    (None, None) => Vec::new(),
                };
                if let Some((field, value)) = discriminator {
                    docs.iter_mut().for_each(|doc| tag_document(doc, field, value));
                }
                request.docs = Some(docs);
            }
            OperationKind::Create => {
                let mut doc = match &self.params.data {
                    Some(data) => data.to_value().complete().await?,
                    None => Value::Object(Map::new()),
                };
                if let Some((field, value)) = discriminator {
                    tag_document(&mut doc, field, value);
                }
                request.doc = Some(doc);
            }
            OperationKind::Update => {
                request.doc = Some(match &self.params.data {
                    Some(data) => data.to_value().complete().await?,
                    None => Value::Object(Map::new()),
                });
                request.options = Some(RequestOptions {
                    array_filters: self.complete_array_filters().await?,
                    ..Default::default()
                });
            }
            _ => {}
        }

        Ok(request)
    }

    async fn complete_array_filters(&self) -> Result<Option<Vec<Value>>> {
        if self.array_filters.is_empty() {
            return Ok(None);
        }

        let mut filters = Vec::with_capacity(self.array_filters.len());
        for array_filter in &self.array_filters {
            let filter = array_filter.filter.as_ref().ok_or_else(|| {
                GraphexError::build(
                    self.identifier.clone(),
                    format!("array filter '{}' was never given a filter", array_filter.identifier),
                )
            })?;
            let mut entry = Map::new();
            entry.insert(array_filter.identifier.clone(), filter.complete().await?);
            filters.push(Value::Object(entry));
        }
        Ok(Some(filters))
    }

    /// One `find` per namespace, then a namespace → id → document map
    async fn execute_lookup(&self, executor: &dyn Executor, models: &ModelRegistry) -> Result<Value> {
        let references = match &self.params.references {
            Some(references) => references.complete().await?,
            None => Value::Array(Vec::new()),
        };

        let mut grouped: IndexMap<String, IndexMap<String, Value>> = IndexMap::new();
        for reference in references_from_value(&references)? {
            let key = reference.id_key();
            grouped
                .entry(reference.namespace)
                .or_default()
                .entry(key)
                .or_insert(reference.id);
        }

        let mut fields = self
            .params
            .fields_selection
            .as_ref()
            .map(|fields| fields.fields().to_vec());
        if let Some(fields) = fields.as_mut() {
            if !fields.iter().any(|f| f == "_id") {
                fields.insert(0, "_id".to_string());
            }
        }

        let requests = grouped.iter().map(|(namespace, ids)| {
            let mut selector = json!({"_id": {"$in": ids.values().cloned().collect::<Vec<_>>()}});
            if let Some((field, value)) = models.get(namespace).and_then(|m| m.discriminator_condition()) {
                tag_document(&mut selector, field, value);
            }
            let mut request = ExecutorRequest::new(RequestKind::Find, models.store_collection(namespace));
            request.selector = Some(selector);
            request.fields = fields.clone();
            request.options = Some(RequestOptions::default());
            let namespace = namespace.clone();
            async move {
                let docs = self.dispatch(executor, request).await?;
                Ok::<_, GraphexError>((namespace, docs))
            }
        });

        let mut lookup = Map::new();
        for (namespace, docs) in try_join_all(requests).await? {
            let mut by_id = Map::new();
            if let Value::Array(docs) = docs {
                for doc in docs {
                    if let Some(id) = doc.get("_id") {
                        by_id.insert(id_key(id), doc.clone());
                    }
                }
            }
            lookup.insert(namespace, Value::Object(by_id));
        }
        Ok(Value::Object(lookup))
    }
}

/// Set `field = value` on a document, overriding what the caller sent
fn tag_document(doc: &mut Value, field: &str, value: &Value) {
    if let Value::Object(map) = doc {
        map.insert(field.to_string(), value.clone());
    }
}
