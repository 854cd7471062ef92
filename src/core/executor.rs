//! Executor contract
//!
//! The engine never talks to a data store directly. Every operation is
//! turned into a plain [`ExecutorRequest`] and handed to an [`Executor`],
//! which is the single asynchronous entry point a back end must expose.
//! Adapters for concrete stores live outside the engine; closures can be used
//! directly thanks to the blanket implementation below.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Kind of back-end call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestKind {
    Find,
    FindOne,
    InsertOne,
    InsertMany,
    UpdateOne,
    DeleteOne,
    DeleteMany,
    Aggregate,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Find => "find",
            RequestKind::FindOne => "findOne",
            RequestKind::InsertOne => "insertOne",
            RequestKind::InsertMany => "insertMany",
            RequestKind::UpdateOne => "updateOne",
            RequestKind::DeleteOne => "deleteOne",
            RequestKind::DeleteMany => "deleteMany",
            RequestKind::Aggregate => "aggregate",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Paging, ordering and update options
///
/// Reads fill `sort`/`skip`/`limit`; updates fill `array_filters`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub array_filters: Option<Vec<Value>>,
}

/// Plain request handed to the executor
///
/// All pending values have been resolved by the time a request is built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutorRequest {
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<Vec<Value>>,
}

impl ExecutorRequest {
    /// Request skeleton with no selector, fields or payload
    pub fn new(kind: RequestKind, collection: impl Into<String>) -> Self {
        Self {
            kind,
            collection: collection.into(),
            selector: None,
            fields: None,
            options: None,
            doc: None,
            docs: None,
        }
    }
}

/// Back end entry point
///
/// Results follow the request kind: an array for `find`/`insertMany`, a
/// document or `null` for the single-document kinds, a count for
/// `deleteMany` and `aggregate`. Errors are propagated to the operation's
/// deferred result without modification.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutorRequest) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> Executor for F
where
    F: Fn(ExecutorRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn execute(&self, request: ExecutorRequest) -> anyhow::Result<Value> {
        (self)(request).await
    }
}
