//! Compile-and-execute engine
//!
//! A request is handled in two phases:
//!
//! 1. **Build** (synchronous): the [`visitor`] walks the request document and
//!    calls the hooks attached through [`SchemaInfo`]. Hooks push operations
//!    and contexts on the [`Stack`], fill them, and register every
//!    [`Operation`] in the [`Transaction`]. Dependencies between operations
//!    are expressed by handing one operation's [`DeferredResult`] (or a node
//!    derived from it) to another operation's contexts.
//! 2. **Execute** (asynchronous): [`Transaction::execute`] starts every
//!    operation at once. Each operation waits for the pending values in its
//!    inputs, calls the executor and settles its own result. Ordering falls
//!    out of the dependency graph; there is no explicit scheduler.

pub mod contexts;
pub mod deferred;
pub mod handlers;
pub mod operation;
pub mod path;
pub mod schema;
pub mod transaction;
pub mod visitor;

pub use contexts::{
    Combinator, DataContext, FieldsSelectionContext, ListValueContext, ObjectFieldContext,
    SelectorContext,
};
pub use deferred::{DeferredResult, Transform};
pub use operation::{Operation, OperationId, OperationKind, OperationParams};
pub use path::{Frame, Stack};
pub use schema::{ArgumentInfo, FieldHooks, FieldInfo, NodeKind, SchemaInfo, TypeInfo, VisitNode};
pub use transaction::Transaction;
pub use visitor::{parse_document, visit};
