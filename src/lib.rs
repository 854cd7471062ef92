//! # Graphex
//!
//! Compiles GraphQL-style requests into dependency-ordered data-store
//! operations and executes them against a pluggable back end.
//!
//! ## Features
//!
//! - **Hook-driven compilation**: a visitor walks the request and calls the
//!   hooks attached to fields, arguments and input types
//! - **Deferred results**: one operation's output feeds another operation's
//!   input without an explicit scheduler
//! - **Relation batching**: references found in many documents are looked up
//!   with one request per namespace
//! - **Configuration-Based**: model/collection metadata declared in YAML
//! - **Pluggable back end**: anything implementing [`Executor`](core::Executor),
//!   closures included
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use graphex::prelude::*;
//!
//! let schema = SchemaInfo::new()
//!     .with_type(TypeInfo::new("Query").field(
//!         FieldInfo::new("posts")
//!             .of_type("Post")
//!             .hooks(handlers::operation_field(OperationKind::Read, "posts", true)),
//!     ))
//!     .with_type(TypeInfo::new("Post")
//!         .field(FieldInfo::new("title").hooks(handlers::output_field())));
//!
//! let engine = QueryEngine::builder()
//!     .with_schema(schema)
//!     .with_executor(InMemoryExecutor::new())
//!     .build()?;
//!
//! let response = engine.execute("{ posts { title } }", None).await?;
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod execution;
pub mod storage;

/// Install a `tracing` subscriber filtered by `RUST_LOG`
///
/// Meant for binaries and tests; the library itself never installs one.
/// Calling it again once a subscriber is set is a no-op.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ContextValue, Executor, ExecutorRequest, GraphexError, ModelInfo, ModelRegistry, Predicate,
        Reference, RequestKind, RequestOptions,
    };

    // === Execution ===
    pub use crate::execution::{
        ArgumentInfo, Combinator, DataContext, DeferredResult, FieldHooks, FieldInfo,
        FieldsSelectionContext, Frame, ListValueContext, NodeKind, ObjectFieldContext, Operation,
        OperationId, OperationKind, OperationParams, SchemaInfo, SelectorContext, Stack,
        Transaction, TypeInfo, VisitNode, handlers, parse_document, visit,
    };

    // === Config ===
    pub use crate::config::{EngineOptions, ModelConfig, ModelsConfig};

    // === Engine ===
    pub use crate::engine::{QueryEngine, QueryEngineBuilder};

    // === Storage ===
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryExecutor;

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde_json::{Value, json};
}
