//! Core module containing the vocabulary shared by the execution engine

pub mod error;
pub mod executor;
pub mod model;
pub mod predicate;
pub mod reference;
pub mod value;

pub use error::{GraphexError, Result};
pub use executor::{Executor, ExecutorRequest, RequestKind, RequestOptions};
pub use model::{ModelInfo, ModelRegistry};
pub use predicate::Predicate;
pub use reference::Reference;
pub use value::ContextValue;
