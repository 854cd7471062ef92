//! Hook attachment points
//!
//! [`SchemaInfo`] is what the visitor consults to find the hooks of a field,
//! argument or input type. It carries no type checking: schema generation
//! and the factories deciding which hooks go where live outside the engine
//! and only hand over the result.
//!
//! # Example
//!
//! ```rust,ignore
//! let schema = SchemaInfo::new().with_type(
//!     TypeInfo::new("Query").field(
//!         FieldInfo::new("posts")
//!             .of_type("Post")
//!             .hooks(handlers::operation_field(OperationKind::Read, "posts", true))
//!             .argument(ArgumentInfo::new("where").hooks(handlers::selector_argument())),
//!     ),
//! );
//! ```

use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::core::error::Result;
use crate::execution::path::Stack;
use crate::execution::transaction::Transaction;

pub const DEFAULT_QUERY_TYPE: &str = "Query";
pub const DEFAULT_MUTATION_TYPE: &str = "Mutation";

/// What kind of request node a hook is called for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The operation definition (`query`/`mutation`), with the root type's hooks
    Operation,
    /// A field of a selection set
    Field,
    /// A field argument
    Argument,
    /// A field of an input object value
    ObjectField,
    /// An input object value, with its input type's hooks
    ObjectValue,
}

/// Request node handed to hooks
#[derive(Debug, Clone)]
pub struct VisitNode {
    pub kind: NodeKind,
    /// Schema name of the field, argument or type
    pub name: String,
    /// Response key, when the request aliased the field
    pub alias: Option<String>,
    /// Name of the field in the store
    pub store_name: String,
    /// Named type of the node, if the schema knows it
    pub type_name: Option<String>,
    /// Argument or input value, variables already substituted
    pub value: Option<Value>,
}

impl VisitNode {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            kind,
            store_name: name.clone(),
            name,
            alias: None,
            type_name: None,
            value: None,
        }
    }

    /// Key the field appears under in the response
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A hook body
pub type Hook = Arc<dyn Fn(&VisitNode, &mut Transaction, &mut Stack) -> Result<()> + Send + Sync>;

/// `enter`/`leave` pair attached to one node
#[derive(Clone, Default)]
pub struct FieldHooks {
    pub enter: Option<Hook>,
    pub leave: Option<Hook>,
}

impl FieldHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_enter<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VisitNode, &mut Transaction, &mut Stack) -> Result<()> + Send + Sync + 'static,
    {
        self.enter = Some(Arc::new(hook));
        self
    }

    pub fn on_leave<F>(mut self, hook: F) -> Self
    where
        F: Fn(&VisitNode, &mut Transaction, &mut Stack) -> Result<()> + Send + Sync + 'static,
    {
        self.leave = Some(Arc::new(hook));
        self
    }

    pub(crate) fn run_enter(&self, node: &VisitNode, transaction: &mut Transaction, stack: &mut Stack) -> Result<()> {
        match &self.enter {
            Some(hook) => hook(node, transaction, stack),
            None => Ok(()),
        }
    }

    pub(crate) fn run_leave(&self, node: &VisitNode, transaction: &mut Transaction, stack: &mut Stack) -> Result<()> {
        match &self.leave {
            Some(hook) => hook(node, transaction, stack),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FieldHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHooks")
            .field("enter", &self.enter.is_some())
            .field("leave", &self.leave.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ArgumentInfo {
    pub name: String,
    pub type_name: Option<String>,
    pub hooks: Option<FieldHooks>,
}

impl ArgumentInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            hooks: None,
        }
    }

    /// Input type of the argument, used to walk object values
    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }
}

/// A field of an object type or of an input type
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    /// Store name when it differs from the schema name
    pub store_name: Option<String>,
    pub type_name: Option<String>,
    pub hooks: Option<FieldHooks>,
    pub arguments: IndexMap<String, ArgumentInfo>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store_name: None,
            type_name: None,
            hooks: None,
            arguments: IndexMap::new(),
        }
    }

    pub fn stored_as(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = Some(store_name.into());
        self
    }

    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn argument(mut self, argument: ArgumentInfo) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    pub fn store_name(&self) -> &str {
        self.store_name.as_deref().unwrap_or(&self.name)
    }
}

/// Object or input type; its own hooks run on every object value of the type
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub hooks: Option<FieldHooks>,
    pub fields: IndexMap<String, FieldInfo>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hooks: None,
            fields: IndexMap::new(),
        }
    }

    pub fn hooks(mut self, hooks: FieldHooks) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

#[derive(Debug, Clone)]
pub struct SchemaInfo {
    query_type: String,
    mutation_type: String,
    types: HashMap<String, TypeInfo>,
}

impl Default for SchemaInfo {
    fn default() -> Self {
        Self {
            query_type: DEFAULT_QUERY_TYPE.to_string(),
            mutation_type: DEFAULT_MUTATION_TYPE.to_string(),
            types: HashMap::new(),
        }
    }
}

impl SchemaInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_types(mut self, query: impl Into<String>, mutation: impl Into<String>) -> Self {
        self.query_type = query.into();
        self.mutation_type = mutation.into();
        self
    }

    pub fn with_type(mut self, type_info: TypeInfo) -> Self {
        self.add_type(type_info);
        self
    }

    /// Register a type, replacing any previous one with the same name
    pub fn add_type(&mut self, type_info: TypeInfo) {
        self.types.insert(type_info.name.clone(), type_info);
    }

    pub fn query_type(&self) -> &str {
        &self.query_type
    }

    pub fn mutation_type(&self) -> &str {
        &self.mutation_type
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldInfo> {
        self.types.get(type_name)?.fields.get(field_name)
    }
}
