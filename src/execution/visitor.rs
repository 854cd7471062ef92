//! Request walker
//!
//! Walks a parsed request document in document order and calls the hooks the
//! [`SchemaInfo`] attaches to each node. A node's `enter` hook runs before
//! its arguments and children are visited, its `leave` hook after all of
//! them. Nodes without hooks are still descended into.
//!
//! The walker itself knows nothing about selectors or payloads. The only
//! frames it manages are the ones needed to carry literal values up to the
//! hooks:
//!
//! - a scalar is stored into the top frame when that frame is an object-field
//!   holder or a list;
//! - a list pushes a list frame, walks each item inside an anonymous holder,
//!   then hands the whole list to the frame below;
//! - an object value whose input type is unknown to the schema is stored as
//!   one scalar would be.
//!
//! Variables are substituted before any hook sees a value. Fragment spreads
//! and inline fragments are expanded in place.

use graphql_parser::query::{
    Definition, Document, Field, FragmentDefinition, OperationDefinition, Selection,
    SelectionSet, TypeCondition, Value as GqlValue,
};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

use crate::core::error::{GraphexError, Result};
use crate::core::value::ContextValue;
use crate::execution::contexts::{ListValueContext, ObjectFieldContext};
use crate::execution::path::{Frame, Stack};
use crate::execution::schema::{FieldHooks, FieldInfo, NodeKind, SchemaInfo, VisitNode};
use crate::execution::transaction::Transaction;

/// Parse request text
pub fn parse_document(text: &str) -> Result<Document<'_, String>> {
    graphql_parser::parse_query::<String>(text).map_err(|e| GraphexError::Parse {
        message: format!("Failed to parse query: {}", e),
    })
}

/// Walk one operation of `document`, building operations into `transaction`
///
/// `operation_name` selects among several operations; without it the first
/// one is used. Hooks must leave the stack as they found it.
pub fn visit(
    schema: &SchemaInfo,
    document: &Document<'_, String>,
    operation_name: Option<&str>,
    variables: &Map<String, Value>,
    transaction: &mut Transaction,
) -> Result<()> {
    let mut stack = Stack::new();
    let mut walker = Walker::new(schema, document, variables.clone());

    let operation = walker.select_operation(operation_name)?;
    walker.visit_operation(operation, transaction, &mut stack)?;

    if !stack.is_empty() {
        return Err(GraphexError::build(
            "",
            format!("hooks left {} frame(s) on the stack", stack.len()),
        ));
    }
    Ok(())
}

struct Walker<'v, 'a> {
    schema: &'v SchemaInfo,
    document: &'v Document<'a, String>,
    fragments: HashMap<&'v str, &'v FragmentDefinition<'a, String>>,
    variables: Map<String, Value>,
    active_fragments: Vec<String>,
}

impl<'v, 'a> Walker<'v, 'a> {
    fn new(schema: &'v SchemaInfo, document: &'v Document<'a, String>, variables: Map<String, Value>) -> Self {
        let fragments = document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Fragment(fragment) => Some((fragment.name.as_str(), fragment)),
                _ => None,
            })
            .collect();

        Self {
            schema,
            document,
            fragments,
            variables,
            active_fragments: Vec::new(),
        }
    }

    fn select_operation(&self, name: Option<&str>) -> Result<&'v OperationDefinition<'a, String>> {
        self.document
            .definitions
            .iter()
            .filter_map(|definition| match definition {
                Definition::Operation(operation) => Some(operation),
                _ => None,
            })
            .find(|operation| name.is_none() || operation_name(operation) == name)
            .ok_or_else(|| GraphexError::Parse {
                message: match name {
                    Some(name) => format!("No operation named '{}' found", name),
                    None => "No operation found".to_string(),
                },
            })
    }

    fn visit_operation(
        &mut self,
        operation: &'v OperationDefinition<'a, String>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        let schema = self.schema;
        let (label, root_type, selection_set, variable_definitions) = match operation {
            OperationDefinition::SelectionSet(set) => ("query", schema.query_type(), set, &[][..]),
            OperationDefinition::Query(query) => (
                "query",
                schema.query_type(),
                &query.selection_set,
                &query.variable_definitions[..],
            ),
            OperationDefinition::Mutation(mutation) => (
                "mutation",
                schema.mutation_type(),
                &mutation.selection_set,
                &mutation.variable_definitions[..],
            ),
            OperationDefinition::Subscription(_) => {
                return Err(GraphexError::Parse {
                    message: "Subscriptions are not supported".to_string(),
                });
            }
        };

        for definition in variable_definitions {
            if self.variables.contains_key(&definition.name) {
                continue;
            }
            if let Some(default) = &definition.default_value {
                let value = self.to_json(default);
                self.variables.insert(definition.name.clone(), value);
            }
        }

        let mut node = VisitNode::new(
            NodeKind::Operation,
            operation_name(operation).unwrap_or(label),
        );
        node.type_name = Some(root_type.to_string());
        let hooks = schema.get_type(root_type).and_then(|t| t.hooks.as_ref());

        stack.enter_path(label);
        run_enter(hooks, &node, transaction, stack)?;
        self.visit_selection_set(selection_set, Some(root_type), transaction, stack)?;
        run_leave(hooks, &node, transaction, stack)?;
        stack.leave_path();
        Ok(())
    }

    fn visit_selection_set(
        &mut self,
        set: &'v SelectionSet<'a, String>,
        parent_type: Option<&str>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        for selection in &set.items {
            match selection {
                Selection::Field(field) => {
                    self.visit_field(field, parent_type, transaction, stack)?;
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.fragment_name.as_str();
                    let fragment = self.fragments.get(name).copied().ok_or_else(|| {
                        GraphexError::Parse {
                            message: format!("Unknown fragment '{}'", name),
                        }
                    })?;
                    if self.active_fragments.iter().any(|active| active == name) {
                        return Err(GraphexError::Parse {
                            message: format!("Fragment '{}' spreads itself", name),
                        });
                    }

                    let TypeCondition::On(type_name) = &fragment.type_condition;
                    self.active_fragments.push(name.to_string());
                    self.visit_selection_set(
                        &fragment.selection_set,
                        Some(type_name.as_str()),
                        transaction,
                        stack,
                    )?;
                    self.active_fragments.pop();
                }
                Selection::InlineFragment(inline) => {
                    let type_name = match &inline.type_condition {
                        Some(TypeCondition::On(type_name)) => Some(type_name.as_str()),
                        None => parent_type,
                    };
                    self.visit_selection_set(&inline.selection_set, type_name, transaction, stack)?;
                }
            }
        }
        Ok(())
    }

    fn visit_field(
        &mut self,
        field: &'v Field<'a, String>,
        parent_type: Option<&str>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        if field.name.starts_with("__") {
            return Ok(());
        }

        let schema = self.schema;
        let info = parent_type.and_then(|parent| schema.field(parent, &field.name));
        let mut node = VisitNode::new(NodeKind::Field, field.name.as_str());
        node.alias = field.alias.clone();
        if let Some(info) = info {
            node.store_name = info.store_name().to_string();
            node.type_name = info.type_name.clone();
        }
        let hooks = info.and_then(|i| i.hooks.as_ref());

        stack.enter_path(node.response_key());
        run_enter(hooks, &node, transaction, stack)?;
        for (name, value) in &field.arguments {
            self.visit_argument(name, value, info, transaction, stack)?;
        }
        let child_type = info.and_then(|i| i.type_name.as_deref());
        self.visit_selection_set(&field.selection_set, child_type, transaction, stack)?;
        run_leave(hooks, &node, transaction, stack)?;
        stack.leave_path();
        Ok(())
    }

    fn visit_argument(
        &mut self,
        name: &str,
        value: &GqlValue<'a, String>,
        field: Option<&'v FieldInfo>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        let info = field.and_then(|f| f.arguments.get(name));
        let value = self.to_json(value);

        let mut node = VisitNode::new(NodeKind::Argument, name);
        node.type_name = info.and_then(|i| i.type_name.clone());
        node.value = Some(value.clone());
        let hooks = info.and_then(|i| i.hooks.as_ref());

        stack.enter_path(name);
        run_enter(hooks, &node, transaction, stack)?;
        self.visit_value(&value, node.type_name.as_deref(), transaction, stack)?;
        run_leave(hooks, &node, transaction, stack)?;
        stack.leave_path();
        Ok(())
    }

    fn visit_value(
        &mut self,
        value: &Value,
        type_name: Option<&str>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        match value {
            Value::Array(items) => self.visit_list(items, type_name, transaction, stack),
            Value::Object(map) => {
                match type_name.and_then(|name| self.schema.get_type(name)) {
                    Some(_) => self.visit_object_value(map, type_name, transaction, stack),
                    None => {
                        store_leaf(stack, value.clone().into());
                        Ok(())
                    }
                }
            }
            leaf => {
                store_leaf(stack, leaf.clone().into());
                Ok(())
            }
        }
    }

    fn visit_object_value(
        &mut self,
        map: &Map<String, Value>,
        type_name: Option<&str>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        let schema = self.schema;
        let type_info = type_name.and_then(|name| schema.get_type(name));

        let mut node = VisitNode::new(NodeKind::ObjectValue, type_name.unwrap_or_default());
        node.type_name = type_name.map(str::to_string);
        node.value = Some(Value::Object(map.clone()));
        let type_hooks = type_info.and_then(|t| t.hooks.as_ref());

        run_enter(type_hooks, &node, transaction, stack)?;
        for (key, value) in map {
            let info = type_info.and_then(|t| t.fields.get(key));
            let mut field_node = VisitNode::new(NodeKind::ObjectField, key.as_str());
            if let Some(info) = info {
                field_node.store_name = info.store_name().to_string();
                field_node.type_name = info.type_name.clone();
            }
            field_node.value = Some(value.clone());
            let hooks = info.and_then(|i| i.hooks.as_ref());

            stack.enter_path(key.as_str());
            run_enter(hooks, &field_node, transaction, stack)?;
            self.visit_value(value, field_node.type_name.as_deref(), transaction, stack)?;
            run_leave(hooks, &field_node, transaction, stack)?;
            stack.leave_path();
        }
        run_leave(type_hooks, &node, transaction, stack)?;
        Ok(())
    }

    fn visit_list(
        &mut self,
        items: &[Value],
        type_name: Option<&str>,
        transaction: &mut Transaction,
        stack: &mut Stack,
    ) -> Result<()> {
        stack.push(ListValueContext::new());
        for item in items {
            stack.push(ObjectFieldContext::anonymous());
            self.visit_value(item, type_name, transaction, stack)?;
            let holder = stack.pop_object_field()?;
            if let Some(value) = holder.into_value() {
                match stack.last_mut() {
                    Some(Frame::ListValue(list)) => list.add_value(value),
                    _ => return Err(stack.error("list item outlived its list")),
                }
            }
        }
        let list = stack.pop_list_value()?;
        store_leaf(stack, list.into_value());
        Ok(())
    }

    /// GraphQL literal to JSON, substituting variables
    fn to_json(&self, value: &GqlValue<'a, String>) -> Value {
        match value {
            GqlValue::Variable(name) => self.variables.get(name).cloned().unwrap_or(Value::Null),
            GqlValue::Null => Value::Null,
            GqlValue::Int(i) => i.as_i64().map(Value::from).unwrap_or(Value::Null),
            GqlValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            GqlValue::String(s) => Value::String(s.clone()),
            GqlValue::Boolean(b) => Value::Bool(*b),
            GqlValue::Enum(e) => Value::String(e.clone()),
            GqlValue::List(items) => Value::Array(items.iter().map(|v| self.to_json(v)).collect()),
            GqlValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.to_json(v)))
                    .collect(),
            ),
        }
    }
}

fn operation_name<'v>(operation: &'v OperationDefinition<'_, String>) -> Option<&'v str> {
    match operation {
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
        OperationDefinition::SelectionSet(_) => None,
    }
}

/// Hand a literal to the holder on top of the stack, if any
fn store_leaf(stack: &mut Stack, value: ContextValue) {
    match stack.last_mut() {
        Some(Frame::ObjectField(holder)) => holder.set_value(value),
        Some(Frame::ListValue(list)) => list.add_value(value),
        _ => tracing::trace!(path = %stack.breadcrumb(), "value not captured by any hook"),
    }
}

fn run_enter(
    hooks: Option<&FieldHooks>,
    node: &VisitNode,
    transaction: &mut Transaction,
    stack: &mut Stack,
) -> Result<()> {
    tracing::trace!(kind = ?node.kind, name = %node.name, path = %stack.breadcrumb(), "enter");
    match hooks {
        Some(hooks) => hooks.run_enter(node, transaction, stack),
        None => Ok(()),
    }
}

fn run_leave(
    hooks: Option<&FieldHooks>,
    node: &VisitNode,
    transaction: &mut Transaction,
    stack: &mut Stack,
) -> Result<()> {
    tracing::trace!(kind = ?node.kind, name = %node.name, path = %stack.breadcrumb(), "leave");
    match hooks {
        Some(hooks) => hooks.run_leave(node, transaction, stack),
        None => Ok(()),
    }
}
