//! Reusable hook pairs
//!
//! Schema factories attach these to fields, arguments and input types. Each
//! function returns a fresh [`FieldHooks`]; none of them decides where it is
//! attached.
//!
//! | Handler | Attach to | Effect |
//! |---|---|---|
//! | [`operation_field`] | root field | creates an operation, binds its output |
//! | [`output_field`] | selected field | adds the store field to the projection |
//! | [`embedded_field`] | selected embedded object | nests the paths of its subfields |
//! | [`reference_field`] | selected relation | batched lookup + reference replacement |
//! | [`embedded_filter_argument`] | argument of an embedded array | filters the array in the output |
//! | [`object_field`] | input field | hands its value to the parent context |
//! | [`selector_object`] | filter input type | collects a selector |
//! | [`selector_operator`] | filter input field | `{field: {$op: value}}` |
//! | [`selector_combinator`] | `AND`/`OR` input field | `$and`/`$or` of nested selectors |
//! | [`data_object`] | payload input type | collects a document |
//! | [`data_list_argument`] | list payload argument | documents for `insertMany` |
//! | [`set_path_field`] | update input field | `$set` at the dotted path |
//! | [`array_filter_field`] | embedded array update field | positional array filter |
//! | [`relation_create_field`] | nested create | nested insert, stores a reference |
//! | [`relation_connect_field`] | nested connect | stores a reference to an id |
//! | [`first_argument`], [`skip_argument`], [`order_by_argument`] | paging arguments | read options |

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::core::error::{GraphexError, Result};
use crate::core::reference::Reference;
use crate::core::value::ContextValue;
use crate::execution::contexts::{
    Combinator, DataContext, FieldsSelectionContext, ListValueContext, ObjectFieldContext,
    SelectorContext,
};
use crate::execution::deferred::WILDCARD;
use crate::execution::operation::{Operation, OperationId, OperationKind, OperationParams};
use crate::execution::path::{Frame, Stack};
use crate::execution::schema::{FieldHooks, VisitNode};
use crate::execution::transaction::Transaction;

// === Operations and projection ===

/// Create an operation for the field and expose its output in the response
///
/// Reads, creates and updates get an empty projection that [`output_field`]
/// fills. The output is bound under the field's response key when the field
/// is not nested in another operation.
pub fn operation_field(kind: OperationKind, collection: impl Into<String>, many: bool) -> FieldHooks {
    let collection = collection.into();
    FieldHooks::new()
        .on_enter(move |_, transaction, stack| {
            let mut params = OperationParams::new(collection.clone()).many(many);
            if matches!(
                kind,
                OperationKind::Read | OperationKind::Create | OperationKind::Update
            ) {
                params = params.fields_selection(FieldsSelectionContext::new());
            }
            let id = transaction.create_operation(kind, params)?;
            stack.push(id);
            Ok(())
        })
        .on_leave(|node, transaction, stack| {
            let id = stack.pop_operation()?;
            if stack.find_nearest_operation().is_none() {
                let output = transaction.operation(id)?.output();
                transaction.bind_result(node.response_key(), output);
            }
            Ok(())
        })
}

/// Project the field's store path in the nearest operation
pub fn output_field() -> FieldHooks {
    FieldHooks::new().on_enter(|node, transaction, stack| {
        let id = stack.nearest_operation()?;
        let path = projection_path(stack, id, node)?;
        transaction
            .operation_mut(id)?
            .fields_selection_mut()
            .add_field(path);
        Ok(())
    })
}

/// Selected object embedded in the document
///
/// Subfields are projected and resolved under this field's store name.
pub fn embedded_field() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|node, _, stack| {
            stack.push(ObjectFieldContext::new(node.store_name.clone()));
            Ok(())
        })
        .on_leave(|_, _, stack| {
            stack.pop_object_field()?;
            Ok(())
        })
}

/// Resolve a stored reference (or list of references) into documents
///
/// The references of every parent document are collected and looked up in
/// one batch per namespace; the parent's output then has them replaced by
/// the documents found. Relations selected inside a relation are resolved
/// in the parent lookup's documents.
pub fn reference_field() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|node, transaction, stack| {
            let parent = stack.nearest_operation()?;
            let projection = projection_path(stack, parent, node)?;
            let path = output_path(transaction, stack, parent, node)?;
            let references = {
                let operation = transaction.operation_mut(parent)?;
                operation.fields_selection_mut().add_field(projection);
                operation.result().distinct(path)
            };

            let params = OperationParams::for_references(references)
                .many(true)
                .fields_selection(FieldsSelectionContext::new());
            let lookup = transaction.create_operation(OperationKind::ReadByReference, params)?;
            stack.push(lookup);
            Ok(())
        })
        .on_leave(|node, transaction, stack| {
            let lookup = stack.pop_operation()?;
            // Output, not result: nested relations have replaced theirs by now
            let lookup = transaction.operation(lookup)?.output();
            let parent = stack.nearest_operation()?;
            let path = output_path(transaction, stack, parent, node)?;
            let operation = transaction.operation_mut(parent)?;
            let output = operation
                .output()
                .replace_references(path, move || lookup.clone());
            operation.set_output(output);
            Ok(())
        })
}

/// Store path of `node` inside the documents of operation `id`
fn projection_path(stack: &Stack, id: OperationId, node: &VisitNode) -> Result<String> {
    let prefix = stack.path_since(id)?;
    Ok(join_path(&prefix, &node.store_name))
}

/// Path of `relative` inside the output of operation `id`
///
/// A reference lookup's output is a namespace → id → document map, so its
/// documents sit two wildcard levels down.
fn output_path_of(transaction: &Transaction, stack: &Stack, id: OperationId, relative: &str) -> Result<String> {
    let prefix = stack.path_since(id)?;
    let path = join_path(&prefix, relative);
    if transaction.operation(id)?.kind() == OperationKind::ReadByReference {
        Ok(join_path(&format!("{0}.{0}", WILDCARD), &path))
    } else {
        Ok(path)
    }
}

fn output_path(transaction: &Transaction, stack: &Stack, id: OperationId, node: &VisitNode) -> Result<String> {
    output_path_of(transaction, stack, id, &node.store_name)
}

fn join_path(prefix: &str, name: &str) -> String {
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}.{}", prefix, name),
    }
}

/// Filter the embedded array stored at `path` in the nearest operation's output
///
/// The argument value is a predicate specification; it must be fully known
/// when the request is built.
pub fn embedded_filter_argument(path: impl Into<String>) -> FieldHooks {
    let path = path.into();
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(move |_, transaction, stack| {
            let holder = stack.pop_object_field()?;
            let Some(value) = holder.into_value() else {
                return Ok(());
            };
            let spec = value
                .try_plain()
                .ok_or_else(|| GraphexError::validation("embedded array filters must be literal"))?;

            let id = stack.nearest_operation()?;
            let path = output_path_of(transaction, stack, id, &path)?;
            let operation = transaction.operation_mut(id)?;
            let output = operation.output().filter_embedded_array(path, spec)?;
            operation.set_output(output);
            Ok(())
        })
}

// === Input values ===

/// Hold the field's value and hand it to the parent context under its store name
pub fn object_field() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|node, _, stack| {
            stack.push(ObjectFieldContext::new(node.store_name.clone()));
            Ok(())
        })
        .on_leave(|_, _, stack| {
            let holder = stack.pop_object_field()?;
            let key = holder.field_name().map(str::to_string);
            match holder.into_value() {
                Some(value) => hand_to_parent(stack, key.as_deref(), value),
                None => Ok(()),
            }
        })
}

/// Collect an object value into a selector
///
/// Directly under an operation the selector is AND-merged into the
/// operation's; anywhere else it is handed to the parent as a value.
pub fn selector_object() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(SelectorContext::new());
            Ok(())
        })
        .on_leave(|_, transaction, stack| {
            let selector = stack.pop_selector()?;
            if let Some(Frame::Operation(id)) = stack.last() {
                let target = transaction.operation_mut(*id)?.selector_mut();
                for (key, value) in selector.selector() {
                    target.and_value(key.clone(), value.clone());
                }
                return Ok(());
            }
            hand_to_parent(stack, None, selector.into_value())
        })
}

/// `{store_name: {operator: value}}`, AND-ed into the parent selector
pub fn selector_operator(operator: impl Into<String>) -> FieldHooks {
    let operator = operator.into();
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(move |node, _, stack| {
            let holder = stack.pop_object_field()?;
            let Some(value) = holder.into_value() else {
                return Ok(());
            };
            let mut condition = IndexMap::new();
            condition.insert(operator.clone(), value);

            match stack.last_mut() {
                Some(Frame::Selector(selector)) => {
                    selector.and_value(node.store_name.clone(), ContextValue::Object(condition));
                    Ok(())
                }
                _ => Err(stack.error("operator condition outside of a selector")),
            }
        })
}

/// Combine a list of nested selectors under `$and`/`$or`
pub fn selector_combinator(combinator: Combinator) -> FieldHooks {
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(move |_, _, stack| {
            let holder = stack.pop_object_field()?;
            let items = match holder.into_value() {
                Some(ContextValue::List(items)) => items,
                Some(single) => vec![single],
                None => return Ok(()),
            };

            let mut selectors = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    ContextValue::Object(map) => selectors.push(SelectorContext::from_map(map)),
                    ContextValue::Value(Value::Object(map)) => {
                        selectors.push(SelectorContext::from_value(Value::Object(map)))
                    }
                    _ => return Err(GraphexError::validation("selector combinators expect objects")),
                }
            }

            let combined = SelectorContext::combine(combinator, selectors);
            match stack.last_mut() {
                Some(Frame::Selector(selector)) => {
                    for (key, value) in combined.selector() {
                        selector.add_value(key.clone(), value.clone());
                    }
                    Ok(())
                }
                _ => Err(stack.error("selector combinator outside of a selector")),
            }
        })
}

/// Collect an object value into a document payload
///
/// Directly under an operation the document becomes (or is merged into) the
/// operation's data; anywhere else it is handed to the parent as a value.
pub fn data_object() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(DataContext::new());
            Ok(())
        })
        .on_leave(|_, transaction, stack| {
            let data = stack.pop_data()?;
            if let Some(Frame::Operation(id)) = stack.last() {
                let target = transaction.operation_mut(*id)?.data_mut();
                for (key, value) in data.data() {
                    target.add_value(key.clone(), value.clone());
                }
                return Ok(());
            }
            hand_to_parent(stack, None, data.into_value())
        })
}

/// Use a list argument as the documents of a multi-document insert
pub fn data_list_argument() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(|_, transaction, stack| {
            let holder = stack.pop_object_field()?;
            let id = stack.nearest_operation()?;
            let operation = transaction.operation_mut(id)?;
            match holder.into_value() {
                Some(ContextValue::List(items)) => {
                    operation.set_data_list(ListValueContext::from_context_values(items));
                }
                Some(ContextValue::Value(Value::Array(items))) => {
                    operation.set_data_list(ListValueContext::from_values(items));
                }
                Some(ContextValue::Object(map)) => {
                    operation.set_data(DataContext::from_map(map));
                }
                Some(_) => return Err(GraphexError::validation("data must be an object or a list")),
                None => {}
            }
            Ok(())
        })
}

/// Write the field's value into the nearest operation's `$set`
///
/// The key is the dotted store path from the operation down to this field,
/// so the same hook works at any depth.
pub fn set_path_field() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|node, _, stack| {
            stack.push(ObjectFieldContext::new(node.store_name.clone()));
            Ok(())
        })
        .on_leave(|_, transaction, stack| {
            let id = stack.nearest_operation()?;
            let path = stack.path_since(id)?;
            let holder = stack.pop_object_field()?;
            if let Some(value) = holder.into_value() {
                transaction.operation_mut(id)?.data_mut().upsert_set(path, value);
            }
            Ok(())
        })
}

/// Update the elements of an embedded array that match a filter
///
/// Nested set-path fields write below `field.$[arrFltrN]`; the filter itself
/// is the selector handed to this field's holder (usually by a
/// [`selector_object`] type hook on the `where` input).
pub fn array_filter_field() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|node, transaction, stack| {
            let id = stack.nearest_operation()?;
            let identifier = transaction.operation_mut(id)?.create_array_filter();
            stack.push(ObjectFieldContext::for_array_filter(&node.store_name, identifier));
            Ok(())
        })
        .on_leave(|_, transaction, stack| {
            let holder = stack.pop_object_field()?;
            let id = stack.nearest_operation()?;
            let identifier = holder
                .array_filter()
                .map(str::to_string)
                .ok_or_else(|| stack.error("array filter holder lost its identifier"))?;
            let filter = holder
                .into_value()
                .ok_or_else(|| GraphexError::validation("array updates need a where filter"))?;
            transaction
                .operation_mut(id)?
                .set_array_filter(&identifier, filter)
        })
}

/// Insert a related document first and store a reference to it
pub fn relation_create_field(namespace: impl Into<String>) -> FieldHooks {
    let namespace = namespace.into();
    let collection = namespace.clone();
    FieldHooks::new()
        .on_enter(move |_, transaction, stack| {
            let id = transaction.create_operation(
                OperationKind::Create,
                OperationParams::new(collection.clone()),
            )?;
            stack.push(id);
            Ok(())
        })
        .on_leave(move |_, transaction, stack| {
            let id = stack.pop_operation()?;
            let reference = transaction
                .result(id)?
                .map("pick '_id'", |doc| {
                    Ok(doc.get("_id").cloned().unwrap_or(Value::Null))
                })
                .as_reference(namespace.clone());
            hand_to_parent(stack, None, reference.into())
        })
}

/// Store a reference to an existing document given by id
pub fn relation_connect_field(namespace: impl Into<String>) -> FieldHooks {
    let namespace = namespace.into();
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(move |_, _, stack| {
            let holder = stack.pop_object_field()?;
            let id = match holder.into_value().and_then(|v| v.try_plain()) {
                Some(Value::Object(map)) => map.get("_id").cloned().unwrap_or(Value::Null),
                Some(id) => id,
                None => return Err(GraphexError::validation("connect needs a literal id")),
            };
            if id.is_null() {
                return Err(GraphexError::validation("connect needs an id"));
            }
            hand_to_parent(stack, None, Reference::new(namespace.clone(), id).to_value().into())
        })
}

// === Read options ===

/// Limit of the nearest operation
pub fn first_argument() -> FieldHooks {
    count_argument("first", |operation, n| operation.set_first(n))
}

/// Offset of the nearest operation
pub fn skip_argument() -> FieldHooks {
    count_argument("skip", |operation, n| operation.set_skip(n))
}

fn count_argument(
    name: &'static str,
    apply: fn(&mut Operation, u64),
) -> FieldHooks {
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(move |_, transaction, stack| {
            let holder = stack.pop_object_field()?;
            let value = holder.into_value().and_then(|v| v.try_plain());
            let count = match value {
                None | Some(Value::Null) => return Ok(()),
                Some(value) => value.as_u64().ok_or_else(|| {
                    GraphexError::validation(format!("{} must be a non-negative integer", name))
                })?,
            };
            let id = stack.nearest_operation()?;
            apply(transaction.operation_mut(id)?, count);
            Ok(())
        })
}

/// Sort of the nearest operation
///
/// Accepts `field_ASC` / `field_DESC` enum values, a list of them, or an
/// object `{field: "ASC" | "DESC" | 1 | -1}`.
pub fn order_by_argument() -> FieldHooks {
    FieldHooks::new()
        .on_enter(|_, _, stack| {
            stack.push(ObjectFieldContext::anonymous());
            Ok(())
        })
        .on_leave(|_, transaction, stack| {
            let holder = stack.pop_object_field()?;
            let Some(value) = holder.into_value().and_then(|v| v.try_plain()) else {
                return Ok(());
            };
            let mut sort = Map::new();
            collect_sort(&value, &mut sort)?;
            if sort.is_empty() {
                return Ok(());
            }
            let id = stack.nearest_operation()?;
            transaction
                .operation_mut(id)?
                .set_order_by(Value::Object(sort));
            Ok(())
        })
}

fn collect_sort(value: &Value, sort: &mut Map<String, Value>) -> Result<()> {
    match value {
        Value::Null => Ok(()),
        Value::String(spec) => {
            let (field, direction) = if let Some(field) = spec.strip_suffix("_ASC") {
                (field, 1)
            } else if let Some(field) = spec.strip_suffix("_DESC") {
                (field, -1)
            } else {
                return Err(GraphexError::validation(format!("invalid sort '{}'", spec)));
            };
            sort.insert(field.to_string(), Value::from(direction));
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| collect_sort(item, sort)),
        Value::Object(fields) => {
            for (field, direction) in fields {
                let direction = match direction {
                    Value::String(s) if s.eq_ignore_ascii_case("asc") => 1,
                    Value::String(s) if s.eq_ignore_ascii_case("desc") => -1,
                    Value::Number(n) if n.as_i64() == Some(1) => 1,
                    Value::Number(n) if n.as_i64() == Some(-1) => -1,
                    other => {
                        return Err(GraphexError::validation(format!(
                            "invalid sort direction {} for '{}'",
                            other, field
                        )));
                    }
                };
                sort.insert(field.clone(), Value::from(direction));
            }
            Ok(())
        }
        other => Err(GraphexError::validation(format!("invalid sort {}", other))),
    }
}

/// Add a value to the context on top of the stack
///
/// Keyed contexts (selector, data, object holder) need `key`; an anonymous
/// holder takes the value itself and a list appends it.
fn hand_to_parent(stack: &mut Stack, key: Option<&str>, value: ContextValue) -> Result<()> {
    let found = match (stack.last_mut(), key) {
        (Some(Frame::Selector(selector)), Some(key)) => {
            selector.add_value(key, value);
            return Ok(());
        }
        (Some(Frame::Data(data)), Some(key)) => {
            data.add_value(key, value);
            return Ok(());
        }
        (Some(Frame::ObjectField(holder)), Some(key)) => {
            if merge_member(holder, key, value) {
                return Ok(());
            }
            "ObjectField holding a non-object value"
        }
        (Some(Frame::ObjectField(holder)), None) => {
            holder.set_value(value);
            return Ok(());
        }
        (Some(Frame::ListValue(list)), _) => {
            list.add_value(value);
            return Ok(());
        }
        (Some(frame), _) => frame.kind_name(),
        (None, _) => "an empty stack",
    };
    Err(stack.error(format!("cannot hand a value to {}", found)))
}

fn merge_member(holder: &mut ObjectFieldContext, key: &str, value: ContextValue) -> bool {
    match holder.value_mut() {
        None => {
            let mut map = IndexMap::new();
            map.insert(key.to_string(), value);
            holder.set_value(ContextValue::Object(map));
            true
        }
        Some(ContextValue::Object(map)) => {
            map.insert(key.to_string(), value);
            true
        }
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ModelRegistry;
    use crate::execution::operation::OperationId;
    use crate::execution::schema::{NodeKind, VisitNode};
    use crate::execution::transaction::Transaction;
    use serde_json::json;

    fn node(name: &str) -> VisitNode {
        VisitNode::new(NodeKind::ObjectField, name)
    }

    fn setup(kind: OperationKind) -> (Transaction, Stack, OperationId) {
        let mut transaction = Transaction::new(ModelRegistry::new());
        let id = transaction
            .create_operation(kind, OperationParams::new("posts"))
            .expect("should create");
        let mut stack = Stack::new();
        stack.push(id);
        (transaction, stack, id)
    }

    /// Run a hook pair around a literal stored into the pushed holder
    fn with_value(hooks: &FieldHooks, node: &VisitNode, value: Value, transaction: &mut Transaction, stack: &mut Stack) {
        hooks.run_enter(node, transaction, stack).expect("enter");
        if let Some(Frame::ObjectField(holder)) = stack.last_mut() {
            holder.set_value(value);
        }
        hooks.run_leave(node, transaction, stack).expect("leave");
    }

    #[test]
    fn test_object_fields_fill_selector() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Read);
        let selector = selector_object();
        let field = object_field();
        let type_node = VisitNode::new(NodeKind::ObjectValue, "PostWhereInput");

        selector.run_enter(&type_node, &mut transaction, &mut stack).expect("enter");
        with_value(&field, &node("title"), json!("t"), &mut transaction, &mut stack);
        selector.run_leave(&type_node, &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.selector().map(|s| s.to_value().describe()),
            Some(json!({"title": "t"}))
        );
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_nested_object_fields_merge_into_holder() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Create);
        let data = data_object();
        let field = object_field();
        let type_node = VisitNode::new(NodeKind::ObjectValue, "PostCreateInput");

        data.run_enter(&type_node, &mut transaction, &mut stack).expect("enter");
        field.run_enter(&node("meta"), &mut transaction, &mut stack).expect("enter meta");
        with_value(&field, &node("lang"), json!("en"), &mut transaction, &mut stack);
        with_value(&field, &node("draft"), json!(true), &mut transaction, &mut stack);
        field.run_leave(&node("meta"), &mut transaction, &mut stack).expect("leave meta");
        data.run_leave(&type_node, &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.data().map(|d| d.to_value().describe()),
            Some(json!({"meta": {"lang": "en", "draft": true}}))
        );
    }

    #[test]
    fn test_operator_conditions_are_and_merged() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Read);
        let selector = selector_object();
        let type_node = VisitNode::new(NodeKind::ObjectValue, "PostWhereInput");
        let mut gt = node("views_gt");
        gt.store_name = "views".to_string();
        let mut lt = node("views_lt");
        lt.store_name = "views".to_string();

        selector.run_enter(&type_node, &mut transaction, &mut stack).expect("enter");
        with_value(&selector_operator("$gt"), &gt, json!(1), &mut transaction, &mut stack);
        with_value(&selector_operator("$lt"), &lt, json!(9), &mut transaction, &mut stack);
        selector.run_leave(&type_node, &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.selector().map(|s| s.to_value().describe()),
            Some(json!({"$and": [{"views": {"$gt": 1}}, {"views": {"$lt": 9}}]}))
        );
    }

    #[test]
    fn test_set_path_field_writes_dotted_path() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Update);
        let object = object_field();
        let set = set_path_field();

        object.run_enter(&node("meta"), &mut transaction, &mut stack).expect("enter");
        with_value(&set, &node("title"), json!("new"), &mut transaction, &mut stack);
        object.run_leave(&node("meta"), &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.data().map(|d| d.to_value().describe()),
            Some(json!({"$set": {"meta.title": "new"}}))
        );
    }

    #[test]
    fn test_array_filter_field_registers_filter_and_path() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Update);
        let array = array_filter_field();
        let set = set_path_field();

        array.run_enter(&node("tags"), &mut transaction, &mut stack).expect("enter");
        // the where input hands its selector to the holder
        hand_to_parent(&mut stack, None, json!({"k": "a"}).into()).expect("hand filter");
        with_value(&set, &node("v"), json!(2), &mut transaction, &mut stack);
        array.run_leave(&node("tags"), &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.data().map(|d| d.to_value().describe()),
            Some(json!({"$set": {"tags.$[arrFltr0].v": 2}}))
        );
        assert_eq!(operation.array_filters().len(), 1);
        assert_eq!(
            operation.array_filters()[0].filter.as_ref().map(ContextValue::describe),
            Some(json!({"k": "a"}))
        );
    }

    #[tokio::test]
    async fn test_paging_arguments() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Read);
        with_value(&first_argument(), &node("first"), json!(10), &mut transaction, &mut stack);
        with_value(&skip_argument(), &node("skip"), json!(20), &mut transaction, &mut stack);
        with_value(
            &order_by_argument(),
            &node("orderBy"),
            json!(["title_ASC", "views_DESC"]),
            &mut transaction,
            &mut stack,
        );

        let request = transaction
            .operation(id)
            .expect("exists")
            .build_request(&ModelRegistry::new())
            .await
            .expect("should build");
        let options = request.options.expect("read options");
        assert_eq!(options.limit, Some(10));
        assert_eq!(options.skip, Some(20));
        assert_eq!(options.sort, Some(json!({"title": 1, "views": -1})));
    }

    #[test]
    fn test_negative_first_is_validation_error() {
        let (mut transaction, mut stack, _) = setup(OperationKind::Read);
        let hooks = first_argument();
        hooks.run_enter(&node("first"), &mut transaction, &mut stack).expect("enter");
        if let Some(Frame::ObjectField(holder)) = stack.last_mut() {
            holder.set_value(json!(-1));
        }
        let err = hooks
            .run_leave(&node("first"), &mut transaction, &mut stack)
            .expect_err("negative limit");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_hand_to_operation_frame_is_build_error() {
        let (_, mut stack, _) = setup(OperationKind::Read);
        let err = hand_to_parent(&mut stack, Some("title"), json!("t").into())
            .expect_err("operations do not take values");
        assert_eq!(err.error_code(), "BUILD_ERROR");
        assert!(err.to_string().contains("Operation"), "{}", err);
    }

    #[test]
    fn test_operation_field_binds_root_output() {
        let mut transaction = Transaction::new(ModelRegistry::new());
        let mut stack = Stack::new();
        let hooks = operation_field(OperationKind::Read, "posts", true);
        let mut field = VisitNode::new(NodeKind::Field, "posts");
        field.alias = Some("latest".to_string());

        hooks.run_enter(&field, &mut transaction, &mut stack).expect("enter");
        output_field()
            .run_enter(&VisitNode::new(NodeKind::Field, "title"), &mut transaction, &mut stack)
            .expect("projection");
        hooks.run_leave(&field, &mut transaction, &mut stack).expect("leave");

        assert!(stack.is_empty());
        assert!(transaction.bindings().contains_key("latest"));
        let operation = transaction.operation(OperationId::new(0)).expect("exists");
        assert_eq!(
            operation.fields_selection().map(|f| f.fields().to_vec()),
            Some(vec!["title".to_string()])
        );
    }

    #[test]
    fn test_relation_connect_stores_reference() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Create);
        let data = data_object();
        let type_node = VisitNode::new(NodeKind::ObjectValue, "PostCreateInput");

        data.run_enter(&type_node, &mut transaction, &mut stack).expect("enter");
        let owner = object_field();
        owner.run_enter(&node("owner"), &mut transaction, &mut stack).expect("enter owner");
        with_value(&relation_connect_field("users"), &node("connect"), json!("u1"), &mut transaction, &mut stack);
        owner.run_leave(&node("owner"), &mut transaction, &mut stack).expect("leave owner");
        data.run_leave(&type_node, &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.data().map(|d| d.to_value().describe()),
            Some(json!({"owner": {"$ref": "users", "$id": "u1"}}))
        );
    }

    #[test]
    fn test_embedded_field_nests_projection() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Read);
        let meta = embedded_field();

        meta.run_enter(&node("meta"), &mut transaction, &mut stack).expect("enter");
        output_field()
            .run_enter(&node("lang"), &mut transaction, &mut stack)
            .expect("projection");
        meta.run_leave(&node("meta"), &mut transaction, &mut stack).expect("leave");

        let operation = transaction.operation(id).expect("exists");
        assert_eq!(
            operation.fields_selection().map(|f| f.fields().to_vec()),
            Some(vec!["meta.lang".to_string()])
        );
        assert_eq!(stack.len(), 1);
    }

    #[tokio::test]
    async fn test_relation_inside_relation_is_replaced() {
        let (mut transaction, mut stack, id) = setup(OperationKind::Read);
        let author = reference_field();
        let friend = reference_field();

        author.run_enter(&node("author"), &mut transaction, &mut stack).expect("enter author");
        friend.run_enter(&node("friend"), &mut transaction, &mut stack).expect("enter friend");
        output_field()
            .run_enter(&node("name"), &mut transaction, &mut stack)
            .expect("projection");
        friend.run_leave(&node("friend"), &mut transaction, &mut stack).expect("leave friend");
        author.run_leave(&node("author"), &mut transaction, &mut stack).expect("leave author");

        let authors = transaction.operation(OperationId::new(1)).expect("author lookup");
        assert_eq!(
            authors.fields_selection().map(|f| f.fields().to_vec()),
            Some(vec!["friend".to_string()])
        );

        transaction
            .result(id)
            .expect("exists")
            .resolve(json!([{"title": "t", "author": {"$ref": "users", "$id": "u1"}}]))
            .expect("resolve posts");
        transaction
            .result(OperationId::new(1))
            .expect("exists")
            .resolve(json!({"users": {"u1": {"_id": "u1", "friend": {"$ref": "users", "$id": "u2"}}}}))
            .expect("resolve authors");
        transaction
            .result(OperationId::new(2))
            .expect("exists")
            .resolve(json!({"users": {"u2": {"_id": "u2", "name": "Bob"}}}))
            .expect("resolve friends");

        let output = transaction.operation(id).expect("exists").output();
        let posts = output.settled().await.expect("should resolve");
        assert_eq!(posts[0]["author"]["friend"]["name"], json!("Bob"));
        assert_eq!(posts[0]["author"]["mmCollectionName"], json!("users"));
    }

    #[test]
    fn test_embedded_filter_inside_relation_targets_lookup_documents() {
        let (mut transaction, mut stack, _) = setup(OperationKind::Read);
        let author = reference_field();
        author.run_enter(&node("author"), &mut transaction, &mut stack).expect("enter author");
        with_value(
            &embedded_filter_argument("badges"),
            &node("where"),
            json!({"k": "gold"}),
            &mut transaction,
            &mut stack,
        );

        let lookup = transaction.operation(OperationId::new(1)).expect("author lookup");
        assert_eq!(
            lookup.output().provenance(),
            "ReadByReference-1 -> filterEmbeddedArray('*.*.badges', {\"k\":\"gold\"})"
        );
    }
}
