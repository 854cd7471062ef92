//! Embedded query language
//!
//! A small MongoDB-flavoured predicate language used to filter arrays embedded
//! in resolved documents, and by the in-memory executor to evaluate
//! selectors. A predicate specification is compiled once into a closed
//! [`Predicate`] tree and then evaluated against any number of documents.
//!
//! # Supported forms
//!
//! ```text
//! {"k": "a"}                         equality (missing field equals null)
//! {"k": {"$eq": {...}}}              deep equality
//! {"k": {"$in": [1, 2]}}             membership, array fields match on any item
//! {"k": {"$all": [1, 2]}}            array contains every item
//! {"k": {"$exists": true}}
//! {"k": {"$gt": 1, "$lte": 5}}       comparisons, several operators combine with AND
//! {"k": {"$regex": "^a", "$options": "i"}}
//! {"k": {"$elemMatch": {"v": 1}}}
//! {"k": {"$size": 2}}
//! {"k": {"$not": {"$gt": 3}}}
//! {"$and": [{...}, {...}]}, {"$or": [{...}]}
//! ```

use std::cmp::Ordering;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::core::error::{GraphexError, Result};

/// Compiled predicate over one JSON document
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Every nested predicate must match
    And(Vec<Predicate>),
    /// At least one nested predicate must match
    Or(Vec<Predicate>),
    /// A condition on one field of the document
    Field { key: String, condition: Condition },
}

/// Condition applied to the value of a single field
#[derive(Debug, Clone)]
pub enum Condition {
    Equals(Value),
    DeepEquals(Value),
    In(Vec<Value>),
    All(Vec<Value>),
    Exists(bool),
    Compare(Comparison, Value),
    Regex(Regex),
    ElemMatch(Box<Predicate>),
    Size(usize),
    Not(Box<Condition>),
    /// Several operators given in one object
    AllOf(Vec<Condition>),
}

/// Ordering comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Predicate {
    /// Compile a predicate specification
    ///
    /// The specification must be a JSON object; an empty object matches
    /// everything.
    pub fn compile(spec: &Value) -> Result<Self> {
        match spec {
            Value::Object(map) => Self::compile_object(map),
            other => Err(GraphexError::invalid_predicate(format!(
                "predicate must be an object, got {}",
                other
            ))),
        }
    }

    fn compile_object(map: &Map<String, Value>) -> Result<Self> {
        let predicates = map
            .iter()
            .map(|(key, value)| Self::compile_entry(key, value))
            .collect::<Result<Vec<_>>>()?;
        Ok(Predicate::And(predicates))
    }

    fn compile_entry(key: &str, value: &Value) -> Result<Self> {
        match key {
            "$and" => Ok(Predicate::And(Self::compile_list(key, value)?)),
            "$or" => Ok(Predicate::Or(Self::compile_list(key, value)?)),
            _ => Ok(Predicate::Field {
                key: key.to_string(),
                condition: Condition::compile(value)?,
            }),
        }
    }

    fn compile_list(key: &str, value: &Value) -> Result<Vec<Predicate>> {
        let items = value.as_array().ok_or_else(|| {
            GraphexError::invalid_predicate(format!("{} expects an array of objects", key))
        })?;
        items.iter().map(Predicate::compile).collect()
    }

    /// Evaluate against a document
    pub fn matches(&self, item: &Value) -> bool {
        match self {
            Predicate::And(predicates) => predicates.iter().all(|p| p.matches(item)),
            Predicate::Or(predicates) => predicates.iter().any(|p| p.matches(item)),
            Predicate::Field { key, condition } => condition.matches(field_value(item, key)),
        }
    }
}

/// Value of `key` in a document; dotted keys descend into nested objects
fn field_value<'a>(item: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = item.get(key) {
        return Some(value);
    }
    if !key.contains('.') {
        return None;
    }
    key.split('.').try_fold(item, |current, segment| current.get(segment))
}

impl Condition {
    fn compile(value: &Value) -> Result<Self> {
        let Some(map) = value.as_object() else {
            return Ok(Condition::Equals(value.clone()));
        };
        if !map.keys().any(|k| k.starts_with('$')) {
            return Ok(Condition::Equals(value.clone()));
        }

        let mut conditions = Vec::new();
        for (op, operand) in map {
            let condition = match op.as_str() {
                "$eq" => Condition::DeepEquals(operand.clone()),
                "$in" => Condition::In(expect_array(op, operand)?.clone()),
                "$all" => Condition::All(expect_array(op, operand)?.clone()),
                "$exists" => Condition::Exists(truthy(operand)),
                "$gt" => Condition::Compare(Comparison::Gt, operand.clone()),
                "$gte" => Condition::Compare(Comparison::Gte, operand.clone()),
                "$lt" => Condition::Compare(Comparison::Lt, operand.clone()),
                "$lte" => Condition::Compare(Comparison::Lte, operand.clone()),
                "$regex" => {
                    let options = map.get("$options").and_then(Value::as_str).unwrap_or("");
                    Condition::Regex(compile_regex(operand, options)?)
                }
                "$options" => continue,
                "$elemMatch" => Condition::ElemMatch(Box::new(Predicate::compile(operand)?)),
                "$size" => {
                    let size = operand.as_u64().ok_or_else(|| {
                        GraphexError::invalid_predicate("$size expects a non-negative integer")
                    })?;
                    Condition::Size(size as usize)
                }
                "$not" => Condition::Not(Box::new(Condition::compile(operand)?)),
                other => {
                    return Err(GraphexError::invalid_predicate(format!(
                        "unsupported operator '{}'",
                        other
                    )));
                }
            };
            conditions.push(condition);
        }

        if conditions.len() == 1 {
            Ok(conditions.remove(0))
        } else {
            Ok(Condition::AllOf(conditions))
        }
    }

    /// Evaluate against a field value (`None` when the field is absent)
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Equals(expected) => match value {
                Some(actual) => actual == expected,
                None => expected.is_null(),
            },
            Condition::DeepEquals(expected) => value.unwrap_or(&Value::Null) == expected,
            Condition::In(candidates) => match value {
                Some(Value::Array(items)) => items.iter().any(|item| candidates.contains(item)),
                Some(actual) => candidates.contains(actual),
                None => candidates.contains(&Value::Null),
            },
            Condition::All(required) => match value {
                Some(Value::Array(items)) => required.iter().all(|r| items.contains(r)),
                _ => false,
            },
            Condition::Exists(expected) => value.is_some() == *expected,
            Condition::Compare(op, operand) => value
                .and_then(|actual| compare_values(actual, operand))
                .is_some_and(|ordering| match op {
                    Comparison::Gt => ordering == Ordering::Greater,
                    Comparison::Gte => ordering != Ordering::Less,
                    Comparison::Lt => ordering == Ordering::Less,
                    Comparison::Lte => ordering != Ordering::Greater,
                }),
            Condition::Regex(regex) => match value {
                Some(Value::String(s)) => regex.is_match(s),
                _ => false,
            },
            Condition::ElemMatch(predicate) => match value {
                Some(Value::Array(items)) => items.iter().any(|item| predicate.matches(item)),
                _ => false,
            },
            Condition::Size(size) => match value {
                Some(Value::Array(items)) => items.len() == *size,
                _ => false,
            },
            Condition::Not(inner) => !inner.matches(value),
            Condition::AllOf(conditions) => conditions.iter().all(|c| c.matches(value)),
        }
    }
}

/// Order two JSON scalars of the same kind
///
/// Numbers compare numerically and strings lexicographically; any other
/// pairing is unordered.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn expect_array<'a>(op: &str, operand: &'a Value) -> Result<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| GraphexError::invalid_predicate(format!("{} expects an array", op)))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

fn compile_regex(pattern: &Value, options: &str) -> Result<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| GraphexError::invalid_predicate("$regex expects a string pattern"))?;

    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| GraphexError::invalid_predicate(format!("invalid $regex: {}", e)))
}
