//! In-memory implementation of Executor for testing and development

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::core::executor::{Executor, ExecutorRequest, RequestKind, RequestOptions};
use crate::core::predicate::{Predicate, compare_values};

/// In-memory document store
///
/// Useful for testing and development. Collections are created on first
/// write; documents without an `_id` get a UUID v4 one on insert. Uses
/// RwLock for thread-safe access.
#[derive(Clone, Default)]
pub struct InMemoryExecutor {
    collections: Arc<RwLock<HashMap<String, Vec<Value>>>>,
}

impl InMemoryExecutor {
    /// Create a new, empty in-memory executor
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection with documents, as stored
    pub fn seed(&self, collection: &str, documents: Vec<Value>) -> Result<()> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
        Ok(())
    }

    /// Current documents of a collection
    pub fn documents(&self, collection: &str) -> Result<Vec<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    fn find(&self, request: &ExecutorRequest, many: bool) -> Result<Value> {
        let predicate = compile_selector(request.selector.as_ref())?;
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;

        let mut matches: Vec<&Value> = collections
            .get(&request.collection)
            .map(|docs| docs.iter().filter(|doc| predicate.matches(doc)).collect())
            .unwrap_or_default();

        let options = request.options.clone().unwrap_or_default();
        if let Some(sort) = options.sort.as_ref() {
            sort_documents(&mut matches, sort)?;
        }
        let page = paginate(matches, &options);

        let fields = request.fields.as_deref();
        if many {
            Ok(Value::Array(page.into_iter().map(|doc| project(doc, fields)).collect()))
        } else {
            Ok(page
                .into_iter()
                .next()
                .map(|doc| project(doc, fields))
                .unwrap_or(Value::Null))
        }
    }

    fn insert(&self, request: &ExecutorRequest) -> Result<Value> {
        let documents = match request.kind {
            RequestKind::InsertOne => vec![
                request
                    .doc
                    .clone()
                    .ok_or_else(|| anyhow!("insertOne needs a document"))?,
            ],
            _ => request.docs.clone().unwrap_or_default(),
        };

        let mut stored = Vec::with_capacity(documents.len());
        for document in documents {
            let Value::Object(mut document) = document else {
                bail!("Documents must be objects");
            };
            document
                .entry("_id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
            stored.push(Value::Object(document));
        }

        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        collections
            .entry(request.collection.clone())
            .or_default()
            .extend(stored.iter().cloned());

        let fields = request.fields.as_deref();
        let mut results: Vec<Value> = stored.iter().map(|doc| project(doc, fields)).collect();
        match request.kind {
            RequestKind::InsertOne => Ok(results.pop().unwrap_or(Value::Null)),
            _ => Ok(Value::Array(results)),
        }
    }

    fn update(&self, request: &ExecutorRequest) -> Result<Value> {
        let predicate = compile_selector(request.selector.as_ref())?;
        let filters = compile_array_filters(request.options.as_ref())?;
        let update = request.doc.clone().unwrap_or_else(|| Value::Object(Map::new()));

        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let Some(document) = collections
            .get_mut(&request.collection)
            .and_then(|docs| docs.iter_mut().find(|doc| predicate.matches(doc)))
        else {
            return Ok(Value::Null);
        };

        apply_update(document, &update, &filters)?;
        Ok(project(document, request.fields.as_deref()))
    }

    fn delete(&self, request: &ExecutorRequest, many: bool) -> Result<Value> {
        let predicate = compile_selector(request.selector.as_ref())?;
        let mut collections = self
            .collections
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        let Some(documents) = collections.get_mut(&request.collection) else {
            return Ok(if many { Value::from(0) } else { Value::Null });
        };

        if many {
            let before = documents.len();
            documents.retain(|doc| !predicate.matches(doc));
            return Ok(Value::from(before - documents.len()));
        }

        match documents.iter().position(|doc| predicate.matches(doc)) {
            Some(index) => Ok(documents.remove(index)),
            None => Ok(Value::Null),
        }
    }

    fn count(&self, request: &ExecutorRequest) -> Result<Value> {
        let predicate = compile_selector(request.selector.as_ref())?;
        let collections = self
            .collections
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        let count = collections
            .get(&request.collection)
            .map(|docs| docs.iter().filter(|doc| predicate.matches(doc)).count())
            .unwrap_or(0);
        Ok(Value::from(count))
    }
}

#[async_trait]
impl Executor for InMemoryExecutor {
    async fn execute(&self, request: ExecutorRequest) -> Result<Value> {
        tracing::trace!(
            request_type = %request.kind,
            collection = %request.collection,
            "in-memory request"
        );
        match request.kind {
            RequestKind::Find => self.find(&request, true),
            RequestKind::FindOne => self.find(&request, false),
            RequestKind::InsertOne | RequestKind::InsertMany => self.insert(&request),
            RequestKind::UpdateOne => self.update(&request),
            RequestKind::DeleteOne => self.delete(&request, false),
            RequestKind::DeleteMany => self.delete(&request, true),
            RequestKind::Aggregate => self.count(&request),
        }
    }
}

fn compile_selector(selector: Option<&Value>) -> Result<Predicate> {
    let empty = Value::Object(Map::new());
    Ok(Predicate::compile(selector.unwrap_or(&empty))?)
}

/// `arrFltrN` → predicate over one array element
fn compile_array_filters(options: Option<&RequestOptions>) -> Result<HashMap<String, Predicate>> {
    let mut filters = HashMap::new();
    let Some(array_filters) = options.and_then(|o| o.array_filters.as_ref()) else {
        return Ok(filters);
    };
    for entry in array_filters {
        let Some(entry) = entry.as_object() else {
            bail!("Array filters must be objects");
        };
        for (identifier, spec) in entry {
            filters.insert(identifier.clone(), Predicate::compile(spec)?);
        }
    }
    Ok(filters)
}

/// Top-level fields replace, `$set` paths are written in place
fn apply_update(document: &mut Value, update: &Value, filters: &HashMap<String, Predicate>) -> Result<()> {
    let Some(update) = update.as_object() else {
        bail!("Update document must be an object");
    };
    for (key, value) in update {
        match key.as_str() {
            "$set" => {
                let Some(assignments) = value.as_object() else {
                    bail!("$set expects an object");
                };
                for (path, value) in assignments {
                    let segments: Vec<&str> = path.split('.').collect();
                    set_path(document, &segments, value, filters)?;
                }
            }
            "_id" => {}
            operator if operator.starts_with('$') => bail!("Unsupported update operator '{}'", operator),
            field => set_path(document, &[field], value, filters)?,
        }
    }
    Ok(())
}

fn set_path(target: &mut Value, path: &[&str], value: &Value, filters: &HashMap<String, Predicate>) -> Result<()> {
    let Some((head, rest)) = path.split_first() else {
        *target = value.clone();
        return Ok(());
    };

    if let Some(identifier) = head.strip_prefix("$[").and_then(|s| s.strip_suffix(']')) {
        let Value::Array(items) = target else {
            return Ok(());
        };
        if identifier.is_empty() {
            for item in items.iter_mut() {
                set_path(item, rest, value, filters)?;
            }
            return Ok(());
        }
        let predicate = filters
            .get(identifier)
            .ok_or_else(|| anyhow!("No array filter named '{}'", identifier))?;
        for item in items.iter_mut() {
            if predicate.matches(item) {
                set_path(item, rest, value, filters)?;
            }
        }
        return Ok(());
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_path(child, rest, value, filters)?;
    }
    Ok(())
}

fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| current.get(segment))
}

/// Sort by `{field: 1 | -1, ...}`; missing values sort first
fn sort_documents(documents: &mut [&Value], sort: &Value) -> Result<()> {
    let Some(keys) = sort.as_object() else {
        bail!("Sort must be an object");
    };
    let keys: Vec<(&String, bool)> = keys
        .iter()
        .map(|(field, direction)| (field, direction.as_i64() != Some(-1)))
        .collect();

    documents.sort_by(|a, b| {
        for (field, ascending) in &keys {
            let ordering = match (lookup(a, field), lookup(b, field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            };
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn paginate<'a>(documents: Vec<&'a Value>, options: &RequestOptions) -> Vec<&'a Value> {
    let skip = options.skip.unwrap_or(0) as usize;
    let limit = options.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    documents.into_iter().skip(skip).take(limit).collect()
}

/// Keep `_id` and the requested top-level fields
fn project(document: &Value, fields: Option<&[String]>) -> Value {
    let (Some(fields), Value::Object(map)) = (fields, document) else {
        return document.clone();
    };
    let projected = map
        .iter()
        .filter(|(key, _)| {
            key.as_str() == "_id" || fields.iter().any(|f| f.split('.').next() == Some(key.as_str()))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(projected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(kind: RequestKind, collection: &str) -> ExecutorRequest {
        ExecutorRequest::new(kind, collection)
    }

    fn seeded() -> InMemoryExecutor {
        let executor = InMemoryExecutor::new();
        executor
            .seed(
                "posts",
                vec![
                    json!({"_id": "p1", "title": "b", "views": 5, "tags": [{"k": "a", "v": 1}, {"k": "b", "v": 2}]}),
                    json!({"_id": "p2", "title": "a", "views": 10}),
                    json!({"_id": "p3", "title": "c", "views": 1}),
                ],
            )
            .expect("should seed");
        executor
    }

    #[tokio::test]
    async fn test_find_with_selector_sort_and_paging() {
        let executor = seeded();
        let mut find = request(RequestKind::Find, "posts");
        find.selector = Some(json!({"views": {"$gte": 5}}));
        find.fields = Some(vec!["title".to_string()]);
        find.options = Some(RequestOptions {
            sort: Some(json!({"title": 1})),
            ..Default::default()
        });

        let result = executor.execute(find).await.expect("should find");
        assert_eq!(
            result,
            json!([{"_id": "p2", "title": "a"}, {"_id": "p1", "title": "b"}])
        );
    }

    #[tokio::test]
    async fn test_find_skip_and_limit() {
        let executor = seeded();
        let mut find = request(RequestKind::Find, "posts");
        find.options = Some(RequestOptions {
            sort: Some(json!({"views": -1})),
            skip: Some(1),
            limit: Some(1),
            ..Default::default()
        });

        let result = executor.execute(find).await.expect("should find");
        assert_eq!(result[0]["_id"], json!("p1"));
        assert_eq!(result.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn test_find_one_returns_null_when_nothing_matches() {
        let executor = seeded();
        let mut find = request(RequestKind::FindOne, "posts");
        find.selector = Some(json!({"title": "zzz"}));
        assert_eq!(executor.execute(find).await.expect("should run"), Value::Null);

        let unknown = request(RequestKind::FindOne, "unknown");
        assert_eq!(executor.execute(unknown).await.expect("should run"), Value::Null);
    }

    #[tokio::test]
    async fn test_insert_generates_ids() {
        let executor = InMemoryExecutor::new();
        let mut insert = request(RequestKind::InsertMany, "users");
        insert.docs = Some(vec![json!({"name": "a"}), json!({"_id": "u2", "name": "b"})]);

        let result = executor.execute(insert).await.expect("should insert");
        let docs = result.as_array().expect("array of documents");
        assert_eq!(docs.len(), 2);
        assert!(docs[0]["_id"].is_string());
        assert_eq!(docs[1]["_id"], json!("u2"));
        assert_eq!(executor.documents("users").expect("readable").len(), 2);
    }

    #[tokio::test]
    async fn test_insert_one_rejects_non_objects() {
        let executor = InMemoryExecutor::new();
        let mut insert = request(RequestKind::InsertOne, "users");
        insert.doc = Some(json!("nope"));
        assert!(executor.execute(insert).await.is_err());
    }

    #[tokio::test]
    async fn test_update_with_set_paths_and_array_filters() {
        let executor = seeded();
        let mut update = request(RequestKind::UpdateOne, "posts");
        update.selector = Some(json!({"_id": "p1"}));
        update.doc = Some(json!({"$set": {"title": "new", "meta.lang": "en", "tags.$[arrFltr0].v": 9}}));
        update.options = Some(RequestOptions {
            array_filters: Some(vec![json!({"arrFltr0": {"k": "b"}})]),
            ..Default::default()
        });

        let result = executor.execute(update).await.expect("should update");
        assert_eq!(result["title"], json!("new"));
        assert_eq!(result["meta"], json!({"lang": "en"}));
        assert_eq!(result["tags"], json!([{"k": "a", "v": 1}, {"k": "b", "v": 9}]));
    }

    #[tokio::test]
    async fn test_update_with_unknown_array_filter_fails() {
        let executor = seeded();
        let mut update = request(RequestKind::UpdateOne, "posts");
        update.selector = Some(json!({"_id": "p1"}));
        update.doc = Some(json!({"$set": {"tags.$[arrFltr3].v": 9}}));

        let err = executor.execute(update).await.expect_err("filter is missing");
        assert!(err.to_string().contains("arrFltr3"));
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let executor = seeded();
        let mut delete_one = request(RequestKind::DeleteOne, "posts");
        delete_one.selector = Some(json!({"_id": "p3"}));
        let deleted = executor.execute(delete_one).await.expect("should delete");
        assert_eq!(deleted["_id"], json!("p3"));

        let mut delete_many = request(RequestKind::DeleteMany, "posts");
        delete_many.selector = Some(json!({"views": {"$gt": 0}}));
        assert_eq!(executor.execute(delete_many).await.expect("should delete"), json!(2));
        assert!(executor.documents("posts").expect("readable").is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_counts_matches() {
        let executor = seeded();
        let mut aggregate = request(RequestKind::Aggregate, "posts");
        aggregate.selector = Some(json!({"views": {"$lt": 10}}));
        assert_eq!(executor.execute(aggregate).await.expect("should count"), json!(2));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_an_error() {
        let executor = seeded();
        let mut find = request(RequestKind::Find, "posts");
        find.selector = Some(json!({"title": {"$regex": "("}}));
        assert!(executor.execute(find).await.is_err());
    }
}
