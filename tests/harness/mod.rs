//! Shared helpers for integration tests
//!
//! Provides a `RecordingExecutor` that remembers every request it receives
//! and answers through a user-supplied closure, plus a small blog schema
//! wired with the generic handlers.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod harness;
//! use harness::*;
//! ```

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

use graphex::prelude::*;

type Responder = Arc<dyn Fn(&ExecutorRequest) -> Result<Value> + Send + Sync>;

/// Executor mock recording the requests it is given
#[derive(Clone)]
pub struct RecordingExecutor {
    requests: Arc<Mutex<Vec<ExecutorRequest>>>,
    responder: Responder,
}

impl RecordingExecutor {
    /// Answer every request with `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ExecutorRequest) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        }
    }

    /// Answer `null` to everything
    pub fn null() -> Self {
        Self::new(|_| Ok(Value::Null))
    }

    pub fn requests(&self) -> Vec<ExecutorRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Requests of one kind, in arrival order
    pub fn requests_of(&self, kind: RequestKind) -> Vec<ExecutorRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.kind == kind)
            .collect()
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, request: ExecutorRequest) -> Result<Value> {
        self.requests.lock().expect("requests lock").push(request.clone());
        (self.responder)(&request)
    }
}

/// Blog schema: posts with embedded tags and meta, an author reference to
/// users, and users referencing a friend
pub fn blog_schema() -> SchemaInfo {
    SchemaInfo::new()
        .with_type(
            TypeInfo::new("Query")
                .field(
                    FieldInfo::new("post")
                        .of_type("Post")
                        .hooks(handlers::operation_field(OperationKind::Read, "posts", false))
                        .argument(ArgumentInfo::new("where").of_type("PostWhereInput")),
                )
                .field(
                    FieldInfo::new("posts")
                        .of_type("Post")
                        .hooks(handlers::operation_field(OperationKind::Read, "posts", true))
                        .argument(ArgumentInfo::new("where").of_type("PostWhereInput"))
                        .argument(ArgumentInfo::new("first").hooks(handlers::first_argument()))
                        .argument(ArgumentInfo::new("skip").hooks(handlers::skip_argument()))
                        .argument(ArgumentInfo::new("orderBy").hooks(handlers::order_by_argument())),
                )
                .field(
                    FieldInfo::new("postsCount")
                        .hooks(handlers::operation_field(OperationKind::Aggregate, "posts", false))
                        .argument(ArgumentInfo::new("where").of_type("PostWhereInput")),
                )
                .field(
                    FieldInfo::new("admins")
                        .of_type("User")
                        .hooks(handlers::operation_field(OperationKind::Read, "admins", true)),
                ),
        )
        .with_type(
            TypeInfo::new("Mutation")
                .field(
                    FieldInfo::new("createPost")
                        .of_type("Post")
                        .hooks(handlers::operation_field(OperationKind::Create, "posts", false))
                        .argument(ArgumentInfo::new("data").of_type("PostCreateInput")),
                )
                .field(
                    FieldInfo::new("createPosts")
                        .of_type("Post")
                        .hooks(handlers::operation_field(OperationKind::Create, "posts", true))
                        .argument(
                            ArgumentInfo::new("data")
                                .of_type("PostCreateInput")
                                .hooks(handlers::data_list_argument()),
                        ),
                )
                .field(
                    FieldInfo::new("updatePost")
                        .of_type("Post")
                        .hooks(handlers::operation_field(OperationKind::Update, "posts", false))
                        .argument(ArgumentInfo::new("where").of_type("PostWhereInput"))
                        .argument(ArgumentInfo::new("data").of_type("PostUpdateInput")),
                )
                .field(
                    FieldInfo::new("deletePosts")
                        .hooks(handlers::operation_field(OperationKind::Delete, "posts", true))
                        .argument(ArgumentInfo::new("where").of_type("PostWhereInput")),
                ),
        )
        .with_type(
            TypeInfo::new("Post")
                .field(FieldInfo::new("id").stored_as("_id").hooks(handlers::output_field()))
                .field(FieldInfo::new("title").hooks(handlers::output_field()))
                .field(FieldInfo::new("views").hooks(handlers::output_field()))
                .field(
                    FieldInfo::new("tags")
                        .hooks(handlers::output_field())
                        .argument(
                            ArgumentInfo::new("where")
                                .hooks(handlers::embedded_filter_argument("tags")),
                        ),
                )
                .field(
                    FieldInfo::new("author")
                        .of_type("User")
                        .hooks(handlers::reference_field()),
                )
                .field(
                    FieldInfo::new("meta")
                        .of_type("PostMeta")
                        .hooks(handlers::embedded_field()),
                ),
        )
        .with_type(
            TypeInfo::new("PostMeta")
                .field(FieldInfo::new("lang").hooks(handlers::output_field()))
                .field(
                    FieldInfo::new("editor")
                        .of_type("User")
                        .hooks(handlers::reference_field()),
                ),
        )
        .with_type(
            TypeInfo::new("User")
                .field(FieldInfo::new("id").stored_as("_id").hooks(handlers::output_field()))
                .field(FieldInfo::new("name").hooks(handlers::output_field()))
                .field(
                    FieldInfo::new("friend")
                        .of_type("User")
                        .hooks(handlers::reference_field()),
                ),
        )
        .with_type(
            TypeInfo::new("PostWhereInput")
                .hooks(handlers::selector_object())
                .field(FieldInfo::new("id").stored_as("_id").hooks(handlers::object_field()))
                .field(FieldInfo::new("title").hooks(handlers::object_field()))
                .field(
                    FieldInfo::new("views_gt")
                        .stored_as("views")
                        .hooks(handlers::selector_operator("$gt")),
                )
                .field(
                    FieldInfo::new("OR")
                        .of_type("PostWhereInput")
                        .hooks(handlers::selector_combinator(Combinator::Or)),
                ),
        )
        .with_type(
            TypeInfo::new("PostCreateInput")
                .hooks(handlers::data_object())
                .field(FieldInfo::new("title").hooks(handlers::object_field()))
                .field(FieldInfo::new("views").hooks(handlers::object_field()))
                .field(FieldInfo::new("tags").hooks(handlers::object_field()))
                .field(
                    FieldInfo::new("author")
                        .of_type("UserRelationInput")
                        .hooks(handlers::object_field()),
                ),
        )
        .with_type(
            TypeInfo::new("UserRelationInput")
                .field(FieldInfo::new("connect").hooks(handlers::relation_connect_field("users")))
                .field(
                    FieldInfo::new("create")
                        .of_type("UserCreateInput")
                        .hooks(handlers::relation_create_field("users")),
                ),
        )
        .with_type(
            TypeInfo::new("UserCreateInput")
                .hooks(handlers::data_object())
                .field(FieldInfo::new("name").hooks(handlers::object_field())),
        )
        .with_type(
            TypeInfo::new("PostUpdateInput")
                .field(FieldInfo::new("title").hooks(handlers::set_path_field()))
                .field(
                    FieldInfo::new("meta")
                        .of_type("PostMetaUpdateInput")
                        .hooks(handlers::set_path_field()),
                )
                .field(
                    FieldInfo::new("tags")
                        .of_type("TagsUpdateInput")
                        .hooks(handlers::array_filter_field()),
                ),
        )
        .with_type(
            TypeInfo::new("PostMetaUpdateInput")
                .field(FieldInfo::new("lang").hooks(handlers::set_path_field())),
        )
        .with_type(
            TypeInfo::new("TagsUpdateInput")
                .field(FieldInfo::new("where").of_type("TagWhereInput"))
                .field(FieldInfo::new("data").of_type("TagUpdateInput")),
        )
        .with_type(
            TypeInfo::new("TagWhereInput")
                .hooks(handlers::selector_object())
                .field(FieldInfo::new("k").hooks(handlers::object_field())),
        )
        .with_type(
            TypeInfo::new("TagUpdateInput")
                .field(FieldInfo::new("v").hooks(handlers::set_path_field())),
        )
}

/// Registry with `admins` stored in `users` under `role: admin`
pub fn blog_models() -> ModelRegistry {
    let mut models = ModelRegistry::new();
    models.register(
        "admins",
        ModelInfo::new("Admin", "users").with_discriminator("role", "admin"),
    );
    models
}

/// Store-shaped reference value
pub fn reference(namespace: &str, id: &str) -> Value {
    json!({"$ref": namespace, "$id": id})
}
