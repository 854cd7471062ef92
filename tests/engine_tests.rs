//! End-to-end tests: QueryEngine over the in-memory executor
//!
//! Every request goes through parsing, hook-driven compilation, concurrent
//! execution and response assembly against real stored documents.

#![cfg(feature = "in-memory")]

mod harness;

use graphex::prelude::*;
use harness::*;
use serde_json::Map;
use std::sync::Arc;

fn engine(store: &InMemoryExecutor) -> QueryEngine {
    QueryEngine::builder()
        .with_schema(blog_schema())
        .with_models(blog_models())
        .with_shared_executor(Arc::new(store.clone()))
        .build()
        .expect("should build engine")
}

fn seeded() -> InMemoryExecutor {
    let store = InMemoryExecutor::new();
    store
        .seed(
            "users",
            vec![
                json!({"_id": "u1", "name": "Ann", "role": "admin"}),
                json!({"_id": "u2", "name": "Bob", "role": "customer"}),
            ],
        )
        .expect("should seed users");
    store
        .seed(
            "posts",
            vec![
                json!({
                    "_id": "p1", "title": "first", "views": 10,
                    "author": {"$ref": "users", "$id": "u1"},
                    "tags": [{"k": "rust", "v": 1}, {"k": "db", "v": 2}]
                }),
                json!({
                    "_id": "p2", "title": "second", "views": 3,
                    "author": {"$ref": "users", "$id": "u2"},
                    "tags": [{"k": "rust", "v": 5}]
                }),
            ],
        )
        .expect("should seed posts");
    store
}

#[tokio::test]
async fn test_read_with_relation_and_embedded_filter() {
    let store = seeded();
    let response = engine(&store)
        .execute(
            r#"{
                posts(orderBy: views_DESC) {
                    title
                    tags(where: {k: "db"})
                    author { name }
                }
            }"#,
            None,
        )
        .await
        .expect("should execute");

    let posts = response["data"]["posts"].as_array().expect("list of posts");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0]["title"], json!("first"));
    assert_eq!(posts[0]["tags"], json!([{"k": "db", "v": 2}]));
    assert_eq!(posts[0]["author"]["name"], json!("Ann"));
    assert_eq!(posts[1]["tags"], json!([]));
    assert_eq!(posts[1]["author"]["mmCollectionName"], json!("users"));
    assert!(posts[0].get("views").is_none());
}

#[tokio::test]
async fn test_relation_inside_relation_is_resolved() {
    let store = seeded();
    store
        .seed(
            "users",
            vec![json!({
                "_id": "u3", "name": "Cleo",
                "friend": {"$ref": "users", "$id": "u2"}
            })],
        )
        .expect("should seed friend");
    store
        .seed(
            "posts",
            vec![json!({"_id": "p3", "title": "third", "views": 1, "author": {"$ref": "users", "$id": "u3"}})],
        )
        .expect("should seed post");

    let response = engine(&store)
        .execute(
            r#"{ post(where: {id: "p3"}) { title author { name friend { name } } } }"#,
            None,
        )
        .await
        .expect("should execute");

    let author = &response["data"]["post"]["author"];
    assert_eq!(author["name"], json!("Cleo"));
    assert_eq!(author["friend"]["name"], json!("Bob"));
    assert_eq!(author["friend"]["mmCollectionName"], json!("users"));
}

#[tokio::test]
async fn test_relation_inside_embedded_object_is_resolved() {
    let store = seeded();
    store
        .seed(
            "posts",
            vec![json!({
                "_id": "p3", "title": "third",
                "meta": {"lang": "en", "editor": {"$ref": "users", "$id": "u2"}}
            })],
        )
        .expect("should seed post");

    let response = engine(&store)
        .execute(
            r#"{ post(where: {id: "p3"}) { meta { lang editor { name } } } }"#,
            None,
        )
        .await
        .expect("should execute");

    let meta = &response["data"]["post"]["meta"];
    assert_eq!(meta["lang"], json!("en"));
    assert_eq!(meta["editor"]["name"], json!("Bob"));
}

#[tokio::test]
async fn test_discriminated_model_reads_only_its_documents() {
    let store = seeded();
    let response = engine(&store)
        .execute("{ admins { name } }", None)
        .await
        .expect("should execute");

    assert_eq!(
        response,
        json!({"data": {"admins": [{"_id": "u1", "name": "Ann"}]}})
    );
}

#[tokio::test]
async fn test_create_with_nested_author_then_read_back() {
    let store = InMemoryExecutor::new();
    let engine = engine(&store);

    let created = engine
        .execute(
            r#"mutation {
                createPost(data: {title: "hello", views: 1, author: {create: {name: "Cleo"}}}) {
                    id title
                }
            }"#,
            None,
        )
        .await
        .expect("should create");
    let post_id = created["data"]["createPost"]["_id"].clone();
    assert!(post_id.is_string());

    let users = store.documents("users").expect("readable");
    assert_eq!(users.len(), 1);
    let posts = store.documents("posts").expect("readable");
    assert_eq!(posts[0]["author"]["$id"], users[0]["_id"]);

    let mut variables = Map::new();
    variables.insert("id".to_string(), post_id);
    let read = engine
        .execute(
            "query One($id: ID) { post(where: {id: $id}) { title author { name } } }",
            Some(&variables),
        )
        .await
        .expect("should read");
    assert_eq!(read["data"]["post"]["title"], json!("hello"));
    assert_eq!(read["data"]["post"]["author"]["name"], json!("Cleo"));
}

#[tokio::test]
async fn test_update_embedded_array_element() {
    let store = seeded();
    let response = engine(&store)
        .execute(
            r#"mutation {
                updatePost(
                    where: {id: "p1"},
                    data: {title: "renamed", meta: {lang: "en"}, tags: {where: {k: "db"}, data: {v: 20}}}
                ) { title tags }
            }"#,
            None,
        )
        .await
        .expect("should update");

    let post = &response["data"]["updatePost"];
    assert_eq!(post["title"], json!("renamed"));
    assert_eq!(post["tags"], json!([{"k": "rust", "v": 1}, {"k": "db", "v": 20}]));

    let stored = store.documents("posts").expect("readable");
    assert_eq!(stored[0]["meta"], json!({"lang": "en"}));
}

#[tokio::test]
async fn test_delete_many_and_count() {
    let store = seeded();
    let engine = engine(&store);

    let deleted = engine
        .execute(r#"mutation { deletePosts(where: {views_gt: 5}) }"#, None)
        .await
        .expect("should delete");
    assert_eq!(deleted, json!({"data": {"deletePosts": 1}}));

    let count = engine
        .execute("{ postsCount }", None)
        .await
        .expect("should count");
    assert_eq!(count, json!({"data": {"postsCount": 1}}));
}

#[tokio::test]
async fn test_named_operation_is_selected() {
    let store = seeded();
    let response = engine(&store)
        .execute_operation(
            "query A { postsCount } query B { posts(first: 1, skip: 1) { title } }",
            Some("B"),
            None,
        )
        .await
        .expect("should execute");
    assert_eq!(response, json!({"data": {"posts": [{"_id": "p2", "title": "second"}]}}));
}

#[tokio::test]
async fn test_unknown_operation_name_is_request_error() {
    let store = seeded();
    let err = engine(&store)
        .execute_operation("query A { postsCount }", Some("Missing"), None)
        .await
        .expect_err("no such operation");
    assert_eq!(err.error_code(), "REQUEST_ERROR");
}

#[tokio::test]
async fn test_subscription_is_rejected() {
    let store = seeded();
    let err = engine(&store)
        .execute("subscription { posts { title } }", None)
        .await
        .expect_err("subscriptions are not supported");
    assert!(err.to_string().contains("Subscriptions are not supported"));
}
