mod common;

use common::{blog, document_config, row, seed_posts, sqlite_config};
use datamapper::{Error, FieldDef, Mapper, NullQueryLog, Schema};
use serde_json::json;
use std::rc::Rc;

fn count(posts: &Mapper, conditions: serde_json::Value) -> usize {
    posts.all(row(conditions)).count().unwrap()
}

fn end_to_end(posts: &Mapper) {
    seed_posts(posts);

    assert_eq!(count(posts, json!({"status:in": [3, 4, 5]})), 3);
    assert_eq!(count(posts, json!({"status": [3, 4, 5]})), 3);
    assert_eq!(count(posts, json!({"status:not": [3, 4, 5]})), 7);
    assert!(posts.first(row(json!({"status:<": 1}))).unwrap().is_none());
    assert_eq!(count(posts, json!({"status:>=": 5})), 6);
}

fn boundaries(posts: &Mapper) {
    seed_posts(posts);

    assert_eq!(count(posts, json!({"id:lt": 1})), 0);
    assert_eq!(count(posts, json!({"id:lt": 5})), 4);
    assert_eq!(count(posts, json!({"id:lte": 5})), 5);
    assert_eq!(count(posts, json!({"id:gt": 5})), 5);
    assert_eq!(count(posts, json!({"id:gte": 5})), 6);
    assert_eq!(count(posts, json!({"id:gte": 1})), 10);
    assert_eq!(count(posts, json!({"id:lte": 10})), 10);
    assert_eq!(count(posts, json!({"id:gt": 10})), 0);
}

fn scalars_and_nulls(posts: &Mapper) {
    seed_posts(posts);

    let found = posts.first(row(json!({"status": 7}))).unwrap().unwrap();
    assert_eq!(found.get("status"), Some(json!(7)));
    assert_eq!(found.get("title"), Some(json!("Post 7")));

    let mut post = posts.get(2).unwrap().unwrap();
    post.set("body", "has a body");
    posts.save(&mut post).unwrap();

    assert_eq!(count(posts, json!({"body": null})), 9);
    assert_eq!(count(posts, json!({"body:not": null})), 9);
    assert_eq!(count(posts, json!({"body:gt": null})), 9);
    assert_eq!(count(posts, json!({"status:not": 3})), 9);
    assert_eq!(count(posts, json!({"status:in": []})), 0);
    assert_eq!(count(posts, json!({"status:not": []})), 10);
}

fn or_groups(posts: &Mapper) {
    seed_posts(posts);

    let query = posts
        .all(row(json!({"status:lte": 2})))
        .or_where(row(json!({"status:gte": 9})));
    assert_eq!(query.count().unwrap(), 4);

    let query = query.and_where(row(json!({"title:like": "Post 1%"})));
    // (status <= 2) OR ((status >= 9) AND (title LIKE 'Post 1%'))
    assert_eq!(query.count().unwrap(), 3);
}

#[test]
fn test_end_to_end_sqlite() {
    let (posts, _, _) = blog(&sqlite_config());
    end_to_end(&posts);
}

#[test]
fn test_end_to_end_document() {
    let dir = tempfile::tempdir().unwrap();
    let (posts, _, _) = blog(&document_config(dir.path()));
    end_to_end(&posts);
}

#[test]
fn test_boundaries_sqlite() {
    let (posts, _, _) = blog(&sqlite_config());
    boundaries(&posts);
}

#[test]
fn test_boundaries_document() {
    let dir = tempfile::tempdir().unwrap();
    let (posts, _, _) = blog(&document_config(dir.path()));
    boundaries(&posts);
}

#[test]
fn test_scalars_and_nulls_sqlite() {
    let (posts, _, _) = blog(&sqlite_config());
    scalars_and_nulls(&posts);
}

#[test]
fn test_scalars_and_nulls_document() {
    let dir = tempfile::tempdir().unwrap();
    let (posts, _, _) = blog(&document_config(dir.path()));
    scalars_and_nulls(&posts);
}

#[test]
fn test_or_groups_sqlite() {
    let (posts, _, _) = blog(&sqlite_config());
    or_groups(&posts);
}

#[test]
fn test_or_groups_document() {
    let dir = tempfile::tempdir().unwrap();
    let (posts, _, _) = blog(&document_config(dir.path()));
    or_groups(&posts);
}

#[test]
fn test_scalar_binding_round_trips() {
    let (posts, _, log) = blog(&sqlite_config());
    seed_posts(&posts);

    let query = posts.all(row(json!({"title": "Post 3"})));
    assert_eq!(query.count().unwrap(), 1);

    let logged = log.last().unwrap();
    assert!(logged.statement.contains("\"title\" = :p0_title"));
    assert_eq!(logged.params.len(), 1);
    assert_eq!(logged.params[0].value.to_json(), json!("Post 3"));
}

#[test]
fn test_expression_keys_pass_through_on_sql() {
    let (posts, _, log) = blog(&sqlite_config());
    seed_posts(&posts);

    assert_eq!(count(&posts, json!({"ABS(status - 5):<": 2})), 3);
    assert!(log.last().unwrap().statement.contains("ABS(status - 5) <"));
}

#[test]
fn test_document_rejects_expressions_and_grouping() {
    let dir = tempfile::tempdir().unwrap();
    let (posts, _, _) = blog(&document_config(dir.path()));
    seed_posts(&posts);

    let err = posts.all(row(json!({"ABS(status):<": 2}))).count().unwrap_err();
    assert!(matches!(
        err,
        Error::Adapter(datamapper::AdapterError::Unsupported(_))
    ));

    let err = posts.select().group(&["status"]).count().unwrap_err();
    assert!(matches!(
        err,
        Error::Adapter(datamapper::AdapterError::Unsupported(_))
    ));
}

#[test]
fn test_similar_columns_bind_separately() {
    let schema = Schema::builder("pairs")
        .field(FieldDef::int("id").primary().serial())
        .field(FieldDef::int("n"))
        .field(FieldDef::int("n1"))
        .build();
    let pairs = Mapper::connect(schema, &sqlite_config(), Rc::new(NullQueryLog)).unwrap();
    pairs.migrate().unwrap();

    let mut pair = pairs.entity();
    pair.fill(row(json!({"n": 7, "n1": 5})));
    pairs.save(&mut pair).unwrap();

    let mut query = pairs.all(row(json!({"n1": 5})));
    for _ in 0..9 {
        query = query.and_where(row(json!({"id:gte": 0})));
    }
    let query = query.and_where(row(json!({"n": 7})));
    assert_eq!(query.count().unwrap(), 1);
}
