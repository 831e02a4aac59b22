#![allow(dead_code)]

use datamapper::{
    AdapterKind, ConnectionConfig, DatabaseConfig, FieldDef, Mapper, MemoryQueryLog, RelationDef,
    Row, Schema, SortDirection,
};
use serde_json::{json, Value};
use std::path::Path;
use std::rc::Rc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

pub fn posts() -> Schema {
    Schema::builder("posts")
        .field(FieldDef::int("id").primary().serial())
        .field(FieldDef::string("title").required())
        .field(FieldDef::text("body"))
        .field(FieldDef::int("status"))
        .relation(
            "comments",
            RelationDef::has_many(comments)
                .on("post_id", "entity.id")
                .order("id", SortDirection::Asc),
        )
        .build()
}

pub fn comments() -> Schema {
    Schema::builder("comments")
        .field(FieldDef::int("id").primary().serial())
        .field(FieldDef::int("post_id").index())
        .field(FieldDef::string("name"))
        .field(FieldDef::text("body"))
        .relation("post", RelationDef::has_one(posts).on("id", "entity.post_id"))
        .build()
}

pub fn sqlite_config() -> DatabaseConfig {
    DatabaseConfig::sqlite_memory()
}

pub fn document_config(root: &Path) -> DatabaseConfig {
    DatabaseConfig {
        adapter: AdapterKind::Document,
        connection: ConnectionConfig::new(root.to_string_lossy()).database("blog"),
        read: None,
    }
}

/// Posts and comments mappers sharing one connection, both migrated
pub fn blog(config: &DatabaseConfig) -> (Mapper, Mapper, Rc<MemoryQueryLog>) {
    init_tracing();
    let log = Rc::new(MemoryQueryLog::new());
    let adapters = datamapper::connect(config, log.clone()).unwrap();
    let posts = Mapper::new(posts(), adapters.clone()).unwrap();
    let comments = Mapper::new(comments(), adapters).unwrap();
    posts.migrate().unwrap();
    comments.migrate().unwrap();
    (posts, comments, log)
}

/// Ten posts with status 1..=10
pub fn seed_posts(posts: &Mapper) {
    for status in 1..=10 {
        let mut post = posts.entity();
        post.set("title", format!("Post {}", status));
        post.set("body", json!(null));
        post.set("status", status);
        posts.save(&mut post).unwrap();
    }
}
