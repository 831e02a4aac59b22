mod common;

use common::{document_config, init_tracing, posts};
use datamapper::{
    Adapter, FieldDef, Mapper, MemoryQueryLog, Schema, SqlAdapter, SqliteDriver,
};
use datamapper::engine::adapter::{Mysql, Sqlite};
use std::rc::Rc;

fn sqlite_adapter(log: Rc<MemoryQueryLog>) -> Rc<dyn Adapter> {
    Rc::new(SqlAdapter::new(
        SqliteDriver::in_memory().unwrap(),
        Box::new(Sqlite),
        log,
    ))
}

#[test]
fn test_migrate_twice_emits_no_alter() {
    init_tracing();
    let log = Rc::new(MemoryQueryLog::new());
    let mapper = Mapper::with_adapter(posts(), sqlite_adapter(log.clone())).unwrap();

    let first = mapper.migrate().unwrap();
    assert!(first.created);
    assert!(first.statements[0].starts_with("CREATE TABLE"));

    let logged = log.len();
    let second = mapper.migrate().unwrap();
    assert!(second.is_noop());
    assert_eq!(second.alter_count(), 0);
    assert!(log.statements()[logged..]
        .iter()
        .all(|s| !s.to_uppercase().starts_with("ALTER")));
}

#[test]
fn test_migrate_adds_new_fields_only() {
    init_tracing();
    let log = Rc::new(MemoryQueryLog::new());
    let adapter = sqlite_adapter(log.clone());

    let v1 = Schema::builder("notes")
        .field(FieldDef::int("id").primary().serial())
        .field(FieldDef::string("title"))
        .build();
    Mapper::with_adapter(v1, adapter.clone()).unwrap().migrate().unwrap();

    let v2 = Schema::builder("notes")
        .field(FieldDef::int("id").primary().serial())
        .field(FieldDef::string("title"))
        .field(FieldDef::bool("pinned").default_value(false))
        .field(FieldDef::string("slug").unique())
        .build();
    let notes = Mapper::with_adapter(v2, adapter).unwrap();
    let report = notes.migrate().unwrap();

    assert!(!report.created);
    assert_eq!(report.added, vec!["pinned", "slug"]);
    assert_eq!(report.alter_count(), 2);
    assert!(notes.migrate().unwrap().is_noop());

    let mut note = notes.entity();
    note.set("title", "hello");
    notes.save(&mut note).unwrap();
    let loaded = notes.get(1).unwrap().unwrap();
    assert_eq!(loaded.get("pinned"), Some(serde_json::json!(false)));
}

#[test]
fn test_migrate_leaves_undeclared_columns() {
    let log = Rc::new(MemoryQueryLog::new());
    let adapter = sqlite_adapter(log.clone());
    adapter
        .raw_rows("CREATE TABLE notes (id INTEGER PRIMARY KEY AUTOINCREMENT, legacy TEXT)", &[])
        .unwrap();

    let schema = Schema::builder("notes")
        .field(FieldDef::int("id").primary().serial())
        .field(FieldDef::text("body"))
        .build();
    let report = Mapper::with_adapter(schema, adapter.clone())
        .unwrap()
        .migrate()
        .unwrap();
    assert_eq!(report.added, vec!["body"]);
    assert!(log.statements().iter().all(|s| !s.contains("DROP")));
}

#[test]
fn test_mysql_dialect_renders_create() {
    use datamapper::engine::adapter::Dialect;

    let mysql = Mysql::default();
    let fields: Vec<FieldDef> = posts().fields().to_vec();
    let columns: Vec<String> = fields
        .iter()
        .map(|f| mysql.render_field_create_syntax(f))
        .collect();
    let statements = mysql.render_table_create_syntax("posts", &fields, &columns);
    let create = &statements[0];

    assert!(create.starts_with("CREATE TABLE IF NOT EXISTS `posts`"));
    assert!(create.contains("`title` varchar(255) COLLATE utf8_unicode_ci NOT NULL"));
    assert!(create.contains("PRIMARY KEY(`id`)"));
    assert!(create.contains("AUTO_INCREMENT"));
    assert!(create.contains("ENGINE=InnoDB"));
}

#[test]
fn test_document_migrate_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let log = Rc::new(MemoryQueryLog::new());
    let mapper = Mapper::connect(posts(), &document_config(dir.path()), log).unwrap();
    let report = mapper.migrate().unwrap();
    assert!(report.is_noop());
    assert!(!report.created);
}
