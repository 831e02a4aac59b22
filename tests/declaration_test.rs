mod common;

use common::{document_config, row};
use datamapper::{FieldType, Mapper, MemoryQueryLog, Pager, Schema, SortDirection};
use serde_json::json;
use std::rc::Rc;

fn authors() -> Schema {
    let declaration = json!({
        "id": {"type": "int", "primary": true, "serial": true},
        "name": {"type": "string", "required": true, "length": 80},
        "joined": {"type": "date"},
        "books": {
            "type": "relation",
            "relation": "HasMany",
            "mapper": "Books",
            "where": {"author_id": "entity.id"},
            "order": {"title": "desc"}
        }
    });
    Schema::builder("authors")
        .fields_json(declaration.as_object().unwrap())
        .unwrap()
        .bind_relation("books", books)
        .build()
}

fn books() -> Schema {
    Schema::builder("books")
        .fields_json(
            json!({
                "id": {"type": "integer", "primary": true, "auto_increment": true},
                "author_id": {"type": "int", "index": true},
                "title": {"type": "string"}
            })
            .as_object()
            .unwrap(),
        )
        .unwrap()
        .build()
}

#[test]
fn test_declared_schema_on_document_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = document_config(dir.path());
    let log = Rc::new(MemoryQueryLog::new());
    let authors = Mapper::connect(authors(), &config, log.clone()).unwrap();
    assert_eq!(authors.schema().field("joined").unwrap().field_type, FieldType::Date);
    assert!(authors.schema().field("books").is_none());

    let mut author = authors.entity();
    author.set("name", "Le Guin");
    author.set("joined", "1969-03-01");
    for title in ["Earthsea", "The Dispossessed"] {
        author.attach("books", datamapper::Entity::from(row(json!({"title": title}))));
    }
    authors.save(&mut author).unwrap();

    let loaded = authors.get(1).unwrap().unwrap();
    assert_eq!(loaded.get("joined"), Some(json!("1969-03-01")));
    let store = datamapper::engine::nosql::DocumentStore::open(dir.path(), "blog").unwrap();
    let stored = store.collection("authors").unwrap().get(&json!(1)).unwrap();
    assert!(stored.get("joined").unwrap().is_i64());

    let titles = loaded.has_many("books").unwrap().all().unwrap().pluck("title");
    assert_eq!(titles, vec![json!("The Dispossessed"), json!("Earthsea")]);
    assert!(log.statements().iter().any(|s| s.starts_with("db.books.insert(")));
}

#[test]
fn test_pager_on_document_store() {
    let dir = tempfile::tempdir().unwrap();
    let books = Mapper::connect(books(), &document_config(dir.path()), Rc::new(MemoryQueryLog::new()))
        .unwrap();
    for n in 1..=5 {
        let mut book = books.entity();
        book.set("title", format!("Volume {}", n));
        books.save(&mut book).unwrap();
    }

    let pager = Pager::new(books.select().order("id", SortDirection::Desc), 2, 2);
    assert_eq!(
        pager.items().unwrap().pluck("title"),
        vec![json!("Volume 3"), json!("Volume 2")]
    );
    assert_eq!(pager.total().unwrap(), 5);
    assert_eq!(pager.pages().unwrap(), 3);
}
