//! Document Lifecycle Tests
//!
//! Schema file -> catalog -> assignment -> validation -> store round trip.

use std::collections::BTreeMap;

use docmap_schemas::document::INVALID_TYPE;
use docmap_schemas::{
    Attributes, Document, SchemaDefinition, TypeTag, ValidationSink, Value,
};

const SCHEMA: &str = r#"
[[types]]
name = "Post"

[[types.fields]]
name = "title"
type = "String"

[[types.fields]]
name = "views"
type = "Integer"

[[types.fields]]
name = "rating"
type = "Float"

[[types.fields]]
name = "published"
type = "Boolean"

[[types.fields]]
name = "state"
type = "Symbol"
index = true

[[types.fields]]
name = "location"
type = "Point"
"#;

/// Sink recording calls in order
#[derive(Default)]
struct RecordingSink {
    calls: Vec<(String, &'static str, BTreeMap<String, String>)>,
}

impl ValidationSink for RecordingSink {
    fn add(&mut self, attribute: &str, kind: &'static str, context: BTreeMap<String, String>) {
        self.calls.push((attribute.to_string(), kind, context));
    }
}

fn load_schema() -> SchemaDefinition {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.toml");
    std::fs::write(&path, SCHEMA).unwrap();
    SchemaDefinition::load(&path).unwrap()
}

// =============================================================================
// Assignment
// =============================================================================

#[test]
fn test_json_input_is_cast() {
    let catalog = load_schema().into_catalog().unwrap();
    let input: serde_json::Value = serde_json::json!({
        "title": "hello",
        "views": " +42 ",
        "rating": "4.50",
        "published": "YES",
        "state": "draft",
    });
    let serde_json::Value::Object(input) = input else {
        unreachable!()
    };

    let doc = Document::with_attributes(catalog.get("Post").unwrap(), input);

    assert_eq!(doc.read("title"), Some(&Value::from("hello")));
    assert_eq!(doc.read("views"), Some(&Value::Integer(42)));
    assert_eq!(doc.read("rating"), Some(&Value::Float(4.5)));
    assert_eq!(doc.read("published"), Some(&Value::Bool(true)));
    assert_eq!(doc.read("state"), Some(&Value::symbol("draft")));
    assert!(doc.pending_cast_errors().is_empty());
}

#[test]
fn test_strict_numbers_are_deferred() {
    let catalog = load_schema().into_catalog().unwrap();
    let mut doc = Document::new(catalog.get("Post").unwrap());

    doc.assign("views", Value::from("+042"));
    doc.assign("rating", Value::from("1e3"));
    doc.assign("published", Value::from("maybe"));

    assert_eq!(doc.pending_cast_errors().len(), 3);
    assert_eq!(doc.read("views"), Some(&Value::from("+042")));
}

#[test]
fn test_unregistered_type_rejects_non_nil() {
    let catalog = load_schema().into_catalog().unwrap();
    let mut doc = Document::new(catalog.get("Post").unwrap());

    doc.assign("location", Value::from("1,2"));
    let error = &doc.pending_cast_errors()["location"];
    assert_eq!(error.type_tag, TypeTag::Custom("Point".into()));

    doc.assign("location", Value::Nil);
    assert!(doc.pending_cast_errors().is_empty());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_sink_receives_one_error_per_attribute() {
    let catalog = load_schema().into_catalog().unwrap();
    let mut doc = Document::new(catalog.get("Post").unwrap());
    doc.assign("views", Value::from("many"));
    doc.assign("views", Value::from("more"));
    doc.assign("rating", Value::from("high"));

    let mut sink = RecordingSink::default();
    doc.before_validation(&mut sink).unwrap();

    let attributes: Vec<&str> = sink.calls.iter().map(|(a, _, _)| a.as_str()).collect();
    assert_eq!(attributes, vec!["rating", "views"]);
    assert!(sink.calls.iter().all(|(_, kind, _)| *kind == INVALID_TYPE));
    assert_eq!(sink.calls[1].2["type"], "Integer");

    // pending errors survive the pass
    let mut again = RecordingSink::default();
    doc.before_validation(&mut again).unwrap();
    assert_eq!(again.calls.len(), 2);
}

#[test]
fn test_accessors_go_through_casts() {
    let catalog = load_schema().into_catalog().unwrap();
    let mut doc = Document::new(catalog.get("Post").unwrap());

    doc.set("published", "f").unwrap();
    assert_eq!(doc.get("published").unwrap(), Value::Bool(false));
    assert_eq!(doc.get("published?").unwrap(), Value::Bool(false));

    doc.set("published", 1i64).unwrap();
    assert_eq!(doc.get("published?").unwrap(), Value::Bool(true));

    assert!(doc.set("published?", true).is_err());
    assert!(doc.get("views?").is_err());
}

// =============================================================================
// Store round trip
// =============================================================================

#[test]
fn test_symbols_survive_the_store() {
    let catalog = load_schema().into_catalog().unwrap();
    let post = catalog.get("Post").unwrap();
    let doc = Document::with_attributes(post, [("id", "p1"), ("state", "live")]);

    // the store only knows strings
    let stored: Attributes = doc
        .attributes()
        .iter()
        .map(|(k, v)| {
            let json = v.to_json();
            (k.clone(), Value::from(json))
        })
        .collect();
    assert_eq!(stored["state"], Value::from("live"));

    let loaded = Document::from_store(post, stored);
    assert_eq!(loaded.read("state"), Some(&Value::symbol("live")));
    assert!(loaded == doc);
}
