//! Inheritance Tests
//!
//! Fields and indexes are copied into subtypes when they are defined;
//! relations are shared and written into every existing subtype.

use std::sync::Arc;

use docmap_schemas::{
    Catalog, Document, FieldOptions, IndexArg, IndexOptions, RelatedRef, RelationKind,
    RelationOptions, SchemaError, TypeTag, Value,
};
use serde_json::json;

fn options(value: serde_json::Value) -> RelationOptions {
    serde_json::from_value(value).unwrap()
}

fn blog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.define("Post").unwrap();
    catalog.subclass("Post", "Article").unwrap();
    catalog.subclass("Post", "Note").unwrap();
    catalog.define("Comment").unwrap();
    catalog
}

// =============================================================================
// Relations
// =============================================================================

#[test]
fn test_relation_is_shared_with_existing_subtypes() {
    let mut catalog = blog();
    let comments = catalog
        .has_many("Post", "comments", RelationOptions::new())
        .unwrap();

    for name in ["Post", "Article", "Note"] {
        let seen = catalog.get(name).unwrap().relation("comments").unwrap();
        assert!(Arc::ptr_eq(seen, &comments), "{} has a different relation", name);
    }
    assert!(catalog.get("Comment").unwrap().relation("comments").is_none());
}

#[test]
fn test_merged_options_are_visible_everywhere() {
    let mut catalog = blog();
    catalog
        .has_many("Post", "comments", options(json!({ "dependent": "destroy" })))
        .unwrap();
    catalog
        .has_many("Article", "comments", options(json!({ "dependent": "nullify" })))
        .unwrap();

    let note = catalog.get("Note").unwrap().relation("comments").unwrap();
    assert_eq!(note.options()["dependent"], json!("nullify"));
}

#[test]
fn test_through_cannot_change() {
    let mut catalog = blog();
    catalog.has_many("Post", "tags", RelationOptions::new()).unwrap();
    catalog.has_many("Post", "taggings", RelationOptions::new()).unwrap();
    catalog
        .has_many("Post", "labels", options(json!({ "through": "tags" })))
        .unwrap();

    let err = catalog
        .has_many("Post", "labels", options(json!({ "through": "taggings" })))
        .unwrap_err();
    assert!(matches!(err, SchemaError::IncompatibleThroughOption { .. }));
    assert!(err.is_declaration_error());

    let labels = catalog.get("Post").unwrap().relation("labels").unwrap();
    assert_eq!(labels.kind(), RelationKind::HasManyThrough);
    assert_eq!(labels.through(), Some("tags"));
}

#[test]
fn test_belongs_to_rejects_through() {
    let mut catalog = blog();
    let err = catalog
        .belongs_to("Comment", "post", options(json!({ "through": "x" })))
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnsupportedThrough { .. }));
}

#[test]
fn test_belongs_to_declares_foreign_key_on_sharing_types() {
    let mut catalog = blog();
    catalog
        .belongs_to("Post", "author", options(json!({ "index": true })))
        .unwrap();

    for name in ["Post", "Article", "Note"] {
        let doc_type = catalog.get(name).unwrap();
        assert!(doc_type.has_field("author_id"), "{} lacks author_id", name);
        assert!(doc_type.has_index("author_id"), "{} lacks the index", name);
    }

    // running the hook again changes nothing
    catalog
        .belongs_to("Post", "author", RelationOptions::new())
        .unwrap();
    assert_eq!(
        catalog.get("Post").unwrap().indexes().desired_names(),
        vec!["author_id"]
    );
}

#[test]
fn test_relation_keys_and_targets() {
    let mut catalog = Catalog::new();
    catalog.define("Blog::Post").unwrap();
    let comments = catalog
        .has_many("Blog::Post", "comments", RelationOptions::new())
        .unwrap();
    let author = catalog
        .belongs_to("Blog::Post", "author", options(json!({ "class_name": "User" })))
        .unwrap();

    assert_eq!(comments.target_type_name(), "Comment");
    assert_eq!(comments.foreign_key().as_deref(), Some("post_id"));
    assert_eq!(author.target_type_name(), "User");
    assert_eq!(author.foreign_key().as_deref(), Some("author_id"));
}

// =============================================================================
// Fields and Indexes
// =============================================================================

#[test]
fn test_fields_are_copied_not_shared() {
    let mut catalog = Catalog::new();
    catalog.define("Post").unwrap();
    catalog
        .field("Post", "title", FieldOptions::new().typed(TypeTag::String).indexed())
        .unwrap();
    catalog.subclass("Post", "Article").unwrap();

    // declared after the subtype exists: parent only
    catalog
        .field("Post", "views", FieldOptions::new().typed(TypeTag::Integer))
        .unwrap();
    catalog
        .index("Post", "by_title", vec![IndexArg::fields(["title", "id"])], IndexOptions::default())
        .unwrap();
    // declared on the subtype: subtype only
    catalog
        .field("Article", "summary", FieldOptions::new())
        .unwrap();

    let post = catalog.get("Post").unwrap();
    let article = catalog.get("Article").unwrap();

    assert!(article.has_field("title"));
    assert!(article.has_index("title"));
    assert!(!article.has_field("views"));
    assert!(!article.has_index("by_title"));
    assert!(!post.has_field("summary"));
}

#[test]
fn test_subtype_redeclaration_diverges() {
    let mut catalog = Catalog::new();
    catalog.define("Post").unwrap();
    catalog
        .field("Post", "rank", FieldOptions::new().typed(TypeTag::Integer))
        .unwrap();
    catalog.subclass("Post", "Article").unwrap();
    catalog
        .field("Article", "rank", FieldOptions::new().typed(TypeTag::Float))
        .unwrap();

    let mut post = Document::new(catalog.get("Post").unwrap());
    let mut article = Document::new(catalog.get("Article").unwrap());
    post.assign("rank", Value::from("2"));
    article.assign("rank", Value::from("2.50"));

    assert_eq!(post.read("rank"), Some(&Value::Integer(2)));
    assert_eq!(article.read("rank"), Some(&Value::Float(2.5)));
}

// =============================================================================
// Belongs-to assignment
// =============================================================================

#[test]
fn test_required_relation_needs_persisted_target() {
    let mut catalog = Catalog::new();
    catalog.define("User").unwrap();
    catalog.define("Post").unwrap();
    catalog
        .belongs_to("Post", "author", options(json!({ "class_name": "User", "required": true })))
        .unwrap();

    let user_type = catalog.get("User").unwrap();
    let unsaved = Document::new(user_type);
    let saved = Document::with_attributes(user_type, [("id", "u1")]);

    let mut post = Document::new(catalog.get("Post").unwrap());
    post.assign_related("author", Some(RelatedRef::of(&unsaved)))
        .unwrap();
    let err = post.validate().unwrap_err();
    assert!(matches!(
        err,
        SchemaError::AssociationNotPersisted { ref target_type, .. } if target_type == "User"
    ));

    post.assign_related("author", Some(RelatedRef::of(&saved)))
        .unwrap();
    assert!(post.validate().unwrap().is_empty());
    assert_eq!(post.read("author_id"), Some(&Value::from("u1")));

    post.assign_related("author", None).unwrap();
    assert_eq!(post.read("author_id"), Some(&Value::Nil));
}

#[test]
fn test_assign_related_rejects_collections() {
    let mut catalog = blog();
    catalog.has_many("Post", "comments", RelationOptions::new()).unwrap();

    let mut post = Document::new(catalog.get("Post").unwrap());
    let err = post.assign_related("comments", None).unwrap_err();
    assert!(matches!(err, SchemaError::NotBelongsTo { .. }));
    assert!(matches!(
        post.assign_related("missing", None),
        Err(SchemaError::UnknownRelation { .. })
    ));
}
