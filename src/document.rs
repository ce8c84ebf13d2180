//! Document instances and the casting pipeline
//!
//! Assignments cast user input through the field's declared type. A failed
//! cast never raises: the raw value is kept and the failure is parked until
//! the next validation pass, where [`Document::before_validation`] reports
//! it to a [`ValidationSink`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::association::{RelationKind, RelationMetadata};
use crate::catalog::DocumentType;
use crate::error::{Result, SchemaError};
use crate::index::IDENTITY_INDEX;
use crate::types::CastError;
use crate::value::{Attributes, Value};

/// Message key used for cast failures
pub const INVALID_TYPE: &str = "invalid_type";

/// Receiver of validation errors
pub trait ValidationSink {
    fn add(&mut self, attribute: &str, kind: &'static str, context: BTreeMap<String, String>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub attribute: String,
    pub kind: &'static str,
    pub context: BTreeMap<String, String>,
}

impl ValidationError {
    pub fn message(&self) -> String {
        match (self.kind, self.context.get("type")) {
            (INVALID_TYPE, Some(type_name)) => format!("should be a {}", type_name),
            (kind, _) => kind.replace('_', " "),
        }
    }

    pub fn full_message(&self) -> String {
        format!("{} {}", humanize(&self.attribute), self.message())
    }
}

/// In-memory validation error collection
#[derive(Debug, Clone, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn on(&self, attribute: &str) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.attribute == attribute).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    pub fn full_messages(&self) -> Vec<String> {
        self.errors.iter().map(ValidationError::full_message).collect()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

impl ValidationSink for ValidationErrors {
    fn add(&mut self, attribute: &str, kind: &'static str, context: BTreeMap<String, String>) {
        self.errors.push(ValidationError {
            attribute: attribute.to_string(),
            kind,
            context,
        });
    }
}

fn humanize(attribute: &str) -> String {
    let spaced = attribute.trim_end_matches("_id").replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Reference to a related document, as seen from a relation accessor
#[derive(Debug, Clone, PartialEq)]
pub struct RelatedRef {
    pub type_name: String,
    pub id: Option<Value>,
}

impl RelatedRef {
    pub fn of(doc: &Document<'_>) -> Self {
        Self {
            type_name: doc.doc_type().name().to_string(),
            id: doc.id().cloned(),
        }
    }
}

/// Lazily built accessor for one relation of one document
#[derive(Debug, Clone)]
pub struct Association {
    metadata: Arc<RelationMetadata>,
    target: Option<RelatedRef>,
}

impl Association {
    fn new(metadata: Arc<RelationMetadata>) -> Self {
        Self {
            metadata,
            target: None,
        }
    }

    pub fn metadata(&self) -> &Arc<RelationMetadata> {
        &self.metadata
    }

    pub fn target(&self) -> Option<&RelatedRef> {
        self.target.as_ref()
    }
}

/// A document instance bound to its type
#[derive(Debug, Clone)]
pub struct Document<'s> {
    doc_type: &'s DocumentType,
    attributes: Attributes,
    pending_cast_errors: BTreeMap<String, CastError>,
    associations: HashMap<String, Association>,
}

impl<'s> Document<'s> {
    pub fn new(doc_type: &'s DocumentType) -> Self {
        Self {
            doc_type,
            attributes: Attributes::new(),
            pending_cast_errors: BTreeMap::new(),
            associations: HashMap::new(),
        }
    }

    /// Build a document from user input, casting every attribute.
    pub fn with_attributes<I, K, V>(doc_type: &'s DocumentType, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut doc = Self::new(doc_type);
        for (name, value) in attributes {
            doc.assign(name.as_ref(), value.into());
        }
        doc
    }

    /// Build a document from a raw store row.
    pub fn from_store(doc_type: &'s DocumentType, raw: Attributes) -> Self {
        let mut doc = Self::new(doc_type);
        doc.load_from_store(raw);
        doc
    }

    pub fn doc_type(&self) -> &'s DocumentType {
        self.doc_type
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn read(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Identity of the document, if it has one
    pub fn id(&self) -> Option<&Value> {
        self.read(IDENTITY_INDEX).filter(|id| !id.is_nil())
    }

    /// Cast failures waiting for the next validation pass
    pub fn pending_cast_errors(&self) -> &BTreeMap<String, CastError> {
        &self.pending_cast_errors
    }

    /// Assign an attribute through its field's cast-in.
    ///
    /// On failure the raw value is stored as given and the cast error is
    /// kept for [`Document::before_validation`].
    pub fn assign(&mut self, name: &str, value: Value) {
        let value = match self.doc_type.field(name) {
            None => Ok(value),
            Some(field) => field.cast_in(value),
        };
        match value {
            Ok(value) => {
                self.pending_cast_errors.remove(name);
                self.attributes.insert(name.to_string(), value);
            }
            Err(error) => {
                debug!(
                    doc_type = self.doc_type.name(),
                    attribute = name,
                    expected = %error.type_tag,
                    got = error.value.kind_name(),
                    "deferred cast failure"
                );
                self.attributes.insert(name.to_string(), error.value.clone());
                self.pending_cast_errors.insert(name.to_string(), error);
            }
        }
    }

    pub fn assign_attributes<I, K, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (name, value) in attributes {
            self.assign(name.as_ref(), value.into());
        }
    }

    /// Replace the attributes with a raw store row.
    ///
    /// Only fields flagged for cast-on-read are touched; every other stored
    /// value is already in its declared form.
    pub fn load_from_store(&mut self, raw: Attributes) {
        self.attributes = raw;
        for field in self.doc_type.fields().cast_on_read() {
            if let Some(value) = self.attributes.remove(field.name()) {
                self.attributes
                    .insert(field.name().to_string(), field.cast_out(value));
            }
        }
    }

    /// Read through the type's accessor table.
    pub fn get(&self, accessor: &str) -> Result<Value> {
        let entry = self.doc_type.accessors().get(accessor).ok_or_else(|| {
            SchemaError::UnknownAttribute {
                type_name: self.doc_type.name().to_string(),
                attribute: accessor.to_string(),
            }
        })?;
        Ok((entry.getter)(self))
    }

    /// Write through the type's accessor table.
    pub fn set(&mut self, accessor: &str, value: impl Into<Value>) -> Result<()> {
        let setter = self
            .doc_type
            .accessors()
            .get(accessor)
            .and_then(|entry| entry.setter.clone())
            .ok_or_else(|| SchemaError::UnknownAttribute {
                type_name: self.doc_type.name().to_string(),
                attribute: accessor.to_string(),
            })?;
        setter(self, value.into());
        Ok(())
    }

    /// Accessor for a relation, built on first use.
    pub fn association(&mut self, relation: &str) -> Result<&mut Association> {
        let doc_type = self.doc_type;
        let metadata = doc_type
            .relation(relation)
            .ok_or_else(|| SchemaError::UnknownRelation {
                type_name: doc_type.name().to_string(),
                relation: relation.to_string(),
            })?;
        Ok(self
            .associations
            .entry(relation.to_string())
            .or_insert_with(|| Association::new(Arc::clone(metadata))))
    }

    /// Point a belongs-to relation at `target`, writing its foreign key.
    pub fn assign_related(&mut self, relation: &str, target: Option<RelatedRef>) -> Result<()> {
        let doc_type = self.doc_type;
        let metadata = doc_type
            .relation(relation)
            .ok_or_else(|| SchemaError::UnknownRelation {
                type_name: doc_type.name().to_string(),
                relation: relation.to_string(),
            })?;
        let foreign_key = match metadata.kind() {
            RelationKind::BelongsTo => metadata.foreign_key(),
            _ => None,
        }
        .ok_or_else(|| SchemaError::NotBelongsTo {
            relation: relation.to_string(),
        })?;

        let id = target.as_ref().and_then(|t| t.id.clone()).unwrap_or_default();
        self.association(relation)?.target = target;
        self.assign(&foreign_key, id);
        Ok(())
    }

    /// Pre-validation hook.
    ///
    /// Reports every parked cast failure to `sink` under [`INVALID_TYPE`].
    /// The parked failures stay in place until the attribute is assigned a
    /// castable value. Fails if a required belongs-to points at a document
    /// that has no identity yet.
    pub fn before_validation(&self, sink: &mut dyn ValidationSink) -> Result<()> {
        for (attribute, error) in &self.pending_cast_errors {
            let mut context = BTreeMap::new();
            context.insert("type".to_string(), error.human_type_name().to_string());
            sink.add(attribute, INVALID_TYPE, context);
        }

        for association in self.associations.values() {
            let metadata = association.metadata();
            if metadata.kind() != RelationKind::BelongsTo || !metadata.is_required() {
                continue;
            }
            if let Some(target) = &association.target {
                if target.id.is_none() {
                    return Err(SchemaError::AssociationNotPersisted {
                        relation: metadata.name().to_string(),
                        target_type: metadata.target_type_name(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run the pre-validation hook into a fresh error collection.
    pub fn validate(&self) -> Result<ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.before_validation(&mut errors)?;
        Ok(errors)
    }
}

impl PartialEq for Document<'_> {
    /// Same type and same non-nil identity
    fn eq(&self, other: &Self) -> bool {
        self.doc_type.name() == other.doc_type.name()
            && self.id().is_some()
            && self.id() == other.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::field::FieldOptions;
    use crate::types::TypeTag;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.define("Post").unwrap();
        catalog
            .field("Post", "views", FieldOptions::new().typed(TypeTag::Integer))
            .unwrap();
        catalog
            .field("Post", "state", FieldOptions::new().typed(TypeTag::Symbol))
            .unwrap();
        catalog
            .field("Post", "published", FieldOptions::new().typed(TypeTag::Boolean))
            .unwrap();
        catalog.field("Post", "body", FieldOptions::new()).unwrap();
        catalog
    }

    #[test]
    fn test_valid_assignment_casts() {
        let catalog = catalog();
        let mut doc = Document::new(catalog.get("Post").unwrap());
        doc.assign("views", Value::from(" 12 "));
        assert_eq!(doc.read("views"), Some(&Value::Integer(12)));
        assert!(doc.pending_cast_errors().is_empty());
    }

    #[test]
    fn test_invalid_assignment_is_deferred() {
        let catalog = catalog();
        let mut doc = Document::new(catalog.get("Post").unwrap());
        doc.assign("views", Value::from("lots"));

        assert_eq!(doc.read("views"), Some(&Value::from("lots")));
        let error = &doc.pending_cast_errors()["views"];
        assert_eq!(error.type_tag, TypeTag::Integer);

        doc.assign("views", Value::from("3"));
        assert!(doc.pending_cast_errors().is_empty());
        assert_eq!(doc.read("views"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_nil_clears_pending_error() {
        let catalog = catalog();
        let mut doc = Document::new(catalog.get("Post").unwrap());
        doc.assign("views", Value::from("x"));
        doc.assign("views", Value::Nil);
        assert!(doc.pending_cast_errors().is_empty());
    }

    #[test]
    fn test_undeclared_attributes_are_stored_as_is() {
        let catalog = catalog();
        let mut doc = Document::new(catalog.get("Post").unwrap());
        doc.assign("extra", Value::from("1"));
        doc.assign("body", Value::Integer(5));
        assert_eq!(doc.read("extra"), Some(&Value::from("1")));
        assert_eq!(doc.read("body"), Some(&Value::Integer(5)));
    }

    #[test]
    fn test_load_from_store_casts_flagged_fields_only() {
        let catalog = catalog();
        let mut raw = Attributes::new();
        raw.insert("state".into(), Value::from("draft"));
        raw.insert("views".into(), Value::from("7"));
        let doc = Document::from_store(catalog.get("Post").unwrap(), raw);

        assert_eq!(doc.read("state"), Some(&Value::symbol("draft")));
        assert_eq!(doc.read("views"), Some(&Value::from("7")));
        assert!(doc.pending_cast_errors().is_empty());
    }

    #[test]
    fn test_before_validation_reports_each_attribute_once() {
        let catalog = catalog();
        let mut doc = Document::new(catalog.get("Post").unwrap());
        doc.assign("views", Value::from("a"));
        doc.assign("views", Value::from("b"));
        doc.assign("published", Value::from("maybe"));

        let errors = doc.validate().unwrap();
        assert_eq!(errors.len(), 2);
        let views = errors.on("views");
        assert_eq!(views[0].kind, INVALID_TYPE);
        assert_eq!(views[0].context["type"], "Integer");
        assert_eq!(views[0].full_message(), "Views should be a Integer");

        // still parked until a castable value is assigned
        assert_eq!(doc.validate().unwrap().len(), 2);
    }

    #[test]
    fn test_accessor_table_dispatch() {
        let catalog = catalog();
        let mut doc = Document::new(catalog.get("Post").unwrap());
        doc.set("published", "yes").unwrap();
        assert_eq!(doc.get("published").unwrap(), Value::Bool(true));
        assert_eq!(doc.get("published?").unwrap(), Value::Bool(true));
        assert_eq!(doc.get("views").unwrap(), Value::Nil);

        assert!(doc.set("published?", true).is_err());
        assert!(matches!(
            doc.get("nope"),
            Err(SchemaError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_assign_related_checks_kind_first() {
        let mut catalog = catalog();
        catalog
            .has_many("Post", "comments", Default::default())
            .unwrap();
        catalog.belongs_to("Post", "blog", Default::default()).unwrap();

        let mut doc = Document::new(catalog.get("Post").unwrap());
        let err = doc.assign_related("comments", None).unwrap_err();
        assert!(matches!(err, SchemaError::NotBelongsTo { .. }));
        assert!(doc.associations.is_empty());

        doc.assign_related("blog", None).unwrap();
        assert!(doc.associations.contains_key("blog"));
        assert_eq!(doc.read("blog_id"), Some(&Value::Nil));
    }

    #[test]
    fn test_identity_equality() {
        let catalog = catalog();
        let post = catalog.get("Post").unwrap();
        let a = Document::with_attributes(post, [("id", "1")]);
        let b = Document::with_attributes(post, [("id", "1"), ("body", "x")]);
        let fresh = Document::new(post);
        assert_eq!(a, b);
        assert_ne!(fresh, Document::new(post));
    }
}
