//! Declarative schema files
//!
//! A schema file lists document types with their fields, indexes and
//! relations. Types are applied in file order, so a parent must appear
//! before its subtypes.
//!
//! ```toml
//! [[types]]
//! name = "Post"
//!
//! [[types.fields]]
//! name = "title"
//! type = "String"
//! index = true
//!
//! [[types.indexes]]
//! name = "author_date"
//! fields = ["author_id", "date"]
//!
//! [[types.relations]]
//! name = "author"
//! kind = "belongs_to"
//! options = { required = true }
//!
//! [[types]]
//! name = "Article"
//! parent = "Post"
//! ```
//!
//! Computed indexes take a function and can only be declared in code.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::association::{RelationMacro, RelationOptions};
use crate::catalog::Catalog;
use crate::error::Result;
use crate::field::{FieldIndex, FieldOptions};
use crate::index::{IndexArg, IndexOptions};
use crate::types::TypeTag;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub types: Vec<TypeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_tag: Option<TypeTag>,
    #[serde(default)]
    pub index: Option<FieldIndex>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDefinition {
    pub name: String,
    /// Compound field list; a single index when absent
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub multi: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDefinition {
    pub name: String,
    pub kind: RelationMacro,
    #[serde(default)]
    pub through: Option<String>,
    #[serde(default)]
    pub options: RelationOptions,
}

impl FieldDefinition {
    fn options(&self) -> FieldOptions {
        FieldOptions {
            type_tag: self.type_tag.clone(),
            index: self.index.clone(),
        }
    }
}

impl IndexDefinition {
    fn args(&self) -> Vec<IndexArg> {
        self.fields
            .iter()
            .map(|fields| IndexArg::Fields(fields.clone()))
            .collect()
    }
}

impl RelationDefinition {
    fn options(&self) -> RelationOptions {
        let mut options = self.options.clone();
        if let Some(through) = &self.through {
            options.insert("through".to_string(), serde_json::Value::from(through.as_str()));
        }
        options
    }
}

impl SchemaDefinition {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Declare every type of this definition into `catalog`.
    pub fn apply(&self, catalog: &mut Catalog) -> Result<()> {
        for definition in &self.types {
            definition.apply(catalog)?;
        }
        Ok(())
    }

    pub fn into_catalog(self) -> Result<Catalog> {
        let mut catalog = Catalog::new();
        self.apply(&mut catalog)?;
        Ok(catalog)
    }
}

impl TypeDefinition {
    fn apply(&self, catalog: &mut Catalog) -> Result<()> {
        match &self.parent {
            Some(parent) => catalog.subclass(parent, &self.name)?,
            None => catalog.define(&self.name)?,
        };

        for field in &self.fields {
            catalog.field(&self.name, &field.name, field.options())?;
        }
        for index in &self.indexes {
            let options = IndexOptions { multi: index.multi };
            catalog.index(&self.name, &index.name, index.args(), options)?;
        }
        for relation in &self.relations {
            catalog.declare_relation(&self.name, relation.kind, &relation.name, relation.options())?;
        }

        debug!(
            doc_type = %self.name,
            fields = self.fields.len(),
            indexes = self.indexes.len(),
            relations = self.relations.len(),
            "applied type definition"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;

    const BLOG: &str = r#"
[[types]]
name = "Post"

[[types.fields]]
name = "title"
type = "String"
index = true

[[types.fields]]
name = "tags"
index = "multi"

[[types.indexes]]
name = "author_date"
fields = ["author_id", "date"]

[[types.relations]]
name = "author"
kind = "belongs_to"
options = { required = true }

[[types]]
name = "Article"
parent = "Post"

[[types.fields]]
name = "published"
type = "Boolean"
"#;

    #[test]
    fn test_parse_and_apply() {
        let catalog = SchemaDefinition::from_toml_str(BLOG)
            .unwrap()
            .into_catalog()
            .unwrap();

        let post = catalog.get("Post").unwrap();
        assert_eq!(post.indexes().desired_names(), vec!["title", "tags", "author_date"]);
        assert!(post.indexes().get("tags").unwrap().options.multi);
        assert!(post.has_field("author_id"));
        assert!(post.relation("author").unwrap().is_required());

        let article = catalog.get("Article").unwrap();
        assert_eq!(article.parent(), Some("Post"));
        assert!(article.has_field("title"));
        assert!(article.has_field("published"));
        assert!(!post.has_field("published"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = SchemaDefinition::from_toml_str(
            "[[types]]\nname = \"Post\"\n[[types.indexes]]\nname = \"a\"\nunique = true\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Toml(_)));
    }

    #[test]
    fn test_parent_must_come_first() {
        let err = SchemaDefinition::from_toml_str(
            "[[types]]\nname = \"Article\"\nparent = \"Post\"\n",
        )
        .unwrap()
        .into_catalog()
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType(name) if name == "Post"));
    }

    #[test]
    fn test_through_key_becomes_option() {
        let catalog = SchemaDefinition::from_toml_str(
            r#"
[[types]]
name = "Author"

[[types.relations]]
name = "posts"
kind = "has_many"

[[types.relations]]
name = "comments"
kind = "has_many"
through = "posts"
"#,
        )
        .unwrap()
        .into_catalog()
        .unwrap();

        let comments = catalog.get("Author").unwrap().relation("comments").unwrap();
        assert_eq!(comments.through(), Some("posts"));
        assert!(comments.kind().is_through());
    }
}
