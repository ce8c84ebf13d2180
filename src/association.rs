//! Relation declarations
//!
//! A relation declared on a type is installed, as the same [`Arc`], into that
//! type and every subtype that exists at declaration time. Redeclaring it
//! from any of those types merges options into that one shared object, so
//! all of them observe the change.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::field::{FieldIndex, FieldOptions};

/// Opaque relation options, e.g. `through`, `foreign_key`, `class_name`
pub type RelationOptions = BTreeMap<String, serde_json::Value>;

/// Declaration verb used in a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationMacro {
    BelongsTo,
    HasMany,
    HasOne,
}

/// Concrete relation variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    BelongsTo,
    HasMany,
    HasOne,
    HasManyThrough,
    HasOneThrough,
}

impl RelationKind {
    /// Select the variant from the declaration verb and the presence of a
    /// `through` option.
    pub fn select(verb: RelationMacro, relation: &str, through: bool) -> Result<Self> {
        match (verb, through) {
            (RelationMacro::BelongsTo, false) => Ok(RelationKind::BelongsTo),
            (RelationMacro::BelongsTo, true) => Err(SchemaError::UnsupportedThrough {
                kind: "belongs_to",
                relation: relation.to_string(),
            }),
            (RelationMacro::HasMany, false) => Ok(RelationKind::HasMany),
            (RelationMacro::HasMany, true) => Ok(RelationKind::HasManyThrough),
            (RelationMacro::HasOne, false) => Ok(RelationKind::HasOne),
            (RelationMacro::HasOne, true) => Ok(RelationKind::HasOneThrough),
        }
    }

    pub fn is_through(self) -> bool {
        matches!(self, RelationKind::HasManyThrough | RelationKind::HasOneThrough)
    }

    pub fn is_collection(self) -> bool {
        matches!(self, RelationKind::HasMany | RelationKind::HasManyThrough)
    }
}

/// `through` option carried by a set of relation options
pub fn through_option(options: &RelationOptions) -> Option<String> {
    options
        .get("through")
        .and_then(|value| value.as_str())
        .map(String::from)
}

/// Metadata of one declared relation
#[derive(Debug)]
pub struct RelationMetadata {
    owner: String,
    name: String,
    kind: RelationKind,
    through: Option<String>,
    options: RwLock<RelationOptions>,
}

impl RelationMetadata {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        verb: RelationMacro,
        options: RelationOptions,
    ) -> Result<Self> {
        let name = name.into();
        let through = through_option(&options);
        let kind = RelationKind::select(verb, &name, through.is_some())?;
        Ok(Self {
            owner: owner.into(),
            name,
            kind,
            through,
            options: RwLock::new(options),
        })
    }

    /// Type the relation was first declared on
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn through(&self) -> Option<&str> {
        self.through.as_deref()
    }

    pub fn options(&self) -> RwLockReadGuard<'_, RelationOptions> {
        self.options.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn option_str(&self, key: &str) -> Option<String> {
        self.options().get(key).and_then(|v| v.as_str()).map(String::from)
    }

    /// Fail if merging `options` would change the `through` option.
    pub fn check_merge(&self, options: &RelationOptions) -> Result<()> {
        let requested = through_option(options);
        if requested != self.through {
            return Err(SchemaError::IncompatibleThroughOption {
                relation: self.name.clone(),
                existing: self.through.clone(),
                requested,
            });
        }
        Ok(())
    }

    /// Merge a redeclaration into this relation. Later options win.
    ///
    /// The `through` option cannot change.
    pub fn merge(&self, options: RelationOptions) -> Result<()> {
        self.check_merge(&options)?;
        self.options
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(options);
        Ok(())
    }

    /// Name of the related document type
    pub fn target_type_name(&self) -> String {
        if let Some(class_name) = self.option_str("class_name") {
            return class_name;
        }
        if self.kind.is_collection() {
            camelize(&singularize(&self.name))
        } else {
            camelize(&self.name)
        }
    }

    /// Attribute holding the related identity, where the relation has one.
    ///
    /// For belongs-to it lives on the owner; for has-many / has-one it lives
    /// on the target. Through relations have none.
    pub fn foreign_key(&self) -> Option<String> {
        self.foreign_key_in(&self.options())
    }

    fn foreign_key_in(&self, options: &RelationOptions) -> Option<String> {
        if let Some(key) = options.get("foreign_key").and_then(|v| v.as_str()) {
            return Some(key.to_string());
        }
        match self.kind {
            RelationKind::BelongsTo => Some(format!("{}_id", self.name)),
            RelationKind::HasMany | RelationKind::HasOne => {
                let owner = self.owner.rsplit("::").next().unwrap_or(&self.owner);
                Some(format!("{}_id", to_snake_case(owner)))
            }
            RelationKind::HasManyThrough | RelationKind::HasOneThrough => None,
        }
    }

    /// Whether a belongs-to must reference a persisted document
    pub fn is_required(&self) -> bool {
        self.options()
            .get("required")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Field the owner needs for this relation to work.
    ///
    /// Belongs-to relations add their foreign key, forwarding any `index`
    /// option. Calling this repeatedly yields the same declaration.
    pub fn implied_field(&self) -> Result<Option<(String, FieldOptions)>> {
        self.implied_field_with(&RelationOptions::new())
    }

    /// Implied field as it would be once `overrides` are merged in.
    pub fn implied_field_with(
        &self,
        overrides: &RelationOptions,
    ) -> Result<Option<(String, FieldOptions)>> {
        if self.kind != RelationKind::BelongsTo {
            return Ok(None);
        }
        let mut options = self.options().clone();
        options.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

        let Some(foreign_key) = self.foreign_key_in(&options) else {
            return Ok(None);
        };
        let index = match options.get("index") {
            Some(value) => Some(serde_json::from_value::<FieldIndex>(value.clone())?),
            None => None,
        };
        Ok(Some((foreign_key, FieldOptions { type_tag: None, index })))
    }
}

/// Per-type relation table
///
/// Cloning a registry shares every relation with the clone.
#[derive(Debug, Clone, Default)]
pub struct AssociationRegistry {
    relations: BTreeMap<String, Arc<RelationMetadata>>,
}

impl AssociationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<RelationMetadata>> {
        self.relations.get(name)
    }

    pub fn install(&mut self, metadata: Arc<RelationMetadata>) {
        self.relations.insert(metadata.name().to_string(), metadata);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RelationMetadata>> {
        self.relations.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

/// Convert a CamelCase or path-like type name into snake_case
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' {
            result.push('_');
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    result
}

fn camelize(s: &str) -> String {
    s.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

// Covers the regular English plurals relation names use.
fn singularize(s: &str) -> String {
    if let Some(stem) = s.strip_suffix("ies") {
        format!("{}y", stem)
    } else if s.ends_with("sses") || s.ends_with("xes") || s.ends_with("ches") {
        s[..s.len() - 2].to_string()
    } else if s.ends_with('s') && !s.ends_with("ss") {
        s[..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: serde_json::Value) -> RelationOptions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_kind_selection() {
        let through = RelationMetadata::new(
            "Post",
            "tags",
            RelationMacro::HasMany,
            options(json!({"through": "taggings"})),
        )
        .unwrap();
        assert_eq!(through.kind(), RelationKind::HasManyThrough);
        assert_eq!(through.through(), Some("taggings"));
        assert_eq!(through.foreign_key(), None);

        let err = RelationMetadata::new(
            "Comment",
            "post",
            RelationMacro::BelongsTo,
            options(json!({"through": "x"})),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedThrough { .. }));
    }

    #[test]
    fn test_merge_rejects_through_change() {
        let relation = RelationMetadata::new(
            "Post",
            "tags",
            RelationMacro::HasMany,
            options(json!({"through": "x"})),
        )
        .unwrap();
        let err = relation.merge(options(json!({"through": "y"}))).unwrap_err();
        assert!(matches!(err, SchemaError::IncompatibleThroughOption { .. }));
        assert!(relation.merge(options(json!({}))).is_err());
    }

    #[test]
    fn test_merge_later_options_win() {
        let relation = RelationMetadata::new(
            "Comment",
            "post",
            RelationMacro::BelongsTo,
            options(json!({"required": false, "index": true})),
        )
        .unwrap();
        relation.merge(options(json!({"required": true}))).unwrap();
        assert!(relation.is_required());
        assert_eq!(relation.options().get("index"), Some(&json!(true)));
    }

    #[test]
    fn test_naming_conventions() {
        let belongs = RelationMetadata::new(
            "Comment",
            "blog_post",
            RelationMacro::BelongsTo,
            RelationOptions::new(),
        )
        .unwrap();
        assert_eq!(belongs.target_type_name(), "BlogPost");
        assert_eq!(belongs.foreign_key().as_deref(), Some("blog_post_id"));

        let many = RelationMetadata::new(
            "Blog::BlogPost",
            "categories",
            RelationMacro::HasMany,
            RelationOptions::new(),
        )
        .unwrap();
        assert_eq!(many.target_type_name(), "Category");
        assert_eq!(many.foreign_key().as_deref(), Some("blog_post_id"));

        let renamed = RelationMetadata::new(
            "Comment",
            "writer",
            RelationMacro::BelongsTo,
            options(json!({"class_name": "User", "foreign_key": "user_id"})),
        )
        .unwrap();
        assert_eq!(renamed.target_type_name(), "User");
        assert_eq!(renamed.foreign_key().as_deref(), Some("user_id"));
    }

    #[test]
    fn test_implied_field_only_for_belongs_to() {
        let belongs = RelationMetadata::new(
            "Comment",
            "post",
            RelationMacro::BelongsTo,
            options(json!({"index": true})),
        )
        .unwrap();
        let (name, field) = belongs.implied_field().unwrap().unwrap();
        assert_eq!(name, "post_id");
        assert_eq!(field.index, Some(FieldIndex::Toggle(true)));

        let many = RelationMetadata::new("Post", "comments", RelationMacro::HasMany, RelationOptions::new())
            .unwrap();
        assert!(many.implied_field().unwrap().is_none());
    }

    #[test]
    fn test_implied_field_previews_a_merge() {
        let belongs = RelationMetadata::new(
            "Comment",
            "post",
            RelationMacro::BelongsTo,
            RelationOptions::new(),
        )
        .unwrap();
        let (name, field) = belongs
            .implied_field_with(&options(json!({"foreign_key": "article_id", "index": "multi"})))
            .unwrap()
            .unwrap();
        assert_eq!(name, "article_id");
        assert_eq!(field.index, Some(FieldIndex::Flag("multi".into())));

        // nothing was merged
        assert!(belongs.options().is_empty());
        assert_eq!(belongs.foreign_key().as_deref(), Some("post_id"));
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("comments"), "comment");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("class"), "class");
    }
}
