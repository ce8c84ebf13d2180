//! Document types and the catalog that holds them
//!
//! Each document type owns a field table, an index table, a relation table
//! and an accessor table. The catalog tracks the type hierarchy and applies
//! the inheritance policy of each table:
//!
//! | table     | policy                                                    |
//! |-----------|-----------------------------------------------------------|
//! | fields    | [`InheritPolicy::CopyOnInherit`]                          |
//! | indexes   | [`InheritPolicy::CopyOnInherit`]                          |
//! | relations | [`InheritPolicy::SharePropagate`]                         |
//!
//! Schemas are expected to be declared up front; once declared, a catalog can
//! be read from many threads without locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::association::{
    to_snake_case, AssociationRegistry, RelationMacro, RelationMetadata, RelationOptions,
};
use crate::error::{Result, SchemaError};
use crate::field::{AccessorTable, FieldIndex, FieldOptions, FieldSchema, TypeRegistry};
use crate::index::{IndexArg, IndexOptions, IndexRegistry, IndexSpec, IDENTITY_INDEX};

/// How a table reaches subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritPolicy {
    /// A subtype gets a copy at creation and diverges afterwards
    CopyOnInherit,
    /// Declarations are written into every existing subtype as they happen
    SharePropagate,
}

impl InheritPolicy {
    pub fn propagates(self) -> bool {
        self == InheritPolicy::SharePropagate
    }
}

pub const FIELD_INHERITANCE: InheritPolicy = InheritPolicy::CopyOnInherit;
pub const INDEX_INHERITANCE: InheritPolicy = InheritPolicy::CopyOnInherit;
pub const ASSOCIATION_INHERITANCE: InheritPolicy = InheritPolicy::SharePropagate;

/// Table name for a type name: `Blog::PostComment` becomes `blog__post_comment`.
pub fn table_name(type_name: &str) -> String {
    type_name
        .split("::")
        .map(to_snake_case)
        .collect::<Vec<_>>()
        .join("__")
}

/// What a field declaration does to the index of the same name
enum IndexChange {
    Keep,
    Remove,
    Declare(IndexOptions),
}

/// Schema of one document type
#[derive(Debug, Clone)]
pub struct DocumentType {
    name: String,
    parent: Option<String>,
    table: String,
    fields: TypeRegistry,
    indexes: IndexRegistry,
    associations: AssociationRegistry,
    accessors: AccessorTable,
}

impl DocumentType {
    fn new(name: &str) -> Self {
        let mut doc_type = Self {
            name: name.to_string(),
            parent: None,
            table: table_name(name),
            fields: TypeRegistry::new(),
            indexes: IndexRegistry::new(),
            associations: AssociationRegistry::new(),
            accessors: AccessorTable::default(),
        };
        doc_type.install_field(FieldSchema::new(IDENTITY_INDEX, None));
        doc_type
    }

    fn inherit(name: &str, parent: &DocumentType) -> Self {
        Self {
            name: name.to_string(),
            parent: Some(parent.name.clone()),
            table: table_name(name),
            fields: parent.fields.clone(),
            indexes: parent.indexes.clone(),
            associations: parent.associations.clone(),
            accessors: parent.accessors.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &TypeRegistry {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldSchema>> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    pub fn indexes(&self) -> &IndexRegistry {
        &self.indexes
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains(name)
    }

    pub fn associations(&self) -> &AssociationRegistry {
        &self.associations
    }

    pub fn relation(&self, name: &str) -> Option<&Arc<RelationMetadata>> {
        self.associations.get(name)
    }

    pub fn accessors(&self) -> &AccessorTable {
        &self.accessors
    }

    fn install_field(&mut self, schema: FieldSchema) {
        self.accessors.install(&schema);
        self.fields.declare(schema);
    }

    /// Declare or redeclare a field on this type only.
    ///
    /// Nothing changes when the declaration is rejected.
    pub fn declare_field(&mut self, name: &str, options: FieldOptions) -> Result<()> {
        let index = self.check_field(name, &options)?;

        self.install_field(FieldSchema::new(name, options.type_tag));
        debug!(doc_type = %self.name, field = name, "declared field");

        match index {
            IndexChange::Keep => {}
            IndexChange::Remove => {
                self.remove_index(name);
            }
            IndexChange::Declare(index_options) => {
                self.indexes.declare(IndexSpec::single(name).with_options(index_options));
                debug!(doc_type = %self.name, index = name, kind = "single", "declared index");
            }
        }
        Ok(())
    }

    /// Validate a field declaration and resolve its index option.
    fn check_field(&self, name: &str, options: &FieldOptions) -> Result<IndexChange> {
        if self.indexes.is_non_single(name) {
            return Err(SchemaError::IndexNameReused(name.to_string()));
        }
        let index_options = match &options.index {
            None => return Ok(IndexChange::Keep),
            Some(FieldIndex::Toggle(false)) => return Ok(IndexChange::Remove),
            Some(FieldIndex::Toggle(true)) => IndexOptions::default(),
            Some(FieldIndex::Flag(flag)) => IndexOptions::from_flag(name, flag)?,
            Some(FieldIndex::Options(index_options)) => *index_options,
        };
        IndexSpec::parse(name, Vec::new(), index_options)?;
        Ok(IndexChange::Declare(index_options))
    }

    /// Declare or redeclare an index on this type only.
    ///
    /// A single index needs a field of the same name.
    pub fn declare_index(
        &mut self,
        name: &str,
        args: Vec<IndexArg>,
        options: IndexOptions,
    ) -> Result<()> {
        let spec = IndexSpec::parse(name, args, options)?;
        // the identity is always a field, so this also guards the identity index
        if self.has_field(name) && !spec.kind.is_single() {
            return Err(SchemaError::FieldNameReused(name.to_string()));
        }
        if spec.kind.is_single() && !self.has_field(name) {
            return Err(SchemaError::UndeclaredIndexField {
                type_name: self.name.clone(),
                index: name.to_string(),
            });
        }
        debug!(doc_type = %self.name, index = name, kind = spec.kind.label(), "declared index");
        self.indexes.declare(spec);
        Ok(())
    }

    /// Remove an index. The identity index cannot be removed.
    pub fn remove_index(&mut self, name: &str) -> Option<IndexSpec> {
        if name == IDENTITY_INDEX {
            return None;
        }
        self.indexes.remove(name)
    }
}

/// All document types known to the process
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    types: BTreeMap<String, DocumentType>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a root document type.
    pub fn define(&mut self, name: &str) -> Result<&mut DocumentType> {
        if self.types.contains_key(name) {
            return Err(SchemaError::DuplicateType(name.to_string()));
        }
        debug!(doc_type = name, "defined document type");
        Ok(self
            .types
            .entry(name.to_string())
            .or_insert_with(|| DocumentType::new(name)))
    }

    /// Define a subtype starting from a snapshot of its parent.
    pub fn subclass(&mut self, parent: &str, name: &str) -> Result<&mut DocumentType> {
        if self.types.contains_key(name) {
            return Err(SchemaError::DuplicateType(name.to_string()));
        }
        let parent_type = self.get_type(parent)?;
        let doc_type = DocumentType::inherit(name, parent_type);
        debug!(doc_type = name, parent, "defined document subtype");
        Ok(self.types.entry(name.to_string()).or_insert(doc_type))
    }

    pub fn get(&self, name: &str) -> Option<&DocumentType> {
        self.types.get(name)
    }

    pub fn get_type(&self, name: &str) -> Result<&DocumentType> {
        self.types
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    fn get_type_mut(&mut self, name: &str) -> Result<&mut DocumentType> {
        self.types
            .get_mut(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))
    }

    pub fn types(&self) -> impl Iterator<Item = &DocumentType> {
        self.types.values()
    }

    /// Ancestors of `name`, nearest first
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut ancestors = Vec::new();
        let mut current = self.types.get(name).and_then(|t| t.parent.clone());
        while let Some(parent) = current {
            current = self.types.get(&parent).and_then(|t| t.parent.clone());
            ancestors.push(parent);
        }
        ancestors
    }

    /// Every type that currently has `name` as an ancestor
    pub fn descendants(&self, name: &str) -> Vec<String> {
        self.types
            .keys()
            .filter(|candidate| self.ancestors(candidate).iter().any(|a| a == name))
            .cloned()
            .collect()
    }

    /// The type plus its descendants when `policy` propagates
    fn targets(&self, name: &str, policy: InheritPolicy) -> Vec<String> {
        let mut targets = vec![name.to_string()];
        if policy.propagates() {
            targets.extend(self.descendants(name));
        }
        targets
    }

    pub fn field(&mut self, type_name: &str, name: &str, options: FieldOptions) -> Result<()> {
        for target in self.targets(type_name, FIELD_INHERITANCE) {
            self.get_type_mut(&target)?
                .declare_field(name, options.clone())?;
        }
        Ok(())
    }

    pub fn index(
        &mut self,
        type_name: &str,
        name: &str,
        args: Vec<IndexArg>,
        options: IndexOptions,
    ) -> Result<()> {
        for target in self.targets(type_name, INDEX_INHERITANCE) {
            self.get_type_mut(&target)?
                .declare_index(name, args.clone(), options)?;
        }
        Ok(())
    }

    pub fn remove_index(&mut self, type_name: &str, name: &str) -> Result<Option<IndexSpec>> {
        Ok(self.get_type_mut(type_name)?.remove_index(name))
    }

    pub fn belongs_to(
        &mut self,
        type_name: &str,
        name: &str,
        options: RelationOptions,
    ) -> Result<Arc<RelationMetadata>> {
        self.declare_relation(type_name, RelationMacro::BelongsTo, name, options)
    }

    pub fn has_many(
        &mut self,
        type_name: &str,
        name: &str,
        options: RelationOptions,
    ) -> Result<Arc<RelationMetadata>> {
        self.declare_relation(type_name, RelationMacro::HasMany, name, options)
    }

    pub fn has_one(
        &mut self,
        type_name: &str,
        name: &str,
        options: RelationOptions,
    ) -> Result<Arc<RelationMetadata>> {
        self.declare_relation(type_name, RelationMacro::HasOne, name, options)
    }

    /// Declare a relation, or merge into the one `type_name` already sees.
    ///
    /// New relations are installed into `type_name` and all its current
    /// descendants as one shared object. The implied field is checked on
    /// every affected type first, so a rejected declaration changes nothing.
    pub fn declare_relation(
        &mut self,
        type_name: &str,
        verb: RelationMacro,
        name: &str,
        options: RelationOptions,
    ) -> Result<Arc<RelationMetadata>> {
        let existing = self.get_type(type_name)?.relation(name).cloned();

        let metadata = match existing {
            Some(metadata) => {
                metadata.check_merge(&options)?;
                let implied = metadata.implied_field_with(&options)?;
                let sharing = self.sharing(&metadata);
                self.check_implied_field(&sharing, implied.as_ref())?;

                metadata.merge(options)?;
                debug!(doc_type = type_name, relation = name, "merged relation options");
                self.apply_implied_field(&sharing, implied)?;
                metadata
            }
            None => {
                let metadata = Arc::new(RelationMetadata::new(type_name, name, verb, options)?);
                let implied = metadata.implied_field()?;
                let targets = self.targets(type_name, ASSOCIATION_INHERITANCE);
                self.check_implied_field(&targets, implied.as_ref())?;

                for target in &targets {
                    self.get_type_mut(target)?
                        .associations
                        .install(Arc::clone(&metadata));
                }
                debug!(
                    doc_type = type_name,
                    relation = name,
                    kind = ?metadata.kind(),
                    types = targets.len(),
                    "installed relation"
                );
                self.apply_implied_field(&targets, implied)?;
                metadata
            }
        };

        Ok(metadata)
    }

    /// Types holding this exact relation object
    fn sharing(&self, metadata: &Arc<RelationMetadata>) -> Vec<String> {
        self.types
            .values()
            .filter(|t| {
                t.relation(metadata.name())
                    .is_some_and(|r| Arc::ptr_eq(r, metadata))
            })
            .map(|t| t.name.clone())
            .collect()
    }

    fn check_implied_field(
        &self,
        type_names: &[String],
        implied: Option<&(String, FieldOptions)>,
    ) -> Result<()> {
        let Some((field, options)) = implied else {
            return Ok(());
        };
        for type_name in type_names {
            let doc_type = self.get_type(type_name)?;
            doc_type.check_field(field, &implied_options(doc_type, field, options))?;
        }
        Ok(())
    }

    /// Declare the relation's implied field on each type.
    ///
    /// A field that already exists keeps its declared type.
    fn apply_implied_field(
        &mut self,
        type_names: &[String],
        implied: Option<(String, FieldOptions)>,
    ) -> Result<()> {
        let Some((field, options)) = implied else {
            return Ok(());
        };
        for type_name in type_names {
            let doc_type = self.get_type_mut(type_name)?;
            let options = implied_options(doc_type, &field, &options);
            doc_type.declare_field(&field, options)?;
        }
        Ok(())
    }
}

fn implied_options(doc_type: &DocumentType, field: &str, options: &FieldOptions) -> FieldOptions {
    let mut options = options.clone();
    if options.type_tag.is_none() {
        options.type_tag = doc_type.field(field).and_then(|f| f.type_tag().cloned());
    }
    options
}
