//! Field declarations and the per-type field table

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::index::IndexOptions;
use crate::types::{lookup_cast_in, lookup_cast_out, CastError, CastIn, CastOut, TypeTag};
use crate::value::Value;

/// Index request attached to a field declaration
///
/// In a schema file this is written as `index = true`, `index = "multi"` or
/// `index = { multi = true }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldIndex {
    /// `true` declares a single index of the field's name, `false` removes it
    Toggle(bool),
    /// A single option switched on, e.g. `multi`
    Flag(String),
    /// A single index with explicit options
    Options(IndexOptions),
}

/// Options accepted by a field declaration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    pub type_tag: Option<TypeTag>,
    pub index: Option<FieldIndex>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn typed(mut self, type_tag: impl Into<TypeTag>) -> Self {
        self.type_tag = Some(type_tag.into());
        self
    }

    pub fn index(mut self, index: FieldIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn indexed(self) -> Self {
        self.index(FieldIndex::Toggle(true))
    }
}

/// Declaration of a single attribute
///
/// Immutable once built; redeclaring a field replaces the whole schema.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    name: String,
    type_tag: Option<TypeTag>,
    cast_in: Option<CastIn>,
    cast_out: Option<CastOut>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, type_tag: Option<TypeTag>) -> Self {
        let cast_in = type_tag.as_ref().map(lookup_cast_in);
        let cast_out = type_tag.as_ref().and_then(lookup_cast_out);
        Self {
            name: name.into(),
            type_tag,
            cast_in,
            cast_out,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_tag(&self) -> Option<&TypeTag> {
        self.type_tag.as_ref()
    }

    /// Stored values of this field need a cast-out when loaded.
    pub fn must_cast_on_read(&self) -> bool {
        self.cast_out.is_some()
    }

    /// Cast a user supplied value into the declared type.
    ///
    /// Nil, untyped fields and values already of the declared type pass
    /// through untouched.
    pub fn cast_in(&self, value: Value) -> Result<Value, CastError> {
        let (Some(type_tag), Some(cast_in)) = (&self.type_tag, self.cast_in) else {
            return Ok(value);
        };
        if value.is_nil() || type_tag.matches(&value) {
            return Ok(value);
        }
        cast_in(&value).map_err(|_| CastError {
            type_tag: type_tag.clone(),
            value,
            attribute: self.name.clone(),
        })
    }

    /// Cast a stored value back into the declared type.
    pub fn cast_out(&self, value: Value) -> Value {
        match (&self.type_tag, self.cast_out) {
            (Some(type_tag), Some(cast_out)) if !value.is_nil() && !type_tag.matches(&value) => {
                cast_out(value)
            }
            _ => value,
        }
    }
}

/// Per-type table of field declarations
///
/// Subtypes start from a copy of their parent's table and diverge from there.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    fields: BTreeMap<String, Arc<FieldSchema>>,
    cast_on_read: BTreeSet<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a field.
    pub fn declare(&mut self, schema: FieldSchema) -> Arc<FieldSchema> {
        let name = schema.name().to_string();
        if schema.must_cast_on_read() {
            self.cast_on_read.insert(name.clone());
        } else {
            self.cast_on_read.remove(&name);
        }
        let schema = Arc::new(schema);
        self.fields.insert(name, Arc::clone(&schema));
        schema
    }

    pub fn get(&self, name: &str) -> Option<&Arc<FieldSchema>> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields whose stored form must be cast out on load
    pub fn cast_on_read(&self) -> impl Iterator<Item = &Arc<FieldSchema>> {
        self.cast_on_read.iter().filter_map(|name| self.fields.get(name))
    }
}

pub type Getter = Arc<dyn Fn(&Document<'_>) -> Value + Send + Sync>;
pub type Setter = Arc<dyn Fn(&mut Document<'_>, Value) + Send + Sync>;

fn getter<F>(f: F) -> Getter
where
    F: Fn(&Document<'_>) -> Value + Send + Sync + 'static,
{
    Arc::new(f)
}

fn setter<F>(f: F) -> Setter
where
    F: Fn(&mut Document<'_>, Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Getter/setter pair for one accessor name
#[derive(Clone)]
pub struct Accessor {
    pub getter: Getter,
    pub setter: Option<Setter>,
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("writable", &self.setter.is_some())
            .finish()
    }
}

/// Accessor closures built once per field declaration
///
/// Every field `x` gets an `x` accessor that reads the attribute and writes
/// through the casting pipeline. Boolean fields also get a read-only `x?`
/// predicate.
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    entries: BTreeMap<String, Accessor>,
}

impl AccessorTable {
    pub fn install(&mut self, field: &FieldSchema) {
        let name = field.name().to_string();

        let read_name = name.clone();
        let write_name = name.clone();
        self.entries.insert(
            name.clone(),
            Accessor {
                getter: getter(move |doc| doc.read(&read_name).cloned().unwrap_or_default()),
                setter: Some(setter(move |doc, value| doc.assign(&write_name, value))),
            },
        );

        let predicate = format!("{}?", name);
        if field.type_tag() == Some(&TypeTag::Boolean) {
            self.entries.insert(
                predicate,
                Accessor {
                    getter: getter(move |doc| {
                        Value::Bool(doc.read(&name).is_some_and(Value::is_truthy))
                    }),
                    setter: None,
                },
            );
        } else {
            self.entries.remove(&predicate);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Accessor> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
