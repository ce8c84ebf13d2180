//! Secondary index declarations

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::value::{Attributes, Value};

/// Name of the implicit index over the document identity
pub const IDENTITY_INDEX: &str = "id";

/// Names that cannot be used for an index
pub const RESERVED_FIELD_NAMES: &[&str] = &[
    "index",
    "default",
    "and",
    "or",
    "not",
    "selector",
    "associations",
    "eq",
    "ne",
    "gt",
    "ge",
    "lt",
    "le",
    "in",
    "nin",
    "any",
    "all",
    "defined",
];

pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_FIELD_NAMES.contains(&name)
}

/// Function computing the index value of a document
pub type IndexFn = Arc<dyn Fn(&Attributes) -> Value + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexOptions {
    #[serde(default)]
    pub multi: bool,
}

impl IndexOptions {
    /// Options with a single flag switched on
    pub fn from_flag(index: &str, flag: &str) -> Result<Self> {
        match flag {
            "multi" => Ok(Self { multi: true }),
            other => Err(SchemaError::InvalidIndexOption {
                name: index.to_string(),
                option: other.to_string(),
            }),
        }
    }
}

/// Positional argument of an index declaration
#[derive(Clone)]
pub enum IndexArg {
    /// Ordered field list, producing a compound index
    Fields(Vec<String>),
    /// Value function, producing a computed index
    Compute(IndexFn),
    /// Anything else; always rejected
    Value(Value),
}

impl IndexArg {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexArg::Fields(fields.into_iter().map(Into::into).collect())
    }

    pub fn compute<F>(f: F) -> Self
    where
        F: Fn(&Attributes) -> Value + Send + Sync + 'static,
    {
        IndexArg::Compute(Arc::new(f))
    }
}

impl fmt::Debug for IndexArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexArg::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            IndexArg::Compute(_) => f.write_str("Compute(..)"),
            IndexArg::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

#[derive(Clone)]
pub enum IndexKind {
    /// Indexes the field of the same name
    Single,
    /// Indexes the ordered tuple of these fields' values
    Compound(Vec<String>),
    /// Indexes the value of a function of the whole document
    Computed(IndexFn),
}

impl IndexKind {
    pub fn label(&self) -> &'static str {
        match self {
            IndexKind::Single => "single",
            IndexKind::Compound(_) => "compound",
            IndexKind::Computed(_) => "computed",
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, IndexKind::Single)
    }

    /// Classify the positional arguments of an index declaration.
    pub fn classify(name: &str, args: Vec<IndexArg>) -> Result<Self> {
        if args.len() > 1 {
            return Err(SchemaError::IndexArity {
                name: name.to_string(),
                given: args.len(),
            });
        }
        match args.into_iter().next() {
            None => Ok(IndexKind::Single),
            Some(IndexArg::Fields(fields)) => Ok(IndexKind::Compound(fields)),
            Some(IndexArg::Compute(f)) => Ok(IndexKind::Computed(f)),
            Some(IndexArg::Value(_)) => Err(SchemaError::InvalidIndexArgument(name.to_string())),
        }
    }
}

impl fmt::Debug for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Single => f.write_str("Single"),
            IndexKind::Compound(fields) => f.debug_tuple("Compound").field(fields).finish(),
            IndexKind::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A declared index
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub kind: IndexKind,
    pub options: IndexOptions,
}

impl IndexSpec {
    /// Validate and build an index declaration.
    pub fn parse(name: impl Into<String>, args: Vec<IndexArg>, options: IndexOptions) -> Result<Self> {
        let name = name.into();
        if is_reserved_name(&name) {
            return Err(SchemaError::ReservedName(name));
        }
        let kind = IndexKind::classify(&name, args)?;
        Ok(Self {
            name,
            kind,
            options,
        })
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Single,
            options: IndexOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Function handed to the store when creating this index.
    ///
    /// Single indexes need none; compound indexes map a document to the
    /// ordered tuple of their fields.
    pub fn compute_fn(&self) -> Option<IndexFn> {
        match &self.kind {
            IndexKind::Single => None,
            IndexKind::Compound(fields) => {
                let fields = fields.clone();
                Some(Arc::new(move |doc: &Attributes| {
                    Value::Array(
                        fields
                            .iter()
                            .map(|field| doc.get(field).cloned().unwrap_or_default())
                            .collect(),
                    )
                }))
            }
            IndexKind::Computed(f) => Some(Arc::clone(f)),
        }
    }
}

/// Per-type table of declared indexes, in declaration order
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    specs: Vec<IndexSpec>,
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexRegistry {
    /// A registry holding only the identity index
    pub fn new() -> Self {
        Self {
            specs: vec![IndexSpec::single(IDENTITY_INDEX)],
        }
    }

    /// Insert or replace an index, keeping its original position.
    pub fn declare(&mut self, spec: IndexSpec) {
        match self.specs.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<IndexSpec> {
        let position = self.specs.iter().position(|s| s.name == name)?;
        Some(self.specs.remove(position))
    }

    pub fn get(&self, name: &str) -> Option<&IndexSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether `name` is declared with a compound or computed definition
    pub fn is_non_single(&self, name: &str) -> bool {
        self.get(name).is_some_and(|s| !s.kind.is_single())
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexSpec> {
        self.specs.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.iter().map(|s| s.name.as_str())
    }

    /// Index names the store should have, i.e. everything but the identity
    pub fn desired_names(&self) -> Vec<String> {
        self.names()
            .filter(|name| *name != IDENTITY_INDEX)
            .map(String::from)
            .collect()
    }
}
