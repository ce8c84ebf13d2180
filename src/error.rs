//! Error types for the schema core

use thiserror::Error;

use crate::executor::RemoteError;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema core errors
///
/// Everything except cast failures propagates immediately. Cast failures are
/// carried as [`crate::types::CastError`] and deferred to validation.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Document type not found: {0}")]
    UnknownType(String),

    #[error("Document type already defined: {0}")]
    DuplicateType(String),

    #[error("Attribute not declared on {type_name}: {attribute}")]
    UnknownAttribute { type_name: String, attribute: String },

    #[error("Index not declared on {type_name}: {index}")]
    UnknownIndex { type_name: String, index: String },

    #[error("Relation not declared on {type_name}: {relation}")]
    UnknownRelation { type_name: String, relation: String },

    #[error("Cannot use a reserved field name: {0}")]
    ReservedName(String),

    #[error("Too many index arguments for {name}: expected at most 1, got {given}")]
    IndexArity { name: String, given: usize },

    #[error("Index argument for {0} must be a function or a list of fields")]
    InvalidIndexArgument(String),

    #[error("Invalid index option for {name}: {option}")]
    InvalidIndexOption { name: String, option: String },

    #[error("Single index {index} on {type_name} has no field of the same name")]
    UndeclaredIndexField { type_name: String, index: String },

    #[error("Cannot reuse field name {0} for a non-single index")]
    FieldNameReused(String),

    #[error("Cannot reuse index attribute {0} as a field")]
    IndexNameReused(String),

    #[error("Cannot change the :through option of {relation}: {existing:?} -> {requested:?}")]
    IncompatibleThroughOption {
        relation: String,
        existing: Option<String>,
        requested: Option<String>,
    },

    #[error("{kind} does not support the :through option ({relation})")]
    UnsupportedThrough { kind: &'static str, relation: String },

    #[error("Relation {relation} is not a belongs-to relation")]
    NotBelongsTo { relation: String },

    #[error("Associated {target_type} for {relation} is not persisted")]
    AssociationNotPersisted { relation: String, target_type: String },

    #[error("Index operation failed on {table}.{}: {source}", .index.as_deref().unwrap_or("*"))]
    IndexOperationFailed {
        table: String,
        index: Option<String>,
        #[source]
        source: RemoteError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SchemaError {
    /// Whether this error was raised while declaring schema (as opposed to
    /// a remote or IO failure).
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            SchemaError::DuplicateType(_)
                | SchemaError::ReservedName(_)
                | SchemaError::IndexArity { .. }
                | SchemaError::InvalidIndexArgument(_)
                | SchemaError::InvalidIndexOption { .. }
                | SchemaError::UndeclaredIndexField { .. }
                | SchemaError::FieldNameReused(_)
                | SchemaError::IndexNameReused(_)
                | SchemaError::IncompatibleThroughOption { .. }
                | SchemaError::UnsupportedThrough { .. }
        )
    }
}
