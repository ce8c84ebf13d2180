//! Docmap Schemas
//!
//! Schema metadata core for a document mapper: typed fields with
//! bidirectional casts, relation metadata shared across a type hierarchy,
//! and reconciliation of declared indexes against a remote store.
//!
//! ## Features
//!
//! - **Type Casts**: Strict string, numeric, boolean and symbol casts that never guess
//! - **Deferred Validation**: Bad assignments are kept and reported at validation time
//! - **Inheritance**: Fields and indexes are copied into subtypes, relations are shared
//! - **Index Reconciliation**: Drop stale indexes, create missing ones, wait for readiness
//! - **Declarative Schemas**: Whole catalogs can be loaded from a TOML file
//!
//! ## Architecture
//!
//! ```text
//! Catalog
//! └── DocumentType
//!     ├── TypeRegistry         field name -> FieldSchema (cast-in / cast-out)
//!     ├── IndexRegistry        index name -> IndexSpec (single / compound / computed)
//!     ├── AssociationRegistry  relation name -> Arc<RelationMetadata>
//!     └── AccessorTable        accessor name -> getter / setter
//!
//! Document ──assign──> cast-in ──ok──> attributes
//!                               └─err─> pending cast errors ──> before_validation
//!
//! IndexReconciler ──> QueryExecutor (list / drop / create / wait)
//! ```
//!
//! ## Example
//!
//! ```
//! use docmap_schemas::{Catalog, Document, FieldOptions, IndexReconciler, ReconcileOptions, TypeTag, Value};
//! use docmap_schemas::mock::MockExecutor;
//!
//! let mut catalog = Catalog::new();
//! catalog.define("Post").unwrap();
//! catalog
//!     .field("Post", "views", FieldOptions::new().typed(TypeTag::Integer).indexed())
//!     .unwrap();
//!
//! let post = catalog.get("Post").unwrap();
//! let mut doc = Document::new(post);
//! doc.assign("views", "42".into());
//! assert_eq!(doc.read("views"), Some(&Value::Integer(42)));
//!
//! let executor = MockExecutor::new().with_indexes("post", ["stale"]);
//! let plan = IndexReconciler::new(&executor, ReconcileOptions::default())
//!     .reconcile(post)
//!     .unwrap();
//! assert_eq!(plan.to_drop, vec!["stale"]);
//! assert_eq!(executor.indexes("post"), vec!["views"]);
//! ```

pub mod association;
pub mod catalog;
pub mod config;
pub mod definition;
pub mod document;
pub mod error;
pub mod executor;
pub mod field;
pub mod index;
pub mod mock;
pub mod reconcile;
pub mod types;
pub mod value;

pub use association::{AssociationRegistry, RelationKind, RelationMacro, RelationMetadata, RelationOptions};
pub use catalog::{Catalog, DocumentType, InheritPolicy};
pub use config::SchemaConfig;
pub use definition::SchemaDefinition;
pub use document::{Document, RelatedRef, ValidationErrors, ValidationSink};
pub use error::{Result, SchemaError};
pub use executor::{IndexCreate, QueryExecutor, RemoteError};
pub use field::{FieldIndex, FieldOptions, FieldSchema, TypeRegistry};
pub use index::{IndexArg, IndexKind, IndexOptions, IndexRegistry, IndexSpec};
pub use reconcile::{IndexReconciler, ReconcileOptions, ReconcilePlan};
pub use types::{CastError, InvalidType, TypeTag};
pub use value::{Attributes, Value};
