//! Remote query executor contract
//!
//! The schema core never talks to a store directly. Index maintenance goes
//! through a [`QueryExecutor`], which issues the request against the remote
//! table and reports the raw outcome.
//!
//! All calls block. Run them from a maintenance task or a CLI step, never
//! from a request path.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::index::{IndexFn, IndexOptions, IndexSpec};

/// Failure reported by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("table does not exist: {0}")]
    TableNotFound(String),

    #[error("index does not exist: {0}")]
    IndexNotFound(String),

    #[error("index already exists: {0}")]
    IndexExists(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Index creation request
#[derive(Clone)]
pub struct IndexCreate {
    pub name: String,
    pub options: IndexOptions,
    /// Value function for compound and computed indexes
    pub compute: Option<IndexFn>,
}

impl IndexCreate {
    pub fn from_spec(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name.clone(),
            options: spec.options,
            compute: spec.compute_fn(),
        }
    }
}

impl fmt::Debug for IndexCreate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexCreate")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("computed", &self.compute.is_some())
            .finish()
    }
}

/// Executor for index operations against a remote table
pub trait QueryExecutor: Send + Sync {
    /// Names of the secondary indexes currently on `table`.
    ///
    /// The primary key is not a secondary index and is not listed.
    fn index_list(&self, table: &str) -> Result<Vec<String>, RemoteError>;

    /// Create an index. Returns once the request is accepted, not once the
    /// index is ready.
    fn index_create(&self, table: &str, request: &IndexCreate) -> Result<(), RemoteError>;

    /// Drop an index.
    fn index_drop(&self, table: &str, name: &str) -> Result<(), RemoteError>;

    /// Block until `name` (or every index when `None`) is ready.
    ///
    /// `timeout` bounds the wait; `None` waits as long as the store does.
    fn index_wait(
        &self,
        table: &str,
        name: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<(), RemoteError>;
}
