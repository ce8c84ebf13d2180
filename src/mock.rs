//! In-memory executor for deterministic testing and dry runs
//!
//! Holds index lists per table, records every operation and can be told to
//! fail a given operation.
//!
//! # Example
//!
//! ```
//! use docmap_schemas::mock::{MockExecutor, MockOperation};
//! use docmap_schemas::QueryExecutor;
//!
//! let executor = MockExecutor::new().with_indexes("post", ["title"]);
//! executor.index_drop("post", "title").unwrap();
//!
//! assert!(executor.indexes("post").is_empty());
//! assert_eq!(
//!     executor.operations(),
//!     vec![MockOperation::Drop { table: "post".into(), name: "title".into() }]
//! );
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::executor::{IndexCreate, QueryExecutor, RemoteError};
use crate::index::{IndexFn, IndexOptions};

/// Mock executor.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Clone, Default)]
pub struct MockExecutor {
    inner: Arc<Mutex<MockExecutorInner>>,
}

#[derive(Default)]
struct MockExecutorInner {
    /// Index names per table, in creation order.
    tables: HashMap<String, Vec<String>>,
    /// Compute functions received with create requests.
    functions: HashMap<(String, String), IndexFn>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Which operation should fail, and how.
#[derive(Debug, Clone)]
pub enum FailOn {
    List(RemoteError),
    /// Fail creating this index name.
    Create(String, RemoteError),
    /// Fail dropping this index name.
    Drop(String, RemoteError),
    Wait(RemoteError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    List {
        table: String,
    },
    Create {
        table: String,
        name: String,
        options: IndexOptions,
        computed: bool,
    },
    Drop {
        table: String,
        name: String,
    },
    Wait {
        table: String,
        name: Option<String>,
    },
}

impl MockOperation {
    /// Whether this operation changes the remote index set
    pub fn is_mutation(&self) -> bool {
        matches!(self, MockOperation::Create { .. } | MockOperation::Drop { .. })
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with existing indexes.
    pub fn with_indexes<I, S>(self, table: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .tables
            .insert(table.to_string(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Configure the mock to fail on a specific operation.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Recorded operations that changed the index set
    pub fn mutations(&self) -> Vec<MockOperation> {
        self.lock()
            .operations
            .iter()
            .filter(|op| op.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    /// Current index names of `table`.
    pub fn indexes(&self, table: &str) -> Vec<String> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Compute function received when `name` was created on `table`.
    pub fn compute_fn(&self, table: &str, name: &str) -> Option<IndexFn> {
        self.lock()
            .functions
            .get(&(table.to_string(), name.to_string()))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MockExecutorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, op: MockOperation) {
        self.lock().operations.push(op);
    }

    fn check_fail(&self, operation: &str, name: Option<&str>) -> Result<(), RemoteError> {
        let inner = self.lock();
        match (&inner.fail_on, operation) {
            (Some(FailOn::List(e)), "list") => Err(e.clone()),
            (Some(FailOn::Create(target, e)), "create") if Some(target.as_str()) == name => {
                Err(e.clone())
            }
            (Some(FailOn::Drop(target, e)), "drop") if Some(target.as_str()) == name => {
                Err(e.clone())
            }
            (Some(FailOn::Wait(e)), "wait") => Err(e.clone()),
            _ => Ok(()),
        }
    }
}

impl QueryExecutor for MockExecutor {
    fn index_list(&self, table: &str) -> Result<Vec<String>, RemoteError> {
        self.record(MockOperation::List {
            table: table.to_string(),
        });
        self.check_fail("list", None)?;
        Ok(self.indexes(table))
    }

    fn index_create(&self, table: &str, request: &IndexCreate) -> Result<(), RemoteError> {
        self.record(MockOperation::Create {
            table: table.to_string(),
            name: request.name.clone(),
            options: request.options,
            computed: request.compute.is_some(),
        });
        self.check_fail("create", Some(&request.name))?;

        let mut inner = self.lock();
        let indexes = inner.tables.entry(table.to_string()).or_default();
        if indexes.contains(&request.name) {
            return Err(RemoteError::IndexExists(request.name.clone()));
        }
        indexes.push(request.name.clone());
        if let Some(compute) = &request.compute {
            inner
                .functions
                .insert((table.to_string(), request.name.clone()), Arc::clone(compute));
        }
        Ok(())
    }

    fn index_drop(&self, table: &str, name: &str) -> Result<(), RemoteError> {
        self.record(MockOperation::Drop {
            table: table.to_string(),
            name: name.to_string(),
        });
        self.check_fail("drop", Some(name))?;

        let mut inner = self.lock();
        let indexes = inner.tables.entry(table.to_string()).or_default();
        let Some(position) = indexes.iter().position(|n| n == name) else {
            return Err(RemoteError::IndexNotFound(name.to_string()));
        };
        indexes.remove(position);
        inner.functions.remove(&(table.to_string(), name.to_string()));
        Ok(())
    }

    fn index_wait(
        &self,
        table: &str,
        name: Option<&str>,
        _timeout: Option<Duration>,
    ) -> Result<(), RemoteError> {
        self.record(MockOperation::Wait {
            table: table.to_string(),
            name: name.map(String::from),
        });
        self.check_fail("wait", name)?;

        match name {
            Some(name) if !self.indexes(table).iter().any(|n| n == name) => {
                Err(RemoteError::IndexNotFound(name.to_string()))
            }
            _ => Ok(()),
        }
    }
}
