//! Index reconciliation
//!
//! Brings the secondary indexes of a remote table in line with the indexes
//! declared on its document type:
//!
//! 1. list the indexes the table has
//! 2. drop every listed index that is no longer declared
//! 3. create every declared index that is not listed
//!
//! Drops run before creates so an index redefined under a reused name never
//! collides with its old self. Reconciliation is not transactional and does
//! not retry; a failure leaves the remaining indexes untouched and is
//! returned to the caller.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, DocumentType};
use crate::error::{Result, SchemaError};
use crate::executor::{IndexCreate, QueryExecutor, RemoteError};
use crate::index::IDENTITY_INDEX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Wait for each created index to become ready
    pub wait: bool,
    /// Log every created and dropped index at info level
    pub verbose: bool,
    /// Upper bound for each readiness wait
    pub wait_timeout: Option<Duration>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            wait: true,
            verbose: false,
            wait_timeout: None,
        }
    }
}

/// Drop and create lists for one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub doc_type: String,
    pub table: String,
    pub to_drop: Vec<String>,
    pub to_create: Vec<String>,
}

impl ReconcilePlan {
    /// Diff the declared indexes of `doc_type` against `actual`.
    ///
    /// The identity index is never dropped nor created.
    pub fn compute(doc_type: &DocumentType, actual: &[String]) -> Self {
        let desired = doc_type.indexes().desired_names();
        let desired_set: HashSet<&str> = desired.iter().map(String::as_str).collect();
        let actual_set: HashSet<&str> = actual.iter().map(String::as_str).collect();

        let to_drop = actual
            .iter()
            .filter(|name| name.as_str() != IDENTITY_INDEX && !desired_set.contains(name.as_str()))
            .cloned()
            .collect();
        let to_create = desired
            .iter()
            .filter(|name| !actual_set.contains(name.as_str()))
            .cloned()
            .collect();

        Self {
            doc_type: doc_type.name().to_string(),
            table: doc_type.table_name().to_string(),
            to_drop,
            to_create,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_drop.is_empty() && self.to_create.is_empty()
    }
}

/// Applies declared indexes to remote tables through an executor
pub struct IndexReconciler<'e, E: QueryExecutor + ?Sized> {
    executor: &'e E,
    options: ReconcileOptions,
}

impl<'e, E: QueryExecutor + ?Sized> IndexReconciler<'e, E> {
    pub fn new(executor: &'e E, options: ReconcileOptions) -> Self {
        Self { executor, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    fn failed(table: &str, index: Option<&str>, source: RemoteError) -> SchemaError {
        SchemaError::IndexOperationFailed {
            table: table.to_string(),
            index: index.map(String::from),
            source,
        }
    }

    /// Compute the plan for `doc_type` without changing anything.
    pub fn plan(&self, doc_type: &DocumentType) -> Result<ReconcilePlan> {
        let table = doc_type.table_name();
        let actual = self
            .executor
            .index_list(table)
            .map_err(|e| Self::failed(table, None, e))?;
        Ok(ReconcilePlan::compute(doc_type, &actual))
    }

    /// Reconcile the indexes of one type. Returns the plan that was applied.
    pub fn reconcile(&self, doc_type: &DocumentType) -> Result<ReconcilePlan> {
        let plan = self.plan(doc_type)?;
        if plan.is_empty() {
            debug!(doc_type = doc_type.name(), "indexes up to date");
            return Ok(plan);
        }

        for name in &plan.to_drop {
            self.drop_index(doc_type, name)?;
        }
        for name in &plan.to_create {
            self.create_index(doc_type, name)?;
        }
        Ok(plan)
    }

    /// Reconcile every type of the catalog, stopping at the first failure.
    pub fn reconcile_all(&self, catalog: &Catalog) -> Result<Vec<ReconcilePlan>> {
        catalog.types().map(|t| self.reconcile(t)).collect()
    }

    /// Create one declared index, then wait for it unless disabled.
    pub fn create_index(&self, doc_type: &DocumentType, name: &str) -> Result<()> {
        let table = doc_type.table_name();
        let spec = doc_type
            .indexes()
            .get(name)
            .ok_or_else(|| SchemaError::UnknownIndex {
                type_name: doc_type.name().to_string(),
                index: name.to_string(),
            })?;

        let request = IndexCreate::from_spec(spec);
        self.executor
            .index_create(table, &request)
            .map_err(|e| Self::failed(table, Some(name), e))?;

        if self.options.wait {
            self.wait_for_index(doc_type, Some(name))?;
        }

        if self.options.verbose {
            info!(doc_type = doc_type.name(), index = name, kind = spec.kind.label(), "created index");
        }
        Ok(())
    }

    /// Drop one index. An index already gone from the store is not an error.
    pub fn drop_index(&self, doc_type: &DocumentType, name: &str) -> Result<()> {
        let table = doc_type.table_name();
        match self.executor.index_drop(table, name) {
            Ok(()) => {}
            Err(RemoteError::IndexNotFound(_)) => {
                warn!(doc_type = doc_type.name(), index = name, "index already absent");
                return Ok(());
            }
            Err(e) => return Err(Self::failed(table, Some(name), e)),
        }

        if self.options.verbose {
            info!(doc_type = doc_type.name(), index = name, "dropped index");
        }
        Ok(())
    }

    /// Block until `name`, or every index of the table, is ready.
    pub fn wait_for_index(&self, doc_type: &DocumentType, name: Option<&str>) -> Result<()> {
        let table = doc_type.table_name();
        let started = Instant::now();
        self.executor
            .index_wait(table, name, self.options.wait_timeout)
            .map_err(|e| Self::failed(table, name, e))?;
        debug!(
            doc_type = doc_type.name(),
            index = name.unwrap_or("*"),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index ready"
        );
        Ok(())
    }
}
