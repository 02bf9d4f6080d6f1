//! Storage adapter contract.
//!
//! The engines talk to a table-oriented query client: select with filters,
//! order and limit, count, insert, update, delete. Rows cross this boundary
//! as JSON objects, the same shape a hosted database API returns; the
//! transform layer converts them into the typed models in one step.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// The fixed set of tables the engines operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    PredefinedTasks,
    CaseTasks,
    CompanyTasks,
    TaskInstances,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::PredefinedTasks => "predefined_tasks",
            Table::CaseTasks => "case_tasks",
            Table::CompanyTasks => "company_tasks",
            Table::TaskInstances => "task_instances",
        }
    }

    pub fn primary_key(self) -> &'static str {
        match self {
            Table::PredefinedTasks => "predefined_task_id",
            Table::CaseTasks => "case_task_id",
            Table::CompanyTasks => "company_task_id",
            Table::TaskInstances => "task_instance_id",
        }
    }
}

/// A single predicate. A query is the conjunction of its filters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals a scalar JSON value.
    Eq(&'static str, Value),
    /// Column is in a set of scalar JSON values. An empty set matches nothing.
    In(&'static str, Vec<Value>),
    /// Case-insensitive substring match against any of the listed columns.
    Search {
        columns: Vec<&'static str>,
        term: String,
    },
}

/// Requested ordering for a select.
#[derive(Debug, Clone, Copy)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

/// Errors surfaced by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("query failed: {0}")]
    Query(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("no row matched the given key")]
    NotFound,
    #[error("unsupported value for column {0}")]
    UnsupportedValue(String),
}

/// Table-oriented CRUD/query client.
///
/// Implementations are assumed reliable transports; failures surface as
/// [`StorageError`] and are never retried at this layer.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Select rows matching all filters, optionally ordered and limited.
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<Value>, StorageError>;

    /// Count rows matching all filters.
    async fn count(&self, table: Table, filters: &[Filter]) -> Result<u64, StorageError>;

    /// Insert a row and return the stored row.
    async fn insert(&self, table: Table, row: Value) -> Result<Value, StorageError>;

    /// Apply the given column changes to rows matching the key filter and
    /// return the updated row. `StorageError::NotFound` when nothing matched.
    async fn update(&self, table: Table, changes: Value, key: Filter) -> Result<Value, StorageError>;

    /// Delete rows matching the key filter. Deleting an absent key is not an
    /// error.
    async fn delete(&self, table: Table, key: Filter) -> Result<(), StorageError>;
}
