//! SQLite implementation of the storage adapter.
//!
//! The engines only see the [`Storage`] trait; this backend builds the SQL
//! for each filter spec and maps rows to JSON objects, so the transform
//! layer is identical whether rows come from SQLite or a hosted API.

use crate::storage::{Filter, Order, Storage, StorageError, Table};
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{Map, Number, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Storage backend wrapping a SQLite connection.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent access
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }
}

fn query_err(e: rusqlite::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

fn write_err(e: rusqlite::Error) -> StorageError {
    StorageError::Write(e.to_string())
}

/// Convert a scalar JSON value to a SQLite parameter. Booleans are stored as
/// 0/1 integers; arrays and objects are not valid column values.
fn json_to_sql(column: &str, value: &Value) -> std::result::Result<SqlValue, StorageError> {
    match value {
        Value::Null => Ok(SqlValue::Null),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(SqlValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(SqlValue::Real(f))
            } else {
                Err(StorageError::UnsupportedValue(column.to_string()))
            }
        }
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => {
            Err(StorageError::UnsupportedValue(column.to_string()))
        }
    }
}

/// Build a WHERE clause and its parameters from a filter list.
fn build_where(
    filters: &[Filter],
) -> std::result::Result<(String, Vec<SqlValue>), StorageError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    for filter in filters {
        match filter {
            Filter::Eq(column, value) => {
                clauses.push(format!("{} = ?", column));
                params.push(json_to_sql(column, value)?);
            }
            Filter::In(column, values) => {
                if values.is_empty() {
                    // An empty set matches nothing.
                    clauses.push("1 = 0".to_string());
                } else {
                    let marks = vec!["?"; values.len()].join(", ");
                    clauses.push(format!("{} IN ({})", column, marks));
                    for value in values {
                        params.push(json_to_sql(column, value)?);
                    }
                }
            }
            Filter::Search { columns, term } => {
                let pattern = format!("%{}%", term.to_lowercase());
                let parts: Vec<String> = columns
                    .iter()
                    .map(|c| format!("LOWER({}) LIKE ?", c))
                    .collect();
                clauses.push(format!("({})", parts.join(" OR ")));
                for _ in columns {
                    params.push(SqlValue::Text(pattern.clone()));
                }
            }
        }
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    Ok((sql, params))
}

/// Map a SQLite row to a JSON object. Booleans come back as integers and are
/// normalized by the transform layer.
fn row_to_json(
    row: &rusqlite::Row<'_>,
    columns: &[String],
) -> std::result::Result<Value, StorageError> {
    let mut obj = Map::new();
    for (i, name) in columns.iter().enumerate() {
        let value = match row.get_ref(i).map_err(query_err)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::Number(n.into()),
            ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => Value::Null,
        };
        obj.insert(name.clone(), value);
    }
    Ok(Value::Object(obj))
}

fn select_rows(
    conn: &Connection,
    table: Table,
    filters: &[Filter],
    order: Option<&Order>,
    limit: Option<u32>,
) -> std::result::Result<Vec<Value>, StorageError> {
    let (where_clause, params) = build_where(filters)?;
    let mut sql = format!("SELECT * FROM {}{}", table.name(), where_clause);

    if let Some(order) = order {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            order.column,
            if order.ascending { "ASC" } else { "DESC" }
        ));
    }
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql).map_err(query_err)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let params_refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

    let mut rows = stmt.query(params_refs.as_slice()).map_err(query_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(query_err)? {
        out.push(row_to_json(row, &columns)?);
    }
    Ok(out)
}

/// Require a JSON object and return its map.
fn as_object(row: &Value) -> std::result::Result<&Map<String, Value>, StorageError> {
    row.as_object()
        .ok_or_else(|| StorageError::Write("row payload is not an object".to_string()))
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> std::result::Result<Vec<Value>, StorageError> {
        let conn = self.conn.lock().unwrap();
        select_rows(&conn, table, filters, order, limit)
    }

    async fn count(
        &self,
        table: Table,
        filters: &[Filter],
    ) -> std::result::Result<u64, StorageError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = build_where(filters)?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", table.name(), where_clause);
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let count: i64 = conn
            .query_row(&sql, params_refs.as_slice(), |row| row.get(0))
            .map_err(query_err)?;
        Ok(count as u64)
    }

    async fn insert(&self, table: Table, row: Value) -> std::result::Result<Value, StorageError> {
        let conn = self.conn.lock().unwrap();
        let obj = as_object(&row)?;

        let pk = table.primary_key();
        let key = obj
            .get(pk)
            .cloned()
            .ok_or_else(|| StorageError::Write(format!("insert row missing {}", pk)))?;

        let columns: Vec<&String> = obj.keys().collect();
        let mut params: Vec<SqlValue> = Vec::with_capacity(columns.len());
        for (column, value) in obj {
            params.push(json_to_sql(column, value)?);
        }

        let column_list = columns
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name(),
            column_list,
            marks
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        conn.execute(&sql, params_refs.as_slice()).map_err(write_err)?;

        // Return the stored row, not the payload.
        let stored = select_rows(&conn, table, &[Filter::Eq(pk, key)], None, Some(1))?;
        stored
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Write("inserted row not found".to_string()))
    }

    async fn update(
        &self,
        table: Table,
        changes: Value,
        key: Filter,
    ) -> std::result::Result<Value, StorageError> {
        let conn = self.conn.lock().unwrap();
        let obj = as_object(&changes)?;

        if obj.is_empty() {
            return Err(StorageError::Write("empty update payload".to_string()));
        }

        let mut sets: Vec<String> = Vec::with_capacity(obj.len());
        let mut params: Vec<SqlValue> = Vec::with_capacity(obj.len());
        for (column, value) in obj {
            sets.push(format!("{} = ?", column));
            params.push(json_to_sql(column, value)?);
        }

        let key_filters = [key];
        let (where_clause, key_params) = build_where(&key_filters)?;
        params.extend(key_params);

        let sql = format!(
            "UPDATE {} SET {}{}",
            table.name(),
            sets.join(", "),
            where_clause
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let updated = conn.execute(&sql, params_refs.as_slice()).map_err(write_err)?;

        if updated == 0 {
            return Err(StorageError::NotFound);
        }

        let stored = select_rows(&conn, table, &key_filters, None, Some(1))?;
        stored.into_iter().next().ok_or(StorageError::NotFound)
    }

    async fn delete(&self, table: Table, key: Filter) -> std::result::Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        let (where_clause, params) = build_where(&[key])?;
        let sql = format!("DELETE FROM {}{}", table.name(), where_clause);
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        // Zero deleted rows is not an error: delete is idempotent.
        conn.execute(&sql, params_refs.as_slice()).map_err(write_err)?;
        Ok(())
    }
}
