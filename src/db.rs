//! Relational store plumbing shared by the stg, dds and cdm repositories
//!
//! The three logical schemas map to table-name prefixes in one SQLite file:
//! - `stg_*` - append-only raw order events
//! - `dds_*` - data vault hubs, links and satellites
//! - `cdm_*` - counter marts
//!
//! Schema DDL lives in `/sql/*.sql` and is applied by [`run_schema_migrations`].

use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// One connection shared by every repository of a process.
///
/// Each repository call locks it for the duration of a single statement (or,
/// for the vault, a single per-order transaction).
pub type SharedConnection = Arc<Mutex<Connection>>;

#[derive(Debug)]
pub enum RepositoryError {
    Database(rusqlite::Error),
    Io(std::io::Error),
    Serialization(serde_json::Error),
    SchemaNotFound(String),
    LockPoisoned,
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        RepositoryError::Database(err)
    }
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Io(err)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err)
    }
}

impl std::fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepositoryError::Database(e) => write!(f, "Database error: {}", e),
            RepositoryError::Io(e) => write!(f, "IO error: {}", e),
            RepositoryError::Serialization(e) => write!(f, "Serialization error: {}", e),
            RepositoryError::SchemaNotFound(dir) => {
                write!(f, "Schema directory not found: {}", dir)
            }
            RepositoryError::LockPoisoned => write!(f, "Database connection lock poisoned"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Lock the shared connection, mapping a poisoned lock to an error.
pub fn lock(
    conn: &SharedConnection,
) -> Result<std::sync::MutexGuard<'_, Connection>, RepositoryError> {
    conn.lock().map_err(|_| RepositoryError::LockPoisoned)
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir`, sorted by file name (00_, 01_, ...),
/// and executes each as a batch. Every file uses `IF NOT EXISTS`, so running the
/// migrations on an existing database is a no-op.
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: &str,
) -> Result<(), RepositoryError> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(RepositoryError::SchemaNotFound(schema_dir.to_string()));
    }

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::debug!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

/// Open (or create) the pipeline database, tune it, and apply the schema.
pub fn open_database(db_path: &str, schema_dir: &str) -> Result<SharedConnection, RepositoryError> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut conn = Connection::open(db_path)?;
    apply_optimized_pragmas(&conn)?;
    run_schema_migrations(&mut conn, schema_dir)?;

    log::info!("✅ SQLite database ready: {}", db_path);

    Ok(Arc::new(Mutex::new(conn)))
}

/// Bind a JSON scalar with its natural SQLite storage class.
pub fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
