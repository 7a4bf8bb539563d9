//! Database lifecycle: sqlite-vec registration, connection setup, and health
//! reporting.
//!
//! Opening a database wires the vector extension, applies connection
//! pragmas, creates the schema for the configured embedding dimension, and
//! refuses to start against a database pinned to a different dimension.

pub mod migrations;
pub mod schema;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::OnceLock;

static VEC_EXTENSION: OnceLock<()> = OnceLock::new();

/// Register sqlite-vec as an auto-loaded extension for every connection
/// opened afterwards. Idempotent.
pub fn load_sqlite_vec() {
    VEC_EXTENSION.get_or_init(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the database file and bring it to a servable state.
pub fn open_database(path: impl AsRef<Path>, dimensions: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("cannot open database {}", path.display()))?;

    // File-backed databases get WAL so readers don't block the writer.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    prepare_connection(&conn, dimensions)?;

    let pinned = migrations::get_vector_dimensions(&conn)?;
    if let Some(pinned) = pinned {
        if pinned != dimensions {
            bail!(
                "this database stores {pinned}-dimensional embeddings; \
                 refusing to open it with ENGRAM_VECTOR_DIMENSIONS={dimensions}"
            );
        }
    }

    let verdict: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if verdict != "ok" {
        bail!("quick_check reported corruption: {verdict}");
    }

    tracing::info!(path = %path.display(), dimensions, "database initialized");
    Ok(conn)
}

/// Open a throwaway in-memory database. Used by tests and anything that
/// needs engine semantics without a file on disk.
pub fn open_memory_database(dimensions: usize) -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("cannot open in-memory database")?;
    prepare_connection(&conn, dimensions)?;
    Ok(conn)
}

/// Pragmas, schema, and migrations shared by both open paths.
fn prepare_connection(conn: &Connection, dimensions: usize) -> Result<()> {
    conn.pragma_update(None, "busy_timeout", "5000")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(conn, dimensions).context("schema initialization failed")?;
    migrations::run_migrations(conn).context("migration run failed")?;
    Ok(())
}

/// Result of a full database health check.
pub struct HealthReport {
    pub schema_version: u32,
    pub vector_dimensions: Option<usize>,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub sqlite_vec_version: String,
    pub memory_count: i64,
    pub situation_count: i64,
    pub annotation_count: i64,
}

/// Gather schema version, integrity verdict, extension version, and row
/// counts into one report.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity_details: String = conn
        .pragma_query_value(None, "integrity_check", |row| row.get(0))
        .context("integrity check failed to run")?;

    let sqlite_vec_version: String = conn
        .query_row("SELECT vec_version()", [], |row| row.get(0))
        .context("sqlite-vec extension is not loaded")?;

    Ok(HealthReport {
        schema_version: migrations::get_schema_version(conn)?,
        vector_dimensions: migrations::get_vector_dimensions(conn)?,
        integrity_ok: integrity_details == "ok",
        integrity_details,
        sqlite_vec_version,
        memory_count: table_count(conn, "memories"),
        situation_count: table_count(conn, "situations"),
        annotation_count: table_count(conn, "annotations"),
    })
}

fn table_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap_or(0)
}
