//! Schema versioning over the `schema_meta` key/value table.
//!
//! `schema_meta` pins three facts about a database: its schema version, the
//! embedding dimension its vec0 table was created with, and the identifier
//! of the model that produced the stored vectors. Migrations move the
//! version forward only; a database is never downgraded.

use rusqlite::{Connection, OptionalExtension};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Read one `schema_meta` value, `None` if the key was never written.
fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get(0),
    )
    .optional()
}

/// Write (or overwrite) one `schema_meta` value.
fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(read_meta(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// The embedding dimension this database was created with.
pub fn get_vector_dimensions(conn: &Connection) -> rusqlite::Result<Option<usize>> {
    Ok(read_meta(conn, "vector_dimensions")?.and_then(|v| v.parse().ok()))
}

/// Identifier of the model that produced the stored vectors, if recorded.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    read_meta(conn, "embedding_model")
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    write_meta(conn, "embedding_model", model)
}

/// Bring the database up to [`CURRENT_SCHEMA_VERSION`]. There are no
/// intermediate migrations yet, so this only stamps fresh databases.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let version = get_schema_version(conn)?;
    if version < CURRENT_SCHEMA_VERSION {
        tracing::info!(from = version, to = CURRENT_SCHEMA_VERSION, "stamping schema version");
        write_meta(conn, "schema_version", &CURRENT_SCHEMA_VERSION.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::db::schema::init_schema(&conn, 8).unwrap();
        conn
    }

    #[test]
    fn fresh_db_is_at_current_version() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = test_db();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap(); // second call should not error
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn vector_dimensions_readable() {
        let conn = test_db();
        assert_eq!(get_vector_dimensions(&conn).unwrap(), Some(8));
    }

    #[test]
    fn set_and_get_embedding_model() {
        let conn = test_db();
        assert!(get_embedding_model(&conn).unwrap().is_none());
        set_embedding_model(&conn, "nomic-embed-text:latest").unwrap();
        assert_eq!(
            get_embedding_model(&conn).unwrap(),
            Some("nomic-embed-text:latest".to_string())
        );
    }

    #[test]
    fn meta_values_overwrite() {
        let conn = test_db();
        write_meta(&conn, "embedding_model", "first").unwrap();
        write_meta(&conn, "embedding_model", "second").unwrap();
        assert_eq!(
            read_meta(&conn, "embedding_model").unwrap().as_deref(),
            Some("second")
        );
    }
}
