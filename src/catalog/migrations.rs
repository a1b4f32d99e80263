// Catalog schema migrations
// Creates and updates the catalog database schema

use rusqlite::Connection;

use super::descriptor::CatalogError;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<(), CatalogError> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32, CatalogError> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CatalogError> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// v1: schema_version bookkeeping and the models table
fn migrate_v1(conn: &Connection) -> Result<(), CatalogError> {
    log::info!("Running catalog migration v1");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            language_code TEXT NOT NULL,
            language_name TEXT NOT NULL,
            variant TEXT NOT NULL,
            source_url TEXT NOT NULL,
            expected_size INTEGER NOT NULL,
            downloaded INTEGER NOT NULL DEFAULT 0,
            local_path TEXT,
            accuracy_estimate REAL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    set_schema_version(conn, 1)
}

/// v2: index for the active/downloaded listing filters
fn migrate_v2(conn: &Connection) -> Result<(), CatalogError> {
    log::info!("Running catalog migration v2");

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_models_flags ON models (active, downloaded)",
        [],
    )?;

    set_schema_version(conn, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
