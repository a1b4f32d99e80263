// Catalog store
// Owns the SQLite connection behind the model descriptor registry

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::descriptor::CatalogError;
use super::migrations;

/// Durable registry of model descriptors.
///
/// All per-id mutations go through the single connection mutex, so writers
/// are serialized and readers never observe a half-written descriptor.
pub struct CatalogStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl CatalogStore {
    /// Open (or create) the catalog at the given path and migrate its schema.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Storage(format!("Failed to create catalog directory: {}", e)))?;
        }

        let conn = Connection::open(&db_path)?;
        migrations::run_migrations(&conn)?;

        log::info!("Catalog initialized at: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Execute a function with access to the database connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<T, CatalogError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CatalogError::Storage(format!("Failed to lock catalog connection: {}", e)))?;
        f(&conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_database_file() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("catalog.db");

        let store = CatalogStore::open(&db_path).unwrap();
        assert!(db_path.exists());

        store
            .with_connection(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM models", [], |row| row.get(0))
                    .map_err(CatalogError::from)?;
                assert_eq!(count, 0);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("deeper").join("catalog.db");

        CatalogStore::open(&db_path).unwrap();
        assert!(db_path.exists());
    }
}
