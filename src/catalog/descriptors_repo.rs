// Descriptor repository
// CRUD operations for model descriptors

use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::descriptor::{CatalogError, CatalogFilter, ModelDescriptor, ModelVariant, NewDescriptor};
use super::store::CatalogStore;

impl CatalogStore {
    /// Register a new descriptor. Fails with `DuplicateId` if the id exists.
    pub fn register(&self, new: &NewDescriptor) -> Result<ModelDescriptor, CatalogError> {
        self.with_connection(|conn| register_impl(conn, new))
    }

    /// Fetch one descriptor by id. Fails with `NotFound` for unknown ids.
    pub fn get(&self, id: &str) -> Result<ModelDescriptor, CatalogError> {
        self.with_connection(|conn| get_impl(conn, id))
    }

    /// List descriptors matching the filter, ordered by id.
    pub fn list(&self, filter: CatalogFilter) -> Result<Vec<ModelDescriptor>, CatalogError> {
        self.with_connection(|conn| list_impl(conn, filter))
    }

    /// Record a completed install: set the downloaded flag and local path.
    pub fn mark_downloaded(&self, id: &str, local_path: &Path) -> Result<(), CatalogError> {
        self.with_connection(|conn| mark_downloaded_impl(conn, id, local_path))
    }

    /// Record a deletion: clear the downloaded flag and local path. The
    /// descriptor itself stays registered.
    pub fn mark_deleted(&self, id: &str) -> Result<(), CatalogError> {
        self.with_connection(|conn| mark_deleted_impl(conn, id))
    }
}

fn register_impl(conn: &Connection, new: &NewDescriptor) -> Result<ModelDescriptor, CatalogError> {
    let now = Utc::now().to_rfc3339();

    let result = conn.execute(
        "INSERT INTO models (
            id, language_code, language_name, variant, source_url,
            expected_size, downloaded, local_path, accuracy_estimate, active,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, 1, ?8, ?8)",
        params![
            new.id,
            new.language_code,
            new.language_name,
            new.variant.as_str(),
            new.source_url,
            new.expected_size as i64,
            new.accuracy_estimate,
            now,
        ],
    );

    match result {
        Ok(_) => get_impl(conn, &new.id),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(CatalogError::DuplicateId(new.id.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

fn get_impl(conn: &Connection, id: &str) -> Result<ModelDescriptor, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, language_code, language_name, variant, source_url,
                expected_size, downloaded, local_path, accuracy_estimate, active,
                created_at, updated_at
         FROM models WHERE id = ?1",
    )?;

    match stmt.query_row(params![id], row_to_descriptor) {
        Ok(descriptor) => Ok(descriptor),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(CatalogError::NotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

fn list_impl(conn: &Connection, filter: CatalogFilter) -> Result<Vec<ModelDescriptor>, CatalogError> {
    let sql = match filter {
        CatalogFilter::All => {
            "SELECT id, language_code, language_name, variant, source_url,
                    expected_size, downloaded, local_path, accuracy_estimate, active,
                    created_at, updated_at
             FROM models ORDER BY id"
        }
        CatalogFilter::Active => {
            "SELECT id, language_code, language_name, variant, source_url,
                    expected_size, downloaded, local_path, accuracy_estimate, active,
                    created_at, updated_at
             FROM models WHERE active = 1 ORDER BY id"
        }
        CatalogFilter::Downloaded => {
            "SELECT id, language_code, language_name, variant, source_url,
                    expected_size, downloaded, local_path, accuracy_estimate, active,
                    created_at, updated_at
             FROM models WHERE active = 1 AND downloaded = 1 ORDER BY id"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], row_to_descriptor)?;

    let mut descriptors = Vec::new();
    for row in rows {
        descriptors.push(row?);
    }
    Ok(descriptors)
}

fn mark_downloaded_impl(conn: &Connection, id: &str, local_path: &Path) -> Result<(), CatalogError> {
    let now = Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE models SET downloaded = 1, local_path = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, local_path.display().to_string(), now],
    )?;

    if updated == 0 {
        return Err(CatalogError::NotFound(id.to_string()));
    }
    Ok(())
}

fn mark_deleted_impl(conn: &Connection, id: &str) -> Result<(), CatalogError> {
    let now = Utc::now().to_rfc3339();
    let updated = conn.execute(
        "UPDATE models SET downloaded = 0, local_path = NULL, updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;

    if updated == 0 {
        return Err(CatalogError::NotFound(id.to_string()));
    }
    Ok(())
}

fn row_to_descriptor(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModelDescriptor> {
    let variant_text: String = row.get(3)?;
    let variant = ModelVariant::parse(&variant_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown model variant: {}", variant_text).into(),
        )
    })?;

    let downloaded: i64 = row.get(6)?;
    let active: i64 = row.get(9)?;
    let local_path: Option<String> = row.get(7)?;
    let expected_size: i64 = row.get(5)?;

    Ok(ModelDescriptor {
        id: row.get(0)?,
        language_code: row.get(1)?,
        language_name: row.get(2)?,
        variant,
        source_url: row.get(4)?,
        expected_size: expected_size as u64,
        downloaded: downloaded != 0,
        local_path: local_path.map(PathBuf::from),
        accuracy_estimate: row.get(8)?,
        active: active != 0,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(dir: &tempfile::TempDir) -> CatalogStore {
        CatalogStore::open(dir.path().join("catalog.db")).unwrap()
    }

    fn sample_descriptor(id: &str) -> NewDescriptor {
        NewDescriptor {
            id: id.to_string(),
            language_code: "en-US".to_string(),
            language_name: "English (US)".to_string(),
            variant: ModelVariant::Small,
            source_url: format!("https://models.example.com/{}.tar.gz", id),
            expected_size: 40 * 1024 * 1024,
            accuracy_estimate: Some(0.92),
        }
    }

    #[test]
    fn register_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let registered = store.register(&sample_descriptor("en-small")).unwrap();
        assert!(!registered.downloaded);
        assert!(registered.active);
        assert!(registered.local_path.is_none());

        let fetched = store.get("en-small").unwrap();
        assert_eq!(fetched.language_code, "en-US");
        assert_eq!(fetched.variant, ModelVariant::Small);
        assert_eq!(fetched.expected_size, 40 * 1024 * 1024);
    }

    #[test]
    fn register_duplicate_id_is_rejected() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.register(&sample_descriptor("en-small")).unwrap();
        let err = store.register(&sample_descriptor("en-small")).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId(id) if id == "en-small"));
    }

    #[test]
    fn get_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let err = store.get("missing").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn mark_downloaded_and_deleted_flip_flags() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);
        store.register(&sample_descriptor("en-small")).unwrap();

        store
            .mark_downloaded("en-small", Path::new("/data/models/en-small"))
            .unwrap();
        let downloaded = store.get("en-small").unwrap();
        assert!(downloaded.downloaded);
        assert_eq!(
            downloaded.local_path.as_deref(),
            Some(Path::new("/data/models/en-small"))
        );

        store.mark_deleted("en-small").unwrap();
        let deleted = store.get("en-small").unwrap();
        assert!(!deleted.downloaded);
        assert!(deleted.local_path.is_none());
    }

    #[test]
    fn mark_operations_on_unknown_id_are_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let err = store
            .mark_downloaded("missing", Path::new("/tmp/x"))
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let err = store.mark_deleted("missing").unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[test]
    fn list_filters_by_flags() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.register(&sample_descriptor("de-small")).unwrap();
        store.register(&sample_descriptor("en-small")).unwrap();
        store
            .mark_downloaded("en-small", Path::new("/data/models/en-small"))
            .unwrap();

        let all = store.list(CatalogFilter::All).unwrap();
        assert_eq!(all.len(), 2);
        // Ordered by id
        assert_eq!(all[0].id, "de-small");
        assert_eq!(all[1].id, "en-small");

        let downloaded = store.list(CatalogFilter::Downloaded).unwrap();
        assert_eq!(downloaded.len(), 1);
        assert_eq!(downloaded[0].id, "en-small");
    }
}
