// Model cache
//
// Process-wide table of loaded model handles. The cache is an explicit
// object constructed once and passed by injection; its load path is the one
// synchronization point that collapses concurrent first-time loads into a
// single backend load.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::catalog::CatalogStore;
use crate::recognizer::{DecodeError, DecodeSession, LoadError, RecognitionBackend, RecognitionModel};

/// A loaded recognition model. Shared read-only by every concurrent request
/// and never mutated after load; holders keep it alive independently of
/// cache membership, so eviction or deletion cannot fail an in-flight
/// request.
pub struct LoadedModel {
    id: String,
    language_code: String,
    dir: PathBuf,
    model: Arc<dyn RecognitionModel>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("id", &self.id)
            .field("language_code", &self.language_code)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl LoadedModel {
    pub(crate) fn new(
        id: String,
        language_code: String,
        dir: PathBuf,
        model: Arc<dyn RecognitionModel>,
    ) -> Self {
        Self {
            id,
            language_code,
            dir,
            model,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Open a fresh, request-private decode session on this model.
    pub fn new_session(&self, sample_rate: u32) -> Result<Box<dyn DecodeSession>, DecodeError> {
        self.model.new_session(sample_rate)
    }
}

type Slot = Arc<Mutex<Option<Arc<LoadedModel>>>>;

pub struct ModelCache {
    catalog: Arc<CatalogStore>,
    backend: Arc<dyn RecognitionBackend>,
    slots: DashMap<String, Slot>,
}

impl ModelCache {
    pub fn new(catalog: Arc<CatalogStore>, backend: Arc<dyn RecognitionBackend>) -> Self {
        Self {
            catalog,
            backend,
            slots: DashMap::new(),
        }
    }

    /// Return the cached handle for the model, loading it first if needed.
    ///
    /// Concurrent callers for the same unloaded id serialize on the per-id
    /// slot, so exactly one backend load runs and everyone receives the same
    /// handle.
    pub async fn get_or_load(&self, model_id: &str) -> Result<Arc<LoadedModel>, LoadError> {
        let slot = self
            .slots
            .entry(model_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = slot.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }

        let descriptor = self.catalog.get(model_id).map_err(LoadError::Catalog)?;

        if !descriptor.downloaded {
            return Err(LoadError::ModelNotAvailable(format!(
                "model {} is not downloaded",
                model_id
            )));
        }

        let dir = descriptor.local_path.ok_or_else(|| {
            LoadError::ModelNotAvailable(format!(
                "model {} has no install directory recorded",
                model_id
            ))
        })?;

        let non_empty = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false);
        if !non_empty {
            return Err(LoadError::ModelNotAvailable(format!(
                "model directory {} is missing or empty",
                dir.display()
            )));
        }

        log::info!(
            "Loading model {} from {} via {} backend",
            model_id,
            dir.display(),
            self.backend.name()
        );

        let backend = self.backend.clone();
        let load_dir = dir.clone();
        let model = tokio::task::spawn_blocking(move || backend.load_model(&load_dir))
            .await
            .map_err(|e| LoadError::Backend(format!("load task failed: {}", e)))??;

        let handle = Arc::new(LoadedModel::new(
            model_id.to_string(),
            descriptor.language_code,
            dir,
            model,
        ));

        *guard = Some(handle.clone());
        log::info!("Model {} loaded and cached", model_id);
        Ok(handle)
    }

    /// Drop the cache entry immediately. Requests already holding the
    /// handle finish normally; the next `get_or_load` reloads from scratch.
    pub fn evict(&self, model_id: &str) -> bool {
        let evicted = self.slots.remove(model_id).is_some();
        if evicted {
            log::info!("Evicted model {} from cache", model_id);
        }
        evicted
    }

    /// Whether a loaded handle is currently resident for the id
    pub fn is_loaded(&self, model_id: &str) -> bool {
        match self.slots.get(model_id) {
            // A held lock means a load is still in progress
            Some(slot) => slot.try_lock().map(|guard| guard.is_some()).unwrap_or(false),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogError, ModelVariant, NewDescriptor};
    use crate::recognizer::{DecodeOutcome, FinalEvent};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct NullSession;

    impl DecodeSession for NullSession {
        fn accept_chunk(&mut self, _samples: &[i16]) -> Result<DecodeOutcome, DecodeError> {
            Ok(DecodeOutcome::Partial(String::new()))
        }

        fn finalize(&mut self) -> Result<Option<FinalEvent>, DecodeError> {
            Ok(None)
        }
    }

    struct NullModel;

    impl RecognitionModel for NullModel {
        fn new_session(&self, _sample_rate: u32) -> Result<Box<dyn DecodeSession>, DecodeError> {
            Ok(Box::new(NullSession))
        }
    }

    /// Backend that counts loads and optionally stalls to widen races
    struct CountingBackend {
        loads: AtomicUsize,
        load_delay_ms: u64,
    }

    impl CountingBackend {
        fn new(load_delay_ms: u64) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                load_delay_ms,
            }
        }
    }

    impl RecognitionBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn load_model(&self, _model_dir: &Path) -> Result<Arc<dyn RecognitionModel>, LoadError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.load_delay_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(self.load_delay_ms));
            }
            Ok(Arc::new(NullModel))
        }
    }

    fn installed_model(dir: &tempfile::TempDir, id: &str) -> Arc<CatalogStore> {
        let catalog = Arc::new(CatalogStore::open(dir.path().join("catalog.db")).unwrap());
        catalog
            .register(&NewDescriptor {
                id: id.to_string(),
                language_code: "en-US".to_string(),
                language_name: "English (US)".to_string(),
                variant: ModelVariant::Small,
                source_url: "https://models.example.com/en-small.tar.gz".to_string(),
                expected_size: 1024,
                accuracy_estimate: None,
            })
            .unwrap();

        let model_dir = dir.path().join("models").join(id);
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("final.mdl"), b"acoustic data").unwrap();
        catalog.mark_downloaded(id, &model_dir).unwrap();
        catalog
    }

    #[tokio::test]
    async fn concurrent_requests_trigger_exactly_one_load() {
        let dir = tempdir().unwrap();
        let catalog = installed_model(&dir, "en-small");
        let backend = Arc::new(CountingBackend::new(20));
        let cache = Arc::new(ModelCache::new(catalog, backend.clone()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(
                async move { cache.get_or_load("en-small").await },
            ));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap().unwrap());
        }

        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
        for pair in handles.windows(2) {
            assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        }
    }

    #[tokio::test]
    async fn not_downloaded_model_is_unavailable() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(CatalogStore::open(dir.path().join("catalog.db")).unwrap());
        catalog
            .register(&NewDescriptor {
                id: "en-small".to_string(),
                language_code: "en-US".to_string(),
                language_name: "English (US)".to_string(),
                variant: ModelVariant::Small,
                source_url: "https://models.example.com/en-small.tar.gz".to_string(),
                expected_size: 1024,
                accuracy_estimate: None,
            })
            .unwrap();

        let cache = ModelCache::new(catalog, Arc::new(CountingBackend::new(0)));
        let err = cache.get_or_load("en-small").await.unwrap_err();
        assert!(matches!(err, LoadError::ModelNotAvailable(_)));
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let catalog = Arc::new(CatalogStore::open(dir.path().join("catalog.db")).unwrap());
        let cache = ModelCache::new(catalog, Arc::new(CountingBackend::new(0)));

        let err = cache.get_or_load("missing").await.unwrap_err();
        assert!(matches!(
            err,
            LoadError::Catalog(CatalogError::NotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn evict_forces_a_reload_without_breaking_holders() {
        let dir = tempdir().unwrap();
        let catalog = installed_model(&dir, "en-small");
        let backend = Arc::new(CountingBackend::new(0));
        let cache = ModelCache::new(catalog, backend.clone());

        let held = cache.get_or_load("en-small").await.unwrap();
        assert!(cache.is_loaded("en-small"));

        assert!(cache.evict("en-small"));
        assert!(!cache.is_loaded("en-small"));

        // The held handle is still alive and usable
        assert!(held.new_session(16_000).is_ok());

        let reloaded = cache.get_or_load("en-small").await.unwrap();
        assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&held, &reloaded));
    }

    #[tokio::test]
    async fn evicting_an_absent_entry_is_a_no_op() {
        let dir = tempdir().unwrap();
        let catalog = installed_model(&dir, "en-small");
        let cache = ModelCache::new(catalog, Arc::new(CountingBackend::new(0)));

        assert!(!cache.evict("en-small"));
    }
}
