// Service facade
//
// Transport-agnostic outbound operations over the speech core. HTTP, CLI,
// or RPC bindings consume `SpeechOps`; this module owns the wiring of
// catalog -> fetcher -> cache -> engine and nothing else.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::ModelCache;
use crate::catalog::{CatalogError, CatalogFilter, CatalogStore, ModelDescriptor, ModelVariant};
use crate::config::ServiceConfig;
use crate::engine::{run_transcription, AudioStream, TranscribeOptions, TranscriptionResult};
use crate::fetcher::{FetchError, FetchOutcome, ModelFetcher, ProgressCallback};
use crate::recognizer::{DecodeError, LoadError, RecognitionBackend};

/// Service-level error taxonomy. Callers branch on the kind, not on
/// message text; messages name the failing phase.
#[derive(Debug, Clone)]
pub enum SpeechError {
    /// Unknown model id
    NotFound(String),
    /// Registration clashed with an existing id
    DuplicateId(String),
    /// Download or install failed
    Fetch(FetchError),
    /// The model is not downloaded, or failed to load
    ModelNotAvailable(String),
    /// The decode session failed
    Decode(DecodeError),
    /// A configured resource cap was exceeded
    ResourceExhausted(String),
    /// Catalog or filesystem bookkeeping failed
    Storage(String),
}

impl fmt::Display for SpeechError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeechError::NotFound(id) => write!(f, "Model not found: {}", id),
            SpeechError::DuplicateId(id) => write!(f, "Model id already registered: {}", id),
            SpeechError::Fetch(err) => write!(f, "{}", err),
            SpeechError::ModelNotAvailable(msg) => write!(f, "Model not available: {}", msg),
            SpeechError::Decode(err) => write!(f, "{}", err),
            SpeechError::ResourceExhausted(msg) => write!(f, "Resource exhausted: {}", msg),
            SpeechError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for SpeechError {}

impl From<CatalogError> for SpeechError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => SpeechError::NotFound(id),
            CatalogError::DuplicateId(id) => SpeechError::DuplicateId(id),
            CatalogError::Storage(msg) => SpeechError::Storage(msg),
        }
    }
}

impl From<FetchError> for SpeechError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::ResourceExhausted(msg) => SpeechError::ResourceExhausted(msg),
            FetchError::Catalog(catalog_err) => catalog_err.into(),
            other => SpeechError::Fetch(other),
        }
    }
}

impl From<LoadError> for SpeechError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::ModelNotAvailable(msg) => SpeechError::ModelNotAvailable(msg),
            LoadError::Backend(msg) => {
                SpeechError::ModelNotAvailable(format!("model failed to load: {}", msg))
            }
            LoadError::Catalog(catalog_err) => catalog_err.into(),
        }
    }
}

impl From<DecodeError> for SpeechError {
    fn from(err: DecodeError) -> Self {
        SpeechError::Decode(err)
    }
}

/// Point-in-time view of one model across catalog, fetcher, and cache
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatusReport {
    pub id: String,
    pub language_code: String,
    pub language_name: String,
    pub variant: ModelVariant,
    pub downloaded: bool,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_estimate: Option<f64>,
    /// A loaded handle is resident in the cache
    pub loaded: bool,
    /// A fetch for this model is currently running
    pub download_in_flight: bool,
}

/// The outbound operation surface. Binding it to HTTP/CLI/RPC is an
/// external concern.
#[async_trait]
pub trait SpeechOps: Send + Sync {
    async fn list_models(&self, filter: CatalogFilter) -> Result<Vec<ModelDescriptor>, SpeechError>;

    async fn download_model(&self, model_id: &str) -> Result<FetchOutcome, SpeechError>;

    async fn transcribe(
        &self,
        model_id: &str,
        audio: AudioStream,
    ) -> Result<TranscriptionResult, SpeechError>;

    async fn delete_model(&self, model_id: &str) -> Result<ModelDescriptor, SpeechError>;

    async fn model_status(&self, model_id: &str) -> Result<ModelStatusReport, SpeechError>;
}

pub struct SpeechService {
    config: ServiceConfig,
    catalog: Arc<CatalogStore>,
    fetcher: ModelFetcher,
    cache: Arc<ModelCache>,
}

impl SpeechService {
    /// Open the catalog (seeding the built-in models on first run) and wire
    /// the fetcher and cache around the given recognition backend.
    pub fn new(
        config: ServiceConfig,
        backend: Arc<dyn RecognitionBackend>,
    ) -> Result<Self, SpeechError> {
        std::fs::create_dir_all(&config.models_dir)
            .map_err(|e| SpeechError::Storage(format!("Failed to create models directory: {}", e)))?;

        let catalog = Arc::new(CatalogStore::open(&config.catalog_path)?);
        catalog.seed_builtin()?;

        let fetcher = ModelFetcher::new(&config, catalog.clone());
        let cache = Arc::new(ModelCache::new(catalog.clone(), backend));

        log::info!(
            "Speech service ready (models dir: {})",
            config.models_dir.display()
        );

        Ok(Self {
            config,
            catalog,
            fetcher,
            cache,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<ModelCache> {
        &self.cache
    }

    /// Download with a progress observer; otherwise identical to
    /// `SpeechOps::download_model`.
    pub async fn download_model_with_progress(
        &self,
        model_id: &str,
        progress: ProgressCallback,
    ) -> Result<FetchOutcome, SpeechError> {
        Ok(self.fetcher.download(model_id, Some(progress)).await?)
    }

    /// Transcribe with explicit cancellation and partial-event observation.
    pub async fn transcribe_with_options(
        &self,
        model_id: &str,
        audio: AudioStream,
        options: TranscribeOptions,
    ) -> Result<TranscriptionResult, SpeechError> {
        let model = self.cache.get_or_load(model_id).await?;
        let result = run_transcription(&model, audio, &self.config, options).await?;
        Ok(result)
    }
}

#[async_trait]
impl SpeechOps for SpeechService {
    async fn list_models(&self, filter: CatalogFilter) -> Result<Vec<ModelDescriptor>, SpeechError> {
        Ok(self.catalog.list(filter)?)
    }

    async fn download_model(&self, model_id: &str) -> Result<FetchOutcome, SpeechError> {
        Ok(self.fetcher.download(model_id, None).await?)
    }

    async fn transcribe(
        &self,
        model_id: &str,
        audio: AudioStream,
    ) -> Result<TranscriptionResult, SpeechError> {
        self.transcribe_with_options(model_id, audio, TranscribeOptions::default())
            .await
    }

    async fn delete_model(&self, model_id: &str) -> Result<ModelDescriptor, SpeechError> {
        let descriptor = self.catalog.get(model_id)?;
        if !descriptor.downloaded {
            return Err(SpeechError::ModelNotAvailable(format!(
                "model {} is not downloaded",
                model_id
            )));
        }

        // Catalog first: observers see downloaded=false immediately, while
        // in-flight requests finish on the handles they already hold.
        self.catalog.mark_deleted(model_id)?;
        self.cache.evict(model_id);

        if let Some(path) = descriptor.local_path {
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                log::warn!(
                    "Failed to remove model directory {}: {}",
                    path.display(),
                    e
                );
            }
        }

        log::info!("Model {} deleted", model_id);
        Ok(self.catalog.get(model_id)?)
    }

    async fn model_status(&self, model_id: &str) -> Result<ModelStatusReport, SpeechError> {
        let descriptor = self.catalog.get(model_id)?;
        Ok(ModelStatusReport {
            loaded: self.cache.is_loaded(model_id),
            download_in_flight: self.fetcher.is_in_flight(model_id),
            id: descriptor.id,
            language_code: descriptor.language_code,
            language_name: descriptor.language_name,
            variant: descriptor.variant,
            downloaded: descriptor.downloaded,
            active: descriptor.active,
            local_path: descriptor.local_path,
            accuracy_estimate: descriptor.accuracy_estimate,
        })
    }
}
