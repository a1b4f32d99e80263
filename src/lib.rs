// VoxTailor speech core
//
// Coordinates the lifecycle of downloadable recognition models (catalog,
// fetch, atomic install, in-process cache) and a streaming transcription
// pipeline over an external recognition engine. Transport bindings and UI
// live elsewhere; they consume the `SpeechOps` surface.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod macros;
pub mod recognizer;
pub mod service;

pub use cache::{LoadedModel, ModelCache};
pub use catalog::{
    CatalogError, CatalogFilter, CatalogStore, ModelDescriptor, ModelVariant, NewDescriptor,
};
pub use config::ServiceConfig;
pub use engine::{AudioStream, Segment, TranscribeOptions, TranscriptionResult};
pub use fetcher::{DownloadProgress, FetchError, FetchOutcome, ModelFetcher};
pub use recognizer::{
    DecodeError, DecodeOutcome, DecodeSession, FinalEvent, LoadError, RecognitionBackend,
    RecognitionModel, WordInfo,
};
pub use service::{ModelStatusReport, SpeechError, SpeechOps, SpeechService};
