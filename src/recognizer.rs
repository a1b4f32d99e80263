// Recognition capability seam
//
// The core never implements acoustic modeling. An external engine is
// consumed through this chunk-in / event-out contract: a backend loads a
// model directory into a shareable model, a model opens per-request decode
// sessions, and a session turns PCM chunks into PARTIAL/FINAL events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::catalog::CatalogError;

/// Word-level decode detail reported by the engine. All fields except the
/// text are optional; engines without word alignment simply omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordInfo {
    pub text: String,
    pub confidence: Option<f64>,
    /// Start of the word, seconds from the beginning of the request's audio
    pub start: Option<f64>,
    /// End of the word, seconds from the beginning of the request's audio
    pub end: Option<f64>,
}

/// One recognized span confirmed at an utterance boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalEvent {
    pub text: String,
    pub words: Vec<WordInfo>,
}

/// What a decode session produced for one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// An utterance boundary was reached
    Final(FinalEvent),
    /// Tentative hypothesis for live feedback, excluded from the transcript
    Partial(String),
}

/// Error types for model loading
#[derive(Debug, Clone)]
pub enum LoadError {
    /// The descriptor exists but the model is not downloaded/installed
    ModelNotAvailable(String),
    /// The external engine failed to load the model directory
    Backend(String),
    /// Catalog lookup failed
    Catalog(CatalogError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::ModelNotAvailable(msg) => write!(f, "Model not available: {}", msg),
            LoadError::Backend(msg) => write!(f, "Model load failed: {}", msg),
            LoadError::Catalog(err) => write!(f, "Model load failed: {}", err),
        }
    }
}

impl std::error::Error for LoadError {}

/// Error types for decode sessions
#[derive(Debug, Clone)]
pub enum DecodeError {
    /// Session construction failed
    Session(String),
    /// The engine rejected or failed on a chunk
    Decode(String),
    /// PCM bytes were not aligned to whole 16-bit samples
    MisalignedAudio { byte_len: usize },
    /// The request was cancelled by the caller
    Cancelled,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Session(msg) => write!(f, "Decode session failed: {}", msg),
            DecodeError::Decode(msg) => write!(f, "Decode failed: {}", msg),
            DecodeError::MisalignedAudio { byte_len } => write!(
                f,
                "Decode failed: {} PCM bytes do not align to 16-bit samples",
                byte_len
            ),
            DecodeError::Cancelled => write!(f, "Decode cancelled"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A request-private decode session. Chunks must arrive strictly in
/// temporal order; chunk N's decode state depends on chunk N-1, so one
/// session is never shared or fed concurrently.
pub trait DecodeSession: Send {
    /// Feed one fixed-size PCM chunk.
    fn accept_chunk(&mut self, samples: &[i16]) -> Result<DecodeOutcome, DecodeError>;

    /// Flush trailing audio that was not closed by a natural boundary.
    fn finalize(&mut self) -> Result<Option<FinalEvent>, DecodeError>;
}

/// A loaded model. Shared read-only across concurrent requests; never
/// mutated after load.
pub trait RecognitionModel: Send + Sync {
    /// Open a fresh decode session. Sessions carry prior-utterance context,
    /// so each request gets its own.
    fn new_session(&self, sample_rate: u32) -> Result<Box<dyn DecodeSession>, DecodeError>;
}

/// Factory for loaded models, backed by an external recognition engine.
pub trait RecognitionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Load an installed model directory into memory.
    fn load_model(&self, model_dir: &Path) -> Result<Arc<dyn RecognitionModel>, LoadError>;
}
