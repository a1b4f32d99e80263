// Transcription Engine Module
//
// Split into focused files:
// - types.rs: Segment, TranscriptionResult
// - stream.rs: PCM audio delivery and frame alignment
// - session.rs: per-request decode-session state machine
// - assembler.rs: pure decode-event -> segment aggregation

pub mod assembler;
pub mod session;
pub mod stream;
pub mod types;

pub use assembler::{assemble_segments, TimedEvent};
pub use session::{run_transcription, PartialObserver, TranscribeOptions};
pub use stream::{pcm_bytes_to_samples, AudioStream};
pub use types::{Segment, TranscriptionResult};
