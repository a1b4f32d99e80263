// engine/session.rs
//
// Per-request decode-session state machine:
//
//   INIT -> STREAMING -> FINALIZING -> DONE
//
// with FAILED reachable from any state. Each request gets a fresh decode
// session so no prior-utterance context leaks between requests, and decoding
// within a request is strictly sequential: chunk N's state depends on
// chunk N-1.

use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::LoadedModel;
use crate::config::ServiceConfig;
use crate::recognizer::{DecodeError, DecodeOutcome, DecodeSession};
use crate::{perf_debug, perf_trace};

use super::assembler::{assemble_segments, TimedEvent};
use super::stream::AudioStream;
use super::types::TranscriptionResult;

/// Observer for PARTIAL events: live feedback only, never part of the
/// final transcript.
pub type PartialObserver = Box<dyn Fn(&str) + Send + Sync>;

pub struct TranscribeOptions {
    pub cancel: CancellationToken,
    pub on_partial: Option<PartialObserver>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            on_partial: None,
        }
    }
}

/// Drive one transcription request through its decode session.
pub async fn run_transcription(
    model: &LoadedModel,
    mut stream: AudioStream,
    config: &ServiceConfig,
    options: TranscribeOptions,
) -> Result<TranscriptionResult, DecodeError> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();
    let chunk_samples = config.chunk_samples.max(1);

    log::info!(
        "Transcription {} starting for model {} (chunk size {} samples)",
        request_id,
        model.id(),
        chunk_samples
    );

    // INIT
    let sample_rate = stream.sample_rate();
    if sample_rate != config.sample_rate {
        let err = DecodeError::Session(format!(
            "audio stream is {} Hz, engine is configured for {} Hz",
            sample_rate, config.sample_rate
        ));
        return Err(fail(request_id, "init", err));
    }

    let mut session = model
        .new_session(sample_rate)
        .map_err(|e| fail(request_id, "init", e))?;

    // STREAMING: re-chunk incoming frames to the fixed decode chunk size.
    // Frames are whole i16 samples, so chunk boundaries never split one.
    let mut cursor = Cursor {
        session: session.as_mut(),
        sample_rate,
        consumed_samples: 0,
        utterance_start: 0.0,
        events: Vec::new(),
        on_partial: options.on_partial.as_ref(),
        request_id,
    };

    let mut pending: Vec<i16> = Vec::with_capacity(chunk_samples);
    while let Some(frame) = stream.next_frame().await {
        if options.cancel.is_cancelled() {
            return Err(fail(request_id, "streaming", DecodeError::Cancelled));
        }

        pending.extend_from_slice(&frame);
        while pending.len() >= chunk_samples {
            let chunk: Vec<i16> = pending.drain(..chunk_samples).collect();
            cursor
                .feed(&chunk)
                .map_err(|e| fail(request_id, "streaming", e))?;
        }
    }

    if options.cancel.is_cancelled() {
        return Err(fail(request_id, "streaming", DecodeError::Cancelled));
    }

    // Short remainder after the last full chunk
    if !pending.is_empty() {
        let chunk: Vec<i16> = std::mem::take(&mut pending);
        cursor
            .feed(&chunk)
            .map_err(|e| fail(request_id, "streaming", e))?;
    }

    let Cursor {
        consumed_samples,
        utterance_start,
        mut events,
        ..
    } = cursor;

    // FINALIZING: recover trailing audio not closed by a natural boundary
    let trailing = session
        .finalize()
        .map_err(|e| fail(request_id, "finalizing", e))?;
    if let Some(event) = trailing {
        perf_debug!(
            "Transcription {} recovered trailing event: '{}'",
            request_id,
            event.text
        );
        events.push(TimedEvent {
            event,
            utterance_start,
        });
    }

    // DONE
    let segments = assemble_segments(&events, config.seconds_per_word);
    let total_duration = consumed_samples as f64 / sample_rate as f64;
    let processing_time = started.elapsed().as_secs_f64();

    log::info!(
        "Transcription {} done: {} segments from {:.1}s of audio in {:.2}s",
        request_id,
        segments.len(),
        total_duration,
        processing_time
    );

    Ok(TranscriptionResult {
        segments,
        language: model.language_code().to_string(),
        total_duration,
        processing_time,
    })
}

/// Mutable per-request decode progress
struct Cursor<'a> {
    session: &'a mut dyn DecodeSession,
    sample_rate: u32,
    consumed_samples: u64,
    /// Fallback start offset of the utterance currently accumulating:
    /// the position right after the previous FINAL boundary, not the
    /// offset of whichever chunk happens to close the utterance.
    utterance_start: f64,
    events: Vec<TimedEvent>,
    on_partial: Option<&'a PartialObserver>,
    request_id: Uuid,
}

impl Cursor<'_> {
    fn feed(&mut self, chunk: &[i16]) -> Result<(), DecodeError> {
        let outcome = self.session.accept_chunk(chunk)?;
        self.consumed_samples += chunk.len() as u64;

        match outcome {
            DecodeOutcome::Final(event) => {
                perf_debug!(
                    "Transcription {} utterance boundary at sample {}: '{}'",
                    self.request_id,
                    self.consumed_samples,
                    event.text
                );
                self.events.push(TimedEvent {
                    event,
                    utterance_start: self.utterance_start,
                });
                self.utterance_start = self.consumed_samples as f64 / self.sample_rate as f64;
            }
            DecodeOutcome::Partial(text) => {
                perf_trace!(
                    "Transcription {} partial at sample {}: '{}'",
                    self.request_id,
                    self.consumed_samples,
                    text
                );
                if !text.is_empty() {
                    if let Some(observer) = self.on_partial {
                        observer(&text);
                    }
                }
            }
        }

        Ok(())
    }
}

fn fail(request_id: Uuid, phase: &str, err: DecodeError) -> DecodeError {
    log::warn!("Transcription {} failed during {}: {}", request_id, phase, err);
    err
}
