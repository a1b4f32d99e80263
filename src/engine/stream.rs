// engine/stream.rs
//
// PCM audio delivery into a transcription request.

use tokio::sync::mpsc;

use crate::recognizer::DecodeError;

/// Ordered stream of mono 16-bit PCM frames at a fixed sample rate.
///
/// Exclusively owned by one transcription request: `transcribe` consumes
/// the stream, and the feeding side signals end-of-audio by dropping its
/// sender. Frames may arrive in any size; the engine re-chunks them to its
/// fixed decode chunk size, always on whole-sample boundaries.
pub struct AudioStream {
    sample_rate: u32,
    rx: mpsc::UnboundedReceiver<Vec<i16>>,
}

impl AudioStream {
    /// Live feeding: returns the sender half and the stream. Drop the
    /// sender to finish the request.
    pub fn channel(sample_rate: u32) -> (mpsc::UnboundedSender<Vec<i16>>, AudioStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, AudioStream { sample_rate, rx })
    }

    /// One-shot stream over an already-buffered sample vector.
    pub fn from_samples(sample_rate: u32, samples: Vec<i16>) -> AudioStream {
        let (tx, stream) = Self::channel(sample_rate);
        if !samples.is_empty() {
            // Receiver outlives the send; an unbounded channel cannot fail here.
            let _ = tx.send(samples);
        }
        stream
    }

    /// One-shot stream over raw little-endian PCM bytes. Rejects buffers
    /// that do not align to whole 16-bit samples.
    pub fn from_pcm_bytes(sample_rate: u32, bytes: &[u8]) -> Result<AudioStream, DecodeError> {
        Ok(Self::from_samples(sample_rate, pcm_bytes_to_samples(bytes)?))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub(crate) async fn next_frame(&mut self) -> Option<Vec<i16>> {
        self.rx.recv().await
    }
}

/// Decode little-endian PCM bytes into samples, enforcing frame alignment:
/// a buffer that would split a sample is rejected rather than truncated.
pub fn pcm_bytes_to_samples(bytes: &[u8]) -> Result<Vec<i16>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::MisalignedAudio {
            byte_len: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
