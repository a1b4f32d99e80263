// engine/types.rs
//
// Transcript data types.

use serde::{Deserialize, Serialize};

/// Finalized recognized text span with timing and confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    /// Mean of the engine's per-word confidences, 0.0 when none were
    /// reported. Always within [0, 1].
    pub confidence: f64,
    /// Seconds from the start of the request's audio
    pub start_time: f64,
    /// Seconds from the start of the request's audio
    pub end_time: f64,
    // Populated by a diarization collaborator, never by this core
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Result of one transcription request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Segments ordered by non-decreasing start time
    pub segments: Vec<Segment>,
    pub language: String,
    /// Duration of the decoded audio in seconds
    pub total_duration: f64,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
}

impl TranscriptionResult {
    /// Full transcript text, segments joined by single spaces
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_text_joins_segments() {
        let result = TranscriptionResult {
            segments: vec![
                Segment {
                    text: "hello there".to_string(),
                    confidence: 0.9,
                    start_time: 0.0,
                    end_time: 1.0,
                    speaker_id: None,
                },
                Segment {
                    text: "general kenobi".to_string(),
                    confidence: 0.8,
                    start_time: 1.2,
                    end_time: 2.4,
                    speaker_id: None,
                },
            ],
            language: "en-US".to_string(),
            total_duration: 2.5,
            processing_time: 0.1,
        };

        assert_eq!(result.text(), "hello there general kenobi");
    }

    #[test]
    fn segments_serialize_without_absent_speaker() {
        let segment = Segment {
            text: "hello".to_string(),
            confidence: 0.5,
            start_time: 0.0,
            end_time: 0.5,
            speaker_id: None,
        };

        let json = serde_json::to_value(&segment).unwrap();
        assert!(json.get("speaker_id").is_none());
        assert_eq!(json["text"], "hello");
    }
}
