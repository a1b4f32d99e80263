// engine/assembler.rs
//
// Pure aggregation of FINAL decode events into transcript segments. No
// I/O and no clock access: identical input always produces identical
// output, and arrival order is preserved (chunks arrive in temporal
// order, so arrival order is temporal order).

use crate::recognizer::FinalEvent;

use super::types::Segment;

/// A FINAL event paired with the fallback start offset of the utterance it
/// closes: the seconds position right after the previous boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub event: FinalEvent,
    pub utterance_start: f64,
}

/// Turn ordered decode events into ordered segments, dropping events with
/// empty text.
pub fn assemble_segments(events: &[TimedEvent], seconds_per_word: f64) -> Vec<Segment> {
    events
        .iter()
        .filter(|timed| !timed.event.text.trim().is_empty())
        .map(|timed| segment_from_event(timed, seconds_per_word))
        .collect()
}

fn segment_from_event(timed: &TimedEvent, seconds_per_word: f64) -> Segment {
    let text = timed.event.text.trim().to_string();
    let words = &timed.event.words;
    let word_count = text.split_whitespace().count();

    // Mean of reported word confidences; 0.0 (never undefined) without them
    let confidences: Vec<f64> = words.iter().filter_map(|w| w.confidence).collect();
    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    // Word timings win; otherwise estimate from the utterance offset and a
    // fixed per-word duration
    let start_time = words
        .first()
        .and_then(|w| w.start)
        .unwrap_or(timed.utterance_start);
    let end_time = words
        .last()
        .and_then(|w| w.end)
        .unwrap_or_else(|| start_time + word_count as f64 * seconds_per_word);

    Segment {
        text,
        confidence: confidence.clamp(0.0, 1.0),
        start_time,
        end_time,
        speaker_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::WordInfo;

    fn word(text: &str, confidence: f64, start: f64, end: f64) -> WordInfo {
        WordInfo {
            text: text.to_string(),
            confidence: Some(confidence),
            start: Some(start),
            end: Some(end),
        }
    }

    fn bare_event(text: &str, utterance_start: f64) -> TimedEvent {
        TimedEvent {
            event: FinalEvent {
                text: text.to_string(),
                words: Vec::new(),
            },
            utterance_start,
        }
    }

    #[test]
    fn word_timings_take_precedence_over_offsets() {
        let events = vec![TimedEvent {
            event: FinalEvent {
                text: "hello world".to_string(),
                words: vec![word("hello", 0.9, 0.25, 0.7), word("world", 0.7, 0.8, 1.3)],
            },
            utterance_start: 5.0,
        }];

        let segments = assemble_segments(&events, 0.5);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_time, 0.25);
        assert_eq!(segments[0].end_time, 1.3);
        assert!((segments[0].confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn missing_word_data_falls_back_to_estimates() {
        let events = vec![bare_event("three word utterance", 2.0)];

        let segments = assemble_segments(&events, 0.5);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].start_time, 2.0);
        // Estimated end: 2.0 + 3 words * 0.5 s, approximate by design
        assert!((segments[0].end_time - 3.5).abs() < 1e-9);
        assert_eq!(segments[0].confidence, 0.0);
    }

    #[test]
    fn empty_text_events_are_dropped() {
        let events = vec![
            bare_event("", 0.0),
            bare_event("   ", 1.0),
            bare_event("kept", 2.0),
        ];

        let segments = assemble_segments(&events, 0.5);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "kept");
    }

    #[test]
    fn confidence_is_always_within_bounds() {
        let events = vec![TimedEvent {
            event: FinalEvent {
                text: "noisy".to_string(),
                // An engine misreporting out-of-range confidences must not
                // leak them into the transcript
                words: vec![word("noisy", 1.7, 0.0, 0.4)],
            },
            utterance_start: 0.0,
        }];

        let segments = assemble_segments(&events, 0.5);
        assert_eq!(segments[0].confidence, 1.0);
    }

    #[test]
    fn segment_order_follows_event_order() {
        let events = vec![
            bare_event("first", 0.0),
            bare_event("second", 1.5),
            bare_event("third", 4.0),
        ];

        let segments = assemble_segments(&events, 0.5);
        let starts: Vec<f64> = segments.iter().map(|s| s.start_time).collect();
        assert_eq!(starts, vec![0.0, 1.5, 4.0]);
        assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn assembly_is_deterministic() {
        let events = vec![
            TimedEvent {
                event: FinalEvent {
                    text: "hello world".to_string(),
                    words: vec![word("hello", 0.9, 0.1, 0.6), word("world", 0.8, 0.7, 1.2)],
                },
                utterance_start: 0.0,
            },
            bare_event("no word data here", 1.5),
        ];

        let first = assemble_segments(&events, 0.5);
        let second = assemble_segments(&events, 0.5);
        assert_eq!(first, second);
    }
}
