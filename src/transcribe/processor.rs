//! Boundary validation for backend output.
//!
//! Backends hand back loosely shaped data (JSON from a CLI, word lists from a cloud job).
//! Everything is normalized here into ordered, non-empty [`TranscriptSegment`]s before the
//! pipeline sees it.

use serde::Deserialize;

use super::TranscriptSegment;

/// Segment as a backend reports it, before validation
#[derive(Debug, Clone, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Single recognized word or punctuation mark with optional timing
#[derive(Debug, Clone)]
pub struct TimedWord {
    pub content: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub punctuation: bool,
}

/// Collapse runs of whitespace into single spaces
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Validate raw segments: drop blank text, repair timing, order by start time
pub fn normalize_segments(raw: Vec<RawSegment>, language: &str) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = raw
        .into_iter()
        .filter_map(|segment| {
            let text = collapse_whitespace(&segment.text);
            if text.is_empty() || !segment.start.is_finite() {
                return None;
            }

            let start = segment.start.max(0.0);
            let end = if segment.end.is_finite() { segment.end.max(start) } else { start };

            Some(TranscriptSegment::new(start, end, text, language))
        })
        .collect();

    // Stable, so segments sharing a start time keep their backend order
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    segments
}

/// Groups word-level results into sentence-sized segments
pub struct SegmentGrouper {
    max_segment_length: f64,
}

impl SegmentGrouper {
    pub fn new(max_segment_length: f64) -> Self {
        Self { max_segment_length }
    }

    /// Split on long pauses, on sentence ends once a segment is half full, or when it gets too long
    pub fn group(&self, words: &[TimedWord], language: &str) -> Vec<TranscriptSegment> {
        let mut segments = Vec::new();
        let mut current_text = String::new();
        let mut current_start: Option<f64> = None;
        let mut current_end: Option<f64> = None;
        let mut pending_break = false;

        for word in words {
            if word.punctuation {
                current_text.push_str(&word.content);
                if matches!(word.content.as_str(), "." | "!" | "?" | "。" | "！" | "？") {
                    pending_break = true;
                }
                continue;
            }

            let time_gap = word
                .start_time
                .zip(current_end)
                .map(|(start, end)| start - end > 1.0)
                .unwrap_or(false);

            let elapsed = current_start.zip(word.start_time).map(|(seg_start, now)| now - seg_start);
            let too_long = elapsed.map(|e| e > self.max_segment_length).unwrap_or(false);
            let natural_break = pending_break
                && elapsed.map(|e| e > self.max_segment_length / 2.0).unwrap_or(false);

            if current_text.is_empty() || time_gap || too_long || natural_break {
                Self::flush(&mut segments, &current_text, current_start, current_end, language);

                current_text = word.content.clone();
                current_start = word.start_time;
                current_end = word.end_time;
            } else {
                current_text.push(' ');
                current_text.push_str(&word.content);
                current_end = word.end_time.or(current_end);
            }

            pending_break = false;
        }

        Self::flush(&mut segments, &current_text, current_start, current_end, language);
        segments
    }

    fn flush(
        segments: &mut Vec<TranscriptSegment>,
        text: &str,
        start: Option<f64>,
        end: Option<f64>,
        language: &str,
    ) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if let (Some(start), Some(end)) = (start, end) {
            segments.push(TranscriptSegment::new(start, end.max(start), text, language));
        }
    }
}
