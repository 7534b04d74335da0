//! Topic boundary detection.

use std::collections::HashMap;

use super::OutlineConfig;
use crate::transcribe::TranscriptSegment;
use crate::translate::language::is_cjk;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "i", "in", "is", "it", "its", "of", "on", "or", "so", "that", "the", "this", "to", "was",
    "we", "were", "will", "with", "you",
];

/// Depth scores at or below this are rounding noise between identical blocks
const MIN_DEPTH: f64 = 1e-6;

type TermCounts = HashMap<String, usize>;

/// Finds topic shifts inside an ordered run of segments
///
/// Returned indices are relative to `segments`, strictly increasing, and each lies in
/// `1..segments.len()`; index `i` means a new topic starts at `segments[i]`.
pub trait BoundaryStrategy: Send + Sync {
    fn boundaries(&self, segments: &[TranscriptSegment], config: &OutlineConfig) -> Vec<usize>;
}

/// TextTiling-style lexical cohesion plus silence gaps
///
/// Every gap between two segments gets a cosine similarity between the term counts of the
/// blocks on either side. A gap is a topic shift when it sits in a valley of that curve whose
/// depth stands out from the other valleys by `depth_cutoff` standard deviations, so a transcript
/// that stays on one subject yields few boundaries however low its raw overlap is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalBoundary;

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() && !STOPWORDS.contains(&word.as_str()) {
        tokens.push(std::mem::take(word));
    }
    word.clear();
}

/// Lowercase words minus stopwords, plus bigrams of consecutive CJK characters
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut previous_cjk: Option<char> = None;

    for c in text.chars() {
        if is_cjk(c) {
            flush_word(&mut word, &mut tokens);
            match previous_cjk {
                Some(prev) => tokens.push([prev, c].iter().collect()),
                None => tokens.push(c.to_string()),
            }
            previous_cjk = Some(c);
        } else if c.is_alphanumeric() {
            previous_cjk = None;
            word.extend(c.to_lowercase());
        } else {
            previous_cjk = None;
            flush_word(&mut word, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);

    tokens
}

/// Term counts of the segments visited by `order`, stopping once `min_tokens` are pooled
fn block(tokens: &[Vec<String>], order: impl Iterator<Item = usize>, min_tokens: usize) -> TermCounts {
    let mut counts = TermCounts::new();
    let mut pooled = 0;

    for i in order {
        for token in &tokens[i] {
            *counts.entry(token.clone()).or_default() += 1;
        }
        pooled += tokens[i].len();
        if pooled >= min_tokens {
            break;
        }
    }

    counts
}

fn cosine(a: &TermCounts, b: &TermCounts) -> f64 {
    // Integer sums keep the result independent of map iteration order
    let squares = |counts: &TermCounts| counts.values().map(|&n| n * n).sum::<usize>();
    let (norm_a, norm_b) = (squares(a), squares(b));

    match (norm_a, norm_b) {
        (0, 0) => 1.0,
        (0, _) | (_, 0) => 0.0,
        _ => {
            let dot: usize = a
                .iter()
                .filter_map(|(term, &n)| b.get(term).map(|&m| n * m))
                .sum();
            dot as f64 / ((norm_a as f64).sqrt() * (norm_b as f64).sqrt())
        }
    }
}

/// How far each gap sits below the nearest peaks on both sides
fn depth_scores(similarities: &[f64]) -> Vec<f64> {
    similarities
        .iter()
        .enumerate()
        .map(|(g, &value)| {
            let mut left = value;
            for &s in similarities[..g].iter().rev() {
                if s < left {
                    break;
                }
                left = s;
            }

            let mut right = value;
            for &s in &similarities[g + 1..] {
                if s < right {
                    break;
                }
                right = s;
            }

            (left - value) + (right - value)
        })
        .collect()
}

fn cutoff(depths: &[f64], deviations: f64) -> f64 {
    let n = depths.len() as f64;
    let mean = depths.iter().sum::<f64>() / n;
    let variance = depths.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    mean + deviations * variance.sqrt()
}

impl LexicalBoundary {
    /// Similarity across each gap; entry `g` describes the gap before `segments[g + 1]`
    fn gap_similarities(tokens: &[Vec<String>], block_tokens: usize) -> Vec<f64> {
        (1..tokens.len())
            .map(|i| {
                let before = block(tokens, (0..i).rev(), block_tokens);
                let after = block(tokens, i..tokens.len(), block_tokens);
                cosine(&before, &after)
            })
            .collect()
    }

    /// Gaps whose depth score is a local maximum above the cutoff
    fn lexical_shifts(segments: &[TranscriptSegment], config: &OutlineConfig) -> Vec<bool> {
        let tokens: Vec<_> = segments.iter().map(|s| tokenize(&s.text)).collect();
        let depths = depth_scores(&Self::gap_similarities(&tokens, config.block_tokens));
        let threshold = cutoff(&depths, config.depth_cutoff);

        depths
            .iter()
            .enumerate()
            .map(|(g, &depth)| {
                let peak = (g == 0 || depth >= depths[g - 1])
                    && depths.get(g + 1).map_or(true, |&next| depth >= next);
                peak && depth > MIN_DEPTH && depth > threshold
            })
            .collect()
    }
}

impl BoundaryStrategy for LexicalBoundary {
    fn boundaries(&self, segments: &[TranscriptSegment], config: &OutlineConfig) -> Vec<usize> {
        if segments.len() < 2 {
            return Vec::new();
        }

        let shifts = Self::lexical_shifts(segments, config);
        let min_span = config.min_span_segments.max(1);

        let mut accepted = Vec::new();
        let mut last = 0;

        // Ascending scan, so of two candidates closer than min_span the earlier one wins
        for i in 1..segments.len() {
            if i - last < min_span || segments.len() - i < min_span {
                continue;
            }
            let silence = segments[i].start_time - segments[i - 1].end_time >= config.time_gap_seconds;
            if silence || shifts[i - 1] {
                accepted.push(i);
                last = i;
            }
        }

        accepted
    }
}
