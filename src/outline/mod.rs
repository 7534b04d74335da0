//! Transcript to outline tree.
//!
//! [`OutlineBuilder`] partitions an ordered transcript into contiguous spans using a
//! [`BoundaryStrategy`], recursing into spans that are too long until the configured depth is
//! reached. Every segment ends up in exactly one leaf, in transcript order.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

use crate::transcribe::TranscriptSegment;
use crate::{Classify, ErrorKind};

pub mod boundary;
pub mod title;

pub use boundary::{BoundaryStrategy, LexicalBoundary};
pub use title::{ROOT_PLACEHOLDER, UNTITLED_SECTION};

/// Half-open range of transcript segment indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentSpan {
    pub start: usize,
    pub end: usize,
}

impl SegmentSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl From<Range<usize>> for SegmentSpan {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// One node of the mind map
///
/// Depth is not stored: the root is depth 0 and each child sits one level below its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,

    /// Segment texts; only leaves carry a body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<OutlineNode>,

    /// Transcript segments covered by this node
    #[serde(default)]
    pub span: SegmentSpan,

    /// Seconds into the media where the node starts
    #[serde(default)]
    pub start_time: f64,

    #[serde(default)]
    pub end_time: f64,
}

impl OutlineNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: Vec::new(),
            children: Vec::new(),
            span: SegmentSpan::default(),
            start_time: 0.0,
            end_time: 0.0,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including itself
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::node_count).sum::<usize>()
    }

    /// Depth of the deepest node below this one (a lone node has depth 0)
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(|child| child.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Pre-order traversal with the depth of every visited node
    pub fn walk<F>(&self, visit: &mut F)
    where
        F: FnMut(&OutlineNode, usize),
    {
        self.walk_at(0, visit);
    }

    fn walk_at<F>(&self, depth: usize, visit: &mut F)
    where
        F: FnMut(&OutlineNode, usize),
    {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }

    /// Spans of all leaves in display order
    pub fn leaf_spans(&self) -> Vec<SegmentSpan> {
        let mut spans = Vec::new();
        self.walk(&mut |node, _| {
            if node.is_leaf() {
                spans.push(node.span);
            }
        });
        spans
    }
}

/// Outline segmentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineConfig {
    /// Deepest level below the root
    #[serde(rename = "max_outline_depth")]
    pub max_depth: usize,

    /// Spans longer than this are split again while depth allows
    pub max_span_segments: usize,

    /// Shortest span a boundary may create
    pub min_span_segments: usize,

    /// Tokens pooled on each side of a gap before the two blocks are compared
    pub block_tokens: usize,

    /// Standard deviations above the mean depth score a valley needs to count as a topic shift
    pub depth_cutoff: f64,

    /// Silence that always starts a new section
    pub time_gap_seconds: f64,

    pub max_title_chars: usize,
}

impl Default for OutlineConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_span_segments: 12,
            min_span_segments: 1,
            block_tokens: 20,
            depth_cutoff: 0.5,
            time_gap_seconds: 4.0,
            max_title_chars: 24,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Transcript contains no segments to outline")]
pub struct EmptyTranscriptError;

impl Classify for EmptyTranscriptError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PermanentInput
    }
}

/// Builds outline trees; pure and deterministic for a given config and strategy
#[derive(Clone)]
pub struct OutlineBuilder {
    config: OutlineConfig,
    strategy: Arc<dyn BoundaryStrategy>,
}

impl OutlineBuilder {
    pub fn new(config: OutlineConfig) -> Self {
        Self::with_strategy(config, Arc::new(LexicalBoundary))
    }

    pub fn with_strategy(config: OutlineConfig, strategy: Arc<dyn BoundaryStrategy>) -> Self {
        Self { config, strategy }
    }

    /// Build the tree for `segments`, titling the root with `topic` when available
    pub fn build(
        &self,
        segments: &[TranscriptSegment],
        topic: Option<&str>,
    ) -> Result<OutlineNode, EmptyTranscriptError> {
        if segments.is_empty() {
            return Err(EmptyTranscriptError);
        }

        let children = self
            .partition(segments)
            .into_iter()
            .map(|range| self.build_node(segments, range, 1))
            .collect();

        let mut root = Self::node_for(segments, 0..segments.len(), title::root_title(topic));
        root.children = children;
        Ok(root)
    }

    fn build_node(&self, segments: &[TranscriptSegment], range: Range<usize>, depth: usize) -> OutlineNode {
        let span = &segments[range.clone()];
        let title = title::section_title(&span[0].text, self.config.max_title_chars);
        let mut node = Self::node_for(segments, range.clone(), title);

        if span.len() > self.config.max_span_segments && depth < self.config.max_depth {
            node.children = self
                .partition(span)
                .into_iter()
                .map(|sub| self.build_node(segments, range.start + sub.start..range.start + sub.end, depth + 1))
                .collect();
        } else {
            node.body = span.iter().map(|segment| segment.text.clone()).collect();
        }

        node
    }

    fn node_for(segments: &[TranscriptSegment], range: Range<usize>, title: String) -> OutlineNode {
        let start_time = segments[range.start].start_time;
        let end_time = segments[range.end - 1].end_time;

        OutlineNode {
            title,
            body: Vec::new(),
            children: Vec::new(),
            span: range.into(),
            start_time,
            end_time,
        }
    }

    /// Contiguous ranges covering `segments`, relative to the slice
    fn partition(&self, segments: &[TranscriptSegment]) -> Vec<Range<usize>> {
        let boundaries: Vec<usize> = self
            .strategy
            .boundaries(segments, &self.config)
            .into_iter()
            .filter(|&b| b > 0 && b < segments.len())
            .collect();

        if boundaries.is_empty() && segments.len() > self.config.max_span_segments {
            return even_chunks(segments.len(), self.config.max_span_segments);
        }

        let mut ranges = Vec::with_capacity(boundaries.len() + 1);
        let mut start = 0;
        for boundary in boundaries {
            if boundary > start {
                ranges.push(start..boundary);
                start = boundary;
            }
        }
        ranges.push(start..segments.len());
        ranges
    }
}

/// Split `len` items into the fewest near-equal chunks of at most `max_chunk`
fn even_chunks(len: usize, max_chunk: usize) -> Vec<Range<usize>> {
    let max_chunk = max_chunk.max(1);
    let count = len.div_ceil(max_chunk);
    let base = len / count;
    let extra = len % count;

    let mut ranges = Vec::with_capacity(count);
    let mut start = 0;
    for i in 0..count {
        let size = base + usize::from(i < extra);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(i: usize, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(i as f64, i as f64 + 1.0, text, "en")
    }

    fn assert_partition(root: &OutlineNode, len: usize) {
        let spans = root.leaf_spans();
        let mut expected_start = 0;
        for span in &spans {
            assert_eq!(span.start, expected_start, "gap or overlap in {:?}", spans);
            assert!(!span.is_empty());
            expected_start = span.end;
        }
        assert_eq!(expected_start, len);
    }

    /// Strategy that never finds a boundary
    struct NoBoundaries;

    impl BoundaryStrategy for NoBoundaries {
        fn boundaries(&self, _: &[TranscriptSegment], _: &OutlineConfig) -> Vec<usize> {
            Vec::new()
        }
    }

    #[test]
    fn test_two_topics() {
        let segments = vec![seg(0, "Intro to X"), seg(1, "Detail on X"), seg(2, "Unrelated topic Y")];

        let root = OutlineBuilder::new(OutlineConfig::default()).build(&segments, None).unwrap();

        assert_eq!(root.title, ROOT_PLACEHOLDER);
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].body, vec!["Intro to X", "Detail on X"]);
        assert_eq!(root.children[0].title, "Intro to X");
        assert_eq!(root.children[1].span, SegmentSpan { start: 2, end: 3 });
        assert_eq!(root.children[1].body, vec!["Unrelated topic Y"]);
    }

    #[test]
    fn test_single_segment() {
        let segments = vec![seg(0, "Only one thing to say.")];
        let root = OutlineBuilder::new(OutlineConfig::default())
            .build(&segments, Some("A Talk"))
            .unwrap();

        assert_eq!(root.title, "A Talk");
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].is_leaf());
        assert_eq!(root.depth(), 1);
        assert_eq!(root.children[0].title, "Only one thing to say");
    }

    #[test]
    fn test_empty_transcript() {
        let result = OutlineBuilder::new(OutlineConfig::default()).build(&[], None);
        assert_eq!(result, Err(EmptyTranscriptError));
    }

    #[test]
    fn test_partition_and_determinism() {
        let topics = ["rust ownership", "garbage collection", "async runtimes", "web servers"];
        let segments: Vec<_> = (0..40)
            .map(|i| seg(i, &format!("{} point {}", topics[i / 10], i % 3)))
            .collect();

        let builder = OutlineBuilder::new(OutlineConfig::default());
        let first = builder.build(&segments, None).unwrap();
        let second = builder.build(&segments, None).unwrap();

        assert_eq!(first, second);
        assert_partition(&first, segments.len());

        let mut bodies = Vec::new();
        first.walk(&mut |node, _| bodies.extend(node.body.iter().cloned()));
        let texts: Vec<_> = segments.iter().map(|s| s.text.clone()).collect();
        assert_eq!(bodies, texts);
    }

    #[test]
    fn test_depth_bound_on_long_span() {
        let segments: Vec<_> = (0..500).map(|i| seg(i, "same words again")).collect();

        for max_depth in 1..=5 {
            let config = OutlineConfig {
                max_depth,
                max_span_segments: 3,
                ..OutlineConfig::default()
            };
            let root = OutlineBuilder::with_strategy(config, Arc::new(NoBoundaries))
                .build(&segments, None)
                .unwrap();

            assert!(root.depth() <= max_depth, "depth {} > {}", root.depth(), max_depth);
            assert_partition(&root, segments.len());
        }
    }

    #[test]
    fn test_long_span_is_chunked() {
        let segments: Vec<_> = (0..30).map(|i| seg(i, "same words again")).collect();
        let config = OutlineConfig {
            max_span_segments: 10,
            ..OutlineConfig::default()
        };

        let root = OutlineBuilder::with_strategy(config, Arc::new(NoBoundaries))
            .build(&segments, None)
            .unwrap();

        assert_eq!(root.children.len(), 3);
        assert!(root.children.iter().all(|child| child.span.len() == 10));
    }

    #[test]
    fn test_internal_nodes_have_no_body() {
        let segments: Vec<_> = (0..50).map(|i| seg(i, "same words again")).collect();
        let config = OutlineConfig {
            max_span_segments: 4,
            ..OutlineConfig::default()
        };
        let root = OutlineBuilder::new(config).build(&segments, None).unwrap();

        root.walk(&mut |node, depth| {
            assert!(!node.title.is_empty());
            if !node.is_leaf() {
                assert!(node.body.is_empty(), "internal node at depth {} has a body", depth);
            }
        });
    }

    #[test]
    fn test_even_chunks() {
        assert_eq!(even_chunks(10, 4), vec![0..4, 4..7, 7..10]);
        assert_eq!(even_chunks(3, 5), vec![0..3]);
    }
}
