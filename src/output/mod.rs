use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::OutputFormat;
use crate::outline::OutlineNode;
use crate::utils::sanitize_filename;
use crate::{Classify, ErrorKind};

pub mod html;
pub mod json;
pub mod markdown;

pub use html::HtmlSerializer;
pub use json::JsonSerializer;
pub use markdown::MarkdownSerializer;

/// Failures while encoding or writing a mind map
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SerializeError {
    #[error("Failed to encode mind map: {0}")]
    EncodingFailure(String),

    #[error("Failed to write mind map: {0}")]
    Io(String),
}

impl Classify for SerializeError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Output
    }
}

impl From<std::io::Error> for SerializeError {
    fn from(err: std::io::Error) -> Self {
        SerializeError::Io(err.to_string())
    }
}

/// Encodes an outline tree into a mind-map file format
pub trait MindMapSerializer: Send + Sync {
    fn serialize(&self, root: &OutlineNode) -> Result<Vec<u8>, SerializeError>;

    /// File extension without the dot
    fn extension(&self) -> &'static str;
}

/// Serializer for a CLI output format
pub fn serializer_for(format: OutputFormat) -> Arc<dyn MindMapSerializer> {
    match format {
        OutputFormat::Markdown => Arc::new(MarkdownSerializer::default()),
        OutputFormat::Json => Arc::new(JsonSerializer),
        OutputFormat::Html => Arc::new(HtmlSerializer::default()),
    }
}

/// `<dir>/<sanitized title>.<extension>`
pub fn output_path(dir: &Path, title: &str, extension: &str) -> PathBuf {
    let stem = sanitize_filename(title);
    let stem = if stem.is_empty() { "mindmap".to_string() } else { stem };
    dir.join(format!("{}.{}", stem, extension))
}

/// Write `bytes` next to the final path first, then move it into place
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SerializeError> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs_err::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.persist(path).map_err(|e| SerializeError::Io(e.error.to_string()))?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::outline::{OutlineBuilder, OutlineConfig};
    use crate::transcribe::TranscriptSegment;

    /// Title hierarchy, the part of a tree every format must preserve
    #[derive(Debug, PartialEq)]
    pub struct Shape(pub String, pub Vec<Shape>);

    pub fn shape(node: &OutlineNode) -> Shape {
        Shape(node.title.clone(), node.children.iter().map(shape).collect())
    }

    pub fn sample_tree() -> OutlineNode {
        let texts = [
            "Rust ownership basics, explained",
            "ownership moves values",
            "borrowing lends ownership",
            "Async runtimes: tokio",
            "tokio schedules futures",
            "futures are polled by tokio",
            "Closing thoughts",
        ];
        let segments: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| TranscriptSegment::new(i as f64 * 30.0, i as f64 * 30.0 + 29.0, *text, "en"))
            .collect();

        let config = OutlineConfig {
            max_span_segments: 2,
            ..OutlineConfig::default()
        };
        OutlineBuilder::new(config)
            .build(&segments, Some("A talk about Rust"))
            .unwrap()
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("out"), "Rust: a/b?", "md");
        assert_eq!(path, Path::new("out").join("Rust_ a_b_.md"));
        assert_eq!(output_path(Path::new("out"), "???", "md").file_name().unwrap(), "___.md");
    }

    #[test]
    fn test_write_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("map.md");

        write_atomic(&path, b"# hi\n").unwrap();
        assert_eq!(fs_err::read_to_string(&path).unwrap(), "# hi\n");

        let leftovers = fs_err::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_serializer_for() {
        assert_eq!(serializer_for(OutputFormat::Markdown).extension(), "md");
        assert_eq!(serializer_for(OutputFormat::Json).extension(), "json");
        assert_eq!(serializer_for(OutputFormat::Html).extension(), "html");
    }
}
