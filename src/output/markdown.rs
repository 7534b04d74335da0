//! Markmap-flavoured Markdown: one heading level per tree level, leaf bodies as bullets.

use super::{MindMapSerializer, SerializeError};
use crate::config::MAX_SUPPORTED_DEPTH;
use crate::outline::OutlineNode;
use crate::utils::{format_timestamp, parse_timestamp};

#[derive(Debug, Clone)]
pub struct MarkdownSerializer {
    /// Append `[mm:ss-mm:ss]` to section headings
    pub time_tags: bool,
}

impl Default for MarkdownSerializer {
    fn default() -> Self {
        Self { time_tags: true }
    }
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl MarkdownSerializer {
    pub fn render(&self, root: &OutlineNode) -> Result<String, SerializeError> {
        let depth = root.depth();
        if depth > MAX_SUPPORTED_DEPTH {
            return Err(SerializeError::EncodingFailure(format!(
                "outline depth {} exceeds the {} heading levels Markdown offers",
                depth,
                MAX_SUPPORTED_DEPTH + 1
            )));
        }

        let mut out = String::new();
        root.walk(&mut |node, depth| {
            if !out.is_empty() {
                out.push('\n');
            }

            out.push_str(&"#".repeat(depth + 1));
            out.push(' ');
            out.push_str(&single_line(&node.title));
            if self.time_tags && depth > 0 {
                out.push_str(&format!(
                    " [{}-{}]",
                    format_timestamp(node.start_time),
                    format_timestamp(node.end_time)
                ));
            }
            out.push('\n');

            if !node.body.is_empty() {
                out.push('\n');
                for line in &node.body {
                    let line = single_line(line);
                    out.push('-');
                    if !line.is_empty() {
                        out.push(' ');
                        out.push_str(&line);
                    }
                    out.push('\n');
                }
            }
        });

        Ok(out)
    }
}

impl MindMapSerializer for MarkdownSerializer {
    fn serialize(&self, root: &OutlineNode) -> Result<Vec<u8>, SerializeError> {
        self.render(root).map(String::into_bytes)
    }

    fn extension(&self) -> &'static str {
        "md"
    }
}

/// Split a trailing ` [start-end]` tag off a heading
fn split_time_tag(heading: &str) -> (&str, Option<(f64, f64)>) {
    let parsed = heading
        .strip_suffix(']')
        .and_then(|rest| rest.rsplit_once(" ["))
        .and_then(|(title, tag)| {
            let (start, end) = tag.split_once('-')?;
            Some((title, (parse_timestamp(start)?, parse_timestamp(end)?)))
        });

    match parsed {
        Some((title, times)) => (title, Some(times)),
        None => (heading, None),
    }
}

/// Text of a `- item` bullet; a bare `-` is an empty item
fn bullet_item(line: &str) -> Option<&str> {
    match line.trim_start().strip_prefix('-')? {
        "" => Some(""),
        rest => rest.strip_prefix(' '),
    }
}

/// Rebuild a tree from Markdown written by [`MarkdownSerializer`]
///
/// Segment spans are not part of the format and come back as defaults.
pub fn parse_markdown(text: &str) -> Result<OutlineNode, SerializeError> {
    // (heading level, node) for the current path from the root
    let mut stack: Vec<(usize, OutlineNode)> = Vec::new();
    let mut root: Option<OutlineNode> = None;

    fn attach(stack: &mut Vec<(usize, OutlineNode)>, root: &mut Option<OutlineNode>) {
        if let Some((_, node)) = stack.pop() {
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(node),
                None => *root = Some(node),
            }
        }
    }

    for line in text.lines() {
        let trimmed = line.trim_end();

        if let Some(rest) = trimmed.strip_prefix('#') {
            let level = 1 + rest.chars().take_while(|&c| c == '#').count();
            let heading = trimmed[level..].trim();

            if level == 1 && root.is_some() {
                return Err(SerializeError::EncodingFailure("more than one root heading".to_string()));
            }
            if stack.is_empty() && level != 1 {
                return Err(SerializeError::EncodingFailure(format!(
                    "heading '{}' appears before the root heading",
                    heading
                )));
            }

            while stack.last().map(|(l, _)| *l >= level).unwrap_or(false) {
                attach(&mut stack, &mut root);
            }
            if let Some((parent_level, _)) = stack.last() {
                if level != parent_level + 1 {
                    return Err(SerializeError::EncodingFailure(format!(
                        "heading '{}' skips a level",
                        heading
                    )));
                }
            }

            let (title, times) = split_time_tag(heading);
            let mut node = OutlineNode::new(title);
            if let Some((start, end)) = times {
                node.start_time = start;
                node.end_time = end;
            }
            stack.push((level, node));
        } else if let Some(item) = bullet_item(trimmed) {
            let (_, node) = stack.last_mut().ok_or_else(|| {
                SerializeError::EncodingFailure("bullet before the root heading".to_string())
            })?;
            node.body.push(item.to_string());
        }
    }

    while !stack.is_empty() {
        attach(&mut stack, &mut root);
    }

    root.ok_or_else(|| SerializeError::EncodingFailure("no root heading found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::{sample_tree, shape};

    #[test]
    fn test_round_trip_structure() {
        let tree = sample_tree();
        let markdown = MarkdownSerializer::default().render(&tree).unwrap();
        let parsed = parse_markdown(&markdown).unwrap();

        assert_eq!(parsed.node_count(), tree.node_count());
        assert_eq!(shape(&parsed), shape(&tree));
        assert_eq!(parsed.children[0].start_time, tree.children[0].start_time);

        let mut bodies = Vec::new();
        parsed.walk(&mut |node, _| bodies.extend(node.body.clone()));
        assert_eq!(bodies.len(), 7);
    }

    #[test]
    fn test_render_layout() {
        let mut root = OutlineNode::new("Topic");
        let mut child = OutlineNode::new("First");
        child.body = vec!["line one".to_string(), "line\ntwo".to_string()];
        child.end_time = 75.0;
        root.children.push(child);

        let markdown = MarkdownSerializer::default().render(&root).unwrap();
        assert_eq!(markdown, "# Topic\n\n## First [00:00-01:15]\n\n- line one\n- line two\n");

        let plain = MarkdownSerializer { time_tags: false }.render(&root).unwrap();
        assert!(plain.contains("## First\n"));
    }

    #[test]
    fn test_empty_body_line_survives_round_trip() {
        let mut root = OutlineNode::new("Topic");
        let mut child = OutlineNode::new("Pause");
        child.body = vec!["before".to_string(), "   ".to_string(), "after".to_string()];
        root.children.push(child);

        let markdown = MarkdownSerializer::default().render(&root).unwrap();
        assert!(markdown.contains("- before\n-\n- after\n"));

        let parsed = parse_markdown(&markdown).unwrap();
        assert_eq!(parsed.children[0].body, vec!["before", "", "after"]);
    }

    #[test]
    fn test_bullet_item() {
        assert_eq!(bullet_item("- text"), Some("text"));
        assert_eq!(bullet_item("  -"), Some(""));
        assert_eq!(bullet_item("-dash"), None);
        assert_eq!(bullet_item("plain"), None);
    }

    #[test]
    fn test_too_deep_is_rejected() {
        let mut node = OutlineNode::new("leaf");
        for level in 0..=MAX_SUPPORTED_DEPTH {
            let mut parent = OutlineNode::new(format!("level {}", level));
            parent.children.push(node);
            node = parent;
        }

        assert!(matches!(
            MarkdownSerializer::default().render(&node),
            Err(SerializeError::EncodingFailure(_))
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_markdown("").is_err());
        assert!(parse_markdown("## orphan\n").is_err());
        assert!(parse_markdown("# root\n#### skipped\n").is_err());
        assert!(parse_markdown("# one\n# two\n").is_err());
    }

    #[test]
    fn test_split_time_tag() {
        assert_eq!(split_time_tag("Intro [00:05-01:10]"), ("Intro", Some((5.0, 70.0))));
        assert_eq!(split_time_tag("Array [i]"), ("Array [i]", None));
    }
}
