//! XMind-style JSON: `{ "topic": { "title", "notes", "topics": [...] } }`.

use serde::{Deserialize, Serialize};

use super::{MindMapSerializer, SerializeError};
use crate::outline::OutlineNode;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    topic: Topic,
}

#[derive(Debug, Serialize, Deserialize)]
struct Topic {
    title: String,

    /// Leaf body, one segment per line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,

    /// Start and end of the covered audio, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    topics: Vec<Topic>,
}

impl From<&OutlineNode> for Topic {
    fn from(node: &OutlineNode) -> Self {
        Topic {
            title: node.title.clone(),
            notes: (!node.body.is_empty()).then(|| node.body.join("\n")),
            time: Some([node.start_time, node.end_time]),
            topics: node.children.iter().map(Topic::from).collect(),
        }
    }
}

impl From<Topic> for OutlineNode {
    fn from(topic: Topic) -> Self {
        let mut node = OutlineNode::new(topic.title);
        node.body = topic
            .notes
            .map(|notes| notes.lines().map(str::to_string).collect())
            .unwrap_or_default();
        if let Some([start, end]) = topic.time {
            node.start_time = start;
            node.end_time = end;
        }
        node.children = topic.topics.into_iter().map(OutlineNode::from).collect();
        node
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl MindMapSerializer for JsonSerializer {
    fn serialize(&self, root: &OutlineNode) -> Result<Vec<u8>, SerializeError> {
        let document = Document { topic: Topic::from(root) };
        serde_json::to_vec_pretty(&document).map_err(|e| SerializeError::EncodingFailure(e.to_string()))
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// Rebuild a tree from JSON written by [`JsonSerializer`]
pub fn parse_json(bytes: &[u8]) -> Result<OutlineNode, SerializeError> {
    let document: Document =
        serde_json::from_slice(bytes).map_err(|e| SerializeError::EncodingFailure(e.to_string()))?;
    Ok(document.topic.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::{sample_tree, shape};

    #[test]
    fn test_round_trip_structure() {
        let tree = sample_tree();
        let bytes = JsonSerializer.serialize(&tree).unwrap();
        let parsed = parse_json(&bytes).unwrap();

        assert_eq!(parsed.node_count(), tree.node_count());
        assert_eq!(shape(&parsed), shape(&tree));
        assert_eq!(parsed.end_time, tree.end_time);
    }

    #[test]
    fn test_document_layout() {
        let mut root = OutlineNode::new("主题");
        let mut leaf = OutlineNode::new("第一部分");
        leaf.body = vec!["一".to_string(), "二".to_string()];
        root.children.push(leaf);

        let value: serde_json::Value = serde_json::from_slice(&JsonSerializer.serialize(&root).unwrap()).unwrap();
        assert_eq!(value["topic"]["title"], "主题");
        assert_eq!(value["topic"]["topics"][0]["title"], "第一部分");
        assert_eq!(value["topic"]["topics"][0]["notes"], "一\n二");
        assert!(value["topic"].get("notes").is_none());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_json(b"[]"), Err(SerializeError::EncodingFailure(_))));
    }
}
