use super::markdown::MarkdownSerializer;
use super::{MindMapSerializer, SerializeError};
use crate::outline::OutlineNode;

const MARKMAP_AUTOLOADER: &str = "https://cdn.jsdelivr.net/npm/markmap-autoloader@0.16";

/// Self-contained page that renders the Markdown outline with markmap
#[derive(Debug, Clone, Default)]
pub struct HtmlSerializer {
    markdown: MarkdownSerializer,
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

impl MindMapSerializer for HtmlSerializer {
    fn serialize(&self, root: &OutlineNode) -> Result<Vec<u8>, SerializeError> {
        let markdown = self.markdown.render(root)?;
        // The template is raw text; only a closing script tag could end it early
        let template = markdown.replace("</script", "<\\/script");

        let page = format!(
            r#"<!DOCTYPE html>
<html lang="zh">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
html, body {{ margin: 0; height: 100%; }}
.markmap {{ width: 100%; height: 100vh; }}
.markmap > svg {{ width: 100%; height: 100%; }}
</style>
<script src="{autoloader}"></script>
</head>
<body>
<div class="markmap">
<script type="text/template">
{template}</script>
</div>
</body>
</html>
"#,
            title = escape_html(&root.title),
            autoloader = MARKMAP_AUTOLOADER,
            template = template,
        );

        Ok(page.into_bytes())
    }

    fn extension(&self) -> &'static str {
        "html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_embeds_markdown() {
        let mut root = OutlineNode::new("Rust & <Friends>");
        let mut leaf = OutlineNode::new("Closing");
        leaf.body = vec!["see </script> tags".to_string()];
        root.children.push(leaf);

        let page = String::from_utf8(HtmlSerializer::default().serialize(&root).unwrap()).unwrap();

        assert!(page.contains("<title>Rust &amp; &lt;Friends&gt;</title>"));
        assert!(page.contains("# Rust & <Friends>"));
        assert!(page.contains("- see <\\/script> tags"));
        assert_eq!(page.matches("</script>").count(), 2);
    }
}
