//! Block-tree HTML serialization and media reference resolution.

use std::collections::HashMap;

use serde_json::Value;

use super::Block;
use crate::document::model::MediaItem;

/// Escape text for interpolation into HTML.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Substitute concrete media URLs into image blocks.
///
/// Blocks named `core/image` carrying a `mediaId` (or legacy `id`)
/// attribute get their `url` replaced from the media index; existing
/// `alt` text is kept and only filled from the index when missing.
/// Unknown media ids leave the block untouched. Recurses into inner
/// blocks.
pub fn resolve_media(blocks: &[Block], media: &HashMap<String, MediaItem>) -> Vec<Block> {
    blocks
        .iter()
        .map(|block| {
            let mut resolved = block.clone();
            if block.name == "core/image" {
                let media_id = block
                    .attributes
                    .get("mediaId")
                    .or_else(|| block.attributes.get("id"))
                    .and_then(Value::as_str);
                if let Some(item) = media_id.and_then(|id| media.get(id)) {
                    resolved
                        .attributes
                        .insert("url".into(), Value::String(item.url.clone()));
                    let has_alt = block
                        .attributes
                        .get("alt")
                        .and_then(Value::as_str)
                        .map(|s| !s.is_empty())
                        .unwrap_or(false);
                    if !has_alt {
                        resolved
                            .attributes
                            .insert("alt".into(), Value::String(item.alt.clone()));
                    }
                }
            }
            resolved.inner_blocks = resolve_media(&block.inner_blocks, media);
            resolved
        })
        .collect()
}

/// Serialize a block tree to an HTML fragment.
pub fn render_blocks(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        render_block(block, &mut out);
    }
    out
}

fn render_block(block: &Block, out: &mut String) {
    let text = |key: &str| -> String {
        block
            .attributes
            .get(key)
            .and_then(Value::as_str)
            .map(escape_html)
            .unwrap_or_default()
    };
    match block.name.as_str() {
        "core/paragraph" => {
            out.push_str("<p>");
            out.push_str(&text("content"));
            out.push_str("</p>");
        }
        "core/heading" => {
            let level = block
                .attributes
                .get("level")
                .and_then(Value::as_u64)
                .filter(|l| (1..=6).contains(l))
                .unwrap_or(2);
            out.push_str(&format!("<h{level}>{}</h{level}>", text("content")));
        }
        "core/image" => {
            let url = text("url");
            let alt = text("alt");
            out.push_str(&format!("<img src=\"{url}\" alt=\"{alt}\">"));
        }
        "core/list" => {
            out.push_str("<ul>");
            if let Some(items) = block.attributes.get("items").and_then(Value::as_array) {
                for item in items {
                    if let Some(s) = item.as_str() {
                        out.push_str("<li>");
                        out.push_str(&escape_html(s));
                        out.push_str("</li>");
                    }
                }
            }
            for inner in &block.inner_blocks {
                out.push_str("<li>");
                render_block(inner, out);
                out.push_str("</li>");
            }
            out.push_str("</ul>");
        }
        // Unknown block types render as a generic container so nested
        // content is never dropped.
        other => {
            out.push_str(&format!("<div data-block=\"{}\">", escape_html(other)));
            out.push_str(&text("content"));
            for inner in &block.inner_blocks {
                render_block(inner, out);
            }
            out.push_str("</div>");
        }
    }
}

/// Wrap a rendered fragment in a minimal standalone HTML document.
/// The title goes through `escape_html`, which is what keeps document
/// titles from injecting markup into the artifact.
pub fn wrap_page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::normalize;
    use serde_json::json;

    fn media_index() -> HashMap<String, MediaItem> {
        let mut index = HashMap::new();
        index.insert(
            "m1".to_string(),
            MediaItem {
                id: "m1".into(),
                url: "https://cdn.example/m1.jpg".into(),
                alt: "A sunset".into(),
                mime: "image/jpeg".into(),
            },
        );
        index
    }

    #[test]
    fn escapes_title_markup() {
        let page = wrap_page("<script>alert(1)</script>", "<p>ok</p>");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[test]
    fn resolves_image_url_and_missing_alt() {
        let blocks = normalize(Some(&json!([
            { "name": "core/image", "attributes": { "mediaId": "m1" } }
        ])))
        .unwrap();
        let resolved = resolve_media(&blocks, &media_index());
        assert_eq!(resolved[0].attributes["url"], json!("https://cdn.example/m1.jpg"));
        assert_eq!(resolved[0].attributes["alt"], json!("A sunset"));
    }

    #[test]
    fn keeps_existing_alt_text() {
        let blocks = normalize(Some(&json!([
            { "name": "core/image", "attributes": { "mediaId": "m1", "alt": "Custom" } }
        ])))
        .unwrap();
        let resolved = resolve_media(&blocks, &media_index());
        assert_eq!(resolved[0].attributes["alt"], json!("Custom"));
    }

    #[test]
    fn resolves_nested_inner_blocks() {
        let blocks = normalize(Some(&json!([
            {
                "name": "core/group",
                "innerBlocks": [
                    { "name": "core/image", "attributes": { "id": "m1" } }
                ]
            }
        ])))
        .unwrap();
        let resolved = resolve_media(&blocks, &media_index());
        assert_eq!(
            resolved[0].inner_blocks[0].attributes["url"],
            json!("https://cdn.example/m1.jpg")
        );
    }

    #[test]
    fn renders_known_block_types() {
        let blocks = normalize(Some(&json!([
            { "name": "core/heading", "attributes": { "level": 1, "content": "Title" } },
            { "name": "core/paragraph", "attributes": { "content": "Body" } },
            { "name": "core/list", "attributes": { "items": ["a", "b"] } }
        ])))
        .unwrap();
        let html = render_blocks(&blocks);
        assert_eq!(html, "<h1>Title</h1><p>Body</p><ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn unknown_blocks_render_as_container() {
        let blocks = normalize(Some(&json!([
            { "name": "acme/callout", "attributes": { "content": "Hey" } }
        ])))
        .unwrap();
        let html = render_blocks(&blocks);
        assert_eq!(html, "<div data-block=\"acme/callout\">Hey</div>");
    }
}
