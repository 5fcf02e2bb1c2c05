use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use roxmltree::{Document, Node};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::comments::{CommentRecord, PostRecord, save_posts};

/// Namespace prefix shared by every WXR version (`1.0` through `1.2`).
pub const WXR_NAMESPACE_PREFIX: &str = "http://wordpress.org/export/";
/// Blog posts carry a `?p=<id>` permalink in their guid; pages and
/// attachments use other forms.
const POST_GUID_MARKER: &str = "?p=";

#[derive(Debug, Clone, Serialize)]
pub struct ExtractReport {
    pub source: String,
    pub output: String,
    pub posts: usize,
    pub comments: usize,
}

/// Pull posts and their comments out of a WordPress export (WXR) document.
///
/// Each `wp:comment` becomes a record keyed by its child element names with
/// the namespace dropped (`wp:comment_author` -> `comment_author`). Empty
/// elements map to `null`.
pub fn extract_posts(xml: &str) -> Result<Vec<PostRecord>> {
    let document = Document::parse(xml).context("failed to parse WordPress export")?;
    let root = document.root_element();
    let Some(channel) = root.children().find(|node| node.has_tag_name("channel")) else {
        bail!("WordPress export has no <channel> element");
    };

    let mut posts = Vec::new();
    for item in channel.children().filter(|node| node.has_tag_name("item")) {
        let is_post = child(item, "guid")
            .and_then(|guid| guid.text())
            .is_some_and(|guid| guid.contains(POST_GUID_MARKER));
        if !is_post {
            continue;
        }

        let comments = item
            .children()
            .filter(|node| is_wxr_element(*node, "comment"))
            .map(comment_record)
            .collect::<Result<Vec<_>>>()?;
        posts.push(PostRecord {
            title: child(item, "title").and_then(node_text),
            post_id: wxr_child(item, "post_id").and_then(node_text),
            post_name: wxr_child(item, "post_name").and_then(node_text),
            comments,
            extra: Default::default(),
        });
    }
    Ok(posts)
}

pub fn read_export_file(path: &Path) -> Result<Vec<PostRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    extract_posts(&content).with_context(|| format!("failed to extract {}", path.display()))
}

/// Convert the export at `xml_path` into the post JSON written to `json_path`.
pub fn extract_export_file(xml_path: &Path, json_path: &Path) -> Result<ExtractReport> {
    let posts = read_export_file(xml_path)?;
    save_posts(&posts, json_path)?;
    Ok(ExtractReport {
        source: xml_path.display().to_string(),
        output: json_path.display().to_string(),
        posts: posts.len(),
        comments: posts.iter().map(|post| post.comments.len()).sum(),
    })
}

fn comment_record(comment: Node<'_, '_>) -> Result<CommentRecord> {
    let mut fields = Map::new();
    // Nested groups such as `wp:commentmeta` have no text of their own.
    for field in comment
        .children()
        .filter(|node| in_wxr_namespace(*node) && !node.children().any(|inner| inner.is_element()))
    {
        let value = node_text(field).map(Value::String).unwrap_or(Value::Null);
        fields.insert(field.tag_name().name().to_string(), value);
    }
    serde_json::from_value(Value::Object(fields)).context("failed to read wp:comment")
}

fn in_wxr_namespace(node: Node<'_, '_>) -> bool {
    node.is_element()
        && node
            .tag_name()
            .namespace()
            .is_some_and(|namespace| namespace.starts_with(WXR_NAMESPACE_PREFIX))
}

fn is_wxr_element(node: Node<'_, '_>, name: &str) -> bool {
    in_wxr_namespace(node) && node.tag_name().name() == name
}

fn wxr_child<'a, 'input>(parent: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    parent.children().find(|node| is_wxr_element(*node, name))
}

fn child<'a, 'input>(parent: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    parent.children().find(|node| {
        node.is_element() && node.tag_name().namespace().is_none() && node.has_tag_name(name)
    })
}

fn node_text(node: Node<'_, '_>) -> Option<String> {
    let text: String = node
        .children()
        .filter(|inner| inner.is_text())
        .filter_map(|inner| inner.text())
        .collect();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::comments::{load_posts, thread_comments};

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<rss version="2.0"
    xmlns:content="http://purl.org/rss/1.0/modules/content/"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:wp="http://wordpress.org/export/1.2/">
<channel>
    <title>A blog</title>
    <wp:wxr_version>1.2</wp:wxr_version>
    <item>
        <title>Kalman filter</title>
        <link>https://site.com/2019/04/05/kalman-filter/</link>
        <dc:creator><![CDATA[admin]]></dc:creator>
        <guid isPermaLink="false">https://site.com/?p=42</guid>
        <content:encoded><![CDATA[<p>Body</p>]]></content:encoded>
        <wp:post_id>42</wp:post_id>
        <wp:post_name><![CDATA[kalman-filter]]></wp:post_name>
        <wp:comment>
            <wp:comment_id>7</wp:comment_id>
            <wp:comment_author><![CDATA[Ann]]></wp:comment_author>
            <wp:comment_author_IP><![CDATA[10.0.0.1]]></wp:comment_author_IP>
            <wp:comment_date_gmt><![CDATA[2019-04-06 10:00:00]]></wp:comment_date_gmt>
            <wp:comment_content><![CDATA[Nice <b>post</b> & thanks]]></wp:comment_content>
            <wp:comment_approved><![CDATA[1]]></wp:comment_approved>
            <wp:comment_parent>0</wp:comment_parent>
            <wp:comment_author_url></wp:comment_author_url>
            <wp:commentmeta>
                <wp:meta_key><![CDATA[akismet_result]]></wp:meta_key>
                <wp:meta_value><![CDATA[false]]></wp:meta_value>
            </wp:commentmeta>
        </wp:comment>
        <wp:comment>
            <wp:comment_id>8</wp:comment_id>
            <wp:comment_content><![CDATA[Reply]]></wp:comment_content>
            <wp:comment_parent>7</wp:comment_parent>
        </wp:comment>
    </item>
    <item>
        <title>About</title>
        <guid isPermaLink="false">https://site.com/?page_id=2</guid>
        <wp:post_id>2</wp:post_id>
        <wp:post_name><![CDATA[about]]></wp:post_name>
    </item>
    <item>
        <title>Quiet</title>
        <guid isPermaLink="false">https://site.com/?p=43</guid>
        <wp:post_id>43</wp:post_id>
        <wp:post_name><![CDATA[quiet]]></wp:post_name>
    </item>
</channel>
</rss>
"#;

    #[test]
    fn only_post_items_are_extracted() {
        let posts = extract_posts(EXPORT).expect("extract");
        let names: Vec<_> = posts.iter().map(|post| post.post_name.as_deref()).collect();
        assert_eq!(names, vec![Some("kalman-filter"), Some("quiet")]);
        assert_eq!(posts[0].title.as_deref(), Some("Kalman filter"));
        assert_eq!(posts[0].post_id.as_deref(), Some("42"));
        assert!(posts[1].comments.is_empty());
    }

    #[test]
    fn comment_fields_lose_their_namespace() {
        let posts = extract_posts(EXPORT).expect("extract");
        let first = &posts[0].comments[0];
        assert_eq!(first.comment_id, "7");
        assert_eq!(first.comment_author.as_deref(), Some("Ann"));
        assert_eq!(first.comment_author_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(first.content(), "Nice <b>post</b> & thanks");
        assert_eq!(first.comment_author_url, None);
        assert_eq!(first.extra["comment_approved"], Value::String("1".to_string()));
        assert!(!first.extra.contains_key("commentmeta"));

        let threads = thread_comments(&posts[0]).expect("thread");
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].replies[0].comment.content(), "Reply");
    }

    #[test]
    fn missing_channel_is_an_error() {
        let error = extract_posts("<rss></rss>").expect_err("must fail");
        assert!(error.to_string().contains("no <channel>"));
    }

    #[test]
    fn comment_without_id_is_an_error() {
        let xml = EXPORT.replace("<wp:comment_id>8</wp:comment_id>", "");
        let error = extract_posts(&xml).expect_err("must fail");
        assert!(format!("{error:#}").contains("comment_id"));
    }

    #[test]
    fn export_file_becomes_post_json() {
        let temp = tempdir().expect("tempdir");
        let xml_path = temp.path().join("export.xml");
        let json_path = temp.path().join("posts.json");
        fs::write(&xml_path, EXPORT).expect("write export");

        let report = extract_export_file(&xml_path, &json_path).expect("extract file");
        assert_eq!((report.posts, report.comments), (2, 2));

        let posts = load_posts(&json_path).expect("load json");
        assert_eq!(posts, extract_posts(EXPORT).expect("extract"));
    }
}
