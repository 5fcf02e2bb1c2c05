use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

pub const EDITABLE_EXTENSION: &str = "md";

/// A post from the export. Fields not modelled here are kept in `extra` and
/// written back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_name: Option<String>,
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentRecord {
    pub comment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_author_url: Option<String>,
    #[serde(
        rename = "comment_author_IP",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub comment_author_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_date_gmt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_content: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CommentRecord {
    pub fn id(&self) -> Result<i64> {
        parse_id(&self.comment_id)
            .with_context(|| format!("invalid comment_id {:?}", self.comment_id))
    }

    /// Parent comment id; `0` for top-level comments.
    pub fn parent_id(&self) -> Result<i64> {
        match self.comment_parent.as_deref() {
            None => Ok(0),
            Some(value) => parse_id(value).with_context(|| {
                format!(
                    "invalid comment_parent {value:?} on comment {}",
                    self.comment_id
                )
            }),
        }
    }

    pub fn content(&self) -> &str {
        self.comment_content.as_deref().unwrap_or_default()
    }
}

fn parse_id(value: &str) -> Result<i64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    Ok(value.parse::<i64>()?)
}

pub fn load_posts(path: &Path) -> Result<Vec<PostRecord>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_posts(posts: &[PostRecord], path: &Path) -> Result<()> {
    let rendered = serde_json::to_string_pretty(posts).context("failed to serialize posts")?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}

#[derive(Debug, Clone, Serialize)]
pub struct EditableReport {
    pub directory: String,
    pub files_written: usize,
}

/// Write each comment's content to `<comment_id>.md` under `directory`.
pub fn write_editable(posts: &[PostRecord], directory: &Path) -> Result<EditableReport> {
    fs::create_dir_all(directory)
        .with_context(|| format!("failed to create {}", directory.display()))?;

    let mut files_written = 0usize;
    for comment in posts.iter().flat_map(|post| &post.comments) {
        let target = directory.join(format!("{}.{EDITABLE_EXTENSION}", comment.id()?));
        fs::write(&target, comment.content())
            .with_context(|| format!("failed to write {}", target.display()))?;
        files_written += 1;
    }

    Ok(EditableReport {
        directory: directory.display().to_string(),
        files_written,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyEditableReport {
    pub files_read: usize,
    pub comments_changed: usize,
}

/// Replace comment content with the text of the editable file(s) at
/// `editable`, which may be one `<comment_id>.md` file or a directory of them.
pub fn apply_editable(posts: &mut [PostRecord], editable: &Path) -> Result<ApplyEditableReport> {
    let files = editable_files(editable)?;

    let mut by_id: HashMap<i64, &mut CommentRecord> = HashMap::new();
    for comment in posts.iter_mut().flat_map(|post| post.comments.iter_mut()) {
        by_id.insert(comment.id()?, comment);
    }

    let mut comments_changed = 0usize;
    for file in &files {
        let stem = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let Ok(comment_id) = stem.parse::<i64>() else {
            bail!("{} is not named after a comment id", file.display());
        };
        let Some(comment) = by_id.get_mut(&comment_id) else {
            bail!("no comment with id {comment_id} (from {})", file.display());
        };
        let content = fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        if comment.comment_content.as_deref() != Some(content.as_str()) {
            comments_changed += 1;
        }
        comment.comment_content = Some(content);
    }

    Ok(ApplyEditableReport {
        files_read: files.len(),
        comments_changed,
    })
}

/// Load `source`, apply the editable file(s), and write the result to `destination`.
pub fn editable_to_json(
    source: &Path,
    editable: &Path,
    destination: &Path,
) -> Result<ApplyEditableReport> {
    let mut posts = load_posts(source)?;
    let report = apply_editable(&mut posts, editable)?;
    save_posts(&posts, destination)?;
    Ok(report)
}

fn editable_files(editable: &Path) -> Result<Vec<PathBuf>> {
    if editable.is_file() {
        return Ok(vec![editable.to_path_buf()]);
    }
    if !editable.is_dir() {
        bail!("{} does not exist", editable.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(editable).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to read {}", editable.display()))?;
        let is_editable = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|extension| extension == EDITABLE_EXTENSION);
        if is_editable {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode<'a> {
    pub comment: &'a CommentRecord,
    pub replies: Vec<CommentNode<'a>>,
}

impl CommentNode<'_> {
    pub fn count(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::count).sum::<usize>()
    }
}

/// Arrange a post's comments into reply trees, keeping export order among
/// siblings. Every comment must end up in some tree.
pub fn thread_comments(post: &PostRecord) -> Result<Vec<CommentNode<'_>>> {
    let mut index_by_id = HashMap::new();
    for (index, comment) in post.comments.iter().enumerate() {
        if index_by_id.insert(comment.id()?, index).is_some() {
            bail!("duplicate comment id {}", comment.comment_id);
        }
    }

    let mut roots = Vec::new();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); post.comments.len()];
    for (index, comment) in post.comments.iter().enumerate() {
        let parent = comment.parent_id()?;
        if parent == 0 {
            roots.push(index);
            continue;
        }
        let Some(&parent_index) = index_by_id.get(&parent) else {
            bail!(
                "comment {} replies to unknown comment {parent}",
                comment.comment_id
            );
        };
        children[parent_index].push(index);
    }

    // Self-replies and reply cycles never lead back to a top-level comment.
    let mut reached = vec![false; post.comments.len()];
    let mut pending = roots.clone();
    while let Some(index) = pending.pop() {
        reached[index] = true;
        pending.extend(&children[index]);
    }
    let unreachable: Vec<&str> = post
        .comments
        .iter()
        .zip(&reached)
        .filter(|(_, reached)| !**reached)
        .map(|(comment, _)| comment.comment_id.as_str())
        .collect();
    if !unreachable.is_empty() {
        bail!(
            "comments {} are not reachable from a top-level comment",
            unreachable.join(", ")
        );
    }

    fn build<'a>(
        comments: &'a [CommentRecord],
        children: &[Vec<usize>],
        index: usize,
    ) -> CommentNode<'a> {
        CommentNode {
            comment: &comments[index],
            replies: children[index]
                .iter()
                .map(|&child| build(comments, children, child))
                .collect(),
        }
    }

    Ok(roots
        .into_iter()
        .map(|index| build(&post.comments, &children, index))
        .collect())
}
