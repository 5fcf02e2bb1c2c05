use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use walkdir::WalkDir;

use crate::comments::{CommentNode, CommentRecord, PostRecord, thread_comments};

pub const COMMENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ISSO_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS threads (
    id INTEGER PRIMARY KEY,
    uri VARCHAR(256) UNIQUE,
    title VARCHAR(256)
);
CREATE TABLE IF NOT EXISTS comments (
    tid REFERENCES threads(id),
    id INTEGER PRIMARY KEY,
    parent INTEGER,
    created FLOAT NOT NULL,
    modified FLOAT,
    mode INTEGER,
    remote_addr VARCHAR,
    text VARCHAR,
    author VARCHAR,
    email VARCHAR,
    website VARCHAR,
    likes INTEGER DEFAULT 0,
    dislikes INTEGER DEFAULT 0,
    voters BLOB NOT NULL,
    notification INTEGER DEFAULT 0
);
";

/// Accepted comment.
const MODE_ACCEPTED: i64 = 1;

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct CommentImportReport {
    pub posts_with_comments: usize,
    pub threads_created: usize,
    pub threads_reused: usize,
    pub comments_inserted: usize,
}

fn post_file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-(.+)\.md$").expect("post file regex must compile")
    })
}

/// Thread URI for a post file named `YYYY-MM-DD-<name>.md`, keyed by `<name>`.
pub fn post_uri(file_name: &str) -> Option<(String, String)> {
    let captures = post_file_pattern().captures(file_name)?;
    let name = captures[4].to_string();
    let uri = format!("/{}/{}/{}/{name}/", &captures[1], &captures[2], &captures[3]);
    Some((name, uri))
}

/// Map post names to thread URIs for every dated post file in `posts_dir`.
pub fn post_uris(posts_dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut uris = BTreeMap::new();
    for entry in WalkDir::new(posts_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to read {}", posts_dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some((name, uri)) = entry.file_name().to_str().and_then(post_uri) {
            uris.insert(name, uri);
        }
    }
    Ok(uris)
}

pub fn comment_timestamp(value: &str) -> Result<f64> {
    let parsed = NaiveDateTime::parse_from_str(value.trim(), COMMENT_DATE_FORMAT)
        .with_context(|| format!("invalid comment date {value:?}"))?;
    Ok(parsed.and_utc().timestamp() as f64)
}

pub fn open_comment_db(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    ensure_isso_schema(&connection)?;
    Ok(connection)
}

pub fn ensure_isso_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(ISSO_SCHEMA)
        .context("failed to create comment server tables")
}

/// Insert every commented post's comments into the comment database,
/// creating threads as needed. Nothing is written if any post fails.
pub fn import_comments(
    connection: &Connection,
    posts: &[PostRecord],
    uris: &BTreeMap<String, String>,
) -> Result<CommentImportReport> {
    connection
        .execute_batch("SAVEPOINT comment_import")
        .context("failed to create savepoint")?;

    let result = (|| -> Result<CommentImportReport> {
        let mut report = CommentImportReport::default();
        for post in posts.iter().filter(|post| !post.comments.is_empty()) {
            import_post(connection, post, uris, &mut report)?;
        }
        Ok(report)
    })();

    match result {
        Ok(report) => {
            connection
                .execute_batch("RELEASE SAVEPOINT comment_import")
                .context("failed to release savepoint")?;
            Ok(report)
        }
        Err(err) => {
            let _ = connection.execute_batch("ROLLBACK TO SAVEPOINT comment_import");
            let _ = connection.execute_batch("RELEASE SAVEPOINT comment_import");
            Err(err)
        }
    }
}

pub fn import_comments_file(
    db_path: &Path,
    posts: &[PostRecord],
    posts_dir: &Path,
) -> Result<CommentImportReport> {
    let uris = post_uris(posts_dir)?;
    let connection = open_comment_db(db_path)?;
    import_comments(&connection, posts, &uris)
}

fn import_post(
    connection: &Connection,
    post: &PostRecord,
    uris: &BTreeMap<String, String>,
    report: &mut CommentImportReport,
) -> Result<()> {
    let Some(post_name) = post.post_name.as_deref() else {
        bail!(
            "post {:?} has comments but no post_name",
            post.title.as_deref().unwrap_or_default()
        );
    };
    let Some(uri) = uris.get(post_name) else {
        bail!("no post file found for post_name {post_name}");
    };

    let existing: Option<i64> = connection
        .query_row("SELECT id FROM threads WHERE uri = ?1", [uri], |row| row.get(0))
        .optional()
        .with_context(|| format!("failed to look up thread {uri}"))?;
    let thread_id = match existing {
        Some(id) => {
            report.threads_reused += 1;
            id
        }
        None => {
            connection
                .execute(
                    "INSERT INTO threads (uri, title) VALUES (?1, ?2)",
                    params![uri, ""],
                )
                .with_context(|| format!("failed to create thread {uri}"))?;
            report.threads_created += 1;
            connection.last_insert_rowid()
        }
    };

    let threads = thread_comments(post).with_context(|| format!("failed to thread {post_name}"))?;
    for node in &threads {
        insert_comment_tree(connection, thread_id, None, node, report)?;
    }
    report.posts_with_comments += 1;
    Ok(())
}

fn insert_comment_tree(
    connection: &Connection,
    thread_id: i64,
    parent: Option<i64>,
    node: &CommentNode<'_>,
    report: &mut CommentImportReport,
) -> Result<()> {
    let inserted = insert_comment(connection, thread_id, parent, node.comment)?;
    report.comments_inserted += 1;
    for reply in &node.replies {
        insert_comment_tree(connection, thread_id, Some(inserted), reply, report)?;
    }
    Ok(())
}

fn insert_comment(
    connection: &Connection,
    thread_id: i64,
    parent: Option<i64>,
    comment: &CommentRecord,
) -> Result<i64> {
    let Some(date) = comment.comment_date_gmt.as_deref() else {
        bail!("comment {} has no comment_date_gmt", comment.comment_id);
    };
    let created = comment_timestamp(date)?;
    connection
        .execute(
            "INSERT INTO comments (tid, parent, created, mode, remote_addr, text, author, email, website, voters, notification)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                thread_id,
                parent,
                created,
                MODE_ACCEPTED,
                comment.comment_author_ip,
                comment.comment_content,
                comment.comment_author,
                comment.comment_author_email,
                comment.comment_author_url,
                "",
                1i64,
            ],
        )
        .with_context(|| format!("failed to insert comment {}", comment.comment_id))?;
    Ok(connection.last_insert_rowid())
}
