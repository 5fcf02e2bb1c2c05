use std::sync::OnceLock;

use regex::Regex;

use crate::html::parse_start_tag;

const ANCHOR_CLOSE: &str = "</a>";

/// The blog's own domain; URLs on it become cross-reference shortcodes.
#[derive(Debug, Clone)]
pub struct SiteDomain {
    domain: String,
    pattern: Regex,
}

impl SiteDomain {
    /// Accepts a bare host (`example.com`) or a base URL (`https://www.example.com/`).
    pub fn new(domain: &str) -> Option<Self> {
        let domain = normalize_domain(domain)?;
        let pattern = Regex::new(&format!(
            r"^(?i:https?://(?:www\.)?{}(?::\d+)?)(?P<path>/[^?#]*)?(?:[?#].*)?$",
            regex::escape(&domain)
        ))
        .ok()?;
        Some(Self { domain, pattern })
    }

    pub fn as_str(&self) -> &str {
        &self.domain
    }

    /// `ref` shortcode for a page URL on this site. Returns `None` for external
    /// URLs, the site root, and paths that end in a file name (uploads, feeds).
    pub fn ref_shortcode(&self, url: &str) -> Option<String> {
        let captures = self.pattern.captures(url.trim())?;
        let path = captures.name("path")?.as_str().trim_matches('/');
        if path.is_empty() {
            return None;
        }
        let last_segment = path.rsplit('/').next().unwrap_or(path);
        if last_segment.contains('.') {
            return None;
        }
        Some(ref_shortcode_for_path(path))
    }
}

pub fn normalize_domain(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .trim_start_matches("www.")
        .to_ascii_lowercase();
    if host.is_empty() { None } else { Some(host) }
}

/// `{{< ref "a-b.md" >}}` for the URL path `/a/b/`.
pub fn ref_shortcode_for_path(path: &str) -> String {
    let slug = path.trim_matches('/').replace('/', "-");
    format!("{{{{< ref \"{slug}.md\" >}}}}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRewrite {
    pub text: String,
    pub rewritten: usize,
}

/// Replace each `<a href=...>text</a>` span with `[text](url)`, or with a
/// `ref` shortcode when the URL is on `site`.
///
/// Openers and closers are paired by position: the Nth `<a` goes with the Nth
/// `</a>`. Nested or unbalanced anchors are therefore not handled; pairs that
/// overlap an earlier replacement or close before they open are left alone.
pub fn rewrite_hyperlinks(text: &str, site: Option<&SiteDomain>) -> LinkRewrite {
    let opens: Vec<usize> = anchor_open_pattern()
        .find_iter(text)
        .map(|found| found.start())
        .collect();
    let closes: Vec<usize> = anchor_close_pattern()
        .find_iter(text)
        .map(|found| found.start())
        .collect();

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    let mut rewritten = 0usize;

    for (open, close) in opens.into_iter().zip(closes) {
        if open < cursor || close < open {
            continue;
        }
        let Some((tag, tag_len)) = parse_start_tag(&text[open..]) else {
            continue;
        };
        let text_start = open + tag_len;
        if text_start > close {
            continue;
        }
        let Some(href) = tag.attr("href").filter(|href| !href.trim().is_empty()) else {
            continue;
        };

        let visible = text[text_start..close].trim_start();
        let replacement = match site.and_then(|site| site.ref_shortcode(href)) {
            Some(shortcode) => shortcode,
            None => format!("[{visible}]({})", href.trim()),
        };

        out.push_str(&text[cursor..open]);
        out.push_str(&replacement);
        cursor = close + ANCHOR_CLOSE.len();
        rewritten += 1;
    }
    out.push_str(&text[cursor..]);

    LinkRewrite {
        text: out,
        rewritten,
    }
}

fn anchor_open_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)<a[\s>]").expect("valid anchor regex"))
}

fn anchor_close_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)</a>").expect("valid anchor regex"))
}
