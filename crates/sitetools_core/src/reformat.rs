use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::html::{find_start_tag, parse_start_tag, text_content};
use crate::hyperlink::{SiteDomain, rewrite_hyperlinks};
use crate::wrap::{DEFAULT_MAX_WIDTH, display_width, wrap_line};

pub const FRONT_MATTER_DELIMITER: &str = "---";
pub const HIGHLIGHT_FOOTER: &str = "{{< / highlight >}}";
pub const DEFAULT_LANGUAGE: &str = "plain";

/// Replacements applied to every plain line, in order.
const SUBSTITUTIONS: &[(&str, &str)] = &[
    ("&#8211;", "–"),
    ("&ndash;", "–"),
    ("&#8212;", "—"),
    ("&mdash;", "—"),
    ("&#176;", "°"),
    ("&deg;", "°"),
    ("&#160;", " "),
    ("&nbsp;", " "),
    ("\u{a0}", " "),
    ("&alpha;", "α"),
    ("&beta;", "β"),
    ("&gamma;", "γ"),
    ("&delta;", "δ"),
    ("&Delta;", "Δ"),
    ("&epsilon;", "ε"),
    ("&theta;", "θ"),
    ("&lambda;", "λ"),
    ("&mu;", "μ"),
    ("&pi;", "π"),
    ("&rho;", "ρ"),
    ("&sigma;", "σ"),
    ("&Sigma;", "Σ"),
    ("&tau;", "τ"),
    ("&phi;", "φ"),
    ("&omega;", "ω"),
    ("&Omega;", "Ω"),
    ("$latex ", "$"),
    ("\\(", "$"),
    ("\\)", "$"),
];

#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub max_line_len: usize,
    pub site: Option<SiteDomain>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_WIDTH,
            site: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReformatError {
    #[error(
        "line {line}: a <pre> marker split off a paragraph must be followed by a <code> line, found {found:?}"
    )]
    MisplacedCodeMarker { line: usize, found: String },
    #[error("line {line}: <pre> block is never closed")]
    UnterminatedCodeBlock { line: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormatStats {
    pub wrapped_lines: usize,
    pub unwrappable_lines: usize,
    pub code_blocks: usize,
    pub images: usize,
    pub split_markers: usize,
    pub rewritten_refs: usize,
    pub rewritten_links: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPost {
    pub text: String,
    pub stats: FormatStats,
}

/// Reformat a whole post: front matter passes through untouched, the body is
/// rewritten line by line, and anchors are converted across the result.
pub fn format_post(source: &str, options: &FormatOptions) -> Result<FormattedPost, ReformatError> {
    let lines: Vec<&str> = source.lines().map(str::trim_end).collect();
    let (header, body) = split_front_matter(&lines);

    let mut stats = FormatStats::default();
    let body = split_code_markers(body, header.len(), &mut stats)?;

    let mut reformatter = Reformatter {
        options,
        out: Vec::with_capacity(body.len()),
        stats,
    };
    reformatter.run(&body, header.len())?;
    let Reformatter {
        out: formatted,
        mut stats,
        ..
    } = reformatter;

    let mut assembled: Vec<&str> = header.to_vec();
    assembled.extend(formatted.iter().map(String::as_str));
    let joined = assembled.join("\n");

    let links = rewrite_hyperlinks(&joined, options.site.as_ref());
    stats.rewritten_links = links.rewritten;

    let mut text = links.text;
    if !text.is_empty() {
        text.push('\n');
    }
    Ok(FormattedPost { text, stats })
}

pub fn format_file(path: &Path, options: &FormatOptions) -> Result<FormattedPost> {
    let source =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    format_post(&source, options).with_context(|| format!("failed to format {}", path.display()))
}

pub fn format_post_file(source: &Path, destination: &Path, options: &FormatOptions) -> Result<FormatStats> {
    let formatted = format_file(source, options)?;
    if let Some(parent) = destination.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(destination, &formatted.text)
        .with_context(|| format!("failed to write {}", destination.display()))?;
    Ok(formatted.stats)
}

/// Front matter is everything up to and including the second `---` line when
/// the document starts with `---`. An unclosed block makes the whole document
/// front matter.
pub fn split_front_matter<'a, 'b>(lines: &'b [&'a str]) -> (&'b [&'a str], &'b [&'a str]) {
    if lines.first() != Some(&FRONT_MATTER_DELIMITER) {
        return (&[], lines);
    }
    match lines
        .iter()
        .skip(1)
        .position(|line| *line == FRONT_MATTER_DELIMITER)
    {
        Some(index) => lines.split_at(index + 2),
        None => (lines, &[]),
    }
}

/// Move a `<pre ...>` marker glued to the end of a paragraph onto its own line
/// and remove the indentation the exporter added to the block below it.
fn split_code_markers(
    body: &[&str],
    line_offset: usize,
    stats: &mut FormatStats,
) -> Result<Vec<String>, ReformatError> {
    let mut out = Vec::with_capacity(body.len() + 4);
    let mut index = 0usize;

    while index < body.len() {
        let line = body[index];
        if let Some(end) = verbatim_region_end(body, index) {
            out.extend(body[index..=end].iter().map(|line| line.to_string()));
            index = end + 1;
            continue;
        }
        let Some((paragraph, marker)) = split_trailing_pre(line) else {
            out.push(line.to_string());
            index += 1;
            continue;
        };
        out.push(paragraph.trim_end().to_string());
        out.push(marker.to_string());
        stats.split_markers += 1;

        let next_index = index + 1;
        let next = body.get(next_index).copied().unwrap_or("");
        if !next.trim_start().starts_with("<code") {
            return Err(ReformatError::MisplacedCodeMarker {
                line: line_offset + next_index + 1,
                found: next.trim().to_string(),
            });
        }
        let indent = &next[..next.len() - next.trim_start_matches([' ', '\t']).len()];

        let mut cursor = next_index;
        while cursor < body.len() {
            let inner = body[cursor];
            out.push(strip_indent(inner, indent).to_string());
            cursor += 1;
            if inner.contains("</pre>") {
                break;
            }
        }
        index = cursor;
    }
    Ok(out)
}

/// Last line of a region the marker fix-up must not touch: a highlight block
/// from an earlier run, or a `<pre>` block that already starts its own line.
fn verbatim_region_end(body: &[&str], index: usize) -> Option<usize> {
    let line = body[index].trim();
    if line.starts_with("{{< highlight") {
        return body[index..]
            .iter()
            .position(|candidate| candidate.trim() == HIGHLIGHT_FOOTER)
            .map(|offset| index + offset);
    }
    if line.starts_with("<pre") {
        let offset = body[index..]
            .iter()
            .position(|candidate| candidate.contains("</pre>"))
            .unwrap_or(body.len() - index - 1);
        return Some(index + offset);
    }
    None
}

fn split_trailing_pre(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_end();
    let index = trimmed.rfind("<pre")?;
    let (paragraph, marker) = trimmed.split_at(index);
    if paragraph.trim().is_empty() || !marker.ends_with('>') || marker[1..].contains('<') {
        return None;
    }
    let after_name = marker["<pre".len()..].chars().next();
    if !after_name.is_some_and(|ch| ch == '>' || ch.is_whitespace()) {
        return None;
    }
    Some((paragraph, marker))
}

fn strip_indent<'a>(line: &'a str, indent: &str) -> &'a str {
    if let Some(rest) = line.strip_prefix(indent) {
        return rest;
    }
    let skip = line
        .bytes()
        .take(indent.len())
        .take_while(|byte| *byte == b' ' || *byte == b'\t')
        .count();
    &line[skip..]
}

struct Reformatter<'o> {
    options: &'o FormatOptions,
    out: Vec<String>,
    stats: FormatStats,
}

impl Reformatter<'_> {
    fn run(&mut self, body: &[String], line_offset: usize) -> Result<(), ReformatError> {
        let mut index = 0usize;
        while index < body.len() {
            let line = body[index].trim();
            if line.starts_with("<pre") {
                let close = body[index..]
                    .iter()
                    .position(|candidate| candidate.contains("</pre>"))
                    .map(|offset| index + offset)
                    .ok_or(ReformatError::UnterminatedCodeBlock {
                        line: line_offset + index + 1,
                    })?;
                self.code_block(&body[index..=close]);
                index = close + 1;
                continue;
            }
            if line.starts_with("{{< highlight")
                && let Some(offset) = body[index..]
                    .iter()
                    .position(|candidate| candidate.trim() == HIGHLIGHT_FOOTER)
            {
                // Already converted on an earlier run; keep it verbatim.
                self.out.extend(body[index..=index + offset].iter().cloned());
                index += offset + 1;
                continue;
            }
            if line.starts_with("<img") && self.image(line) {
                index += 1;
                continue;
            }
            self.plain(line);
            index += 1;
        }
        Ok(())
    }

    fn code_block(&mut self, block: &[String]) {
        let block = block.join("\n");
        self.out.push(highlight_header(&block));

        // Only the newlines hugging `<code>` and `</code>` are markup; blank
        // lines inside the code are kept.
        let text = text_content(code_region(&block));
        let text = text.strip_prefix('\n').unwrap_or(text.as_str());
        let text = text.strip_suffix('\n').unwrap_or(text);
        if !text.is_empty() {
            self.out.extend(text.split('\n').map(str::to_string));
        }
        self.out.push(HIGHLIGHT_FOOTER.to_string());
        self.stats.code_blocks += 1;
    }

    fn image(&mut self, line: &str) -> bool {
        let Some((tag, consumed)) = parse_start_tag(line) else {
            return false;
        };
        let Some(src) = tag.attr("src").filter(|src| !src.trim().is_empty()) else {
            return false;
        };
        let file_name = src.trim().rsplit('/').next().unwrap_or(src);
        let shortcode = format!("{{{{< figure src=/img/{} >}}}}", original_asset_name(file_name));
        self.out.push(format!("{shortcode}{}", &line[consumed..]));
        self.stats.images += 1;
        true
    }

    fn plain(&mut self, line: &str) {
        let line = substitute_characters(line);

        if let Some(definition) = self.reference_definition(&line) {
            self.out.push(definition);
            return;
        }

        let max = self.options.max_line_len;
        if display_width(&line) <= max {
            self.out.push(line);
            return;
        }
        match wrap_line(&line, max) {
            Ok(lines) => {
                self.stats.wrapped_lines += 1;
                self.out.extend(lines);
            }
            Err(_) => {
                self.stats.unwrappable_lines += 1;
                self.out.push(line);
            }
        }
    }

    /// `[n]: url` lines are never wrapped; site URLs become `ref` shortcodes.
    fn reference_definition(&mut self, line: &str) -> Option<String> {
        let captures = reference_definition_pattern().captures(line)?;
        let url = &captures["url"];
        let shortcode = self
            .options
            .site
            .as_ref()
            .and_then(|site| site.ref_shortcode(url));
        match shortcode {
            Some(shortcode) => {
                self.stats.rewritten_refs += 1;
                Some(format!(
                    "{}{shortcode}{}",
                    &captures["label"], &captures["rest"]
                ))
            }
            None => Some(line.to_string()),
        }
    }
}

/// The `<code>` element of a block, or the whole block when it has none.
fn code_region(block: &str) -> &str {
    let Some(start) = block.find("<code") else {
        return block;
    };
    match block.rfind("</code>") {
        Some(end) if end > start => &block[start..end + "</code>".len()],
        _ => &block[start..],
    }
}

/// `{{< highlight <lang> ["linenos=true[,linenostart=N]" ]>}}` for a `<pre>` block.
pub fn highlight_header(block: &str) -> String {
    let mut line_numbers = String::new();
    if let Some(pre) = find_start_tag(block, "pre")
        && pre.has_class("line-numbers")
    {
        let start = pre
            .attr("data-start")
            .map(str::trim)
            .filter(|start| !start.is_empty())
            .map(|start| format!(",linenostart={start}"))
            .unwrap_or_default();
        line_numbers = format!("\"linenos=true{start}\" ");
    }

    let language = find_start_tag(block, "code")
        .and_then(|code| {
            code.classes()
                .first()
                .and_then(|class| class.strip_prefix("language-"))
                .filter(|language| !language.is_empty() && *language != "none")
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    format!("{{{{< highlight {language} {line_numbers}>}}}}")
}

/// Strip the resize suffix WordPress adds to uploads:
/// `photo-1024x768.jpg` -> `photo.jpg`.
pub fn original_asset_name(file_name: &str) -> String {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<base>.+?)(?:-[0-9x-]*)?(?P<ext>\.[^./]{3})$").expect("valid asset regex")
    });
    match pattern.captures(file_name) {
        Some(captures) => format!("{}{}", &captures["base"], &captures["ext"]),
        None => file_name.to_string(),
    }
}

pub fn substitute_characters(line: &str) -> String {
    SUBSTITUTIONS
        .iter()
        .fold(line.to_string(), |acc, (from, to)| {
            if acc.contains(from) {
                acc.replace(from, to)
            } else {
                acc
            }
        })
}

fn reference_definition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<label>\[\d+\]:\s+)(?P<url>\S+)(?P<rest>.*)$")
            .expect("valid reference regex")
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn options() -> FormatOptions {
        FormatOptions {
            max_line_len: 40,
            site: SiteDomain::new("site.com"),
        }
    }

    fn body(source: &str) -> String {
        format_post(source, &options()).expect("format").text
    }

    #[test]
    fn front_matter_passes_through_unwrapped() {
        let source = "---\ntitle: \"A very long title that would otherwise be wrapped by the formatter\"\n---\nshort\n";
        assert_eq!(body(source), source);
    }

    #[test]
    fn missing_front_matter_formats_everything() {
        let source = "one two three four five six seven eight nine ten eleven\n";
        assert_eq!(
            body(source),
            "one two three four five six seven eight\nnine ten eleven\n"
        );
    }

    #[test]
    fn delimiters_after_line_one_are_body_text() {
        let lines = ["intro", "---", "title: x", "---"];
        let (header, rest) = split_front_matter(&lines);
        assert!(header.is_empty());
        assert_eq!(rest.len(), 4);

        let source = "  intro\n---\ntitle: A very long title that would otherwise be wrapped by the formatter\n---\n";
        assert_eq!(
            body(source),
            "intro\n---\ntitle: A very long title that would\notherwise be wrapped by the formatter\n---\n"
        );
    }

    #[test]
    fn unclosed_front_matter_is_left_alone() {
        let source = "---\ntitle: x\none two three four five six seven eight nine ten eleven\n";
        assert_eq!(body(source), source);
    }

    #[test]
    fn plain_lines_are_stripped() {
        assert_eq!(body("   indented   \n"), "indented\n");
    }

    #[test]
    fn long_lines_wrap_and_count() {
        let formatted = format_post(
            "alpha beta gamma delta epsilon zeta eta theta iota kappa\n",
            &options(),
        )
        .expect("format");
        assert_eq!(
            formatted.text,
            "alpha beta gamma delta epsilon zeta eta\ntheta iota kappa\n"
        );
        assert_eq!(formatted.stats.wrapped_lines, 1);
    }

    #[test]
    fn unbalanced_long_line_is_kept_whole() {
        let line = "when a < b the comparison holds for every value in the set";
        let formatted = format_post(&format!("{line}\n"), &options()).expect("format");
        assert_eq!(formatted.text, format!("{line}\n"));
        assert_eq!(formatted.stats.unwrappable_lines, 1);
    }

    #[test]
    fn code_block_becomes_highlight_shortcode() {
        let source = "<pre class=\"line-numbers\" data-start=\"5\"><code class=\"language-python\">def f(x):\n    return x &lt; 2\n</code></pre>\n";
        assert_eq!(
            body(source),
            "{{< highlight python \"linenos=true,linenostart=5\" >}}\ndef f(x):\n    return x < 2\n{{< / highlight >}}\n"
        );
    }

    #[test]
    fn code_block_lines_are_never_wrapped() {
        let long = "x = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17]";
        let source = format!("<pre><code>{long}\n</code></pre>\n");
        assert_eq!(
            body(&source),
            format!("{{{{< highlight plain >}}}}\n{long}\n{{{{< / highlight >}}}}\n")
        );
    }

    #[test]
    fn highlight_header_variants() {
        assert_eq!(
            highlight_header(r#"<pre class="line-numbers"><code class="language-rust">"#),
            r#"{{< highlight rust "linenos=true" >}}"#
        );
        assert_eq!(
            highlight_header(r#"<pre><code class="language-none">"#),
            "{{< highlight plain >}}"
        );
        assert_eq!(highlight_header("<pre>"), "{{< highlight plain >}}");
    }

    #[test]
    fn unterminated_code_block_fails() {
        let error = format_post("---\nt: 1\n---\n<pre><code>x\n", &options()).expect_err("must fail");
        assert_eq!(error, ReformatError::UnterminatedCodeBlock { line: 4 });
    }

    #[test]
    fn image_becomes_figure_shortcode() {
        let source = "<img class=\"aligncenter\" src=\"https://site.com/wp-content/uploads/2020/01/graph-1024x768.png\" alt=\"\" />\n";
        assert_eq!(body(source), "{{< figure src=/img/graph.png >}}\n");
    }

    #[test]
    fn original_asset_names() {
        assert_eq!(original_asset_name("photo-1024x768.jpg"), "photo.jpg");
        assert_eq!(original_asset_name("my-photo.jpg"), "my-photo.jpg");
        assert_eq!(original_asset_name("chart-2.png"), "chart.png");
        assert_eq!(original_asset_name("archive.jpeg"), "archive.jpeg");
    }

    #[test]
    fn image_without_src_is_plain() {
        assert_eq!(body("<img alt=\"none\">\n"), "<img alt=\"none\">\n");
    }

    #[test]
    fn character_substitutions_apply_to_plain_lines() {
        assert_eq!(
            substitute_characters("5&deg;C&nbsp;&#8211; &alpha; \\(x^2\\) $latex y$"),
            "5°C – α $x^2$ $y$"
        );
    }

    #[test]
    fn reference_definitions_are_never_wrapped() {
        let source = "[3]: https://example.org/a/very/long/path/that/exceeds/the/limit/for/sure\n";
        assert_eq!(body(source), source);
    }

    #[test]
    fn site_reference_definitions_become_shortcodes() {
        let formatted =
            format_post("[1]: https://site.com/2019/05/01/post/\n", &options()).expect("format");
        assert_eq!(formatted.text, "[1]: {{< ref \"2019-05-01-post.md\" >}}\n");
        assert_eq!(formatted.stats.rewritten_refs, 1);
    }

    #[test]
    fn anchors_are_rewritten_after_wrapping() {
        let source = "Read <a href=\"https://example.com/x/\">this article</a> today.\n";
        let formatted = format_post(source, &options()).expect("format");
        assert_eq!(
            formatted.text,
            "Read\n[this\narticle](https://example.com/x/) today.\n"
        );
        assert_eq!(formatted.stats.rewritten_links, 1);
    }

    #[test]
    fn glued_pre_marker_is_split_and_dedented() {
        let source = "Here is the code:<pre class=\"line-numbers\">\n    <code class=\"language-c\">int x;\n        x++;\n    </code></pre>\nafter\n";
        let formatted = format_post(source, &options()).expect("format");
        assert_eq!(
            formatted.text,
            "Here is the code:\n{{< highlight c \"linenos=true\" >}}\nint x;\n    x++;\n{{< / highlight >}}\nafter\n"
        );
        assert_eq!(formatted.stats.split_markers, 1);
        assert_eq!(formatted.stats.code_blocks, 1);
    }

    #[test]
    fn glued_pre_marker_without_code_line_aborts() {
        let source = "---\nt: 1\n---\nText here:<pre>\nnot code\n</pre>\n";
        let error = format_post(source, &options()).expect_err("must fail");
        assert_eq!(
            error,
            ReformatError::MisplacedCodeMarker {
                line: 5,
                found: "not code".to_string()
            }
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let source = "---\ntitle: t\n---\n# Heading\n\nSome &mdash; text that is long enough to need wrapping at forty columns.\n<pre><code class=\"language-sh\">ls -la\n</code></pre>\n<img src=\"/u/a-10x10.png\">\n[1]: https://site.com/a/b/\nSee <a href=\"https://e.org/\">e</a>.\n";
        let first = format_post(source, &options()).expect("first pass").text;
        let second = format_post(&first, &options()).expect("second pass").text;
        assert_eq!(first, second);
    }

    #[test]
    fn escaped_markup_inside_code_survives_second_pass() {
        let source = "<pre><code class=\"language-html\">&lt;p&gt;Example:&lt;pre class=\"x\"&gt;\n&lt;code&gt;hi&lt;/code&gt;&lt;/pre&gt;\n</code></pre>\n";
        let first = body(source);
        assert_eq!(
            first,
            "{{< highlight html >}}\n<p>Example:<pre class=\"x\">\n<code>hi</code></pre>\n{{< / highlight >}}\n"
        );
        let second = format_post(&first, &options()).expect("second pass").text;
        assert_eq!(second, first);
    }

    #[test]
    fn pre_marker_inside_highlight_block_is_not_split() {
        let source = "{{< highlight html >}}\n<div>Example:<pre>\nplain text\n{{< / highlight >}}\n";
        let formatted = format_post(source, &options()).expect("highlight block passes through");
        assert_eq!(formatted.text, source);
        assert_eq!(formatted.stats.split_markers, 0);
    }

    #[test]
    fn pre_marker_inside_raw_pre_block_is_not_split() {
        let source = "<pre>\nsee below:<pre>\n</pre>\n";
        assert_eq!(
            body(source),
            "{{< highlight plain >}}\nsee below:\n{{< / highlight >}}\n"
        );
    }

    #[test]
    fn named_entities_decode_inside_code() {
        let source = "<pre><code>it&rsquo;s done&hellip;\n</code></pre>\n";
        assert_eq!(
            body(source),
            "{{< highlight plain >}}\nit\u{2019}s done\u{2026}\n{{< / highlight >}}\n"
        );
    }

    #[test]
    fn blank_lines_inside_code_are_kept() {
        let source = "<pre><code class=\"language-py\">\n\nimport os\n\n\nprint(os.sep)\n\n</code></pre>\n";
        assert_eq!(
            body(source),
            "{{< highlight py >}}\n\nimport os\n\n\nprint(os.sep)\n\n{{< / highlight >}}\n"
        );
    }

    #[test]
    fn converted_code_keeps_indentation_on_second_pass() {
        let source = "<pre><code>fn main() {\n    let x = 1;\n}\n</code></pre>\n";
        let first = body(source);
        assert_eq!(
            first,
            "{{< highlight plain >}}\nfn main() {\n    let x = 1;\n}\n{{< / highlight >}}\n"
        );
        assert_eq!(body(&first), first);
    }

    #[test]
    fn format_post_file_writes_destination() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("in.md");
        let destination = temp.path().join("out").join("in.md");
        fs::write(&source, "---\nt: 1\n---\nbody\n").expect("write source");

        let stats = format_post_file(&source, &destination, &options()).expect("format file");
        assert_eq!(stats, FormatStats::default());
        assert_eq!(
            fs::read_to_string(&destination).expect("read output"),
            "---\nt: 1\n---\nbody\n"
        );
    }

    #[test]
    fn format_file_reports_path_on_failure() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("broken.md");
        fs::write(&source, "<pre><code>never closed\n").expect("write source");
        let error = format_file(&source, &options()).expect_err("must fail");
        assert!(format!("{error:#}").contains("broken.md"));
        assert!(format!("{error:#}").contains("never closed"));
    }
}
