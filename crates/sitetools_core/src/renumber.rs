use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Serialize;

/// Old reference numbers resolve to links; links get new numbers in order of
/// first appearance, so repeated links share a number.
#[derive(Debug, Clone, Default)]
pub struct RefRenumbering {
    by_link: HashMap<String, usize>,
    links: Vec<String>,
}

impl RefRenumbering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_for(&mut self, link: &str) -> usize {
        if let Some(number) = self.by_link.get(link) {
            return *number;
        }
        let number = self.links.len();
        self.by_link.insert(link.to_string(), number);
        self.links.push(link.to_string());
        number
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn definitions(&self) -> impl Iterator<Item = (usize, &str)> {
        self.links.iter().map(String::as_str).enumerate()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenumberReport {
    pub references: usize,
    pub definitions_before: usize,
    pub definitions_after: usize,
}

pub fn renumber_file(path: &Path) -> Result<RenumberReport> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let (updated, report) =
        renumber_references(&content).with_context(|| format!("failed to renumber {}", path.display()))?;
    fs::write(path, updated).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(report)
}

pub fn renumber_references(content: &str) -> Result<(String, RenumberReport)> {
    let lines: Vec<&str> = content.lines().collect();
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |index| index + 1);

    let mut old_links = BTreeMap::new();
    let mut cursor = end;
    while cursor > 0 && !lines[cursor - 1].trim().is_empty() {
        let line = lines[cursor - 1];
        let Some(captures) = definition_pattern().captures(line) else {
            bail!("line {cursor}: expected a reference definition, found {line:?}");
        };
        let number: usize = captures[1]
            .parse()
            .with_context(|| format!("line {cursor}: invalid reference number"))?;
        old_links.insert(number, captures[2].trim().to_string());
        cursor -= 1;
    }
    let body = &lines[..cursor];

    let mut renumbering = RefRenumbering::new();
    let mut references = 0usize;
    let mut out = String::with_capacity(content.len());

    for (index, line) in body.iter().enumerate() {
        let mut last_end = 0usize;
        for captures in reference_pattern().captures_iter(line) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let old_number: usize = captures[3]
                .parse()
                .with_context(|| format!("line {}: invalid reference number", index + 1))?;
            let Some(link) = old_links.get(&old_number) else {
                bail!(
                    "line {}: reference [{old_number}] has no definition",
                    index + 1
                );
            };
            let new_number = renumbering.number_for(link);
            out.push_str(&line[last_end..whole.start()]);
            out.push_str(&captures[1]);
            out.push_str(&format!("[{new_number}]"));
            last_end = whole.end();
            references += 1;
        }
        out.push_str(&line[last_end..]);
        out.push('\n');
    }

    for (number, link) in renumbering.definitions() {
        out.push_str(&format!("[{number}]: {link}\n"));
    }

    let report = RenumberReport {
        references,
        definitions_before: old_links.len(),
        definitions_after: renumbering.len(),
    };
    Ok((out, report))
}

fn definition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[(\d+)\]: (.+)$").expect("valid definition regex"))
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\[.+?\])(\[(\d+)\])").expect("valid reference regex"))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn references_are_numbered_by_first_use() {
        let content = "See [docs][4] and [guide][2].\nAgain [the docs][4].\n\n[2]: https://b.org\n[4]: https://a.org\n[9]: https://unused.org\n";
        let (updated, report) = renumber_references(content).expect("renumber");
        assert_eq!(
            updated,
            "See [docs][0] and [guide][1].\nAgain [the docs][0].\n\n[0]: https://a.org\n[1]: https://b.org\n"
        );
        assert_eq!(
            report,
            RenumberReport {
                references: 3,
                definitions_before: 3,
                definitions_after: 2,
            }
        );
    }

    #[test]
    fn duplicate_links_share_a_number() {
        let content = "[a][1] [b][2]\n\n[1]: https://same.org\n[2]: https://same.org\n";
        let (updated, _) = renumber_references(content).expect("renumber");
        assert_eq!(updated, "[a][0] [b][0]\n\n[0]: https://same.org\n");
    }

    #[test]
    fn undefined_reference_fails() {
        let content = "[a][7]\n\n[1]: https://x.org\n";
        let error = renumber_references(content).expect_err("must fail");
        assert!(error.to_string().contains("reference [7] has no definition"));
    }

    #[test]
    fn malformed_trailing_block_fails() {
        let content = "text\n\n[1]: https://x.org\nnot a definition\n";
        let error = renumber_references(content).expect_err("must fail");
        assert!(error.to_string().contains("expected a reference definition"));
    }

    #[test]
    fn renumber_file_rewrites_in_place() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("post.md");
        fs::write(&path, "[x][3]\n\n[3]: https://x.org\n\n").expect("write");

        let report = renumber_file(&path).expect("renumber");
        assert_eq!(report.references, 1);
        assert_eq!(
            fs::read_to_string(&path).expect("read"),
            "[x][0]\n\n[0]: https://x.org\n"
        );
    }

    #[test]
    fn renumbering_map_is_ordered() {
        let mut renumbering = RefRenumbering::new();
        assert!(renumbering.is_empty());
        assert_eq!(renumbering.number_for("b"), 0);
        assert_eq!(renumbering.number_for("a"), 1);
        assert_eq!(renumbering.number_for("b"), 0);
        assert_eq!(renumbering.definitions().collect::<Vec<_>>(), vec![(0, "b"), (1, "a")]);
    }
}
