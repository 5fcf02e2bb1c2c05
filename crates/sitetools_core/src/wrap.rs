use std::mem;

use crate::grammar::{TokenizeError, tokenize};

pub const DEFAULT_MAX_WIDTH: usize = 80;

/// Greedily pack tokens into lines of at most `max_width` characters.
/// A token wider than the budget gets a line of its own; tokens are never split.
pub fn wrap_tokens<T: AsRef<str>>(tokens: &[T], max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for token in tokens {
        let token = token.as_ref();
        let width = display_width(token);
        if current.is_empty() {
            current.push_str(token);
            current_width = width;
        } else if current_width + 1 + width <= max_width {
            current.push(' ');
            current.push_str(token);
            current_width += 1 + width;
        } else {
            lines.push(mem::take(&mut current));
            current.push_str(token);
            current_width = width;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Tokenize and wrap one line. Fails when the line has unbalanced tag or code
/// delimiters; callers keep such lines as they are.
pub fn wrap_line(line: &str, max_width: usize) -> Result<Vec<String>, TokenizeError> {
    let tokens = tokenize(line)?;
    Ok(wrap_tokens(&tokens, max_width))
}

pub fn display_width(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROSE: &str = "The quick brown fox jumps over the lazy dog while the \
        five boxing wizards jump quickly and a wizard's job is to vex chumps quickly in fog.";

    #[test]
    fn empty_input_yields_no_lines() {
        let tokens: Vec<String> = Vec::new();
        assert!(wrap_tokens(&tokens, 80).is_empty());
        assert!(wrap_line("   ", 80).expect("wrap").is_empty());
    }

    #[test]
    fn rejoined_lines_reproduce_normalized_prose() {
        for width in [10, 20, 33, 80] {
            let lines = wrap_line(PROSE, width).expect("wrap");
            let normalized = PROSE.split_whitespace().collect::<Vec<_>>().join(" ");
            assert_eq!(lines.join(" "), normalized, "width {width}");
        }
    }

    #[test]
    fn no_line_exceeds_width_unless_single_token() {
        let line = format!("{PROSE} supercalifragilisticexpialidocious-and-then-some end");
        for width in [12, 25, 40] {
            for output in wrap_line(&line, width).expect("wrap") {
                if display_width(&output) > width {
                    assert!(!output.contains(' '), "overlong multi-token line: {output:?}");
                }
            }
        }
    }

    #[test]
    fn overlong_token_is_emitted_alone() {
        let lines = wrap_tokens(&["a", "abcdefghijkl", "b"], 5);
        assert_eq!(lines, vec!["a", "abcdefghijkl", "b"]);
    }

    #[test]
    fn exact_fit_stays_on_one_line() {
        assert_eq!(wrap_tokens(&["abcd", "efgh"], 9), vec!["abcd efgh"]);
        assert_eq!(wrap_tokens(&["abcd", "efgh"], 8), vec!["abcd", "efgh"]);
    }

    #[test]
    fn width_counts_characters_not_bytes() {
        assert_eq!(wrap_tokens(&["ααα", "βββ"], 7), vec!["ααα βββ"]);
    }

    #[test]
    fn code_spans_are_never_broken() {
        let line = "Run `cargo test --workspace --all-features` before pushing anything upstream.";
        let lines = wrap_line(line, 30).expect("wrap");
        assert_eq!(
            lines,
            vec![
                "Run",
                "`cargo test --workspace --all-features`",
                "before pushing anything",
                "upstream."
            ]
        );
    }

    #[test]
    fn short_line_with_code_is_unchanged() {
        let line = "See `foo bar` now.";
        assert_eq!(wrap_line(line, 80).expect("wrap"), vec![line.to_string()]);
    }

    #[test]
    fn wrapping_is_deterministic() {
        assert_eq!(wrap_line(PROSE, 24).expect("wrap"), wrap_line(PROSE, 24).expect("wrap"));
    }

    #[test]
    fn unbalanced_line_reports_error() {
        assert!(wrap_line("a < b and more text", 5).is_err());
    }
}
