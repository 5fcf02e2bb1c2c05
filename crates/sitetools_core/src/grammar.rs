use serde::Serialize;
use thiserror::Error;

/// Characters that may cling to either side of a tag or code span.
pub const PUNCTUATION: &[char] = &['.', ',', ':', ';', '(', ')', '/'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Heading,
    Bullet,
    Tag,
    Code,
    Word,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Width in characters, the unit the wrapper budgets with.
    pub fn width(&self) -> usize {
        self.text.chars().count()
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unbalanced `{delimiter}` at column {column}")]
    Unbalanced { delimiter: char, column: usize },
}

/// Split a line into whitespace-separated tokens. Tags (`<a href="x">`) and
/// code spans (`` `a b` ``) are atomic even when they contain spaces, and
/// punctuation glued to them stays in the same token. A leading heading or
/// bullet marker is fused with the token after it.
pub fn tokenize(line: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut scanner = Scanner::new(line);
    let mut tokens = Vec::new();

    scanner.skip_whitespace();
    if let Some(token) = scanner.prefixed()? {
        tokens.push(token);
    }
    loop {
        scanner.skip_whitespace();
        if scanner.at_end() {
            break;
        }
        tokens.push(scanner.chunk()?);
    }
    Ok(tokens)
}

struct Scanner<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.line[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.line.len()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn column(&self, byte: usize) -> usize {
        self.line[..byte].chars().count() + 1
    }

    /// Heading or bullet marker plus the token after it.
    fn prefixed(&mut self) -> Result<Option<Token>, TokenizeError> {
        let rest = self.rest();
        let (kind, marker_len) = if rest.starts_with('#') {
            (TokenKind::Heading, rest.len() - rest.trim_start_matches('#').len())
        } else if rest.starts_with('*') {
            (TokenKind::Bullet, 1)
        } else {
            return Ok(None);
        };

        let after = &rest[marker_len..];
        let body = after.trim_start();
        let gap = after.len() - body.len();
        if gap == 0 || body.is_empty() {
            return Ok(None);
        }

        let start = self.pos;
        self.pos += marker_len + gap;
        self.chunk()?;
        Ok(Some(Token {
            kind,
            text: self.line[start..self.pos].to_string(),
        }))
    }

    /// One whitespace-free run; tag and code spans inside it are atomic.
    fn chunk(&mut self) -> Result<Token, TokenizeError> {
        let start = self.pos;
        let mut spans = Vec::new();
        let mut plain = false;

        while let Some(ch) = self.rest().chars().next() {
            if ch.is_whitespace() {
                break;
            }
            match ch {
                '<' => {
                    self.span('<', '>')?;
                    spans.push(TokenKind::Tag);
                }
                '`' => {
                    self.span('`', '`')?;
                    spans.push(TokenKind::Code);
                }
                _ => {
                    if !PUNCTUATION.contains(&ch) {
                        plain = true;
                    }
                    self.pos += ch.len_utf8();
                }
            }
        }

        let kind = match spans.as_slice() {
            [single] if !plain => *single,
            _ => TokenKind::Word,
        };
        Ok(Token {
            kind,
            text: self.line[start..self.pos].to_string(),
        })
    }

    fn span(&mut self, open: char, close: char) -> Result<(), TokenizeError> {
        let open_at = self.pos;
        let body = &self.line[open_at + open.len_utf8()..];
        let unbalanced = TokenizeError::Unbalanced {
            delimiter: open,
            column: self.column(open_at),
        };
        let Some(end) = body.find(close) else {
            return Err(unbalanced);
        };
        if open == '<' && body[..end].contains('<') {
            return Err(unbalanced);
        }
        self.pos = open_at + open.len_utf8() + end + close.len_utf8();
        Ok(())
    }
}
