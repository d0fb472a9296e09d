//! Lexer: byte stream to raw token sequence.
//!
//! Scanning is context free; the `A * b` declaration-or-multiplication
//! ambiguity is left to the parser, which consults the scope for typedef
//! bindings. Newlines survive as synthetic tokens so the preprocessor can
//! find line boundaries; they are dropped after directive handling.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::preprocess::{self, MacroTable};

/// Control-flow and preprocessor keywords.
const KEYWORDS: &[&str] = &[
    "if", "else", "while", "for", "return", "sizeof", "break", "continue", "switch", "case",
    "default", "do", "define", "include",
];

/// Keywords that can begin a type; `Reserved::is_type` mirrors this set so
/// the parser's `is_type` query needs no string table.
const TYPE_KEYWORDS: &[&str] = &[
    "int", "char", "long", "short", "struct", "void", "_Bool", "typedef", "enum", "static",
    "extern", "signed", "unsigned", "volatile",
];

/// Multi-character operators, longest-prefix first where they overlap.
const MULTI_CHAR_OPS: &[&str] = &[
    "==", "!=", "<=", ">=", "->", "++", "--", "+=", "-=", "*=", "/=", "&&", "||", "<<=", ">>=",
    "<<", ">>",
];

const PUNCTUATION: &str = "+-*/(){}[]<>;=,&.!|^:?~#";

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Punctuation or keyword. `len` is the lexeme length in Unicode scalar
    /// values; `is_type` marks type keywords for the parser's `is_type`.
    Reserved {
        word: String,
        len: usize,
        is_type: bool,
    },
    Ident {
        name: String,
        len: usize,
    },
    /// 64-bit signed integer literal (also produced by char literals).
    Num(i64),
    /// String literal contents with a NUL byte appended.
    Str(Vec<u8>),
    /// Positional macro parameter, only alive inside stored macro bodies.
    Param(usize),
    /// Synthetic line-boundary token, elided by the preprocessor.
    Newline,
    Eof,
}

impl Token {
    /// Lexeme as written, for diagnostics.
    pub fn text(&self) -> String {
        match self {
            Token::Reserved { word, .. } => word.clone(),
            Token::Ident { name, .. } => name.clone(),
            Token::Num(v) => v.to_string(),
            Token::Str(content) => String::from_utf8_lossy(content).into_owned(),
            Token::Param(i) => format!("<param {i}>"),
            Token::Newline => "\\n".into(),
            Token::Eof => "<eof>".into(),
        }
    }
}

fn reserved(word: &str) -> Token {
    Token::Reserved {
        word: word.to_owned(),
        len: word.chars().count(),
        is_type: TYPE_KEYWORDS.contains(&word),
    }
}

/// Tokenize and preprocess the translation unit at `path`. The macro table
/// is shared with included files so definitions flow in file order. `add_eof`
/// is true only for the top-level file.
pub fn tokenize_file(path: &Path, macros: &mut MacroTable, add_eof: bool) -> Result<Vec<Token>> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    tokenize_source(path, &source, macros, add_eof)
}

/// Same as [`tokenize_file`] for in-memory source; includes resolve relative
/// to `path`'s directory.
pub fn tokenize_source(
    path: &Path,
    source: &str,
    macros: &mut MacroTable,
    add_eof: bool,
) -> Result<Vec<Token>> {
    let raw = scan(source)?;
    preprocess::preprocess(raw, path, macros, add_eof)
}

/// Raw scan of `source` into tokens, without preprocessing and without a
/// trailing EOF.
pub(crate) fn scan(source: &str) -> Result<Vec<Token>> {
    Scanner {
        chars: source.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

impl Scanner {
    fn head(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    /// Up to 20 characters of unconsumed input, for diagnostics.
    fn rest_prefix(&self) -> String {
        self.chars[self.pos..].iter().take(20).collect()
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut toks = Vec::new();
        loop {
            while matches!(self.head(), Some(c) if c.is_whitespace() && c != '\n') {
                self.pos += 1;
            }
            if self.head() == Some('\n') {
                self.pos += 1;
                toks.push(Token::Newline);
                continue;
            }
            if self.head().is_none() {
                break;
            }
            if self.skip_comment()? {
                continue;
            }
            if let Some(tok) = self.read_str_literal()? {
                toks.push(tok);
                continue;
            }
            if let Some(tok) = self.read_char_literal()? {
                toks.push(tok);
                continue;
            }
            if let Some(tok) = self.read_digit_literal()? {
                toks.push(tok);
                continue;
            }
            if let Some(tok) = self.read_reserved() {
                toks.push(tok);
                continue;
            }
            if let Some(tok) = self.read_multi_char_op() {
                toks.push(tok);
                continue;
            }
            if let Some(tok) = self.read_punctuation() {
                toks.push(tok);
                continue;
            }
            if let Some(tok) = self.read_ident() {
                toks.push(tok);
                continue;
            }
            bail!("unexpected input `{}`", self.rest_prefix());
        }
        Ok(toks)
    }

    fn skip_comment(&mut self) -> Result<bool> {
        if self.starts_with("//") {
            self.pos += 2;
            // Leave the newline for the next iteration so `#define` bodies
            // still end at their line.
            while matches!(self.head(), Some(c) if c != '\n') {
                self.pos += 1;
            }
            return Ok(true);
        }
        if self.starts_with("/*") {
            self.pos += 2;
            while !self.starts_with("*/") {
                if self.head().is_none() {
                    bail!("comment unclosed");
                }
                self.pos += 1;
            }
            self.pos += 2;
            return Ok(true);
        }
        Ok(false)
    }

    fn read_escape(&mut self) -> Result<u8> {
        // The backslash is already consumed.
        let Some(c) = self.head() else {
            bail!("unterminated string literal");
        };
        self.pos += 1;
        Ok(match c {
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            '0' => 0,
            '\\' => b'\\',
            '\'' => b'\'',
            '"' => b'"',
            other => other as u8,
        })
    }

    fn read_str_literal(&mut self) -> Result<Option<Token>> {
        if self.head() != Some('"') {
            return Ok(None);
        }
        self.pos += 1;
        let mut content = Vec::new();
        loop {
            match self.head() {
                None => bail!("unterminated string literal"),
                Some('"') => {
                    self.pos += 1;
                    break;
                }
                Some('\\') => {
                    self.pos += 1;
                    let b = self.read_escape()?;
                    content.push(b);
                }
                Some(c) => {
                    self.pos += 1;
                    let mut buf = [0u8; 4];
                    content.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        content.push(0);
        Ok(Some(Token::Str(content)))
    }

    fn read_char_literal(&mut self) -> Result<Option<Token>> {
        if self.head() != Some('\'') {
            return Ok(None);
        }
        self.pos += 1;
        let Some(c) = self.head() else {
            bail!("unterminated character literal");
        };
        self.pos += 1;
        if self.head() != Some('\'') {
            bail!("character literal is too long: `{}`", self.rest_prefix());
        }
        self.pos += 1;
        Ok(Some(Token::Num(c as i64)))
    }

    fn read_digit_literal(&mut self) -> Result<Option<Token>> {
        if !matches!(self.head(), Some(c) if c.is_ascii_digit()) {
            return Ok(None);
        }
        let start = self.pos;
        let (radix, digits_ok): (u32, fn(char) -> bool) =
            if self.starts_with("0x") || self.starts_with("0X") {
                self.pos += 2;
                (16, |c| c.is_ascii_hexdigit())
            } else if self.starts_with("0o") || self.starts_with("0O") {
                self.pos += 2;
                (8, |c| c.is_ascii_digit())
            } else if self.starts_with("0b") || self.starts_with("0B") {
                self.pos += 2;
                (2, |c| c.is_ascii_digit())
            } else {
                (10, |c| c.is_ascii_digit())
            };
        let digit_start = self.pos;
        while matches!(self.head(), Some(c) if digits_ok(c)) {
            self.pos += 1;
        }
        let digits: String = self.chars[digit_start..self.pos].iter().collect();
        let all: String = self.chars[start..self.pos].iter().collect();
        if digits.is_empty() {
            bail!("invalid number literal: `{all}`");
        }
        let val = i64::from_str_radix(&digits, radix)
            .with_context(|| format!("invalid number literal: `{all}`"))?;
        Ok(Some(Token::Num(val)))
    }

    fn is_word_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    fn read_reserved(&mut self) -> Option<Token> {
        for word in KEYWORDS.iter().chain(TYPE_KEYWORDS) {
            let n = word.chars().count();
            let follower = self.chars.get(self.pos + n).copied();
            if self.starts_with(word) && !matches!(follower, Some(c) if Self::is_word_char(c)) {
                self.pos += n;
                return Some(reserved(word));
            }
        }
        None
    }

    fn read_multi_char_op(&mut self) -> Option<Token> {
        for op in MULTI_CHAR_OPS {
            if self.starts_with(op) {
                self.pos += op.chars().count();
                return Some(reserved(op));
            }
        }
        None
    }

    fn read_punctuation(&mut self) -> Option<Token> {
        let c = self.head()?;
        if !PUNCTUATION.contains(c) {
            return None;
        }
        self.pos += 1;
        Some(reserved(&c.to_string()))
    }

    fn read_ident(&mut self) -> Option<Token> {
        let c = self.head()?;
        if !c.is_ascii_alphabetic() && c != '_' {
            return None;
        }
        let start = self.pos;
        while matches!(self.head(), Some(c) if Self::is_word_char(c)) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        let len = self.pos - start;
        Some(Token::Ident { name, len })
    }
}
