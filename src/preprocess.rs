//! Preprocessor: raw tokens to the stream the parser consumes.
//!
//! Three concerns: macro expansion (object- and function-like, sharing one
//! table), `#include` splicing, and newline elision. Expansion output is not
//! rescanned, and directives are recognized wherever a `#` token appears;
//! there is no column check.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, ensure, Result};

use crate::token::{self, Token};

#[derive(Debug, Clone)]
pub enum Macro {
    Object(Vec<Token>),
    /// Body tokens with parameter occurrences rewritten to positional
    /// [`Token::Param`] tokens at definition time.
    Function { arity: usize, body: Vec<Token> },
}

pub type MacroTable = HashMap<String, Macro>;

/// Expand macros, splice includes and drop newline tokens. `add_eof` appends
/// the EOF token; it is false for included files so EOF appears exactly once
/// at the top level.
pub fn preprocess(
    toks: Vec<Token>,
    file_path: &Path,
    macros: &mut MacroTable,
    add_eof: bool,
) -> Result<Vec<Token>> {
    let mut p = Preprocessor {
        toks,
        pos: 0,
        file_path,
        macros,
    };
    p.run(add_eof)
}

struct Preprocessor<'a> {
    toks: Vec<Token>,
    pos: usize,
    file_path: &'a Path,
    macros: &'a mut MacroTable,
}

static EOF: Token = Token::Eof;

impl Preprocessor<'_> {
    fn peek(&self) -> &Token {
        self.toks.get(self.pos).unwrap_or(&EOF)
    }

    fn at_end(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn pop(&mut self) -> Token {
        let tok = self.toks.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn begins_with(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Reserved { word: w, .. } if w == word)
    }

    fn consume(&mut self, word: &str) -> bool {
        if self.begins_with(word) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn consume_newline(&mut self) -> bool {
        if matches!(self.peek(), Token::Newline) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, word: &str) -> Result<()> {
        ensure!(
            self.begins_with(word),
            "`{}` was expected but got `{}`",
            word,
            self.peek().text()
        );
        self.pos += 1;
        Ok(())
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek() {
            Token::Ident { name, .. } => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            other => bail!("identifier was expected but got `{}`", other.text()),
        }
    }

    fn run(&mut self, add_eof: bool) -> Result<Vec<Token>> {
        let mut output = Vec::new();
        while !self.at_end() {
            if self.consume_newline() {
                continue;
            }

            if let Token::Ident { name, .. } = self.peek() {
                let name = name.clone();
                if let Some(m) = self.macros.get(&name).cloned() {
                    self.pos += 1;
                    match m {
                        Macro::Function { arity, body } => {
                            let args = self.read_args()?;
                            ensure!(
                                args.len() == arity,
                                "number of parameters of macro {name} does not match"
                            );
                            for tok in body {
                                match tok {
                                    Token::Param(idx) => output.extend_from_slice(&args[idx]),
                                    other => output.push(other),
                                }
                            }
                        }
                        Macro::Object(body) => output.extend(body),
                    }
                } else {
                    output.push(self.pop());
                }
                continue;
            }

            if !self.consume("#") {
                output.push(self.pop());
                continue;
            }

            if self.consume("define") {
                let name = self.expect_ident()?;
                let m = self.define()?;
                self.macros.insert(name, m);
            } else if self.consume("include") {
                let included = token::tokenize_file(&self.include_path()?, self.macros, false)?;
                output.extend(included);
            } else {
                bail!("unknown directive `#{}`", self.peek().text());
            }
        }
        if add_eof {
            output.push(Token::Eof);
        }
        Ok(output)
    }

    /// One macro invocation argument: tokens up to a top-level `,` or `)`,
    /// tracking parenthesis nesting.
    fn read_arg(&mut self) -> Vec<Token> {
        let mut arg = Vec::new();
        let mut level = 0usize;
        while !self.at_end() {
            if level == 0 && (self.begins_with(")") || self.begins_with(",")) {
                break;
            }
            if self.begins_with("(") {
                level += 1;
            } else if self.begins_with(")") {
                level -= 1;
            }
            arg.push(self.pop());
        }
        arg
    }

    fn read_args(&mut self) -> Result<Vec<Vec<Token>>> {
        self.expect("(")?;
        let mut args = Vec::new();
        if self.consume(")") {
            return Ok(args);
        }
        args.push(self.read_arg());
        while !self.consume(")") {
            self.expect(",")?;
            args.push(self.read_arg());
        }
        Ok(args)
    }

    /// Body tokens up to the end of the directive line.
    fn read_until_eol(&mut self) -> Vec<Token> {
        let mut toks = Vec::new();
        while !self.at_end() && !self.consume_newline() {
            toks.push(self.pop());
        }
        toks
    }

    fn include_path(&mut self) -> Result<std::path::PathBuf> {
        let content = match self.peek() {
            Token::Str(content) => content.clone(),
            other => bail!("include path was expected but got `{}`", other.text()),
        };
        self.pos += 1;
        let trimmed: Vec<u8> = content
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect();
        let rel = String::from_utf8(trimmed)?;
        let dir = self.file_path.parent().unwrap_or_else(|| Path::new(""));
        Ok(dir.join(rel))
    }

    fn define(&mut self) -> Result<Macro> {
        if self.begins_with("(") {
            return self.define_fn_like();
        }
        Ok(Macro::Object(self.read_until_eol()))
    }

    fn define_fn_like(&mut self) -> Result<Macro> {
        self.expect("(")?;
        let mut params = vec![self.expect_ident()?];
        while !self.consume(")") {
            self.expect(",")?;
            params.push(self.expect_ident()?);
        }
        let body = self
            .read_until_eol()
            .into_iter()
            .map(|tok| match &tok {
                Token::Ident { name, .. } => match params.iter().position(|p| p == name) {
                    Some(idx) => Token::Param(idx),
                    None => tok,
                },
                _ => tok,
            })
            .collect();
        Ok(Macro::Function {
            arity: params.len(),
            body,
        })
    }
}
