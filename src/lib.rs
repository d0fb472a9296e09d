//! A compiler for a substantial subset of C, targeting the x86-64 System V
//! ABI and emitting GNU assembler text in Intel dialect.
//!
//! The pipeline is strictly downstream: [`token`] scans bytes into tokens,
//! [`preprocess`] expands macros and splices includes, [`parse`] builds a
//! typed AST against the [`ty`] table, and [`gen`] lowers the AST through a
//! stack machine into assembly text. The first error anywhere aborts the
//! compilation; nothing is written to stdout unless the whole translation
//! unit compiled.
//!
//! ```no_run
//! let asm = rcc::compile_str("int main() { return 42; }").unwrap();
//! assert!(asm.starts_with(".intel_syntax noprefix"));
//! ```
#![forbid(unsafe_code)]
pub mod ast;
pub mod gen;
pub mod parse;
pub mod preprocess;
pub mod token;
pub mod ty;

#[cfg(test)]
mod test;

use std::path::Path;

use anyhow::Result;

use preprocess::MacroTable;
use token::Token;

/// Compile the translation unit at `path` into assembly text.
pub fn compile(path: &Path) -> Result<String> {
    let mut macros = MacroTable::new();
    let toks = token::tokenize_file(path, &mut macros, true)?;
    compile_tokens(toks)
}

/// Compile in-memory source; `#include` paths resolve relative to the
/// current directory.
pub fn compile_str(source: &str) -> Result<String> {
    let mut macros = MacroTable::new();
    let toks = token::tokenize_source(Path::new("source.c"), source, &mut macros, true)?;
    compile_tokens(toks)
}

fn compile_tokens(toks: Vec<Token>) -> Result<String> {
    let (prog, types) = parse::parse(toks)?;
    gen::gen_program(&prog, &types)
}
