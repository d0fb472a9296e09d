use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// Compile a C translation unit into x86-64 assembly on stdout
#[derive(Clone, Debug, Parser)]
struct Args {
    /// input .c file to compile
    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let asm = rcc::compile(&args.input)?;
    print!("{asm}");
    Ok(())
}
