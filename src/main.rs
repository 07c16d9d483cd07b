use std::{fs, io, path::PathBuf};

use anyhow::Context as _;
use clap::Parser;
use inkwell::context::Context;
use kaleido_jit::driver::{Driver, LineChars, Options};

/// a small expression language jit compiler
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Source file to run. Reads stdin interactively when omitted.
    file: Option<PathBuf>,

    /// Only lower to IR, never execute top-level expressions.
    #[arg(long)]
    no_jit: bool,

    /// Don't print the IR of each item as it is read.
    #[arg(long)]
    quiet_ir: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let context = Context::create();

    let options = Options {
        jit: !args.no_jit,
        print_ir: !args.quiet_ir,
        interactive: args.file.is_none(),
    };

    match args.file {
        Some(path) => {
            let source = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Driver::new(&context, source.chars(), options)?.run();
        }
        None => {
            let stdin = io::stdin();
            Driver::new(&context, LineChars::new(stdin.lock()), options)?.run();
        }
    }

    Ok(())
}
