use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use wasir::{dump, read_module, ReadOptions};

/// wasir — read a WebAssembly module and print its structure.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input module (.wasm binary or .wat text)
    input: PathBuf,

    /// Write the summary here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Ignore the `name` custom section
    #[arg(long)]
    no_debug_names: bool,

    /// Reject exception-handling instructions and tags
    #[arg(long)]
    no_exceptions: bool,
}

impl Cli {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            read_debug_names: !self.no_debug_names,
            exceptions: !self.no_exceptions,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    eprintln!("wasir: reading {}", cli.input.display());

    let bytes =
        fs::read(&cli.input).with_context(|| format!("failed to read {}", cli.input.display()))?;

    let module = read_module(&bytes, &cli.read_options())
        .with_context(|| format!("failed to decode {}", cli.input.display()))?;
    let summary = dump::summarize(&module);

    if let Some(output_path) = &cli.output {
        fs::write(output_path, &summary)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("wasir: wrote {}", output_path.display());
    } else {
        print!("{}", summary);
    }

    eprintln!("wasir: {} fields", module.fields().len());
    Ok(())
}
