//! Prompt command - render the extraction prompt for some OCR text.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::Args;

use tally_core::{OcrText, PromptBuilder};

/// Arguments for the prompt command.
#[derive(Args)]
pub struct PromptArgs {
    /// File holding the OCR text (default: stdin)
    #[arg(short, long)]
    text_file: Option<PathBuf>,
}

pub fn run(args: PromptArgs) -> anyhow::Result<()> {
    let raw = match &args.text_file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let text = OcrText::from(raw.trim_end_matches(['\r', '\n']));
    println!("{}", PromptBuilder::new().build(&text));
    Ok(())
}
