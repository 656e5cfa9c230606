//! OCR command - run normalization and OCR only.

use std::path::PathBuf;

use clap::Args;
use tracing::info;

use tally_core::Pipeline;

use super::{load_config, read_document, to_json, ErrorReport};

/// Arguments for the ocr command.
#[derive(Args)]
pub struct OcrArgs {
    /// Input image
    #[arg(required = true)]
    input: PathBuf,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

pub fn run(args: OcrArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = dir.clone();
    }

    let document = read_document(&args.input)?;
    info!("Recognizing file: {}", args.input.display());

    let outcome = Pipeline::from_config(&config).and_then(|p| p.recognize(&document));
    match outcome {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            println!("{}", to_json(&ErrorReport::from(&e), false)?);
            anyhow::bail!("OCR failed ({}): {}", e.kind(), e);
        }
    }
}
