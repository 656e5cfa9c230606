//! Process command - extract a record from a single invoice image.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use tally_core::Pipeline;

use super::{load_config, read_document, to_json, ErrorReport};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input image
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Also print the recognized OCR text to stderr
    #[arg(long)]
    show_text: bool,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Completion service endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Completion model name
    #[arg(long)]
    model: Option<String>,
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(dir) = &args.model_dir {
        config.ocr.model_dir = dir.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        config.model.endpoint = endpoint.clone();
    }
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }

    let document = read_document(&args.input)?;
    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("Loading OCR backend...");

    let outcome = match Pipeline::from_config(&config) {
        Ok(pipeline) => {
            pb.set_message(format!("Extracting {}...", document.filename()));
            pipeline.extract(&document).await
        }
        Err(e) => Err(e),
    };
    pb.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            println!("{}", to_json(&ErrorReport::from(&e), args.pretty)?);
            anyhow::bail!("Extraction failed ({}): {}", e.kind(), e);
        }
    };

    if args.show_text {
        eprintln!("{}", style("OCR text:").blue());
        eprintln!("{}", result.ocr_text);
        eprintln!();
    }

    let output = to_json(&result.record, args.pretty)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!(
        request_id = %result.request_id,
        normalized = result.normalized,
        "Total processing time: {}ms",
        result.processing_time_ms
    );

    Ok(())
}
