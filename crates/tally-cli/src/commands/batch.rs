//! Batch processing command for multiple invoice images.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, warn};

use tally_core::{ErrorKind, InvoiceRecord, Pipeline};

use super::{load_config, read_document, to_json, ErrorReport};

/// Extensions picked up from the glob.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp", "gif"];

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input images
    #[arg(required = true)]
    input: String,

    /// Output directory for one JSON file per input (default: JSON lines on stdout)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Number of requests in flight
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,
}

/// Outcome of one input.
#[derive(Serialize)]
struct FileOutcome {
    file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<InvoiceRecord>,
    #[serde(flatten)]
    error: Option<ErrorReport>,
    processing_time_ms: u64,
}

impl FileOutcome {
    fn failed(&self) -> bool {
        self.error.is_some()
    }
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    eprintln!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(output_dir) = &args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let jobs = args.jobs.max(1);

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let mut outcomes = stream::iter(files)
        .map(|path| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { process_file(&*pipeline, path).await })
        })
        .buffer_unordered(jobs);

    let mut succeeded = 0usize;
    let mut failed = Vec::new();
    let mut written = HashSet::new();

    while let Some(joined) = outcomes.next().await {
        let outcome = joined?;
        overall_pb.inc(1);

        write_outcome(&outcome, args.output_dir.as_deref(), &mut written)?;

        if outcome.failed() {
            if !args.continue_on_error {
                overall_pb.abandon();
                error!("Failed to process {}", outcome.file.display());
                anyhow::bail!("Processing failed: {}", outcome.file.display());
            }
            warn!("Failed to process {}", outcome.file.display());
            failed.push(outcome.file);
        } else {
            succeeded += 1;
        }
    }

    overall_pb.finish_and_clear();

    eprintln!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        succeeded + failed.len(),
        start.elapsed()
    );
    eprintln!(
        "   {} successful, {} failed",
        style(succeeded).green(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        eprintln!();
        eprintln!("{}", style("Failed files:").red());
        for path in &failed {
            eprintln!("  - {}", path.display());
        }
    }

    Ok(())
}

async fn process_file<B, C>(pipeline: &Pipeline<B, C>, path: PathBuf) -> FileOutcome
where
    B: tally_core::OcrBackend + 'static,
    C: tally_core::CompletionClient,
{
    let start = Instant::now();

    let result = match read_document(&path) {
        Ok(document) => pipeline.extract(&document).await.map_err(|e| ErrorReport::from(&e)),
        Err(e) => Err(ErrorReport::new(ErrorKind::InvalidInput, e.to_string())),
    };

    let processing_time_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(result) => FileOutcome {
            file: path,
            record: Some(result.record),
            error: None,
            processing_time_ms,
        },
        Err(report) => FileOutcome {
            file: path,
            record: None,
            error: Some(report),
            processing_time_ms,
        },
    }
}

fn write_outcome(
    outcome: &FileOutcome,
    output_dir: Option<&Path>,
    written: &mut HashSet<String>,
) -> anyhow::Result<()> {
    let Some(output_dir) = output_dir else {
        println!("{}", to_json(outcome, false)?);
        return Ok(());
    };

    let output_path = output_dir.join(output_name(&outcome.file, written));

    let content = match &outcome.error {
        Some(report) => to_json(report, true)?,
        None => to_json(&outcome.record, true)?,
    };

    fs::write(&output_path, content)?;
    debug!("Wrote output to {}", output_path.display());
    Ok(())
}

/// `<file name>.json`, with a numeric suffix once an earlier input in this
/// run has taken the name.
fn output_name(file: &Path, written: &mut HashSet<String>) -> String {
    let base = file
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("invoice");

    let mut name = format!("{}.json", base);
    let mut n = 1;
    while !written.insert(name.clone()) {
        name = format!("{}-{}.json", base, n);
        n += 1;
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_name_keeps_extension() {
        let mut written = HashSet::new();
        assert_eq!(output_name(Path::new("inv.png"), &mut written), "inv.png.json");
        assert_eq!(output_name(Path::new("inv.jpg"), &mut written), "inv.jpg.json");
    }

    #[test]
    fn test_output_name_disambiguates_same_name() {
        let mut written = HashSet::new();
        assert_eq!(output_name(Path::new("a/inv.png"), &mut written), "inv.png.json");
        assert_eq!(output_name(Path::new("b/inv.png"), &mut written), "inv.png-1.json");
        assert_eq!(output_name(Path::new("c/inv.png"), &mut written), "inv.png-2.json");
    }
}
