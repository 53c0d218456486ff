use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use dupfree::services::{FolderSink, FolderSource, ImageSource, ResultSink, RunReport, ScanOptions};
use dupfree::{
    CancelToken, DetectionConfig, DetectionPhase, DetectionProgress, DetectionReport,
    DuplicateDetector, DuplicateType, Image,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "dupfree", version, about = "Find near-duplicate images in a folder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find and list duplicate pairs
    Scan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Find duplicate pairs and write each pair as two images
    Export {
        #[command(flatten)]
        run: RunArgs,
        /// Directory to write pairs into (default: `<dir>/duplicates`); it is cleared first
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Clear a non-empty output directory without asking
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory containing the images
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,
    /// Also look inside subdirectories
    #[arg(long)]
    recursive: bool,
    /// JSON file with detection parameters; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Minimum signature similarity in [0, 1] (default 0.55)
    #[arg(long)]
    threshold: Option<f64>,
    /// Perceptual hash side length (default 32)
    #[arg(long)]
    hash_size: Option<u32>,
    /// Number of LSH bands (default 75)
    #[arg(long)]
    bands: Option<usize>,
    /// Minimum feature match score (default 0.3)
    #[arg(long)]
    match_threshold: Option<f64>,
    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,
    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

impl RunArgs {
    fn detection_config(&self) -> Result<DetectionConfig> {
        let mut config = match &self.config {
            Some(path) => DetectionConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => DetectionConfig::default(),
        };
        if let Some(threshold) = self.threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(hash_size) = self.hash_size {
            config.hash_size = hash_size;
        }
        if let Some(bands) = self.bands {
            config.bands = bands;
        }
        if let Some(match_threshold) = self.match_threshold {
            config.match_threshold = match_threshold;
        }
        Ok(config)
    }

    fn cancel_token(&self) -> CancelToken {
        match self.timeout_secs {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        }
    }
}

struct RunOutcome {
    images: Vec<Image>,
    report: DetectionReport,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { run } => {
            println!("▶ Scanning for duplicates in: {}", run.path.display());
            let outcome = run_detection(&run, None)?;
            print_pairs(&outcome);
        }

        Commands::Export { run, output, yes } => {
            let out_dir = output.unwrap_or_else(|| run.path.join("duplicates"));
            let mut sink = FolderSink::new(&out_dir);
            if sink.has_existing_content() && !yes {
                let proceed = Confirm::new()
                    .with_prompt(format!(
                        "{} is not empty and will be cleared. Continue?",
                        out_dir.display()
                    ))
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Aborted; nothing was changed.");
                    return Ok(());
                }
            }

            println!("▶ Exporting duplicates in: {}", run.path.display());
            let outcome = run_detection(&run, Some(&out_dir))?;
            print_pairs(&outcome);

            let artifacts = outcome.report.artifacts(&outcome.images);
            let written = benchmark("writing duplicate pairs", || sink.persist(&artifacts))
                .with_context(|| format!("Failed to write pairs into {:?}", out_dir))?;
            println!("\n✅ Wrote {} files to {}", written, out_dir.display());
        }
    }

    Ok(())
}

/// Load the batch, run both detection phases and write the optional report.
/// `output` is left out of the scan so earlier exports are not re-read.
fn run_detection(run: &RunArgs, output: Option<&Path>) -> Result<RunOutcome> {
    let config = run.detection_config()?;
    let cancel = run.cancel_token();
    let detector = DuplicateDetector::new(config.clone())
        .context("Invalid detection parameters")?
        .with_cancel_token(cancel.clone())
        .with_progress(progress_reporter());

    let source = FolderSource::new(
        &run.path,
        ScanOptions {
            recursive: run.recursive,
            exclude: output.map(Path::to_path_buf).into_iter().collect(),
            ..ScanOptions::default()
        },
    );
    let images = benchmark("loading images", || source.load(&cancel))
        .with_context(|| format!("Failed to load images from {:?}", run.path))?;
    println!("▶ Comparing {} images…", images.len());

    let report = benchmark("detecting duplicates", || detector.detect(&images))?;

    if let Some(path) = &run.report {
        write_report(path, &config, &report, &images)?;
    }
    Ok(RunOutcome { images, report })
}

fn write_report(
    path: &Path,
    config: &DetectionConfig,
    report: &DetectionReport,
    images: &[Image],
) -> Result<()> {
    RunReport::new(config, report, images)
        .write(path)
        .with_context(|| format!("Failed to write report {:?}", path))?;
    println!("🗂️  Report written to {}", path.display());
    Ok(())
}

fn print_pairs(outcome: &RunOutcome) {
    let report = &outcome.report;
    if report.pairs.is_empty() {
        println!("No duplicates found.");
        return;
    }

    println!("Found {} duplicate pair(s):", report.pairs.len());
    for (i, found) in report.pairs.iter().enumerate() {
        let how = match found.duplicate_type {
            DuplicateType::Hash => "hash",
            DuplicateType::Feature => "features",
        };
        println!(" Pair {} ({}, score {:.3}):", i + 1, how, found.score);
        println!("   ▶ {}", outcome.images[found.pair.first()].source().display());
        println!("   ▶ {}", outcome.images[found.pair.second()].source().display());
    }
}

/// Drive one progress bar through the detection phases.
fn progress_reporter() -> Box<dyn Fn(DetectionProgress) + Send + Sync> {
    let bar = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg:<22} [{bar:30}] {pos}/{len}") {
        bar.set_style(style);
    }
    let current = Mutex::new(None::<DetectionPhase>);

    Box::new(move |progress: DetectionProgress| {
        let mut current = match current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *current != Some(progress.phase) {
            *current = Some(progress.phase);
            bar.set_length(progress.total as u64);
            bar.set_message(phase_label(progress.phase));
        }
        bar.set_position(progress.completed as u64);
        if progress.phase == DetectionPhase::Complete {
            bar.finish_and_clear();
        }
    })
}

fn phase_label(phase: DetectionPhase) -> &'static str {
    match phase {
        DetectionPhase::Signatures => "Hashing images",
        DetectionPhase::Candidates => "Banding signatures",
        DetectionPhase::HashFilter => "Checking candidates",
        DetectionPhase::Features => "Extracting keypoints",
        DetectionPhase::Verification => "Matching features",
        DetectionPhase::Complete => "Done",
    }
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
