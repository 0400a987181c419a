//! Fruit Recognition CLI
//!
//! Validates a class-per-directory image dataset, trains and evaluates a
//! classifier on it and identifies new images with the saved model.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use fruit_recognition::dataset::{discover, validate, DatasetReport};
use fruit_recognition::inference::{collect_images, load_model, PredictionAggregator, PredictionRecord, TOP_K};
use fruit_recognition::model::{AppConfig, CentroidBackend, ImageClassifier};
use fruit_recognition::training::TrainingOrchestrator;
use fruit_recognition::utils::logging::{init_logging, LogConfig};
use fruit_recognition::utils::{format_duration, format_megabytes};

/// Fruit image classification
///
/// Every subdirectory of the dataset root is a class; images may be nested
/// below it in any depth.
#[derive(Parser, Debug)]
#[command(name = "fruit_recognition")]
#[command(version)]
#[command(about = "Train and run a fruit image classifier", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the dataset layout and class balance
    Validate {
        /// Path to the dataset directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Train, evaluate and save a model
    Train {
        /// Path to the dataset directory
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Where to save the trained model
        #[arg(short, long)]
        model_path: Option<PathBuf>,

        /// Fraction of images held out for testing
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Fraction of images held out for validation
        #[arg(long)]
        validation_fraction: Option<f64>,

        /// Random seed for the split
        #[arg(long)]
        seed: Option<u64>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Resize width
        #[arg(long)]
        width: Option<u32>,

        /// Resize height
        #[arg(long)]
        height: Option<u32>,

        /// Fit on the GPU
        #[arg(long, default_value = "false")]
        gpu: bool,

        /// GPU index
        #[arg(long)]
        device_id: Option<usize>,

        /// Retry on CPU when the GPU fit fails
        #[arg(long, default_value = "false")]
        fallback_to_cpu: bool,

        /// Abort the fit after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Also write the split plan as JSON
        #[arg(long)]
        save_splits: Option<PathBuf>,
    },

    /// Identify a single image or every image in a directory
    Predict {
        /// Image file or directory (defaults to the configured identification folder)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Path to the trained model
        #[arg(short, long)]
        model_path: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { data_dir } => {
            if let Some(dir) = data_dir {
                config.paths.dataset_path = dir;
            }
            config.paths.make_absolute()?;
            cmd_validate(&config.paths.dataset_path)?;
        }

        Commands::Train {
            data_dir,
            model_path,
            test_fraction,
            validation_fraction,
            seed,
            epochs,
            width,
            height,
            gpu,
            device_id,
            fallback_to_cpu,
            timeout,
            save_splits,
        } => {
            if let Some(dir) = data_dir {
                config.paths.dataset_path = dir;
            }
            if let Some(path) = model_path {
                config.paths.model_path = path;
            }

            let model = &mut config.model;
            if let Some(v) = test_fraction {
                model.test_fraction = v;
            }
            if let Some(v) = validation_fraction {
                model.validation_fraction = v;
            }
            if seed.is_some() {
                model.seed = seed;
            }
            if let Some(v) = epochs {
                model.epochs = v;
            }
            if let Some(v) = width {
                model.image_width = v;
            }
            if let Some(v) = height {
                model.image_height = v;
            }
            if let Some(v) = device_id {
                model.device_id = v;
            }
            if timeout.is_some() {
                model.fit_timeout_secs = timeout;
            }
            model.use_gpu |= gpu;
            model.fallback_to_cpu |= fallback_to_cpu;

            config.paths.make_absolute()?;
            cmd_train(&config, save_splits.as_deref())?;
        }

        Commands::Predict { input, model_path } => {
            if let Some(path) = model_path {
                config.paths.model_path = path;
            }
            let explicit_input = input.is_some();
            if let Some(path) = input {
                config.paths.test_images_path = path;
            }
            config.paths.make_absolute()?;
            if let Some(input) = predict_input(&config.paths.test_images_path, explicit_input) {
                cmd_predict(&config.paths.model_path, input)?;
            }
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════╗
 ║   🍎 Fruit Recognition                                        ║
 ║   Dataset validation, training and batch identification      ║
 ╚══════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn print_report(report: &DatasetReport) {
    println!("{}", "Dataset Validation:".cyan().bold());
    println!("  📊 Total images: {}", report.total_images);
    println!("  🏷️  Classes: {}", report.class_counts.len());
    for (label, count) in report.counts_by_size() {
        let pct = if report.total_images > 0 {
            100.0 * count as f64 / report.total_images as f64
        } else {
            0.0
        };
        println!("    {:30} {:>6} ({:>5.1}%)", label, count, pct);
    }
    for message in &report.errors {
        println!("  {} {}", "Error:".red(), message);
    }
    for message in &report.warnings {
        println!("  {} {}", "Warning:".yellow(), message);
    }
    println!();
}

fn cmd_validate(data_dir: &Path) -> Result<()> {
    info!("Validating dataset at: {}", data_dir.display());

    let report = validate(data_dir);
    report.log();
    print_report(&report);

    if !report.is_valid {
        bail!("Dataset validation failed with {} error(s)", report.errors.len());
    }

    println!("{}", "✅ Dataset is valid".green().bold());
    Ok(())
}

fn cmd_train(config: &AppConfig, save_splits: Option<&Path>) -> Result<()> {
    let data_dir = &config.paths.dataset_path;
    let model_path = &config.paths.model_path;

    cmd_validate(data_dir)?;

    println!("{}", "Discovering images...".cyan());
    let images = discover(data_dir)?;

    println!("{}", "Training...".cyan());
    let orchestrator = TrainingOrchestrator::new(CentroidBackend);
    let outcome = orchestrator.train(&images, &config.model)?;

    println!("{}", outcome.splits.stats());
    println!();
    println!("  Image root: {}", outcome.image_root.display());
    println!("  Device:     {}", outcome.device);
    if let Some(validation) = &outcome.validation_metrics {
        println!("  Validation accuracy: {:.2}%", validation.micro_accuracy * 100.0);
    }
    if outcome.overfitting_suspected {
        println!(
            "  {} validation accuracy is suspiciously high, the model may be overfitting",
            "Warning:".yellow()
        );
    }
    println!();

    println!("{}", outcome.metrics);
    println!(
        "{}",
        outcome
            .metrics
            .confusion_matrix
            .display(Some(outcome.model.class_names()))
    );

    orchestrator
        .save(&outcome, model_path)
        .with_context(|| format!("Failed to save model to {}", model_path.display()))?;

    let size = std::fs::metadata(model_path).map(|m| m.len()).unwrap_or(0);
    println!(
        "{} Model saved to {} ({}, trained in {})",
        "✅".green(),
        model_path.display(),
        format_megabytes(size),
        format_duration(outcome.metrics.training_time_seconds)
    );

    if let Some(path) = save_splits {
        outcome.splits.save(path)?;
        println!("  Split plan written to {}", path.display());
    }

    Ok(())
}

fn print_record(record: &PredictionRecord, class_names: &[String], show_top: bool) {
    println!(
        "  {} {} ({:.1}%)",
        "→".green(),
        record.predicted_label.bold(),
        record.confidence
    );
    if show_top {
        for (rank, (label, score)) in record.top_k(class_names, TOP_K).into_iter().enumerate() {
            println!("     {}. {:24} {:>6.2}%", rank + 1, label, score * 100.0);
        }
    }
}

/// The configured identification folder may be missing; an explicit `--input` may not
fn predict_input(input: &Path, explicit: bool) -> Option<&Path> {
    if !explicit && !input.exists() {
        warn!("Identification images directory not found: {}", input.display());
        warn!("Please add images to {} or pass --input", input.display());
        return None;
    }
    Some(input)
}

fn cmd_predict(model_path: &Path, input: &Path) -> Result<()> {
    let model = load_model(&CentroidBackend, model_path)
        .with_context(|| format!("Failed to load model from {}", model_path.display()))?;
    let aggregator = PredictionAggregator::new(model);
    let class_names = aggregator.class_names().to_vec();

    if input.is_file() {
        println!("{} {}", "Identifying".cyan(), input.display());
        let record = aggregator.predict_one(input)?;
        print_record(&record, &class_names, true);
        return Ok(());
    }

    let paths = collect_images(input)
        .with_context(|| format!("No image or directory at {}", input.display()))?;
    if paths.is_empty() {
        println!("{} No images found in {}", "Warning:".yellow(), input.display());
        return Ok(());
    }

    println!("{} {} images in {}", "Identifying".cyan(), paths.len(), input.display());
    let records = aggregator.predict_batch(&paths);
    for record in &records {
        println!("  {}", record);
    }

    let failed = paths.len() - records.len();
    if failed > 0 {
        println!("  {} {} image(s) could not be identified", "Warning:".yellow(), failed);
    }

    println!();
    println!("{}", aggregator.summarize(&records));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_configured_folder_is_skipped() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("identification");
        assert_eq!(predict_input(&missing, false), None);
    }

    #[test]
    fn test_explicit_input_is_always_used() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("identification");
        assert_eq!(predict_input(&missing, true), Some(missing.as_path()));
        assert_eq!(predict_input(dir.path(), false), Some(dir.path()));
    }
}
