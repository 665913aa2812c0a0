//! Background Removal CLI Tool
//!
//! Command-line interface for removing backgrounds from images with the
//! portrait or general segmentation model.

use super::config::CliConfigBuilder;
use super::progress::IndicatifProgressReporter;
use crate::{
    cache::{format_size, FsModelCache},
    config::{ExportFormat, RemovalConfig, RemovalOptions},
    processor::RemovalOrchestrator,
    services::{ImageIOService, OutputFormatHandler, ProgressReporter},
    tracing_config::{spans, TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "bmp", "gif"];
const OUTPUT_SUFFIX: &str = "-no-bg";

/// Remove image backgrounds on-device
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "local-bgremove")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(value_name = "INPUT", required_unless_present_any = &["show_cache_dir", "list_cache", "clear_cache"])]
    pub input: Vec<PathBuf>,

    /// Output file (single input) or directory
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Segmentation model
    #[arg(short, long, value_enum, default_value_t = CliModel::General)]
    pub model: CliModel,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = CliExportFormat::Png)]
    pub format: CliExportFormat,

    /// Lossy export quality (0.0-1.0, WebP only)
    #[arg(short, long)]
    pub quality: Option<f32>,

    /// Soften mask edges with a blur of this radius in pixels (0-100)
    #[arg(long, value_name = "RADIUS")]
    pub soften: Option<f32>,

    /// Composite over a solid colour (#rrggbb, white, black)
    #[arg(long, value_name = "COLOR")]
    pub background: Option<String>,

    /// Override the selected model's weights with a URL or local path
    #[arg(long, value_name = "URL|PATH")]
    pub model_source: Option<String>,

    /// Execution provider for ONNX Runtime (auto, cpu, cuda, coreml)
    #[arg(short, long)]
    pub execution_provider: Option<String>,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Bypass the model cache
    #[arg(long)]
    pub no_cache: bool,

    /// Walk directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Show the model cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// List cached models and exit
    #[arg(long)]
    pub list_cache: bool,

    /// Remove every cached model and exit
    #[arg(long)]
    pub clear_cache: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliModel {
    General,
    Portrait,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExportFormat {
    Png,
    Webp,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_session_id(uuid::Uuid::new_v4().to_string())
        .init()
        .context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::removal_config(&cli)?;

    if cli.show_cache_dir {
        return show_cache_dir(&config);
    }
    if cli.list_cache {
        return list_cache(&config).await;
    }
    if cli.clear_cache {
        return clear_cache(&config).await;
    }

    let options = CliConfigBuilder::removal_options(&cli)?;
    if !OutputFormatHandler::is_available(options.format) {
        anyhow::bail!(
            "{:?} export is not available in this build",
            options.format
        );
    }

    let files = collect_inputs(&cli.input, cli.recursive)?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(());
    }
    info!("Found {} image file(s) to process", files.len());

    let start_time = Instant::now();
    let processed = process_inputs(&cli, config, &options, &files)
        .instrument(spans::batch_processing(files.len()))
        .await?;
    info!(
        "Processed {}/{} image(s) in {:.2}s",
        processed,
        files.len(),
        start_time.elapsed().as_secs_f64()
    );

    if processed == 0 {
        anyhow::bail!("All inputs failed to process");
    }
    Ok(())
}

fn open_cache(config: &RemovalConfig) -> Result<FsModelCache> {
    FsModelCache::new(config.cache_dir.as_deref()).context("Failed to open model cache")
}

fn show_cache_dir(config: &RemovalConfig) -> Result<()> {
    let cache = open_cache(config)?;
    println!("📁 Model cache directory: {}", cache.cache_dir().display());
    Ok(())
}

async fn list_cache(config: &RemovalConfig) -> Result<()> {
    let cache = open_cache(config)?;
    let entries = cache
        .list_entries()
        .await
        .context("Failed to list cached models")?;

    if entries.is_empty() {
        println!("No cached models in {}", cache.cache_dir().display());
        return Ok(());
    }

    println!("📦 Cached models ({})", cache.cache_dir().display());
    for entry in entries {
        println!("  • {}", entry.key);
        println!(
            "    └─ {} · cached {}",
            format_size(entry.size_bytes),
            entry.cached_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn clear_cache(config: &RemovalConfig) -> Result<()> {
    let cache = open_cache(config)?;
    let removed = cache.clear_all().await.context("Failed to clear cache")?;
    if removed.is_empty() {
        println!("💡 Cache was already empty");
    } else {
        println!("✅ Removed {} cached model(s)", removed.len());
    }
    Ok(())
}

/// Run every file through one orchestrator, resetting between inputs
async fn process_inputs(
    cli: &Cli,
    config: RemovalConfig,
    options: &RemovalOptions,
    files: &[PathBuf],
) -> Result<usize> {
    let output_target = resolve_output(cli.output.as_deref(), files.len())?;

    let multi = MultiProgress::new();
    let batch_bar = (files.len() > 1).then(|| {
        let bar = multi.add(ProgressBar::new(files.len() as u64));
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:30.green/white}] {pos}/{len} files")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    });
    let reporter = Arc::new(IndicatifProgressReporter::new(Some(&multi), cli.verbose > 1));

    let orchestrator = RemovalOrchestrator::from_config(config)
        .context("Failed to create background removal orchestrator")?
        .with_reporter(Arc::clone(&reporter) as Arc<dyn ProgressReporter>);

    let mut processed = 0;
    let mut failed = 0;

    for input in files {
        let name = input
            .file_name()
            .map_or_else(|| input.display().to_string(), |n| n.to_string_lossy().to_string());
        reporter.start_file(&name);
        let span = spans::file_processing(
            input,
            options.model.as_str(),
            OutputFormatHandler::get_extension(options.format),
        );

        let output = match &output_target {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Directory(dir) => output_path(input, Some(dir), options.format),
            OutputTarget::NextToInput => output_path(input, None, options.format),
        };

        match orchestrator.process_file(input, options).instrument(span).await {
            Ok(result) => {
                ImageIOService::save_bytes(&output, &result.processed_encoded)
                    .await
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                log::debug!("Saved {}", output.display());
                processed += 1;
            },
            Err(e) => {
                error!("❌ Failed to process {}: {}", input.display(), e);
                failed += 1;
            },
        }
        orchestrator.reset();

        if let Some(bar) = &batch_bar {
            bar.inc(1);
        }
    }

    reporter.finish();
    if let Some(bar) = batch_bar {
        bar.finish_with_message(format!("Processed: {processed}, Failed: {failed}"));
    }
    if failed > 0 {
        warn!("Some files failed to process. Processed: {processed}, Failed: {failed}");
    }
    Ok(processed)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum OutputTarget {
    File(PathBuf),
    Directory(PathBuf),
    NextToInput,
}

/// Decide where results go; creates the output directory when needed
fn resolve_output(output: Option<&Path>, file_count: usize) -> Result<OutputTarget> {
    let Some(output) = output else {
        return Ok(OutputTarget::NextToInput);
    };

    let looks_like_file = output.extension().is_some() && !output.is_dir();
    if file_count == 1 && looks_like_file {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        return Ok(OutputTarget::File(output.to_path_buf()));
    }

    if output.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output.display()
        );
    }
    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {}", output.display()))?;
    Ok(OutputTarget::Directory(output.to_path_buf()))
}

/// Expand directories into image files, sorted for a stable order
fn collect_inputs(inputs: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            if is_image_file(input) {
                files.push(input.clone());
            } else {
                warn!("Skipping unsupported file: {}", input.display());
            }
        } else if input.is_dir() {
            let walker = walkdir::WalkDir::new(input).min_depth(1);
            let walker = if recursive { walker } else { walker.max_depth(1) };
            for entry in walker {
                let entry = entry?;
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                input.display()
            );
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// `<stem>-no-bg.<ext>` next to the input or inside `output_dir`
fn output_path(input: &Path, output_dir: Option<&Path>, format: ExportFormat) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = format!(
        "{}{}.{}",
        stem,
        OUTPUT_SUFFIX,
        OutputFormatHandler::get_extension(format)
    );
    match output_dir {
        Some(dir) => dir.join(file_name),
        None => input
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(file_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_next_to_input() {
        let path = output_path(Path::new("shots/cat.jpeg"), None, ExportFormat::Png);
        assert_eq!(path, PathBuf::from("shots/cat-no-bg.png"));
    }

    #[test]
    fn test_output_path_in_directory() {
        let path = output_path(
            Path::new("shots/cat.jpeg"),
            Some(Path::new("out")),
            ExportFormat::WebP,
        );
        assert_eq!(path, PathBuf::from("out/cat-no-bg.webp"));
    }

    #[test]
    fn test_collect_inputs_walks_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.png"), b"x").unwrap();
        std::fs::write(dir.path().join("a.JPG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(nested.join("c.webp"), b"x").unwrap();

        let flat = collect_inputs(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(
            flat,
            vec![dir.path().join("a.JPG"), dir.path().join("b.png")]
        );

        let deep = collect_inputs(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&nested.join("c.webp")));
    }

    #[test]
    fn test_collect_inputs_missing_path() {
        assert!(collect_inputs(&[PathBuf::from("/definitely/not/here.png")], false).is_err());
    }

    #[test]
    fn test_resolve_output() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve_output(None, 3).unwrap(), OutputTarget::NextToInput);

        let file = dir.path().join("result.png");
        assert_eq!(resolve_output(Some(&file), 1).unwrap(), OutputTarget::File(file));

        let out_dir = dir.path().join("batch");
        assert_eq!(
            resolve_output(Some(&out_dir), 2).unwrap(),
            OutputTarget::Directory(out_dir.clone())
        );
        assert!(out_dir.is_dir());
    }

    #[test]
    fn test_cli_requires_input_unless_cache_command() {
        assert!(Cli::try_parse_from(["local-bgremove"]).is_err());
        assert!(Cli::try_parse_from(["local-bgremove", "--list-cache"]).is_ok());
    }
}
