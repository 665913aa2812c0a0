//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliExportFormat, CliModel};
use crate::{
    config::{
        BackgroundColor, ExecutionProvider, ExportFormat, ModelKind, RemovalConfig,
        RemovalOptions,
    },
    models::ModelSource,
    services::OutputFormatHandler,
};
use anyhow::{Context, Result};
use std::str::FromStr;

impl From<CliModel> for ModelKind {
    fn from(model: CliModel) -> Self {
        match model {
            CliModel::General => ModelKind::General,
            CliModel::Portrait => ModelKind::Portrait,
        }
    }
}

impl From<CliExportFormat> for ExportFormat {
    fn from(format: CliExportFormat) -> Self {
        match format {
            CliExportFormat::Png => ExportFormat::Png,
            CliExportFormat::Webp => ExportFormat::WebP,
        }
    }
}

/// Convert CLI arguments into library configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Pipeline configuration: config file, then environment, then flags
    pub(crate) fn removal_config(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => RemovalConfig::default(),
        }
        .with_env_overrides();

        if let Some(provider) = &cli.execution_provider {
            config.engine.execution_provider =
                ExecutionProvider::from_str(provider).context("Invalid execution provider")?;
        }
        if cli.threads > 0 {
            config.engine.intra_threads = cli.threads;
            config.engine.inter_threads = (cli.threads / 2).max(1);
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if cli.no_cache {
            config.disable_cache = true;
        }
        if let Some(source) = &cli.model_source {
            let kind = ModelKind::from(cli.model);
            let model = match kind {
                ModelKind::General => &mut config.general,
                ModelKind::Portrait => &mut config.portrait,
            };
            model.primary = ModelSource::parse(source);
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Per-request options shared by every input of this run
    pub(crate) fn removal_options(cli: &Cli) -> Result<RemovalOptions> {
        let format = ExportFormat::from(cli.format);
        let mut options = RemovalOptions::new(cli.model.into()).with_format(format);

        if let Some(quality) = cli.quality {
            OutputFormatHandler::validate_quality_usage(format, Some(quality));
            options = options.with_quality(quality);
        }
        if let Some(radius) = cli.soften {
            options = options.with_soften_radius(radius);
        }
        if let Some(color) = &cli.background {
            options = options
                .with_background(BackgroundColor::from_str(color).context("Invalid --background")?);
        }

        options.validate().context("Invalid processing options")?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("local-bgremove").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["photo.jpg"]);
        let options = CliConfigBuilder::removal_options(&cli).unwrap();
        assert_eq!(options.model, ModelKind::General);
        assert_eq!(options.format, ExportFormat::Png);
        assert!(options.soften_radius.is_none());
        assert!(options.background.is_none());
    }

    #[test]
    fn test_request_options_from_flags() {
        let cli = parse(&[
            "photo.jpg",
            "--model",
            "portrait",
            "--format",
            "webp",
            "--quality",
            "0.8",
            "--soften",
            "2",
            "--background",
            "#ff0000",
        ]);
        let options = CliConfigBuilder::removal_options(&cli).unwrap();
        assert_eq!(options.model, ModelKind::Portrait);
        assert_eq!(options.format, ExportFormat::WebP);
        assert_eq!(options.quality, Some(0.8));
        assert_eq!(options.effective_soften_radius(), Some(2.0));
        assert_eq!(options.background, Some(BackgroundColor::new(255, 0, 0)));
    }

    #[test]
    fn test_invalid_quality_rejected() {
        let cli = parse(&["photo.jpg", "--format", "webp", "--quality", "1.5"]);
        assert!(CliConfigBuilder::removal_options(&cli).is_err());
    }

    #[test]
    fn test_model_source_applies_to_selected_variant() {
        let cli = parse(&[
            "photo.jpg",
            "--model",
            "portrait",
            "--model-source",
            "https://example.com/selfie.onnx",
            "--execution-provider",
            "cpu",
            "--threads",
            "4",
            "--no-cache",
        ]);
        let config = CliConfigBuilder::removal_config(&cli).unwrap();
        assert_eq!(
            config.portrait.primary,
            ModelSource::Url("https://example.com/selfie.onnx".to_string())
        );
        assert_eq!(config.general, RemovalConfig::default().general);
        assert_eq!(config.engine.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.engine.intra_threads, 4);
        assert_eq!(config.engine.inter_threads, 2);
        assert!(config.disable_cache);
    }

    #[test]
    fn test_invalid_execution_provider_rejected() {
        let cli = parse(&["photo.jpg", "--execution-provider", "tpu"]);
        assert!(CliConfigBuilder::removal_config(&cli).is_err());
    }
}
