//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, Command};
use crate::{config::PipelineConfig, types::StyleTag};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Convert CLI arguments to a validated `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the pipeline configuration from the config file and CLI overrides
    ///
    /// An explicit `--config` must exist. Without one, the default config
    /// location is used when present and built-in defaults otherwise.
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match Self::config_path(cli) {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                PipelineConfig::from_file(&path)
                    .with_context(|| format!("Failed to load config file {}", path.display()))?
            },
            None => PipelineConfig::default(),
        };

        if let Some(url) = &cli.backend_url {
            config.backend.base_url.clone_from(url);
        }
        if let Some(key) = &cli.api_key {
            config.backend.api_key = Some(key.clone());
        }
        if let Some(root) = &cli.storage_root {
            config.storage_root.clone_from(root);
        }
        if let Some(url) = &cli.public_base_url {
            config.public_base_url.clone_from(url);
        }
        if let Some(secs) = cli.timeout {
            config.generation_timeout_secs = secs;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn config_path(cli: &Cli) -> Option<PathBuf> {
        if let Some(path) = &cli.config {
            return Some(path.clone());
        }
        PipelineConfig::default_config_path().filter(|path| path.is_file())
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(path) = &cli.config {
            if !path.is_file() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
        }

        match &cli.command {
            Command::Generate { style, .. } => Self::validate_style(style.as_deref()),
            Command::Edit {
                style,
                reference,
                reference_uri,
                ..
            } => {
                Self::validate_style(style.as_deref())?;
                if let Some(path) = reference {
                    if !path.is_file() {
                        anyhow::bail!("Reference image not found: {}", path.display());
                    }
                }
                if let Some(uri) = reference_uri {
                    if uri.trim().is_empty() {
                        anyhow::bail!("--reference-uri must not be empty");
                    }
                }
                Ok(())
            },
            Command::Analyze { .. } | Command::Gallery { .. } => Ok(()),
        }
    }

    /// Parse an optional style tag, rejecting unknown values
    pub(crate) fn parse_style(style: Option<&str>) -> Result<Option<StyleTag>> {
        match style {
            None => Ok(None),
            Some(tag) => StyleTag::from_tag(tag).map(Some).with_context(|| {
                format!(
                    "Unknown style '{}'. Expected one of: scandi, indus, japandi, cyber, lux",
                    tag
                )
            }),
        }
    }

    fn validate_style(style: Option<&str>) -> Result<()> {
        Self::parse_style(style).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliLogFormat;

    fn create_test_cli(command: Command) -> Cli {
        Cli {
            config: None,
            verbose: 0,
            log_format: CliLogFormat::Console,
            backend_url: None,
            api_key: None,
            storage_root: None,
            public_base_url: None,
            timeout: None,
            command,
        }
    }

    fn generate_command(style: Option<&str>) -> Command {
        Command::Generate {
            image: PathBuf::from("room.jpg"),
            prompt: String::new(),
            style: style.map(str::to_string),
            output: None,
        }
    }

    #[test]
    fn test_cli_overrides_apply() {
        let mut cli = create_test_cli(Command::Gallery { limit: None });
        cli.backend_url = Some("http://gpu-box:7860".to_string());
        cli.storage_root = Some(PathBuf::from("/srv/lumina"));
        cli.public_base_url = Some("https://rooms.example.com".to_string());
        cli.timeout = Some(90);

        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.backend.base_url, "http://gpu-box:7860");
        assert_eq!(config.storage_root, PathBuf::from("/srv/lumina"));
        assert_eq!(config.generation_timeout_secs, 90);
        assert_eq!(
            config.public_storage_prefix(),
            "https://rooms.example.com/static"
        );
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut cli = create_test_cli(Command::Gallery { limit: None });
        cli.timeout = Some(0);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_cli_validation() {
        let cli = create_test_cli(generate_command(Some("japandi")));
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        let cli = create_test_cli(generate_command(Some("baroque")));
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let mut cli = create_test_cli(generate_command(None));
        cli.config = Some(PathBuf::from("/definitely/not/here.json"));
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "edit_steps": 12, "backend": { "sampler_name": "Euler a" } }"#)
            .unwrap();

        let mut cli = create_test_cli(Command::Gallery { limit: None });
        cli.config = Some(path);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.edit_steps, 12);
        assert_eq!(config.backend.sampler_name, "Euler a");
        assert_eq!(config.generation_steps, 20);
    }

    #[test]
    fn test_parse_style() {
        assert_eq!(CliConfigBuilder::parse_style(None).unwrap(), None);
        assert_eq!(
            CliConfigBuilder::parse_style(Some("lux")).unwrap(),
            Some(StyleTag::LuxuryModern)
        );
    }
}
