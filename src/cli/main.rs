//! Room editing CLI tool
//!
//! Command-line frontend over `RoomEditProcessor`: whole-room generation,
//! masked removal and staging edits, reference analysis previews and gallery
//! listing. Results are printed as JSON on stdout; logs go to stderr.

use super::{config::CliConfigBuilder, progress::SpinnerProgressReporter};
use crate::{
    config::PipelineConfig,
    context::ServiceContext,
    processor::RoomEditProcessor,
    services::{GalleryStore, ImageIOService},
    tracing_config::{events, init_cli_tracing, spans, TracingFormat},
    types::{EditRequest, GenerateRequest, GeneratedArtifact, ProductCategory, ReferenceSource},
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::{
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, Instrument};

/// Room photo editing: furniture removal and reference-guided staging
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "lumina")]
pub struct Cli {
    /// Configuration file (JSON) [default: <config dir>/lumina-stage/config.json if present]
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console, global = true)]
    pub log_format: CliLogFormat,

    /// Base URL of the generation backend
    #[arg(long, value_name = "URL", global = true)]
    pub backend_url: Option<String>,

    /// Bearer token for the generation backend
    #[arg(long, value_name = "TOKEN", global = true)]
    pub api_key: Option<String>,

    /// Directory holding the gallery and other published files
    #[arg(long, value_name = "PATH", global = true)]
    pub storage_root: Option<PathBuf>,

    /// Externally visible base URL used in artifact links
    #[arg(long, value_name = "URL", global = true)]
    pub public_base_url: Option<String>,

    /// Upper bound for a single generation call in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Re-imagine a whole room while keeping its structure
    Generate {
        /// Room photo
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Free-text description of the desired room
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Style preset (scandi, indus, japandi, cyber, lux)
        #[arg(short, long)]
        style: Option<String>,

        /// Also write the generated PNG here
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Edit a masked region: remove furniture, or stage a product when a reference is given
    Edit {
        /// Room photo
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Mask image, white where the edit applies
        #[arg(short, long, value_name = "MASK")]
        mask: PathBuf,

        /// Reference product image
        #[arg(short, long, value_name = "PATH")]
        reference: Option<PathBuf>,

        /// Reference product URL or published storage path
        #[arg(long, value_name = "URI")]
        reference_uri: Option<String>,

        /// Free-text description of the product
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Product category (couch, chair, plant, table, tv)
        #[arg(short, long)]
        category: Option<String>,

        /// Style preset (scandi, indus, japandi, cyber, lux)
        #[arg(short, long)]
        style: Option<String>,

        /// Also write the edited PNG here
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Show the attributes and staging prompt inferred for a reference image
    Analyze {
        /// Reference product image
        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        /// Free-text description of the product
        #[arg(short, long, default_value = "")]
        prompt: String,

        /// Product category (couch, chair, plant, table, tv)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// List stored artifacts, newest first
    Gallery {
        /// Show at most this many entries
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Generate { .. } => "generate",
            Command::Edit { .. } => "edit",
            Command::Analyze { .. } => "analyze",
            Command::Gallery { .. } => "gallery",
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<CliLogFormat> for TracingFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Console => TracingFormat::Console,
            CliLogFormat::Compact => TracingFormat::Compact,
            #[cfg(feature = "tracing-json")]
            CliLogFormat::Json => TracingFormat::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id =
        init_cli_tracing(cli.verbose, cli.log_format.into()).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    let session = spans::session(&session_id, &config.backend.base_url);
    let command = spans::command(cli.command.name());

    let result = run(&cli, config)
        .instrument(command)
        .instrument(session)
        .await;

    if let Err(e) = &result {
        let boxed: &(dyn std::error::Error + 'static) = e.as_ref();
        events::error_with_context(boxed, cli.command.name());
    }
    result
}

async fn run(cli: &Cli, config: PipelineConfig) -> Result<()> {
    match &cli.command {
        Command::Gallery { limit } => list_gallery(&config, *limit).await,
        Command::Analyze {
            reference,
            prompt,
            category,
        } => {
            let processor = build_processor(config, cli.verbose)?;
            analyze_reference(&processor, reference, prompt, category.as_deref()).await
        },
        Command::Generate {
            image,
            prompt,
            style,
            output,
        } => {
            let processor = build_processor(config, cli.verbose)?;
            let request = GenerateRequest {
                image: ImageIOService::read_file(image).await?,
                user_prompt: prompt.clone(),
                style: CliConfigBuilder::parse_style(style.as_deref())?,
            };

            info!("Generating room from {}", image.display());
            let outcome = processor
                .generate_room(request)
                .await
                .context("Room generation failed")?;

            write_output(output.as_deref(), &outcome.artifact)?;
            print_json(&outcome)
        },
        Command::Edit {
            image,
            mask,
            reference,
            reference_uri,
            prompt,
            category,
            style,
            output,
        } => {
            let processor = build_processor(config, cli.verbose)?;
            let upload = match reference {
                Some(path) => Some(ImageIOService::read_file(path).await?),
                None => None,
            };

            let mut request = EditRequest::new(
                ImageIOService::read_file(image).await?,
                ImageIOService::read_file(mask).await?,
                prompt.clone(),
            )
            .with_reference(ReferenceSource::from_parts(upload, reference_uri.clone()));
            if let Some(tag) = category {
                request = request.with_category(ProductCategory::from_tag(tag));
            }
            if let Some(style) = CliConfigBuilder::parse_style(style.as_deref())? {
                request = request.with_style(style);
            }

            info!("Editing {} with mask {}", image.display(), mask.display());
            let outcome = processor.edit(request).await.context("Edit failed")?;
            events::progress(
                &format!("{} edit stored as {}", outcome.mode.as_str(), outcome.artifact.filename),
                "✅",
            );

            write_output(output.as_deref(), &outcome.artifact)?;
            print_json(&outcome)
        },
    }
}

fn build_processor(config: PipelineConfig, verbose: u8) -> Result<RoomEditProcessor> {
    let context = ServiceContext::new(config).context("Failed to create service context")?;

    // Keep stderr clean when it is piped
    let reporter = if io::stderr().is_terminal() {
        SpinnerProgressReporter::new(verbose > 0)
    } else {
        SpinnerProgressReporter::hidden()
    };

    Ok(RoomEditProcessor::new(Arc::new(context)).with_progress_reporter(Arc::new(reporter)))
}

async fn analyze_reference(
    processor: &RoomEditProcessor,
    reference: &Path,
    prompt: &str,
    category: Option<&str>,
) -> Result<()> {
    let bytes = ImageIOService::read_file(reference).await?;
    let (attributes, staging_prompt) = processor
        .analyze_reference(&bytes, prompt, category.map(ProductCategory::from_tag))
        .await
        .context("Reference analysis failed")?;

    #[derive(Serialize)]
    struct AnalysisReport<'a> {
        reference: &'a Path,
        attributes: crate::types::ReferenceAttributes,
        prompt: crate::types::SynthesizedPrompt,
    }

    print_json(&AnalysisReport {
        reference,
        attributes,
        prompt: staging_prompt,
    })
}

async fn list_gallery(config: &PipelineConfig, limit: Option<usize>) -> Result<()> {
    let store = GalleryStore::new(config);
    let mut entries = store.list().await.context("Failed to list gallery")?;
    debug!(
        "{} artifact(s) in {}",
        entries.len(),
        store.directory().display()
    );

    if let Some(limit) = limit {
        entries.truncate(limit);
    }
    print_json(&entries)
}

/// Copy the stored artifact to a user-chosen path
fn write_output(output: Option<&Path>, artifact: &GeneratedArtifact) -> Result<()> {
    let Some(path) = output else {
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, &artifact.image_bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", json).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}
