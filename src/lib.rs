//! cooler-upload: batch uploader for retail cooler photos and their annotations.
//!
//! Records pair a photo URL with a cooler metadata tree (doors, sections,
//! products, stacked products). Each photo is uploaded into a date-keyed
//! dataset project and its tree is converted into a Pascal VOC annotation
//! attached to the uploaded image. Uploads run sequentially in rate-limited
//! batches with bounded retries, and one failing image never aborts a run.
//!
//! # Modules
//!
//! - [`geometry`]: Points, rectangles and polygon/corner to bounding box conversion
//! - [`cooler`]: The typed cooler metadata tree
//! - [`annotation`]: Flattening a tree into an annotation document, and VOC XML
//! - [`normalize`]: Raw records to upload units
//! - [`project`]: Date-keyed project lookup and creation
//! - [`client`]: Dataset service API and the single-image upload pipeline
//! - [`batch`]: Batching, pacing, retries and the run summary
//! - [`error`]: Error types

pub mod annotation;
pub mod batch;
pub mod client;
pub mod cooler;
pub mod error;
pub mod geometry;
pub mod normalize;
pub mod project;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use annotation::{annotation_filename, build_document, voc_xml, DocumentSource};
use batch::{BatchOrchestrator, BatchPolicy};
use client::{ApiConfig, UploadClient, UploadOptions, UreqDatasetApi, DEFAULT_BASE_URL};
use project::ProjectResolver;

pub use error::CoolerUploadError;

/// The cooler-upload CLI application.
#[derive(Parser)]
#[command(name = "cooler-upload")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload photos and their annotations from a records file.
    Upload(UploadArgs),
    /// Print the VOC XML each record would be annotated with, without uploading.
    Render(RenderArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct UploadArgs {
    /// JSON array of `{ "photosTaken": <url>, "metadata": <object> }` records.
    input: PathBuf,

    #[arg(long, env = "ROBOFLOW_API_KEY", hide_env_values = true)]
    api_key: String,

    #[arg(long, env = "ROBOFLOW_WORKSPACE")]
    workspace: String,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Images per batch.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Pause between batches, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    batch_delay_ms: u64,

    /// Pause between images within a batch, in milliseconds.
    #[arg(long, default_value_t = 500)]
    image_delay_ms: u64,

    /// Attempts per image, including the first.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    max_retries: u32,

    /// Pause between failed attempts, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    retry_backoff_ms: u64,

    /// Timeout for each HTTP request, in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// JPEG quality used when re-encoding downloaded photos.
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(1..=100))]
    reencode_quality: u8,

    /// Upload downloaded bytes as-is instead of re-encoding them as JPEG.
    #[arg(long)]
    no_reencode: bool,

    /// Skip reading each image back to check its annotation count.
    #[arg(long)]
    no_verify: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// JSON array of records.
    input: PathBuf,

    /// Write one `.xml` file per annotated record here instead of stdout.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

/// Run the cooler-upload CLI.
///
/// Called from `main.rs`; the caller owns logging setup and the exit code.
pub fn run() -> Result<(), CoolerUploadError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Upload(args) => run_upload(args),
        Commands::Render(args) => run_render(args),
    }
}

fn run_upload(args: UploadArgs) -> Result<(), CoolerUploadError> {
    let records = normalize::load_records(&args.input)?;
    tracing::info!(records = records.len(), input = %args.input.display(), "Loaded records");

    let api = UreqDatasetApi::new(ApiConfig {
        base_url: args.base_url,
        api_key: args.api_key,
        timeout: Duration::from_secs(args.timeout_secs),
    })?;
    let options = UploadOptions {
        reencode_quality: (!args.no_reencode).then_some(args.reencode_quality),
        verify: !args.no_verify,
    };
    let policy = BatchPolicy {
        batch_size: usize::try_from(args.batch_size).unwrap_or(usize::MAX),
        batch_delay: Duration::from_millis(args.batch_delay_ms),
        image_delay: Duration::from_millis(args.image_delay_ms),
        max_retries: args.max_retries,
        retry_backoff: Duration::from_millis(args.retry_backoff_ms),
    };

    let resolver = ProjectResolver::new(api.clone(), args.workspace.clone());
    let uploader = UploadClient::new(api, args.workspace, options);
    let orchestrator = BatchOrchestrator::new(uploader, policy);

    let result = orchestrator.run(&records, &resolver)?;

    match args.output {
        OutputFormat::Json => {
            println!("{}", to_pretty_json(&result)?);
        }
        OutputFormat::Text => print!("{result}"),
    }

    if result.is_complete_success() {
        Ok(())
    } else {
        Err(CoolerUploadError::UploadIncomplete {
            failed: result.failed,
            total: result.total_images,
        })
    }
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, CoolerUploadError> {
    serde_json::to_string_pretty(value).map_err(|source| CoolerUploadError::JsonWrite { source })
}

fn run_render(args: RenderArgs) -> Result<(), CoolerUploadError> {
    let records = normalize::load_records(&args.input)?;
    let units = normalize::normalize_records(&records)?;

    if let Some(dir) = &args.out_dir {
        fs::create_dir_all(dir)?;
    }

    let mut rendered = 0;
    for unit in &units {
        let Some(tree) = &unit.annotation_tree else {
            tracing::info!(filename = %unit.filename, "No cooler metadata; nothing to render");
            continue;
        };
        let document = build_document(tree, &DocumentSource::new(&unit.filename, &unit.source_url))?;
        let xml = voc_xml::render(&document);

        match &args.out_dir {
            Some(dir) => {
                let path = dir.join(annotation_filename(&unit.filename));
                fs::write(&path, xml)?;
                tracing::info!(path = %path.display(), objects = document.objects.len(), "Wrote annotation");
            }
            None => print!("{xml}"),
        }
        rendered += 1;
    }

    if args.out_dir.is_some() {
        println!("Rendered {rendered} of {} record(s)", units.len());
    }
    Ok(())
}
