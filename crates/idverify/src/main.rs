//! ID document verification CLI
//!
//! Runs the verification pipeline, or one of its stages, against local files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idverify::config::Settings;
use idverify::extract::StructuredExtractor;
use idverify::face::{AzureFaceClient, DetectOptions, FaceMatcher};
use idverify::ingest::DocumentIngestor;
use idverify::llm::OpenAIClient;
use idverify::prompts::PromptTemplates;
use idverify::VerificationPipeline;
use idverify_storage::{BlobStore, LocalBlobStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "idverify")]
#[command(about = "Verify ID documents against stored customer records")]
struct Args {
    /// TOML settings file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, reconcile and compare photos; prints the comparison report
    Analyze {
        /// Customer id of the stored record
        #[arg(long)]
        customer_id: String,

        /// ID document (PDF, JPEG or PNG)
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Extract the structured document only
    Extract {
        /// ID document (PDF, JPEG or PNG)
        #[arg(short, long)]
        document: PathBuf,
    },

    /// Compare the faces of two images (local paths or blob URLs)
    CompareFaces { first: String, second: String },

    /// Issue a signed read URL for a blob
    Sas {
        /// Blob URL or name
        blob: String,

        /// Lifetime in seconds (default: pipeline.sas_ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
    },
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn blob_store(settings: &Settings) -> Result<Arc<LocalBlobStore>> {
    Ok(Arc::new(
        LocalBlobStore::new(settings.storage.blob.clone()).context("Failed to open blob store")?,
    ))
}

async fn analyze(settings: &Settings, customer_id: &str, document: &Path, pretty: bool) -> Result<()> {
    let pipeline =
        VerificationPipeline::from_settings(settings).context("Failed to build pipeline")?;
    let report = pipeline
        .analyze_path(customer_id, document)
        .await
        .with_context(|| format!("Verification of {} failed", document.display()))?;
    print_json(&report, pretty)
}

async fn extract(settings: &Settings, document: &Path, pretty: bool) -> Result<()> {
    let prompts = PromptTemplates::load(settings.pipeline.prompt_dir.as_deref())?;
    let model = OpenAIClient::new(settings.llm.clone()).context("Failed to create LLM client")?;
    let extractor = StructuredExtractor::new(Arc::new(model), blob_store(settings)?, prompts.extraction);

    let ingestor = DocumentIngestor::with_pdfium(&settings.pipeline.work_dir, settings.pipeline.pdf_dpi);
    let ingested = ingestor
        .normalize(document)
        .with_context(|| format!("Failed to read {}", document.display()))?;
    info!("{} page(s) to extract", ingested.pages().len());

    let id_document = extractor
        .process_document(ingested.source(), ingested.pages())
        .await
        .context("Extraction failed")?;
    print_json(&id_document, pretty)
}

async fn compare_faces(settings: &Settings, first: &str, second: &str, pretty: bool) -> Result<()> {
    let service = AzureFaceClient::new(&settings.face).context("Failed to create face client")?;
    let options = DetectOptions {
        face_id_ttl_secs: settings.face.face_id_ttl_secs,
        ..DetectOptions::default()
    };
    let matcher = FaceMatcher::new(Arc::new(service), blob_store(settings)?, &settings.pipeline.work_dir)
        .with_buffer(settings.face.buffer)
        .with_options(options);

    let result = matcher
        .compare_document_photos(first, second)
        .await
        .context("Face comparison failed")?;
    print_json(&result, pretty)
}

fn sas(settings: &Settings, blob: &str, ttl: Option<u64>) -> Result<()> {
    let ttl = Duration::from_secs(ttl.unwrap_or(settings.pipeline.sas_ttl_secs));
    let url = blob_store(settings)?
        .sas_url(blob, ttl)
        .context("Failed to sign URL")?;
    println!("{url}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "idverify=info"
                    .parse()
                    .context("invalid log directive")?,
            ),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;

    match args.command {
        Command::Analyze {
            customer_id,
            document,
        } => analyze(&settings, &customer_id, &document, args.pretty).await?,
        Command::Extract { document } => extract(&settings, &document, args.pretty).await?,
        Command::CompareFaces { first, second } => {
            compare_faces(&settings, &first, &second, args.pretty).await?;
        }
        Command::Sas { blob, ttl } => sas(&settings, &blob, ttl)?,
    }

    Ok(())
}
