use clap::Parser;
use restyle_batch::{
    config::{AppConfig, SharedCredential},
    models::item::UploadedFile,
    services::{export::ARCHIVE_FILE_NAME, gemini::GeminiClient, workbench::Workbench},
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Restyle every image under a directory and write the results to a zip archive.
#[derive(Debug, Parser)]
#[command(name = "batch", version)]
struct Args {
    /// Directory scanned recursively for images
    input: PathBuf,

    /// Archive to write
    #[arg(short, long, default_value = ARCHIVE_FILE_NAME)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();

    tracing::info!(input = %args.input.display(), "Starting offline batch");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");
    let credential = SharedCredential::new(config.gemini_api_key.clone());

    let generator = GeminiClient::from_config(&config, credential.clone())
        .expect("Failed to initialize Gemini client");
    let workbench = Workbench::new(
        Arc::new(generator),
        credential,
        config.prompt_settings(),
        config.pacing(),
    );

    let files = match collect_files(&args.input) {
        Ok(files) => files,
        Err(e) => {
            tracing::error!(error = %e, "Failed to read input directory");
            return ExitCode::FAILURE;
        }
    };

    let ingested = workbench.ingest(files);
    if ingested.items.is_empty() {
        tracing::error!(skipped = ingested.skipped, "No images found");
        return ExitCode::FAILURE;
    }

    let summary = match workbench.run_batch().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Batch refused");
            return ExitCode::FAILURE;
        }
    };

    for item in workbench.items().iter().filter(|i| !i.status.is_success()) {
        tracing::warn!(
            path = %item.relative_path,
            error = item.error_message.as_deref().unwrap_or(""),
            "Item failed"
        );
    }

    workbench.select_all_completed();
    let archive = match workbench.export_selected() {
        Ok(archive) => archive,
        Err(e) => {
            tracing::error!(error = %e, "Nothing to export");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::write(&args.output, archive) {
        tracing::error!(output = %args.output.display(), error = %e, "Failed to write archive");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        output = %args.output.display(),
        completed = summary.completed,
        fallback = summary.fallback,
        failed = summary.failed,
        "Archive written"
    );
    ExitCode::SUCCESS
}

/// Read every regular file under `root`, keyed by its `/`-separated path
/// relative to `root`. Media types are sniffed during ingestion.
fn collect_files(root: &Path) -> Result<Vec<UploadedFile>, walkdir::Error> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match std::fs::read(entry.path()) {
            Ok(bytes) => files.push(UploadedFile {
                path,
                media_type: None,
                bytes,
            }),
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable file"),
        }
    }

    tracing::debug!(files = files.len(), "Collected input files");
    Ok(files)
}
