//! mediafiles: run files through the processing pipeline from the shell.
//!
//! Configuration comes from the environment or a `.env` file: STORAGE_BACKEND,
//! LOCAL_STORAGE_PATH, DATABASE_URL, WORKER_ENABLED, FFMPEG_PATH, LOG_FORMAT.
//! Without DATABASE_URL records only live for the duration of the command.

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use mediafiles_cli::{build_kind, parse_size, KindOptions};
use mediafiles_core::{Config, MediaRecord, MediaVariant, OwnerRef};
use mediafiles_infra::{bootstrap, init_telemetry, shutdown_telemetry, Runtime};
use mediafiles_worker::NewMedia;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mediafiles", about = "Media file processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local file and wait for processing to finish
    Process {
        /// Path to the file
        file: PathBuf,
        /// Record variant: file, image, video or document
        #[arg(long, default_value = "file")]
        kind: MediaVariant,
        /// Image: bound for the longer side
        #[arg(long)]
        max_size: Option<u32>,
        /// Image: encoder quality, 1-100
        #[arg(long)]
        quality: Option<u8>,
        /// Image: thumbnail box as W or W,H
        #[arg(long)]
        thumbnail_size: Option<String>,
        /// Video: preview frame as W or W,H
        #[arg(long)]
        preview_size: Option<String>,
        /// Video: x264 constant rate factor
        #[arg(long)]
        crf: Option<u8>,
        /// Video: x264 preset
        #[arg(long)]
        preset: Option<String>,
        /// Attach to an owner, as TYPE:ID
        #[arg(long)]
        owner: Option<OwnerRef>,
        /// Give up waiting after this many seconds
        #[arg(long, default_value = "300")]
        wait_secs: u64,
    },
    /// Show a stored record (requires DATABASE_URL)
    Show {
        /// Record id
        id: i64,
    },
    /// List records attached to an owner (requires DATABASE_URL)
    List {
        /// Owner as TYPE:ID
        owner: OwnerRef,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize record")?;
    println!("{}", out);
    Ok(())
}

async fn wait_for_terminal(
    runtime: &Runtime,
    record: MediaRecord,
    timeout: Duration,
) -> anyhow::Result<MediaRecord> {
    let id = record.id;
    let deadline = tokio::time::Instant::now() + timeout;
    let mut current = record;

    while !current.status.is_terminal() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!(
                "Media file {} still {} after {}s",
                id,
                current.status,
                timeout.as_secs()
            );
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        current = runtime
            .service
            .get(id)
            .await?
            .with_context(|| format!("Media file {} disappeared", id))?;
    }
    Ok(current)
}

fn size_arg(name: &str, value: Option<String>) -> anyhow::Result<Option<Vec<u32>>> {
    value
        .map(|v| parse_size(&v).map_err(|e| anyhow::anyhow!("Invalid --{}: {}", name, e)))
        .transpose()
}

fn require_persistence(runtime: &Runtime) -> anyhow::Result<()> {
    if !runtime.is_persistent() {
        anyhow::bail!("This command needs DATABASE_URL to read stored records");
    }
    Ok(())
}

async fn run(cli: Cli, runtime: &Runtime) -> anyhow::Result<()> {
    match cli.command {
        Commands::Process {
            file,
            kind,
            max_size,
            quality,
            thumbnail_size,
            preview_size,
            crf,
            preset,
            owner,
            wait_secs,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".to_string());

            let kind = build_kind(
                kind,
                KindOptions {
                    max_size,
                    quality,
                    thumbnail_size: size_arg("thumbnail-size", thumbnail_size)?,
                    preview_size: size_arg("preview-size", preview_size)?,
                    crf,
                    preset,
                },
            );
            let mut media = NewMedia::new(kind);
            if let Some(owner) = owner {
                media = media.with_owner(owner);
            }

            let record = runtime
                .service
                .upload(media, Bytes::from(data), &filename)
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            let record =
                wait_for_terminal(runtime, record, Duration::from_secs(wait_secs)).await?;
            print_json(&record)?;
        }
        Commands::Show { id } => {
            require_persistence(runtime)?;
            let record = runtime
                .service
                .get(id)
                .await?
                .with_context(|| format!("Media file {} not found", id))?;
            print_json(&record)?;
        }
        Commands::List { owner } => {
            require_persistence(runtime)?;
            let records = runtime.service.list_for_owner(&owner).await?;
            print_json(&records)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    init_telemetry(config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let runtime = bootstrap(&config).await?;
    let result = run(cli, &runtime).await;

    runtime.shutdown().await;
    shutdown_telemetry().await;
    result
}
