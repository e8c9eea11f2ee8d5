//! Client CLI for the depot file server.

mod api_client;
mod precheck;
mod upload;

use anyhow::{Context, Result};
use api_client::FileServerClient;
use clap::{Parser, Subcommand};
use depot_core::api::InitUploadRequest;
use depot_core::{total_chunks_for, FileName};
use indicatif::{ProgressBar, ProgressStyle};
use precheck::{ExitReason, PrecheckAction};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use upload::ChunkUploadPlan;

#[derive(Parser)]
#[command(name = "depot")]
#[command(about = "Client for the depot file server")]
#[command(version)]
struct Cli {
    /// File server origin
    #[arg(long, env = "SERVER_URL", default_value = "http://localhost:8080")]
    server_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file to the file server
    UploadFile {
        /// Path of the local file to upload
        path: PathBuf,
        /// File name to use on the server (defaults to the local file name)
        #[arg(short = 'n', long = "name")]
        name: Option<String>,
        /// Chunk size in bytes
        #[arg(short = 'c', long = "chunk-size", env = "CHUNK_SIZE", default_value_t = depot_core::DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,
        /// Retries per chunk after the first attempt
        #[arg(short = 'r', long, env = "RETRIES", default_value_t = 3)]
        retries: u32,
        /// Maximum parallel chunk uploads
        #[arg(long, env = "CONCURRENCY", default_value_t = 4)]
        concurrency: usize,
        /// Gzip-compress chunk bodies (the server decompresses transparently)
        #[arg(short = 'z', long = "compress")]
        compress: bool,
    },
    /// Delete a file from the file server
    DeleteFile {
        /// Name of the file to delete
        name: String,
    },
    /// List all uploaded files
    ListFiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = FileServerClient::new(&cli.server_url)?;

    match cli.command {
        Commands::UploadFile {
            path,
            name,
            chunk_size,
            retries,
            concurrency,
            compress,
        } => {
            upload_file(
                &client,
                &path,
                name,
                chunk_size,
                retries,
                concurrency,
                compress,
            )
            .await
        }
        Commands::DeleteFile { name } => {
            client.delete_file(&name).await?;
            println!("Successfully deleted '{name}'.");
            Ok(())
        }
        Commands::ListFiles => {
            let files = client.list_files().await?;
            for file in files {
                println!("{file}");
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_file(
    client: &FileServerClient,
    path: &Path,
    name: Option<String>,
    chunk_size: u64,
    retries: u32,
    concurrency: usize,
    compress: bool,
) -> Result<()> {
    if chunk_size == 0 {
        anyhow::bail!("chunk size must be greater than 0");
    }

    let target_name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot derive a file name from the given path")?,
    };
    let target_name = FileName::parse(&target_name)
        .map_err(|e| anyhow::anyhow!("invalid target file name: {e}"))?;

    // Precheck: local identity vs. the server's record.
    let local = upload::inspect_local_file(path).await?;
    let remote = client
        .get_file_stats(target_name.as_str())
        .await
        .with_context(|| format!("failed to get file stats for '{target_name}'"))?;
    let action = precheck::decide(&local, remote.as_ref(), OffsetDateTime::now_utc());

    let is_reupload = match action {
        PrecheckAction::Exits(ExitReason::AlreadyUploaded) => {
            println!("'{target_name}' already uploaded to the file server.");
            return Ok(());
        }
        PrecheckAction::Exits(ExitReason::UploadBusy) => {
            anyhow::bail!(
                "the file server is processing '{target_name}' with the same content for \
                 another client. try again later, or delete the existing entry and retry"
            );
        }
        PrecheckAction::SuggestExistingEntryDeletion => {
            if !confirm_conflict_deletion(&target_name)? {
                println!("Cancelling the upload...");
                return Ok(());
            }
            client
                .delete_file(target_name.as_str())
                .await
                .with_context(|| format!("failed to delete the conflicting '{target_name}'"))?;
            println!("Successfully deleted the conflicting file.");
            false
        }
        PrecheckAction::ProceedWithInit => false,
        PrecheckAction::ProceedWithReUpload => true,
    };

    // The file may have changed between precheck and init.
    let checksum = upload::compute_checksum(path).await?;
    if checksum != local.checksum {
        anyhow::bail!(
            "file content has changed for '{}' since precheck",
            path.display()
        );
    }

    let request = InitUploadRequest {
        checksum,
        total_size: local.size,
        total_chunks: total_chunks_for(local.size, chunk_size)
            .map_err(|e| anyhow::anyhow!("{e}"))?,
        chunk_size,
        is_reupload,
    };
    let response = client
        .init_upload(target_name.as_str(), &request)
        .await
        .with_context(|| format!("failed to initialize upload for '{target_name}'"))?;

    let plan = match response.missing_chunk_info {
        Some(info) => ChunkUploadPlan {
            upload_id: response.upload_id,
            chunk_size: info.max_size,
            missing: Some(info.chunk_numbers.into_iter().collect::<HashSet<u64>>()),
            retries,
            concurrency,
            gzip: compress,
        },
        None => ChunkUploadPlan {
            upload_id: response.upload_id,
            chunk_size,
            missing: None,
            retries,
            concurrency,
            gzip: compress,
        },
    };

    let bar = ProgressBar::new(plan.progress_total(local.size));
    bar.set_style(
        ProgressStyle::with_template(
            "{msg} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )
        .expect("valid progress template")
        .progress_chars("=> "),
    );
    bar.set_message("Uploading");
    let progress = {
        let bar = bar.clone();
        Arc::new(move |n: u64| bar.inc(n)) as upload::ProgressFn
    };

    match upload::upload_chunks(client, path, &plan, progress).await {
        Ok(()) => {
            bar.finish_and_clear();
            println!("Successfully uploaded!");
            Ok(())
        }
        Err(err) => {
            bar.abandon();
            // Best-effort cleanup of the partial upload so the next attempt
            // starts from a clean slate.
            if let Err(delete_err) = client.delete_file(target_name.as_str()).await {
                eprintln!("failed to delete the partially uploaded entry: {delete_err:#}");
            }
            Err(err.context(format!("upload failed for '{target_name}'")))
        }
    }
}

/// Ask the user whether the conflicting server-side entry should be deleted.
fn confirm_conflict_deletion(name: &FileName) -> Result<bool> {
    eprintln!(
        "A conflicting file (same name '{name}', different contents) exists on the file server."
    );
    eprint!("Delete the conflicting file and proceed with the upload? (y/n): ");
    std::io::stderr().flush().ok();

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("failed to read user input")?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}
