//! Upload execution: local file inspection and the chunk worker pool.

use crate::api_client::FileServerClient;
use crate::precheck::LocalFile;
use anyhow::{Context, Result};
use depot_core::Checksum;
use futures::stream;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

/// Callback invoked with the byte count of every successfully sent chunk.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// One chunk queued for transfer.
#[derive(Debug)]
struct ChunkJob {
    number: u64,
    data: Vec<u8>,
}

/// Stat and hash a local file, rejecting directories and empty files.
pub async fn inspect_local_file(path: &Path) -> Result<LocalFile> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat '{}'", path.display()))?;
    if meta.is_dir() {
        anyhow::bail!("cannot upload a directory, please provide a file");
    }
    if meta.len() == 0 {
        anyhow::bail!("file is empty");
    }

    Ok(LocalFile {
        size: meta.len(),
        checksum: compute_checksum(path).await?,
    })
}

/// Compute the streaming SHA-256 checksum of a file.
pub async fn compute_checksum(path: &Path) -> Result<Checksum> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Checksum::hasher();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = reader.read(&mut buf).await.context("error reading file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finalize())
}

/// Everything the worker pool needs to run one upload.
pub struct ChunkUploadPlan {
    pub upload_id: u64,
    /// Chunk size driving the file split. For a resume this is the file's
    /// declared chunk size as reported by the server, not the local flag.
    pub chunk_size: u64,
    /// Chunk numbers to send; None sends every chunk (fresh upload).
    pub missing: Option<HashSet<u64>>,
    pub retries: u32,
    pub concurrency: usize,
    pub gzip: bool,
}

impl ChunkUploadPlan {
    /// The byte total to present as the progress target.
    pub fn progress_total(&self, file_size: u64) -> u64 {
        match &self.missing {
            Some(missing) => self.chunk_size * missing.len() as u64,
            None => file_size,
        }
    }
}

/// Stream the local file through a bounded pool of chunk-upload workers.
///
/// The producer reads the file sequentially, assigning chunk numbers from 0
/// and skipping chunks outside the missing set while still advancing the
/// number to preserve file-position alignment. Up to `concurrency` chunks
/// are in flight at once; the first chunk to exhaust its retries fails the
/// whole stream, in-flight transfers are drained, and no further chunks are
/// read from the file.
pub async fn upload_chunks(
    client: &FileServerClient,
    path: &Path,
    plan: &ChunkUploadPlan,
    progress: ProgressFn,
) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let reader = BufReader::with_capacity(plan.chunk_size as usize, file);

    let chunk_size = plan.chunk_size as usize;
    let missing = plan.missing.clone().map(Arc::new);

    let jobs = stream::try_unfold((reader, 0u64), move |(mut reader, mut number)| {
        let missing = missing.clone();
        async move {
            loop {
                let mut buf = vec![0u8; chunk_size];
                let n = read_chunk(&mut reader, &mut buf)
                    .await
                    .context("error reading file")?;
                if n == 0 {
                    return Ok::<_, anyhow::Error>(None);
                }
                buf.truncate(n);

                let current = number;
                number += 1;

                // For a resume, only chunks in the missing set travel; the
                // number still advances so chunk N always maps to the same
                // file offset.
                let send = missing.as_ref().is_none_or(|set| set.contains(&current));
                if send {
                    let job = ChunkJob {
                        number: current,
                        data: buf,
                    };
                    return Ok(Some((job, (reader, number))));
                }
            }
        }
    });

    let upload_id = plan.upload_id;
    let retries = plan.retries;
    let gzip = plan.gzip;

    jobs.try_for_each_concurrent(plan.concurrency, move |job| {
        let client = client.clone();
        let progress = progress.clone();
        async move {
            let size = job.data.len() as u64;
            upload_with_retry(&client, upload_id, job, retries, gzip).await?;
            progress(size);
            Ok(())
        }
    })
    .await
}

/// Upload one chunk with linear backoff: attempt k sleeps k seconds before
/// retrying, up to `retries` retries after the first attempt.
async fn upload_with_retry(
    client: &FileServerClient,
    upload_id: u64,
    job: ChunkJob,
    retries: u32,
    gzip: bool,
) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        match client
            .upload_chunk(upload_id, job.number, job.data.clone(), gzip)
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= retries => {
                return Err(err).with_context(|| {
                    format!(
                        "failed to upload chunk {} after {} retries",
                        job.number, retries
                    )
                });
            }
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(u64::from(attempt))).await;
            }
        }
    }
}

/// Fill `buf` from the reader, tolerating short reads; returns the number of
/// bytes read, which is less than `buf.len()` only at end of file.
async fn read_chunk(
    reader: &mut (impl AsyncRead + Unpin),
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
