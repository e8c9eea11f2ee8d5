//! HTTP client for the depot file server.

use anyhow::{Context, Result};
use depot_core::api::{
    FileStatsResponse, InitUploadRequest, InitUploadResponse, ListFilesResponse,
};
use reqwest::Url;
use std::time::Duration;

/// Timeout for init, delete, list and stats calls.
const CONTROL_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single chunk transfer.
const CHUNK_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the file server's v1 API.
#[derive(Clone)]
pub struct FileServerClient {
    http: reqwest::Client,
    base_url: Url,
}

impl FileServerClient {
    /// Create a client for the given server origin.
    pub fn new(server_url: &str) -> Result<Self> {
        let base_url = Url::parse(server_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("api/v1/{path}"))
            .context("failed to build API URL")
    }

    /// Initialize (or resume) an upload.
    pub async fn init_upload(
        &self,
        file_name: &str,
        request: &InitUploadRequest,
    ) -> Result<InitUploadResponse> {
        let url = self.url(&format!("files/upload/init/{file_name}"))?;
        let response = self
            .http
            .post(url)
            .timeout(CONTROL_TIMEOUT)
            .json(request)
            .send()
            .await
            .context("failed to send init request")?;
        Self::decode(response).await
    }

    /// Upload one chunk's bytes, optionally gzip-compressed.
    pub async fn upload_chunk(
        &self,
        upload_id: u64,
        chunk_number: u64,
        data: Vec<u8>,
        gzip: bool,
    ) -> Result<()> {
        let url = self.url(&format!("files/upload/{upload_id}/{chunk_number}"))?;
        let mut request = self.http.post(url).timeout(CHUNK_TIMEOUT);
        let body = if gzip {
            request = request.header("Content-Encoding", "gzip");
            gzip_compress(&data).await?
        } else {
            data
        };

        let response = request
            .body(body)
            .send()
            .await
            .with_context(|| format!("failed to send chunk {chunk_number}"))?;
        Self::check(response).await
    }

    /// Delete a file on the server.
    pub async fn delete_file(&self, file_name: &str) -> Result<()> {
        let url = self.url(&format!("files/{file_name}"))?;
        let response = self
            .http
            .delete(url)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .context("failed to send delete request")?;
        Self::check(response).await
    }

    /// Names of all fully uploaded files.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let url = self.url("files")?;
        let response = self
            .http
            .get(url)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .context("failed to send list request")?;
        let listing: ListFilesResponse = Self::decode(response).await?;
        Ok(listing.files)
    }

    /// The server's record for `file_name`, or None when absent (the server
    /// answers 200 with a JSON `null` body in that case).
    pub async fn get_file_stats(&self, file_name: &str) -> Result<Option<FileStatsResponse>> {
        let url = self.url(&format!("files/{file_name}"))?;
        let response = self
            .http
            .get(url)
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await
            .context("failed to send stats request")?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("server returned status {status}: {body}");
        }
        serde_json::from_str(&body).with_context(|| format!("failed to parse response: {body}"))
    }

    async fn check(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("server returned status {status}: {body}");
        }
        Ok(())
    }
}

async fn gzip_compress(data: &[u8]) -> Result<Vec<u8>> {
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    let mut encoder = GzipEncoder::new(Vec::new());
    encoder
        .write_all(data)
        .await
        .context("failed to compress chunk")?;
    encoder.shutdown().await.context("failed to finish gzip")?;
    Ok(encoder.into_inner())
}
