// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Media fetcher for scraped media references.
//!
//! The scraper exports each media blob either as an HTTP(S) URL it serves
//! or as a file it wrote next to the snapshot (`file:` references). Both
//! are read with the size limit enforced before the payload is fully
//! buffered.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use wabridge_core::types::{AdapterType, HealthStatus, MediaPayload};
use wabridge_core::{MediaFetcher, PluginAdapter, WabridgeError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MIME: &str = "application/octet-stream";

/// Fetches media over HTTP(S) or from the local filesystem.
#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new() -> Result<Self, WabridgeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("wabridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WabridgeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn fetch_http(
        &self,
        url: reqwest::Url,
        max_bytes: u64,
    ) -> Result<MediaPayload, WabridgeError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_failed(format!("request to {url} failed: {e}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url));
        }

        if let Some(size) = response.content_length()
            && size > max_bytes
        {
            return Err(WabridgeError::MediaTooLarge {
                size,
                limit: max_bytes,
            });
        }

        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty() && v != DEFAULT_MIME);

        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_failed(format!("reading {url} failed: {e}"), e))?
        {
            let size = (data.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(WabridgeError::MediaTooLarge {
                    size,
                    limit: max_bytes,
                });
            }
            data.extend_from_slice(&chunk);
        }

        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("media")
            .to_string();
        let mime_type = header_mime.unwrap_or_else(|| guess_mime(&file_name).to_string());

        debug!(url = %url, bytes = data.len(), mime = %mime_type, "media fetched");
        Ok(MediaPayload {
            data,
            mime_type,
            file_name,
        })
    }
}

async fn fetch_file(path: &Path, max_bytes: u64) -> Result<MediaPayload, WabridgeError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| fetch_failed(format!("cannot stat {}: {e}", path.display()), e))?;
    if metadata.len() > max_bytes {
        return Err(WabridgeError::MediaTooLarge {
            size: metadata.len(),
            limit: max_bytes,
        });
    }

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| fetch_failed(format!("cannot read {}: {e}", path.display()), e))?;
    // The scraper may still be appending.
    if data.len() as u64 > max_bytes {
        return Err(WabridgeError::MediaTooLarge {
            size: data.len() as u64,
            limit: max_bytes,
        });
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "media".to_string());
    Ok(MediaPayload {
        mime_type: guess_mime(&file_name).to_string(),
        data,
        file_name,
    })
}

fn fetch_failed(message: String, source: impl std::error::Error + Send + Sync + 'static) -> WabridgeError {
    WabridgeError::MediaFetchFailed {
        message,
        source: Some(Box::new(source)),
    }
}

/// Server errors, timeouts and throttling are retried; other client errors
/// mean the reference is gone.
fn status_error(status: StatusCode, url: &reqwest::Url) -> WabridgeError {
    let retryable = status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT;
    if retryable {
        WabridgeError::MediaFetchFailed {
            message: format!("{url} returned {status}"),
            source: None,
        }
    } else {
        WabridgeError::malformed(format!("media reference {url} rejected with {status}"))
    }
}

/// Where a media reference points.
#[derive(Debug, PartialEq, Eq)]
enum MediaLocation {
    Http(reqwest::Url),
    File(PathBuf),
}

fn locate(media_ref: &str) -> Result<MediaLocation, WabridgeError> {
    let media_ref = media_ref.trim();
    if let Some(rest) = media_ref.strip_prefix("file://") {
        return Ok(MediaLocation::File(PathBuf::from(rest)));
    }
    if let Some(rest) = media_ref.strip_prefix("file:") {
        return Ok(MediaLocation::File(PathBuf::from(rest)));
    }

    match reqwest::Url::parse(media_ref) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(MediaLocation::Http(url)),
        Ok(url) => Err(WabridgeError::malformed(format!(
            "unsupported media reference scheme '{}'",
            url.scheme()
        ))),
        Err(e) => Err(WabridgeError::malformed(format!(
            "invalid media reference '{media_ref}': {e}"
        ))),
    }
}

/// Guesses a MIME type from a file extension.
pub fn guess_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "3gp" => "video/3gpp",
        "mov" => "video/quicktime",
        "ogg" | "opus" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        _ => DEFAULT_MIME,
    }
}

#[async_trait]
impl PluginAdapter for HttpMediaFetcher {
    fn name(&self) -> &str {
        "http-media"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::MediaFetcher
    }

    async fn health_check(&self) -> Result<HealthStatus, WabridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WabridgeError> {
        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, media_ref: &str, max_bytes: u64) -> Result<MediaPayload, WabridgeError> {
        match locate(media_ref)? {
            MediaLocation::Http(url) => self.fetch_http(url, max_bytes).await,
            MediaLocation::File(path) => fetch_file(&path, max_bytes).await,
        }
    }
}
