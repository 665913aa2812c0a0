//! Model retrieval over HTTP(S) and from the local filesystem
//!
//! Downloads are streamed chunk by chunk so byte-level progress can be
//! forwarded to whoever is driving model initialization.

use crate::error::{BgRemovalError, Result};
use crate::models::{ModelFetcher, ModelSource};
use async_trait::async_trait;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

/// Download progress information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Short name of the model being fetched
    pub source: String,
    /// Bytes received so far
    pub loaded: u64,
    /// Total size in bytes, 0 when the server did not say
    pub total: u64,
}

impl DownloadProgress {
    /// Whether the total size is known
    #[must_use]
    pub fn has_total(&self) -> bool {
        self.total > 0
    }
}

/// Channel end used to publish [`DownloadProgress`]
pub type DownloadProgressSender = mpsc::UnboundedSender<DownloadProgress>;

/// Fetches model weights from URLs or local files
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
}

impl ModelDownloader {
    /// Create a downloader with a 5 minute request timeout
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client })
    }

    /// Use a preconfigured HTTP client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, progress: Option<&DownloadProgressSender>) -> Result<Vec<u8>> {
        validate_model_url(url)?;
        log::debug!("Downloading model: {}", url);

        let response =
            self.client.get(url).send().await.map_err(|e| {
                BgRemovalError::network_error(format!("Failed to download {}", url), e)
            })?;

        if !response.status().is_success() {
            return Err(BgRemovalError::network_error(
                format!("HTTP error for {}", url),
                response.status(),
            ));
        }

        let total = response.content_length().unwrap_or(0);
        let name = ModelSource::Url(url.to_string()).display_name();
        let mut bytes = Vec::with_capacity(usize::try_from(total).unwrap_or(0));

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut buffer = vec![0; 8192];
        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;

            if bytes_read == 0 {
                break;
            }

            bytes.extend_from_slice(buffer.get(..bytes_read).unwrap_or(&[]));
            send_progress(progress, &name, bytes.len() as u64, total);
        }

        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }

    async fn read_file(path: &Path, progress: Option<&DownloadProgressSender>) -> Result<Vec<u8>> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("read model file", path, &e))?;

        let name = ModelSource::File(path.to_path_buf()).display_name();
        let len = bytes.len() as u64;
        send_progress(progress, &name, len, len);
        Ok(bytes)
    }
}

#[async_trait]
impl ModelFetcher for ModelDownloader {
    async fn fetch(
        &self,
        source: &ModelSource,
        progress: Option<&DownloadProgressSender>,
    ) -> Result<Vec<u8>> {
        match source {
            ModelSource::Url(url) => self.download(url, progress).await,
            ModelSource::File(path) => Self::read_file(path, progress).await,
        }
    }
}

fn send_progress(progress: Option<&DownloadProgressSender>, source: &str, loaded: u64, total: u64) {
    if let Some(tx) = progress {
        // Receiver gone means nobody is watching anymore
        let _ = tx.send(DownloadProgress {
            source: source.to_string(),
            loaded,
            total,
        });
    }
}

/// Validate that a model URL can be fetched by this downloader
///
/// # Errors
/// `InvalidConfig` for empty URLs or schemes other than http(s)
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(BgRemovalError::invalid_config("Model URL cannot be empty"));
    }

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            BgRemovalError::invalid_config(format!(
                "Unsupported URL scheme: {}. Expected http:// or https://",
                url
            ))
        })?;

    if rest.is_empty() || rest.starts_with('/') {
        return Err(BgRemovalError::invalid_config(format!(
            "Model URL has no host: {}",
            url
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_model_url() {
        assert!(validate_model_url("https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx").is_ok());
        assert!(validate_model_url("http://localhost:8080/model.onnx").is_ok());
        assert!(validate_model_url("").is_err());
        assert!(validate_model_url("ftp://example.com/model.onnx").is_err());
        assert!(validate_model_url("https://").is_err());
        assert!(validate_model_url("https:///model.onnx").is_err());
    }

    #[test]
    fn test_has_total() {
        let p = DownloadProgress {
            source: "u2net.onnx".into(),
            loaded: 10,
            total: 0,
        };
        assert!(!p.has_total());
        assert!(DownloadProgress { total: 20, ..p }.has_total());
    }

    #[tokio::test]
    async fn test_fetch_local_file_reports_completion() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.onnx");
        std::fs::write(&path, vec![1u8; 4096]).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let downloader = ModelDownloader::new().unwrap();
        let bytes = downloader
            .fetch(&ModelSource::File(path), Some(&tx))
            .await
            .unwrap();

        assert_eq!(bytes.len(), 4096);
        let progress = rx.try_recv().unwrap();
        assert_eq!(progress.source, "model.onnx");
        assert_eq!((progress.loaded, progress.total), (4096, 4096));
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let downloader = ModelDownloader::new().unwrap();
        let result = downloader
            .fetch(&ModelSource::File("/nonexistent/model.onnx".into()), None)
            .await;
        assert!(matches!(result, Err(BgRemovalError::Io(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_request() {
        let downloader = ModelDownloader::new().unwrap();
        let result = downloader
            .fetch(&ModelSource::Url("https://".into()), None)
            .await;
        assert!(matches!(result, Err(BgRemovalError::InvalidConfig(_))));
    }
}
