//! Single-page fetching with atomic writes
//!
//! The fetcher downloads one page image to its ordinal-named file inside a
//! chapter working directory. Writes go through a temporary `.part` file
//! that is renamed into place only after the full payload is on disk, so a
//! crash or cancellation never leaves a truncated page behind under its
//! final name.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::fetch_with_retry;
use crate::types::PageRef;
use crate::utils::url_host;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Downloads individual pages, pacing requests through the rate limiter
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    rate_limiter: RateLimiter,
    retry: RetryConfig,
}

impl PageFetcher {
    /// Create a fetcher sharing the given HTTP client and rate limiter
    #[must_use]
    pub fn new(client: reqwest::Client, rate_limiter: RateLimiter, retry: RetryConfig) -> Self {
        Self {
            client,
            rate_limiter,
            retry,
        }
    }

    /// Fetch one page into `chapter_dir`, returning the final file path
    ///
    /// Idempotent: if the page file already exists with a non-empty payload
    /// it is kept and no request is made. Transient failures are retried
    /// per the retry configuration; a pacing permit is re-acquired for every
    /// attempt so retries count against the host budget like any request.
    pub async fn fetch_page(
        &self,
        page: &PageRef,
        chapter_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let target = chapter_dir.join(page.filename());

        if page_file_is_complete(&target) {
            debug!(path = %target.display(), "page already on disk, skipping");
            return Ok(target);
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let host = url_host(&page.url).unwrap_or_else(|| "unknown".to_string());

        let bytes = fetch_with_retry(&self.retry, || self.attempt(page, &host, cancel)).await?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        write_atomically(&target, &bytes).await?;
        debug!(
            path = %target.display(),
            bytes = bytes.len(),
            "page written"
        );

        Ok(target)
    }

    /// One download attempt: permit, request, status check, body read
    async fn attempt(
        &self,
        page: &PageRef,
        host: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        // Permit per attempt: a retry is a fresh request against the host
        let _permit = tokio::select! {
            permit = self.rate_limiter.acquire(host) => permit,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let response = tokio::select! {
            result = self.client.get(&page.url).send() => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: page.url.clone(),
            });
        }

        let bytes = tokio::select! {
            result = response.bytes() => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        if bytes.is_empty() {
            return Err(Error::EmptyBody {
                url: page.url.clone(),
            });
        }

        Ok(bytes.to_vec())
    }
}

/// Write `bytes` to `target` via a sibling `.part` file and rename
async fn write_atomically(target: &Path, bytes: &[u8]) -> Result<()> {
    let temp = temp_path(target);

    if let Err(e) = tokio::fs::write(&temp, bytes).await {
        // Best-effort removal so a half-written temp never lingers
        if tokio::fs::remove_file(&temp).await.is_err() {
            warn!(path = %temp.display(), "could not remove partial temp file");
        }
        return Err(e.into());
    }

    tokio::fs::rename(&temp, target).await?;
    Ok(())
}

/// Sibling temp path: `003.jpg` becomes `003.jpg.part`
///
/// Appends rather than swapping the extension so two pages with different
/// extensions can never collide on the same temp name.
fn temp_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// True when the page file exists with a non-empty payload
pub fn page_file_is_complete(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// True when every page of a chapter is already on disk
///
/// A chapter is considered complete when either the packaged artifact exists
/// non-empty, or every ordinal page file exists non-empty in the working
/// directory.
pub fn chapter_is_complete(chapter_dir: &Path, artifact: Option<&Path>, pages: &[PageRef]) -> bool {
    if let Some(artifact) = artifact {
        if std::fs::metadata(artifact).map(|m| m.len() > 0).unwrap_or(false) {
            return true;
        }
    }

    !pages.is_empty()
        && pages
            .iter()
            .all(|page| page_file_is_complete(&chapter_dir.join(page.filename())))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> PageFetcher {
        let retry = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        PageFetcher::new(reqwest::Client::new(), RateLimiter::new(0.0, 8), retry)
    }

    fn page(server_uri: &str, ordinal: u32) -> PageRef {
        PageRef {
            url: format!("{server_uri}/pages/{ordinal}.jpg"),
            ordinal,
        }
    }

    #[tokio::test]
    async fn fetch_writes_ordinal_named_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/0.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpegdata".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await
            .unwrap();

        assert_eq!(result, dir.path().join("001.jpg"));
        assert_eq!(std::fs::read(&result).unwrap(), b"jpegdata");
        assert!(
            !dir.path().join("001.jpg.part").exists(),
            "temp file must be renamed away"
        );
    }

    #[tokio::test]
    async fn existing_page_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001.jpg"), b"already here").unwrap();
        let cancel = CancellationToken::new();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&result).unwrap(), b"already here");
    }

    #[tokio::test]
    async fn empty_existing_file_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/0.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"refetched".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001.jpg"), b"").unwrap();
        let cancel = CancellationToken::new();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&result).unwrap(), b"refetched");
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/0.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Status { status: 404, .. })));
        assert!(!dir.path().join("001.jpg").exists());
    }

    #[tokio::test]
    async fn server_error_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/0.jpg"))
            .respond_with(ResponseTemplate::new(503))
            // max_attempts=2 means initial + 2 retries = 3 requests
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn empty_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pages/0.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::new()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::EmptyBody { .. })));
        assert!(!dir.path().join("001.jpg").exists());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fetcher()
            .fetch_page(&page(&server.uri(), 0), dir.path(), &cancel)
            .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!dir.path().join("001.jpg").exists());
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/tmp/ch/003.jpg")),
            PathBuf::from("/tmp/ch/003.jpg.part")
        );
    }

    #[test]
    fn chapter_complete_via_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("Chapter 1.cbz");
        std::fs::write(&artifact, b"zipdata").unwrap();

        let pages = vec![PageRef {
            url: "https://img.example.com/1.jpg".to_string(),
            ordinal: 0,
        }];
        assert!(chapter_is_complete(dir.path(), Some(&artifact), &pages));
    }

    #[test]
    fn chapter_complete_via_all_pages() {
        let dir = tempfile::tempdir().unwrap();
        let pages: Vec<PageRef> = (0..3)
            .map(|i| PageRef {
                url: format!("https://img.example.com/{i}.jpg"),
                ordinal: i,
            })
            .collect();

        for page in &pages {
            std::fs::write(dir.path().join(page.filename()), b"data").unwrap();
        }
        assert!(chapter_is_complete(dir.path(), None, &pages));

        // Remove one page: no longer complete
        std::fs::remove_file(dir.path().join(pages[1].filename())).unwrap();
        assert!(!chapter_is_complete(dir.path(), None, &pages));
    }

    #[test]
    fn empty_page_list_is_never_complete() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!chapter_is_complete(dir.path(), None, &[]));
    }
}
