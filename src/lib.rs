//! # manga-dl
//!
//! Backend library for manga download applications.
//!
//! ## Design Philosophy
//!
//! manga-dl is designed to be:
//! - **Source-agnostic** - All site-specific scraping lives behind the [`Provider`] trait
//! - **Order-preserving** - Packaged page order is always ordinal order, never arrival order
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events, no polling required
//! - **Resumable** - Completed chapters and pages are detected on disk and skipped
//!
//! ## Quick Start
//!
//! ```no_run
//! use manga_dl::{Config, MangaDownloader, MangaSelector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let downloader = MangaDownloader::new(config)?;
//!     // downloader.register_provider(...).await for each source
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             tracing::info!(?event, "download event");
//!         }
//!     });
//!
//!     let selector = MangaSelector::Url("https://example.com/manga/1".to_string());
//!     let report = downloader.download_manga(None, &selector, Some("1-10")).await?;
//!     tracing::info!(completed = report.completed(), "run done");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Single-page fetching with atomic writes
pub mod fetcher;
/// Artifact assembly (CBZ, PDF, flat images)
pub mod packager;
/// Provider capability set and registry
pub mod provider;
/// Per-host rate limiting with token bucket and in-flight cap
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{
    Config, DownloadConfig, FilterConfig, NetworkConfig, OutputConfig, RateLimitConfig, RetryConfig,
};
pub use downloader::MangaDownloader;
pub use error::{Error, PackageError, ProviderError, Result};
pub use provider::{MangaSelector, Provider, ProviderRegistry};
pub use rate_limiter::{HostPermit, RateLimiter};
pub use types::{
    Chapter, ChapterId, ChapterOutcome, ChapterReport, Event, MangaInfo, OutputFormat, PageRef,
    RunReport, SearchResult,
};

/// Helper function to run a download to completion with graceful signal handling.
///
/// Waits for a termination signal and then triggers the downloader's run-level
/// cancellation token, leaving in-flight chapters in a resumable state.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn cancel_on_signal(downloader: MangaDownloader) {
    wait_for_signal().await;
    downloader.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
