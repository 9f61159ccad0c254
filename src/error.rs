//! Error types for manga-dl
//!
//! This module provides the error taxonomy for the library:
//! - Transient network failures (retried by the page fetcher)
//! - Permanent remote failures (404, auth, empty payload — surfaced immediately)
//! - Provider protocol errors (unparseable source data — unit-level failure)
//! - Local I/O failures (fatal to the affected chapter, run continues)
//! - Cooperative cancellation (terminal classification, not a fault)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for manga-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for manga-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download.max_chapter_workers")
        key: Option<String>,
    },

    /// Network error from the HTTP client (timeout, connect failure, body read)
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote host answered with a non-success status code
    #[error("HTTP status {status} for {url}")]
    Status {
        /// The HTTP status code returned
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// Remote host answered 200 with an empty body — treated as a permanent failure
    #[error("empty response body for {url}")]
    EmptyBody {
        /// The URL that returned no payload
        url: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider-related error (search, metadata, chapter or page-list resolution)
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Artifact assembly error (CBZ, PDF, flat images)
    #[error("packaging error: {0}")]
    Package(#[from] PackageError),

    /// Chapter has no pages to download
    #[error("chapter {id} has no pages")]
    EmptyChapter {
        /// The chapter identity that violated the precondition
        id: String,
    },

    /// Run-level cancellation was observed
    #[error("operation cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Provider-related errors
///
/// Any capability-set operation (`search`, `get_manga_info`, `get_chapters`,
/// `get_chapter_pages`) may fail with one of these classifications. The
/// orchestrator treats them as unit-level failures and never retries them.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure while talking to the source
    #[error("network failure: {0}")]
    Network(String),

    /// The requested manga or chapter does not exist at the source
    #[error("not found: {0}")]
    NotFound(String),

    /// The source returned data the provider could not parse
    #[error("parse failure: {0}")]
    Parse(String),

    /// The source is rate limiting the provider
    #[error("rate limited by source: {0}")]
    RateLimited(String),

    /// No provider is registered for the given identity or URL
    #[error("no provider available: {0}")]
    Unsupported(String),
}

/// Artifact assembly errors (CBZ, PDF, flat images)
///
/// On any of these, the per-ordinal page files are retained so a retry can
/// resume from fetched pages without re-fetching.
#[derive(Debug, Error)]
pub enum PackageError {
    /// No readable page files were found in the chapter working directory
    #[error("no pages found in {dir}")]
    NoPages {
        /// The chapter working directory that was empty
        dir: PathBuf,
    },

    /// An expected ordinal's page file is missing or empty
    #[error("page {ordinal} missing from {dir}")]
    MissingPage {
        /// The 0-based ordinal whose file was not found
        ordinal: u32,
        /// The chapter working directory that was inspected
        dir: PathBuf,
    },

    /// Writing the archive container failed
    #[error("archive write failed for {path}: {reason}")]
    ArchiveWrite {
        /// The artifact path being written
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },

    /// Building the paginated document failed
    #[error("document write failed for {path}: {reason}")]
    DocumentWrite {
        /// The artifact path being written
        path: PathBuf,
        /// The reason the write failed
        reason: String,
    },

    /// Cleanup of intermediate files failed (non-fatal, usually logged as warning)
    #[error("cleanup failed for {dir}: {reason}")]
    CleanupFailed {
        /// The chapter working directory being cleaned
        dir: PathBuf,
        /// The reason cleanup failed
        reason: String,
    },
}

impl Error {
    /// True when the error represents cooperative cancellation rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
