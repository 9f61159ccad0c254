//! Core types for manga-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Image file extensions recognized when deriving local page filenames
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Unique identifier for a chapter, assigned by the source provider
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(pub String);

impl ChapterId {
    /// Create a new ChapterId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChapterId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChapterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote page image bound to its intended position within a chapter.
///
/// The ordinal is required because concurrent fetch completion order is not
/// guaranteed to match reading order: the local file for ordinal *i* always
/// represents page *i*, enforced by filename, never by arrival time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRef {
    /// Direct URL to the page image
    pub url: String,
    /// 0-based intended position within the chapter (dense, unique)
    pub ordinal: u32,
}

impl PageRef {
    /// Create a new PageRef
    pub fn new(url: impl Into<String>, ordinal: u32) -> Self {
        Self {
            url: url.into(),
            ordinal,
        }
    }

    /// Deterministic local filename derived from the ordinal.
    ///
    /// Pages are named `001.jpg`, `002.png`, ... so that lexical filename order
    /// equals reading order. The extension comes from the URL when it carries a
    /// recognized image extension, `jpg` otherwise.
    pub fn filename(&self) -> String {
        format!("{:03}.{}", self.ordinal + 1, self.extension())
    }

    /// Image extension for the local file, derived from the URL path
    fn extension(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        match path.rsplit('.').next() {
            Some(ext) => {
                let lower = ext.to_ascii_lowercase();
                IMAGE_EXTENSIONS
                    .iter()
                    .find(|&&e| e == lower)
                    .copied()
                    .unwrap_or("jpg")
            }
            None => "jpg",
        }
    }
}

/// Chapter information for a manga
///
/// Represents a single chapter including its metadata and, once resolved via
/// [`crate::provider::Provider::get_chapter_pages`], its ordered page list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Provider-specific chapter ID
    pub chapter_id: ChapterId,
    /// Provider-specific manga ID this chapter belongs to
    pub manga_id: String,
    /// Display title (may be empty)
    pub title: String,
    /// Chapter number as published — can be "1", "1.5", "Extra", etc.
    pub chapter_number: String,
    /// Volume number, if the source groups chapters into volumes
    pub volume: Option<String>,
    /// Direct URL to the chapter page
    pub url: String,
    /// Release date as reported by the source
    pub release_date: Option<String>,
    /// Language tag (e.g. "en")
    pub language: String,
    /// Scanlation group, if reported by the source
    pub scanlator: Option<String>,
    /// Ordered page list (empty until resolved)
    #[serde(default)]
    pub pages: Vec<PageRef>,
}

/// Numeric sort key for a chapter number string.
///
/// Special chapters ("Extra", "Special", "Bonus") sort after everything
/// else; unparseable numbers sort first.
pub fn chapter_sort_key(number: &str) -> f64 {
    match number.parse::<f64>() {
        Ok(n) => n,
        Err(_)
            if matches!(
                number.to_lowercase().as_str(),
                "extra" | "special" | "bonus"
            ) =>
        {
            999_999.0
        }
        Err(_) => 0.0,
    }
}

impl Chapter {
    /// Numeric sort key for canonical chapter ordering
    pub fn sort_key(&self) -> f64 {
        chapter_sort_key(&self.chapter_number)
    }

    /// Check if this is a special/extra chapter
    pub fn is_special(&self) -> bool {
        matches!(
            self.chapter_number.to_lowercase().as_str(),
            "extra" | "special" | "bonus"
        )
    }
}

impl std::fmt::Display for Chapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Chapter {}", self.chapter_number)?;
        if let Some(vol) = &self.volume {
            write!(f, " Vol.{vol}")?;
        }
        if !self.title.is_empty() {
            write!(f, ": {}", self.title)?;
        }
        Ok(())
    }
}

/// Result from a provider search — minimal info for displaying search results
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identity of the provider that produced this result
    pub provider_id: String,
    /// Provider-specific manga ID
    pub manga_id: String,
    /// Manga title
    pub title: String,
    /// Cover thumbnail URL
    pub cover_url: String,
    /// Direct URL to the manga page
    pub url: String,
}

/// Detailed manga information retrieved from a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MangaInfo {
    /// Identity of the provider this record came from
    pub provider_id: String,
    /// Provider-specific manga ID
    pub manga_id: String,
    /// Main title
    pub title: String,
    /// Alternative titles
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    /// Cover image URL
    pub cover_url: String,
    /// Direct URL to the manga page
    pub url: String,
    /// Description/synopsis
    pub description: String,
    /// Authors
    #[serde(default)]
    pub authors: Vec<String>,
    /// Artists
    #[serde(default)]
    pub artists: Vec<String>,
    /// Genres
    #[serde(default)]
    pub genres: Vec<String>,
    /// Publication status ("Ongoing", "Completed", "Hiatus")
    pub status: String,
    /// Publication year, if known
    pub year: Option<i32>,
}

/// Output artifact format for a packaged chapter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// CBZ archive (ZIP container with ordinal-named entries)
    #[default]
    Cbz,
    /// Paginated PDF document, each page sized to its source image
    Pdf,
    /// Flat ordinal-named image files in a per-chapter directory
    Images,
}

impl OutputFormat {
    /// Artifact file extension for this format (`None` for flat images)
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Cbz => Some("cbz"),
            OutputFormat::Pdf => Some("pdf"),
            OutputFormat::Images => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Cbz => write!(f, "cbz"),
            OutputFormat::Pdf => write!(f, "pdf"),
            OutputFormat::Images => write!(f, "images"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cbz" => Ok(OutputFormat::Cbz),
            "pdf" => Ok(OutputFormat::Pdf),
            "images" | "img" => Ok(OutputFormat::Images),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

/// Terminal state of one chapter's download job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChapterOutcome {
    /// Every page succeeded and the artifact was assembled
    Completed,
    /// A complete local output already existed — no network access was made
    Skipped,
    /// Some pages failed after exhausting retries; the chapter was not packaged
    PartiallyFailed {
        /// 0-based ordinals whose pages are missing
        missing: Vec<u32>,
    },
    /// All pages failed, or a chapter-level precondition was violated
    Failed {
        /// Error description
        error: String,
    },
    /// Run-level cancellation before or during this chapter
    Cancelled,
}

impl ChapterOutcome {
    /// True for Completed and Skipped
    pub fn is_success(&self) -> bool {
        matches!(self, ChapterOutcome::Completed | ChapterOutcome::Skipped)
    }
}

/// Per-chapter result within a [`RunReport`], keyed by chapter identity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChapterReport {
    /// Chapter identity
    pub chapter_id: ChapterId,
    /// Chapter number (for canonical re-sorting and display)
    pub chapter_number: String,
    /// Chapter title
    pub title: String,
    /// Terminal outcome
    pub outcome: ChapterOutcome,
    /// Path to the packaged artifact, when one was produced
    pub artifact: Option<PathBuf>,
}

/// Structured summary of a whole run.
///
/// Reports are keyed by chapter identity and sorted to canonical chapter order,
/// not completion order, so presentation is deterministic. The identity lists
/// for each non-success category are sufficient for a caller to retry exactly
/// the failed subset (re-runs are resumable).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Per-chapter reports in canonical chapter order
    pub chapters: Vec<ChapterReport>,
}

impl RunReport {
    /// True only if every chapter reached Completed or Skipped
    pub fn is_success(&self) -> bool {
        self.chapters.iter().all(|c| c.outcome.is_success())
    }

    /// Number of chapters with the given predicate
    fn count(&self, pred: impl Fn(&ChapterOutcome) -> bool) -> usize {
        self.chapters.iter().filter(|c| pred(&c.outcome)).count()
    }

    /// Number of completed chapters
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Completed))
    }

    /// Number of skipped (already present) chapters
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Skipped))
    }

    /// Number of partially failed chapters
    pub fn partial(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::PartiallyFailed { .. }))
    }

    /// Number of failed chapters
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Failed { .. }))
    }

    /// Number of cancelled chapters
    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, ChapterOutcome::Cancelled))
    }

    /// Identities of every chapter that did not reach Completed or Skipped
    pub fn retryable(&self) -> Vec<ChapterId> {
        self.chapters
            .iter()
            .filter(|c| !c.outcome.is_success())
            .map(|c| c.chapter_id.clone())
            .collect()
    }
}

/// Event emitted during the download lifecycle.
///
/// Delivered to subscribers over a bounded broadcast channel: a slow consumer
/// lags and loses old events rather than ever blocking the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A chapter download started
    ChapterStarted {
        /// Chapter identity
        id: ChapterId,
        /// Chapter number
        number: String,
        /// Total pages in the chapter
        pages: u32,
    },

    /// Page fetch progress within a chapter
    PageProgress {
        /// Chapter identity
        id: ChapterId,
        /// Pages finished so far (success or terminal failure)
        completed: u32,
        /// Total pages in the chapter
        total: u32,
    },

    /// Chapter fully downloaded and packaged
    ChapterCompleted {
        /// Chapter identity
        id: ChapterId,
        /// Path to the packaged artifact
        artifact: PathBuf,
    },

    /// Chapter skipped — complete local output already present
    ChapterSkipped {
        /// Chapter identity
        id: ChapterId,
    },

    /// Some pages failed permanently; the chapter was withheld from packaging
    ChapterPartiallyFailed {
        /// Chapter identity
        id: ChapterId,
        /// 0-based ordinals that are missing
        missing: Vec<u32>,
    },

    /// Chapter failed entirely
    ChapterFailed {
        /// Chapter identity
        id: ChapterId,
        /// Error message
        error: String,
    },

    /// Chapter interrupted by run-level cancellation
    ChapterCancelled {
        /// Chapter identity
        id: ChapterId,
    },

    /// The whole run finished and the aggregate report is available
    RunFinished {
        /// Completed chapter count
        completed: usize,
        /// Skipped chapter count
        skipped: usize,
        /// Partially failed chapter count
        partial: usize,
        /// Failed chapter count
        failed: usize,
        /// Cancelled chapter count
        cancelled: usize,
    },
}
