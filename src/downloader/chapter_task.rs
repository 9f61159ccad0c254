//! Single-chapter execution
//!
//! A chapter task resolves the page list, fans out page fetches under the
//! page-worker budget, and classifies the result into exactly one terminal
//! outcome: Completed, Skipped, PartiallyFailed, Failed or Cancelled. A
//! chapter with any permanently missing page is never packaged — readers
//! treat page *n* of an artifact as page *n* of the chapter, so a silently
//! shortened artifact would be worse than no artifact.

use crate::config::Config;
use crate::error::Error;
use crate::fetcher::{PageFetcher, chapter_is_complete};
use crate::packager::{artifact_path, package_chapter};
use crate::provider::Provider;
use crate::types::{Chapter, ChapterOutcome, ChapterReport, Event, PageRef};
use crate::utils::chapter_dir_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one chapter download needs, bundled for spawning
#[derive(Clone)]
pub(crate) struct ChapterTask {
    pub(crate) fetcher: PageFetcher,
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) config: Arc<Config>,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
}

impl ChapterTask {
    /// Run one chapter to its terminal outcome
    ///
    /// Never returns an error: every failure mode is folded into the
    /// report's outcome so one bad chapter cannot abort the run.
    pub(crate) async fn run(&self, chapter: Chapter, manga_dir: &Path) -> ChapterReport {
        let report = |outcome: ChapterOutcome, artifact: Option<PathBuf>| ChapterReport {
            chapter_id: chapter.chapter_id.clone(),
            chapter_number: chapter.chapter_number.clone(),
            title: chapter.title.clone(),
            outcome,
            artifact,
        };

        if self.cancel.is_cancelled() {
            self.emit(Event::ChapterCancelled {
                id: chapter.chapter_id.clone(),
            });
            return report(ChapterOutcome::Cancelled, None);
        }

        // Resolve the page list unless the provider already attached one
        let pages = if chapter.pages.is_empty() {
            match self.provider.get_chapter_pages(&chapter).await {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(chapter = %chapter.chapter_id, error = %e, "page list resolution failed");
                    self.emit(Event::ChapterFailed {
                        id: chapter.chapter_id.clone(),
                        error: e.to_string(),
                    });
                    return report(
                        ChapterOutcome::Failed {
                            error: e.to_string(),
                        },
                        None,
                    );
                }
            }
        } else {
            chapter.pages.clone()
        };

        if pages.is_empty() {
            let error = Error::EmptyChapter {
                id: chapter.chapter_id.to_string(),
            }
            .to_string();
            self.emit(Event::ChapterFailed {
                id: chapter.chapter_id.clone(),
                error: error.clone(),
            });
            return report(ChapterOutcome::Failed { error }, None);
        }

        let chapter_dir = manga_dir.join(chapter_dir_name(&chapter));
        let format = self.config.output.format;
        let artifact = artifact_path(&chapter_dir, format);

        // The directory artifact of the flat-images format would trivially
        // "exist"; only container artifacts count for the artifact shortcut
        let artifact_file = format.extension().map(|_| artifact.as_path());
        if chapter_is_complete(&chapter_dir, artifact_file, &pages) {
            debug!(chapter = %chapter.chapter_id, "complete output already on disk");
            self.emit(Event::ChapterSkipped {
                id: chapter.chapter_id.clone(),
            });
            let existing = artifact.exists().then_some(artifact);
            return report(ChapterOutcome::Skipped, existing);
        }

        if let Err(e) = tokio::fs::create_dir_all(&chapter_dir).await {
            self.emit(Event::ChapterFailed {
                id: chapter.chapter_id.clone(),
                error: e.to_string(),
            });
            return report(
                ChapterOutcome::Failed {
                    error: e.to_string(),
                },
                None,
            );
        }

        self.emit(Event::ChapterStarted {
            id: chapter.chapter_id.clone(),
            number: chapter.chapter_number.clone(),
            pages: pages.len() as u32,
        });

        let (missing, first_error) = self.fetch_pages(&chapter, &pages, &chapter_dir).await;

        if self.cancel.is_cancelled() {
            info!(chapter = %chapter.chapter_id, "chapter interrupted by cancellation");
            self.emit(Event::ChapterCancelled {
                id: chapter.chapter_id.clone(),
            });
            return report(ChapterOutcome::Cancelled, None);
        }

        if missing.len() == pages.len() {
            let error = first_error.unwrap_or_else(|| "all pages failed".to_string());
            self.emit(Event::ChapterFailed {
                id: chapter.chapter_id.clone(),
                error: error.clone(),
            });
            return report(ChapterOutcome::Failed { error }, None);
        }

        if !missing.is_empty() {
            warn!(
                chapter = %chapter.chapter_id,
                missing = ?missing,
                "chapter withheld from packaging due to missing pages"
            );
            self.emit(Event::ChapterPartiallyFailed {
                id: chapter.chapter_id.clone(),
                missing: missing.clone(),
            });
            return report(ChapterOutcome::PartiallyFailed { missing }, None);
        }

        // Packaging is blocking fs + codec work, keep it off the runtime
        let delete_after = self.config.output.delete_pages_after;
        let dir = chapter_dir.clone();
        let pages_for_packaging = pages.clone();
        let packaged = tokio::task::spawn_blocking(move || {
            package_chapter(&dir, &pages_for_packaging, format, delete_after)
        })
        .await;

        match packaged {
            Ok(Ok(artifact)) => {
                info!(chapter = %chapter.chapter_id, artifact = %artifact.display(), "chapter completed");
                self.emit(Event::ChapterCompleted {
                    id: chapter.chapter_id.clone(),
                    artifact: artifact.clone(),
                });
                report(ChapterOutcome::Completed, Some(artifact))
            }
            Ok(Err(e)) => {
                warn!(chapter = %chapter.chapter_id, error = %e, "packaging failed, pages retained");
                self.emit(Event::ChapterFailed {
                    id: chapter.chapter_id.clone(),
                    error: e.to_string(),
                });
                report(
                    ChapterOutcome::Failed {
                        error: e.to_string(),
                    },
                    None,
                )
            }
            Err(e) => {
                let error = format!("packaging task failed: {e}");
                self.emit(Event::ChapterFailed {
                    id: chapter.chapter_id.clone(),
                    error: error.clone(),
                });
                report(ChapterOutcome::Failed { error }, None)
            }
        }
    }

    /// Fan page fetches out under the page-worker budget
    ///
    /// Returns the sorted ordinals that failed permanently and the first
    /// error message seen, for the all-failed case.
    async fn fetch_pages(
        &self,
        chapter: &Chapter,
        pages: &[PageRef],
        chapter_dir: &Path,
    ) -> (Vec<u32>, Option<String>) {
        let semaphore = Arc::new(Semaphore::new(self.config.download.max_page_workers));
        let completed = Arc::new(AtomicU32::new(0));
        let total = pages.len() as u32;

        let mut tasks: JoinSet<(u32, Option<String>)> = JoinSet::new();

        for page in pages {
            let page = page.clone();
            let fetcher = self.fetcher.clone();
            let dir = chapter_dir.to_path_buf();
            let cancel = self.cancel.clone();
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            let event_tx = self.event_tx.clone();
            let chapter_id = chapter.chapter_id.clone();

            tasks.spawn(async move {
                // Semaphore is never closed, so acquire cannot fail
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return (page.ordinal, Some("worker pool closed".to_string())),
                };

                let result = fetcher.fetch_page(&page, &dir, &cancel).await;

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                event_tx
                    .send(Event::PageProgress {
                        id: chapter_id,
                        completed: done,
                        total,
                    })
                    .ok();

                match result {
                    Ok(_) => (page.ordinal, None),
                    Err(e) => (page.ordinal, Some(e.to_string())),
                }
            });
        }

        let mut missing = Vec::new();
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, None)) => {}
                Ok((ordinal, Some(error))) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                    missing.push(ordinal);
                }
                Err(e) => {
                    warn!(error = %e, "page task panicked");
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                }
            }
        }

        missing.sort_unstable();
        (missing, first_error)
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
