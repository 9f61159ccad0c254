//! Run-level orchestration across chapters
//!
//! Chapters run concurrently under the chapter-worker budget. Failures are
//! isolated: one chapter's outcome never aborts its siblings, and the run
//! always ends with a [`RunReport`] in canonical chapter order regardless of
//! completion order.

use super::MangaDownloader;
use super::chapter_task::ChapterTask;
use crate::error::Result;
use crate::provider::{MangaSelector, Provider};
use crate::types::{
    Chapter, ChapterOutcome, ChapterReport, Event, MangaInfo, RunReport, chapter_sort_key,
};
use crate::utils::{parse_chapter_range, sanitize_filename};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

impl MangaDownloader {
    /// Download a manga end to end: resolve, filter, fetch, package, report
    ///
    /// `chapter_range` narrows the run (e.g. `"1-5,10"`); `None` downloads
    /// every chapter that survives the configured filters.
    pub async fn download_manga(
        &self,
        provider_id: Option<&str>,
        selector: &MangaSelector,
        chapter_range: Option<&str>,
    ) -> Result<RunReport> {
        let provider = self.resolve_provider(provider_id, Some(selector)).await?;
        let manga_id = super::manga_id_for(&provider, selector)?;

        let info = provider.get_manga_info(&manga_id).await?;
        let chapters = self.get_chapters(provider_id, selector).await?;

        let selected = match chapter_range {
            Some(range) => {
                parse_chapter_range(range, &chapters).map_err(crate::error::Error::Other)?
            }
            None => chapters,
        };

        self.download_chapters(provider, &info, selected).await
    }

    /// Download a specific set of chapters of one manga
    ///
    /// The returned report covers every requested chapter exactly once,
    /// sorted to canonical chapter order. The run itself only errors on
    /// setup problems (e.g. the output directory cannot be created);
    /// per-chapter failures live inside the report.
    pub async fn download_chapters(
        &self,
        provider: Arc<dyn Provider>,
        manga: &MangaInfo,
        mut chapters: Vec<Chapter>,
    ) -> Result<RunReport> {
        if chapters.is_empty() {
            self.emit_run_finished(&RunReport::default());
            return Ok(RunReport::default());
        }

        let manga_dir = self
            .config
            .download
            .download_dir
            .join(sanitize_filename(&manga.title));
        tokio::fs::create_dir_all(&manga_dir).await?;

        // Deterministic start order; completion order is up to the runtime
        chapters.sort_by(|a, b| {
            a.sort_key()
                .partial_cmp(&b.sort_key())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(
            manga = %manga.title,
            chapters = chapters.len(),
            dir = %manga_dir.display(),
            "starting run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.download.max_chapter_workers));
        let task = ChapterTask {
            fetcher: self.fetcher.clone(),
            provider,
            config: self.config.clone(),
            event_tx: self.event_tx.clone(),
            cancel: self.cancel_token.clone(),
        };

        let mut tasks: JoinSet<ChapterReport> = JoinSet::new();
        for chapter in chapters {
            let task = task.clone();
            let semaphore = semaphore.clone();
            let manga_dir = manga_dir.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        // Semaphore is never closed; fold into a failed report
                        return ChapterReport {
                            chapter_id: chapter.chapter_id.clone(),
                            chapter_number: chapter.chapter_number.clone(),
                            title: chapter.title.clone(),
                            outcome: ChapterOutcome::Failed {
                                error: "worker pool closed".to_string(),
                            },
                            artifact: None,
                        };
                    }
                };
                task.run(chapter, &manga_dir).await
            });
        }

        let mut report = RunReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(chapter_report) => report.chapters.push(chapter_report),
                Err(e) => warn!(error = %e, "chapter task panicked"),
            }
        }

        // Canonical order for presentation, regardless of completion order
        report.chapters.sort_by(|a, b| {
            chapter_sort_key(&a.chapter_number)
                .partial_cmp(&chapter_sort_key(&b.chapter_number))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            partial = report.partial(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "run finished"
        );
        self.emit_run_finished(&report);

        Ok(report)
    }

    fn emit_run_finished(&self, report: &RunReport) {
        self.emit_event(Event::RunFinished {
            completed: report.completed(),
            skipped: report.skipped(),
            partial: report.partial(),
            failed: report.failed(),
            cancelled: report.cancelled(),
        });
    }
}
