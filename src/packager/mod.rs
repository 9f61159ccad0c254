//! Artifact assembly (CBZ, PDF, flat images)
//!
//! Packaging runs after every page of a chapter is on disk. Pages are always
//! assembled in ordinal order, never arrival order. Archive and document
//! artifacts are written through a temporary `.part` file and renamed into
//! place, so a failed packaging run never leaves a plausible-looking
//! artifact behind. On any packaging failure the per-ordinal page files are
//! retained so a later run can package without re-fetching.

mod cbz;
mod pdf;

use crate::error::PackageError;
use crate::types::{OutputFormat, PageRef};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Assemble a chapter's pages into the requested artifact
///
/// `chapter_dir` is the working directory holding the ordinal-named page
/// files; the artifact is written beside it (or, for
/// [`OutputFormat::Images`], is the directory itself). When
/// `delete_pages_after` is set, page files and the working directory are
/// removed after a container artifact is written; cleanup failure is logged
/// and never fails the chapter.
pub fn package_chapter(
    chapter_dir: &Path,
    pages: &[PageRef],
    format: OutputFormat,
    delete_pages_after: bool,
) -> Result<PathBuf, PackageError> {
    let page_files = collect_page_files(chapter_dir, pages)?;

    let artifact = artifact_path(chapter_dir, format);

    match format {
        OutputFormat::Cbz => cbz::write_cbz(&page_files, &artifact)?,
        OutputFormat::Pdf => pdf::write_pdf(&page_files, &artifact)?,
        OutputFormat::Images => {
            // The verified directory is the artifact; nothing to assemble
            // and nothing to delete
            return Ok(artifact);
        }
    }

    debug!(artifact = %artifact.display(), pages = page_files.len(), "artifact written");

    if delete_pages_after {
        if let Err(e) = remove_page_files(chapter_dir, &page_files) {
            warn!(error = %e, "page cleanup failed, artifact is intact");
        }
    }

    Ok(artifact)
}

/// Artifact path for a chapter working directory and format
///
/// `.../Manga/Chapter 1` becomes `.../Manga/Chapter 1.cbz` (or `.pdf`);
/// for flat images the directory itself is the artifact.
pub fn artifact_path(chapter_dir: &Path, format: OutputFormat) -> PathBuf {
    match format.extension() {
        None => chapter_dir.to_path_buf(),
        Some(ext) => {
            let mut name = chapter_dir.as_os_str().to_os_string();
            name.push(".");
            name.push(ext);
            PathBuf::from(name)
        }
    }
}

/// Verify every expected ordinal file exists non-empty, in ordinal order
///
/// Returns `(path, archive_name)` pairs sorted by ordinal. Fails with
/// [`PackageError::MissingPage`] naming the first absent or empty ordinal,
/// or [`PackageError::NoPages`] when the expected page list is empty.
fn collect_page_files(
    chapter_dir: &Path,
    pages: &[PageRef],
) -> Result<Vec<(PathBuf, String)>, PackageError> {
    if pages.is_empty() {
        return Err(PackageError::NoPages {
            dir: chapter_dir.to_path_buf(),
        });
    }

    let mut ordered: Vec<&PageRef> = pages.iter().collect();
    ordered.sort_by_key(|p| p.ordinal);

    let mut files = Vec::with_capacity(ordered.len());
    for page in ordered {
        let name = page.filename();
        let path = chapter_dir.join(&name);
        let non_empty = std::fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        if !non_empty {
            return Err(PackageError::MissingPage {
                ordinal: page.ordinal,
                dir: chapter_dir.to_path_buf(),
            });
        }
        files.push((path, name));
    }

    Ok(files)
}

/// Remove page files and, if then empty, the working directory
fn remove_page_files(
    chapter_dir: &Path,
    page_files: &[(PathBuf, String)],
) -> Result<(), PackageError> {
    for (path, _) in page_files {
        std::fs::remove_file(path).map_err(|e| PackageError::CleanupFailed {
            dir: chapter_dir.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    // Only removed when nothing else is left inside
    if let Err(e) = std::fs::remove_dir(chapter_dir) {
        debug!(dir = %chapter_dir.display(), error = %e, "working directory not removed");
    }

    Ok(())
}

/// Write `bytes`-producing closures through a temp file and rename into place
///
/// Shared by the archive and document writers so a crash mid-write never
/// leaves a truncated artifact under its final name.
fn finalize_artifact(
    temp: &Path,
    artifact: &Path,
    map_err: impl Fn(String) -> PackageError,
) -> Result<(), PackageError> {
    std::fs::rename(temp, artifact).map_err(|e| {
        let _ = std::fs::remove_file(temp);
        map_err(e.to_string())
    })
}

/// Sibling temp path for an artifact: `Chapter 1.cbz` becomes `Chapter 1.cbz.part`
fn temp_artifact_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}
