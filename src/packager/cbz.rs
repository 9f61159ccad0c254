//! CBZ archive writer
//!
//! A CBZ is a ZIP archive whose entries, read in order, are the pages of
//! the chapter. Readers rely on entry order, so pages are appended strictly
//! by ordinal.

use crate::error::PackageError;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write the ordered page files into a CBZ archive at `artifact`
pub(super) fn write_cbz(
    page_files: &[(PathBuf, String)],
    artifact: &Path,
) -> Result<(), PackageError> {
    let temp = super::temp_artifact_path(artifact);
    let archive_err = |reason: String| PackageError::ArchiveWrite {
        path: artifact.to_path_buf(),
        reason,
    };

    let result = write_entries(page_files, &temp).map_err(archive_err);
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
        return result;
    }

    super::finalize_artifact(&temp, artifact, archive_err)
}

fn write_entries(page_files: &[(PathBuf, String)], temp: &Path) -> Result<(), String> {
    let file = std::fs::File::create(temp).map_err(|e| e.to_string())?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (path, name) in page_files {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| format!("entry {name}: {e}"))?;
        let bytes = std::fs::read(path).map_err(|e| format!("read {}: {e}", path.display()))?;
        writer
            .write_all(&bytes)
            .map_err(|e| format!("entry {name}: {e}"))?;
    }

    writer.finish().map_err(|e| e.to_string())?;
    Ok(())
}
