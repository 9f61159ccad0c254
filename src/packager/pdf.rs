//! PDF document writer
//!
//! Each page image becomes one PDF page sized to the image at 96 DPI, so
//! pages keep their native aspect ratio. Unreadable or corrupt images are
//! skipped with a warning rather than failing the whole document; the
//! document fails only when no page could be embedded at all.

use crate::error::PackageError;
use printpdf::image_crate::DynamicImage;
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::warn;

const DPI: f32 = 96.0;

/// Write the ordered page files into a PDF document at `artifact`
pub(super) fn write_pdf(
    page_files: &[(PathBuf, String)],
    artifact: &Path,
) -> Result<(), PackageError> {
    let temp = super::temp_artifact_path(artifact);
    let document_err = |reason: String| PackageError::DocumentWrite {
        path: artifact.to_path_buf(),
        reason,
    };

    let result = write_document(page_files, &temp).map_err(document_err);
    if result.is_err() {
        let _ = std::fs::remove_file(&temp);
        return result;
    }

    super::finalize_artifact(&temp, artifact, document_err)
}

fn write_document(page_files: &[(PathBuf, String)], temp: &Path) -> Result<(), String> {
    let mut doc = None;

    for (path, name) in page_files {
        let image = match load_image(path) {
            Some(image) => image,
            None => {
                warn!(page = %name, "unreadable image skipped in document");
                continue;
            }
        };

        let (width_mm, height_mm) = page_size_mm(&image);

        let layer = match &doc {
            None => {
                let (document, page, layer) =
                    PdfDocument::new("Chapter", Mm(width_mm), Mm(height_mm), "Page");
                let layer_ref = document.get_page(page).get_layer(layer);
                doc = Some(document);
                layer_ref
            }
            Some(document) => {
                let (page, layer) = document.add_page(Mm(width_mm), Mm(height_mm), "Page");
                document.get_page(page).get_layer(layer)
            }
        };

        Image::from_dynamic_image(&image).add_to_layer(
            layer,
            ImageTransform {
                dpi: Some(DPI),
                ..Default::default()
            },
        );
    }

    let doc = doc.ok_or_else(|| "no readable pages to embed".to_string())?;

    let file = std::fs::File::create(temp).map_err(|e| e.to_string())?;
    doc.save(&mut BufWriter::new(file)).map_err(|e| e.to_string())?;
    Ok(())
}

fn load_image(path: &Path) -> Option<DynamicImage> {
    match printpdf::image_crate::open(path) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not decode image");
            None
        }
    }
}

/// Page dimensions in millimetres for an image rendered at [`DPI`]
fn page_size_mm(image: &DynamicImage) -> (f32, f32) {
    use printpdf::image_crate::GenericImageView;
    let (width_px, height_px) = image.dimensions();
    (
        width_px as f32 * 25.4 / DPI,
        height_px as f32 * 25.4 / DPI,
    )
}
