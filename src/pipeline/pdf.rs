//! pdfium access: binding, opening documents, page text and rasterisation.
//!
//! Everything in this module is blocking. pdfium keeps thread-local state
//! and is CPU-bound, so callers run it inside `tokio::task::spawn_blocking`
//! (see [`crate::pipeline::extract`]).
//!
//! The rest of the pipeline never touches pdfium types directly: it reads
//! pages through the [`PageSource`] trait, which [`PdfiumPages`] implements
//! for a real document and tests implement with canned text.

use crate::error::Pdf2AudioError;
use crate::output::DocumentMetadata;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read access to the pages of one document.
pub trait PageSource {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Text layer of the page at `index` (0-based). Empty for scanned pages.
    fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError>;

    /// Render the page at `index` (0-based) to an image `width` pixels wide.
    fn render_page(&self, index: usize, width: u32) -> Result<DynamicImage, Pdf2AudioError>;
}

impl<P: PageSource + ?Sized> PageSource for Box<P> {
    fn page_count(&self) -> usize {
        (**self).page_count()
    }

    fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError> {
        (**self).page_text(index)
    }

    fn render_page(&self, index: usize, width: u32) -> Result<DynamicImage, Pdf2AudioError> {
        (**self).render_page(index, width)
    }
}

/// Bind to a pdfium shared library.
///
/// Lookup order: `PDFIUM_LIB_PATH` (a library file or the directory holding
/// it), the current directory, then the system library search path.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2AudioError> {
    if let Ok(env_path) = std::env::var("PDFIUM_LIB_PATH") {
        let candidate = PathBuf::from(&env_path);
        let lib = if candidate.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&candidate)
        } else {
            candidate
        };
        debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", lib.display());
        return Pdfium::bind_to_library(&lib)
            .map(Pdfium::new)
            .map_err(|e| Pdf2AudioError::PdfiumBindingFailed(format!("{}: {e:?}", lib.display())));
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| Pdf2AudioError::PdfiumBindingFailed(format!("{e:?}")))
}

fn is_password_error(err: &PdfiumError) -> bool {
    matches!(
        err,
        PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError)
    )
}

fn non_whitespace_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Map a pdfium load error onto the input error a user can act on.
fn load_error(path: &Path, password: Option<&str>, err: PdfiumError) -> Pdf2AudioError {
    match err {
        ref e if is_password_error(e) => {
            if password.is_some() {
                Pdf2AudioError::WrongPassword {
                    path: path.to_path_buf(),
                }
            } else {
                Pdf2AudioError::PasswordRequired {
                    path: path.to_path_buf(),
                }
            }
        }
        other => Pdf2AudioError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{other:?}"),
        },
    }
}

/// A loaded pdfium document exposed as a [`PageSource`].
pub struct PdfiumPages<'a> {
    document: PdfDocument<'a>,
}

impl PageSource for PdfiumPages<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError> {
        let page = self
            .document
            .pages()
            .get(index as u16)
            .map_err(|e| Pdf2AudioError::Internal(format!("page {}: {e:?}", index + 1)))?;
        let text = page
            .text()
            .map_err(|e| Pdf2AudioError::Internal(format!("text of page {}: {e:?}", index + 1)))?;
        Ok(text.all())
    }

    fn render_page(&self, index: usize, width: u32) -> Result<DynamicImage, Pdf2AudioError> {
        let page = self.document.pages().get(index as u16).map_err(|e| {
            Pdf2AudioError::RasterisationFailed {
                page: index + 1,
                detail: format!("{e:?}"),
            }
        })?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(width as i32);

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Pdf2AudioError::RasterisationFailed {
                page: index + 1,
                detail: format!("{e:?}"),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            index + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }
}

/// Open `path` and hand its pages to `f`.
///
/// The pdfium binding and document live only for the duration of `f`.
pub fn with_document<T>(
    path: &Path,
    password: Option<&str>,
    f: impl FnOnce(&PdfiumPages<'_>) -> Result<T, Pdf2AudioError>,
) -> Result<T, Pdf2AudioError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(path, password)
        .map_err(|e| load_error(path, password, e))?;
    let pages = PdfiumPages { document };
    info!("PDF loaded: {} pages", pages.page_count());
    f(&pages)
}

/// Read document metadata without touching page content.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2AudioError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| Pdf2AudioError::Internal(format!("Metadata task panicked: {e}")))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, Pdf2AudioError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| load_error(pdf_path, password, e))?;

    // Reopen without the password to learn whether one was needed.
    let encrypted = password.is_some()
        && matches!(pdfium.load_pdf_from_file(pdf_path, None), Err(ref e) if is_password_error(e));

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    let pages = document.pages();
    let text_chars = pages
        .iter()
        .map(|page| {
            page.text()
                .map(|text| non_whitespace_chars(&text.all()))
                .unwrap_or(0)
        })
        .sum();

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        page_count: pages.len() as usize,
        pdf_version: format!("{:?}", document.version()),
        text_layer_chars: text_chars,
        encrypted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_errors_are_recognised() {
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(is_password_error(&err));
        let other = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::FormatError);
        assert!(!is_password_error(&other));
    }

    #[test]
    fn password_error_without_password_asks_for_one() {
        let path = Path::new("locked.pdf");
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            load_error(path, None, err),
            Pdf2AudioError::PasswordRequired { .. }
        ));
        let err = PdfiumError::PdfiumLibraryInternalError(PdfiumInternalError::PasswordError);
        assert!(matches!(
            load_error(path, Some("guess"), err),
            Pdf2AudioError::WrongPassword { .. }
        ));
    }

    #[test]
    fn text_layer_count_ignores_whitespace() {
        assert_eq!(non_whitespace_chars(" a b\n\tc "), 3);
        assert_eq!(non_whitespace_chars(" \r\n"), 0);
    }
}
