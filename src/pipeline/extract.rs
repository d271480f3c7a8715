//! Text extraction: the text layer first, OCR when it comes back empty.
//!
//! ```text
//! text layer ──(non-empty)──▶ done
//!     │ empty / whitespace only
//!     ▼
//! render page ──▶ OCR ──(non-empty)──▶ done
//!                    └──(empty)──▶ NoTextFound
//! ```
//!
//! The fallback decision is made for the selection as a whole: a document
//! with any text layer is read directly, a fully scanned one goes through
//! OCR page by page. [`OcrMode`] can force either path.

use super::ocr::{OcrEngine, TesseractOcr};
use super::pdf::{self, PageSource};
use crate::cancel::CancelToken;
use crate::config::{ConversionConfig, OcrMode, PageSelection};
use crate::error::Pdf2AudioError;
use crate::progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Text recovered from a document.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Page texts joined with `\n` in page order.
    pub text: String,
    /// Number of pages read.
    pub pages: usize,
    /// Whether the text came from the OCR pass.
    pub used_ocr: bool,
}

/// Knobs for one extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub pages: PageSelection,
    pub ocr_mode: OcrMode,
    pub render_width: u32,
}

impl ExtractOptions {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            pages: config.pages.clone(),
            ocr_mode: config.ocr_mode,
            render_width: config.ocr_render_width,
        }
    }
}

/// Read the selected pages of `source`, falling back to OCR per `opts`.
///
/// Blocking; call from a blocking thread.
pub fn extract_pages(
    source: &dyn PageSource,
    opts: &ExtractOptions,
    ocr: Option<&dyn OcrEngine>,
    progress: &dyn ConversionProgressCallback,
    cancel: &CancelToken,
) -> Result<ExtractedText, Pdf2AudioError> {
    let total = source.page_count();
    let indices = opts.pages.to_indices(total);
    if indices.is_empty() {
        return Err(match first_requested_page(&opts.pages) {
            Some(page) => Pdf2AudioError::PageOutOfRange { page, total },
            None => Pdf2AudioError::NoTextFound {
                pages: 0,
                ocr_attempted: false,
            },
        });
    }
    let count = indices.len();

    if opts.ocr_mode != OcrMode::Always {
        let mut texts = Vec::with_capacity(count);
        for (i, &idx) in indices.iter().enumerate() {
            check_cancel(cancel)?;
            let text = source.page_text(idx)?;
            progress.on_page_extracted(i + 1, count, text.chars().count(), false);
            texts.push(text);
        }
        let joined = texts.join("\n");
        if !joined.trim().is_empty() {
            info!("Text layer: {} chars from {} pages", joined.chars().count(), count);
            return Ok(ExtractedText {
                text: joined,
                pages: count,
                used_ocr: false,
            });
        }
        debug!("Text layer empty on all {} selected pages", count);
    }

    let ocr = match (opts.ocr_mode, ocr) {
        (OcrMode::Never, _) | (_, None) => {
            return Err(Pdf2AudioError::NoTextFound {
                pages: count,
                ocr_attempted: false,
            })
        }
        (_, Some(engine)) => engine,
    };

    info!("Running OCR ({}) on {} pages", ocr.name(), count);
    let mut texts = Vec::with_capacity(count);
    for (i, &idx) in indices.iter().enumerate() {
        check_cancel(cancel)?;
        let image = source.render_page(idx, opts.render_width)?;
        let text = ocr
            .recognize(&image)
            .map_err(|e| Pdf2AudioError::OcrFailed {
                page: idx + 1,
                detail: e.to_string(),
            })?;
        if text.trim().is_empty() {
            warn!("OCR found no text on page {}", idx + 1);
        }
        progress.on_page_extracted(i + 1, count, text.chars().count(), true);
        texts.push(text);
    }

    let joined = texts.join("\n");
    if joined.trim().is_empty() {
        return Err(Pdf2AudioError::NoTextFound {
            pages: count,
            ocr_attempted: true,
        });
    }
    Ok(ExtractedText {
        text: joined,
        pages: count,
        used_ocr: true,
    })
}

fn check_cancel(cancel: &CancelToken) -> Result<(), Pdf2AudioError> {
    if cancel.is_cancelled() {
        return Err(Pdf2AudioError::Cancelled {
            stage: Stage::Extracting,
        });
    }
    Ok(())
}

fn first_requested_page(selection: &PageSelection) -> Option<usize> {
    match selection {
        PageSelection::All => None,
        PageSelection::Single(p) => Some(*p),
        PageSelection::Range(start, _) => Some(*start),
        PageSelection::Set(pages) => pages.iter().min().copied(),
    }
}

/// The OCR engine `config` asks for, or `None` when OCR is disabled.
pub fn ocr_engine_for(config: &ConversionConfig) -> Option<Arc<dyn OcrEngine>> {
    if config.ocr_mode == OcrMode::Never {
        return None;
    }
    Some(match config.ocr_engine {
        Some(ref engine) => Arc::clone(engine),
        None => Arc::new(TesseractOcr::new(
            config.tesseract_path.clone(),
            config.ocr_language.clone(),
        )),
    })
}

fn progress_for(config: &ConversionConfig) -> ProgressCallback {
    config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

/// Extract text from the PDF at `path` on a blocking thread.
pub async fn extract_file(
    path: &Path,
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> Result<ExtractedText, Pdf2AudioError> {
    let path = path.to_path_buf();
    let password = config.password.clone();
    let opts = ExtractOptions::from_config(config);
    let ocr = ocr_engine_for(config);
    let progress = progress_for(config);
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        pdf::with_document(&path, password.as_deref(), |pages| {
            extract_pages(pages, &opts, ocr.as_deref(), progress.as_ref(), &cancel)
        })
    })
    .await
    .map_err(|e| Pdf2AudioError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Extract text from any [`PageSource`] on a blocking thread.
pub async fn extract_source<S>(
    source: S,
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> Result<ExtractedText, Pdf2AudioError>
where
    S: PageSource + Send + 'static,
{
    let opts = ExtractOptions::from_config(config);
    let ocr = ocr_engine_for(config);
    let progress = progress_for(config);
    let cancel = cancel.clone();

    tokio::task::spawn_blocking(move || {
        extract_pages(&source, &opts, ocr.as_deref(), progress.as_ref(), &cancel)
    })
    .await
    .map_err(|e| Pdf2AudioError::Internal(format!("Extraction task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancel_pair;
    use crate::pipeline::ocr::OcrError;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePages(Vec<&'static str>);

    impl PageSource for FakePages {
        fn page_count(&self) -> usize {
            self.0.len()
        }

        fn page_text(&self, index: usize) -> Result<String, Pdf2AudioError> {
            Ok(self.0[index].to_string())
        }

        fn render_page(&self, _index: usize, _width: u32) -> Result<DynamicImage, Pdf2AudioError> {
            Ok(DynamicImage::new_luma8(4, 4))
        }
    }

    struct FakeOcr {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl FakeOcr {
        fn new(text: &'static str) -> Self {
            Self {
                text,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for FakeOcr {
        fn name(&self) -> &str {
            "fake"
        }

        fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    fn opts(mode: OcrMode) -> ExtractOptions {
        ExtractOptions {
            pages: PageSelection::All,
            ocr_mode: mode,
            render_width: 1000,
        }
    }

    #[test]
    fn text_layer_joined_in_page_order() {
        let pages = FakePages(vec!["First page.", "Second page."]);
        let ocr = FakeOcr::new("never used");
        let out = extract_pages(
            &pages,
            &opts(OcrMode::Auto),
            Some(&ocr),
            &NoopProgressCallback,
            &CancelToken::never(),
        )
        .unwrap();
        assert_eq!(out.text, "First page.\nSecond page.");
        assert!(!out.used_ocr);
        assert_eq!(out.pages, 2);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_text_layer_falls_back_to_ocr() {
        let pages = FakePages(vec!["  ", "\n"]);
        let ocr = FakeOcr::new("Scanned words.");
        let out = extract_pages(
            &pages,
            &opts(OcrMode::Auto),
            Some(&ocr),
            &NoopProgressCallback,
            &CancelToken::never(),
        )
        .unwrap();
        assert!(out.used_ocr);
        assert_eq!(out.text, "Scanned words.\nScanned words.");
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn never_mode_reports_no_text() {
        let pages = FakePages(vec![""]);
        let err = extract_pages(
            &pages,
            &opts(OcrMode::Never),
            None,
            &NoopProgressCallback,
            &CancelToken::never(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::NoTextFound {
                pages: 1,
                ocr_attempted: false
            }
        ));
    }

    #[test]
    fn blank_ocr_reports_no_text() {
        let pages = FakePages(vec![""]);
        let ocr = FakeOcr::new("   ");
        let err = extract_pages(
            &pages,
            &opts(OcrMode::Auto),
            Some(&ocr),
            &NoopProgressCallback,
            &CancelToken::never(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::NoTextFound {
                ocr_attempted: true,
                ..
            }
        ));
    }

    #[test]
    fn always_mode_skips_text_layer() {
        let pages = FakePages(vec!["Embedded text."]);
        let ocr = FakeOcr::new("OCR text.");
        let out = extract_pages(
            &pages,
            &opts(OcrMode::Always),
            Some(&ocr),
            &NoopProgressCallback,
            &CancelToken::never(),
        )
        .unwrap();
        assert_eq!(out.text, "OCR text.");
        assert!(out.used_ocr);
    }

    #[test]
    fn selection_outside_document() {
        let pages = FakePages(vec!["Only page."]);
        let mut o = opts(OcrMode::Auto);
        o.pages = PageSelection::Single(4);
        let err = extract_pages(&pages, &o, None, &NoopProgressCallback, &CancelToken::never())
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::PageOutOfRange { page: 4, total: 1 }
        ));
    }

    #[test]
    fn cancelled_before_first_page() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let pages = FakePages(vec!["Text."]);
        let err = extract_pages(&pages, &opts(OcrMode::Auto), None, &NoopProgressCallback, &token)
            .unwrap_err();
        assert!(matches!(
            err,
            Pdf2AudioError::Cancelled {
                stage: Stage::Extracting
            }
        ));
    }

    #[tokio::test]
    async fn extract_source_runs_off_runtime() {
        let config = ConversionConfig::builder()
            .ocr_mode(OcrMode::Never)
            .build()
            .unwrap();
        let out = extract_source(FakePages(vec!["Hello."]), &config, &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(out.text, "Hello.");
    }
}
