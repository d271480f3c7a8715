//! Error types for the pdf2audio library.
//!
//! Two error types reflect two scopes of failure:
//!
//! * [`Pdf2AudioError`] — **terminal**: the job stops and no output file is
//!   produced. Every variant maps onto one [`ErrorKind`] and the pipeline
//!   [`Stage`] it was raised in, so callers can report "what failed where"
//!   without matching on every variant.
//!
//! * [`SynthesisError`] — a single backend call failed for a single chunk.
//!   The pipeline wraps it in [`Pdf2AudioError::Synthesis`] together with the
//!   chunk index. It is kept separate because it is the one failure a caller
//!   may reasonably retry (throttling, timeouts), chunk by chunk.
//!
//! Nothing in the library retries automatically.

use crate::progress::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing, unreadable or malformed input document.
    Input,
    /// No text could be recovered from the document.
    Extraction,
    /// Text could not be split into chunks.
    Chunking,
    /// The speech backend failed (or could not be started).
    Synthesis,
    /// Segments could not be joined into the output file.
    Assembly,
    /// The job was asked to stop.
    Cancelled,
    /// The configuration was rejected before the job started.
    Config,
    /// A bug or an unexpected runtime failure.
    Internal,
}

/// All terminal errors returned by the pdf2audio library.
#[derive(Debug, Error)]
pub enum Pdf2AudioError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is neither a file path nor an HTTP(S) URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// URL download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// URL download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists but does not start with the `%PDF` signature.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF structure could not be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF is encrypted and no password was supplied.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// The supplied password was rejected.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Install libpdfium, or set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory)."
    )]
    PdfiumBindingFailed(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Neither the text layer nor OCR produced any non-whitespace text.
    #[error("No text found in {pages} page(s){}", ocr_suffix(.ocr_attempted))]
    NoTextFound { pages: usize, ocr_attempted: bool },

    /// A page could not be rasterised for OCR.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// OCR was needed but every attempt failed.
    #[error("OCR failed on page {page}: {detail}")]
    OcrFailed { page: usize, detail: String },

    // ── Chunking errors ───────────────────────────────────────────────────
    /// The chunker rejected its input or budget.
    #[error("Chunking failed: {0}")]
    Chunking(String),

    // ── Synthesis errors ──────────────────────────────────────────────────
    /// The configured speech backend could not be started.
    #[error("Speech backend '{backend}' is not available.\n{hint}")]
    BackendUnavailable { backend: String, hint: String },

    /// Synthesis of one chunk failed; the job was aborted at that chunk.
    #[error("Synthesis failed on chunk {}/{total}: {source}", .chunk + 1)]
    Synthesis {
        /// 0-based index of the failing chunk.
        chunk: usize,
        total: usize,
        #[source]
        source: SynthesisError,
    },

    // ── Assembly errors ───────────────────────────────────────────────────
    /// A segment expected by the assembler is missing or unreadable.
    #[error("Audio segment for chunk {} is missing or unreadable: '{path}'", .chunk + 1)]
    SegmentMissing { chunk: usize, path: PathBuf },

    /// Joining segments failed.
    #[error("Failed to assemble '{path}': {detail}")]
    AssemblyFailed { path: PathBuf, detail: String },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Control ───────────────────────────────────────────────────────────
    /// The job was cancelled while in `stage`.
    #[error("Conversion cancelled during {stage}")]
    Cancelled { stage: Stage },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn ocr_suffix(ocr_attempted: &bool) -> &'static str {
    if *ocr_attempted {
        " (OCR fallback also empty)"
    } else {
        ""
    }
}

impl Pdf2AudioError {
    /// The coarse error class.
    pub fn kind(&self) -> ErrorKind {
        use Pdf2AudioError::*;
        match self {
            FileNotFound { .. }
            | PermissionDenied { .. }
            | InvalidInput { .. }
            | DownloadFailed { .. }
            | DownloadTimeout { .. }
            | NotAPdf { .. }
            | CorruptPdf { .. }
            | PasswordRequired { .. }
            | WrongPassword { .. }
            | PageOutOfRange { .. }
            | PdfiumBindingFailed(_) => ErrorKind::Input,
            NoTextFound { .. } | RasterisationFailed { .. } | OcrFailed { .. } => {
                ErrorKind::Extraction
            }
            Chunking(_) => ErrorKind::Chunking,
            BackendUnavailable { .. } | Synthesis { .. } => ErrorKind::Synthesis,
            SegmentMissing { .. } | AssemblyFailed { .. } | OutputWriteFailed { .. } => {
                ErrorKind::Assembly
            }
            Cancelled { .. } => ErrorKind::Cancelled,
            InvalidConfig(_) => ErrorKind::Config,
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// The last pipeline stage the job reached before this error.
    pub fn stage(&self) -> Stage {
        match self {
            Pdf2AudioError::Cancelled { stage } => *stage,
            Pdf2AudioError::CorruptPdf { .. }
            | Pdf2AudioError::PasswordRequired { .. }
            | Pdf2AudioError::WrongPassword { .. }
            | Pdf2AudioError::PageOutOfRange { .. }
            | Pdf2AudioError::PdfiumBindingFailed(_) => Stage::Extracting,
            other => match other.kind() {
                ErrorKind::Extraction => Stage::Extracting,
                ErrorKind::Chunking => Stage::Chunking,
                ErrorKind::Synthesis => Stage::Synthesizing,
                ErrorKind::Assembly => Stage::Assembling,
                _ => Stage::Idle,
            },
        }
    }

    /// 0-based index of the chunk that failed, for synthesis failures.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Pdf2AudioError::Synthesis { chunk, .. } => Some(*chunk),
            Pdf2AudioError::SegmentMissing { chunk, .. } => Some(*chunk),
            _ => None,
        }
    }

    /// Whether re-running the failing chunk may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Pdf2AudioError::Synthesis { source, .. } if source.is_retryable())
    }

    /// Whether this error represents a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Pdf2AudioError::Cancelled { .. })
    }
}

/// Failure of one backend call for one chunk.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum SynthesisError {
    /// The request did not complete within the per-request timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend asked us to slow down.
    #[error("{backend} throttled the request: {detail}")]
    Throttled { backend: String, detail: String },

    /// No usable credentials could be resolved for the request.
    #[error("{backend} has no usable credentials: {detail}")]
    Credentials { backend: String, detail: String },

    /// The backend answered with a non-success response.
    #[error("{backend} rejected the request: {detail}")]
    Rejected { backend: String, detail: String },

    /// Network or dispatch failure before a response was received.
    #[error("transport error talking to {backend}: {detail}")]
    Transport { backend: String, detail: String },

    /// The local engine exited unsuccessfully.
    #[error("{backend} exited with an error: {detail}")]
    Engine { backend: String, detail: String },

    /// The call succeeded but produced zero bytes of audio.
    #[error("{backend} returned no audio")]
    EmptyAudio { backend: String },

    /// The audio could not be stored as a segment.
    #[error("failed to store segment: {detail}")]
    Storage { detail: String },
}

impl SynthesisError {
    /// Timeouts, throttling and transport failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SynthesisError::Timeout { .. }
                | SynthesisError::Throttled { .. }
                | SynthesisError::Transport { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_display_is_one_based() {
        let e = Pdf2AudioError::Synthesis {
            chunk: 1,
            total: 3,
            source: SynthesisError::Rejected {
                backend: "polly".into(),
                detail: "InvalidSsmlException".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("chunk 2/3"), "got: {msg}");
        assert_eq!(e.chunk_index(), Some(1));
        assert_eq!(e.kind(), ErrorKind::Synthesis);
        assert_eq!(e.stage(), Stage::Synthesizing);
        assert!(!e.is_retryable());
    }

    #[test]
    fn segment_missing_display_is_one_based() {
        let e = Pdf2AudioError::SegmentMissing {
            chunk: 0,
            path: PathBuf::from("/tmp/job/segment-0000.mp3"),
        };
        let msg = e.to_string();
        assert!(msg.contains("chunk 1 "), "got: {msg}");
        assert_eq!(e.chunk_index(), Some(0));
        assert_eq!(e.kind(), ErrorKind::Assembly);
    }

    #[test]
    fn timeout_is_retryable() {
        let e = Pdf2AudioError::Synthesis {
            chunk: 0,
            total: 1,
            source: SynthesisError::Timeout { secs: 30 },
        };
        assert!(e.is_retryable());
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn no_text_found_mentions_ocr() {
        let e = Pdf2AudioError::NoTextFound {
            pages: 4,
            ocr_attempted: true,
        };
        assert!(e.to_string().contains("OCR"));
        assert_eq!(e.kind(), ErrorKind::Extraction);
        assert_eq!(e.stage(), Stage::Extracting);
    }

    #[test]
    fn input_errors_precede_every_stage() {
        let e = Pdf2AudioError::FileNotFound {
            path: PathBuf::from("/nope.pdf"),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        assert_eq!(e.stage(), Stage::Idle);
        assert_eq!(e.chunk_index(), None);
    }

    #[test]
    fn cancelled_keeps_its_stage() {
        let e = Pdf2AudioError::Cancelled {
            stage: Stage::Assembling,
        };
        assert!(e.is_cancelled());
        assert_eq!(e.stage(), Stage::Assembling);
        assert_eq!(e.kind(), ErrorKind::Cancelled);
    }
}
