//! # pdf2audio
//!
//! Turn PDF documents into a single narrated audio file.
//!
//! Text is read from the PDF's text layer (or recovered with OCR when a page
//! is only a scan), cleaned up for speech, split into pieces a speech engine
//! accepts, synthesized chunk by chunk and joined into one file. Speech
//! comes from either a local engine (espeak-ng, WAV) or Amazon Polly (MP3).
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input       resolve local file or download from URL
//!  ├─ 2. Extract     pdfium text layer; tesseract OCR when it is empty
//!  ├─ 3. Clean       de-hyphenate, flatten line breaks, collapse whitespace
//!  ├─ 4. Chunk       sentence-aware split under the backend's char budget
//!  ├─ 5. Synthesize  one request per chunk, in order, paced and cancellable
//!  └─ 6. Assemble    join segments without re-encoding, atomic rename
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2audio::{convert_to_file, BackendKind, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credentials come from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY.
//!     let config = ConversionConfig::builder()
//!         .backend(BackendKind::Polly)
//!         .voice("Joanna")
//!         .build()?;
//!     let output = convert_to_file("paper.pdf", "paper.mp3", &config).await?;
//!     eprintln!("{} chunks, {} bytes", output.stats.chunks, output.stats.audio_bytes);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2audio` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2audio = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Backend
//!
//! | Backend | Output | Per-request limit | Needs |
//! |---------|--------|-------------------|-------|
//! | `Local` | WAV    | none (chunks of 2800 chars) | `espeak-ng`, `ffmpeg` for joining |
//! | `Polly` | MP3    | 3000 chars (chunks of 2800) | AWS credentials |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{AudioFormat, SpeechBackend};
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use config::{
    AwsCredentials, BackendKind, ConversionConfig, ConversionConfigBuilder, OcrMode,
    PageSelection, PollyEngine,
};
pub use convert::{
    convert_pages_to_file, convert_sync, convert_text_to_file, convert_to_file,
    convert_to_file_cancellable, extract_text, inspect,
};
pub use error::{ErrorKind, Pdf2AudioError, SynthesisError};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata};
pub use pipeline::assemble::ConcatStrategy;
pub use pipeline::chunk::TextChunk;
pub use pipeline::ocr::{OcrEngine, OcrError};
pub use pipeline::pdf::PageSource;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
