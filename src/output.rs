//! Results returned by the conversion entry points.

use crate::backend::AudioFormat;
use crate::pipeline::chunk::TextChunk;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Where the audio was written. `None` for dry runs.
    pub output_path: Option<PathBuf>,
    /// The chunk plan the audio was synthesized from.
    pub chunks: Vec<TextChunk>,
    pub stats: ConversionStats,
}

/// Counters and timings for one job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages read from the document (0 for text input).
    pub pages: usize,
    /// Whether the text came from OCR.
    pub ocr_used: bool,
    /// Characters after cleanup, i.e. what was chunked.
    pub characters: usize,
    pub chunks: usize,
    /// Size of the assembled output file.
    pub audio_bytes: u64,
    /// Backend name, e.g. `polly` or `espeak-ng`. Empty for dry runs.
    pub backend: String,
    pub format: Option<AudioFormat>,
    pub extract_duration_ms: u64,
    pub synthesis_duration_ms: u64,
    pub assembly_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Document properties reported by [`crate::inspect`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    /// Non-whitespace characters in the text layer across all pages.
    /// Zero means the document is scanned and needs OCR.
    pub text_layer_chars: usize,
    /// Whether a password was needed to open the document.
    pub encrypted: bool,
}

impl DocumentMetadata {
    /// True when the document has no usable text layer.
    pub fn needs_ocr(&self) -> bool {
        self.text_layer_chars == 0
    }
}
