//! Pipeline stages and the progress-callback trait.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as a job moves through its stages, reads pages and synthesizes
//! chunks.
//!
//! Callbacks are purely observational: nothing they do (or fail to do)
//! changes control flow. The pipeline is sequential, so events for one job
//! always arrive in order and from one task at a time; the trait is still
//! `Send + Sync` because the extraction stage runs on a blocking thread.
//!
//! # Example
//!
//! ```rust
//! use pdf2audio::{ConversionConfig, ConversionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ChunkCounter(AtomicUsize);
//!
//! impl ConversionProgressCallback for ChunkCounter {
//!     fn on_chunk_complete(&self, index: usize, total: usize, audio_bytes: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("chunk {}/{} → {} bytes", index + 1, total, audio_bytes);
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(ChunkCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one conversion job.
///
/// ```text
/// Idle → Extracting → Chunking → Synthesizing → Assembling → Done
///   └──────────┴───────────┴────────────┴─────────────┴──→ Failed | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    Extracting,
    Chunking,
    Synthesizing,
    Assembling,
    Done,
    Failed,
    Cancelled,
}

impl Stage {
    /// `Done`, `Failed` and `Cancelled` end a job.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed | Stage::Cancelled)
    }

    /// Stable lowercase name, used in logs and progress displays.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Extracting => "extracting",
            Stage::Chunking => "chunking",
            Stage::Synthesizing => "synthesizing",
            Stage::Assembling => "assembling",
            Stage::Done => "done",
            Stage::Failed => "failed",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Forward moves go one step at a time; `Chunking → Done` is allowed for
    /// dry runs. Any non-terminal stage may move to `Failed` or `Cancelled`.
    pub fn can_advance_to(self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Stage::Failed | Stage::Cancelled => true,
            Stage::Extracting => self == Stage::Idle,
            Stage::Chunking => self == Stage::Extracting,
            Stage::Synthesizing => self == Stage::Chunking,
            Stage::Assembling => self == Stage::Synthesizing,
            Stage::Done => matches!(self, Stage::Assembling | Stage::Chunking),
            Stage::Idle => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Called by the conversion pipeline as a job progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Page numbers are 1-indexed; chunk indices are
/// 0-indexed, matching [`crate::TextChunk::index`].
pub trait ConversionProgressCallback: Send + Sync {
    /// Called on every stage transition, including the terminal one.
    fn on_stage_change(&self, from: Stage, to: Stage) {
        let _ = (from, to);
    }

    /// Called after each page has been read.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — number of pages being read in this pass
    /// * `chars`       — characters recovered from the page
    /// * `via_ocr`     — whether the text came from the OCR pass
    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize, via_ocr: bool) {
        let _ = (page_num, total_pages, chars, via_ocr);
    }

    /// Called once the text has been split.
    fn on_chunks_ready(&self, chunk_count: usize, total_chars: usize) {
        let _ = (chunk_count, total_chars);
    }

    /// Called just before a chunk is sent to the backend.
    fn on_chunk_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Called when a chunk's audio has been stored.
    fn on_chunk_complete(&self, index: usize, total: usize, audio_bytes: usize) {
        let _ = (index, total, audio_bytes);
    }

    /// Called when a chunk fails; the job aborts right after.
    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        stages: Mutex<Vec<Stage>>,
        pages: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_stage_change(&self, _from: Stage, to: Stage) {
            self.stages.lock().unwrap().push(to);
        }

        fn on_page_extracted(&self, _page: usize, _total: usize, _chars: usize, _ocr: bool) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_complete(&self, _index: usize, _total: usize, _bytes: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_chunk_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_change(Stage::Idle, Stage::Extracting);
        cb.on_page_extracted(1, 5, 120, false);
        cb.on_chunks_ready(3, 7000);
        cb.on_chunk_start(0, 3);
        cb.on_chunk_complete(0, 3, 4096);
        cb.on_chunk_error(1, 3, "throttled");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_change(Stage::Idle, Stage::Extracting);
        tracker.on_page_extracted(1, 2, 10, false);
        tracker.on_page_extracted(2, 2, 10, false);
        tracker.on_stage_change(Stage::Extracting, Stage::Chunking);
        tracker.on_chunk_complete(0, 2, 100);
        tracker.on_chunk_error(1, 2, "boom");
        tracker.on_stage_change(Stage::Synthesizing, Stage::Failed);

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(
            *tracker.stages.lock().unwrap(),
            vec![Stage::Extracting, Stage::Chunking, Stage::Failed]
        );
    }

    #[test]
    fn stage_transitions() {
        assert!(Stage::Idle.can_advance_to(Stage::Extracting));
        assert!(Stage::Extracting.can_advance_to(Stage::Chunking));
        assert!(Stage::Chunking.can_advance_to(Stage::Done));
        assert!(Stage::Assembling.can_advance_to(Stage::Done));
        assert!(Stage::Synthesizing.can_advance_to(Stage::Cancelled));
        assert!(!Stage::Idle.can_advance_to(Stage::Synthesizing));
        assert!(!Stage::Done.can_advance_to(Stage::Failed));
        assert!(!Stage::Failed.can_advance_to(Stage::Idle));
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_chunk_start(0, 10);
        assert_eq!(Stage::Synthesizing.to_string(), "synthesizing");
    }
}
