//! Conversion entry points and the job state machine.
//!
//! A job runs strictly in order:
//!
//! ```text
//! Idle ─▶ Extracting ─▶ Chunking ─▶ Synthesizing ─▶ Assembling ─▶ Done
//!   │          │            │             │              │
//!   └──────────┴────────────┴─────────────┴──────────────┴─▶ Failed | Cancelled
//! ```
//!
//! Input resolution and backend start-up happen in `Idle`, so a missing file
//! or an unavailable engine fails before any work is done. Chunks are
//! synthesized one at a time in index order; the first failure aborts the
//! job. The job's [`SegmentStore`] is removed on every exit path: by the
//! assembler on the happy path, by its `Drop` otherwise.

use crate::backend::{self, SpeechBackend};
use crate::cancel::CancelToken;
use crate::config::ConversionConfig;
use crate::error::{Pdf2AudioError, SynthesisError};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata};
use crate::pipeline::assemble::AudioAssembler;
use crate::pipeline::chunk::{self, TextChunk};
use crate::pipeline::extract::{self, ExtractedText};
use crate::pipeline::input::{self, ResolvedInput};
use crate::pipeline::normalize;
use crate::pipeline::pdf::{self, PageSource};
use crate::pipeline::segments::SegmentStore;
use crate::progress::{NoopProgressCallback, ProgressCallback, Stage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a PDF file or URL to an audio file.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input`  — local file path or HTTP/HTTPS URL to a PDF
/// * `output` — destination audio file; parent directories are created
/// * `config` — conversion configuration
///
/// # Errors
/// Any failure aborts the job; nothing is written to `output` and the job's
/// temporary directory is removed. See [`Pdf2AudioError::kind`] and
/// [`Pdf2AudioError::stage`] for where it failed.
pub async fn convert_to_file(
    input: impl AsRef<str>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2AudioError> {
    convert_to_file_cancellable(input, output, config, CancelToken::never()).await
}

/// [`convert_to_file`] that stops when `cancel` fires.
///
/// # Example
/// ```rust,no_run
/// use pdf2audio::{cancel_pair, convert_to_file_cancellable, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (handle, token) = cancel_pair();
/// tokio::spawn(async move {
///     let _ = tokio::signal::ctrl_c().await;
///     handle.cancel();
/// });
/// let config = ConversionConfig::default();
/// convert_to_file_cancellable("book.pdf", "book.wav", &config, token).await?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_to_file_cancellable(
    input: impl AsRef<str>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: CancelToken,
) -> Result<ConversionOutput, Pdf2AudioError> {
    let input = input.as_ref().to_string();
    info!("Starting conversion: {}", input);
    run(
        JobInput::Document(input),
        output.as_ref(),
        config,
        &cancel,
    )
    .await
}

/// Convert pages from any [`PageSource`] (an already-open document, a test
/// double) to an audio file.
pub async fn convert_pages_to_file<S>(
    source: S,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: CancelToken,
) -> Result<ConversionOutput, Pdf2AudioError>
where
    S: PageSource + Send + 'static,
{
    run(
        JobInput::Pages(Box::new(source)),
        output.as_ref(),
        config,
        &cancel,
    )
    .await
}

/// Convert plain text to an audio file, skipping PDF extraction.
pub async fn convert_text_to_file(
    text: impl Into<String>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
    cancel: CancelToken,
) -> Result<ConversionOutput, Pdf2AudioError> {
    run(
        JobInput::Text(text.into()),
        output.as_ref(),
        config,
        &cancel,
    )
    .await
}

/// Synchronous wrapper around [`convert_to_file`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<str>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2AudioError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2AudioError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert_to_file(input, output, config))
}

/// Read PDF metadata without extracting or synthesizing anything.
///
/// Uses `config.password` and `config.download_timeout_secs`; no speech
/// backend is started.
pub async fn inspect(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<DocumentMetadata, Pdf2AudioError> {
    let resolved = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    pdf::extract_metadata(resolved.path(), config.password.as_deref()).await
}

/// Extract and clean the text of a PDF, exactly as it would be chunked.
pub async fn extract_text(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<String, Pdf2AudioError> {
    let resolved = input::resolve_input(input.as_ref(), config.download_timeout_secs).await?;
    let extracted = extract::extract_file(resolved.path(), config, &CancelToken::never()).await?;
    Ok(normalize::clean_text(&extracted.text))
}

// ── Job state ────────────────────────────────────────────────────────────

enum JobInput {
    Document(String),
    Pages(Box<dyn PageSource + Send>),
    Text(String),
}

/// Stage bookkeeping for one run; reports every transition.
struct ConversionJob {
    stage: Stage,
    progress: ProgressCallback,
}

impl ConversionJob {
    fn new(config: &ConversionConfig) -> Self {
        Self {
            stage: Stage::Idle,
            progress: config
                .progress_callback
                .clone()
                .unwrap_or_else(|| Arc::new(NoopProgressCallback)),
        }
    }

    fn enter(&mut self, next: Stage) {
        if !self.stage.can_advance_to(next) {
            warn!("Unexpected stage transition {} → {}", self.stage, next);
        }
        debug!("Stage {} → {}", self.stage, next);
        self.progress.on_stage_change(self.stage, next);
        self.stage = next;
    }

    fn check_cancel(&self, cancel: &CancelToken) -> Result<(), Pdf2AudioError> {
        if cancel.is_cancelled() {
            return Err(Pdf2AudioError::Cancelled { stage: self.stage });
        }
        Ok(())
    }

    /// Move to the terminal stage matching `err` and hand the error back.
    fn abort(&mut self, err: Pdf2AudioError) -> Pdf2AudioError {
        if !self.stage.is_terminal() {
            let terminal = if err.is_cancelled() {
                Stage::Cancelled
            } else {
                Stage::Failed
            };
            self.enter(terminal);
        }
        err
    }
}

async fn run(
    input: JobInput,
    output: &Path,
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> Result<ConversionOutput, Pdf2AudioError> {
    let mut job = ConversionJob::new(config);
    match execute(&mut job, input, output, config, cancel).await {
        Ok(result) => Ok(result),
        Err(e) => {
            warn!("Conversion stopped during {}: {}", e.stage(), e);
            Err(job.abort(e))
        }
    }
}

async fn execute(
    job: &mut ConversionJob,
    input: JobInput,
    output: &Path,
    config: &ConversionConfig,
    cancel: &CancelToken,
) -> Result<ConversionOutput, Pdf2AudioError> {
    let total_start = Instant::now();
    let mut stats = ConversionStats::default();

    // ── Step 1: Resolve input and start the backend ──────────────────────
    let resolved: Option<ResolvedInput> = match input {
        JobInput::Document(ref s) => {
            Some(input::resolve_input(s, config.download_timeout_secs).await?)
        }
        _ => None,
    };

    let speech: Option<Arc<dyn SpeechBackend>> = if config.dry_run {
        None
    } else {
        Some(backend::acquire(config).await?)
    };

    let budget = config.chunk_budget();
    if let Some(requested) = config.max_chunk_chars.filter(|&n| n > budget) {
        warn!(
            "max_chunk_chars {} exceeds the backend's safe limit; using {}",
            requested, budget
        );
    }

    // ── Step 2: Extract ──────────────────────────────────────────────────
    job.check_cancel(cancel)?;
    job.enter(Stage::Extracting);
    let extract_start = Instant::now();
    let extracted = match (input, resolved.as_ref()) {
        (JobInput::Document(_), Some(resolved)) => {
            extract::extract_file(resolved.path(), config, cancel).await?
        }
        (JobInput::Pages(pages), _) => extract::extract_source(pages, config, cancel).await?,
        (JobInput::Text(text), _) => ExtractedText {
            text,
            pages: 0,
            used_ocr: false,
        },
        (JobInput::Document(input), None) => {
            return Err(Pdf2AudioError::Internal(format!(
                "input '{input}' was not resolved"
            )))
        }
    };
    stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    stats.pages = extracted.pages;
    stats.ocr_used = extracted.used_ocr;
    drop(resolved);

    // ── Step 3: Clean and chunk ──────────────────────────────────────────
    job.check_cancel(cancel)?;
    job.enter(Stage::Chunking);
    let text = normalize::clean_text(&extracted.text);
    if text.is_empty() {
        return Err(Pdf2AudioError::NoTextFound {
            pages: extracted.pages,
            ocr_attempted: extracted.used_ocr,
        });
    }
    let chunks = chunk::split(&text, budget)?;
    stats.characters = text.chars().count();
    stats.chunks = chunks.len();
    job.progress.on_chunks_ready(chunks.len(), stats.characters);
    info!(
        "Split {} chars into {} chunks (budget {})",
        stats.characters,
        chunks.len(),
        budget
    );

    let speech = match speech {
        Some(speech) => speech,
        None => {
            job.enter(Stage::Done);
            stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
            return Ok(ConversionOutput {
                output_path: None,
                chunks,
                stats,
            });
        }
    };
    stats.backend = speech.name().to_string();
    stats.format = Some(speech.format());

    // ── Step 4: Synthesize ───────────────────────────────────────────────
    job.check_cancel(cancel)?;
    job.enter(Stage::Synthesizing);
    let synth_start = Instant::now();
    let mut store = SegmentStore::create(config.work_dir.as_deref(), speech.format())
        .map_err(|e| Pdf2AudioError::Internal(format!("creating job directory: {e}")))?;
    synthesize_all(job, speech.as_ref(), &chunks, &mut store, cancel).await?;
    stats.synthesis_duration_ms = synth_start.elapsed().as_millis() as u64;

    // ── Step 5: Assemble ─────────────────────────────────────────────────
    job.check_cancel(cancel)?;
    job.enter(Stage::Assembling);
    let assemble_start = Instant::now();
    let assembler = AudioAssembler::from_config(config, speech.format());
    stats.audio_bytes = assembler.assemble(&mut store, output).await?;
    stats.assembly_duration_ms = assemble_start.elapsed().as_millis() as u64;

    job.enter(Stage::Done);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Conversion complete: {} chunks, {} bytes, {}ms total",
        stats.chunks, stats.audio_bytes, stats.total_duration_ms
    );

    Ok(ConversionOutput {
        output_path: Some(PathBuf::from(output)),
        chunks,
        stats,
    })
}

/// Synthesize every chunk in order, pacing requests by the backend's
/// minimum interval, and persist each result.
async fn synthesize_all(
    job: &ConversionJob,
    speech: &dyn SpeechBackend,
    chunks: &[TextChunk],
    store: &mut SegmentStore,
    cancel: &CancelToken,
) -> Result<(), Pdf2AudioError> {
    let total = chunks.len();
    let interval = speech.min_request_interval();
    let cancelled = || Pdf2AudioError::Cancelled {
        stage: Stage::Synthesizing,
    };

    for chunk in chunks {
        job.check_cancel(cancel)?;
        if chunk.index > 0 && !interval.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => return Err(cancelled()),
            }
        }

        job.progress.on_chunk_start(chunk.index, total);
        debug!(
            "Synthesizing chunk {}/{} ({} chars)",
            chunk.index + 1,
            total,
            chunk.char_count()
        );

        let result = tokio::select! {
            r = speech.synthesize(chunk) => r,
            _ = cancel.cancelled() => return Err(cancelled()),
        };
        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                job.progress.on_chunk_error(chunk.index, total, &e.to_string());
                return Err(Pdf2AudioError::Synthesis {
                    chunk: chunk.index,
                    total,
                    source: e,
                });
            }
        };

        let segment = store.persist(chunk.index, &audio).await.map_err(|e| {
            let source = SynthesisError::Storage {
                detail: e.to_string(),
            };
            job.progress.on_chunk_error(chunk.index, total, &source.to_string());
            Pdf2AudioError::Synthesis {
                chunk: chunk.index,
                total,
                source,
            }
        })?;
        job.progress
            .on_chunk_complete(chunk.index, total, segment.bytes as usize);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::AudioFormat;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo;

    #[async_trait]
    impl SpeechBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn format(&self) -> AudioFormat {
            AudioFormat::Mp3
        }

        async fn synthesize(&self, chunk: &TextChunk) -> Result<Vec<u8>, SynthesisError> {
            Ok(format!("[{}]", chunk.text).into_bytes())
        }
    }

    #[derive(Default)]
    struct Stages(Mutex<Vec<(Stage, Stage)>>);

    impl crate::progress::ConversionProgressCallback for Stages {
        fn on_stage_change(&self, from: Stage, to: Stage) {
            self.0.lock().unwrap().push((from, to));
        }
    }

    #[tokio::test]
    async fn text_job_walks_every_stage() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let stages = Arc::new(Stages::default());
        let config = ConversionConfig::builder()
            .speech_backend(Arc::new(Echo))
            .work_dir(work.path())
            .progress_callback(stages.clone())
            .build()
            .unwrap();

        let path = out.path().join("a.mp3");
        let result = convert_text_to_file("Hi there.", &path, &config, CancelToken::never())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"[Hi there.]");
        assert_eq!(result.stats.chunks, 1);
        assert_eq!(result.stats.backend, "echo");
        let seen: Vec<Stage> = stages.0.lock().unwrap().iter().map(|(_, to)| *to).collect();
        assert_eq!(
            seen,
            vec![
                Stage::Extracting,
                Stage::Chunking,
                Stage::Synthesizing,
                Stage::Assembling,
                Stage::Done
            ]
        );
    }

    #[tokio::test]
    async fn dry_run_stops_after_chunking() {
        let out = tempfile::tempdir().unwrap();
        let path = out.path().join("a.mp3");
        let config = ConversionConfig::builder()
            .dry_run(true)
            .max_chunk_chars(12)
            .build()
            .unwrap();

        let result = convert_text_to_file("One two. Three four.", &path, &config, CancelToken::never())
            .await
            .unwrap();
        assert_eq!(result.chunks.len(), 2);
        assert!(result.output_path.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn blank_text_is_no_text_found() {
        let out = tempfile::tempdir().unwrap();
        let config = ConversionConfig::builder()
            .speech_backend(Arc::new(Echo))
            .build()
            .unwrap();
        let err = convert_text_to_file(" \n ", out.path().join("a.mp3"), &config, CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::NoTextFound { .. }));
        assert_eq!(err.stage(), Stage::Extracting);
    }

    #[tokio::test]
    async fn missing_input_fails_before_backend() {
        let stages = Arc::new(Stages::default());
        let config = ConversionConfig::builder()
            .espeak_path("/definitely/not/espeak-ng")
            .progress_callback(stages.clone())
            .build()
            .unwrap();
        let err = convert_to_file("/no/such/book.pdf", "/tmp/never.wav", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::FileNotFound { .. }));
        assert_eq!(
            *stages.0.lock().unwrap(),
            vec![(Stage::Idle, Stage::Failed)]
        );
    }
}
