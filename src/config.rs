//! Configuration types for PDF-to-audio conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The builder clamps numeric knobs to
//! the ranges the backends accept and `build()` rejects combinations that
//! can never work, so a job never starts with a config that fails halfway.
//!
//! Credentials are accepted here but never printed: the `Debug` impls of
//! [`ConversionConfig`] and [`AwsCredentials`] redact them.

use crate::backend::SpeechBackend;
use crate::error::Pdf2AudioError;
use crate::pipeline::assemble::ConcatStrategy;
use crate::pipeline::chunk;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Chunk budget used when neither the caller nor the backend imposes one.
pub const DEFAULT_CHUNK_CHARS: usize = 2800;

/// Configuration for a PDF-to-audio conversion.
///
/// # Example
/// ```rust
/// use pdf2audio::{BackendKind, ConversionConfig};
///
/// let config = ConversionConfig::builder()
///     .backend(BackendKind::Polly)
///     .voice("Matthew")
///     .region("eu-west-1")
///     .request_interval_ms(750)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_budget(), 2800);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Which speech backend to start for the job. Default: [`BackendKind::Local`].
    pub backend: BackendKind,

    /// Pre-constructed backend. Takes precedence over `backend`.
    pub speech_backend: Option<Arc<dyn SpeechBackend>>,

    /// Backend-specific voice identifier (`en-us` for espeak-ng, `Joanna`
    /// for Polly). `None` uses the backend default.
    pub voice: Option<String>,

    /// Speaking-rate multiplier, 1.0 = the backend's normal pace. Range 0.2–2.0.
    pub speaking_rate: f32,

    /// Output volume multiplier, 1.0 = unchanged. Range 0.0–2.0.
    pub volume: f32,

    /// Maximum characters per chunk. `None` derives it from the backend's
    /// hard per-request limit (see [`ConversionConfig::chunk_budget`]).
    pub max_chunk_chars: Option<usize>,

    /// Minimum pause between consecutive remote requests, in ms. Default: 500.
    pub request_interval_ms: u64,

    /// Per-request timeout for the remote backend, in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// AWS region for Polly. `None` falls back to the AWS default chain,
    /// then `us-east-1`.
    pub region: Option<String>,

    /// Polly synthesis engine. Default: [`PollyEngine::Neural`].
    pub polly_engine: PollyEngine,

    /// Explicit AWS credentials. `None` uses the AWS default chain
    /// (`AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, profiles, IAM roles).
    pub credentials: Option<AwsCredentials>,

    /// espeak-ng executable. Default: `espeak-ng` on `PATH`.
    pub espeak_path: PathBuf,

    /// When to run OCR. Default: [`OcrMode::Auto`].
    pub ocr_mode: OcrMode,

    /// Tesseract language code(s), e.g. `eng` or `eng+deu`. Default: `eng`.
    pub ocr_language: String,

    /// tesseract executable. Default: `tesseract` on `PATH`.
    pub tesseract_path: PathBuf,

    /// Pre-constructed OCR engine. Takes precedence over `tesseract_path`.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Width in pixels pages are rendered at for OCR. Default: 2000.
    pub ocr_render_width: u32,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Parent directory for the job's temporary directory. `None` uses the
    /// system temp dir.
    pub work_dir: Option<PathBuf>,

    /// How segments are joined. `None` picks the format's default.
    pub concat: Option<ConcatStrategy>,

    /// ffmpeg executable, used by [`ConcatStrategy::Ffmpeg`].
    pub ffmpeg_path: PathBuf,

    /// Extract and chunk only; no synthesis, no output file.
    pub dry_run: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Progress events receiver.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            speech_backend: None,
            voice: None,
            speaking_rate: 1.0,
            volume: 1.0,
            max_chunk_chars: None,
            request_interval_ms: 500,
            request_timeout_secs: 30,
            region: None,
            polly_engine: PollyEngine::default(),
            credentials: None,
            espeak_path: PathBuf::from("espeak-ng"),
            ocr_mode: OcrMode::default(),
            ocr_language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            ocr_engine: None,
            ocr_render_width: 2000,
            pages: PageSelection::default(),
            password: None,
            work_dir: None,
            concat: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            dry_run: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("backend", &self.backend)
            .field(
                "speech_backend",
                &self.speech_backend.as_ref().map(|b| b.name().to_string()),
            )
            .field("voice", &self.voice)
            .field("speaking_rate", &self.speaking_rate)
            .field("volume", &self.volume)
            .field("max_chunk_chars", &self.max_chunk_chars)
            .field("request_interval_ms", &self.request_interval_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("region", &self.region)
            .field("polly_engine", &self.polly_engine)
            .field("credentials", &self.credentials)
            .field("ocr_mode", &self.ocr_mode)
            .field("ocr_language", &self.ocr_language)
            .field("pages", &self.pages)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("work_dir", &self.work_dir)
            .field("concat", &self.concat)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Hard per-request character limit of the backend this config selects.
    pub fn hard_char_limit(&self) -> Option<usize> {
        match self.speech_backend {
            Some(ref backend) => backend.hard_char_limit(),
            None => self.backend.hard_char_limit(),
        }
    }

    /// Effective maximum characters per chunk.
    ///
    /// The backend's hard limit is reduced to its safety budget
    /// ([`chunk::safety_budget`]); an explicit `max_chunk_chars` may lower
    /// the budget further but never raise it above that.
    pub fn chunk_budget(&self) -> usize {
        let safe = self.hard_char_limit().map(chunk::safety_budget);
        match (self.max_chunk_chars, safe) {
            (Some(requested), Some(cap)) => requested.min(cap),
            (Some(requested), None) => requested,
            (None, Some(cap)) => cap,
            (None, None) => DEFAULT_CHUNK_CHARS,
        }
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.config.backend = kind;
        self
    }

    pub fn speech_backend(mut self, backend: Arc<dyn SpeechBackend>) -> Self {
        self.config.speech_backend = Some(backend);
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.config.voice = Some(voice.into());
        self
    }

    pub fn speaking_rate(mut self, rate: f32) -> Self {
        self.config.speaking_rate = rate.clamp(0.2, 2.0);
        self
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.config.volume = volume.clamp(0.0, 2.0);
        self
    }

    pub fn max_chunk_chars(mut self, n: usize) -> Self {
        self.config.max_chunk_chars = Some(n);
        self
    }

    pub fn request_interval_ms(mut self, ms: u64) -> Self {
        self.config.request_interval_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    pub fn polly_engine(mut self, engine: PollyEngine) -> Self {
        self.config.polly_engine = engine;
        self
    }

    pub fn credentials(mut self, credentials: AwsCredentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn espeak_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.espeak_path = path.into();
        self
    }

    pub fn ocr_mode(mut self, mode: OcrMode) -> Self {
        self.config.ocr_mode = mode;
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn ocr_render_width(mut self, px: u32) -> Self {
        self.config.ocr_render_width = px.clamp(300, 6000);
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn concat(mut self, strategy: ConcatStrategy) -> Self {
        self.config.concat = Some(strategy);
        self
    }

    pub fn ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn dry_run(mut self, v: bool) -> Self {
        self.config.dry_run = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2AudioError> {
        let c = &self.config;
        if c.max_chunk_chars == Some(0) {
            return Err(Pdf2AudioError::InvalidConfig(
                "max_chunk_chars must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(Pdf2AudioError::InvalidConfig(
                "request timeout must be ≥ 1s".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(Pdf2AudioError::InvalidConfig(
                "OCR language must not be empty".into(),
            ));
        }
        if let Some(ref creds) = c.credentials {
            if creds.access_key_id.is_empty() || creds.secret_access_key.is_empty() {
                return Err(Pdf2AudioError::InvalidConfig(
                    "AWS access key id and secret must both be set".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which speech backend a job uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// espeak-ng on the local machine: no network, no credentials, WAV output.
    #[default]
    Local,
    /// Amazon Polly: neural voices, MP3 output, 3000 chars per request.
    Polly,
}

impl BackendKind {
    /// Hard per-request character limit, if the backend has one.
    pub fn hard_char_limit(self) -> Option<usize> {
        match self {
            BackendKind::Local => None,
            BackendKind::Polly => Some(crate::backend::polly::POLLY_MAX_CHARS),
        }
    }
}

/// Amazon Polly synthesis engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PollyEngine {
    Standard,
    #[default]
    Neural,
    LongForm,
    Generative,
}

impl PollyEngine {
    /// Wire name expected by the Polly API.
    pub fn as_str(self) -> &'static str {
        match self {
            PollyEngine::Standard => "standard",
            PollyEngine::Neural => "neural",
            PollyEngine::LongForm => "long-form",
            PollyEngine::Generative => "generative",
        }
    }
}

/// When the text source falls back to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrMode {
    /// Read the text layer; OCR only when it is empty (default).
    #[default]
    Auto,
    /// Skip the text layer and OCR every page.
    Always,
    /// Never OCR; an empty text layer is an error.
    Never,
}

/// Static AWS credentials. `Debug` never prints the secret.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = if self.access_key_id.chars().count() > 4 {
            self.access_key_id.chars().take(4).collect()
        } else {
            String::new()
        };
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &format!("{shown}…"))
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Specifies which pages of the PDF to read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.backend, BackendKind::Local);
        assert_eq!(c.request_interval_ms, 500);
        assert_eq!(c.chunk_budget(), DEFAULT_CHUNK_CHARS);
        assert_eq!(c.ocr_mode, OcrMode::Auto);
    }

    #[test]
    fn polly_budget_leaves_margin() {
        let c = ConversionConfig::builder()
            .backend(BackendKind::Polly)
            .build()
            .unwrap();
        assert_eq!(c.hard_char_limit(), Some(3000));
        assert_eq!(c.chunk_budget(), 2800);
    }

    #[test]
    fn requested_budget_is_capped_by_backend() {
        let c = ConversionConfig::builder()
            .backend(BackendKind::Polly)
            .max_chunk_chars(5000)
            .build()
            .unwrap();
        assert_eq!(c.chunk_budget(), 2800);

        let c = ConversionConfig::builder()
            .backend(BackendKind::Polly)
            .max_chunk_chars(1000)
            .build()
            .unwrap();
        assert_eq!(c.chunk_budget(), 1000);
    }

    #[test]
    fn zero_budget_rejected() {
        let err = ConversionConfig::builder().max_chunk_chars(0).build().unwrap_err();
        assert!(err.to_string().contains("max_chunk_chars"));
    }

    #[test]
    fn empty_credentials_rejected() {
        let err = ConversionConfig::builder()
            .credentials(AwsCredentials::new("AKIA", ""))
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::InvalidConfig(_)));
    }

    #[test]
    fn rate_and_volume_are_clamped() {
        let c = ConversionConfig::builder()
            .speaking_rate(9.0)
            .volume(-1.0)
            .build()
            .unwrap();
        assert_eq!(c.speaking_rate, 2.0);
        assert_eq!(c.volume, 0.0);
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ConversionConfig::builder()
            .credentials(AwsCredentials::new("AKIAEXAMPLEKEY", "super-secret-value"))
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret-value"));
        assert!(!dbg.contains("AKIAEXAMPLEKEY"));
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(3).to_indices(5), vec![2]);
        assert_eq!(PageSelection::Single(6).to_indices(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(3, 10).to_indices(4), vec![2, 3]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
    }
}
