//! Speech backends: turn one [`TextChunk`] into one blob of encoded audio.
//!
//! Two implementations ship with the crate:
//!
//! * [`local::LocalEngine`] — espeak-ng on the local machine (WAV).
//! * [`polly::PollyBackend`] — Amazon Polly over the AWS SDK (MP3).
//!
//! Both sit behind the [`SpeechBackend`] trait and are chosen by
//! [`crate::BackendKind`] at job start; a caller can also inject any other
//! implementation through [`crate::ConversionConfigBuilder::speech_backend`].
//!
//! A backend is owned by exactly one job for the job's lifetime
//! ([`acquire`] at start, dropped at the end), so two jobs never share an
//! engine instance.

pub mod local;
pub mod polly;

use crate::config::{BackendKind, ConversionConfig};
use crate::error::{Pdf2AudioError, SynthesisError};
use crate::pipeline::chunk::TextChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Encoded audio container produced by a backend.
///
/// A job uses exactly one format for all of its segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// MPEG-1 Layer III frame stream.
    Mp3,
    /// RIFF/WAVE with a PCM payload.
    Wav,
}

impl AudioFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }

    /// ffmpeg muxer name for this container.
    pub fn ffmpeg_muxer(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
        }
    }
}

/// Synthesizes one chunk of text into encoded audio bytes.
///
/// Implementations are called sequentially by the pipeline, one chunk at a
/// time, in chunk order. They must not assume they are the only user of the
/// process, but they may assume nobody else calls them concurrently within
/// the same job.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &str;

    /// Container format of every blob this backend returns.
    fn format(&self) -> AudioFormat;

    /// Hard per-request character limit, if any.
    fn hard_char_limit(&self) -> Option<usize> {
        None
    }

    /// Minimum pause the pipeline keeps between two consecutive calls.
    fn min_request_interval(&self) -> Duration {
        Duration::ZERO
    }

    /// Synthesize `chunk` and return the encoded audio.
    async fn synthesize(&self, chunk: &TextChunk) -> Result<Vec<u8>, SynthesisError>;
}

/// Start the backend selected by `config` for one job.
///
/// A pre-constructed backend in `config.speech_backend` wins; otherwise the
/// [`BackendKind`] decides.
pub async fn acquire(config: &ConversionConfig) -> Result<Arc<dyn SpeechBackend>, Pdf2AudioError> {
    if let Some(ref backend) = config.speech_backend {
        return Ok(Arc::clone(backend));
    }

    let backend: Arc<dyn SpeechBackend> = match config.backend {
        BackendKind::Local => Arc::new(local::LocalEngine::acquire(config).await?),
        BackendKind::Polly => Arc::new(polly::PollyBackend::connect(config).await?),
    };
    info!(
        "Speech backend ready: {} ({})",
        backend.name(),
        backend.format().extension()
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    #[async_trait]
    impl SpeechBackend for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        fn format(&self) -> AudioFormat {
            AudioFormat::Mp3
        }

        async fn synthesize(&self, chunk: &TextChunk) -> Result<Vec<u8>, SynthesisError> {
            Ok(chunk.text.as_bytes().to_vec())
        }
    }

    #[tokio::test]
    async fn injected_backend_wins() {
        let config = ConversionConfig::builder()
            .backend(BackendKind::Polly)
            .speech_backend(Arc::new(Silent))
            .build()
            .unwrap();
        let backend = acquire(&config).await.unwrap();
        assert_eq!(backend.name(), "silent");
        assert_eq!(backend.hard_char_limit(), None);
        assert_eq!(backend.min_request_interval(), Duration::ZERO);
    }

    #[test]
    fn format_names() {
        assert_eq!(AudioFormat::Mp3.extension(), "mp3");
        assert_eq!(AudioFormat::Wav.ffmpeg_muxer(), "wav");
    }
}
