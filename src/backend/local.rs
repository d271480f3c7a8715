//! Local synthesis through the espeak-ng command-line engine.
//!
//! Each chunk is piped to `espeak-ng --stdin --stdout`, which writes a
//! complete WAV file to stdout. Text goes through stdin rather than argv so
//! chunk size is not bounded by the OS argument limit and no shell quoting
//! is involved.
//!
//! One [`LocalEngine`] serves one job. Calls are serialized through an
//! internal async mutex: even though every call spawns a fresh process, the
//! engine behaves like a single-voice device and never overlaps two
//! utterances.

use super::{AudioFormat, SpeechBackend};
use crate::config::ConversionConfig;
use crate::error::{Pdf2AudioError, SynthesisError};
use crate::pipeline::chunk::TextChunk;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

/// espeak-ng's default speaking rate in words per minute.
pub const DEFAULT_WPM: f32 = 175.0;

const BACKEND_NAME: &str = "espeak-ng";

/// A job-scoped handle on the local espeak-ng engine.
#[derive(Debug)]
pub struct LocalEngine {
    binary: PathBuf,
    voice: Option<String>,
    words_per_minute: u32,
    amplitude: u32,
    gate: Mutex<()>,
}

impl LocalEngine {
    /// Probe the engine binary and build a handle from `config`.
    pub async fn acquire(config: &ConversionConfig) -> Result<Self, Pdf2AudioError> {
        let binary = config.espeak_path.clone();
        let probe = Command::new(&binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match probe {
            Ok(status) if status.success() => {}
            Ok(status) => {
                return Err(Pdf2AudioError::BackendUnavailable {
                    backend: BACKEND_NAME.into(),
                    hint: format!("'{}' --version exited with {status}", binary.display()),
                })
            }
            Err(e) => {
                return Err(Pdf2AudioError::BackendUnavailable {
                    backend: BACKEND_NAME.into(),
                    hint: format!(
                        "Could not run '{}': {e}\n\
                         Install espeak-ng (apt install espeak-ng / brew install espeak-ng) \
                         or point --espeak-path at it.",
                        binary.display()
                    ),
                })
            }
        }

        Ok(Self::with_binary(binary, config))
    }

    /// Build a handle without probing the binary.
    pub fn with_binary(binary: impl Into<PathBuf>, config: &ConversionConfig) -> Self {
        Self {
            binary: binary.into(),
            voice: config.voice.clone(),
            words_per_minute: (DEFAULT_WPM * config.speaking_rate).round().clamp(80.0, 450.0)
                as u32,
            amplitude: (100.0 * config.volume).round().clamp(0.0, 200.0) as u32,
            gate: Mutex::new(()),
        }
    }

    /// Command-line arguments passed to espeak-ng for every chunk.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--stdin".to_string(),
            "--stdout".to_string(),
            "-b".to_string(),
            "1".to_string(),
            "-s".to_string(),
            self.words_per_minute.to_string(),
            "-a".to_string(),
            self.amplitude.to_string(),
        ];
        if let Some(ref voice) = self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args
    }

    fn engine_error(detail: impl Into<String>) -> SynthesisError {
        SynthesisError::Engine {
            backend: BACKEND_NAME.into(),
            detail: detail.into(),
        }
    }
}

#[async_trait]
impl SpeechBackend for LocalEngine {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Wav
    }

    async fn synthesize(&self, chunk: &TextChunk) -> Result<Vec<u8>, SynthesisError> {
        let _turn = self.gate.lock().await;

        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::engine_error(format!("spawn failed: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(chunk.text.as_bytes())
                .await
                .map_err(|e| Self::engine_error(format!("writing text: {e}")))?;
            // Dropping stdin closes the pipe so espeak-ng sees end of input.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Self::engine_error(format!("waiting for engine: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::engine_error(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(SynthesisError::EmptyAudio {
                backend: BACKEND_NAME.into(),
            });
        }

        debug!(
            "Chunk {}: {} chars → {} bytes WAV",
            chunk.index,
            chunk.char_count(),
            output.stdout.len()
        );
        Ok(output.stdout)
    }
}
