//! Remote synthesis through Amazon Polly.
//!
//! Credentials come from [`ConversionConfig::credentials`] when set and from
//! the standard AWS provider chain otherwise; they are handed to the SDK and
//! never logged. Every request asks for MP3 so segments can be joined by
//! byte concatenation.
//!
//! Polly rejects requests above [`POLLY_MAX_CHARS`] billed characters. The
//! chunker keeps each chunk under the safety budget derived from that
//! limit, so this module does not split text itself.

use super::{AudioFormat, SpeechBackend};
use crate::config::{ConversionConfig, PollyEngine};
use crate::error::{Pdf2AudioError, SynthesisError};
use crate::pipeline::chunk::TextChunk;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_polly::config::Credentials;
use aws_sdk_polly::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_polly::types::{Engine, OutputFormat, TextType, VoiceId};
use aws_sdk_polly::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Polly's hard limit on billed characters per `SynthesizeSpeech` call.
pub const POLLY_MAX_CHARS: usize = 3000;

/// Voice used when the config does not name one.
pub const DEFAULT_VOICE: &str = "Joanna";

/// Region used when neither the config nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

const BACKEND_NAME: &str = "polly";

/// A connected Polly client plus the per-job voice settings.
#[derive(Debug)]
pub struct PollyBackend {
    client: Client,
    voice: String,
    engine: PollyEngine,
    speaking_rate: f32,
    volume: f32,
    timeout: Duration,
    interval: Duration,
}

impl PollyBackend {
    /// Resolve region and credentials and build a client.
    ///
    /// Credentials are resolved here, so a machine with no AWS credentials
    /// fails before any text is extracted. Whether they are accepted is only
    /// known on the first chunk.
    pub async fn connect(config: &ConversionConfig) -> Result<Self, Pdf2AudioError> {
        Self::connect_with_endpoint(config, None).await
    }

    /// [`PollyBackend::connect`] against a custom endpoint, e.g. a local
    /// Polly-compatible service.
    pub async fn connect_with_endpoint(
        config: &ConversionConfig,
        endpoint_url: Option<&str>,
    ) -> Result<Self, Pdf2AudioError> {
        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(ref creds) = config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                creds.session_token.clone(),
                None,
                "pdf2audio",
            ));
        }
        let shared = loader.load().await;
        ensure_credentials(shared.credentials_provider()).await?;

        let voice = config
            .voice
            .clone()
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        info!(
            "Polly client ready (region={}, voice={}, engine={})",
            shared
                .region()
                .map(|r| r.as_ref().to_string())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            voice,
            config.polly_engine.as_str()
        );

        let mut polly_config = aws_sdk_polly::config::Builder::from(&shared);
        if let Some(url) = endpoint_url {
            debug!("Polly endpoint override: {}", url);
            polly_config = polly_config.endpoint_url(url);
        }

        Ok(Self {
            client: Client::from_conf(polly_config.build()),
            voice,
            engine: config.polly_engine,
            speaking_rate: config.speaking_rate,
            volume: config.volume,
            timeout: Duration::from_secs(config.request_timeout_secs),
            interval: Duration::from_millis(config.request_interval_ms),
        })
    }

    async fn request(&self, chunk: &TextChunk) -> Result<Vec<u8>, SynthesisError> {
        let (text, text_type) = match prosody_ssml(&chunk.text, self.speaking_rate, self.volume) {
            Some(ssml) => (ssml, TextType::Ssml),
            None => (chunk.text.clone(), TextType::Text),
        };

        let response = self
            .client
            .synthesize_speech()
            .engine(Engine::from(self.engine.as_str()))
            .output_format(OutputFormat::Mp3)
            .voice_id(VoiceId::from(self.voice.as_str()))
            .text_type(text_type)
            .text(text)
            .send()
            .await
            .map_err(classify)?;

        let audio = response
            .audio_stream
            .collect()
            .await
            .map_err(|e| SynthesisError::Transport {
                backend: BACKEND_NAME.into(),
                detail: format!("reading audio stream: {e}"),
            })?
            .into_bytes();

        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechBackend for PollyBackend {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn hard_char_limit(&self) -> Option<usize> {
        Some(POLLY_MAX_CHARS)
    }

    fn min_request_interval(&self) -> Duration {
        self.interval
    }

    async fn synthesize(&self, chunk: &TextChunk) -> Result<Vec<u8>, SynthesisError> {
        let audio = tokio::time::timeout(self.timeout, self.request(chunk))
            .await
            .map_err(|_| SynthesisError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio {
                backend: BACKEND_NAME.into(),
            });
        }
        debug!(
            "Chunk {}: {} chars → {} bytes MP3",
            chunk.index,
            chunk.char_count(),
            audio.len()
        );
        Ok(audio)
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Resolve credentials once; the secret itself is dropped immediately.
async fn ensure_credentials(
    provider: Option<SharedCredentialsProvider>,
) -> Result<(), Pdf2AudioError> {
    let provider = provider.ok_or_else(|| missing_credentials("no credentials provider"))?;
    provider
        .provide_credentials()
        .await
        .map(|_| ())
        .map_err(|e| missing_credentials(&DisplayErrorContext(&e).to_string()))
}

fn missing_credentials(detail: &str) -> Pdf2AudioError {
    Pdf2AudioError::BackendUnavailable {
        backend: BACKEND_NAME.into(),
        hint: format!(
            "No AWS credentials found ({detail}).\n\
             Set AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY or configure an AWS profile."
        ),
    }
}

/// Whether `err` or anything in its source chain says credentials are
/// missing or misconfigured.
fn is_credentials_failure(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(creds) = e.downcast_ref::<CredentialsError>() {
            return matches!(
                creds,
                CredentialsError::CredentialsNotLoaded(_) | CredentialsError::InvalidConfiguration(_)
            );
        }
        current = e.source();
    }
    false
}

// ── SDK error mapping ────────────────────────────────────────────────────

fn classify<E, R>(err: SdkError<E, R>) -> SynthesisError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let detail = DisplayErrorContext(&err).to_string();
    let backend = BACKEND_NAME.to_string();
    if is_credentials_failure(&err) {
        return SynthesisError::Credentials { backend, detail };
    }
    match err {
        SdkError::TimeoutError(_) => SynthesisError::Transport {
            backend,
            detail: format!("SDK timeout: {detail}"),
        },
        SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            SynthesisError::Transport { backend, detail }
        }
        SdkError::ServiceError(ref service) => match service.err().code() {
            Some("ThrottlingException") | Some("TooManyRequestsException") => {
                SynthesisError::Throttled { backend, detail }
            }
            Some("ServiceFailureException") => SynthesisError::Transport { backend, detail },
            _ => SynthesisError::Rejected { backend, detail },
        },
        _ => SynthesisError::Rejected { backend, detail },
    }
}

// ── SSML ─────────────────────────────────────────────────────────────────

/// Wrap `text` in a `<prosody>` element when rate or volume differ from 1.0.
///
/// Returns `None` when plain text can be sent as-is.
pub fn prosody_ssml(text: &str, rate: f32, volume: f32) -> Option<String> {
    let rate_changed = (rate - 1.0).abs() > f32::EPSILON;
    let volume_changed = (volume - 1.0).abs() > f32::EPSILON;
    if !rate_changed && !volume_changed {
        return None;
    }

    let mut attrs = String::new();
    if rate_changed {
        attrs.push_str(&format!(" rate=\"{:.0}%\"", rate * 100.0));
    }
    if volume_changed {
        if volume <= 0.0 {
            attrs.push_str(" volume=\"silent\"");
        } else {
            attrs.push_str(&format!(" volume=\"{:+.1}dB\"", 20.0 * volume.log10()));
        }
    }

    Some(format!(
        "<speak><prosody{attrs}>{}</prosody></speak>",
        escape_xml(text)
    ))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AwsCredentials, BackendKind};
    use aws_credential_types::provider::future;
    use aws_sdk_polly::operation::synthesize_speech::SynthesizeSpeechError;
    use std::time::Instant;

    #[derive(Debug)]
    struct NoCredentials;

    impl ProvideCredentials for NoCredentials {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready(Err(CredentialsError::not_loaded(
                "no credentials found in chain",
            )))
        }
    }

    #[test]
    fn plain_text_needs_no_ssml() {
        assert_eq!(prosody_ssml("Hello.", 1.0, 1.0), None);
    }

    #[test]
    fn ssml_escapes_markup() {
        let ssml = prosody_ssml("Tom & Jerry <3", 1.5, 1.0).unwrap();
        assert_eq!(
            ssml,
            "<speak><prosody rate=\"150%\">Tom &amp; Jerry &lt;3</prosody></speak>"
        );
    }

    #[test]
    fn volume_maps_to_decibels() {
        let ssml = prosody_ssml("x", 1.0, 2.0).unwrap();
        assert!(ssml.contains("volume=\"+6.0dB\""), "got: {ssml}");
        let ssml = prosody_ssml("x", 1.0, 0.0).unwrap();
        assert!(ssml.contains("volume=\"silent\""));
    }

    #[test]
    fn sdk_timeout_is_transient() {
        let err = SdkError::<SynthesizeSpeechError, ()>::timeout_error("connect timed out");
        let mapped = classify(err);
        assert!(matches!(mapped, SynthesisError::Transport { .. }));
        assert!(mapped.is_retryable());
    }

    #[test]
    fn missing_credentials_are_not_transient() {
        let err = SdkError::<SynthesizeSpeechError, ()>::construction_failure(
            CredentialsError::not_loaded("no credentials found in chain"),
        );
        let mapped = classify(err);
        assert!(matches!(mapped, SynthesisError::Credentials { .. }), "got {mapped:?}");
        assert!(!mapped.is_retryable());
    }

    #[tokio::test]
    async fn unresolvable_credentials_fail_at_connect() {
        let err = ensure_credentials(Some(SharedCredentialsProvider::new(NoCredentials)))
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2AudioError::BackendUnavailable { .. }));
        assert!(err.to_string().contains("No AWS credentials"));

        let err = ensure_credentials(None).await.unwrap_err();
        assert!(matches!(err, Pdf2AudioError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn static_credentials_resolve() {
        let creds = Credentials::new("AKIDEXAMPLE", "secret", None, None, "test");
        ensure_credentials(Some(SharedCredentialsProvider::new(creds)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn silent_endpoint_hits_request_timeout() {
        // Accepts connections and never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hold = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let config = ConversionConfig::builder()
            .backend(BackendKind::Polly)
            .credentials(AwsCredentials::new("AKIDEXAMPLE", "secret"))
            .region("us-east-1")
            .request_timeout_secs(1)
            .build()
            .unwrap();
        let backend = PollyBackend::connect_with_endpoint(&config, Some(&format!("http://{addr}")))
            .await
            .unwrap();

        let chunk = TextChunk {
            index: 0,
            text: "Hello.".into(),
        };
        let started = Instant::now();
        let err = backend.synthesize(&chunk).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Timeout { secs: 1 }), "got {err:?}");
        assert!(err.is_retryable());
        assert!(started.elapsed() < Duration::from_secs(5));
        hold.abort();
    }

    #[test]
    fn default_voice_is_joanna() {
        assert_eq!(DEFAULT_VOICE, "Joanna");
        assert_eq!(POLLY_MAX_CHARS, 3000);
    }
}
