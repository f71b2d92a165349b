//! ElevenLabs text-to-speech over HTTPS (`/v1/text-to-speech/{voice}/with-timestamps`).

use std::time::Duration;

use base64::Engine as _;
use reqwest::blocking::{Client, ClientBuilder};

use crate::{
    foundation::error::{ReelError, ReelResult, SynthesisCause},
    speech::{
        AudioTrack, CharAlignment, OutputFormat, Speech, SpeechSynthesizer, Voice,
        audio::decode_with_ffmpeg,
    },
};

/// Connection settings for the ElevenLabs API.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Usually supplied through `ELEVENLABS_API_KEY` rather than a config file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io".to_string(),
            api_key: None,
            timeout_ms: 60_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> ReelResult<()> {
        if self.timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(ReelError::validation("provider timeouts must be > 0"));
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(ReelError::validation(format!(
                "provider base_url '{}' must be an http(s) URL",
                self.base_url
            )));
        }
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_id: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct TtsResponse {
    #[serde(alias = "audio_base_64")]
    audio_base64: String,
    #[serde(default)]
    alignment: Option<AlignmentWire>,
}

#[derive(serde::Deserialize)]
struct AlignmentWire {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

pub struct ElevenLabsSynthesizer {
    client: Client,
    base_url: String,
    api_key: String,
}

fn client_builder(cfg: &ProviderConfig) -> ClientBuilder {
    Client::builder()
        .user_agent(concat!("voxreel/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
        .timeout(Duration::from_millis(cfg.timeout_ms))
}

impl ElevenLabsSynthesizer {
    pub fn new(cfg: &ProviderConfig) -> ReelResult<Self> {
        Self::with_client_builder(cfg, client_builder(cfg))
    }

    fn with_client_builder(cfg: &ProviderConfig, builder: ClientBuilder) -> ReelResult<Self> {
        cfg.validate()?;
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ReelError::validation("missing ElevenLabs API key (set ELEVENLABS_API_KEY)")
            })?;
        let client = builder
            .build()
            .map_err(|e| ReelError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    #[tracing::instrument(skip(self, text), fields(chars = text.chars().count(), voice = %voice.voice_id))]
    fn synthesize(&self, text: &str, voice: &Voice) -> ReelResult<Speech> {
        let format = OutputFormat::parse(&voice.output_format)
            .map_err(|e| ReelError::synthesis(SynthesisCause::BadRequest(400), e.to_string()))?;
        let url = format!(
            "{}/v1/text-to-speech/{}/with-timestamps",
            self.base_url, voice.voice_id
        );

        let resp = self
            .client
            .post(&url)
            .query(&[("output_format", voice.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .json(&TtsRequest {
                text,
                model_id: voice.model_id.as_deref(),
            })
            .send()
            .map_err(classify_transport)?;

        let status = resp.status().as_u16();
        if let Some(cause) = SynthesisCause::from_status(status) {
            let body = resp.text().unwrap_or_default();
            return Err(ReelError::synthesis(
                cause,
                format!("provider returned {status}: {}", truncate(body.trim(), 300)),
            ));
        }

        let body: TtsResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                classify_transport(e)
            } else {
                ReelError::synthesis(
                    SynthesisCause::InvalidResponse,
                    format!("provider response is not valid JSON: {e}"),
                )
            }
        })?;
        let speech = decode_response(body, format)?;
        tracing::debug!(
            secs = speech.audio.total_duration().as_secs_f64(),
            aligned = speech.alignment.is_some(),
            "received synthesized audio"
        );
        Ok(speech)
    }
}

fn classify_transport(e: reqwest::Error) -> ReelError {
    let cause = if e.is_timeout() {
        SynthesisCause::Timeout
    } else if let Some(status) = e.status() {
        SynthesisCause::from_status(status.as_u16()).unwrap_or(SynthesisCause::Network)
    } else if e.is_builder() {
        SynthesisCause::BadRequest(0)
    } else {
        SynthesisCause::Network
    };
    ReelError::synthesis(cause, format!("request failed: {e}"))
}

fn decode_response(body: TtsResponse, format: OutputFormat) -> ReelResult<Speech> {
    let invalid = |msg: String| ReelError::synthesis(SynthesisCause::InvalidResponse, msg);

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body.audio_base64.as_bytes())
        .map_err(|e| invalid(format!("audio payload is not valid base64: {e}")))?;
    let audio = match format {
        OutputFormat::Pcm { sample_rate } => AudioTrack::from_s16le(&bytes, sample_rate),
        OutputFormat::Mp3 { sample_rate } => decode_with_ffmpeg(&bytes, sample_rate),
    }
    .map_err(|e| invalid(format!("audio payload could not be decoded: {e}")))?;

    let alignment = body
        .alignment
        .map(|a| CharAlignment {
            characters: a.characters,
            start_secs: a.character_start_times_seconds,
            end_secs: a.character_end_times_seconds,
        })
        .filter(|a| {
            let ok = a.is_consistent();
            if !ok {
                tracing::warn!("provider alignment is inconsistent; ignoring it");
            }
            ok
        });

    Ok(Speech { audio, alignment })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}
