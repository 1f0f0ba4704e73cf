//! Text-to-speech (TTS) over HTTP synthesis services

use super::{Locale, VoiceParams};
use crate::error::SynthesisError;
use crate::Result;

/// Default OpenAI API base
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default ElevenLabs API base
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// Speed range accepted by `ElevenLabs` voice settings
const ELEVENLABS_SPEED: (f32, f32) = (0.7, 1.2);

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    /// OpenAI speech endpoint
    OpenAI,
    /// ElevenLabs
    ElevenLabs,
}

/// Synthesizes speech from text
#[derive(Clone)]
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    provider: TtsProvider,
    base_url: String,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(SynthesisError::Unavailable("OpenAI API key required for TTS".to_string()).into());
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            model,
            provider: TtsProvider::OpenAI,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(
                SynthesisError::Unavailable("ElevenLabs API key required for TTS".to_string())
                    .into(),
            );
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            model,
            provider: TtsProvider::ElevenLabs,
            base_url: ELEVENLABS_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Which backend this instance uses
    #[must_use]
    pub const fn provider(&self) -> TtsProvider {
        self.provider
    }

    /// Synthesize text to MP3 audio
    ///
    /// Rate maps onto the provider's speed control. `ElevenLabs` flash/turbo
    /// v2.5 models are pinned to the locale's language; other models infer it
    /// from the text. Pitch has no HTTP equivalent and volume is applied at
    /// playback.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
        locale: &Locale,
    ) -> Result<Vec<u8>> {
        if (params.pitch() - 1.0).abs() > f32::EPSILON {
            tracing::debug!(pitch = params.pitch(), "pitch not supported by HTTP synthesis");
        }

        match self.provider {
            TtsProvider::OpenAI => {
                tracing::debug!(%locale, "language inferred from text by OpenAI TTS");
                self.synthesize_openai(text, params.rate()).await
            }
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text, params.rate(), locale).await,
        }
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str, speed: f32) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Playback(format!("OpenAI TTS error {status}: {body}")).into());
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "synthesized speech");
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str, rate: f32, locale: &Locale) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct VoiceSettings {
            speed: f32,
        }

        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            language_code: Option<&'a str>,
            voice_settings: VoiceSettings,
        }

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice);

        let speed = rate.clamp(ELEVENLABS_SPEED.0, ELEVENLABS_SPEED.1);
        if (speed - rate).abs() > f32::EPSILON {
            tracing::debug!(rate, speed, "rate clamped to ElevenLabs speed range");
        }

        let language_code = self
            .model
            .ends_with("_v2_5")
            .then(|| locale.language());
        if language_code.is_none() {
            tracing::debug!(%locale, model = %self.model, "language inferred from text by ElevenLabs");
        }

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
            language_code,
            voice_settings: VoiceSettings { speed },
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(
                SynthesisError::Playback(format!("ElevenLabs TTS error {status}: {body}")).into(),
            );
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "synthesized speech");
        Ok(audio.to_vec())
    }
}
