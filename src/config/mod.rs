//! Configuration for the voice command session
//!
//! Layers, lowest priority first: built-in defaults, TOML file, environment.

pub mod file;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use file::config_file_path;

use self::file::ConfigFile;
use crate::voice::{Locale, SpeechToText, TextToSpeech, VoiceParams};
use crate::{Error, Result};

/// Default webhook receiving commands
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5678/webhook/voice-command";

/// Delay between a reply arriving and it being spoken
pub const DEFAULT_SPEAK_DELAY: Duration = Duration::from_millis(500);

/// Default dispatch timeout
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default recognition timeout
pub const DEFAULT_RECOGNITION_TIMEOUT: Duration = Duration::from_secs(15);

/// Voice command session configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Webhook URL commands are posted to
    pub endpoint: String,

    /// Locale for recognition and synthesis
    pub language: Locale,

    /// Initial synthesis parameters
    pub voice: VoiceParams,

    /// Pause before speaking a reply
    pub speak_delay: Duration,

    /// Upper bound on one dispatch round-trip
    pub dispatch_timeout: Duration,

    /// Upper bound on one capture without a final result
    pub recognition_timeout: Duration,

    /// Canned replies
    pub phrases: Phrases,

    /// Speech recognition service (microphone backend)
    pub stt: SttConfig,

    /// Speech synthesis service (speaker backend)
    pub tts: TtsConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,
}

/// Canned phrases spoken when the webhook gives no text of its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    /// `text` stage without an `output` field
    pub completed: String,
    /// Unknown or missing stage
    pub received: String,
    /// `graph` stage confirmation
    pub chart: String,
    /// `table` stage confirmation
    pub table: String,
    /// `both` stage confirmation
    pub both: String,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            completed: "ประมวลผลเสร็จสิ้น".to_string(),
            received: "ได้รับข้อมูลแล้ว".to_string(),
            chart: "แสดงกราฟเรียบร้อยแล้ว".to_string(),
            table: "แสดงตารางเรียบร้อยแล้ว".to_string(),
            both: "แสดงกราฟและตารางเรียบร้อยแล้ว".to_string(),
        }
    }
}

/// Speech recognition backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// `whisper` or `deepgram`
    pub provider: String,
    /// Model identifier
    pub model: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: "whisper".to_string(),
            model: "whisper-1".to_string(),
        }
    }
}

/// Speech synthesis backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// `openai` or `elevenlabs`
    pub provider: String,
    /// Model identifier
    pub model: String,
    /// Voice identifier
    pub voice: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
        }
    }
}

/// API keys for external services
#[derive(Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (Whisper and TTS)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| k.as_ref().map(|_| "***");
        f.debug_struct("ApiKeys")
            .field("openai", &mask(&self.openai))
            .field("deepgram", &mask(&self.deepgram))
            .field("elevenlabs", &mask(&self.elevenlabs))
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            language: Locale::default(),
            voice: VoiceParams::default(),
            speak_delay: DEFAULT_SPEAK_DELAY,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            recognition_timeout: DEFAULT_RECOGNITION_TIMEOUT,
            phrases: Phrases::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file location and the process environment
    ///
    /// # Errors
    ///
    /// Returns error if the file or an environment value is invalid
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        Self::load_with(path.as_deref(), &|key| std::env::var(key).ok())
    }

    /// Load configuration from `path` (if it exists) and the given environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the file or an environment value is invalid
    pub fn load_with(path: Option<&Path>, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path.map(ConfigFile::read).transpose()?.flatten() {
            Some(file) => Self::from_file(file),
            None => Self::default(),
        };

        config.apply_env(env)?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults
    ///
    /// # Errors
    ///
    /// Returns error if the document is invalid or a value is out of range
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(Self::from_file(ConfigFile::parse(content)?))
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            endpoint: file.endpoint.unwrap_or(defaults.endpoint),
            language: file.language.unwrap_or(defaults.language),
            voice: file.voice.unwrap_or(defaults.voice),
            speak_delay: file
                .speak_delay_ms
                .map_or(defaults.speak_delay, Duration::from_millis),
            dispatch_timeout: file
                .dispatch_timeout_secs
                .map_or(defaults.dispatch_timeout, Duration::from_secs),
            recognition_timeout: file
                .recognition_timeout_secs
                .map_or(defaults.recognition_timeout, Duration::from_secs),
            phrases: file.phrases.unwrap_or(defaults.phrases),
            stt: file.stt.unwrap_or(defaults.stt),
            tts: file.tts.unwrap_or(defaults.tts),
            api_keys: defaults.api_keys,
        }
    }

    /// Overlay environment variables
    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(endpoint) = env("VOICECMD_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(language) = env("VOICECMD_LANGUAGE") {
            self.language = language.parse()?;
        }

        let rate = parse_env::<f32>(env, "VOICECMD_RATE")?.unwrap_or(self.voice.rate());
        let pitch = parse_env::<f32>(env, "VOICECMD_PITCH")?.unwrap_or(self.voice.pitch());
        let volume = parse_env::<f32>(env, "VOICECMD_VOLUME")?.unwrap_or(self.voice.volume());
        self.voice = VoiceParams::new(rate, pitch, volume)?;

        if let Some(ms) = parse_env::<u64>(env, "VOICECMD_SPEAK_DELAY_MS")? {
            self.speak_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env::<u64>(env, "VOICECMD_DISPATCH_TIMEOUT_SECS")? {
            self.dispatch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>(env, "VOICECMD_RECOGNITION_TIMEOUT_SECS")? {
            self.recognition_timeout = Duration::from_secs(secs);
        }

        if let Some(provider) = env("VOICECMD_STT_PROVIDER") {
            self.stt.provider = provider;
        }
        if let Some(model) = env("VOICECMD_STT_MODEL") {
            self.stt.model = model;
        }
        if let Some(provider) = env("VOICECMD_TTS_PROVIDER") {
            self.tts.provider = provider;
        }
        if let Some(model) = env("VOICECMD_TTS_MODEL") {
            self.tts.model = model;
        }
        if let Some(voice) = env("VOICECMD_TTS_VOICE") {
            self.tts.voice = voice;
        }

        self.api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY"),
            deepgram: env("DEEPGRAM_API_KEY"),
            elevenlabs: env("ELEVENLABS_API_KEY"),
        };

        Ok(())
    }

    /// Build the configured speech recognition client
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unknown or its API key is missing
    pub fn speech_to_text(&self) -> Result<SpeechToText> {
        match self.stt.provider.as_str() {
            "whisper" => SpeechToText::new_whisper(
                self.api_keys.openai.clone().unwrap_or_default(),
                self.stt.model.clone(),
            ),
            "deepgram" => SpeechToText::new_deepgram(
                self.api_keys.deepgram.clone().unwrap_or_default(),
                self.stt.model.clone(),
            ),
            other => Err(Error::Config(format!("unknown STT provider: {other}"))),
        }
    }

    /// Build the configured speech synthesis client
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unknown or its API key is missing
    pub fn text_to_speech(&self) -> Result<TextToSpeech> {
        match self.tts.provider.as_str() {
            "openai" => TextToSpeech::new_openai(
                self.api_keys.openai.clone().unwrap_or_default(),
                self.tts.voice.clone(),
                self.tts.model.clone(),
            ),
            "elevenlabs" => TextToSpeech::new_elevenlabs(
                self.api_keys.elevenlabs.clone().unwrap_or_default(),
                self.tts.voice.clone(),
                self.tts.model.clone(),
            ),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Parse an optional environment value
fn parse_env<T: std::str::FromStr>(
    env: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}")))
        })
        .transpose()
}
