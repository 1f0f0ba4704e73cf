//! TOML configuration file loading
//!
//! The file is a partial overlay: every key is optional and anything left out
//! keeps its built-in default.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Phrases, SttConfig, TtsConfig};
use crate::voice::{Locale, VoiceParams};
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Webhook URL commands are posted to
    pub endpoint: Option<String>,

    /// Locale for recognition and synthesis
    pub language: Option<Locale>,

    /// Initial synthesis parameters; missing keys keep their defaults
    pub voice: Option<VoiceParams>,

    /// Pause before speaking a reply, in milliseconds
    pub speak_delay_ms: Option<u64>,

    /// Dispatch timeout, in seconds
    pub dispatch_timeout_secs: Option<u64>,

    /// Recognition timeout, in seconds
    pub recognition_timeout_secs: Option<u64>,

    /// Canned replies
    pub phrases: Option<Phrases>,

    /// Speech recognition service
    pub stt: Option<SttConfig>,

    /// Speech synthesis service
    pub tts: Option<TtsConfig>,
}

impl ConfigFile {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is invalid or a value is out of range
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read the file at `path`, or `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let file = Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        tracing::info!(path = %path.display(), "loaded config file");
        Ok(Some(file))
    }
}

/// Default config file location
///
/// `VOICECMD_CONFIG` if set, else `~/.config/voicecmd/config.toml` on Linux
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VOICECMD_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::ProjectDirs::from("dev", "omni", "voicecmd")
        .map(|d| d.config_dir().join("config.toml"))
}
