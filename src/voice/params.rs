//! Voice parameters and locales shared by recognition and synthesis

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Accepted speaking rate range (inclusive)
pub const RATE_RANGE: (f32, f32) = (0.5, 2.0);

/// Accepted pitch range (inclusive)
pub const PITCH_RANGE: (f32, f32) = (0.5, 2.0);

/// Accepted volume range (inclusive)
pub const VOLUME_RANGE: (f32, f32) = (0.1, 1.0);

/// Synthesis parameters, adjustable by the user and kept across commands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawVoiceParams")]
pub struct VoiceParams {
    rate: f32,
    pitch: f32,
    volume: f32,
}

/// Unvalidated form; keys left out keep their session defaults
#[derive(Deserialize)]
#[serde(default)]
struct RawVoiceParams {
    rate: f32,
    pitch: f32,
    volume: f32,
}

impl Default for RawVoiceParams {
    fn default() -> Self {
        let VoiceParams {
            rate,
            pitch,
            volume,
        } = VoiceParams::default();
        Self {
            rate,
            pitch,
            volume,
        }
    }
}

impl TryFrom<RawVoiceParams> for VoiceParams {
    type Error = ValidationError;

    fn try_from(raw: RawVoiceParams) -> Result<Self, Self::Error> {
        Self::new(raw.rate, raw.pitch, raw.volume)
    }
}

impl Default for VoiceParams {
    /// Initial parameters of a fresh session (slightly fast speech)
    fn default() -> Self {
        Self {
            rate: 1.5,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

fn check(name: &'static str, value: f32, (min, max): (f32, f32)) -> Result<f32, ValidationError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ValidationError::InvalidParameter {
            name,
            value,
            min,
            max,
        })
    }
}

impl VoiceParams {
    /// Parameters restored by the "reset" control
    pub const RESET: Self = Self {
        rate: 1.0,
        pitch: 1.0,
        volume: 0.8,
    };

    /// Create validated voice parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if any value is outside its accepted range
    pub fn new(rate: f32, pitch: f32, volume: f32) -> Result<Self, ValidationError> {
        Ok(Self {
            rate: check("rate", rate, RATE_RANGE)?,
            pitch: check("pitch", pitch, PITCH_RANGE)?,
            volume: check("volume", volume, VOLUME_RANGE)?,
        })
    }

    /// Speaking rate multiplier
    #[must_use]
    pub const fn rate(&self) -> f32 {
        self.rate
    }

    /// Pitch multiplier
    #[must_use]
    pub const fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Output volume (0.1 to 1.0)
    #[must_use]
    pub const fn volume(&self) -> f32 {
        self.volume
    }

    /// Replace the rate
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if out of range
    pub fn with_rate(self, rate: f32) -> Result<Self, ValidationError> {
        Self::new(rate, self.pitch, self.volume)
    }

    /// Replace the pitch
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if out of range
    pub fn with_pitch(self, pitch: f32) -> Result<Self, ValidationError> {
        Self::new(self.rate, pitch, self.volume)
    }

    /// Replace the volume
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if out of range
    pub fn with_volume(self, volume: f32) -> Result<Self, ValidationError> {
        Self::new(self.rate, self.pitch, volume)
    }
}

/// Locale tag in `xx-XX` form, driving both recognition and synthesis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale(String);

impl Locale {
    /// Language subtag (`"th"` for `th-TH`)
    #[must_use]
    pub fn language(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// Full tag
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self("th-TH".to_string())
    }
}

impl FromStr for Locale {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        let valid = tag.split_once('-').is_some_and(|(lang, region)| {
            (2..=3).contains(&lang.len())
                && lang.chars().all(|c| c.is_ascii_lowercase())
                && region.len() == 2
                && region.chars().all(|c| c.is_ascii_uppercase())
        });

        if valid {
            Ok(Self(tag.to_string()))
        } else {
            Err(ValidationError::InvalidLocale(s.to_string()))
        }
    }
}

impl TryFrom<String> for Locale {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Locale> for String {
    fn from(locale: Locale) -> Self {
        locale.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry in the language picker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageOption {
    /// Locale tag
    pub code: &'static str,
    /// Native display name
    pub name: &'static str,
}

/// Languages offered by the picker
pub const SUPPORTED_LANGUAGES: &[LanguageOption] = &[
    LanguageOption { code: "th-TH", name: "ไทย" },
    LanguageOption { code: "en-US", name: "English" },
    LanguageOption { code: "zh-CN", name: "中文" },
    LanguageOption { code: "ja-JP", name: "日本語" },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_bounds_inclusive() {
        assert!(VoiceParams::new(0.5, 2.0, 0.1).is_ok());
        assert!(VoiceParams::new(2.0, 0.5, 1.0).is_ok());
    }

    #[test]
    fn test_params_rejects_out_of_range() {
        let err = VoiceParams::new(2.5, 1.0, 0.8).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidParameter { name: "rate", .. }
        ));

        let err = VoiceParams::default().with_volume(0.0).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidParameter { name: "volume", .. }
        ));

        assert!(VoiceParams::new(f32::NAN, 1.0, 0.8).is_err());
    }

    #[test]
    fn test_params_deserialize_validates() {
        let ok: VoiceParams = toml::from_str("rate = 1.0\npitch = 1.2\nvolume = 0.5").unwrap();
        assert!((ok.pitch() - 1.2).abs() < f32::EPSILON);

        let bad: Result<VoiceParams, _> = toml::from_str("rate = 1.0\npitch = 3.0\nvolume = 0.5");
        assert!(bad.is_err());
    }

    #[test]
    fn test_params_partial_table_keeps_defaults() {
        let partial: VoiceParams = toml::from_str("rate = 1.0").unwrap();
        assert_eq!(partial, VoiceParams::new(1.0, 1.0, 0.8).unwrap());

        let empty: VoiceParams = toml::from_str("").unwrap();
        assert_eq!(empty, VoiceParams::default());
    }

    #[test]
    fn test_locale_parsing() {
        let locale: Locale = "en-US".parse().unwrap();
        assert_eq!(locale.language(), "en");
        assert_eq!(locale.to_string(), "en-US");

        assert!("english".parse::<Locale>().is_err());
        assert!("en-us".parse::<Locale>().is_err());
        assert!("EN-US".parse::<Locale>().is_err());
    }

    #[test]
    fn test_supported_languages_are_valid() {
        for lang in SUPPORTED_LANGUAGES {
            assert!(lang.code.parse::<Locale>().is_ok(), "{}", lang.code);
        }
    }
}
