//! Voice control configuration

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{Result, SmolituxError};

/// Confidence a keyword window must exceed before its label is emitted
pub const DEFAULT_PROBABILITY_THRESHOLD: f32 = 0.75;

/// Fraction of each keyword window shared with the next one
pub const DEFAULT_OVERLAP_FACTOR: f32 = 0.5;

/// Well-known id of the visual feedback surface
pub const DEFAULT_FEEDBACK_SURFACE_ID: &str = "voice-feedback";

/// Recognition backend selector
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Continuous transcription through a speech-recognition service
    #[default]
    #[serde(alias = "webspeech")]
    LiveSpeech,
    /// On-device keyword classification over short audio windows
    #[serde(alias = "tensorflow")]
    KeywordSpotting,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::LiveSpeech => "live_speech",
            EngineKind::KeywordSpotting => "keyword_spotting",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = SmolituxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "live" | "live_speech" | "live-speech" | "webspeech" => Ok(EngineKind::LiveSpeech),
            "keyword" | "keyword_spotting" | "keyword-spotting" | "tensorflow" => {
                Ok(EngineKind::KeywordSpotting)
            }
            other => Err(SmolituxError::Config(format!(
                "unknown recognition engine: {other}"
            ))),
        }
    }
}

/// Live-speech recognition settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognitionConfig {
    /// BCP-47 language tag handed to the recognition service
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Keep transcribing after the first utterance
    #[serde(default = "default_true")]
    pub continuous: bool,
    /// Ask the service for partial transcripts (they are never dispatched)
    #[serde(default)]
    pub interim_results: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            continuous: true,
            interim_results: false,
        }
    }
}

/// Keyword-spotting settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordConfig {
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f32,
    #[serde(default = "default_overlap_factor")]
    pub overlap_factor: f32,
    /// Location of the model weights, if the classifier loads from disk
    #[serde(default)]
    pub model_path: Option<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
            overlap_factor: DEFAULT_OVERLAP_FACTOR,
            model_path: None,
        }
    }
}

/// Speech output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechConfig {
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Speaking rate (0.1 - 10.0)
    #[serde(default = "default_one")]
    pub rate: f32,
    /// Pitch (0.0 - 2.0)
    #[serde(default = "default_one")]
    pub pitch: f32,
    /// Volume (0.0 - 1.0)
    #[serde(default = "default_one")]
    pub volume: f32,
    /// Preferred voice name, platform default when unset
    #[serde(default)]
    pub voice: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
        }
    }
}

impl SpeechConfig {
    /// Copy with every parameter forced into the range the platform accepts
    pub fn clamped(&self) -> Self {
        Self {
            lang: self.lang.clone(),
            rate: self.rate.clamp(0.1, 10.0),
            pitch: self.pitch.clamp(0.0, 2.0),
            volume: self.volume.clamp(0.0, 1.0),
            voice: self.voice.clone(),
        }
    }
}

/// Feedback channel settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackConfig {
    #[serde(default = "default_true")]
    pub visual: bool,
    #[serde(default = "default_true")]
    pub audio: bool,
    #[serde(default = "default_true")]
    pub speech: bool,
    #[serde(default = "default_surface_id")]
    pub surface_id: String,
    #[serde(default = "default_tone_duration_ms")]
    pub tone_duration_ms: u64,
    #[serde(default = "default_start_hz")]
    pub start_hz: f32,
    #[serde(default = "default_stop_hz")]
    pub stop_hz: f32,
    #[serde(default = "default_command_hz")]
    pub command_hz: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            visual: true,
            audio: true,
            speech: true,
            surface_id: default_surface_id(),
            tone_duration_ms: default_tone_duration_ms(),
            start_hz: default_start_hz(),
            stop_hz: default_stop_hz(),
            command_hz: default_command_hz(),
        }
    }
}

/// Complete voice control configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VoiceControlConfig {
    #[serde(default)]
    pub engine: EngineKind,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub keyword: KeywordConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    /// Targets registered up front by a composition root
    #[serde(default)]
    pub commands: IndexMap<String, Vec<String>>,
}

fn default_lang() -> String {
    "en-US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_one() -> f32 {
    1.0
}

fn default_probability_threshold() -> f32 {
    DEFAULT_PROBABILITY_THRESHOLD
}

fn default_overlap_factor() -> f32 {
    DEFAULT_OVERLAP_FACTOR
}

fn default_surface_id() -> String {
    DEFAULT_FEEDBACK_SURFACE_ID.to_string()
}

fn default_tone_duration_ms() -> u64 {
    100
}

fn default_start_hz() -> f32 {
    880.0
}

fn default_stop_hz() -> f32 {
    440.0
}

fn default_command_hz() -> f32 {
    660.0
}

/// Loads and persists [`VoiceControlConfig`]
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VoiceConfigManager {
    #[serde(default)]
    pub voice: VoiceControlConfig,
}

impl VoiceConfigManager {
    /// `~/.smolitux/voice.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".smolitux")
            .join("voice.json")
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let path = Self::default_path();
        match Self::load_from(&path) {
            Ok(manager) => manager,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable voice config");
                Self::default()
            }
        }
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SmolituxError::Config(format!("failed to read {}: {e}", path.display())))?;

        serde_json::from_str(&content)
            .map_err(|e| SmolituxError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SmolituxError::Config(format!("failed to create config directory: {e}"))
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| SmolituxError::Config(format!("failed to write {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VoiceControlConfig::default();
        assert_eq!(config.engine, EngineKind::LiveSpeech);
        assert!(config.recognition.continuous);
        assert_eq!(config.keyword.probability_threshold, 0.75);
        assert_eq!(config.feedback.surface_id, "voice-feedback");
        assert_eq!(config.feedback.tone_duration_ms, 100);
        assert!(config.feedback.start_hz > config.feedback.command_hz);
        assert!(config.feedback.command_hz > config.feedback.stop_hz);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "voice": {
                "engine": "tensorflow",
                "speech": { "rate": 1.5 },
                "commands": { "lamp": ["lights on", "lights off"], "door": ["open"] }
            }
        }"#;
        let manager: VoiceConfigManager = serde_json::from_str(json).unwrap();
        let voice = manager.voice;

        assert_eq!(voice.engine, EngineKind::KeywordSpotting);
        assert_eq!(voice.speech.rate, 1.5);
        assert_eq!(voice.speech.pitch, 1.0);
        assert_eq!(voice.speech.lang, "en-US");
        let targets: Vec<&str> = voice.commands.keys().map(String::as_str).collect();
        assert_eq!(targets, vec!["lamp", "door"]);
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("live".parse::<EngineKind>().unwrap(), EngineKind::LiveSpeech);
        assert_eq!(
            "Keyword".parse::<EngineKind>().unwrap(),
            EngineKind::KeywordSpotting
        );
        assert!("vosk".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_speech_config_clamped() {
        let config = SpeechConfig {
            rate: 42.0,
            pitch: -1.0,
            volume: 3.0,
            ..Default::default()
        };
        let clamped = config.clamped();
        assert_eq!(clamped.rate, 10.0);
        assert_eq!(clamped.pitch, 0.0);
        assert_eq!(clamped.volume, 1.0);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("voice.json");

        let mut manager = VoiceConfigManager::default();
        manager.voice.engine = EngineKind::KeywordSpotting;
        manager
            .voice
            .commands
            .insert("btn1".to_string(), vec!["submit".to_string()]);
        manager.save_to(&path).unwrap();

        let loaded = VoiceConfigManager::load_from(&path).unwrap();
        assert_eq!(loaded.voice, manager.voice);
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let loaded = VoiceConfigManager::load_from(&missing).unwrap();
        assert_eq!(loaded.voice, VoiceControlConfig::default());

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            VoiceConfigManager::load_from(&broken),
            Err(SmolituxError::Config(_))
        ));
    }
}
