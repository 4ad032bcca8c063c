//! Voice control value types

use serde::{Deserialize, Serialize};

/// Listening state of the manager
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ListeningState {
    #[default]
    Idle,
    Listening,
}

impl ListeningState {
    pub fn from_flag(is_listening: bool) -> Self {
        if is_listening {
            ListeningState::Listening
        } else {
            ListeningState::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, ListeningState::Listening)
    }
}

impl std::fmt::Display for ListeningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListeningState::Idle => write!(f, "Idle"),
            ListeningState::Listening => write!(f, "Listening"),
        }
    }
}

/// One emission from a recognition engine, consumed once
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionResult {
    /// Free-text transcript from the live-speech engine
    Transcript(String),
    /// Best label of a keyword window with its score
    Keyword { label: String, score: f32 },
}

impl RecognitionResult {
    /// Text handed to command matching
    pub fn text(&self) -> &str {
        match self {
            RecognitionResult::Transcript(text) => text,
            RecognitionResult::Keyword { label, .. } => label,
        }
    }

    pub fn confidence(&self) -> Option<f32> {
        match self {
            RecognitionResult::Transcript(_) => None,
            RecognitionResult::Keyword { score, .. } => Some(*score),
        }
    }
}

/// Result of matching one utterance against the registry
///
/// Either both `command` and `target_id` are present or neither is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MatchOutcome {
    command: Option<String>,
    target_id: Option<String>,
}

impl MatchOutcome {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn matched(command: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            target_id: Some(target_id.into()),
        }
    }

    pub fn is_match(&self) -> bool {
        self.command.is_some()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    /// `(command, target_id)` when matched
    pub fn as_pair(&self) -> Option<(&str, &str)> {
        match (&self.command, &self.target_id) {
            (Some(command), Some(target_id)) => Some((command, target_id)),
            _ => None,
        }
    }
}

/// What a feedback call acknowledges
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Start,
    Stop,
    Command,
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackKind::Start => write!(f, "start"),
            FeedbackKind::Stop => write!(f, "stop"),
            FeedbackKind::Command => write!(f, "command"),
        }
    }
}
