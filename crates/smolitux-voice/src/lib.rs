//! Smolitux Voice - voice command recognition and dispatch
//!
//! Turns spoken transcripts or keyword-model labels into routed commands
//! for registered targets, and acknowledges them on the visual, tone and
//! speech feedback channels.
//!
//! ## Components
//! - Recognition engines: live speech and keyword spotting
//! - Command processor: first-match substring matching
//! - Feedback manager and speech synthesizer
//! - Voice control manager: the listening state machine and registry
//!
//! Host capabilities are reached through the traits in [`platform`].

pub mod engine;
pub mod events;
pub mod feedback;
pub mod manager;
pub mod platform;
pub mod processor;
pub mod registry;
pub mod synthesizer;
pub mod types;

pub use engine::{
    EngineHandlers, KeywordSpottingEngine, LiveSpeechEngine, RecognitionEngine, create_engine,
};
pub use events::*;
pub use feedback::FeedbackManager;
pub use manager::VoiceControlManager;
pub use platform::VoicePlatform;
pub use processor::CommandProcessor;
pub use registry::CommandRegistry;
pub use synthesizer::SpeechSynthesizer;
pub use types::*;
