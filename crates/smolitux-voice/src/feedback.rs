//! Multi-channel feedback: visual surface, tone and speech
//!
//! Each channel is attempted independently on every call. A channel that is
//! disabled, unavailable or failing is skipped without affecting the others,
//! and nothing here waits for playback.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use smolitux_core::FeedbackConfig;

use crate::platform::{AudioContextFactory, SurfaceHost, ToneOutput};
use crate::synthesizer::SpeechSynthesizer;
use crate::types::FeedbackKind;

pub struct FeedbackManager {
    config: FeedbackConfig,
    synthesizer: Arc<SpeechSynthesizer>,
    surfaces: Option<Arc<dyn SurfaceHost>>,
    audio_factory: Option<Arc<dyn AudioContextFactory>>,
    audio: Mutex<Option<Arc<dyn ToneOutput>>>,
}

impl FeedbackManager {
    pub fn new(
        config: FeedbackConfig,
        synthesizer: Arc<SpeechSynthesizer>,
        surfaces: Option<Arc<dyn SurfaceHost>>,
        audio_factory: Option<Arc<dyn AudioContextFactory>>,
    ) -> Self {
        Self {
            config,
            synthesizer,
            surfaces,
            audio_factory,
            audio: Mutex::new(None),
        }
    }

    pub fn synthesizer(&self) -> &Arc<SpeechSynthesizer> {
        &self.synthesizer
    }

    fn audio(&self) -> MutexGuard<'_, Option<Arc<dyn ToneOutput>>> {
        match self.audio.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Acquire the audio context once the user has interacted
    ///
    /// The context is created at most once and reused afterwards. Returns
    /// whether a context is available.
    pub fn ensure_audio_context(&self, user_has_interacted: bool) -> bool {
        let mut audio = self.audio();
        if audio.is_some() {
            return true;
        }
        if !user_has_interacted {
            return false;
        }
        let Some(factory) = &self.audio_factory else {
            return false;
        };

        match factory.create() {
            Ok(output) => {
                tracing::debug!("audio feedback context created");
                *audio = Some(output);
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "audio feedback unavailable");
                false
            }
        }
    }

    pub fn has_audio_context(&self) -> bool {
        self.audio().is_some()
    }

    /// Acknowledge `kind` on every enabled channel
    pub fn provide_feedback(&self, kind: FeedbackKind, command_text: Option<&str>) {
        tracing::trace!(%kind, command = ?command_text, "feedback");
        self.show(kind, command_text);
        self.beep(kind);
        self.announce(kind, command_text);
    }

    fn show(&self, kind: FeedbackKind, command_text: Option<&str>) {
        if !self.config.visual {
            return;
        }
        let Some(surface) = self
            .surfaces
            .as_ref()
            .and_then(|host| host.surface(&self.config.surface_id))
        else {
            return;
        };

        let listening = !matches!(kind, FeedbackKind::Stop);
        if let Err(e) = surface.set_status(&status_text(kind, command_text), listening) {
            tracing::debug!(error = %e, "feedback surface update failed");
        }
    }

    fn beep(&self, kind: FeedbackKind) {
        if !self.config.audio {
            return;
        }
        let Some(output) = self.audio().clone() else {
            return;
        };

        let duration = Duration::from_millis(self.config.tone_duration_ms);
        if let Err(e) = output.play_tone(tone_frequency(&self.config, kind), duration) {
            tracing::debug!(error = %e, "feedback tone failed");
        }
    }

    fn announce(&self, kind: FeedbackKind, command_text: Option<&str>) {
        if !self.config.speech || kind != FeedbackKind::Command {
            return;
        }
        if let Some(text) = command_text.filter(|t| !t.trim().is_empty()) {
            self.synthesizer.speak(text);
        }
    }
}

/// Status line written to the feedback surface
pub fn status_text(kind: FeedbackKind, command_text: Option<&str>) -> String {
    match (kind, command_text) {
        (FeedbackKind::Start, _) => "Listening...".to_string(),
        (FeedbackKind::Stop, _) => "Voice control off".to_string(),
        (FeedbackKind::Command, Some(text)) if !text.trim().is_empty() => {
            format!("Command: {text}")
        }
        (FeedbackKind::Command, _) => "Command recognized".to_string(),
    }
}

pub fn tone_frequency(config: &FeedbackConfig, kind: FeedbackKind) -> f32 {
    match kind {
        FeedbackKind::Start => config.start_hz,
        FeedbackKind::Stop => config.stop_hz,
        FeedbackKind::Command => config.command_hz,
    }
}
