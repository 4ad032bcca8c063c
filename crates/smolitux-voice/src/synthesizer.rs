//! Speech synthesizer - spoken acknowledgements over the platform TTS queue

use std::sync::{Arc, RwLock};

use smolitux_core::SpeechConfig;

use crate::platform::{SpeechOutput, Utterance};

/// Queues utterances with the configured voice parameters
///
/// Without a platform speech output every call is a logged no-op.
pub struct SpeechSynthesizer {
    config: RwLock<SpeechConfig>,
    output: Option<Arc<dyn SpeechOutput>>,
}

impl SpeechSynthesizer {
    pub fn new(config: SpeechConfig, output: Option<Arc<dyn SpeechOutput>>) -> Self {
        Self {
            config: RwLock::new(config.clamped()),
            output,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.output.is_some()
    }

    pub fn config(&self) -> SpeechConfig {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the voice parameters; out-of-range values are clamped
    pub fn set_config(&self, config: SpeechConfig) {
        let mut slot = match self.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = config.clamped();
    }

    pub fn set_voice(&self, voice: Option<String>) {
        let mut config = self.config();
        config.voice = voice;
        self.set_config(config);
    }

    /// Enqueue `text`; returns without waiting for playback
    pub fn speak(&self, text: &str) {
        let Some(output) = &self.output else {
            tracing::warn!("speech synthesis is not supported on this platform");
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        let config = self.config();
        let utterance = Utterance {
            text: text.to_string(),
            lang: config.lang,
            rate: config.rate,
            pitch: config.pitch,
            volume: config.volume,
            voice: config.voice,
        };
        if let Err(e) = output.enqueue(utterance) {
            tracing::warn!(error = %e, "failed to queue utterance");
        }
    }

    /// Drop pending and playing utterances; fine when idle
    pub fn cancel(&self) {
        if let Some(output) = &self.output {
            output.cancel();
        }
    }

    pub fn pause(&self) {
        if let Some(output) = &self.output {
            output.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(output) = &self.output {
            output.resume();
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.output.as_ref().is_some_and(|output| output.is_speaking())
    }

    pub fn is_paused(&self) -> bool {
        self.output.as_ref().is_some_and(|output| output.is_paused())
    }

    pub fn voices(&self) -> Vec<String> {
        self.output
            .as_ref()
            .map(|output| output.voices())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smolitux_core::Result;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct QueueRecorder {
        queued: Mutex<Vec<Utterance>>,
        paused: AtomicBool,
    }

    impl SpeechOutput for QueueRecorder {
        fn enqueue(&self, utterance: Utterance) -> Result<()> {
            self.queued.lock().unwrap().push(utterance);
            Ok(())
        }

        fn cancel(&self) {
            self.queued.lock().unwrap().clear();
        }

        fn pause(&self) {
            self.paused.store(true, Ordering::SeqCst);
        }

        fn resume(&self) {
            self.paused.store(false, Ordering::SeqCst);
        }

        fn is_speaking(&self) -> bool {
            !self.queued.lock().unwrap().is_empty()
        }

        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }

        fn voices(&self) -> Vec<String> {
            vec!["Anna".to_string()]
        }
    }

    #[test]
    fn test_speak_uses_clamped_config() {
        let output = Arc::new(QueueRecorder::default());
        let synth = SpeechSynthesizer::new(
            SpeechConfig {
                rate: 25.0,
                volume: -1.0,
                ..Default::default()
            },
            Some(output.clone()),
        );

        synth.speak("lights on");
        synth.speak("   ");
        synth.set_voice(Some("Anna".to_string()));
        synth.speak("lights off");

        let queued = output.queued.lock().unwrap().clone();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].rate, 10.0);
        assert_eq!(queued[0].volume, 0.0);
        assert_eq!(queued[0].voice, None);
        assert_eq!(queued[1].voice.as_deref(), Some("Anna"));
        assert!(synth.is_speaking());

        synth.cancel();
        synth.cancel();
        assert!(!synth.is_speaking());
    }

    #[test]
    fn test_pause_resume_passthrough() {
        let output = Arc::new(QueueRecorder::default());
        let synth = SpeechSynthesizer::new(SpeechConfig::default(), Some(output));
        synth.pause();
        assert!(synth.is_paused());
        synth.resume();
        assert!(!synth.is_paused());
        assert_eq!(synth.voices(), vec!["Anna"]);
    }

    #[test]
    fn test_unsupported_is_noop() {
        let synth = SpeechSynthesizer::new(SpeechConfig::default(), None);
        assert!(!synth.is_supported());
        synth.speak("hello");
        synth.cancel();
        synth.pause();
        assert!(!synth.is_speaking());
        assert!(synth.voices().is_empty());
    }
}
