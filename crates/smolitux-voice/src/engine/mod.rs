//! Recognition engines
//!
//! Both backends implement [`RecognitionEngine`]; the manager only ever sees
//! the trait object and never asks which backend it holds.

use std::sync::Arc;

use async_trait::async_trait;
use smolitux_core::{EngineKind, VoiceControlConfig};

use crate::events::{CallbackSlot, ResultHandler, StateHandler};
use crate::platform::{ListenOptions, VoicePlatform};
use crate::types::RecognitionResult;

pub mod keyword_spotting;
pub mod live_speech;

pub use keyword_spotting::KeywordSpottingEngine;
pub use live_speech::LiveSpeechEngine;

/// Recognition backend
///
/// `start` and `stop` are idempotent and never fail: runtime problems are
/// logged and reported as `on_state_change(false)`. `cleanup` detaches
/// every platform listener and may be called any number of times.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Diagnostic name
    fn name(&self) -> &'static str;

    fn is_supported(&self) -> bool;

    async fn start(&self);

    async fn stop(&self);

    async fn cleanup(&self);

    fn is_listening(&self) -> bool;

    fn set_on_result(&self, handler: Option<Arc<ResultHandler>>);

    fn set_on_state_change(&self, handler: Option<Arc<StateHandler>>);
}

/// The two callback slots every engine exposes
#[derive(Default)]
pub struct EngineHandlers {
    on_result: CallbackSlot<ResultHandler>,
    on_state_change: CallbackSlot<StateHandler>,
}

impl EngineHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_result(&self, handler: Option<Arc<ResultHandler>>) {
        self.on_result.set(handler);
    }

    pub fn set_on_state_change(&self, handler: Option<Arc<StateHandler>>) {
        self.on_state_change.set(handler);
    }

    pub fn emit_result(&self, result: RecognitionResult) {
        if let Some(handler) = self.on_result.get() {
            handler(result);
        }
    }

    pub fn emit_state(&self, is_listening: bool) {
        if let Some(handler) = self.on_state_change.get() {
            handler(is_listening);
        }
    }

    pub fn clear(&self) {
        self.on_result.clear();
        self.on_state_change.clear();
    }
}

/// Build the backend for `kind` from the platform handles
///
/// The returned engine may report `is_supported() == false`; choosing a
/// fallback is up to the caller.
pub fn create_engine(
    kind: EngineKind,
    config: &VoiceControlConfig,
    platform: &VoicePlatform,
) -> Box<dyn RecognitionEngine> {
    match kind {
        EngineKind::LiveSpeech => Box::new(LiveSpeechEngine::new(
            platform.speech_recognition.clone(),
            config.recognition.clone(),
        )),
        EngineKind::KeywordSpotting => Box::new(KeywordSpottingEngine::new(
            platform.keyword_model.clone(),
            ListenOptions {
                probability_threshold: config.keyword.probability_threshold,
                overlap_factor: config.keyword.overlap_factor,
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ChannelSpeechService;
    use std::sync::Mutex;

    #[test]
    fn test_create_engine_by_kind() {
        let config = VoiceControlConfig::default();
        let platform = VoicePlatform::new();

        let live = create_engine(EngineKind::LiveSpeech, &config, &platform);
        assert_eq!(live.name(), "live_speech");
        assert!(!live.is_supported());

        let keyword = create_engine(EngineKind::KeywordSpotting, &config, &platform);
        assert_eq!(keyword.name(), "keyword_spotting");
        assert!(keyword.is_supported());

        let platform =
            VoicePlatform::new().with_speech_recognition(Arc::new(ChannelSpeechService::new()));
        assert!(create_engine(EngineKind::LiveSpeech, &config, &platform).is_supported());
    }

    #[test]
    fn test_handlers_emit_and_clear() {
        let handlers = EngineHandlers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        handlers.emit_state(true);
        let captured = seen.clone();
        handlers.set_on_state_change(Some(Arc::new(move |flag: bool| {
            captured.lock().unwrap().push(flag)
        })));
        handlers.emit_state(true);
        handlers.clear();
        handlers.emit_state(false);

        assert_eq!(*seen.lock().unwrap(), vec![true]);
    }
}
