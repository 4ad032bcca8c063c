//! Voice control manager - owns the engine, registry and feedback
//!
//! The manager is an explicitly constructed object; the composition root
//! decides how to share it. Engine callbacks hold only a weak reference, so
//! dropping the manager releases everything even without `cleanup`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use smolitux_core::{EngineKind, Result, SmolituxError, VoiceControlConfig};

use crate::engine::{LiveSpeechEngine, RecognitionEngine, create_engine};
use crate::events::{CallbackSlot, CommandHandler, ListeningHandler, RecognitionHandler};
use crate::feedback::FeedbackManager;
use crate::platform::VoicePlatform;
use crate::processor::CommandProcessor;
use crate::registry::CommandRegistry;
use crate::synthesizer::SpeechSynthesizer;
use crate::types::{FeedbackKind, ListeningState, MatchOutcome, RecognitionResult};

pub struct VoiceControlManager {
    shared: Arc<Shared>,
}

struct Shared {
    engine: Box<dyn RecognitionEngine>,
    processor: CommandProcessor,
    feedback: FeedbackManager,
    registry: RwLock<CommandRegistry>,
    listening: AtomicBool,
    disposed: AtomicBool,
    on_command_recognized: CallbackSlot<CommandHandler>,
    on_recognition_result: CallbackSlot<RecognitionHandler>,
    on_listening_state_changed: CallbackSlot<ListeningHandler>,
}

impl Shared {
    fn registry(&self) -> RwLockReadGuard<'_, CommandRegistry> {
        match self.registry.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, CommandRegistry> {
        match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn handle_result(&self, result: RecognitionResult) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let text = result.text();

        if let Some(handler) = self.on_recognition_result.get() {
            handler(text);
        }

        // the lock is released before any caller code runs
        let outcome = self.processor.process_command(text, &self.registry());
        let Some((command, target_id)) = outcome.as_pair() else {
            tracing::trace!(text, "no command matched");
            return;
        };

        tracing::info!(command, target_id, "voice command recognized");
        if let Some(handler) = self.on_command_recognized.get() {
            handler(command, target_id);
        }
        self.feedback
            .provide_feedback(FeedbackKind::Command, Some(command));
    }

    fn handle_state_change(&self, is_listening: bool) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.listening.store(is_listening, Ordering::SeqCst);
        tracing::debug!(
            state = %ListeningState::from_flag(is_listening),
            "listening state changed"
        );
        if let Some(handler) = self.on_listening_state_changed.get() {
            handler(is_listening);
        }
    }
}

impl VoiceControlManager {
    /// Build the manager with the engine selected in `config`
    pub fn new(config: VoiceControlConfig, platform: VoicePlatform) -> Self {
        let engine = create_engine(config.engine, &config, &platform);
        Self::with_engine(engine, config, platform)
    }

    /// Build the manager around a caller-supplied engine
    ///
    /// An unsupported engine is replaced by the live-speech engine and a
    /// warning is logged. An unsupported live-speech engine is kept, since
    /// there is nothing to fall back to.
    pub fn with_engine(
        engine: Box<dyn RecognitionEngine>,
        config: VoiceControlConfig,
        platform: VoicePlatform,
    ) -> Self {
        let engine = if engine.is_supported() {
            engine
        } else if engine.name() == LiveSpeechEngine::NAME {
            tracing::warn!("live speech recognition is unavailable on this platform");
            engine
        } else {
            tracing::warn!(
                requested = engine.name(),
                "recognition engine not supported, falling back to live speech"
            );
            create_engine(EngineKind::LiveSpeech, &config, &platform)
        };

        let synthesizer = Arc::new(SpeechSynthesizer::new(
            config.speech.clone(),
            platform.speech_output.clone(),
        ));
        let feedback = FeedbackManager::new(
            config.feedback.clone(),
            synthesizer,
            platform.surfaces.clone(),
            platform.audio.clone(),
        );

        let shared = Arc::new(Shared {
            engine,
            processor: CommandProcessor::new(),
            feedback,
            registry: RwLock::new(CommandRegistry::new()),
            listening: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            on_command_recognized: CallbackSlot::new(),
            on_recognition_result: CallbackSlot::new(),
            on_listening_state_changed: CallbackSlot::new(),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.engine.set_on_result(Some(Arc::new(move |result| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_result(result);
            }
        })));
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.engine.set_on_state_change(Some(Arc::new(move |is_listening| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_state_change(is_listening);
            }
        })));

        tracing::info!(engine = shared.engine.name(), "voice control ready");
        Self { shared }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return Err(SmolituxError::Disposed);
        }
        Ok(())
    }

    /// Start the engine and acknowledge the request
    ///
    /// Start feedback is given even when the engine cannot begin listening.
    pub async fn start_listening(&self) -> Result<()> {
        self.ensure_active()?;
        self.shared.engine.start().await;
        self.shared
            .feedback
            .provide_feedback(FeedbackKind::Start, None);
        Ok(())
    }

    pub async fn stop_listening(&self) -> Result<()> {
        self.ensure_active()?;
        self.shared.engine.stop().await;
        self.shared
            .feedback
            .provide_feedback(FeedbackKind::Stop, None);
        Ok(())
    }

    /// Stop when listening, start otherwise; returns the new flag
    pub async fn toggle_listening(&self) -> Result<bool> {
        if self.is_listening() {
            self.stop_listening().await?;
        } else {
            self.start_listening().await?;
        }
        Ok(self.is_listening())
    }

    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    pub fn listening_state(&self) -> ListeningState {
        ListeningState::from_flag(self.is_listening())
    }

    /// Insert or replace the commands of `target_id`
    pub fn register_component<I, S>(&self, target_id: impl Into<String>, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let target_id = target_id.into();
        let replaced = self
            .shared
            .registry_mut()
            .register(target_id.clone(), commands)
            .is_some();
        tracing::debug!(target_id = %target_id, replaced, "component registered");
    }

    /// Returns whether `target_id` was registered
    pub fn unregister_component(&self, target_id: &str) -> bool {
        let removed = self.shared.registry_mut().unregister(target_id).is_some();
        tracing::debug!(target_id, removed, "component unregistered");
        removed
    }

    pub fn registry_snapshot(&self) -> CommandRegistry {
        self.shared.registry().clone()
    }

    /// Match `text` against the current registry without dispatching
    pub fn match_text(&self, text: &str) -> MatchOutcome {
        self.shared
            .processor
            .process_command(text, &self.shared.registry())
    }

    pub fn registered_targets(&self) -> Vec<String> {
        self.shared.registry().targets()
    }

    pub fn commands_for(&self, target_id: &str) -> Option<Vec<String>> {
        self.shared.registry().get(target_id).map(<[String]>::to_vec)
    }

    /// Name of the effective engine, for diagnostics
    pub fn engine_name(&self) -> &'static str {
        self.shared.engine.name()
    }

    pub fn engine_supported(&self) -> bool {
        self.shared.engine.is_supported()
    }

    pub fn synthesizer(&self) -> &Arc<SpeechSynthesizer> {
        self.shared.feedback.synthesizer()
    }

    /// Signal a user gesture so tone feedback may acquire audio output
    pub fn notify_user_interaction(&self) -> bool {
        self.shared.feedback.ensure_audio_context(true)
    }

    pub fn set_on_command_recognized<F>(&self, handler: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.shared
            .on_command_recognized
            .set(Some(Arc::new(handler)));
    }

    pub fn set_on_recognition_result<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared
            .on_recognition_result
            .set(Some(Arc::new(handler)));
    }

    pub fn set_on_listening_state_changed<F>(&self, handler: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared
            .on_listening_state_changed
            .set(Some(Arc::new(handler)));
    }

    pub fn clear_handlers(&self) {
        self.shared.on_command_recognized.clear();
        self.shared.on_recognition_result.clear();
        self.shared.on_listening_state_changed.clear();
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Release the engine, listeners and registry
    ///
    /// Listening cannot be started again afterwards. Repeated calls are
    /// no-ops.
    pub async fn cleanup(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.engine.cleanup().await;
        self.clear_handlers();
        self.shared.registry_mut().clear();
        self.shared.listening.store(false, Ordering::SeqCst);
        self.synthesizer().cancel();
        tracing::info!("voice control cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ChannelSpeechService;
    use std::sync::Mutex;

    fn live_manager() -> (VoiceControlManager, ChannelSpeechService) {
        let service = ChannelSpeechService::new();
        let platform = VoicePlatform::new().with_speech_recognition(Arc::new(service.clone()));
        (
            VoiceControlManager::new(VoiceControlConfig::default(), platform),
            service,
        )
    }

    #[tokio::test]
    async fn test_dispatches_matched_command() {
        let (manager, service) = live_manager();
        manager.register_component("lamp", ["lights on", "lights off"]);

        let commands = Arc::new(Mutex::new(Vec::new()));
        let captured = commands.clone();
        manager.set_on_command_recognized(move |command, target_id| {
            captured
                .lock()
                .unwrap()
                .push((command.to_string(), target_id.to_string()))
        });
        let raw = Arc::new(Mutex::new(Vec::new()));
        let captured = raw.clone();
        manager.set_on_recognition_result(move |text| {
            captured.lock().unwrap().push(text.to_string())
        });

        manager.start_listening().await.unwrap();
        assert!(manager.is_listening());
        service.push_transcript("turn the lights on please");
        service.push_transcript("something else");

        assert_eq!(
            *commands.lock().unwrap(),
            vec![("lights on".to_string(), "lamp".to_string())]
        );
        assert_eq!(
            *raw.lock().unwrap(),
            vec!["turn the lights on please", "something else"]
        );
    }

    #[tokio::test]
    async fn test_listening_state_callbacks() {
        let (manager, _service) = live_manager();
        let states = Arc::new(Mutex::new(Vec::new()));
        let captured = states.clone();
        manager.set_on_listening_state_changed(move |flag| captured.lock().unwrap().push(flag));

        assert!(manager.toggle_listening().await.unwrap());
        assert_eq!(manager.listening_state(), ListeningState::Listening);
        assert!(!manager.toggle_listening().await.unwrap());

        assert_eq!(*states.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_registry_visibility() {
        let manager = VoiceControlManager::new(VoiceControlConfig::default(), VoicePlatform::new());
        manager.register_component("btn1", ["submit"]);
        assert_eq!(
            manager.match_text("please submit").as_pair(),
            Some(("submit", "btn1"))
        );
        assert_eq!(manager.commands_for("btn1"), Some(vec!["submit".to_string()]));

        assert!(manager.unregister_component("btn1"));
        assert!(!manager.match_text("please submit").is_match());
        assert!(manager.registered_targets().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_disables_listening() {
        let (manager, service) = live_manager();
        manager.register_component("lamp", ["lights on"]);
        manager.start_listening().await.unwrap();

        manager.cleanup().await;
        manager.cleanup().await;

        assert!(manager.is_cleaned_up());
        assert!(!manager.is_listening());
        assert!(manager.registered_targets().is_empty());
        assert!(!service.push_transcript("lights on"));
        assert!(matches!(
            manager.start_listening().await,
            Err(SmolituxError::Disposed)
        ));
        assert!(matches!(
            manager.stop_listening().await,
            Err(SmolituxError::Disposed)
        ));
    }

    #[tokio::test]
    async fn test_dropping_manager_releases_engine_handlers() {
        let (manager, service) = live_manager();
        manager.start_listening().await.unwrap();
        drop(manager);
        // the service still holds the engine sink; delivery is a no-op
        assert!(service.push_transcript("lights on"));
    }
}
