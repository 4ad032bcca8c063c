//! Live-speech engine - continuous transcription through a platform service

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use smolitux_core::RecognitionConfig;

use super::{EngineHandlers, RecognitionEngine};
use crate::events::{ResultHandler, StateHandler};
use crate::platform::{ServiceEvent, ServiceEventSink, SpeechRecognitionService};
use crate::types::RecognitionResult;

pub struct LiveSpeechEngine {
    service: Option<Arc<dyn SpeechRecognitionService>>,
    config: RecognitionConfig,
    state: Arc<LiveState>,
}

#[derive(Default)]
struct LiveState {
    listening: AtomicBool,
    disposed: AtomicBool,
    handlers: EngineHandlers,
}

impl LiveState {
    /// Resolve to idle, notifying only on an actual transition
    fn go_idle(&self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            self.handlers.emit_state(false);
        }
    }

    fn handle(&self, event: ServiceEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        match event {
            ServiceEvent::Started => {
                tracing::debug!("speech recognition started");
                self.listening.store(true, Ordering::SeqCst);
                self.handlers.emit_state(true);
            }
            ServiceEvent::Result {
                transcript,
                is_final,
                confidence,
            } => {
                if !is_final {
                    tracing::trace!(%transcript, "interim transcript");
                    return;
                }
                if transcript.trim().is_empty() {
                    return;
                }
                tracing::debug!(%transcript, ?confidence, "transcript received");
                self.handlers
                    .emit_result(RecognitionResult::Transcript(transcript));
            }
            ServiceEvent::Error(message) => {
                tracing::warn!(error = %message, "speech recognition error");
                self.go_idle();
            }
            ServiceEvent::Ended => {
                tracing::debug!("speech recognition ended");
                self.go_idle();
            }
        }
    }
}

impl LiveSpeechEngine {
    pub const NAME: &'static str = "live_speech";

    /// `None` means the platform has no recognition service
    pub fn new(
        service: Option<Arc<dyn SpeechRecognitionService>>,
        config: RecognitionConfig,
    ) -> Self {
        if service.is_none() {
            tracing::debug!("no speech recognition service available");
        }
        Self {
            service,
            config,
            state: Arc::new(LiveState::default()),
        }
    }

    fn sink(&self) -> ServiceEventSink {
        let state = self.state.clone();
        Arc::new(move |event| state.handle(event))
    }
}

#[async_trait]
impl RecognitionEngine for LiveSpeechEngine {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_supported(&self) -> bool {
        self.service.is_some()
    }

    async fn start(&self) {
        let Some(service) = &self.service else {
            tracing::warn!("speech recognition is not supported on this platform");
            return;
        };
        if self.state.disposed.load(Ordering::SeqCst) {
            tracing::debug!("ignoring start after cleanup");
            return;
        }
        if self
            .state
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        service.configure(&self.config);
        if let Err(e) = service.start(self.sink()).await {
            tracing::warn!(error = %e, "failed to start speech recognition");
            self.state.go_idle();
        }
    }

    async fn stop(&self) {
        let Some(service) = &self.service else {
            return;
        };
        if !self.state.listening.load(Ordering::SeqCst) {
            return;
        }

        if let Err(e) = service.stop().await {
            tracing::warn!(error = %e, "failed to stop speech recognition");
        }
        // services that never report Ended still resolve to idle
        self.state.go_idle();
    }

    async fn cleanup(&self) {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(service) = &self.service {
            service.abort().await;
        }
        self.state.listening.store(false, Ordering::SeqCst);
        self.state.handlers.clear();
    }

    fn is_listening(&self) -> bool {
        self.state.listening.load(Ordering::SeqCst)
    }

    fn set_on_result(&self, handler: Option<Arc<ResultHandler>>) {
        self.state.handlers.set_on_result(handler);
    }

    fn set_on_state_change(&self, handler: Option<Arc<StateHandler>>) {
        self.state.handlers.set_on_state_change(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ChannelSpeechService;
    use smolitux_core::{Result, SmolituxError};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn engine_with(service: Arc<dyn SpeechRecognitionService>) -> (LiveSpeechEngine, Log) {
        let engine = LiveSpeechEngine::new(Some(service), RecognitionConfig::default());
        let log: Log = Arc::new(Mutex::new(Vec::new()));

        let captured = log.clone();
        engine.set_on_result(Some(Arc::new(move |result: RecognitionResult| {
            captured.lock().unwrap().push(format!("result:{}", result.text()))
        })));
        let captured = log.clone();
        engine.set_on_state_change(Some(Arc::new(move |flag: bool| {
            captured.lock().unwrap().push(format!("state:{flag}"))
        })));
        (engine, log)
    }

    #[tokio::test]
    async fn test_start_emit_stop() {
        let service = ChannelSpeechService::new();
        let (engine, log) = engine_with(Arc::new(service.clone()));

        engine.start().await;
        engine.start().await;
        assert!(engine.is_listening());

        service.push_transcript("turn the lights on");
        service.push_transcript("   ");
        engine.stop().await;
        engine.stop().await;

        assert!(!engine.is_listening());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["state:true", "result:turn the lights on", "state:false"]
        );
    }

    #[tokio::test]
    async fn test_interim_results_ignored() {
        let service = ChannelSpeechService::new();
        let engine = LiveSpeechEngine::new(
            Some(Arc::new(service.clone())),
            RecognitionConfig {
                interim_results: true,
                ..Default::default()
            },
        );
        let results = Arc::new(Mutex::new(Vec::new()));
        let captured = results.clone();
        engine.set_on_result(Some(Arc::new(move |result: RecognitionResult| {
            captured.lock().unwrap().push(result)
        })));

        engine.start().await;
        assert!(service.config().interim_results);
        assert!(service.push_interim("lig"));
        assert!(service.push_transcript("lights on"));

        assert_eq!(
            *results.lock().unwrap(),
            vec![RecognitionResult::Transcript("lights on".to_string())]
        );
    }

    #[tokio::test]
    async fn test_service_error_resolves_idle() {
        let service = ChannelSpeechService::new();
        let (engine, log) = engine_with(Arc::new(service.clone()));

        engine.start().await;
        service.push_error("network");
        assert!(!engine.is_listening());
        assert_eq!(*log.lock().unwrap(), vec!["state:true", "state:false"]);

        // recoverable by starting again
        engine.start().await;
        assert!(engine.is_listening());
    }

    struct FailingService;

    #[async_trait]
    impl SpeechRecognitionService for FailingService {
        fn configure(&self, _: &RecognitionConfig) {}

        async fn start(&self, _: ServiceEventSink) -> Result<()> {
            Err(SmolituxError::Recognition("microphone denied".to_string()))
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn abort(&self) {}
    }

    #[tokio::test]
    async fn test_start_failure_resolves_idle() {
        let (engine, log) = engine_with(Arc::new(FailingService));
        engine.start().await;

        assert!(!engine.is_listening());
        assert_eq!(*log.lock().unwrap(), vec!["state:false"]);
    }

    #[tokio::test]
    async fn test_unsupported_is_inert() {
        let engine = LiveSpeechEngine::new(None, RecognitionConfig::default());
        assert!(!engine.is_supported());
        engine.start().await;
        engine.stop().await;
        engine.cleanup().await;
        assert!(!engine.is_listening());
    }

    #[tokio::test]
    async fn test_cleanup_detaches() {
        let service = ChannelSpeechService::new();
        let (engine, log) = engine_with(Arc::new(service.clone()));

        engine.start().await;
        engine.cleanup().await;
        engine.cleanup().await;
        assert!(!service.push_transcript("lights on"));

        engine.start().await;
        assert!(!engine.is_listening());
        assert_eq!(*log.lock().unwrap(), vec!["state:true"]);
    }
}
