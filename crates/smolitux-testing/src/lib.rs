//! Recording doubles for the voice platform seams

pub mod speech {
    use async_trait::async_trait;
    use smolitux_core::{RecognitionConfig, Result, SmolituxError};
    use smolitux_voice::platform::{ServiceEvent, ServiceEventSink, SpeechRecognitionService};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ServiceCalls {
        pub configure: u32,
        pub start: u32,
        pub stop: u32,
        pub abort: u32,
    }

    /// Speech service whose events are injected by the test
    #[derive(Clone, Default)]
    pub struct MockSpeechService {
        sink: Arc<Mutex<Option<ServiceEventSink>>>,
        calls: Arc<Mutex<ServiceCalls>>,
        should_fail: Arc<Mutex<bool>>,
        last_config: Arc<Mutex<Option<RecognitionConfig>>>,
    }

    impl MockSpeechService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_should_fail(&self, should_fail: bool) {
            *self.should_fail.lock().unwrap() = should_fail;
        }

        pub fn calls(&self) -> ServiceCalls {
            *self.calls.lock().unwrap()
        }

        pub fn last_config(&self) -> Option<RecognitionConfig> {
            self.last_config.lock().unwrap().clone()
        }

        pub fn is_attached(&self) -> bool {
            self.sink.lock().unwrap().is_some()
        }

        /// Deliver `event` to the attached sink; false when detached
        pub fn emit(&self, event: ServiceEvent) -> bool {
            let sink = self.sink.lock().unwrap().clone();
            match sink {
                Some(sink) => {
                    sink(event);
                    true
                }
                None => false,
            }
        }

        pub fn emit_transcript(&self, transcript: &str) -> bool {
            self.emit(ServiceEvent::Result {
                transcript: transcript.to_string(),
                is_final: true,
                confidence: Some(0.9),
            })
        }

        pub fn emit_interim(&self, transcript: &str) -> bool {
            self.emit(ServiceEvent::Result {
                transcript: transcript.to_string(),
                is_final: false,
                confidence: None,
            })
        }

        pub fn emit_error(&self, message: &str) -> bool {
            self.emit(ServiceEvent::Error(message.to_string()))
        }
    }

    #[async_trait]
    impl SpeechRecognitionService for MockSpeechService {
        fn configure(&self, config: &RecognitionConfig) {
            self.calls.lock().unwrap().configure += 1;
            *self.last_config.lock().unwrap() = Some(config.clone());
        }

        async fn start(&self, sink: ServiceEventSink) -> Result<()> {
            self.calls.lock().unwrap().start += 1;
            if *self.should_fail.lock().unwrap() {
                return Err(SmolituxError::Recognition("mock start failure".to_string()));
            }
            *self.sink.lock().unwrap() = Some(sink);
            self.emit(ServiceEvent::Started);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.calls.lock().unwrap().stop += 1;
            self.emit(ServiceEvent::Ended);
            Ok(())
        }

        async fn abort(&self) {
            self.calls.lock().unwrap().abort += 1;
            self.sink.lock().unwrap().take();
        }
    }
}

pub mod keyword {
    use async_trait::async_trait;
    use smolitux_core::{Result, SmolituxError};
    use smolitux_voice::platform::{KeywordModel, ListenOptions, ScoresCallback};
    use std::sync::{Arc, Mutex};

    /// Keyword model whose score windows are pushed by the test
    #[derive(Clone)]
    pub struct MockKeywordModel {
        labels: Arc<Vec<String>>,
        callback: Arc<Mutex<Option<ScoresCallback>>>,
        load_count: Arc<Mutex<u32>>,
        should_fail_load: Arc<Mutex<bool>>,
        last_options: Arc<Mutex<Option<ListenOptions>>>,
    }

    impl Default for MockKeywordModel {
        fn default() -> Self {
            Self::new(["_background_noise_", "_unknown_", "up", "down", "left", "right"])
        }
    }

    impl MockKeywordModel {
        pub fn new<I, S>(labels: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                labels: Arc::new(labels.into_iter().map(Into::into).collect()),
                callback: Arc::new(Mutex::new(None)),
                load_count: Arc::new(Mutex::new(0)),
                should_fail_load: Arc::new(Mutex::new(false)),
                last_options: Arc::new(Mutex::new(None)),
            }
        }

        pub fn set_should_fail_load(&self, should_fail: bool) {
            *self.should_fail_load.lock().unwrap() = should_fail;
        }

        pub fn load_count(&self) -> u32 {
            *self.load_count.lock().unwrap()
        }

        pub fn last_options(&self) -> Option<ListenOptions> {
            *self.last_options.lock().unwrap()
        }

        /// Push one window of scores; false when not listening
        pub fn emit_scores(&self, scores: &[f32]) -> bool {
            let callback = self.callback.lock().unwrap().clone();
            match callback {
                Some(callback) => {
                    callback(scores.to_vec());
                    true
                }
                None => false,
            }
        }

        /// Scores with `score` on `label` and the rest spread evenly
        pub fn scores_for(&self, label: &str, score: f32) -> Vec<f32> {
            let rest = if self.labels.len() > 1 {
                (1.0 - score) / (self.labels.len() - 1) as f32
            } else {
                0.0
            };
            self.labels
                .iter()
                .map(|l| if l == label { score } else { rest })
                .collect()
        }
    }

    #[async_trait]
    impl KeywordModel for MockKeywordModel {
        async fn ensure_loaded(&self) -> Result<()> {
            *self.load_count.lock().unwrap() += 1;
            if *self.should_fail_load.lock().unwrap() {
                return Err(SmolituxError::ModelLoad("mock weights missing".to_string()));
            }
            Ok(())
        }

        fn word_labels(&self) -> Vec<String> {
            self.labels.as_ref().clone()
        }

        async fn listen(&self, options: ListenOptions, on_scores: ScoresCallback) -> Result<()> {
            *self.last_options.lock().unwrap() = Some(options);
            *self.callback.lock().unwrap() = Some(on_scores);
            Ok(())
        }

        async fn stop_listening(&self) -> Result<()> {
            self.callback.lock().unwrap().take();
            Ok(())
        }

        fn is_listening(&self) -> bool {
            self.callback.lock().unwrap().is_some()
        }
    }
}

pub mod output {
    use smolitux_core::{Result, SmolituxError};
    use smolitux_voice::platform::{
        AudioContextFactory, FeedbackSurface, SpeechOutput, SurfaceHost, ToneOutput, Utterance,
    };
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Speech queue that records utterances instead of playing them
    #[derive(Clone, Default)]
    pub struct MockSpeechOutput {
        queued: Arc<Mutex<Vec<Utterance>>>,
        spoken: Arc<Mutex<Vec<Utterance>>>,
        cancel_count: Arc<Mutex<u32>>,
        paused: Arc<Mutex<bool>>,
    }

    impl MockSpeechOutput {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every utterance ever enqueued, in order
        pub fn spoken(&self) -> Vec<Utterance> {
            self.spoken.lock().unwrap().clone()
        }

        pub fn spoken_texts(&self) -> Vec<String> {
            self.spoken().into_iter().map(|u| u.text).collect()
        }

        /// Utterances not yet cancelled or finished
        pub fn pending(&self) -> usize {
            self.queued.lock().unwrap().len()
        }

        /// Mark the head of the queue as played
        pub fn finish_one(&self) -> Option<Utterance> {
            let mut queued = self.queued.lock().unwrap();
            if queued.is_empty() {
                None
            } else {
                Some(queued.remove(0))
            }
        }

        pub fn cancel_count(&self) -> u32 {
            *self.cancel_count.lock().unwrap()
        }
    }

    impl SpeechOutput for MockSpeechOutput {
        fn enqueue(&self, utterance: Utterance) -> Result<()> {
            self.spoken.lock().unwrap().push(utterance.clone());
            self.queued.lock().unwrap().push(utterance);
            Ok(())
        }

        fn cancel(&self) {
            *self.cancel_count.lock().unwrap() += 1;
            self.queued.lock().unwrap().clear();
            *self.paused.lock().unwrap() = false;
        }

        fn pause(&self) {
            *self.paused.lock().unwrap() = true;
        }

        fn resume(&self) {
            *self.paused.lock().unwrap() = false;
        }

        fn is_speaking(&self) -> bool {
            !self.queued.lock().unwrap().is_empty()
        }

        fn is_paused(&self) -> bool {
            *self.paused.lock().unwrap()
        }

        fn voices(&self) -> Vec<String> {
            vec!["mock-en".to_string(), "mock-de".to_string()]
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct PlayedTone {
        pub frequency_hz: f32,
        pub duration: Duration,
    }

    #[derive(Clone, Default)]
    struct MockToneOutput {
        tones: Arc<Mutex<Vec<PlayedTone>>>,
    }

    impl ToneOutput for MockToneOutput {
        fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<()> {
            self.tones.lock().unwrap().push(PlayedTone {
                frequency_hz,
                duration,
            });
            Ok(())
        }
    }

    /// Audio factory whose context records tones
    #[derive(Clone, Default)]
    pub struct MockAudioContextFactory {
        output: MockToneOutput,
        created: Arc<Mutex<u32>>,
        should_fail: Arc<Mutex<bool>>,
    }

    impl MockAudioContextFactory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_should_fail(&self, should_fail: bool) {
            *self.should_fail.lock().unwrap() = should_fail;
        }

        pub fn created(&self) -> u32 {
            *self.created.lock().unwrap()
        }

        pub fn tones(&self) -> Vec<PlayedTone> {
            self.output.tones.lock().unwrap().clone()
        }

        pub fn frequencies(&self) -> Vec<f32> {
            self.tones().into_iter().map(|t| t.frequency_hz).collect()
        }
    }

    impl AudioContextFactory for MockAudioContextFactory {
        fn create(&self) -> Result<Arc<dyn ToneOutput>> {
            if *self.should_fail.lock().unwrap() {
                return Err(SmolituxError::Audio("mock device busy".to_string()));
            }
            *self.created.lock().unwrap() += 1;
            Ok(Arc::new(self.output.clone()))
        }
    }

    /// Feedback surface that records status updates; also its own host
    #[derive(Clone)]
    pub struct MockSurface {
        id: String,
        statuses: Arc<Mutex<Vec<(String, bool)>>>,
    }

    impl Default for MockSurface {
        fn default() -> Self {
            Self::new(smolitux_core::DEFAULT_FEEDBACK_SURFACE_ID)
        }
    }

    impl MockSurface {
        pub fn new(id: impl Into<String>) -> Self {
            Self {
                id: id.into(),
                statuses: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn statuses(&self) -> Vec<(String, bool)> {
            self.statuses.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.statuses().into_iter().map(|(text, _)| text).collect()
        }
    }

    impl FeedbackSurface for MockSurface {
        fn set_status(&self, text: &str, listening: bool) -> Result<()> {
            self.statuses
                .lock()
                .unwrap()
                .push((text.to_string(), listening));
            Ok(())
        }
    }

    impl SurfaceHost for MockSurface {
        fn surface(&self, id: &str) -> Option<Arc<dyn FeedbackSurface>> {
            (id == self.id).then(|| Arc::new(self.clone()) as Arc<dyn FeedbackSurface>)
        }
    }
}

pub mod engine {
    use async_trait::async_trait;
    use smolitux_voice::engine::{EngineHandlers, RecognitionEngine};
    use smolitux_voice::events::{ResultHandler, StateHandler};
    use smolitux_voice::types::RecognitionResult;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct EngineCalls {
        pub start: u32,
        pub stop: u32,
        pub cleanup: u32,
    }

    /// Engine driven entirely by the test
    #[derive(Clone)]
    pub struct ScriptedEngine {
        name: &'static str,
        supported: bool,
        listening: Arc<Mutex<bool>>,
        calls: Arc<Mutex<EngineCalls>>,
        handlers: Arc<EngineHandlers>,
    }

    impl ScriptedEngine {
        pub fn new(name: &'static str, supported: bool) -> Self {
            Self {
                name,
                supported,
                listening: Arc::new(Mutex::new(false)),
                calls: Arc::new(Mutex::new(EngineCalls::default())),
                handlers: Arc::new(EngineHandlers::new()),
            }
        }

        pub fn supported() -> Self {
            Self::new("scripted", true)
        }

        pub fn unsupported() -> Self {
            Self::new("scripted", false)
        }

        pub fn calls(&self) -> EngineCalls {
            *self.calls.lock().unwrap()
        }

        pub fn emit(&self, result: RecognitionResult) {
            self.handlers.emit_result(result);
        }

        pub fn emit_text(&self, text: &str) {
            self.emit(RecognitionResult::Transcript(text.to_string()));
        }

        /// Drop to idle as if the backend failed mid-session
        pub fn fail(&self) {
            let was_listening = std::mem::replace(&mut *self.listening.lock().unwrap(), false);
            if was_listening {
                self.handlers.emit_state(false);
            }
        }
    }

    #[async_trait]
    impl RecognitionEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_supported(&self) -> bool {
            self.supported
        }

        async fn start(&self) {
            self.calls.lock().unwrap().start += 1;
            if !self.supported {
                return;
            }
            let was_listening = std::mem::replace(&mut *self.listening.lock().unwrap(), true);
            if !was_listening {
                self.handlers.emit_state(true);
            }
        }

        async fn stop(&self) {
            self.calls.lock().unwrap().stop += 1;
            let was_listening = std::mem::replace(&mut *self.listening.lock().unwrap(), false);
            if was_listening {
                self.handlers.emit_state(false);
            }
        }

        async fn cleanup(&self) {
            self.calls.lock().unwrap().cleanup += 1;
            *self.listening.lock().unwrap() = false;
            self.handlers.clear();
        }

        fn is_listening(&self) -> bool {
            *self.listening.lock().unwrap()
        }

        fn set_on_result(&self, handler: Option<Arc<ResultHandler>>) {
            self.handlers.set_on_result(handler);
        }

        fn set_on_state_change(&self, handler: Option<Arc<StateHandler>>) {
            self.handlers.set_on_state_change(handler);
        }
    }
}

pub mod logging {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Tracing layer that counts `WARN` events
    #[derive(Clone, Default)]
    pub struct WarningCounter {
        count: Arc<AtomicUsize>,
    }

    impl WarningCounter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }

        /// Install as this thread's default subscriber until the guard drops
        pub fn install(&self) -> tracing::subscriber::DefaultGuard {
            tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
        }

        /// Run `f` and return its result with the warnings it logged
        pub fn count_in<R>(f: impl FnOnce() -> R) -> (R, usize) {
            let counter = Self::new();
            let result = {
                let _guard = counter.install();
                f()
            };
            (result, counter.count())
        }
    }

    impl<S: Subscriber> Layer<S> for WarningCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

pub use engine::ScriptedEngine;
pub use keyword::MockKeywordModel;
pub use logging::WarningCounter;
pub use output::{MockAudioContextFactory, MockSpeechOutput, MockSurface};
pub use speech::MockSpeechService;

#[cfg(test)]
mod tests {
    use super::*;
    use smolitux_voice::platform::{KeywordModel, SpeechOutput, SurfaceHost};

    #[test]
    fn test_warning_counter() {
        let ((), warnings) = WarningCounter::count_in(|| {
            tracing::warn!("one");
            tracing::info!("ignored");
            tracing::warn!("two");
        });
        assert_eq!(warnings, 2);
    }

    #[test]
    fn test_surface_host_matches_id() {
        let surface = MockSurface::default();
        assert!(surface.surface("voice-feedback").is_some());
        assert!(surface.surface("other").is_none());
    }

    #[test]
    fn test_speech_output_records() {
        let output = MockSpeechOutput::new();
        output
            .enqueue(smolitux_voice::platform::Utterance {
                text: "hi".to_string(),
                lang: "en-US".to_string(),
                rate: 1.0,
                pitch: 1.0,
                volume: 1.0,
                voice: None,
            })
            .unwrap();
        assert!(output.is_speaking());
        output.cancel();
        assert!(!output.is_speaking());
        assert_eq!(output.spoken_texts(), vec!["hi"]);
    }

    #[tokio::test]
    async fn test_keyword_model_scores() {
        let model = MockKeywordModel::default();
        assert!(!model.emit_scores(&[1.0]));
        let scores = model.scores_for("up", 0.9);
        assert_eq!(scores.len(), 6);
        assert_eq!(scores[2], 0.9);

        model
            .listen(Default::default(), std::sync::Arc::new(|_: Vec<f32>| {}))
            .await
            .unwrap();
        assert!(model.is_listening());
        assert!(model.emit_scores(&scores));
    }
}
