//! Platform seams
//!
//! Everything the subsystem needs from the host platform is expressed as a
//! trait here, so the engines, feedback and manager stay independent of any
//! UI framework or audio stack. Concrete implementations live in the
//! submodules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use smolitux_core::{RecognitionConfig, Result};

pub mod channel;
pub mod keyword_model;
pub mod speech_command;
pub mod template;
pub mod tone;

pub use channel::ChannelSpeechService;
pub use keyword_model::{
    AudioWindowSource, MicrophoneWindowSource, WindowAccumulator, WindowClassifier,
    WindowedKeywordModel,
};
pub use speech_command::CommandSpeechOutput;
pub use template::{TemplateClassifier, TemplateModel};
pub use tone::{CpalAudioContextFactory, CpalToneOutput};

/// Event delivered by a speech-recognition service
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// Audio capture began
    Started,
    /// A transcript; only final ones are dispatched
    Result {
        transcript: String,
        is_final: bool,
        confidence: Option<f32>,
    },
    /// The service failed mid-session
    Error(String),
    /// The session is over
    Ended,
}

pub type ServiceEventSink = Arc<dyn Fn(ServiceEvent) + Send + Sync>;

/// Continuous speech-to-text service
#[async_trait]
pub trait SpeechRecognitionService: Send + Sync {
    fn configure(&self, config: &RecognitionConfig);

    /// Begin a session; events flow into `sink` until `stop` or `abort`
    async fn start(&self, sink: ServiceEventSink) -> Result<()>;

    /// Finish the session; the service reports `Ended` through the sink
    async fn stop(&self) -> Result<()>;

    /// Stop immediately and detach the sink without further events
    async fn abort(&self);
}

/// Options for a keyword model's streaming mode
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenOptions {
    pub probability_threshold: f32,
    pub overlap_factor: f32,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            probability_threshold: smolitux_core::DEFAULT_PROBABILITY_THRESHOLD,
            overlap_factor: smolitux_core::DEFAULT_OVERLAP_FACTOR,
        }
    }
}

/// Per-window class scores, aligned with `word_labels()`
pub type ScoresCallback = Arc<dyn Fn(Vec<f32>) + Send + Sync>;

/// Locally loaded keyword classification model
#[async_trait]
pub trait KeywordModel: Send + Sync {
    /// Load weights once; later calls return immediately
    async fn ensure_loaded(&self) -> Result<()>;

    fn word_labels(&self) -> Vec<String>;

    /// Score rolling windows until `stop_listening`
    async fn listen(&self, options: ListenOptions, on_scores: ScoresCallback) -> Result<()>;

    async fn stop_listening(&self) -> Result<()>;

    fn is_listening(&self) -> bool;
}

/// One queued speech request
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub voice: Option<String>,
}

/// Platform text-to-speech queue
pub trait SpeechOutput: Send + Sync {
    /// Append to the queue without waiting for playback
    fn enqueue(&self, utterance: Utterance) -> Result<()>;

    /// Drop pending utterances and silence the current one
    fn cancel(&self);

    fn pause(&self);

    fn resume(&self);

    fn is_speaking(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn voices(&self) -> Vec<String>;
}

/// Acquired audio-output context
pub trait ToneOutput: Send + Sync {
    /// Start a short sine tone; returns before the tone finishes
    fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<()>;
}

/// Creates the audio context once the user has interacted
pub trait AudioContextFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn ToneOutput>>;
}

/// Caller-owned element that shows voice status
pub trait FeedbackSurface: Send + Sync {
    fn set_status(&self, text: &str, listening: bool) -> Result<()>;
}

/// Looks up feedback surfaces by their well-known id
pub trait SurfaceHost: Send + Sync {
    fn surface(&self, id: &str) -> Option<Arc<dyn FeedbackSurface>>;
}

/// Platform handles available to the manager; absent ones degrade
#[derive(Clone, Default)]
pub struct VoicePlatform {
    pub speech_recognition: Option<Arc<dyn SpeechRecognitionService>>,
    pub keyword_model: Option<Arc<dyn KeywordModel>>,
    pub speech_output: Option<Arc<dyn SpeechOutput>>,
    pub audio: Option<Arc<dyn AudioContextFactory>>,
    pub surfaces: Option<Arc<dyn SurfaceHost>>,
}

impl VoicePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe the host: default output device for tones and a system
    /// speech command for spoken feedback
    pub fn detect() -> Self {
        let speech_output = CommandSpeechOutput::detect()
            .map(|output| Arc::new(output) as Arc<dyn SpeechOutput>);
        if speech_output.is_none() {
            tracing::debug!("no system speech command found");
        }

        Self {
            speech_output,
            audio: Some(Arc::new(CpalAudioContextFactory::new())),
            ..Self::default()
        }
    }

    pub fn with_speech_recognition(mut self, service: Arc<dyn SpeechRecognitionService>) -> Self {
        self.speech_recognition = Some(service);
        self
    }

    pub fn with_keyword_model(mut self, model: Arc<dyn KeywordModel>) -> Self {
        self.keyword_model = Some(model);
        self
    }

    pub fn with_speech_output(mut self, output: Arc<dyn SpeechOutput>) -> Self {
        self.speech_output = Some(output);
        self
    }

    pub fn with_audio(mut self, factory: Arc<dyn AudioContextFactory>) -> Self {
        self.audio = Some(factory);
        self
    }

    pub fn with_surfaces(mut self, host: Arc<dyn SurfaceHost>) -> Self {
        self.surfaces = Some(host);
        self
    }
}
