//! Channel-fed speech recognition service
//!
//! Lets any external transcriber (or a plain text stream) act as the
//! live-speech platform: transcripts are pushed in and delivered to the
//! active session in the order they arrive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use smolitux_core::{RecognitionConfig, Result, SmolituxError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ServiceEvent, ServiceEventSink, SpeechRecognitionService};

#[derive(Clone, Default)]
pub struct ChannelSpeechService {
    inner: Arc<ChannelInner>,
}

#[derive(Default)]
struct ChannelInner {
    active: AtomicBool,
    sink: RwLock<Option<ServiceEventSink>>,
    config: RwLock<RecognitionConfig>,
}

impl ChannelInner {
    fn sink(&self) -> Option<ServiceEventSink> {
        match self.sink.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_sink(&self, sink: Option<ServiceEventSink>) -> Option<ServiceEventSink> {
        let mut slot = match self.sink.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, sink)
    }

    fn deliver(&self, event: ServiceEvent) -> bool {
        match self.sink() {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }
}

impl ChannelSpeechService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> RecognitionConfig {
        match self.inner.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Deliver a final transcript; dropped when no session is active
    pub fn push_transcript(&self, transcript: impl Into<String>) -> bool {
        self.push(ServiceEvent::Result {
            transcript: transcript.into(),
            is_final: true,
            confidence: None,
        })
    }

    /// Deliver a partial transcript (only when interim results are enabled)
    pub fn push_interim(&self, transcript: impl Into<String>) -> bool {
        if !self.config().interim_results {
            return false;
        }
        self.push(ServiceEvent::Result {
            transcript: transcript.into(),
            is_final: false,
            confidence: None,
        })
    }

    /// Report a service failure; the session ends
    pub fn push_error(&self, message: impl Into<String>) -> bool {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.inner.deliver(ServiceEvent::Error(message.into()))
    }

    fn push(&self, event: ServiceEvent) -> bool {
        if !self.is_active() {
            tracing::trace!("dropping transcript outside an active session");
            return false;
        }
        self.inner.deliver(event)
    }

    /// Forward every line received on `rx` as a final transcript
    pub fn spawn_feeder(&self, mut rx: mpsc::Receiver<String>) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                service.push_transcript(line);
            }
            tracing::debug!("transcript feed closed");
        })
    }
}

#[async_trait]
impl SpeechRecognitionService for ChannelSpeechService {
    fn configure(&self, config: &RecognitionConfig) {
        let mut slot = match self.inner.config.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = config.clone();
    }

    async fn start(&self, sink: ServiceEventSink) -> Result<()> {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Err(SmolituxError::Recognition(
                "recognition session already started".to_string(),
            ));
        }
        self.inner.set_sink(Some(sink));
        self.inner.deliver(ServiceEvent::Started);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if self.inner.active.swap(false, Ordering::SeqCst) {
            self.inner.deliver(ServiceEvent::Ended);
        }
        Ok(())
    }

    async fn abort(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.set_sink(None);
    }
}
