//! Keyword model over rolling audio windows
//!
//! A [`WindowClassifier`] scores fixed-size windows of mono samples and an
//! [`AudioWindowSource`] produces those windows, overlapping by the
//! configured factor. [`WindowedKeywordModel`] ties the two together behind
//! the [`KeywordModel`] seam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use smolitux_core::{Result, SmolituxError};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;

use super::{KeywordModel, ListenOptions, ScoresCallback};

/// Windows buffered between the audio thread and the scoring task
const WINDOW_QUEUE_DEPTH: usize = 16;

/// Scores windows of mono audio
pub trait WindowClassifier: Send + Sync {
    /// Load weights; blocking, called once from a worker thread
    fn load(&self) -> Result<()>;

    fn labels(&self) -> Vec<String>;

    /// Samples per window
    fn window_size(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// One score per label
    fn classify(&self, window: &[f32]) -> Result<Vec<f32>>;
}

/// Produces overlapping windows of mono samples
pub trait AudioWindowSource: Send + Sync {
    /// Start capturing; consecutive windows start `hop` samples apart
    fn open(
        &self,
        sample_rate: u32,
        window_size: usize,
        hop: usize,
    ) -> Result<mpsc::Receiver<Vec<f32>>>;

    fn close(&self);
}

/// Cuts a sample stream into overlapping windows
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    window_size: usize,
    hop: usize,
    buffer: Vec<f32>,
}

impl WindowAccumulator {
    pub fn new(window_size: usize, hop: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            hop: hop.clamp(1, window_size),
            buffer: Vec::with_capacity(window_size * 2),
        }
    }

    /// Hop for a window size and overlap factor, never zero
    pub fn hop_for(window_size: usize, overlap_factor: f32) -> usize {
        let overlap = overlap_factor.clamp(0.0, 1.0);
        ((window_size as f32 * (1.0 - overlap)).round() as usize).max(1)
    }

    /// Append samples; returns every window completed by them
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.buffer.extend_from_slice(samples);

        let mut windows = Vec::new();
        while self.buffer.len() >= self.window_size {
            windows.push(self.buffer[..self.window_size].to_vec());
            self.buffer.drain(..self.hop);
        }
        windows
    }
}

/// [`KeywordModel`] built from a classifier and a window source
pub struct WindowedKeywordModel {
    classifier: Arc<dyn WindowClassifier>,
    source: Arc<dyn AudioWindowSource>,
    loaded: OnceCell<()>,
    listening: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WindowedKeywordModel {
    pub fn new(classifier: Arc<dyn WindowClassifier>, source: Arc<dyn AudioWindowSource>) -> Self {
        Self {
            classifier,
            source,
            loaded: OnceCell::new(),
            listening: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Classifier fed from the default input device
    pub fn with_microphone(classifier: Arc<dyn WindowClassifier>) -> Self {
        Self::new(classifier, Arc::new(MicrophoneWindowSource::new()))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    fn replace_task(&self, task: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        let mut slot = match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, task)
    }
}

#[async_trait]
impl KeywordModel for WindowedKeywordModel {
    async fn ensure_loaded(&self) -> Result<()> {
        self.loaded
            .get_or_try_init(|| async {
                let classifier = self.classifier.clone();
                tokio::task::spawn_blocking(move || classifier.load())
                    .await
                    .map_err(|e| SmolituxError::ModelLoad(format!("loader task failed: {e}")))??;
                tracing::info!(labels = self.classifier.labels().len(), "keyword model loaded");
                Ok::<(), SmolituxError>(())
            })
            .await?;
        Ok(())
    }

    fn word_labels(&self) -> Vec<String> {
        self.classifier.labels()
    }

    async fn listen(&self, options: ListenOptions, on_scores: ScoresCallback) -> Result<()> {
        self.ensure_loaded().await?;
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(SmolituxError::Recognition(
                "keyword model is already listening".to_string(),
            ));
        }

        let window_size = self.classifier.window_size();
        let hop = WindowAccumulator::hop_for(window_size, options.overlap_factor);
        let mut windows = match self
            .source
            .open(self.classifier.sample_rate(), window_size, hop)
        {
            Ok(rx) => rx,
            Err(e) => {
                self.listening.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        tracing::debug!(window_size, hop, "keyword scoring started");

        let classifier = self.classifier.clone();
        let listening = self.listening.clone();
        let threshold = options.probability_threshold;
        let task = tokio::spawn(async move {
            while let Some(window) = windows.recv().await {
                if !listening.load(Ordering::SeqCst) {
                    break;
                }
                match classifier.classify(&window) {
                    Ok(scores) => {
                        let best = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                        if best > threshold {
                            on_scores(scores);
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "window classification failed"),
                }
            }
            listening.store(false, Ordering::SeqCst);
        });

        if let Some(previous) = self.replace_task(Some(task)) {
            previous.abort();
        }
        Ok(())
    }

    async fn stop_listening(&self) -> Result<()> {
        self.listening.store(false, Ordering::SeqCst);
        self.source.close();
        if let Some(task) = self.replace_task(None) {
            task.abort();
        }
        Ok(())
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

/// Linear-interpolation resampler that carries its phase across chunks
#[derive(Debug, Clone)]
struct LinearResampler {
    step: f64,
    position: f64,
    previous: f32,
}

impl LinearResampler {
    fn new(source_rate: u32, target_rate: u32) -> Self {
        Self {
            step: source_rate as f64 / target_rate.max(1) as f64,
            position: 0.0,
            previous: 0.0,
        }
    }

    fn process(&mut self, input: &[f32], out: &mut Vec<f32>) {
        // index 0 is the last sample of the previous chunk
        let len = input.len() as f64;
        while self.position < len {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let a = if index == 0 {
                self.previous
            } else {
                input[index - 1]
            };
            let b = input[index];
            out.push(a + (b - a) * frac);
            self.position += self.step;
        }
        self.position -= len;
        if let Some(last) = input.last() {
            self.previous = *last;
        }
    }
}

/// Captures the default input device on a dedicated thread
#[derive(Default)]
pub struct MicrophoneWindowSource {
    stop: Mutex<Option<Arc<AtomicBool>>>,
}

impl MicrophoneWindowSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace_stop(&self, flag: Option<Arc<AtomicBool>>) -> Option<Arc<AtomicBool>> {
        let mut slot = match self.stop.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::replace(&mut *slot, flag)
    }
}

impl AudioWindowSource for MicrophoneWindowSource {
    fn open(
        &self,
        sample_rate: u32,
        window_size: usize,
        hop: usize,
    ) -> Result<mpsc::Receiver<Vec<f32>>> {
        let (tx, rx) = mpsc::channel(WINDOW_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        std::thread::Builder::new()
            .name("smolitux-capture".to_string())
            .spawn(move || {
                let stream = match open_capture(sample_rate, window_size, hop, tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                while !thread_stop.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                drop(stream);
                tracing::debug!("microphone capture stopped");
            })
            .map_err(|e| SmolituxError::Audio(format!("failed to spawn capture thread: {e}")))?;

        ready_rx
            .recv()
            .map_err(|_| SmolituxError::Audio("capture thread exited".to_string()))??;

        if let Some(previous) = self.replace_stop(Some(stop)) {
            previous.store(true, Ordering::SeqCst);
        }
        Ok(rx)
    }

    fn close(&self) {
        if let Some(stop) = self.replace_stop(None) {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

fn open_capture(
    sample_rate: u32,
    window_size: usize,
    hop: usize,
    tx: mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SmolituxError::Audio("no input device available".to_string()))?;
    let supported = device
        .default_input_config()
        .map_err(|e| SmolituxError::Audio(format!("failed to query input config: {e}")))?;
    let config: cpal::StreamConfig = supported.config();

    tracing::debug!(
        device = %device.name().unwrap_or_else(|_| "Unknown".to_string()),
        device_rate = config.sample_rate.0,
        target_rate = sample_rate,
        "opening microphone"
    );

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            build_capture::<f32>(&device, &config, sample_rate, window_size, hop, tx)
        }
        cpal::SampleFormat::I16 => {
            build_capture::<i16>(&device, &config, sample_rate, window_size, hop, tx)
        }
        cpal::SampleFormat::U16 => {
            build_capture::<u16>(&device, &config, sample_rate, window_size, hop, tx)
        }
        other => Err(SmolituxError::Audio(format!(
            "unsupported sample format: {other:?}"
        ))),
    }?;

    stream
        .play()
        .map_err(|e| SmolituxError::Audio(format!("failed to start capture: {e}")))?;
    Ok(stream)
}

fn build_capture<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_rate: u32,
    window_size: usize,
    hop: usize,
    tx: mpsc::Sender<Vec<f32>>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = (config.channels as usize).max(1);
    let mut resampler = LinearResampler::new(config.sample_rate.0, sample_rate);
    let mut accumulator = WindowAccumulator::new(window_size, hop);
    let mut mono = Vec::new();
    let mut resampled = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                mono.clear();
                mono.extend(data.chunks(channels).map(|frame| {
                    frame.iter().map(|s| f32::from_sample_(*s)).sum::<f32>() / frame.len() as f32
                }));
                resampled.clear();
                resampler.process(&mono, &mut resampled);

                for window in accumulator.push(&resampled) {
                    // scoring fell behind; drop rather than block the audio thread
                    if tx.try_send(window).is_err() {
                        tracing::trace!("dropping audio window");
                    }
                }
            },
            |err| tracing::warn!(error = %err, "capture stream error"),
            None,
        )
        .map_err(|e| SmolituxError::Audio(format!("failed to build capture stream: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_accumulator_overlap() {
        let mut acc = WindowAccumulator::new(4, 2);
        let windows = acc.push(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(windows, vec![vec![1.0, 2.0, 3.0, 4.0], vec![3.0, 4.0, 5.0, 6.0]]);

        assert!(acc.push(&[7.0]).is_empty());
        assert_eq!(acc.push(&[8.0]), vec![vec![5.0, 6.0, 7.0, 8.0]]);
    }

    #[test]
    fn test_hop_never_zero() {
        assert_eq!(WindowAccumulator::hop_for(8000, 0.5), 4000);
        assert_eq!(WindowAccumulator::hop_for(8000, 0.0), 8000);
        assert_eq!(WindowAccumulator::hop_for(8000, 1.0), 1);
    }

    #[test]
    fn test_resampler_halves_rate() {
        let mut resampler = LinearResampler::new(2, 1);
        let mut out = Vec::new();
        resampler.process(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], &mut out);
        assert_eq!(out, vec![0.0, 1.0, 3.0, 5.0]);

        out.clear();
        resampler.process(&[8.0, 9.0], &mut out);
        assert_eq!(out, vec![7.0]);
    }

    /// Scores each window by its first sample: `[noise, up, down]`
    struct FirstSampleClassifier {
        loads: AtomicUsize,
    }

    impl WindowClassifier for FirstSampleClassifier {
        fn load(&self) -> Result<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn labels(&self) -> Vec<String> {
            vec!["_background_noise_".into(), "up".into(), "down".into()]
        }

        fn window_size(&self) -> usize {
            4
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn classify(&self, window: &[f32]) -> Result<Vec<f32>> {
            let up = window[0];
            Ok(vec![0.0, up, 1.0 - up])
        }
    }

    #[derive(Default)]
    struct QueuedSource {
        windows: Mutex<Vec<Vec<f32>>>,
        closed: AtomicBool,
    }

    impl AudioWindowSource for QueuedSource {
        fn open(&self, _: u32, _: usize, _: usize) -> Result<mpsc::Receiver<Vec<f32>>> {
            let (tx, rx) = mpsc::channel(WINDOW_QUEUE_DEPTH);
            for window in self.windows.lock().unwrap().drain(..) {
                tx.try_send(window).unwrap();
            }
            Ok(rx)
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_listen_filters_by_threshold() {
        let classifier = Arc::new(FirstSampleClassifier {
            loads: AtomicUsize::new(0),
        });
        let source = Arc::new(QueuedSource::default());
        *source.windows.lock().unwrap() = vec![vec![0.9; 4], vec![0.5; 4], vec![0.1; 4]];
        let model = WindowedKeywordModel::new(classifier.clone(), source.clone());

        model.ensure_loaded().await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        model
            .listen(
                ListenOptions::default(),
                Arc::new(move |scores: Vec<f32>| {
                    let _ = tx.send(scores);
                }),
            )
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first[1], 0.9);
        assert!((second[2] - 0.9).abs() < 1e-6);

        // the sender closes once the source is drained
        assert!(rx.recv().await.is_none());
        assert_eq!(classifier.loads.load(Ordering::SeqCst), 1);
        assert!(!model.is_listening());

        model.stop_listening().await.unwrap();
        assert!(source.closed.load(Ordering::SeqCst));
    }
}
