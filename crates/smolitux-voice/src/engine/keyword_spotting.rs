//! Keyword-spotting engine - on-device classification of rolling windows

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use smolitux_core::SmolituxError;

use super::{EngineHandlers, RecognitionEngine};
use crate::events::{ResultHandler, StateHandler};
use crate::platform::{KeywordModel, ListenOptions, ScoresCallback};
use crate::types::RecognitionResult;

pub struct KeywordSpottingEngine {
    model: Option<Arc<dyn KeywordModel>>,
    options: ListenOptions,
    state: Arc<KeywordState>,
}

#[derive(Default)]
struct KeywordState {
    listening: AtomicBool,
    /// Set while the model loads and the stream opens
    starting: AtomicBool,
    /// Bumped by every `stop`; a start begun under an older value is void
    generation: AtomicU64,
    disposed: AtomicBool,
    labels: OnceLock<Arc<Vec<String>>>,
    handlers: EngineHandlers,
}

/// Best label of one window, if it clears `threshold`
///
/// Reserved classes (`_background_noise_`, `_unknown_`) are never reported.
pub fn best_label<'a>(
    scores: &[f32],
    labels: &'a [String],
    threshold: f32,
) -> Option<(&'a str, f32)> {
    let (index, score) = scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, s)| match best {
            Some((_, top)) if top >= s => best,
            _ => Some((i, s)),
        })?;

    if score <= threshold {
        return None;
    }
    let label = labels.get(index)?;
    if label.starts_with('_') {
        return None;
    }
    Some((label.as_str(), score))
}

impl KeywordSpottingEngine {
    /// `None` means no model is available; `start` then logs and stays idle
    pub fn new(model: Option<Arc<dyn KeywordModel>>, options: ListenOptions) -> Self {
        Self {
            model,
            options,
            state: Arc::new(KeywordState::default()),
        }
    }

    fn scores_callback(&self, labels: Arc<Vec<String>>) -> ScoresCallback {
        let state = self.state.clone();
        let threshold = self.options.probability_threshold;
        Arc::new(move |scores: Vec<f32>| {
            if !state.listening.load(Ordering::SeqCst) || state.disposed.load(Ordering::SeqCst) {
                return;
            }
            if let Some((label, score)) = best_label(&scores, &labels, threshold) {
                tracing::debug!(label, score, "keyword recognized");
                state.handlers.emit_result(RecognitionResult::Keyword {
                    label: label.to_string(),
                    score,
                });
            }
        })
    }

    fn superseded(&self, generation: u64) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
            || self.state.generation.load(Ordering::SeqCst) != generation
    }

    /// Load the model and open the stream; `Ok(false)` when a stop or
    /// cleanup arrived in the meantime
    async fn open_stream(
        &self,
        model: &Arc<dyn KeywordModel>,
        generation: u64,
    ) -> smolitux_core::Result<bool> {
        model.ensure_loaded().await?;
        if self.superseded(generation) {
            return Ok(false);
        }

        let labels = self
            .state
            .labels
            .get_or_init(|| Arc::new(model.word_labels()))
            .clone();
        // flag first so the earliest window is not dropped
        self.state.listening.store(true, Ordering::SeqCst);
        if let Err(e) = model.listen(self.options, self.scores_callback(labels)).await {
            self.state.listening.store(false, Ordering::SeqCst);
            return Err(e);
        }

        if self.superseded(generation) {
            self.state.listening.store(false, Ordering::SeqCst);
            if let Err(e) = model.stop_listening().await {
                tracing::debug!(error = %e, "failed to stop keyword model after cancelled start");
            }
            return Ok(false);
        }
        Ok(true)
    }
}

#[async_trait]
impl RecognitionEngine for KeywordSpottingEngine {
    fn name(&self) -> &'static str {
        "keyword_spotting"
    }

    fn is_supported(&self) -> bool {
        true
    }

    async fn start(&self) {
        if self.state.disposed.load(Ordering::SeqCst)
            || self.state.listening.load(Ordering::SeqCst)
        {
            return;
        }
        if self.state.starting.swap(true, Ordering::SeqCst) {
            tracing::debug!("keyword model already loading");
            return;
        }

        let generation = self.state.generation.load(Ordering::SeqCst);
        let result = match &self.model {
            Some(model) => self.open_stream(model, generation).await,
            None => Err(SmolituxError::ModelLoad(
                "no keyword model available".to_string(),
            )),
        };
        self.state.starting.store(false, Ordering::SeqCst);

        match result {
            Ok(true) => {
                tracing::info!(
                    threshold = self.options.probability_threshold,
                    overlap = self.options.overlap_factor,
                    "keyword spotting started"
                );
                self.state.handlers.emit_state(true);
            }
            Ok(false) => tracing::debug!("keyword spotting start cancelled"),
            Err(e) => tracing::warn!(error = %e, "keyword spotting could not start"),
        }
    }

    async fn stop(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        if self.state.starting.load(Ordering::SeqCst) {
            // the pending start sees the new generation and never announces itself
            if self.state.listening.swap(false, Ordering::SeqCst) {
                if let Some(model) = &self.model {
                    if let Err(e) = model.stop_listening().await {
                        tracing::debug!(error = %e, "failed to stop keyword model");
                    }
                }
            }
            return;
        }
        if !self.state.listening.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(model) = &self.model {
            if let Err(e) = model.stop_listening().await {
                tracing::warn!(error = %e, "failed to stop keyword model");
            }
        }
        self.state.handlers.emit_state(false);
    }

    async fn cleanup(&self) {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.state.listening.swap(false, Ordering::SeqCst) {
            if let Some(model) = &self.model {
                if let Err(e) = model.stop_listening().await {
                    tracing::debug!(error = %e, "failed to stop keyword model during cleanup");
                }
            }
        }
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
    use smolitux_core::Result;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn labels() -> Vec<String> {
        ["_background_noise_", "_unknown_", "up", "down"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_best_label_threshold() {
        let labels = labels();
        assert_eq!(
            best_label(&[0.0, 0.1, 0.8, 0.1], &labels, 0.75),
            Some(("up", 0.8))
        );
        assert_eq!(best_label(&[0.0, 0.0, 0.75, 0.25], &labels, 0.75), None);
        assert_eq!(best_label(&[0.9, 0.0, 0.05, 0.05], &labels, 0.75), None);
        assert_eq!(best_label(&[], &labels, 0.75), None);
    }

    /// Keeps the scores callback so tests can drive windows by hand
    #[derive(Default)]
    struct HandDrivenModel {
        loads: AtomicUsize,
        fail_load: bool,
        /// Holds `ensure_loaded` until notified
        gate: Option<Arc<Notify>>,
        callback: Mutex<Option<ScoresCallback>>,
        listening: AtomicBool,
    }

    impl HandDrivenModel {
        fn window(&self, scores: &[f32]) {
            let callback = self.callback.lock().unwrap().clone();
            if let Some(callback) = callback {
                callback(scores.to_vec());
            }
        }
    }

    #[async_trait]
    impl KeywordModel for HandDrivenModel {
        async fn ensure_loaded(&self) -> Result<()> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_load {
                return Err(SmolituxError::ModelLoad("weights missing".to_string()));
            }
            Ok(())
        }

        fn word_labels(&self) -> Vec<String> {
            labels()
        }

        async fn listen(&self, _: ListenOptions, on_scores: ScoresCallback) -> Result<()> {
            *self.callback.lock().unwrap() = Some(on_scores);
            self.listening.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_listening(&self) -> Result<()> {
            self.callback.lock().unwrap().take();
            self.listening.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_listening(&self) -> bool {
            self.listening.load(Ordering::SeqCst)
        }
    }

    fn recording(engine: &KeywordSpottingEngine) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let captured = log.clone();
        engine.set_on_result(Some(Arc::new(move |result: RecognitionResult| {
            captured.lock().unwrap().push(result.text().to_string())
        })));
        let captured = log.clone();
        engine.set_on_state_change(Some(Arc::new(move |flag: bool| {
            captured.lock().unwrap().push(format!("state:{flag}"))
        })));
        log
    }

    #[tokio::test]
    async fn test_emits_labels_above_threshold() {
        let model = Arc::new(HandDrivenModel::default());
        let engine = KeywordSpottingEngine::new(Some(model.clone()), ListenOptions::default());
        let log = recording(&engine);

        engine.start().await;
        engine.start().await;
        model.window(&[0.0, 0.0, 0.9, 0.1]);
        model.window(&[0.0, 0.0, 0.5, 0.5]);
        model.window(&[0.95, 0.0, 0.05, 0.0]);
        model.window(&[0.0, 0.0, 0.1, 0.85]);
        engine.stop().await;
        engine.stop().await;

        assert_eq!(model.loads.load(Ordering::SeqCst), 1);
        assert!(!model.is_listening());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["state:true", "up", "down", "state:false"]
        );
    }

    #[tokio::test]
    async fn test_load_failure_stays_idle() {
        let model = Arc::new(HandDrivenModel {
            fail_load: true,
            ..Default::default()
        });
        let engine = KeywordSpottingEngine::new(Some(model.clone()), ListenOptions::default());
        let log = recording(&engine);

        assert!(engine.is_supported());
        engine.start().await;
        assert!(!engine.is_listening());
        assert!(log.lock().unwrap().is_empty());

        // a later start retries the load
        engine.start().await;
        assert_eq!(model.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_during_load_cancels_start() {
        let gate = Arc::new(Notify::new());
        let model = Arc::new(HandDrivenModel {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let engine = Arc::new(KeywordSpottingEngine::new(
            Some(model.clone()),
            ListenOptions::default(),
        ));
        let log = recording(&engine);

        let starting = engine.clone();
        let start = tokio::spawn(async move { starting.start().await });
        while model.loads.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        engine.stop().await;
        gate.notify_one();
        start.await.unwrap();

        assert!(!engine.is_listening());
        assert!(!model.is_listening());
        model.window(&[0.0, 0.0, 0.9, 0.1]);
        assert!(log.lock().unwrap().is_empty());

        // a fresh start after the cancelled one works normally
        gate.notify_one();
        engine.start().await;
        assert!(engine.is_listening());
        assert_eq!(*log.lock().unwrap(), vec!["state:true"]);
    }

    #[tokio::test]
    async fn test_missing_model_stays_idle() {
        let engine = KeywordSpottingEngine::new(None, ListenOptions::default());
        engine.start().await;
        assert!(engine.is_supported());
        assert!(!engine.is_listening());
    }

    #[tokio::test]
    async fn test_cleanup_releases_model() {
        let model = Arc::new(HandDrivenModel::default());
        let engine = KeywordSpottingEngine::new(Some(model.clone()), ListenOptions::default());
        let log = recording(&engine);

        engine.start().await;
        engine.cleanup().await;
        engine.cleanup().await;
        assert!(!model.is_listening());

        engine.start().await;
        assert!(!engine.is_listening());
        assert_eq!(*log.lock().unwrap(), vec!["state:true"]);
    }
}
