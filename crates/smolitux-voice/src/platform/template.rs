//! Template-matching keyword classifier
//!
//! A model file lists one energy-envelope template per keyword. A window is
//! reduced to the same envelope and scored against every template by cosine
//! similarity; quiet windows score as background noise.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use smolitux_core::{Result, SmolituxError};

use super::keyword_model::WindowClassifier;

/// Label reported for windows below the silence threshold
pub const BACKGROUND_LABEL: &str = "_background_noise_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordTemplate {
    pub label: String,
    /// Normalized per-frame RMS energy
    pub envelope: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateModel {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// RMS below which a window is background noise
    #[serde(default = "default_silence_rms")]
    pub silence_rms: f32,
    pub templates: Vec<KeywordTemplate>,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_window_size() -> usize {
    16_000
}

fn default_silence_rms() -> f32 {
    0.01
}

impl TemplateModel {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SmolituxError::ModelLoad(format!("failed to read {}: {e}", path.display()))
        })?;
        let model: TemplateModel = serde_json::from_str(&content).map_err(|e| {
            SmolituxError::ModelLoad(format!("failed to parse {}: {e}", path.display()))
        })?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.window_size == 0 || self.sample_rate == 0 {
            return Err(SmolituxError::ModelLoad(
                "window size and sample rate must be positive".to_string(),
            ));
        }
        if self.templates.is_empty() {
            return Err(SmolituxError::ModelLoad("model has no templates".to_string()));
        }
        let frames = self.templates[0].envelope.len();
        if frames == 0 || self.templates.iter().any(|t| t.envelope.len() != frames) {
            return Err(SmolituxError::ModelLoad(
                "templates must share a non-empty envelope length".to_string(),
            ));
        }
        Ok(())
    }

    pub fn frames(&self) -> usize {
        self.templates.first().map_or(0, |t| t.envelope.len())
    }

    /// Scores aligned with `[BACKGROUND_LABEL, template labels...]`
    pub fn score(&self, window: &[f32]) -> Vec<f32> {
        let mut scores = vec![0.0; self.templates.len() + 1];
        if rms(window) < self.silence_rms {
            scores[0] = 1.0;
            return scores;
        }

        let envelope = energy_envelope(window, self.frames());
        for (slot, template) in scores[1..].iter_mut().zip(&self.templates) {
            *slot = cosine_similarity(&envelope, &template.envelope).max(0.0);
        }
        scores
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Per-frame RMS, scaled to unit length
pub fn energy_envelope(window: &[f32], frames: usize) -> Vec<f32> {
    if frames == 0 || window.is_empty() {
        return Vec::new();
    }
    let frame_len = window.len().div_ceil(frames);
    let mut envelope: Vec<f32> = (0..frames)
        .map(|i| {
            let start = (i * frame_len).min(window.len());
            let end = ((i + 1) * frame_len).min(window.len());
            rms(&window[start..end])
        })
        .collect();

    let norm = envelope.iter().map(|e| e * e).sum::<f32>().sqrt();
    if norm > 0.0 {
        for e in &mut envelope {
            *e /= norm;
        }
    }
    envelope
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// [`WindowClassifier`] backed by a [`TemplateModel`] file
pub struct TemplateClassifier {
    path: PathBuf,
    model: RwLock<Option<TemplateModel>>,
}

impl TemplateClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            model: RwLock::new(None),
        }
    }

    pub fn from_model(model: TemplateModel) -> Self {
        Self {
            path: PathBuf::new(),
            model: RwLock::new(Some(model)),
        }
    }

    fn with_model<R>(&self, f: impl FnOnce(&TemplateModel) -> R) -> Option<R> {
        let guard = match self.model.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.as_ref().map(f)
    }
}

impl WindowClassifier for TemplateClassifier {
    fn load(&self) -> Result<()> {
        if self.with_model(|_| ()).is_some() {
            return Ok(());
        }
        let model = TemplateModel::load_from(&self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            templates = model.templates.len(),
            "keyword templates loaded"
        );
        let mut slot = match self.model.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(model);
        Ok(())
    }

    fn labels(&self) -> Vec<String> {
        self.with_model(|model| {
            std::iter::once(BACKGROUND_LABEL.to_string())
                .chain(model.templates.iter().map(|t| t.label.clone()))
                .collect()
        })
        .unwrap_or_default()
    }

    fn window_size(&self) -> usize {
        self.with_model(|model| model.window_size)
            .unwrap_or_else(default_window_size)
    }

    fn sample_rate(&self) -> u32 {
        self.with_model(|model| model.sample_rate)
            .unwrap_or_else(default_sample_rate)
    }

    fn classify(&self, window: &[f32]) -> Result<Vec<f32>> {
        self.with_model(|model| model.score(window))
            .ok_or_else(|| SmolituxError::ModelLoad("keyword templates not loaded".to_string()))
    }
}
