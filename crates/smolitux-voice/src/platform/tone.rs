//! Feedback tones on the default output device

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use smolitux_core::{Result, SmolituxError};

use super::{AudioContextFactory, ToneOutput};

/// Peak amplitude of generated tones
const TONE_AMPLITUDE: f32 = 0.2;

/// Linear fade at both ends to avoid clicks
const FADE_SECONDS: f32 = 0.01;

/// Opens the default output device on demand
#[derive(Debug, Default)]
pub struct CpalAudioContextFactory;

impl CpalAudioContextFactory {
    pub fn new() -> Self {
        Self
    }
}

impl AudioContextFactory for CpalAudioContextFactory {
    fn create(&self) -> Result<Arc<dyn ToneOutput>> {
        Ok(Arc::new(CpalToneOutput::open()?))
    }
}

/// Plays sine tones; each tone gets its own short-lived stream
#[derive(Debug, Clone)]
pub struct CpalToneOutput {
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalToneOutput {
    /// Probe the default output device
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SmolituxError::Audio("no output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| SmolituxError::Audio(format!("failed to query output config: {e}")))?;

        let output = Self {
            device_name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };
        tracing::debug!(
            device = %output.device_name,
            sample_rate = output.sample_rate,
            channels = output.channels,
            "audio context acquired"
        );
        Ok(output)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl ToneOutput for CpalToneOutput {
    fn play_tone(&self, frequency_hz: f32, duration: Duration) -> Result<()> {
        std::thread::Builder::new()
            .name("smolitux-tone".to_string())
            .spawn(move || {
                if let Err(e) = render_tone(frequency_hz, duration) {
                    tracing::debug!(error = %e, "feedback tone failed");
                }
            })
            .map(|_| ())
            .map_err(|e| SmolituxError::Audio(format!("failed to spawn tone thread: {e}")))
    }
}

/// Build, play and release one oscillator stream
fn render_tone(frequency_hz: f32, duration: Duration) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SmolituxError::Audio("no output device available".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| SmolituxError::Audio(format!("failed to query output config: {e}")))?;
    let config: cpal::StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, frequency_hz, duration),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, frequency_hz, duration),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, frequency_hz, duration),
        other => Err(SmolituxError::Audio(format!(
            "unsupported sample format: {other:?}"
        ))),
    }?;

    stream
        .play()
        .map_err(|e| SmolituxError::Audio(format!("failed to start tone: {e}")))?;
    std::thread::sleep(duration + Duration::from_millis(20));
    drop(stream);
    Ok(())
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    frequency_hz: f32,
    duration: Duration,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut oscillator = SineOscillator::new(frequency_hz, config.sample_rate.0, duration);

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample_(oscillator.next_sample());
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                }
            },
            |err| tracing::warn!(error = %err, "tone stream error"),
            None,
        )
        .map_err(|e| SmolituxError::Audio(format!("failed to build tone stream: {e}")))
}

/// Fixed-length sine with fade-in/out; silent once exhausted
#[derive(Debug, Clone)]
pub struct SineOscillator {
    step: f32,
    phase: f32,
    position: usize,
    total: usize,
    fade: usize,
}

impl SineOscillator {
    pub fn new(frequency_hz: f32, sample_rate: u32, duration: Duration) -> Self {
        let total = (duration.as_secs_f32() * sample_rate as f32).round() as usize;
        let fade = ((FADE_SECONDS * sample_rate as f32) as usize).min(total / 2);
        Self {
            step: frequency_hz * std::f32::consts::TAU / sample_rate as f32,
            phase: 0.0,
            position: 0,
            total,
            fade,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.total
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.is_finished() {
            return 0.0;
        }

        let envelope = if self.fade == 0 {
            1.0
        } else if self.position < self.fade {
            self.position as f32 / self.fade as f32
        } else if self.total - self.position < self.fade {
            (self.total - self.position) as f32 / self.fade as f32
        } else {
            1.0
        };

        let value = self.phase.sin() * TONE_AMPLITUDE * envelope;
        self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        self.position += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oscillator_length() {
        let mut osc = SineOscillator::new(440.0, 8000, Duration::from_millis(100));
        let samples: Vec<f32> = (0..1000).map(|_| osc.next_sample()).collect();

        assert!(osc.is_finished());
        assert!(samples[800..].iter().all(|s| *s == 0.0));
        assert!(samples[..800].iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_oscillator_fades_and_stays_bounded() {
        let mut osc = SineOscillator::new(660.0, 48_000, Duration::from_millis(100));
        let first = osc.next_sample();
        assert_eq!(first, 0.0);

        let peak = (0..4800)
            .map(|_| osc.next_sample().abs())
            .fold(0.0f32, f32::max);
        assert!(peak <= TONE_AMPLITUDE + f32::EPSILON);
    }
}
