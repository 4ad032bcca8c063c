//! `smolitux speak` and `smolitux tone`

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use smolitux_voice::feedback::tone_frequency;
use smolitux_voice::platform::{CommandSpeechOutput, CpalToneOutput, SpeechOutput, ToneOutput};
use smolitux_voice::{FeedbackKind, SpeechSynthesizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config_cmd;

/// Longest we wait for the speech queue to drain
const SPEAK_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Args)]
pub struct SpeakArgs {
    /// Text to speak
    text: Option<String>,
    /// Speaking rate (0.1 - 10.0)
    #[arg(short, long)]
    rate: Option<f32>,
    /// Pitch (0.0 - 2.0)
    #[arg(short, long)]
    pitch: Option<f32>,
    /// Volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,
    /// Voice name
    #[arg(short, long)]
    voice: Option<String>,
    /// List available voices instead of speaking
    #[arg(long)]
    list_voices: bool,
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ToneKind {
    Start,
    Stop,
    Command,
}

impl From<ToneKind> for FeedbackKind {
    fn from(kind: ToneKind) -> Self {
        match kind {
            ToneKind::Start => FeedbackKind::Start,
            ToneKind::Stop => FeedbackKind::Stop,
            ToneKind::Command => FeedbackKind::Command,
        }
    }
}

pub async fn speak(args: SpeakArgs) -> Result<()> {
    let mut speech = config_cmd::load(args.config.as_deref())?.speech;
    if let Some(rate) = args.rate {
        speech.rate = rate;
    }
    if let Some(pitch) = args.pitch {
        speech.pitch = pitch;
    }
    if let Some(volume) = args.volume {
        speech.volume = volume;
    }
    if args.voice.is_some() {
        speech.voice = args.voice;
    }

    let output = CommandSpeechOutput::detect().map(|o| Arc::new(o) as Arc<dyn SpeechOutput>);
    let synthesizer = SpeechSynthesizer::new(speech, output);
    if !synthesizer.is_supported() {
        bail!("no speech command found (install `say`, `espeak-ng` or `espeak`)");
    }

    if args.list_voices {
        for voice in synthesizer.voices() {
            println!("{voice}");
        }
        return Ok(());
    }

    let Some(text) = args.text else {
        bail!("nothing to speak");
    };
    synthesizer.speak(&text);

    // the queue is asynchronous; keep the process alive until it drains
    let drained = tokio::time::timeout(SPEAK_TIMEOUT, async {
        while synthesizer.is_speaking() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    if drained.is_err() {
        synthesizer.cancel();
        bail!("speech did not finish within {}s", SPEAK_TIMEOUT.as_secs());
    }
    Ok(())
}

pub async fn tone(kind: ToneKind, config: Option<&Path>) -> Result<()> {
    let feedback = config_cmd::load(config)?.feedback;
    let frequency = tone_frequency(&feedback, kind.into());
    let duration = Duration::from_millis(feedback.tone_duration_ms);

    let output = CpalToneOutput::open()?;
    println!("{} Hz for {} ms on {}", frequency, duration.as_millis(), output.device_name());
    output.play_tone(frequency, duration)?;
    tokio::time::sleep(duration + Duration::from_millis(100)).await;
    Ok(())
}
