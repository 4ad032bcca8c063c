//! Speech output through a system speech command
//!
//! Utterances are queued and spoken one at a time by a worker thread using
//! `say` (macOS) or `espeak-ng` / `espeak`.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use smolitux_core::{Result, SmolituxError};

use super::{SpeechOutput, Utterance};

/// Words per minute at rate 1.0
const BASE_WORDS_PER_MINUTE: f32 = 175.0;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechProgram {
    Say,
    EspeakNg,
    Espeak,
}

impl SpeechProgram {
    const CANDIDATES: [SpeechProgram; 3] =
        [SpeechProgram::Say, SpeechProgram::EspeakNg, SpeechProgram::Espeak];

    pub fn binary(&self) -> &'static str {
        match self {
            SpeechProgram::Say => "say",
            SpeechProgram::EspeakNg => "espeak-ng",
            SpeechProgram::Espeak => "espeak",
        }
    }

    /// Command-line arguments for one utterance
    pub fn args(&self, utterance: &Utterance) -> Vec<String> {
        let words_per_minute = (BASE_WORDS_PER_MINUTE * utterance.rate).round().max(1.0) as u32;
        let mut args = Vec::new();

        match self {
            SpeechProgram::Say => {
                args.push("-r".to_string());
                args.push(words_per_minute.to_string());
                if let Some(voice) = &utterance.voice {
                    args.push("-v".to_string());
                    args.push(voice.clone());
                }
            }
            SpeechProgram::EspeakNg | SpeechProgram::Espeak => {
                let pitch = (utterance.pitch * 50.0).round().clamp(0.0, 99.0) as u32;
                let amplitude = (utterance.volume * 100.0).round().clamp(0.0, 200.0) as u32;
                let voice = utterance
                    .voice
                    .clone()
                    .unwrap_or_else(|| espeak_language(&utterance.lang));
                args.extend([
                    "-s".to_string(),
                    words_per_minute.to_string(),
                    "-p".to_string(),
                    pitch.to_string(),
                    "-a".to_string(),
                    amplitude.to_string(),
                    "-v".to_string(),
                    voice,
                ]);
            }
        }

        args.push("--".to_string());
        args.push(utterance.text.clone());
        args
    }
}

/// `en-US` → `en-us`, the form espeak voice names use
fn espeak_language(lang: &str) -> String {
    lang.to_lowercase()
}

struct QueuedUtterance {
    generation: u64,
    utterance: Utterance,
}

#[derive(Default)]
struct QueueState {
    current: Mutex<Option<Child>>,
    generation: AtomicU64,
    pending: AtomicU64,
    paused: AtomicBool,
}

impl QueueState {
    fn current(&self) -> MutexGuard<'_, Option<Child>> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct CommandSpeechOutput {
    program: SpeechProgram,
    path: PathBuf,
    queue: Mutex<Sender<QueuedUtterance>>,
    state: Arc<QueueState>,
}

impl CommandSpeechOutput {
    /// First speech command found on `PATH`
    pub fn detect() -> Option<Self> {
        SpeechProgram::CANDIDATES.iter().find_map(|program| {
            which::which(program.binary())
                .ok()
                .map(|path| Self::with_program(*program, path))
        })
    }

    pub fn with_program(program: SpeechProgram, path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(QueueState::default());

        let worker_state = state.clone();
        let worker_path = path.clone();
        let spawned = std::thread::Builder::new()
            .name("smolitux-speech".to_string())
            .spawn(move || run_queue(program, worker_path, rx, worker_state));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "failed to start speech worker");
        }

        tracing::debug!(program = program.binary(), path = %path.display(), "speech output ready");
        Self {
            program,
            path,
            queue: Mutex::new(tx),
            state,
        }
    }

    pub fn program(&self) -> SpeechProgram {
        self.program
    }

    fn list_voices(&self) -> Result<Vec<String>> {
        let args: &[&str] = match self.program {
            SpeechProgram::Say => &["-v", "?"],
            SpeechProgram::EspeakNg | SpeechProgram::Espeak => &["--voices"],
        };
        let output = Command::new(&self.path)
            .args(args)
            .stderr(Stdio::null())
            .output()?;
        let listing = String::from_utf8_lossy(&output.stdout);

        let voices = match self.program {
            // "Alex    en_US    # Most people recognize me by my voice."
            SpeechProgram::Say => listing
                .lines()
                .filter_map(|line| line.split_whitespace().next())
                .map(str::to_string)
                .collect(),
            // "Pty Language       Age/Gender VoiceName          File   Other Languages"
            SpeechProgram::EspeakNg | SpeechProgram::Espeak => listing
                .lines()
                .skip(1)
                .filter_map(|line| line.split_whitespace().nth(3))
                .map(str::to_string)
                .collect(),
        };
        Ok(voices)
    }
}

impl SpeechOutput for CommandSpeechOutput {
    fn enqueue(&self, utterance: Utterance) -> Result<()> {
        let generation = self.state.generation.load(Ordering::SeqCst);
        let queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.state.pending.fetch_add(1, Ordering::SeqCst);
        queue
            .send(QueuedUtterance {
                generation,
                utterance,
            })
            .map_err(|_| {
                self.state.pending.fetch_sub(1, Ordering::SeqCst);
                SmolituxError::Synthesis("speech worker is not running".to_string())
            })
    }

    fn cancel(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        self.state.paused.store(false, Ordering::SeqCst);
        if let Some(child) = self.state.current().as_mut() {
            let _ = child.kill();
        }
    }

    fn pause(&self) {
        self.state.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.state.paused.store(false, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        self.state.current().is_some() || self.state.pending.load(Ordering::SeqCst) > 0
    }

    fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::SeqCst)
    }

    fn voices(&self) -> Vec<String> {
        self.list_voices().unwrap_or_else(|e| {
            tracing::debug!(error = %e, "failed to list voices");
            Vec::new()
        })
    }
}

/// Worker loop: speak queued utterances in order
///
/// Pausing holds back the next utterance; the one already playing finishes.
/// Cancelling bumps the generation so everything queued before it is
/// skipped, and kills the running process.
fn run_queue(
    program: SpeechProgram,
    path: PathBuf,
    rx: Receiver<QueuedUtterance>,
    state: Arc<QueueState>,
) {
    while let Ok(queued) = rx.recv() {
        while state.paused.load(Ordering::SeqCst)
            && queued.generation == state.generation.load(Ordering::SeqCst)
        {
            std::thread::sleep(POLL_INTERVAL);
        }
        state.pending.fetch_sub(1, Ordering::SeqCst);

        if queued.generation != state.generation.load(Ordering::SeqCst) {
            continue;
        }

        let spawned = Command::new(&path)
            .args(program.args(&queued.utterance))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => *state.current() = Some(child),
            Err(e) => {
                tracing::warn!(program = program.binary(), error = %e, "failed to run speech command");
                continue;
            }
        }

        loop {
            let mut current = state.current();
            let finished = match current.as_mut() {
                Some(child) => !matches!(child.try_wait(), Ok(None)),
                None => true,
            };
            if finished {
                *current = None;
                break;
            }
            drop(current);
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    tracing::debug!("speech worker stopped");
}
