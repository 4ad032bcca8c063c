//! `smolitux listen` - an interactive voice control session
//!
//! Each stdin line is treated as a final transcript from the live-speech
//! service. `:stop` and `:start` toggle listening, `:quit` or EOF ends the
//! session. With the keyword engine and `keyword.model_path` set, the
//! microphone is scored against the template file instead.

use anyhow::Result;
use smolitux_core::EngineKind;
use smolitux_voice::platform::{ChannelSpeechService, TemplateClassifier, WindowedKeywordModel};
use smolitux_voice::{VoiceControlManager, VoicePlatform};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config_cmd;

/// Session control typed on stdin
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Start,
    Stop,
    Toggle,
    Quit,
    Targets,
    Transcript(&'a str),
    Blank,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Blank,
        ":start" => Input::Start,
        ":stop" => Input::Stop,
        ":toggle" => Input::Toggle,
        ":quit" | ":q" => Input::Quit,
        ":targets" => Input::Targets,
        text => Input::Transcript(text),
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

pub async fn run(engine: Option<EngineKind>, config: Option<&Path>) -> Result<()> {
    let mut config = config_cmd::load(config)?;
    if let Some(engine) = engine {
        config.engine = engine;
    }

    let service = ChannelSpeechService::new();
    let mut platform =
        VoicePlatform::detect().with_speech_recognition(Arc::new(service.clone()));
    if let Some(model_path) = &config.keyword.model_path {
        let classifier = Arc::new(TemplateClassifier::new(model_path));
        platform = platform.with_keyword_model(Arc::new(WindowedKeywordModel::with_microphone(
            classifier,
        )));
    }
    let manager = VoiceControlManager::new(config.clone(), platform);

    for (target_id, phrases) in &config.commands {
        manager.register_component(target_id.clone(), phrases.iter().cloned());
    }

    manager.set_on_command_recognized(|command, target_id| {
        println!("[{}] {target_id} <- \"{command}\"", timestamp());
    });
    manager.set_on_listening_state_changed(|listening| {
        println!(
            "[{}] {}",
            timestamp(),
            if listening { "listening" } else { "idle" }
        );
    });

    // launching the session is the user gesture that unlocks tones
    manager.notify_user_interaction();

    println!(
        "engine: {}, {} targets registered; type text, :stop, :start or :quit",
        manager.engine_name(),
        manager.registered_targets().len()
    );
    manager.start_listening().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Blank => {}
            Input::Start => manager.start_listening().await?,
            Input::Stop => manager.stop_listening().await?,
            Input::Toggle => {
                manager.toggle_listening().await?;
            }
            Input::Quit => break,
            Input::Targets => {
                for target_id in manager.registered_targets() {
                    let phrases = manager.commands_for(&target_id).unwrap_or_default();
                    println!("{target_id}: {}", phrases.join(", "));
                }
            }
            Input::Transcript(text) => {
                if !service.push_transcript(text) {
                    println!("(not listening)");
                }
            }
        }
    }

    manager.cleanup().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("  :stop "), Input::Stop);
        assert_eq!(parse_input(":q"), Input::Quit);
        assert_eq!(parse_input("   "), Input::Blank);
        assert_eq!(
            parse_input(" turn the lights on "),
            Input::Transcript("turn the lights on")
        );
    }
}
