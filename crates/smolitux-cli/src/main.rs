//! Smolitux CLI - drive voice control from the terminal

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config_cmd;
mod listen_cmd;
mod match_cmd;
mod speak_cmd;

#[derive(Parser)]
#[command(name = "smolitux")]
#[command(about = "Smolitux voice control - recognize, match and acknowledge voice commands", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a listening session fed by stdin transcripts
    Listen {
        /// Recognition engine (live, keyword)
        #[arg(short, long)]
        engine: Option<smolitux_core::EngineKind>,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Match one utterance against a set of commands
    Match {
        /// Recognized text
        text: String,
        /// Target and phrases, e.g. `lamp=lights on,lights off`
        #[arg(short = 'C', long = "command")]
        commands: Vec<String>,
        /// Configuration file path (used when no --command is given)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Speak text through the system speech command
    Speak(speak_cmd::SpeakArgs),
    /// Play a feedback tone
    Tone {
        /// Which acknowledgement to play
        #[arg(value_enum)]
        kind: speak_cmd::ToneKind,
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show or initialize the voice configuration
    Config {
        /// Write the default configuration
        #[arg(long)]
        init: bool,
        /// Overwrite an existing file with --init
        #[arg(long)]
        force: bool,
        /// Configuration file path
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
    /// Show version info
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "smolitux=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen { engine, config } => {
            listen_cmd::run(engine, config.as_deref()).await?;
        }
        Commands::Match {
            text,
            commands,
            config,
            json,
        } => {
            match_cmd::run(&text, &commands, config.as_deref(), json)?;
        }
        Commands::Speak(args) => {
            speak_cmd::speak(args).await?;
        }
        Commands::Tone { kind, config } => {
            speak_cmd::tone(kind, config.as_deref()).await?;
        }
        Commands::Config { init, force, path } => {
            config_cmd::run(init, force, path.as_deref())?;
        }
        Commands::Version => {
            println!("Smolitux {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
