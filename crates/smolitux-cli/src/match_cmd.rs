//! `smolitux match` - one-shot command matching

use anyhow::{Result, bail};
use smolitux_voice::{CommandProcessor, CommandRegistry};
use std::path::Path;

use crate::config_cmd;

/// Parse `target=phrase,phrase`
pub fn parse_command_spec(spec: &str) -> Result<(String, Vec<String>)> {
    let Some((target_id, phrases)) = spec.split_once('=') else {
        bail!("expected TARGET=PHRASE[,PHRASE...], got `{spec}`");
    };
    let target_id = target_id.trim();
    if target_id.is_empty() {
        bail!("empty target in `{spec}`");
    }
    let phrases = phrases
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    Ok((target_id.to_string(), phrases))
}

pub fn build_registry(specs: &[String], config: Option<&Path>) -> Result<CommandRegistry> {
    if specs.is_empty() {
        let config = config_cmd::load(config)?;
        return Ok(config.commands.into_iter().collect());
    }

    let mut registry = CommandRegistry::new();
    for spec in specs {
        let (target_id, phrases) = parse_command_spec(spec)?;
        registry.register(target_id, phrases);
    }
    Ok(registry)
}

pub fn run(text: &str, specs: &[String], config: Option<&Path>, json: bool) -> Result<()> {
    let registry = build_registry(specs, config)?;
    let outcome = CommandProcessor::new().process_command(text, &registry);

    if json {
        let value = serde_json::json!({
            "command": outcome.command(),
            "target_id": outcome.target_id(),
        });
        println!("{value}");
        return Ok(());
    }

    match outcome.as_pair() {
        Some((command, target_id)) => println!("{target_id} <- \"{command}\""),
        None => println!("no match ({} targets)", registry.len()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_spec() {
        let (target, phrases) = parse_command_spec("lamp=lights on, lights off,").unwrap();
        assert_eq!(target, "lamp");
        assert_eq!(phrases, vec!["lights on", "lights off"]);

        assert!(parse_command_spec("lamp").is_err());
        assert!(parse_command_spec(" =on").is_err());
    }

    #[test]
    fn test_registry_keeps_flag_order() {
        let specs = vec!["a=open".to_string(), "b=open door".to_string()];
        let registry = build_registry(&specs, None).unwrap();
        let outcome = CommandProcessor::new().process_command("please open door", &registry);
        assert_eq!(outcome.as_pair(), Some(("open", "a")));
    }
}
