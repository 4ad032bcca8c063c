//! `smolitux config` and the config loading shared by the other commands

use anyhow::{Context, Result, bail};
use smolitux_core::{VoiceConfigManager, VoiceControlConfig};
use std::path::{Path, PathBuf};

/// Config from `path`, or from the default location when unset
pub fn load(path: Option<&Path>) -> Result<VoiceControlConfig> {
    let manager = match path {
        Some(path) => VoiceConfigManager::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VoiceConfigManager::load(),
    };
    Ok(manager.voice)
}

pub fn run(init: bool, force: bool, path: Option<&Path>) -> Result<()> {
    let path: PathBuf = path
        .map(Path::to_path_buf)
        .unwrap_or_else(VoiceConfigManager::default_path);

    if init {
        if path.exists() && !force {
            bail!("{} already exists (use --force to overwrite)", path.display());
        }
        VoiceConfigManager::default().save_to(&path)?;
        println!("Wrote default voice configuration to {}", path.display());
        return Ok(());
    }

    let manager = VoiceConfigManager::load_from(&path)?;
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&manager)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("voice.json");

        run(true, false, Some(&path)).unwrap();
        assert!(path.exists());
        assert!(run(true, false, Some(&path)).is_err());
        run(true, true, Some(&path)).unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config, VoiceControlConfig::default());
    }

    #[test]
    fn test_load_reports_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
