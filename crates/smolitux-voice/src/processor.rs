//! Command processor - text to command matching

use crate::registry::CommandRegistry;
use crate::types::MatchOutcome;

/// Matches recognized text against a registry snapshot
///
/// The first phrase (registry order, then phrase order) that occurs as a
/// case-insensitive substring of the trimmed text wins. There is no scoring
/// and no longest-match preference.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandProcessor;

impl CommandProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn process_command(&self, text: &str, registry: &CommandRegistry) -> MatchOutcome {
        let normalized = text.to_lowercase();
        let normalized = normalized.trim();
        if normalized.is_empty() {
            return MatchOutcome::none();
        }

        for (target_id, phrases) in registry.iter() {
            for phrase in phrases {
                if normalized.contains(&phrase.to_lowercase()) {
                    tracing::debug!(target_id, command = %phrase, "command matched");
                    return MatchOutcome::matched(phrase.clone(), target_id);
                }
            }
        }

        MatchOutcome::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CommandRegistry {
        [
            ("a", vec!["open"]),
            ("b", vec!["open door", "close door"]),
            ("lamp", vec!["Lights On", "lights off"]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_first_match_wins() {
        let outcome = CommandProcessor::new().process_command("please open door", &registry());
        assert_eq!(outcome.as_pair(), Some(("open", "a")));
    }

    #[test]
    fn test_case_insensitive_substring() {
        let outcome =
            CommandProcessor::new().process_command("  Turn the LIGHTS ON please ", &registry());
        assert_eq!(outcome.as_pair(), Some(("Lights On", "lamp")));
    }

    #[test]
    fn test_phrase_order_within_target() {
        let outcome = CommandProcessor::new().process_command("close door", &registry());
        assert_eq!(outcome.as_pair(), Some(("close door", "b")));
    }

    #[test]
    fn test_no_match_leaves_registry_untouched() {
        let registry = registry();
        let before = registry.clone();
        let processor = CommandProcessor::new();

        for _ in 0..3 {
            assert_eq!(processor.process_command("xyzzy", &registry), MatchOutcome::none());
        }
        assert_eq!(registry, before);
    }

    #[test]
    fn test_deterministic() {
        let registry = registry();
        let processor = CommandProcessor::new();
        let first = processor.process_command("lights off now", &registry);
        let second = processor.process_command("lights off now", &registry);
        assert_eq!(first, second);
    }

    #[test]
    fn test_blank_text() {
        let outcome = CommandProcessor::new().process_command("   ", &registry());
        assert!(!outcome.is_match());
    }

    #[test]
    fn test_empty_registry() {
        let outcome = CommandProcessor::new().process_command("open", &CommandRegistry::new());
        assert!(!outcome.is_match());
    }
}
