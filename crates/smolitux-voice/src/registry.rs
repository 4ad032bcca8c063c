//! Command registry - target id to its accepted command phrases

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Insertion-ordered mapping from target identifier to command phrases
///
/// Re-registering a target replaces its phrases but keeps its position;
/// removing a target preserves the order of the remaining ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRegistry {
    entries: IndexMap<String, Vec<String>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the phrases for `target_id`
    ///
    /// Phrases are trimmed; blank ones are dropped and case-insensitive
    /// duplicates keep their first occurrence. Returns the previous set.
    pub fn register<I, S>(
        &mut self,
        target_id: impl Into<String>,
        phrases: I,
    ) -> Option<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for phrase in phrases {
            let phrase: String = phrase.into();
            let phrase = phrase.trim();
            if phrase.is_empty() {
                continue;
            }
            let lower = phrase.to_lowercase();
            if normalized.iter().any(|p| p.to_lowercase() == lower) {
                continue;
            }
            normalized.push(phrase.to_string());
        }
        self.entries.insert(target_id.into(), normalized)
    }

    pub fn unregister(&mut self, target_id: &str) -> Option<Vec<String>> {
        self.entries.shift_remove(target_id)
    }

    pub fn get(&self, target_id: &str) -> Option<&[String]> {
        self.entries.get(target_id).map(Vec::as_slice)
    }

    pub fn contains(&self, target_id: &str) -> bool {
        self.entries.contains_key(target_id)
    }

    /// Targets with their phrases, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(id, phrases)| (id.as_str(), phrases.as_slice()))
    }

    pub fn targets(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> FromIterator<(K, V)> for CommandRegistry
where
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut registry = Self::new();
        for (target_id, phrases) in iter {
            registry.register(target_id, phrases);
        }
        registry
    }
}
