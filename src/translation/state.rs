/*!
 * Cumulative translation state carried from segment to segment.
 *
 * - `Glossary`: source term -> target translation, grows monotonically
 * - `CharacterStyleMap`: "{protagonist}->{character}" -> speech register
 * - `TranslationState`: the pair above, passed into and returned from each step
 * - `JobCheckpoint`: the durable snapshot written after every committed segment
 */

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminology glossary for translation consistency.
///
/// Keys are case-sensitive. Terms are only ever added; an existing
/// translation changes only through `merge_with_preference`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Glossary {
    terms: BTreeMap<String, String>,
}

impl Glossary {
    /// Create a new empty glossary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a glossary from (term, translation) pairs. Blank entries are skipped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut glossary = Self::new();
        for (term, translation) in pairs {
            glossary.insert_new(term, translation);
        }
        glossary
    }

    /// Add a term if it is not already present.
    ///
    /// Returns true when the term was added.
    pub fn insert_new(&mut self, term: impl Into<String>, translation: impl Into<String>) -> bool {
        let term = term.into().trim().to_string();
        let translation = translation.into().trim().to_string();
        if term.is_empty() || translation.is_empty() || self.terms.contains_key(&term) {
            return false;
        }
        self.terms.insert(term, translation);
        true
    }

    /// Get the translation for a term.
    pub fn get(&self, term: &str) -> Option<&str> {
        self.terms.get(term).map(|s| s.as_str())
    }

    /// Check if a term exists in the glossary.
    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check if the glossary is empty.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterate over (term, translation) in term order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Terms from `candidates` that are not yet in the glossary, deduplicated.
    pub fn unknown_terms<'a>(&self, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = Vec::new();
        for candidate in candidates {
            let candidate = candidate.trim();
            if candidate.is_empty() || self.contains(candidate) {
                continue;
            }
            if !seen.iter().any(|s: &String| s == candidate) {
                seen.push(candidate.to_string());
            }
        }
        seen
    }

    /// Additive merge: terms already present keep their translation.
    ///
    /// Returns the number of terms added.
    pub fn merge_additive(&mut self, other: &Glossary) -> usize {
        other
            .iter()
            .filter(|(term, translation)| self.insert_new(*term, *translation))
            .count()
    }

    /// Merge where `other` wins on conflicting keys.
    ///
    /// This is the only operation that may alter an existing translation.
    pub fn merge_with_preference(&mut self, other: &Glossary) {
        for (term, translation) in other.iter() {
            self.terms.insert(term.to_string(), translation.to_string());
        }
    }

    /// True when every term of `other` is present here with the same translation.
    pub fn is_superset_of(&self, other: &Glossary) -> bool {
        other.iter().all(|(term, translation)| self.get(term) == Some(translation))
    }

    /// Subset of terms that occur in `text` (case-insensitive, on word boundaries).
    pub fn filter_for_text(&self, text: &str) -> Glossary {
        let terms = self
            .terms
            .iter()
            .filter(|(term, _)| term_occurs_in(term, text))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Glossary { terms }
    }
}

/// Case-insensitive whole-term match.
///
/// A boundary is the start/end of the text or any non-word character, so
/// terms ending in punctuation ("Mr.") still match.
pub fn term_occurs_in(term: &str, text: &str) -> bool {
    let pattern = format!(r"(?i)(?:^|\W){}(?:$|\W)", regex::escape(term));
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => text.to_lowercase().contains(&term.to_lowercase()),
    }
}

/// Speech register per protagonist/character pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterStyleMap {
    styles: BTreeMap<String, String>,
}

impl CharacterStyleMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Key used for a protagonist/character pair.
    pub fn key(protagonist: &str, character: &str) -> String {
        format!("{}->{}", protagonist.trim(), character.trim())
    }

    /// Set the register for a pair, returning the previous value.
    pub fn set(&mut self, protagonist: &str, character: &str, register: &str) -> Option<String> {
        self.styles
            .insert(Self::key(protagonist, character), register.trim().to_string())
    }

    /// Register for a pair.
    pub fn get(&self, protagonist: &str, character: &str) -> Option<&str> {
        self.styles.get(&Self::key(protagonist, character)).map(|s| s.as_str())
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Whether no pair has been recorded.
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Iterate over (pair key, register).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.styles.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Cumulative per-job state.
///
/// Each orchestration step consumes a state and returns the next one, so a
/// snapshot for a checkpoint is just a clone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationState {
    /// Term glossary
    pub glossary: Glossary,
    /// Character speech registers
    pub character_styles: CharacterStyleMap,
}

impl TranslationState {
    /// Create state from its parts.
    pub fn new(glossary: Glossary, character_styles: CharacterStyleMap) -> Self {
        Self { glossary, character_styles }
    }

    /// Replace the glossary.
    pub fn with_glossary(self, glossary: Glossary) -> Self {
        Self { glossary, ..self }
    }

    /// Replace the character styles.
    pub fn with_character_styles(self, character_styles: CharacterStyleMap) -> Self {
        Self { character_styles, ..self }
    }
}

/// Durable progress record for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCheckpoint {
    /// Index of the last segment whose translation was committed
    pub last_successful_segment_index: usize,
    /// Glossary as of that segment
    pub glossary: Glossary,
    /// Character styles as of that segment
    pub character_styles: CharacterStyleMap,
}

impl JobCheckpoint {
    /// Snapshot the given state at a segment index.
    pub fn new(last_successful_segment_index: usize, state: &TranslationState) -> Self {
        Self {
            last_successful_segment_index,
            glossary: state.glossary.clone(),
            character_styles: state.character_styles.clone(),
        }
    }

    /// The segment a resumed job starts at.
    pub fn next_segment_index(&self) -> usize {
        self.last_successful_segment_index + 1
    }

    /// The cumulative state stored in this checkpoint.
    pub fn state(&self) -> TranslationState {
        TranslationState::new(self.glossary.clone(), self.character_styles.clone())
    }
}
