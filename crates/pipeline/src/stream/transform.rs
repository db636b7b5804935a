//! Text post-processing applied to committed stream text.
//!
//! Transformers only ever see text that ends on a boundary character (or the
//! final flushed tail), so word-level rewrites never see half a word.

use std::collections::HashMap;

use thiserror::Error;

/// A pure, deterministic text normalization.
///
/// Implementations must be idempotent: `t(t(x)) == t(x)`.
pub trait TextTransformer: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, text: &str) -> String;
}

/// Passes text through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl TextTransformer for IdentityTransformer {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, text: &str) -> String {
        text.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpellingTableError {
    #[error("Table key '{0}' must be a lowercase alphabetic word")]
    InvalidKey(String),

    #[error("Replacement '{target}' for '{key}' is itself a table key")]
    ChainedReplacement { key: String, target: String },
}

const AMERICAN_TO_BRITISH: &[(&str, &str)] = &[
    ("analyze", "analyse"),
    ("analyzed", "analysed"),
    ("apologize", "apologise"),
    ("behavior", "behaviour"),
    ("behaviors", "behaviours"),
    ("canceled", "cancelled"),
    ("canceling", "cancelling"),
    ("catalog", "catalogue"),
    ("center", "centre"),
    ("centers", "centres"),
    ("color", "colour"),
    ("colors", "colours"),
    ("defense", "defence"),
    ("favorite", "favourite"),
    ("favorites", "favourites"),
    ("flavor", "flavour"),
    ("gray", "grey"),
    ("honor", "honour"),
    ("humor", "humour"),
    ("jewelry", "jewellery"),
    ("labor", "labour"),
    ("modeling", "modelling"),
    ("neighbor", "neighbour"),
    ("neighbors", "neighbours"),
    ("organization", "organisation"),
    ("organizations", "organisations"),
    ("organize", "organise"),
    ("organized", "organised"),
    ("organizing", "organising"),
    ("realize", "realise"),
    ("realized", "realised"),
    ("recognize", "recognise"),
    ("recognized", "recognised"),
    ("theater", "theatre"),
    ("traveled", "travelled"),
    ("traveling", "travelling"),
];

/// Whole-word spelling normalization, case preserving.
///
/// A word is a maximal run of alphabetic characters. Lowercase, Capitalized
/// and UPPERCASE words are rewritten; other casings are left alone.
#[derive(Debug, Clone)]
pub struct SpellingNormalizer {
    table: HashMap<String, String>,
}

impl SpellingNormalizer {
    /// Build from a custom table. Rejects tables where a replacement is also
    /// a key, since those would not be idempotent.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self, SpellingTableError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let table: HashMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        for (key, target) in &table {
            if key.is_empty() || !key.chars().all(|c| c.is_alphabetic() && !c.is_uppercase()) {
                return Err(SpellingTableError::InvalidKey(key.clone()));
            }
            if table.contains_key(&target.to_lowercase()) {
                return Err(SpellingTableError::ChainedReplacement {
                    key: key.clone(),
                    target: target.clone(),
                });
            }
        }

        Ok(Self { table })
    }

    /// The built-in American to British table.
    pub fn british() -> Self {
        Self {
            table: AMERICAN_TO_BRITISH
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn push_word(&self, word: &str, out: &mut String) {
        match self.replacement(word) {
            Some(replaced) => out.push_str(&replaced),
            None => out.push_str(word),
        }
    }

    fn replacement(&self, word: &str) -> Option<String> {
        let lower = word.to_lowercase();
        let target = self.table.get(&lower)?;

        if word == lower {
            return Some(target.clone());
        }
        if word == word.to_uppercase() {
            return Some(target.to_uppercase());
        }

        if word == capitalize(&lower) {
            return Some(capitalize(target));
        }
        None
    }
}

impl TextTransformer for SpellingNormalizer {
    fn name(&self) -> &str {
        "spelling"
    }

    fn transform(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + 8);
        let mut word_start: Option<usize> = None;

        for (i, c) in text.char_indices() {
            if c.is_alphabetic() {
                word_start.get_or_insert(i);
                continue;
            }
            if let Some(start) = word_start.take() {
                self.push_word(&text[start..i], &mut out);
            }
            out.push(c);
        }
        if let Some(start) = word_start {
            self.push_word(&text[start..], &mut out);
        }
        out
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
