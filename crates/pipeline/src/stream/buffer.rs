//! Word-safe buffering of streamed text.
//!
//! Fragments arrive split at arbitrary points ("hello wor" + "ld, how"). The
//! buffer only commits text up to the last boundary character and runs the
//! transformer over that committed prefix; the incomplete trailing token
//! stays pending and is shown raw until a later fragment completes it.

use std::sync::Arc;

use super::transform::{IdentityTransformer, TextTransformer};

/// Characters after which preceding text is treated as complete.
pub const BOUNDARY_CHARS: &[char] = &[
    ' ', '\n', '.', ',', '!', '?', ';', ':', '*', '_', '`', '[', ']', '(', ')', '#', '>', '-',
];

pub fn is_boundary(c: char) -> bool {
    BOUNDARY_CHARS.contains(&c)
}

/// What a single `push` released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Emission {
    /// Newly committed, transformed text. Empty if no boundary was seen.
    pub committed: String,

    /// The raw pending tail, for provisional display only.
    pub provisional: String,
}

/// Owned buffer state for one stream.
pub struct WordBoundaryBuffer {
    transformer: Arc<dyn TextTransformer>,
    committed_text: String,
    pending_tail: String,
}

impl WordBoundaryBuffer {
    pub fn new(transformer: Arc<dyn TextTransformer>) -> Self {
        Self {
            transformer,
            committed_text: String::new(),
            pending_tail: String::new(),
        }
    }

    pub fn push(&mut self, fragment: &str) -> Emission {
        self.pending_tail.push_str(fragment);

        let Some((idx, c)) = self
            .pending_tail
            .char_indices()
            .rev()
            .find(|(_, c)| is_boundary(*c))
        else {
            return Emission {
                committed: String::new(),
                provisional: self.pending_tail.clone(),
            };
        };

        let rest = self.pending_tail.split_off(idx + c.len_utf8());
        let complete = std::mem::replace(&mut self.pending_tail, rest);
        let committed = self.transformer.transform(&complete);
        self.committed_text.push_str(&committed);

        Emission {
            committed,
            provisional: self.pending_tail.clone(),
        }
    }

    /// Force the pending tail through the transformer and commit it.
    ///
    /// Returns the converted tail; a second call returns an empty string.
    pub fn flush(&mut self) -> String {
        if self.pending_tail.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.pending_tail);
        let converted = self.transformer.transform(&tail);
        self.committed_text.push_str(&converted);
        converted
    }

    /// Drop the pending tail without transforming or committing it.
    /// Returns the number of discarded bytes.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending_tail.len();
        self.pending_tail.clear();
        dropped
    }

    pub fn committed_text(&self) -> &str {
        &self.committed_text
    }

    pub fn pending_tail(&self) -> &str {
        &self.pending_tail
    }

    /// Committed text followed by the raw pending tail.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.committed_text.len() + self.pending_tail.len());
        out.push_str(&self.committed_text);
        out.push_str(&self.pending_tail);
        out
    }

    pub fn into_committed(self) -> String {
        self.committed_text
    }
}

impl Default for WordBoundaryBuffer {
    fn default() -> Self {
        Self::new(Arc::new(IdentityTransformer))
    }
}

impl std::fmt::Debug for WordBoundaryBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordBoundaryBuffer")
            .field("transformer", &self.transformer.name())
            .field("committed_len", &self.committed_text.len())
            .field("pending_tail", &self.pending_tail)
            .finish()
    }
}
