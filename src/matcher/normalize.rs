//! Participant label normalization

use std::collections::HashSet;

/// Case-folds labels, turns punctuation into spaces and drops organizational
/// qualifiers ("FC", "Club", ...).
#[derive(Debug, Clone)]
pub struct LabelNormalizer {
    strip_tokens: HashSet<String>,
}

impl LabelNormalizer {
    pub fn new<S: AsRef<str>>(strip_tokens: &[S]) -> Self {
        Self {
            strip_tokens: strip_tokens
                .iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn normalize(&self, label: &str) -> String {
        let cleaned: String = label
            .to_lowercase()
            .chars()
            .map(|ch| if ch.is_alphanumeric() { ch } else { ' ' })
            .collect();

        let kept: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|token| !self.strip_tokens.contains(*token))
            .collect();

        if kept.is_empty() {
            // label made only of qualifiers, e.g. "The Club"
            return cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        kept.join(" ")
    }
}

/// Plain case-fold and trim, used to tell exact matches apart
pub fn fold(label: &str) -> String {
    label.trim().to_lowercase()
}

/// One normalized label contains the other. Empty labels never match.
pub fn labels_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(b) || b.contains(a)
}
