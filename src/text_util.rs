use std::sync::LazyLock;

use regex::Regex;

/// Words dropped from the interior of a value before it is split.
pub const STOP_WORDS: &[&str] =
    &["and", "y", "the", "a", "d", "s", "ll", "re", "ve", "your", "yours"];

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid punctuation regex"));

/// Split a string leaf into the lowercase words that become prefix tokens.
///
/// Punctuation is replaced by whitespace, stop words are removed when they
/// sit between two other words, and the remainder is split on whitespace.
/// Removal scans left to right and never drops two neighbours: in a run of
/// adjacent stop words only every other one goes. A value consisting of a
/// lone stop word is kept as-is.
pub fn tokenize(value: &str) -> Vec<String> {
    let lowered = value.to_lowercase();
    let cleaned = PUNCTUATION.replace_all(&lowered, " ");
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let last = words.len().saturating_sub(1);

    let mut tokens = Vec::with_capacity(words.len());
    let mut dropped_previous = false;
    for (i, word) in words.iter().enumerate() {
        let interior = i > 0 && i < last;
        if interior && !dropped_previous && STOP_WORDS.contains(word) {
            dropped_previous = true;
            continue;
        }
        dropped_previous = false;
        tokens.push((*word).to_string());
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_splits() {
        assert_eq!(tokenize("John Smith"), vec!["john", "smith"]);
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(
            tokenize("AL-QAIDA, \"the base\""),
            vec!["al", "qaida", "base"]
        );
    }

    #[test]
    fn removes_interior_stop_words_only() {
        assert_eq!(
            tokenize("Bank and Trust of the East"),
            vec!["bank", "trust", "of", "east"]
        );
        assert_eq!(tokenize("A"), vec!["a"]);
        assert_eq!(tokenize("the end"), vec!["the", "end"]);
    }

    #[test]
    fn adjacent_stop_words_are_not_both_removed() {
        assert_eq!(
            tokenize("Bank of the A East"),
            vec!["bank", "of", "a", "east"]
        );
        assert_eq!(
            tokenize("x the a the y"),
            vec!["x", "a", "y"]
        );
    }

    #[test]
    fn keeps_underscores_and_digits() {
        assert_eq!(tokenize("id_42 1947"), vec!["id_42", "1947"]);
    }

    #[test]
    fn blank_values_yield_nothing() {
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("...").is_empty());
    }
}
