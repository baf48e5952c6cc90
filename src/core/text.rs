use std::collections::BTreeSet;

use crate::data::keywords::STOPWORDS;

/// Minimum token length kept by [`tokenize`]
const MIN_TOKEN_LEN: usize = 3;

/// Lowercased alphanumeric tokens of at least three characters, stopwords
/// removed. A set, so repeated words count once.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Whole-word containment of `term` in `haystack` (both compared
/// lowercased). "classified" does not match "unclassified".
pub fn contains_term(haystack: &str, term: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }

    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric());
    haystack.match_indices(&term).any(|(idx, _)| {
        let before = haystack[..idx].chars().next_back();
        let after = haystack[idx + term.len()..].chars().next();
        !is_word(before) && !is_word(after)
    })
}

/// True when any of `terms` appears as a whole word
pub fn contains_any(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| contains_term(haystack, t))
}

/// Split on blank lines; single-paragraph text falls back to groups of
/// sentences so long descriptions still yield several chunks
pub fn split_paragraphs(text: &str, sentences_per_chunk: usize) -> Vec<String> {
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect();

    if paragraphs.len() > 1 {
        return paragraphs;
    }

    let sentences = split_sentences(text);
    if sentences.len() <= sentences_per_chunk.max(1) {
        return paragraphs;
    }
    sentences
        .chunks(sentences_per_chunk.max(1))
        .map(|group| group.join(" "))
        .collect()
}

/// Split on sentence terminators, dropping fragments shorter than ten
/// characters
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| s.chars().count() >= 10)
        .collect()
}

/// Truncate to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filters_short_and_stopwords() {
        let tokens = tokenize("The Cloud migration and DevOps for an IT shop");
        assert!(tokens.contains("cloud"));
        assert!(tokens.contains("migration"));
        assert!(tokens.contains("devops"));
        assert!(tokens.contains("shop"));
        assert!(!tokens.contains("the"));
        assert!(!tokens.contains("and"));
        assert!(!tokens.contains("it"));
    }

    #[test]
    fn test_contains_term_respects_word_boundaries() {
        assert!(contains_term("Handles CLASSIFIED material", "classified"));
        assert!(!contains_term("Unclassified documents only", "classified"));
        assert!(contains_term("requires top secret clearance", "top secret"));
        assert!(!contains_term("anything", ""));
    }

    #[test]
    fn test_split_paragraphs() {
        let chunks = split_paragraphs("First para here.\n\nSecond para here.", 3);
        assert_eq!(chunks, vec!["First para here.", "Second para here."]);

        let single = split_paragraphs(
            "One sentence is here. Two sentence is here. Three sentence is here. Four sentence is here.",
            2,
        );
        assert_eq!(single.len(), 2);
    }

    #[test]
    fn test_truncate_chars_on_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
