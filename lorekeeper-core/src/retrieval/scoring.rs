//! Keyword-overlap relevance scoring.
//!
//! Score(item) = Σ over query keywords k:
//!   1.0  if k is a whole token of the item text
//!   0.5  if k only occurs inside a longer token (length ≥ 3)
//! plus, for every topic tag t:
//!   1.0  if t equals one of the item's tags (domain, category, key, subject)
//!   0.5  if t occurs in the item text
//!
//! Items scoring zero are irrelevant and never returned.

use std::collections::BTreeSet;

/// Weight for an exact token hit.
const EXACT_HIT: f64 = 1.0;
/// Weight for a substring-only hit.
const PARTIAL_HIT: f64 = 0.5;
/// Shortest keyword allowed to match inside a longer token.
const MIN_PARTIAL_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "any", "are", "as", "at", "be", "but", "by", "can", "do", "does",
    "for", "from", "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "is", "it",
    "its", "me", "my", "of", "on", "or", "our", "she", "so", "tell", "that", "the", "their",
    "them", "they", "this", "to", "was", "we", "were", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

/// Lowercased alphanumeric tokens of `text`, in order, duplicates kept.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Distinct query keywords with stopwords and one-character tokens removed.
#[must_use]
pub fn keywords(query: &str) -> BTreeSet<String> {
    tokenize(query)
        .into_iter()
        .filter(|t| t.chars().count() > 1 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Normalized topic tags: trimmed, lowercased, blanks dropped.
#[must_use]
pub fn normalize_topics(topics: &[&str]) -> BTreeSet<String> {
    topics
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Relevance of one candidate.
#[must_use]
pub fn relevance(
    keywords: &BTreeSet<String>,
    topics: &BTreeSet<String>,
    text: &str,
    tags: &[&str],
) -> f64 {
    let tokens: BTreeSet<String> = tokenize(text).into_iter().collect();
    let lowered = text.to_lowercase();

    let mut score = 0.0;
    for keyword in keywords {
        if tokens.contains(keyword) {
            score += EXACT_HIT;
        } else if keyword.chars().count() >= MIN_PARTIAL_LEN && lowered.contains(keyword.as_str()) {
            score += PARTIAL_HIT;
        }
    }
    for topic in topics {
        if tags.iter().any(|tag| tag.trim().eq_ignore_ascii_case(topic)) {
            score += EXACT_HIT;
        } else if lowered.contains(topic.as_str()) {
            score += PARTIAL_HIT;
        }
    }
    score
}
