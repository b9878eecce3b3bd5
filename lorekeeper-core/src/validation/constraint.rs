//! Constraint definitions and pattern matching.
//!
//! A pattern written as `/…/` is a case-insensitive regular expression;
//! anything else is a case-insensitive literal substring. A regex that fails
//! to compile is kept (so it can be reported) but never matches.

use std::fmt;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::types::preview;

/// Longest violating-text sample kept on a violation.
pub const MAX_SAMPLE_CHARS: usize = 50;

/// What a constraint demands of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// The response must not match any pattern.
    Prohibition,
    /// The response must match at least one pattern.
    Requirement,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prohibition => write!(f, "prohibition"),
            Self::Requirement => write!(f, "requirement"),
        }
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// One matcher inside a constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Pattern {
    /// Case-insensitive substring.
    Literal(String),
    /// Case-insensitive regular expression.
    Regex {
        /// Expression text without the delimiters.
        source: String,
        /// Compiled form, or the compile error.
        compiled: Result<Regex, String>,
    },
}

impl Pattern {
    /// Parse a raw pattern, honoring the `/…/` regex delimiter.
    ///
    /// An empty body (`//`) is a literal, not a match-everything regex.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix('/').and_then(|r| r.strip_suffix('/')) {
            Some(source) if !source.is_empty() => Self::regex(source),
            _ => Self::literal(raw),
        }
    }

    /// A literal pattern, never interpreted as a regex.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// A regex pattern. Compile errors are captured, not returned.
    #[must_use]
    pub fn regex(source: &str) -> Self {
        let compiled = Regex::new(&format!("(?i){source}")).map_err(|e| e.to_string());
        Self::Regex {
            source: source.to_string(),
            compiled,
        }
    }

    /// Whether this is a regex that failed to compile.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(self, Self::Regex { compiled: Err(_), .. })
    }

    /// First match in `text`, as the matched text (at most
    /// [`MAX_SAMPLE_CHARS`] characters).
    #[must_use]
    pub fn find(&self, text: &str) -> Option<String> {
        let sample = match self {
            Self::Literal(needle) => {
                if needle.is_empty() {
                    return None;
                }
                let haystack = text.to_lowercase();
                let needle_lower = needle.to_lowercase();
                let start = haystack.find(&needle_lower)?;
                let end = start + needle_lower.len();
                // Lowercasing can change byte lengths; only slice the
                // original when offsets still line up.
                if haystack.len() == text.len()
                    && text.is_char_boundary(start)
                    && text.is_char_boundary(end)
                {
                    text[start..end].to_string()
                } else {
                    needle.clone()
                }
            }
            Self::Regex { compiled, .. } => {
                let regex = compiled.as_ref().ok()?;
                regex.find(text)?.as_str().to_string()
            }
        };
        Some(preview(&sample, MAX_SAMPLE_CHARS, ""))
    }

    /// Whether the pattern matches anywhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Regex { source: a, .. }, Self::Regex { source: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl From<String> for Pattern {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&str> for Pattern {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "{text}"),
            Self::Regex { source, .. } => write!(f, "/{source}/"),
        }
    }
}

// ---------------------------------------------------------------------------
// Keyword fallback
// ---------------------------------------------------------------------------

/// Words after which the next token names forbidden content.
const TRIGGER_WORDS: &[&str] = &["about", "mention"];
/// Shortest keyword kept by the fallback extractor.
const MIN_KEYWORD_CHARS: usize = 3;

/// Keywords implied by a prohibition's prose: quoted substrings and the
/// word following "about" / "mention".
#[must_use]
pub fn extract_keywords(description: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |candidate: &str| {
        let candidate = candidate.trim();
        if candidate.chars().count() >= MIN_KEYWORD_CHARS
            && !found.iter().any(|f| f.eq_ignore_ascii_case(candidate))
        {
            found.push(candidate.to_string());
        }
    };

    for quoted in quoted_substrings(description) {
        push(&quoted);
    }

    let words: Vec<&str> = description.split_whitespace().collect();
    for pair in words.windows(2) {
        let trigger = pair[0].trim_matches(|c: char| !c.is_alphanumeric());
        // Quoted followers were already taken whole above.
        let quoted = pair[1].starts_with(['"', '\'']);
        if !quoted && TRIGGER_WORDS.iter().any(|t| t.eq_ignore_ascii_case(trigger)) {
            push(pair[1].trim_matches(|c: char| !c.is_alphanumeric()));
        }
    }
    found
}

/// Text between matching `"` pairs, and between `'` pairs whose opening
/// quote does not follow a letter or digit (so apostrophes are ignored).
fn quoted_substrings(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let opens = match c {
            '"' => true,
            '\'' => i == 0 || !chars[i - 1].is_alphanumeric(),
            _ => false,
        };
        if opens {
            let close = (i + 1..chars.len()).find(|&j| {
                chars[j] == c
                    && (c == '"' || j + 1 == chars.len() || !chars[j + 1].is_alphanumeric())
            });
            if let Some(j) = close {
                out.push(chars[i + 1..j].iter().collect());
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// A single rule a response is checked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Stable identifier.
    pub id: String,
    /// Prohibition or requirement.
    pub kind: ConstraintKind,
    /// Human-readable statement of the rule.
    pub description: String,
    /// Text placed in the prompt's rules block.
    #[serde(default)]
    pub prompt_injection_text: String,
    /// Matchers; see [`Pattern`].
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

impl Constraint {
    /// A prohibition with raw patterns (`/…/` means regex).
    #[must_use]
    pub fn prohibition<I, S>(id: impl Into<String>, description: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_kind(ConstraintKind::Prohibition, id, description, patterns)
    }

    /// A requirement with raw patterns. With no patterns it is descriptive
    /// only and always satisfied.
    #[must_use]
    pub fn requirement<I, S>(id: impl Into<String>, description: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_kind(ConstraintKind::Requirement, id, description, patterns)
    }

    fn with_kind<I, S>(
        kind: ConstraintKind,
        id: impl Into<String>,
        description: impl Into<String>,
        patterns: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            prompt_injection_text: String::new(),
            patterns: patterns.into_iter().map(|p| Pattern::parse(p.as_ref())).collect(),
        }
    }

    /// Set the prompt text for this constraint.
    #[must_use]
    pub fn with_injection(mut self, text: impl Into<String>) -> Self {
        self.prompt_injection_text = text.into();
        self
    }

    /// The line rendered into the prompt's rules block.
    #[must_use]
    pub fn prompt_line(&self) -> &str {
        if self.prompt_injection_text.trim().is_empty() {
            &self.description
        } else {
            &self.prompt_injection_text
        }
    }

    /// Patterns actually evaluated: explicit ones, or for a prohibition
    /// without any, literals extracted from the description.
    #[must_use]
    pub fn effective_patterns(&self) -> Vec<Pattern> {
        if !self.patterns.is_empty() || self.kind == ConstraintKind::Requirement {
            return self.patterns.clone();
        }
        extract_keywords(&self.description)
            .into_iter()
            .map(Pattern::Literal)
            .collect()
    }
}

/// Ordered collection of constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet(Vec<Constraint>);

impl ConstraintSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one constraint.
    pub fn push(&mut self, constraint: Constraint) {
        self.0.push(constraint);
    }

    /// Append every constraint of `other`, in order.
    pub fn extend(&mut self, other: ConstraintSet) {
        self.0.extend(other.0);
    }

    /// Constraints in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.0.iter()
    }

    /// Number of constraints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Constraint> {
        self.0.iter().find(|c| c.id == id)
    }

    /// Only the prohibitions.
    pub fn prohibitions(&self) -> impl Iterator<Item = &Constraint> {
        self.0.iter().filter(|c| c.kind == ConstraintKind::Prohibition)
    }

    /// Only the requirements.
    pub fn requirements(&self) -> impl Iterator<Item = &Constraint> {
        self.0.iter().filter(|c| c.kind == ConstraintKind::Requirement)
    }
}

impl FromIterator<Constraint> for ConstraintSet {
    fn from_iter<T: IntoIterator<Item = Constraint>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Constraint>> for ConstraintSet {
    fn from(constraints: Vec<Constraint>) -> Self {
        Self(constraints)
    }
}

impl IntoIterator for ConstraintSet {
    type Item = Constraint;
    type IntoIter = std::vec::IntoIter<Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConstraintSet {
    type Item = &'a Constraint;
    type IntoIter = std::slice::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
