//! Pronunciation substitution
//!
//! Rules replace a whole word (case-insensitive) with a spoken alias before
//! the script is chunked, so a replacement can never straddle a chunk
//! boundary.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// A word and the alias the narrator should say instead
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PronunciationRule {
    pub word: String,
    pub alias: String,
}

impl PronunciationRule {
    #[must_use]
    pub fn new(word: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            alias: alias.into(),
        }
    }
}

/// How a rule list is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewriteMode {
    /// Each rule scans the output of the previous one
    ///
    /// An alias that contains a later rule's word is rewritten again.
    #[default]
    Sequential,
    /// All rules match against the original text; aliases are never rescanned
    Simultaneous,
}

/// Apply `rules` to `text`
#[must_use]
pub fn rewrite(text: &str, rules: &[PronunciationRule], mode: RewriteMode) -> String {
    match mode {
        RewriteMode::Sequential => rewrite_sequential(text, rules),
        RewriteMode::Simultaneous => rewrite_simultaneous(text, rules),
    }
}

fn rewrite_sequential(text: &str, rules: &[PronunciationRule]) -> String {
    let mut out = text.to_string();

    for rule in rules {
        let Some(re) = word_regex(&[rule.word.as_str()]) else {
            continue;
        };
        let replaced = re.replace_all(&out, regex::NoExpand(&rule.alias));
        if let std::borrow::Cow::Owned(s) = replaced {
            tracing::trace!(word = %rule.word, alias = %rule.alias, "pronunciation rule applied");
            out = s;
        }
    }

    out
}

fn rewrite_simultaneous(text: &str, rules: &[PronunciationRule]) -> String {
    let active: Vec<&PronunciationRule> =
        rules.iter().filter(|r| !r.word.trim().is_empty()).collect();
    let words: Vec<&str> = active.iter().map(|r| r.word.trim()).collect();

    let Some(re) = word_regex(&words) else {
        return text.to_string();
    };

    re.replace_all(text, |caps: &regex::Captures<'_>| {
        let matched = &caps[0];
        // Alternation order follows rule order, so the first equal word wins
        active
            .iter()
            .find(|r| r.word.trim().to_lowercase() == matched.to_lowercase())
            .map_or_else(|| matched.to_string(), |r| r.alias.clone())
    })
    .into_owned()
}

/// Build a case-insensitive whole-word alternation; `None` when nothing to match
fn word_regex(words: &[&str]) -> Option<Regex> {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| w.trim())
        .filter(|w| !w.is_empty())
        .map(bounded)
        .collect();

    if alternatives.is_empty() {
        return None;
    }

    let pattern = alternatives.join("|");
    match RegexBuilder::new(&pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "skipping unbuildable pronunciation rule");
            None
        }
    }
}

/// Escape `word` and anchor it with `\b` on each edge that is a word char
///
/// `\b` next to a symbol like the `#` in "C#" would require a word char on
/// the far side, so those edges are left unanchored.
fn bounded(word: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let head = if is_word(word.chars().next()) { r"\b" } else { "" };
    let tail = if is_word(word.chars().next_back()) { r"\b" } else { "" };
    format!("{head}{}{tail}", regex::escape(word))
}
