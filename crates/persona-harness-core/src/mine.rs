//! Signal miner: quotable sentences and concept mentions.
//!
//! Mining is purely lexical. No model is consulted, and the output is a
//! deterministic function of the input text, the miner settings, and the
//! concept names passed in.
//!
//! # Quote heuristic
//!
//! A candidate must normalize to between `min_quote_chars` and
//! `max_quote_chars` characters and carry at least one strong indicator:
//!
//! 1. **Quoted**: the span sits between matching `"…"` or `“…”` marks.
//! 2. **Scored sentence**: a sentence (split after `.`, `!`, `?`) whose
//!    score reaches `min_score`:
//!
//! | Feature | Score |
//! |---------|-------|
//! | first-person pronoun (`i`, `i'm`, `my`, `me`, `we`, `our`, `us`) | +2 |
//! | aphoristic marker (`always`, `never`, `is not`, `are not`, `must`, `the main`, `the key`) | +1 |
//! | declarative cadence: starts uppercase, ends with `.` or `!` | +1 |
//! | at least 30% of non-space chars are digits | −2 |
//! | ends with `?` | −2 |
//!
//! Quoted spans are collected first, then scored sentences, both in text
//! order. Candidates are deduplicated case-insensitively and capped at
//! `max_quotes`.
//!
//! # Concept mentions
//!
//! Every concept name and vocabulary term is matched case-insensitively on
//! word boundaries, with `_` and `-` read as spaces. Each distinct match is
//! reported once, in the order the names were supplied (concepts first, then
//! vocabulary). A name whose key lies inside an already reported key
//! (`boom-bust` inside `boom-bust cycles`) is not reported again.

use serde::{Deserialize, Serialize};

use crate::text::{contains_phrase, fold_key, normalize_whitespace};

const FIRST_PERSON: &[&str] = &["i", "i'm", "my", "me", "we", "our", "us"];
const APHORISTIC: &[&str] = &[
    "always", "never", "is not", "are not", "must", "the main", "the key",
];

/// Terms worth counting even when no concept carries their name.
pub const DEFAULT_VOCABULARY: &[&str] = &[
    "reflexivity",
    "fallibility",
    "open society",
    "market fundamentalism",
    "boom-bust",
    "bubble",
    "regulation",
    "democracy",
    "capitalism",
    "globalization",
    "inequality",
    "sustainability",
];

/// Tunables for [`SignalMiner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinerSettings {
    pub min_quote_chars: usize,
    pub max_quote_chars: usize,
    pub max_quotes: usize,
    pub min_score: i32,
    pub vocabulary: Vec<String>,
}

impl Default for MinerSettings {
    fn default() -> Self {
        Self {
            min_quote_chars: 20,
            max_quote_chars: 300,
            max_quotes: 10,
            min_score: 2,
            vocabulary: DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Output of [`SignalMiner::mine`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MinedSignals {
    pub quotes: Vec<String>,
    pub concept_mentions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SignalMiner {
    settings: MinerSettings,
}

impl SignalMiner {
    pub fn new(settings: MinerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MinerSettings {
        &self.settings
    }

    /// Mine `text` for quotes and mentions of `concept_names` plus the
    /// configured vocabulary. Never fails.
    pub fn mine(&self, text: &str, concept_names: &[String]) -> MinedSignals {
        MinedSignals {
            quotes: self.extract_quotes(text),
            concept_mentions: self.find_mentions(text, concept_names),
        }
    }

    /// Quote candidates in discovery order, deduplicated and capped.
    pub fn extract_quotes(&self, text: &str) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        let mut out: Vec<String> = Vec::new();

        let quoted = quoted_spans(text);
        let sentences = split_sentences(text)
            .into_iter()
            .filter(|s| score_sentence(s) >= self.settings.min_score);

        for candidate in quoted.into_iter().chain(sentences) {
            if out.len() >= self.settings.max_quotes {
                break;
            }
            let normalized = normalize_whitespace(&candidate);
            let len = normalized.chars().count();
            if len < self.settings.min_quote_chars || len > self.settings.max_quote_chars {
                continue;
            }
            let key = fold_key(&normalized);
            // A sentence that merely wraps an already-taken quotation is the same quote.
            if seen.iter().any(|k| *k == key || key.contains(k.as_str())) {
                continue;
            }
            seen.push(key);
            out.push(normalized);
        }
        out
    }

    /// Names from `concept_names` and the vocabulary that occur in `text`.
    pub fn find_mentions(&self, text: &str, concept_names: &[String]) -> Vec<String> {
        let haystack = normalize_whitespace(&text.replace('-', " ")).to_lowercase();
        let mut found: Vec<String> = Vec::new();
        let mut keys: Vec<String> = Vec::new();
        for name in concept_names.iter().chain(self.settings.vocabulary.iter()) {
            let key = fold_key(&name.replace(['_', '-'], " "));
            if key.is_empty() || keys.iter().any(|k| contains_phrase(k, &key)) {
                continue;
            }
            if contains_phrase(&haystack, &key) {
                keys.push(key);
                found.push(name.clone());
            }
        }
        found
    }
}

/// Spans between matching straight or curly double quotes.
fn quoted_spans(text: &str) -> Vec<String> {
    let mut spans = Vec::new();
    let mut open: Option<(char, usize)> = None;
    for (i, c) in text.char_indices() {
        match (open, c) {
            (None, '"') => open = Some(('"', i + c.len_utf8())),
            (None, '“') => open = Some(('”', i + c.len_utf8())),
            (Some((close, start)), c) if c == close => {
                spans.push(text[start..i].to_string());
                open = None;
            }
            _ => {}
        }
    }
    spans
}

/// Split after `.`, `!`, or `?` when followed by whitespace or end of text.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = iter.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Score a sentence with the table in the module docs.
fn score_sentence(sentence: &str) -> i32 {
    let lower = sentence.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();

    let mut score = 0;
    if words.iter().any(|w| FIRST_PERSON.contains(w)) {
        score += 2;
    }
    if APHORISTIC.iter().any(|m| contains_phrase(&lower, m)) {
        score += 1;
    }
    let starts_upper = sentence.chars().next().is_some_and(|c| c.is_uppercase());
    if starts_upper && (sentence.ends_with('.') || sentence.ends_with('!')) {
        score += 1;
    }
    let non_space = sentence.chars().filter(|c| !c.is_whitespace()).count();
    let digits = sentence.chars().filter(|c| c.is_ascii_digit()).count();
    if non_space > 0 && digits * 10 >= non_space * 3 {
        score -= 2;
    }
    if sentence.ends_with('?') {
        score -= 2;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn miner() -> SignalMiner {
        SignalMiner::default()
    }

    #[test]
    fn quoted_text_is_a_quote() {
        let text = r#"He once said "Markets are constantly in a state of uncertainty" at dinner"#;
        let quotes = miner().extract_quotes(text);
        assert_eq!(quotes, vec!["Markets are constantly in a state of uncertainty"]);
    }

    #[test]
    fn curly_quotes_are_recognized() {
        let text = "Then: “The euro is like a marriage without a divorce clause” he said";
        let quotes = miner().extract_quotes(text);
        assert_eq!(quotes, vec!["The euro is like a marriage without a divorce clause"]);
    }

    #[test]
    fn first_person_declarative_sentence_scores() {
        let text = "I am only rich because I know when I am wrong. The table has four legs";
        let quotes = miner().extract_quotes(text);
        assert_eq!(quotes, vec!["I am only rich because I know when I am wrong."]);
    }

    #[test]
    fn plain_sentences_and_questions_are_skipped() {
        let text = "The report covers the period in detail. Why do we keep making the same errors?";
        assert!(miner().extract_quotes(text).is_empty());
    }

    #[test]
    fn length_bounds_apply() {
        let short = r#""Too short""#;
        assert!(miner().extract_quotes(short).is_empty());
        let long = format!("\"{}\"", "word ".repeat(80));
        assert!(miner().extract_quotes(&long).is_empty());
    }

    #[test]
    fn duplicate_quotes_collapse() {
        let text = r#""We must   learn from our mistakes" and again "we must learn from our mistakes""#;
        assert_eq!(miner().extract_quotes(text).len(), 1);
    }

    #[test]
    fn sentence_wrapping_a_quotation_is_not_a_second_quote() {
        let text = r#"I said "we must always admit our errors quickly" to the board."#;
        let quotes = miner().extract_quotes(text);
        assert_eq!(quotes, vec!["we must always admit our errors quickly"]);
    }

    #[test]
    fn quote_cap_is_enforced() {
        let text = (0..30)
            .map(|i| format!("\"We must remember lesson number {} forever\"", i))
            .collect::<Vec<_>>()
            .join(" ");
        let settings = MinerSettings {
            max_quotes: 4,
            ..MinerSettings::default()
        };
        assert_eq!(SignalMiner::new(settings).extract_quotes(&text).len(), 4);
    }

    #[test]
    fn mentions_match_concepts_and_vocabulary_case_insensitively() {
        let text = "Reflexivity shapes the OPEN\nSociety and its bubbles.";
        let names = vec!["reflexivity".to_string(), "open_society".to_string()];
        let mentions = miner().find_mentions(text, &names);
        assert_eq!(mentions, vec!["reflexivity", "open_society"]);
    }

    #[test]
    fn mentions_are_not_double_counted_across_sources() {
        let text = "reflexivity everywhere";
        let names = vec!["Reflexivity".to_string()];
        assert_eq!(miner().find_mentions(text, &names), vec!["Reflexivity"]);
    }

    #[test]
    fn hyphenated_names_match_either_spelling() {
        let names = vec!["boom-bust cycles".to_string()];
        assert_eq!(
            miner().find_mentions("classic boom bust cycles", &names),
            vec!["boom-bust cycles"]
        );
        assert_eq!(
            miner().find_mentions("the boom-bust cycles of credit", &names),
            vec!["boom-bust cycles"]
        );
    }

    #[test]
    fn vocabulary_term_inside_a_matched_concept_is_not_reported_twice() {
        let names = vec!["boom-bust cycles".to_string()];
        let mentions = miner().find_mentions("Credit drives boom-bust cycles.", &names);
        assert_eq!(mentions, vec!["boom-bust cycles"]);

        let mentions = miner().find_mentions("A boom-bust episode.", &names);
        assert_eq!(mentions, vec!["boom-bust"]);
    }

    #[test]
    fn mining_plain_text_never_panics() {
        let signals = miner().mine("\"unterminated quote ... ?! ”“", &[]);
        assert!(signals.concept_mentions.is_empty());
    }
}
