//! Small text helpers shared by the store, miner, and retriever.

/// Collapse every whitespace run to a single space and trim the ends.
///
/// This is the identity used for quote deduplication: two quotes that
/// differ only in whitespace normalize to the same string.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Case-insensitive identity key for concept names.
///
/// `Open_Society`, `open  society`, and `OPEN SOCIETY` share a key.
pub fn concept_key(name: &str) -> String {
    normalize_whitespace(&name.replace('_', " ")).to_lowercase()
}

/// Case-insensitive key for quotes and key points.
pub fn fold_key(s: &str) -> String {
    normalize_whitespace(s).to_lowercase()
}

/// Words ignored when turning a user message into query tokens.
const STOPWORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "and", "any", "are", "been", "before", "being",
    "but", "can", "could", "did", "does", "doing", "for", "from", "had", "has", "have", "her",
    "here", "his", "how", "into", "its", "just", "more", "most", "not", "now", "off", "once",
    "only", "other", "our", "out", "over", "own", "same", "she", "should", "some", "such", "than",
    "that", "the", "their", "them", "then", "there", "these", "they", "this", "those", "through",
    "too", "under", "until", "very", "was", "were", "what", "when", "where", "which", "while",
    "who", "whom", "why", "will", "with", "would", "you", "your", "think", "tell",
];

/// Split a message into lowercase query tokens.
///
/// Tokens are alphanumeric runs (inner `'` and `-` kept) of at least three
/// characters, minus stopwords, deduplicated in first-seen order.
pub fn query_tokens(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut tokens: Vec<String> = Vec::new();
    for raw in lower.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-')) {
        let word = raw.trim_matches(|c: char| c == '\'' || c == '-');
        if word.chars().count() < 3 || STOPWORDS.contains(&word) {
            continue;
        }
        if !tokens.iter().any(|t| t == word) {
            tokens.push(word.to_string());
        }
    }
    tokens
}

/// Whether `phrase` occurs in `haystack` on word boundaries.
///
/// Both arguments are expected to be lowercase already. `_` in the phrase
/// matches a space, so concept keys stored with underscores still match
/// running prose.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let phrase = phrase.replace('_', " ");
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(phrase) {
        let start = from + pos;
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = start
            + haystack[start..]
                .chars()
                .next()
                .map_or(1, |c| c.len_utf8());
    }
    false
}

/// Number of whitespace-separated words.
pub fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_mixed_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b   c "), "a b c");
        assert_eq!(normalize_whitespace("   "), "");
    }

    #[test]
    fn concept_key_ignores_case_and_underscores() {
        assert_eq!(concept_key("Open_Society"), concept_key("open  society"));
        assert_eq!(concept_key("Boom-Bust"), "boom-bust");
    }

    #[test]
    fn query_tokens_drop_stopwords_and_short_words() {
        let tokens = query_tokens("What do you think about the Open Society, and is it open?");
        assert_eq!(tokens, vec!["open", "society"]);
    }

    #[test]
    fn query_tokens_keep_inner_hyphens() {
        assert_eq!(query_tokens("boom-bust cycles"), vec!["boom-bust", "cycles"]);
    }

    #[test]
    fn phrase_match_respects_word_boundaries() {
        assert!(contains_phrase("the open society is fragile", "open society"));
        assert!(contains_phrase("an open society", "open_society"));
        assert!(!contains_phrase("bubbles everywhere", "bubble"));
        assert!(contains_phrase("a bubble, then a bust", "bubble"));
        assert!(!contains_phrase("anything", ""));
    }
}
