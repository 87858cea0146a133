//! Core data models for the ingestion and retrieval pipeline.
//!
//! These types flow between the extractor, chunker, miner, store, and
//! retriever. All of them serialize with serde so the app crate can hand
//! them straight to the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Char range of one source page inside the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    /// 1-based page number.
    pub page: u32,
    /// Inclusive start char offset.
    pub start: usize,
    /// Exclusive end char offset.
    pub end: usize,
}

/// Maps char offsets of extracted text back to source pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMap {
    pub spans: Vec<PageSpan>,
}

impl PageMap {
    pub fn new(spans: Vec<PageSpan>) -> Self {
        Self { spans }
    }

    /// Number of pages recorded, including pages with no text.
    pub fn page_count(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Sorted page numbers whose non-empty span intersects `[start, end)`.
    ///
    /// Text between pages (the separator) belongs to the preceding non-empty
    /// page, so any non-empty range maps to at least one page when the map
    /// has text.
    pub fn pages_for(&self, start: usize, end: usize) -> Vec<u32> {
        let mut pages: Vec<u32> = self
            .spans
            .iter()
            .filter(|s| s.start < s.end && s.start < end && s.end > start)
            .map(|s| s.page)
            .collect();
        if pages.is_empty() && start < end {
            let preceding = self
                .spans
                .iter()
                .filter(|s| s.start < s.end && s.end <= start)
                .last()
                .or_else(|| self.spans.iter().find(|s| s.start < s.end));
            pages.extend(preceding.map(|s| s.page));
        }
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

/// A bounded, ordered span of document text with page provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable id: `{document_id}#{index}`.
    pub id: String,
    pub document_id: String,
    /// Zero-based position in reading order.
    pub index: usize,
    pub text: String,
    /// Inclusive start char offset in the source text.
    pub char_start: usize,
    /// Exclusive end char offset in the source text.
    pub char_end: usize,
    /// Pages the span touches, ascending.
    pub pages: Vec<u32>,
}

/// An ingested document and everything mined from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Normalized path/identifier, or `sha256:<hex>` of the bytes.
    pub id: String,
    /// Identifier as supplied by the caller (file name or path).
    pub source_path: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: usize,
    /// Length of the extracted text in chars.
    pub char_count: usize,
    pub word_count: usize,
    pub chunks: Vec<Chunk>,
    /// Quotes mined from this document (normalized).
    pub quotes: Vec<String>,
    /// Concept and vocabulary terms mentioned in this document.
    pub concepts: Vec<String>,
    /// SHA-256 hex digest of the PDF bytes.
    pub content_hash: String,
    /// Name of the extraction backend that produced the text.
    pub backend: String,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentRecord {
    pub fn quotes_extracted(&self) -> usize {
        self.quotes.len()
    }

    pub fn concepts_found(&self) -> usize {
        self.concepts.len()
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id.clone(),
            path: self.source_path.clone(),
            title: self.title.clone(),
            word_count: self.word_count,
            chunks: self.chunks.len(),
            pages: self.page_count,
            quotes_extracted: self.quotes_extracted(),
            concepts_found: self.concepts_found(),
            ingested_at: self.ingested_at,
        }
    }
}

/// Listing view of a [`DocumentRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub path: String,
    pub title: Option<String>,
    pub word_count: usize,
    pub chunks: usize,
    pub pages: usize,
    pub quotes_extracted: usize,
    pub concepts_found: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Where a knowledge artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    BuiltIn,
    Extracted,
    UserSubmitted,
}

/// A named concept with a definition and a set of key points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    pub definition: String,
    pub key_points: Vec<String>,
    pub provenance: Provenance,
}

/// A stored quote. `text` is already whitespace-normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    pub provenance: Provenance,
}

/// Validated input for adding or merging a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConcept {
    pub name: String,
    pub definition: String,
    pub key_points: Vec<String>,
    #[serde(default = "default_user_provenance")]
    pub provenance: Provenance,
}

/// Validated input for adding a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuote {
    pub text: String,
    #[serde(default = "default_user_provenance")]
    pub provenance: Provenance,
}

fn default_user_provenance() -> Provenance {
    Provenance::UserSubmitted
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregate counters returned by `get_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub documents: usize,
    pub chunks: usize,
    pub quotes: usize,
    pub concepts: usize,
    pub conversation_turns: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_for_ignores_empty_spans() {
        let map = PageMap::new(vec![
            PageSpan { page: 1, start: 0, end: 10 },
            PageSpan { page: 2, start: 12, end: 12 },
            PageSpan { page: 3, start: 14, end: 30 },
        ]);
        assert_eq!(map.pages_for(0, 30), vec![1, 3]);
        assert_eq!(map.pages_for(10, 14), vec![1]);
        assert_eq!(map.pages_for(12, 13), vec![1]);
        assert_eq!(PageMap::default().pages_for(0, 5), Vec::<u32>::new());
        assert_eq!(map.pages_for(9, 15), vec![1, 3]);
        assert_eq!(map.page_count(), 3);
    }

    #[test]
    fn new_quote_defaults_to_user_submitted() {
        let q: NewQuote = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(q.provenance, Provenance::UserSubmitted);
    }
}
