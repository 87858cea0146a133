//! Per-turn context retrieval.
//!
//! The [`Retriever`] turns a user message into query tokens, scores every
//! concept, quote, and chunk in the store by the number of distinct tokens
//! it contains, and fills a [`ContextBundle`] round-robin across the three
//! categories so one category cannot crowd out the others.
//!
//! Retrieval holds the store's read lock for the whole pass, so a bundle
//! never mixes state from before and after a concurrent ingestion.

use serde::{Deserialize, Serialize};

use crate::models::{Concept, Quote};
use crate::store::KnowledgeStore;
use crate::text::{concept_key, contains_phrase, query_tokens};

/// Caps applied by [`Retriever::build_context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    pub max_items: usize,
    pub max_concepts: usize,
    pub max_quotes: usize,
    pub max_chunks: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_items: 5,
            max_concepts: 3,
            max_quotes: 2,
            max_chunks: 3,
        }
    }
}

/// A chunk selected for the prompt, with enough provenance to cite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub title: Option<String>,
    pub chunk_index: usize,
    pub pages: Vec<u32>,
    pub text: String,
}

/// Knowledge selected to ground one chat turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub concepts: Vec<Concept>,
    pub quotes: Vec<Quote>,
    pub chunks: Vec<RetrievedChunk>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.quotes.is_empty() && self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.concepts.len() + self.quotes.len() + self.chunks.len()
    }

    /// Render the bundle as a prompt section. Empty bundles render as `""`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.concepts.is_empty() {
            out.push_str("Relevant concepts:\n");
            for c in &self.concepts {
                out.push_str(&format!("- {}: {}\n", c.name, c.definition));
                for point in &c.key_points {
                    out.push_str(&format!("  * {}\n", point));
                }
            }
        }
        if !self.quotes.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Relevant quotes:\n");
            for q in &self.quotes {
                out.push_str(&format!("- \"{}\"\n", q.text));
            }
        }
        if !self.chunks.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Relevant document excerpts:\n");
            for c in &self.chunks {
                let source = c.title.as_deref().unwrap_or(&c.document_id);
                out.push_str(&format!("[{}{}] {}\n", source, page_label(&c.pages), c.text));
            }
        }
        out
    }
}

fn page_label(pages: &[u32]) -> String {
    match (pages.first(), pages.last()) {
        (Some(first), Some(last)) if first == last => format!(", p. {}", first),
        (Some(first), Some(last)) => format!(", pp. {}-{}", first, last),
        _ => String::new(),
    }
}

/// Concept tier used to break score ties.
fn concept_tier(concept: &Concept, tokens: &[String]) -> u8 {
    let name = concept_key(&concept.name);
    if tokens.iter().any(|t| *t == name) {
        0
    } else if tokens.iter().any(|t| contains_phrase(&name, t)) {
        1
    } else {
        2
    }
}

/// Number of distinct tokens occurring as whole words in `haystack`
/// (already lowercase).
fn overlap(haystack: &str, tokens: &[String]) -> usize {
    tokens.iter().filter(|t| contains_phrase(haystack, t)).count()
}

#[derive(Debug, Clone, Default)]
pub struct Retriever {
    settings: RetrievalSettings,
}

impl Retriever {
    pub fn new(settings: RetrievalSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// [`build_context`](Self::build_context) with the configured `max_items`.
    pub fn context_for(&self, store: &KnowledgeStore, message: &str) -> ContextBundle {
        self.build_context(store, message, self.settings.max_items)
    }

    /// Select at most `max_items` artifacts relevant to `message`.
    ///
    /// A message with no overlapping tokens yields an empty bundle.
    pub fn build_context(
        &self,
        store: &KnowledgeStore,
        message: &str,
        max_items: usize,
    ) -> ContextBundle {
        let tokens = query_tokens(message);
        if tokens.is_empty() || max_items == 0 {
            return ContextBundle::default();
        }

        let view = store.view();

        // (score, tier, insertion index)
        let mut concepts: Vec<(usize, u8, usize, &Concept)> = view
            .concepts()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let haystack = format!("{} {}", concept_key(&c.name), c.definition.to_lowercase());
                let score = overlap(&haystack, &tokens);
                (score > 0).then(|| (score, concept_tier(c, &tokens), i, c))
            })
            .collect();
        concepts.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));
        concepts.truncate(self.settings.max_concepts);

        let mut quotes: Vec<(usize, usize, &Quote)> = view
            .quotes()
            .iter()
            .enumerate()
            .filter_map(|(i, q)| {
                let score = overlap(&q.text.to_lowercase(), &tokens);
                (score > 0).then_some((score, i, q))
            })
            .collect();
        quotes.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        quotes.truncate(self.settings.max_quotes);

        // Documents come back in listing order and chunks in index order,
        // so the enumeration index is the tie-breaker.
        let mut chunks: Vec<(usize, usize, RetrievedChunk)> = view
            .documents()
            .iter()
            .flat_map(|d| d.chunks.iter().map(move |c| (d, c)))
            .enumerate()
            .filter_map(|(i, (doc, chunk))| {
                let score = overlap(&chunk.text.to_lowercase(), &tokens);
                (score > 0).then(|| {
                    (
                        score,
                        i,
                        RetrievedChunk {
                            document_id: doc.id.clone(),
                            title: doc.title.clone(),
                            chunk_index: chunk.index,
                            pages: chunk.pages.clone(),
                            text: chunk.text.clone(),
                        },
                    )
                })
            })
            .collect();
        chunks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        chunks.truncate(self.settings.max_chunks);

        let mut concepts = concepts.into_iter().map(|(_, _, _, c)| c.clone());
        let mut quotes = quotes.into_iter().map(|(_, _, q)| q.clone());
        let mut chunks = chunks.into_iter().map(|(_, _, c)| c);

        let mut bundle = ContextBundle::default();
        loop {
            let before = bundle.len();
            if bundle.len() < max_items {
                if let Some(c) = concepts.next() {
                    bundle.concepts.push(c);
                }
            }
            if bundle.len() < max_items {
                if let Some(q) = quotes.next() {
                    bundle.quotes.push(q);
                }
            }
            if bundle.len() < max_items {
                if let Some(c) = chunks.next() {
                    bundle.chunks.push(c);
                }
            }
            if bundle.len() == before || bundle.len() >= max_items {
                break;
            }
        }
        bundle
    }
}
