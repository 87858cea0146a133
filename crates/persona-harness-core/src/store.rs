//! In-process knowledge store.
//!
//! [`KnowledgeStore`] owns every document record, concept, quote, and the
//! conversation transcript behind a single `RwLock`. Reads (`search_concepts`,
//! `random_quote`, `get_stats`, `transcript`, retrieval views) share the read
//! lock; every mutation takes the write lock, so ingestion installs and chat
//! appends never interleave and readers never see a half-installed document.
//!
//! # Identity keys
//!
//! | Artifact | Key | Repeat write |
//! |----------|-----|--------------|
//! | Document | `DocumentRecord::id` | replaces the record in place |
//! | Quote | whitespace-collapsed text | ignored (first provenance wins) |
//! | Concept | lowercase name, `_` as space | definition overwritten, key points unioned |

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KnowledgeError;
use crate::memory::{ConversationMemory, DEFAULT_MAX_TURNS};
use crate::models::{
    Concept, DocumentRecord, DocumentSummary, KnowledgeStats, NewConcept, NewQuote, Provenance,
    Quote, Turn,
};
use crate::seed;
use crate::text::{concept_key, fold_key, normalize_whitespace};

/// Why a concept matched a search, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRank {
    ExactName,
    NameContains,
    DefinitionContains,
    KeyPointContains,
}

/// A ranked concept search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConceptMatch {
    pub concept: Concept,
    pub rank: MatchRank,
}

/// Result of [`KnowledgeStore::upsert_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// An earlier record with the same id was replaced.
    pub replaced: bool,
    /// Quotes from this record that were new to the store.
    pub quotes_added: usize,
}

/// Result of [`KnowledgeStore::add_concept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConceptWrite {
    pub created: bool,
    pub key_points_added: usize,
}

/// Serializable copy of the concept and quote tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeSnapshot {
    pub concepts: Vec<Concept>,
    pub quotes: Vec<Quote>,
}

#[derive(Debug, Default)]
struct KnowledgeState {
    documents: Vec<DocumentRecord>,
    document_index: HashMap<String, usize>,
    concepts: Vec<Concept>,
    concept_index: HashMap<String, usize>,
    quotes: Vec<Quote>,
    quote_keys: HashSet<String>,
    memory: ConversationMemory,
}

impl KnowledgeState {
    fn insert_quote(&mut self, text: &str, provenance: Provenance) -> Result<bool, KnowledgeError> {
        let normalized = normalize_whitespace(text);
        if normalized.is_empty() {
            return Err(KnowledgeError::invalid("quote text must not be empty"));
        }
        if !self.quote_keys.insert(normalized.clone()) {
            return Ok(false);
        }
        self.quotes.push(Quote {
            text: normalized,
            provenance,
        });
        Ok(true)
    }

    fn merge_concept(&mut self, input: NewConcept) -> Result<ConceptWrite, KnowledgeError> {
        let name = normalize_whitespace(&input.name);
        let key = concept_key(&name);
        if key.is_empty() {
            return Err(KnowledgeError::invalid("concept name must not be empty"));
        }
        let definition = normalize_whitespace(&input.definition);
        if definition.is_empty() {
            return Err(KnowledgeError::invalid("concept definition must not be empty"));
        }
        let points: Vec<String> = input
            .key_points
            .iter()
            .map(|p| normalize_whitespace(p))
            .filter(|p| !p.is_empty())
            .collect();
        if points.is_empty() {
            return Err(KnowledgeError::invalid(
                "concept needs at least one key point",
            ));
        }

        let (concept, created) = match self.concept_index.get(&key) {
            Some(&idx) => (&mut self.concepts[idx], false),
            None => {
                self.concept_index.insert(key, self.concepts.len());
                self.concepts.push(Concept {
                    name,
                    definition: String::new(),
                    key_points: Vec::new(),
                    provenance: input.provenance,
                });
                let last = self.concepts.len() - 1;
                (&mut self.concepts[last], true)
            }
        };

        concept.definition = definition;
        let mut existing: HashSet<String> = concept.key_points.iter().map(|p| fold_key(p)).collect();
        let mut added = 0;
        for point in points {
            if existing.insert(fold_key(&point)) {
                concept.key_points.push(point);
                added += 1;
            }
        }

        Ok(ConceptWrite {
            created,
            key_points_added: added,
        })
    }
}

/// Process-wide knowledge repository. Share it as `Arc<KnowledgeStore>`.
#[derive(Debug)]
pub struct KnowledgeStore {
    state: RwLock<KnowledgeState>,
}

impl KnowledgeStore {
    /// An empty store whose transcript keeps at most `max_turns` turns.
    pub fn new(max_turns: usize) -> Self {
        Self {
            state: RwLock::new(KnowledgeState {
                memory: ConversationMemory::new(max_turns),
                ..KnowledgeState::default()
            }),
        }
    }

    /// A store populated with the built-in concepts and quotes.
    pub fn seeded(max_turns: usize) -> Self {
        let store = Self::new(max_turns);
        {
            let mut state = store.write();
            for concept in seed::concepts() {
                // Seed entries are static and valid.
                let _ = state.merge_concept(concept);
            }
            for quote in seed::quotes() {
                let _ = state.insert_quote(quote, Provenance::BuiltIn);
            }
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, KnowledgeState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, KnowledgeState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ============ Documents ============

    /// Install a fully built record and merge its quotes, atomically.
    ///
    /// A record with the same id is replaced in place, so re-ingesting a
    /// file never changes document, quote, or concept counts.
    pub fn upsert_document(&self, record: DocumentRecord) -> UpsertOutcome {
        let mut guard = self.write();
        let state = &mut *guard;
        let mut quotes_added = 0;
        for quote in &record.quotes {
            if let Ok(true) = state.insert_quote(quote, Provenance::Extracted) {
                quotes_added += 1;
            }
        }

        let replaced = match state.document_index.get(&record.id) {
            Some(&idx) => {
                state.documents[idx] = record;
                true
            }
            None => {
                let idx = state.documents.len();
                state.document_index.insert(record.id.clone(), idx);
                state.documents.push(record);
                false
            }
        };
        debug!(replaced, quotes_added, "document installed");

        UpsertOutcome {
            replaced,
            quotes_added,
        }
    }

    /// Document summaries in first-ingestion order.
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.read().documents.iter().map(|d| d.summary()).collect()
    }

    pub fn get_document(&self, id: &str) -> Option<DocumentRecord> {
        let state = self.read();
        state
            .document_index
            .get(id)
            .map(|&idx| state.documents[idx].clone())
    }

    // ============ Quotes ============

    /// Store a quote unless its normalized text is already present.
    ///
    /// Returns `Ok(true)` when the quote was new.
    pub fn add_quote(&self, text: &str, provenance: Provenance) -> Result<bool, KnowledgeError> {
        self.write().insert_quote(text, provenance)
    }

    pub fn add_new_quote(&self, input: NewQuote) -> Result<bool, KnowledgeError> {
        self.add_quote(&input.text, input.provenance)
    }

    pub fn quotes(&self) -> Vec<Quote> {
        self.read().quotes.clone()
    }

    /// A uniformly selected quote.
    pub fn random_quote(&self) -> Result<Quote, KnowledgeError> {
        self.random_quote_with(&mut rand::thread_rng())
    }

    pub fn random_quote_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Quote, KnowledgeError> {
        self.read()
            .quotes
            .choose(rng)
            .cloned()
            .ok_or(KnowledgeError::EmptyStore)
    }

    // ============ Concepts ============

    /// Add a concept or merge into the existing one with the same name.
    pub fn add_concept(&self, input: NewConcept) -> Result<ConceptWrite, KnowledgeError> {
        self.write().merge_concept(input)
    }

    pub fn get_concept(&self, name: &str) -> Option<Concept> {
        let state = self.read();
        state
            .concept_index
            .get(&concept_key(name))
            .map(|&idx| state.concepts[idx].clone())
    }

    pub fn concepts(&self) -> Vec<Concept> {
        self.read().concepts.clone()
    }

    /// Display names of every concept, in insertion order.
    pub fn concept_names(&self) -> Vec<String> {
        self.read().concepts.iter().map(|c| c.name.clone()).collect()
    }

    /// Case-insensitive substring search over names, definitions, and key points.
    ///
    /// Ranked exact name, then name contains, then definition contains,
    /// then key point contains. Ties keep insertion order.
    pub fn search_concepts(&self, query: &str) -> Vec<ConceptMatch> {
        let state = self.read();
        let mut hits: Vec<ConceptMatch> = state
            .concepts
            .iter()
            .filter_map(|c| {
                concept_rank(c, query).map(|rank| ConceptMatch {
                    concept: c.clone(),
                    rank,
                })
            })
            .collect();
        // Stable sort keeps insertion order within a rank.
        hits.sort_by_key(|m| m.rank);
        hits
    }

    // ============ Conversation ============

    pub fn append_turn(&self, turn: Turn) {
        self.write().memory.append(turn);
    }

    /// Append a user turn and its reply under one lock.
    pub fn append_exchange(&self, user: Turn, assistant: Turn) {
        let mut state = self.write();
        state.memory.append(user);
        state.memory.append(assistant);
    }

    pub fn transcript(&self) -> Vec<Turn> {
        self.read().memory.transcript()
    }

    pub fn clear_memory(&self) {
        self.write().memory.clear();
    }

    // ============ Aggregates ============

    pub fn get_stats(&self) -> KnowledgeStats {
        let state = self.read();
        KnowledgeStats {
            documents: state.documents.len(),
            chunks: state.documents.iter().map(|d| d.chunks.len()).sum(),
            quotes: state.quotes.len(),
            concepts: state.concepts.len(),
            conversation_turns: state.memory.len(),
        }
    }

    /// Consistent read-only view for multi-table reads such as retrieval.
    pub fn view(&self) -> KnowledgeView<'_> {
        KnowledgeView { state: self.read() }
    }

    pub fn snapshot(&self) -> KnowledgeSnapshot {
        let state = self.read();
        KnowledgeSnapshot {
            concepts: state.concepts.clone(),
            quotes: state.quotes.clone(),
        }
    }

    /// Merge a snapshot through the normal dedup paths.
    ///
    /// Invalid entries are skipped; returns how many concepts and quotes
    /// were new.
    pub fn restore(&self, snapshot: KnowledgeSnapshot) -> (usize, usize) {
        let mut state = self.write();
        let mut concepts_added = 0;
        for c in snapshot.concepts {
            let input = NewConcept {
                name: c.name,
                definition: c.definition,
                key_points: c.key_points,
                provenance: c.provenance,
            };
            if let Ok(write) = state.merge_concept(input) {
                concepts_added += usize::from(write.created);
            }
        }
        let mut quotes_added = 0;
        for q in snapshot.quotes {
            if let Ok(true) = state.insert_quote(&q.text, q.provenance) {
                quotes_added += 1;
            }
        }
        (concepts_added, quotes_added)
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

/// Read guard over the store's tables. Holds the read lock until dropped.
pub struct KnowledgeView<'a> {
    state: RwLockReadGuard<'a, KnowledgeState>,
}

impl KnowledgeView<'_> {
    pub fn concepts(&self) -> &[Concept] {
        &self.state.concepts
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.state.quotes
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.state.documents
    }
}

/// Best rank at which `concept` matches `query`, if any.
pub fn concept_rank(concept: &Concept, query: &str) -> Option<MatchRank> {
    let name_q = concept_key(query);
    let text_q = fold_key(query);
    if name_q.is_empty() {
        return None;
    }
    let name = concept_key(&concept.name);
    if name == name_q {
        Some(MatchRank::ExactName)
    } else if name.contains(&name_q) {
        Some(MatchRank::NameContains)
    } else if fold_key(&concept.definition).contains(&text_q) {
        Some(MatchRank::DefinitionContains)
    } else if concept
        .key_points
        .iter()
        .any(|p| fold_key(p).contains(&text_q))
    {
        Some(MatchRank::KeyPointContains)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Provenance};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn concept(name: &str, definition: &str, points: &[&str]) -> NewConcept {
        NewConcept {
            name: name.to_string(),
            definition: definition.to_string(),
            key_points: points.iter().map(|p| p.to_string()).collect(),
            provenance: Provenance::UserSubmitted,
        }
    }

    fn record(id: &str, quotes: &[&str]) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            source_path: id.to_string(),
            title: None,
            author: None,
            page_count: 1,
            char_count: 5,
            word_count: 1,
            chunks: vec![Chunk {
                id: format!("{}#0", id),
                document_id: id.to_string(),
                index: 0,
                text: "hello".to_string(),
                char_start: 0,
                char_end: 5,
                pages: vec![1],
            }],
            quotes: quotes.iter().map(|q| q.to_string()).collect(),
            concepts: vec!["reflexivity".to_string()],
            content_hash: "abc".to_string(),
            backend: "test".to_string(),
            ingested_at: Utc::now(),
        }
    }

    #[test]
    fn quote_dedup_ignores_whitespace_and_origin() {
        let store = KnowledgeStore::new(10);
        assert!(store
            .add_quote("We  must learn\nfrom mistakes.", Provenance::UserSubmitted)
            .unwrap());
        assert!(!store
            .add_quote(" We must learn from mistakes. ", Provenance::Extracted)
            .unwrap());
        let quotes = store.quotes();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].text, "We must learn from mistakes.");
        assert_eq!(quotes[0].provenance, Provenance::UserSubmitted);
    }

    #[test]
    fn empty_quote_rejected() {
        let store = KnowledgeStore::new(10);
        assert!(matches!(
            store.add_quote("   ", Provenance::UserSubmitted),
            Err(KnowledgeError::InvalidInput(_))
        ));
    }

    #[test]
    fn concept_merge_unions_key_points_case_insensitively() {
        let store = KnowledgeStore::new(10);
        store
            .add_concept(concept("Reflexivity", "old", &["Perceptions matter", "Cycles"]))
            .unwrap();
        let write = store
            .add_concept(concept("reflexivity", "new", &["perceptions MATTER", "Feedback"]))
            .unwrap();
        assert!(!write.created);
        assert_eq!(write.key_points_added, 1);

        let c = store.get_concept("REFLEXIVITY").unwrap();
        assert_eq!(c.definition, "new");
        assert_eq!(c.key_points, vec!["Perceptions matter", "Cycles", "Feedback"]);
        assert_eq!(store.get_stats().concepts, 1);
    }

    #[test]
    fn concept_validation() {
        let store = KnowledgeStore::new(10);
        assert!(store.add_concept(concept("", "d", &["p"])).is_err());
        assert!(store.add_concept(concept("n", " ", &["p"])).is_err());
        assert!(store.add_concept(concept("n", "d", &[" "])).is_err());
        assert_eq!(store.get_stats().concepts, 0);
    }

    #[test]
    fn search_ranks_exact_name_first() {
        let store = KnowledgeStore::seeded(10);
        store
            .add_concept(concept(
                "Soros lectures",
                "A lecture series where reflexivity is explained at length.",
                &["Given at CEU"],
            ))
            .unwrap();
        let hits = store.search_concepts("reflexivity");
        assert_eq!(hits[0].concept.name, "reflexivity");
        assert_eq!(hits[0].rank, MatchRank::ExactName);
        assert!(hits
            .iter()
            .any(|h| h.concept.name == "Soros lectures" && h.rank == MatchRank::DefinitionContains));
    }

    #[test]
    fn search_rank_order_and_insertion_tiebreak() {
        let store = KnowledgeStore::new(10);
        store.add_concept(concept("beta market", "x", &["p"])).unwrap();
        store.add_concept(concept("gamma", "about the market", &["p"])).unwrap();
        store.add_concept(concept("market", "y", &["p"])).unwrap();
        store.add_concept(concept("alpha market", "z", &["p"])).unwrap();
        store.add_concept(concept("delta", "q", &["market share"])).unwrap();

        let names: Vec<String> = store
            .search_concepts("Market")
            .into_iter()
            .map(|m| m.concept.name)
            .collect();
        assert_eq!(
            names,
            vec!["market", "beta market", "alpha market", "gamma", "delta"]
        );
    }

    #[test]
    fn search_without_hits_is_empty() {
        let store = KnowledgeStore::seeded(10);
        assert!(store.search_concepts("quantum chromodynamics").is_empty());
        assert!(store.search_concepts("   ").is_empty());
    }

    #[test]
    fn random_quote_empty_store_errors() {
        let store = KnowledgeStore::new(10);
        assert_eq!(store.random_quote(), Err(KnowledgeError::EmptyStore));
    }

    #[test]
    fn random_quote_single_quote_is_deterministic() {
        let store = KnowledgeStore::new(10);
        store.add_quote("Only one quote here.", Provenance::UserSubmitted).unwrap();
        for _ in 0..5 {
            assert_eq!(store.random_quote().unwrap().text, "Only one quote here.");
        }
    }

    #[test]
    fn random_quote_covers_all_quotes() {
        let store = KnowledgeStore::new(10);
        store.add_quote("first quote", Provenance::UserSubmitted).unwrap();
        store.add_quote("second quote", Provenance::UserSubmitted).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = HashSet::new();
        for _ in 0..64 {
            seen.insert(store.random_quote_with(&mut rng).unwrap().text);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn upsert_document_is_idempotent() {
        let store = KnowledgeStore::new(10);
        let first = store.upsert_document(record("a.pdf", &["A quote worth keeping."]));
        assert!(!first.replaced);
        assert_eq!(first.quotes_added, 1);
        let before = store.get_stats();

        let second = store.upsert_document(record("a.pdf", &["A quote worth  keeping."]));
        assert!(second.replaced);
        assert_eq!(second.quotes_added, 0);
        assert_eq!(store.get_stats(), before);
        assert_eq!(store.list_documents().len(), 1);
    }

    #[test]
    fn listing_keeps_first_ingestion_order() {
        let store = KnowledgeStore::new(10);
        store.upsert_document(record("a.pdf", &[]));
        store.upsert_document(record("b.pdf", &[]));
        store.upsert_document(record("a.pdf", &[]));
        let ids: Vec<String> = store.list_documents().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a.pdf", "b.pdf"]);
        assert_eq!(store.list_documents()[0].concepts_found, 1);
    }

    #[test]
    fn stats_include_conversation_turns() {
        let store = KnowledgeStore::seeded(4);
        store.append_exchange(Turn::user("q"), Turn::assistant("a"));
        let stats = store.get_stats();
        assert_eq!(stats.conversation_turns, 2);
        assert_eq!(stats.concepts, 3);
        assert_eq!(stats.quotes, 8);
        store.clear_memory();
        assert_eq!(store.get_stats().conversation_turns, 0);
    }

    #[test]
    fn memory_bound_enforced_through_store() {
        let store = KnowledgeStore::new(3);
        for i in 0..5 {
            store.append_exchange(Turn::user(format!("q{}", i)), Turn::assistant("a"));
        }
        assert_eq!(store.transcript().len(), 3);
    }

    #[test]
    fn snapshot_restore_dedups() {
        let store = KnowledgeStore::seeded(10);
        let mut snapshot = store.snapshot();
        // Older snapshots carried the seed quotes twice.
        let dup = snapshot.quotes.clone();
        snapshot.quotes.extend(dup);

        let fresh = KnowledgeStore::seeded(10);
        let (concepts_added, quotes_added) = fresh.restore(snapshot);
        assert_eq!((concepts_added, quotes_added), (0, 0));
        assert_eq!(fresh.get_stats(), store.get_stats());
    }
}
