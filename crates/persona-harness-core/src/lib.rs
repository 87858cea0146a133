//! # Persona Harness Core
//!
//! Shared, I/O-free logic for Persona Harness: data models, chunking,
//! signal mining, the knowledge store, conversation memory, and the
//! retriever that assembles per-turn context bundles.
//!
//! This crate contains no tokio, filesystem, PDF, or network
//! dependencies. PDF extraction, configuration, persistence, and the
//! generation call live in the `persona-harness` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ─▶ extract (app) ─▶ chunk ─▶ mine ─▶ KnowledgeStore::upsert_document
//!                                                   │
//! user message ─▶ Retriever::build_context ◀────────┘
//!                        │
//!                        ▼
//!                 ContextBundle ─▶ generation (app) ─▶ ConversationMemory
//! ```

pub mod chunk;
pub mod error;
pub mod memory;
pub mod mine;
pub mod models;
pub mod retrieve;
pub mod seed;
pub mod store;
pub mod text;

pub use error::KnowledgeError;
pub use store::KnowledgeStore;
