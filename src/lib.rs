//! # Persona Harness
//!
//! A local-first PDF knowledge pipeline for grounded AI personas.
//!
//! PDFs are extracted, chunked, and mined for quotes and concept mentions,
//! then installed atomically into an in-process knowledge store. Each chat
//! turn retrieves a small context bundle from that store, sends it to a
//! generation backend, and records the exchange in bounded conversation
//! memory.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────────┐   ┌────────────────┐
//! │ PDF bytes │──▶│ Extract→Chunk→Mine   │──▶│ KnowledgeStore │
//! └───────────┘   │ (blocking worker)    │   │ docs/concepts/ │
//!                 └──────────────────────┘   │ quotes/memory  │
//!                                            └───────┬────────┘
//!                      ┌─────────────────────────────┤
//!                      ▼                             ▼
//!                 ┌──────────┐                 ┌──────────┐
//!                 │   CLI    │                 │   HTTP   │
//!                 │(persona) │                 │  (axum)  │
//!                 └──────────┘                 └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! persona ingest ./pdfs
//! persona search reflexivity
//! persona context "What drives boom-bust cycles?"
//! persona serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF text extraction with backend fallback |
//! | [`ingest`] | Ingestion pipeline and batch ingestion |
//! | [`chat`] | Chat orchestration and generation backends |
//! | [`snapshot`] | Concept and quote persistence |
//! | [`app`] | Service wiring shared by CLI and server |
//! | [`server`] | HTTP API |
//!
//! Pure logic (models, chunker, miner, store, retriever) lives in
//! [`persona_harness_core`].

pub mod app;
pub mod chat;
pub mod config;
pub mod extract;
pub mod ingest;
pub mod server;
pub mod snapshot;
