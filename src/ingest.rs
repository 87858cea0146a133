//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow for one file: extract → chunk → mine → install.
//! Everything before install runs on a blocking worker without touching the
//! store; the finished [`DocumentRecord`] is installed with a single
//! [`KnowledgeStore::upsert_document`] call, so a failure at any step leaves
//! the store exactly as it was.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use persona_harness_core::chunk::chunk_text;
use persona_harness_core::mine::SignalMiner;
use persona_harness_core::models::{DocumentRecord, DocumentSummary};
use persona_harness_core::text::word_count;
use persona_harness_core::{KnowledgeError, KnowledgeStore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract::Extractor;

/// Stable document id for an upload.
///
/// A non-empty identifier is normalized (trimmed, `\` → `/`, repeated `/`
/// collapsed, leading `./` removed). An empty one falls back to
/// `sha256:<hex>` of the content.
pub fn document_id_for(identifier: &str, bytes: &[u8]) -> String {
    let mut id = identifier.trim().replace('\\', "/");
    while id.contains("//") {
        id = id.replace("//", "/");
    }
    while let Some(rest) = id.strip_prefix("./") {
        id = rest.to_string();
    }
    if id.is_empty() || id == "." {
        format!("sha256:{}", content_hash(bytes))
    } else {
        id
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The CPU-bound part of ingestion. Never touches the store.
struct Pipeline {
    extractor: Extractor,
    miner: SignalMiner,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Pipeline {
    fn build(
        &self,
        id: String,
        source_path: String,
        bytes: &[u8],
        concept_names: &[String],
    ) -> Result<DocumentRecord, KnowledgeError> {
        let extraction = self.extractor.extract(bytes)?;
        let chunks = chunk_text(
            &id,
            &extraction.text,
            &extraction.page_map,
            self.chunk_size,
            self.chunk_overlap,
        )?;
        let signals = self.miner.mine(&extraction.text, concept_names);

        let title = extraction
            .metadata
            .title
            .or_else(|| file_name(&source_path));

        Ok(DocumentRecord {
            id,
            source_path,
            title,
            author: extraction.metadata.author,
            page_count: extraction.metadata.page_count,
            char_count: extraction.text.chars().count(),
            word_count: word_count(&extraction.text),
            chunks,
            quotes: signals.quotes,
            concepts: signals.concept_mentions,
            content_hash: content_hash(bytes),
            backend: extraction.metadata.backend,
            ingested_at: Utc::now(),
        })
    }
}

fn file_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
}

/// Result of ingesting one file in a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Ingested { document: DocumentSummary },
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub path: PathBuf,
    pub outcome: IngestOutcome,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, IngestOutcome::Ingested { .. })
    }
}

/// Shared ingestion entry point for the CLI and the HTTP server.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<KnowledgeStore>,
    pipeline: Arc<Pipeline>,
    include_globs: Vec<String>,
}

impl Ingestor {
    pub fn new(config: &Config, store: Arc<KnowledgeStore>) -> Self {
        Self::with_extractor(
            config,
            store,
            Extractor::new(config.ingest.max_file_bytes()),
        )
    }

    pub fn with_extractor(config: &Config, store: Arc<KnowledgeStore>, extractor: Extractor) -> Self {
        Self {
            store,
            pipeline: Arc::new(Pipeline {
                extractor,
                miner: SignalMiner::new(config.mining.miner_settings()),
                chunk_size: config.ingest.chunk_size,
                chunk_overlap: config.ingest.chunk_overlap,
            }),
            include_globs: config.ingest.include_globs.clone(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.pipeline.extractor.max_bytes()
    }

    /// Ingest an in-memory PDF under `identifier`.
    ///
    /// Re-ingesting the same identifier replaces the earlier record.
    pub async fn ingest_bytes(
        &self,
        identifier: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord, KnowledgeError> {
        let id = document_id_for(identifier, &bytes);
        let source_path = identifier.trim().to_string();
        let concept_names = self.store.concept_names();
        let pipeline = self.pipeline.clone();

        let record = tokio::task::spawn_blocking(move || {
            pipeline.build(id, source_path, &bytes, &concept_names)
        })
        .await
        .map_err(|e| KnowledgeError::UnreadablePdf {
            reason: format!("ingestion task failed: {}", e),
        })??;

        let installed = record.clone();
        let outcome = self.store.upsert_document(record);
        info!(
            id = %installed.id,
            pages = installed.page_count,
            chunks = installed.chunks.len(),
            quotes = installed.quotes.len(),
            quotes_added = outcome.quotes_added,
            replaced = outcome.replaced,
            "ingested document"
        );
        Ok(installed)
    }

    /// Read and ingest one file.
    ///
    /// Extraction errors stay downcastable to [`KnowledgeError`].
    pub async fn ingest_path(&self, path: &Path) -> Result<DocumentRecord> {
        let len = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Failed to stat {}", path.display()))?
            .len();
        if len > self.max_bytes() as u64 {
            return Err(KnowledgeError::FileTooLarge {
                size: usize::try_from(len).unwrap_or(usize::MAX),
                limit: self.max_bytes(),
            }
            .into());
        }
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(self.ingest_bytes(&path.to_string_lossy(), bytes).await?)
    }

    /// Ingest every file under `dir` matching the include globs, in sorted
    /// order. One file's failure never stops the batch.
    pub async fn ingest_dir(&self, dir: &Path) -> Result<Vec<IngestReport>> {
        if !dir.is_dir() {
            bail!("Not a directory: {}", dir.display());
        }
        let include = build_globset(&self.include_globs)?;

        let mut paths = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            if include.is_match(relative) {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();

        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            let outcome = match self.ingest_path(&path).await {
                Ok(record) => IngestOutcome::Ingested {
                    document: record.summary(),
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file");
                    IngestOutcome::Failed {
                        code: error_code(&e).to_string(),
                        message: format!("{:#}", e),
                    }
                }
            };
            reports.push(IngestReport { path, outcome });
        }
        Ok(reports)
    }
}

/// Machine-readable code for an ingestion error.
pub fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<KnowledgeError>() {
        Some(e) => e.code(),
        None => "io_error",
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_normalized() {
        assert_eq!(document_id_for("  ./docs//a.pdf ", b""), "docs/a.pdf");
        assert_eq!(document_id_for("docs\\sub\\a.pdf", b""), "docs/sub/a.pdf");
        assert_eq!(document_id_for("a.pdf", b"x"), document_id_for("./a.pdf", b"y"));
    }

    #[test]
    fn empty_identifier_falls_back_to_content_hash() {
        let id = document_id_for("   ", b"abc");
        assert_eq!(
            id,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(document_id_for("", b"abd"), id);
    }

    #[tokio::test]
    async fn unreadable_upload_leaves_store_untouched() {
        let store = Arc::new(KnowledgeStore::seeded(20));
        let before = store.get_stats();
        let ingestor = Ingestor::new(&Config::minimal(), store.clone());
        let err = ingestor
            .ingest_bytes("notes.pdf", b"plain text, not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::UnreadablePdf { .. }));
        assert_eq!(store.get_stats(), before);
    }

    #[tokio::test]
    async fn oversize_file_reports_file_too_large() {
        let mut config = Config::minimal();
        config.ingest.max_file_mb = 1;
        let store = Arc::new(KnowledgeStore::new(20));
        let ingestor = Ingestor::new(&config, store.clone());

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("big.pdf");
        std::fs::write(&path, vec![b' '; 1024 * 1024 + 1]).unwrap();

        let err = ingestor.ingest_path(&path).await.unwrap_err();
        assert_eq!(error_code(&err), "file_too_large");
        assert_eq!(store.get_stats().documents, 0);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let ingestor = Ingestor::new(&Config::minimal(), Arc::new(KnowledgeStore::new(20)));
        let err = ingestor
            .ingest_path(Path::new("/nonexistent/file.pdf"))
            .await
            .unwrap_err();
        assert_eq!(error_code(&err), "io_error");
    }
}
