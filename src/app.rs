//! Wiring: one store, one ingestor, one chat session, built from [`Config`].

use std::sync::Arc;

use anyhow::Result;
use persona_harness_core::retrieve::Retriever;
use persona_harness_core::KnowledgeStore;
use tracing::{info, warn};

use crate::chat::{generator_from_config, ChatSession, Generator};
use crate::config::Config;
use crate::ingest::Ingestor;
use crate::snapshot::SnapshotFile;

/// Shared services behind the CLI and the HTTP server.
#[derive(Clone)]
pub struct Harness {
    pub config: Arc<Config>,
    pub store: Arc<KnowledgeStore>,
    pub ingestor: Ingestor,
    pub retriever: Retriever,
    pub chat: ChatSession,
    snapshot: Option<SnapshotFile>,
}

impl Harness {
    /// Build with the generator named in `[generation].provider`.
    pub fn from_config(config: Config) -> Result<Self> {
        let generator = generator_from_config(&config.generation)?;
        Self::with_generator(config, generator)
    }

    pub fn with_generator(config: Config, generator: Arc<dyn Generator>) -> Result<Self> {
        let max_turns = config.conversation.max_turns;
        let store = Arc::new(if config.knowledge.seed {
            KnowledgeStore::seeded(max_turns)
        } else {
            KnowledgeStore::new(max_turns)
        });

        let snapshot = config.knowledge.snapshot_path.clone().map(SnapshotFile::new);
        if let Some(file) = &snapshot {
            file.load_into(&store)?;
        }

        let retriever = Retriever::new(config.retrieval.settings());
        let ingestor = Ingestor::new(&config, store.clone());
        let chat = ChatSession::new(
            store.clone(),
            retriever.clone(),
            generator,
            config.generation.persona_name.clone(),
        );

        let stats = store.get_stats();
        info!(
            concepts = stats.concepts,
            quotes = stats.quotes,
            generator = chat.generator_name(),
            "knowledge store ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            ingestor,
            retriever,
            chat,
            snapshot,
        })
    }

    /// Write the snapshot, if one is configured. Failures are logged only.
    pub fn persist(&self) {
        if let Some(file) = &self.snapshot {
            if let Err(e) = file.save(&self.store) {
                warn!(path = %file.path().display(), error = %format!("{:#}", e), "snapshot write failed");
            }
        }
    }
}
