//! JSON persistence for concepts and quotes.
//!
//! Documents and conversation memory live for the process lifetime only.
//! Writes go to a sibling temp file which is then renamed over the target.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use persona_harness_core::store::KnowledgeSnapshot;
use persona_harness_core::KnowledgeStore;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge the snapshot into `store`. A missing file is not an error.
    pub fn load_into(&self, store: &KnowledgeStore) -> Result<()> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot yet");
            return Ok(());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot: {}", self.path.display()))?;
        let snapshot: KnowledgeSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", self.path.display()))?;
        let (concepts, quotes) = store.restore(snapshot);
        info!(
            path = %self.path.display(),
            concepts_added = concepts,
            quotes_added = quotes,
            "loaded knowledge snapshot"
        );
        Ok(())
    }

    pub fn save(&self, store: &KnowledgeStore) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&store.snapshot())?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        debug!(path = %self.path.display(), "saved knowledge snapshot");
        Ok(())
    }
}
