//! TOML configuration.
//!
//! Every section is optional; a missing section takes its defaults. Use
//! [`load_config`] for a file on disk and [`Config::minimal`] when running
//! without one.
//!
//! ```toml
//! [ingest]
//! max_file_mb = 50
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-3.5-turbo"
//! ```

use anyhow::{bail, Context, Result};
use persona_harness_core::memory::DEFAULT_MAX_TURNS;
use persona_harness_core::mine::{MinerSettings, DEFAULT_VOCABULARY};
use persona_harness_core::retrieve::RetrievalSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// All defaults. Used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_mb")]
    pub max_file_mb: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl IngestConfig {
    pub fn max_file_bytes(&self) -> usize {
        self.max_file_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_mb: default_max_file_mb(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_max_file_mb() -> usize {
    50
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string(), "**/*.PDF".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct MiningConfig {
    #[serde(default = "default_min_quote_chars")]
    pub min_quote_chars: usize,
    #[serde(default = "default_max_quote_chars")]
    pub max_quote_chars: usize,
    #[serde(default = "default_max_quotes_per_document")]
    pub max_quotes_per_document: usize,
    #[serde(default = "default_min_score")]
    pub min_score: i32,
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,
}

impl MiningConfig {
    pub fn miner_settings(&self) -> MinerSettings {
        MinerSettings {
            min_quote_chars: self.min_quote_chars,
            max_quote_chars: self.max_quote_chars,
            max_quotes: self.max_quotes_per_document,
            min_score: self.min_score,
            vocabulary: self.vocabulary.clone(),
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            min_quote_chars: default_min_quote_chars(),
            max_quote_chars: default_max_quote_chars(),
            max_quotes_per_document: default_max_quotes_per_document(),
            min_score: default_min_score(),
            vocabulary: default_vocabulary(),
        }
    }
}

fn default_min_quote_chars() -> usize {
    20
}
fn default_max_quote_chars() -> usize {
    300
}
fn default_max_quotes_per_document() -> usize {
    10
}
fn default_min_score() -> i32 {
    2
}
fn default_vocabulary() -> Vec<String> {
    DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_max_concepts")]
    pub max_concepts: usize,
    #[serde(default = "default_max_quotes")]
    pub max_quotes: usize,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

impl RetrievalConfig {
    pub fn settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            max_items: self.max_items,
            max_concepts: self.max_concepts,
            max_quotes: self.max_quotes,
            max_chunks: self.max_chunks,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_concepts: default_max_concepts(),
            max_quotes: default_max_quotes(),
            max_chunks: default_max_chunks(),
        }
    }
}

fn default_max_items() -> usize {
    5
}
fn default_max_concepts() -> usize {
    3
}
fn default_max_quotes() -> usize {
    2
}
fn default_max_chunks() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// JSON file holding concepts and quotes across restarts.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Load the built-in concepts and quotes at startup.
    #[serde(default = "default_seed")]
    pub seed: bool,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            seed: default_seed(),
        }
    }
}

fn default_seed() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_persona_name")]
    pub persona_name: String,
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            persona_name: default_persona_name(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    2
}
fn default_persona_name() -> String {
    "George Soros".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate TOML config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate ingest
    if config.ingest.max_file_mb == 0 {
        bail!("ingest.max_file_mb must be > 0");
    }
    if config.ingest.chunk_size == 0 {
        bail!("ingest.chunk_size must be > 0");
    }
    if config.ingest.chunk_overlap >= config.ingest.chunk_size {
        bail!(
            "ingest.chunk_overlap ({}) must be smaller than ingest.chunk_size ({})",
            config.ingest.chunk_overlap,
            config.ingest.chunk_size
        );
    }

    // Validate mining
    if config.mining.min_quote_chars >= config.mining.max_quote_chars {
        bail!("mining.min_quote_chars must be smaller than mining.max_quote_chars");
    }

    // Validate retrieval and conversation
    if config.retrieval.max_items < 1 {
        bail!("retrieval.max_items must be >= 1");
    }
    if config.conversation.max_turns < 1 {
        bail!("conversation.max_turns must be >= 1");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" | "echo" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or echo.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.ingest.chunk_size, 1000);
        assert_eq!(cfg.ingest.chunk_overlap, 200);
        assert_eq!(cfg.ingest.max_file_bytes(), 50 * 1024 * 1024);
        assert_eq!(cfg.retrieval.max_items, 5);
        assert_eq!(cfg.conversation.max_turns, 20);
        assert!(cfg.knowledge.seed);
        assert!(!cfg.generation.is_enabled());
        assert_eq!(cfg.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn example_config_matches_defaults() {
        let cfg = parse_config(include_str!("../config/persona.example.toml")).unwrap();
        assert_eq!(cfg.ingest.include_globs, default_include_globs());
        assert_eq!(cfg.mining.vocabulary, default_vocabulary());
        assert_eq!(cfg.generation.provider, "disabled");
        assert!(cfg.knowledge.snapshot_path.is_none());
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_config(
            r#"
            [ingest]
            chunk_size = 500
            chunk_overlap = 50

            [generation]
            provider = "openai"
            temperature = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ingest.chunk_size, 500);
        assert_eq!(cfg.ingest.chunk_overlap, 50);
        assert_eq!(cfg.generation.provider, "openai");
        assert_eq!(cfg.generation.model, "gpt-3.5-turbo");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = parse_config("[ingest]\nchunk_size = 100\nchunk_overlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_turns_rejected() {
        assert!(parse_config("[conversation]\nmax_turns = 0\n").is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let err = parse_config("[generation]\nprovider = \"llama\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn temperature_out_of_range_rejected() {
        assert!(parse_config("[generation]\ntemperature = 3.5\n").is_err());
    }

    #[test]
    fn quote_bounds_must_be_ordered() {
        assert!(parse_config("[mining]\nmin_quote_chars = 300\nmax_quote_chars = 20\n").is_err());
    }
}
