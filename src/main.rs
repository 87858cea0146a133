//! # Persona Harness CLI (`persona`)
//!
//! ## Usage
//!
//! ```bash
//! persona --config ./config/persona.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `persona serve` | Start the HTTP server |
//! | `persona ingest <path>` | Ingest a PDF file or a directory of PDFs |
//! | `persona documents` | List ingested documents |
//! | `persona stats` | Knowledge store counts |
//! | `persona search <query>` | Search concepts |
//! | `persona quote` | Print a random quote |
//! | `persona add-quote <text>` | Add a quote |
//! | `persona add-concept <name> --definition <d> --key-point <p>...` | Add or merge a concept |
//! | `persona context <message>` | Show the context bundle for a message |
//! | `persona chat` | Interactive chat on stdin |
//!
//! Documents live for the process lifetime. Pass `--pdfs <dir>` to ingest a
//! directory before any command runs.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use persona_harness::app::Harness;
use persona_harness::config::{self, Config};
use persona_harness::ingest::{IngestOutcome, IngestReport};
use persona_harness::server;
use persona_harness_core::models::{NewConcept, Provenance};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Persona Harness CLI: ingest PDFs and chat with a grounded persona.
#[derive(Parser)]
#[command(
    name = "persona",
    about = "Persona Harness: a PDF knowledge pipeline for grounded AI personas",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/persona.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/persona.toml")]
    config: PathBuf,

    /// Directory of PDFs to ingest before running the command.
    #[arg(long, global = true)]
    pdfs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Ingest a PDF file, or every matching PDF under a directory.
    Ingest {
        path: PathBuf,
    },

    /// List ingested documents.
    Documents,

    /// Show knowledge store counts.
    Stats,

    /// Search concepts by name, definition, or key point.
    Search {
        query: String,
    },

    /// Print a random quote.
    Quote,

    /// Add a quote.
    AddQuote {
        text: String,
    },

    /// Add a concept, or merge into an existing one with the same name.
    AddConcept {
        name: String,

        #[arg(long)]
        definition: String,

        /// Repeat for each key point.
        #[arg(long = "key-point", required = true)]
        key_points: Vec<String>,
    },

    /// Show the context bundle retrieved for a message.
    Context {
        message: String,

        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Interactive chat. `quit` ends the session, `/clear` clears memory.
    Chat {
        /// Do not retrieve context for each turn.
        #[arg(long)]
        no_context: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    let harness = Harness::from_config(cfg)?;
    if let Some(dir) = &cli.pdfs {
        let reports = harness.ingestor.ingest_dir(dir).await?;
        let ok = reports.iter().filter(|r| r.is_success()).count();
        info!(ingested = ok, failed = reports.len() - ok, "preloaded pdfs");
    }

    match cli.command {
        Commands::Serve => server::serve(harness).await?,
        Commands::Ingest { path } => run_ingest(&harness, &path).await?,
        Commands::Documents => {
            let docs = harness.store.list_documents();
            if docs.is_empty() {
                println!("No documents ingested.");
            }
            for d in docs {
                println!(
                    "{}  pages={} words={} chunks={} quotes={} concepts={}",
                    d.id, d.pages, d.word_count, d.chunks, d.quotes_extracted, d.concepts_found
                );
            }
        }
        Commands::Stats => {
            let s = harness.store.get_stats();
            println!("documents: {}", s.documents);
            println!("chunks:    {}", s.chunks);
            println!("concepts:  {}", s.concepts);
            println!("quotes:    {}", s.quotes);
            println!("turns:     {}", s.conversation_turns);
        }
        Commands::Search { query } => {
            let hits = harness.store.search_concepts(&query);
            if hits.is_empty() {
                println!("No concepts match '{}'.", query);
            }
            for hit in hits {
                println!("{} ({:?})", hit.concept.name, hit.rank);
                println!("  {}", hit.concept.definition);
                for point in &hit.concept.key_points {
                    println!("  - {}", point);
                }
            }
        }
        Commands::Quote => {
            let quote = harness.store.random_quote()?;
            println!("\"{}\"", quote.text);
        }
        Commands::AddQuote { text } => {
            if harness.store.add_quote(&text, Provenance::UserSubmitted)? {
                harness.persist();
                println!("Quote added.");
            } else {
                println!("Quote already present.");
            }
        }
        Commands::AddConcept {
            name,
            definition,
            key_points,
        } => {
            let write = harness.store.add_concept(NewConcept {
                name: name.clone(),
                definition,
                key_points,
                provenance: Provenance::UserSubmitted,
            })?;
            harness.persist();
            if write.created {
                println!("Concept '{}' added.", name);
            } else {
                println!(
                    "Concept '{}' updated ({} new key points).",
                    name, write.key_points_added
                );
            }
        }
        Commands::Context { message, max_items } => {
            let max_items = max_items.unwrap_or(harness.config.retrieval.max_items);
            let bundle = harness
                .retriever
                .build_context(&harness.store, &message, max_items);
            if bundle.is_empty() {
                println!("No relevant context.");
            } else {
                print!("{}", bundle.render());
            }
        }
        Commands::Chat { no_context } => run_chat(&harness, !no_context).await?,
    }

    Ok(())
}

async fn run_ingest(harness: &Harness, path: &Path) -> Result<()> {
    let reports = if path.is_dir() {
        harness.ingestor.ingest_dir(path).await?
    } else {
        let outcome = match harness.ingestor.ingest_path(path).await {
            Ok(record) => IngestOutcome::Ingested {
                document: record.summary(),
            },
            Err(e) => IngestOutcome::Failed {
                code: persona_harness::ingest::error_code(&e).to_string(),
                message: format!("{:#}", e),
            },
        };
        vec![IngestReport {
            path: path.to_path_buf(),
            outcome,
        }]
    };

    let mut failed = 0;
    for report in &reports {
        match &report.outcome {
            IngestOutcome::Ingested { document } => println!(
                "ok    {}  pages={} chunks={} quotes={} concepts={}",
                report.path.display(),
                document.pages,
                document.chunks,
                document.quotes_extracted,
                document.concepts_found
            ),
            IngestOutcome::Failed { code, message } => {
                failed += 1;
                println!("FAIL  {}  [{}] {}", report.path.display(), code, message);
            }
        }
    }
    println!(
        "ingest {}: {} ok, {} failed",
        path.display(),
        reports.len() - failed,
        failed
    );
    harness.persist();
    if failed > 0 && failed == reports.len() {
        anyhow::bail!("no documents were ingested");
    }
    Ok(())
}

async fn run_chat(harness: &Harness, use_context: bool) -> Result<()> {
    println!(
        "Chatting with {}. Type 'quit' to exit, '/clear' to reset memory.",
        harness.config.generation.persona_name
    );
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" | "q" => break,
            "/clear" => {
                harness.store.clear_memory();
                println!("Memory cleared.");
                continue;
            }
            _ => {}
        }
        match harness.chat.chat(input, use_context).await {
            Ok(reply) => println!("{}\n", reply.reply),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "chat turn failed");
                println!("Error: {:#}\n", e);
            }
        }
    }
    Ok(())
}
