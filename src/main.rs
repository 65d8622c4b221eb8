use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use section_store::blender::HttpEmbedder;
use section_store::composer::ComposeRequest;
use section_store::config::Config;
use section_store::store::Store;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "section-store")]
#[command(version)]
#[command(about = "Embedded section store with byte-perfect round-trip and hybrid search")]
struct Cli {
    /// Path to section-store.toml (defaults to ./section-store.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a file, hash it, and store its sections
    Ingest {
        path: PathBuf,
        #[arg(long, default_value = "documentation")]
        kind: String,
    },
    /// Recompose a stored file back to its original bytes
    Recompose {
        file_id: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the byte-perfect round-trip self-check against a file on disk
    Validate { path: PathBuf },
    /// Lexical search over stored sections
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print a file's section tree
    Tree { file_id: i64 },
    /// Delete a stored file and its sections
    Delete { path: String },
    /// Sweep every stored file and report any content-hash mismatches
    Sweep,
    /// Hybrid lexical + semantic search (falls back to lexical-only if
    /// embeddings are disabled or the embedder call fails)
    SearchBlended {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        vector_weight: Option<f64>,
    },
    /// Assemble a new document out of existing sections, in the given order
    Compose {
        section_ids: Vec<i64>,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("section-store.toml"));
    let cfg = Config::load(&config_path).context("loading configuration")?;
    let store = Store::open(&cfg.store_path_buf()).context("opening store")?;

    match cli.cmd {
        Command::Ingest { path, kind } => {
            let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let now = current_time_guess();
            let path_str = path.to_string_lossy().to_string();
            let file_id = section_store::ingest(&store, &path_str, &kind, &bytes, now)?;
            println!("{}", serde_json::json!({ "file_id": file_id, "path": path_str }));
        }
        Command::Recompose { file_id, out } => {
            let bytes = section_store::recomposer::recompose_store(&store, file_id)?;
            match out {
                Some(p) => std::fs::write(&p, &bytes).with_context(|| format!("writing {}", p.display()))?,
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&bytes)?;
                }
            }
        }
        Command::Validate { path } => {
            let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let shape = section_store::detector::detect_shape(&bytes, &path.to_string_lossy());
            let outcome = section_store::validator::validate_bytes(&bytes, shape);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.ok {
                std::process::exit(1);
            }
        }
        Command::Search { query, limit } => {
            let limit = limit.unwrap_or(cfg.search_default_limit);
            let results = section_store::search::search(&store, &query, limit)?;
            let rendered: Vec<_> = results
                .into_iter()
                .map(|(s, score)| serde_json::json!({ "section_id": s.id, "title": s.title, "score": score }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        Command::Tree { file_id } => {
            let tree = section_store::query::tree(&store, file_id)?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Command::Delete { path } => {
            let removed = store.delete_file(&path)?;
            println!("{}", serde_json::json!({ "removed": removed }));
        }
        Command::Sweep => {
            let report = section_store::integrity::run_sweep(&store, true)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.mismatched.is_empty() {
                std::process::exit(1);
            }
        }
        Command::SearchBlended { query, limit, vector_weight } => {
            let limit = limit.unwrap_or(cfg.search_default_limit);
            let weight = vector_weight.unwrap_or(cfg.vector_weight_default);
            let embedder = if cfg.enable_embeddings {
                Some(HttpEmbedder::new(cfg.embedder_endpoint.clone(), cfg.embedder_model_id.clone()))
            } else {
                None
            };
            let hits = section_store::blender::blended_search(
                &store,
                embedder.as_ref().map(|e| e as &dyn section_store::blender::Embedder),
                &query,
                limit,
                weight,
            )?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Command::Compose { section_ids, out } => {
            let req = ComposeRequest {
                section_ids,
                metadata: BTreeMap::new(),
            };
            let hash = section_store::composer::compose(&store, &req, &out)?;
            println!("{}", serde_json::json!({ "content_hash": hash, "out": out }));
        }
    }

    Ok(())
}

/// The store's `created_at`/`updated_at` columns are caller-supplied Unix
/// timestamps (spec §4.4) so the library stays free of wall-clock calls;
/// the CLI is the one place that actually reads the clock.
fn current_time_guess() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
