//! Configuration surface (spec §6.3). Every field defaults so a missing or
//! partial config file degrades to sane defaults rather than erroring — the
//! same shape the teacher crate used for its scan/token-estimator settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store_path: String,
    pub enable_embeddings: bool,
    pub embedder_endpoint: String,
    pub embedder_model_id: String,
    pub embedder_batch_max_items: usize,
    pub embedder_batch_max_tokens: usize,
    pub embedder_workers: usize,
    pub embedder_retry_base_ms: u64,
    pub embedder_retry_max: u32,
    pub vector_weight_default: f64,
    pub search_default_limit: usize,
}

/// Hard cap on per-call batch size regardless of configuration (spec §4.9).
pub const EMBEDDER_BATCH_MAX_ITEMS_CEILING: usize = 2048;

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: "section-store.sqlite3".to_string(),
            enable_embeddings: false,
            embedder_endpoint: "http://127.0.0.1:8080/embed".to_string(),
            embedder_model_id: "text-embedding-none".to_string(),
            embedder_batch_max_items: EMBEDDER_BATCH_MAX_ITEMS_CEILING,
            embedder_batch_max_tokens: 8000,
            embedder_workers: 5,
            embedder_retry_base_ms: 200,
            embedder_retry_max: 4,
            vector_weight_default: 0.7,
            search_default_limit: 20,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits. A missing file is not an error — it just means
    /// "use defaults", matching the teacher's `load_config`.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        let mut cfg: Config =
            toml::from_str(&text).with_context(|| format!("parsing config at {}", path.display()))?;
        cfg.embedder_batch_max_items = cfg
            .embedder_batch_max_items
            .min(EMBEDDER_BATCH_MAX_ITEMS_CEILING);
        Ok(cfg)
    }

    pub fn store_path_buf(&self) -> std::path::PathBuf {
        std::path::PathBuf::from(&self.store_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_absent() {
        let cfg = Config::load(Path::new("/nonexistent/path/section-store.toml")).unwrap();
        assert_eq!(cfg.vector_weight_default, 0.7);
        assert_eq!(cfg.embedder_workers, 5);
    }

    #[test]
    fn batch_items_clamped_to_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("section-store.toml");
        std::fs::write(&path, "embedder_batch_max_items = 999999\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.embedder_batch_max_items, EMBEDDER_BATCH_MAX_ITEMS_CEILING);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("section-store.toml");
        std::fs::write(&path, "enable_embeddings = true\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert!(cfg.enable_embeddings);
        assert_eq!(cfg.search_default_limit, 20);
    }
}
