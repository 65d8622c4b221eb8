//! Hybrid/blended search (spec §4.9). Combines lexical (FTS5/BM25) results
//! with an external semantic similarity score: each list is min-max
//! normalized independently, then combined as `score = w*sim + (1-w)*lex`.
//! Falls back to lexical-only whenever the embedder is absent or fails —
//! semantic search is an enhancement, never a hard dependency.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::search;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn embed_one(&self, text: &str) -> CoreResult<Vec<f32>>;
}

/// Calls a remote embedding endpoint over plain HTTP/JSON. Synchronous by
/// design (spec §4.9) — safe to call from the worker-pool threads spawned
/// by `embed_batch` without an async runtime.
pub struct HttpEmbedder {
    endpoint: String,
    model_id: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model_id: model_id.into(),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_one(&self, text: &str) -> CoreResult<Vec<f32>> {
        let body = EmbedRequest {
            model: &self.model_id,
            input: text,
        };
        match ureq::post(&self.endpoint).send_json(body) {
            Ok(resp) => resp
                .into_json::<EmbedResponse>()
                .map(|r| r.embedding)
                .map_err(|e| CoreError::ExternalPermanent(format!("malformed embedder response: {e}"))),
            Err(ureq::Error::Status(code, _)) if code >= 500 || code == 429 => {
                Err(CoreError::ExternalTransient(format!("embedder returned status {code}")))
            }
            Err(ureq::Error::Status(code, _)) => {
                Err(CoreError::ExternalPermanent(format!("embedder returned status {code}")))
            }
            Err(ureq::Error::Transport(t)) => Err(CoreError::ExternalTransient(t.to_string())),
        }
    }
}

pub struct EmbedItem {
    pub section_id: i64,
    pub text: String,
}

/// Bounded worker pool over `embedder.embed_one`, honoring per-call item and
/// token caps (spec §4.9) and retrying transient failures with exponential
/// backoff. A permanent failure on one item never aborts the others —
/// partial-batch success is the contract.
pub fn embed_batch(
    embedder: &dyn Embedder,
    cfg: &Config,
    items: Vec<EmbedItem>,
) -> Vec<(i64, CoreResult<Vec<f32>>)> {
    let chunks = chunk_items(
        items,
        cfg.embedder_batch_max_items.max(1),
        cfg.embedder_batch_max_tokens.max(1),
    );
    let (tx, rx) = std::sync::mpsc::channel();
    let chunk_queue = Mutex::new(chunks.into_iter());

    thread::scope(|scope| {
        let worker_count = cfg.embedder_workers.max(1);
        for _ in 0..worker_count {
            let tx = tx.clone();
            let chunk_queue = &chunk_queue;
            scope.spawn(move || loop {
                let chunk = chunk_queue.lock().expect("chunk queue poisoned").next();
                let Some(chunk) = chunk else { break };
                for item in chunk {
                    let result = embed_with_retry(embedder, cfg, &item.text);
                    let _ = tx.send((item.section_id, result));
                }
            });
        }
        drop(tx);
    });

    rx.into_iter().collect()
}

fn embed_with_retry(embedder: &dyn Embedder, cfg: &Config, text: &str) -> CoreResult<Vec<f32>> {
    let mut attempt = 0u32;
    loop {
        match embedder.embed_one(text) {
            Ok(v) => return Ok(v),
            Err(CoreError::ExternalTransient(msg)) => {
                attempt += 1;
                if attempt > cfg.embedder_retry_max {
                    return Err(CoreError::ExternalTransient(msg));
                }
                let backoff_ms = cfg.embedder_retry_base_ms.saturating_mul(1u64 << (attempt - 1));
                thread::sleep(Duration::from_millis(backoff_ms));
            }
            Err(other) => return Err(other),
        }
    }
}

fn chunk_items(items: Vec<EmbedItem>, max_items: usize, max_tokens: usize) -> Vec<Vec<EmbedItem>> {
    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_tokens = 0usize;
    for item in items {
        let tokens = item.text.split_whitespace().count().max(1);
        if !current.is_empty() && (current.len() >= max_items || current_tokens + tokens > max_tokens) {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += tokens;
        current.push(item);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

fn min_max_normalize(scores: &mut [(i64, f64)]) {
    if scores.is_empty() {
        return;
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = scores.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    for (_, s) in scores.iter_mut() {
        *s = if range.abs() < f64::EPSILON { 1.0 } else { (*s - min) / range };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlendedHit {
    pub section_id: i64,
    pub score: f64,
}

fn rank_and_truncate(mut combined: Vec<(i64, f64)>, limit: usize) -> Vec<BlendedHit> {
    combined.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
    combined.truncate(limit);
    combined
        .into_iter()
        .map(|(section_id, score)| BlendedHit { section_id, score })
        .collect()
}

/// Blended search (spec §4.9 / §8 scenarios). `embedder` is `None` when
/// semantic search is disabled by configuration; an embedder call failure
/// degrades to lexical-only rather than failing the whole search.
pub fn blended_search(
    store: &Store,
    embedder: Option<&dyn Embedder>,
    raw_query: &str,
    limit: usize,
    vector_weight: f64,
) -> CoreResult<Vec<BlendedHit>> {
    let lexical = search::search(store, raw_query, limit.max(50))?;
    let mut lex_scores: Vec<(i64, f64)> = lexical.iter().map(|(s, score)| (s.id, *score)).collect();
    min_max_normalize(&mut lex_scores);

    let embedder = match embedder {
        Some(e) => e,
        None => return Ok(rank_and_truncate(lex_scores, limit)),
    };

    let query_vec = match embedder.embed_one(raw_query) {
        Ok(v) => v,
        Err(_) => return Ok(rank_and_truncate(lex_scores, limit)),
    };

    // VectorIndex returns at most top-K_V (spec §4.9); K_V mirrors the same
    // widen factor used for the lexical candidate list above.
    let top_k_v = limit.max(50);
    let candidates = store.embeddings_for_model(embedder.model_id())?;
    let mut sem_scores: Vec<(i64, f64)> = candidates
        .iter()
        .map(|(id, vec)| (*id, cosine_similarity(&query_vec, vec) as f64))
        .collect();
    sem_scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    sem_scores.truncate(top_k_v);
    min_max_normalize(&mut sem_scores);

    let lex_map: HashMap<i64, f64> = lex_scores.into_iter().collect();
    let sem_map: HashMap<i64, f64> = sem_scores.into_iter().collect();
    // Only ids that are genuine candidates in one of the two bounded lists
    // go into the union, so `vector_weight == 0.0` degrades exactly to the
    // lexical ranking (spec §8 blend-identity invariant) instead of being
    // diluted by embedding-only ids defaulting to a lexical score of 0.
    let mut ids: Vec<i64> = lex_map.keys().chain(sem_map.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let combined: Vec<(i64, f64)> = ids
        .into_iter()
        .map(|id| {
            let lex = *lex_map.get(&id).unwrap_or(&0.0);
            let sem = *sem_map.get(&id).unwrap_or(&0.0);
            (id, vector_weight * sem + (1.0 - vector_weight) * lex)
        })
        .collect();

    Ok(rank_and_truncate(combined, limit))
}
