//! Search context: the shared state behind every search.
//!
//! Owns the encoder slot, the in-memory document table and the paths it is built from.
//! The encoder slot is filled once (possibly by the warm-up task). The document table is
//! read-only after loading and replaced wholesale by `rebuild`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::profile::Profile;
use crate::profiles::store::ProfileStore;
use crate::retrieval::cache::CacheError;
use crate::retrieval::combiner::embed_one;
use crate::retrieval::encoder::{Encoder, EncoderError};
use crate::retrieval::index::{build_index, DocumentIndex, IndexError, IndexReport};
use crate::retrieval::query::parse_query;
use crate::retrieval::ranker::rank_top_k;
use crate::retrieval::sections::{compose_sections, Section, SECTION_WEIGHTS};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("encoder is not ready yet")]
    EncoderNotReady,

    #[error("document index unavailable: {0}")]
    IndexUnavailable(String),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionView {
    pub section: Section,
    pub weight: f32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub label: String,
    pub json_name: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: Profile,
    pub sections: Vec<SectionView>,
    pub hits: Vec<SearchHit>,
}

impl SearchOutcome {
    fn empty() -> Self {
        Self {
            query: Profile::default(),
            sections: Vec::new(),
            hits: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub encoder_ready: bool,
    pub encoder_id: Option<String>,
    pub loaded: bool,
    pub count: usize,
    pub dimension: usize,
    pub index_encoder_id: Option<String>,
    pub built_at: Option<DateTime<Utc>>,
}

pub struct SearchContext {
    encoder: OnceCell<Arc<dyn Encoder>>,
    index: RwLock<Option<Arc<DocumentIndex>>>,
    /// Held for a whole rebuild; `CACHE_DIR` has one writer at a time.
    rebuild_lock: Mutex<()>,
    store: ProfileStore,
    cache_dir: PathBuf,
}

impl SearchContext {
    pub fn new(store: ProfileStore, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            encoder: OnceCell::new(),
            index: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
            store,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn with_encoder(
        store: ProfileStore,
        cache_dir: impl Into<PathBuf>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let ctx = Self::new(store, cache_dir);
        ctx.set_encoder(encoder);
        ctx
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Fills the encoder slot. Returns false if it was already filled.
    pub fn set_encoder(&self, encoder: Arc<dyn Encoder>) -> bool {
        self.encoder.set(encoder).is_ok()
    }

    pub fn encoder(&self) -> Result<Arc<dyn Encoder>, SearchError> {
        self.encoder.get().cloned().ok_or(SearchError::EncoderNotReady)
    }

    /// Reads the cache from disk and swaps it in. Returns the number of documents.
    pub async fn load_cache(&self) -> Result<usize, SearchError> {
        let cache_dir = self.cache_dir.clone();
        let loaded = tokio::task::spawn_blocking(move || DocumentIndex::load(&cache_dir))
            .await
            .map_err(|e| SearchError::IndexUnavailable(e.to_string()))?
            .map_err(unavailable)?;

        let count = loaded.len();
        info!(
            count,
            dimension = loaded.manifest.dimension,
            encoder_id = %loaded.manifest.encoder_id,
            "document index loaded"
        );
        *self.index.write().await = Some(Arc::new(loaded));
        Ok(count)
    }

    /// The current document table, loading it from disk on first use.
    async fn document_index(&self) -> Result<Arc<DocumentIndex>, SearchError> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }
        self.load_cache().await?;
        self.index
            .read()
            .await
            .clone()
            .ok_or_else(|| SearchError::IndexUnavailable("no document index loaded".to_string()))
    }

    /// Re-embeds the whole profile store with the live encoder and swaps the table in.
    pub async fn rebuild(&self) -> Result<IndexReport, SearchError> {
        let encoder = self.encoder()?;
        let _guard = self.rebuild_lock.lock().await;
        let report = build_index(self.store.dir(), &self.cache_dir, encoder.as_ref()).await?;
        self.load_cache().await?;
        Ok(report)
    }

    pub async fn status(&self) -> IndexStatus {
        let index = self.index.read().await.clone();
        IndexStatus {
            encoder_ready: self.encoder.initialized(),
            encoder_id: self.encoder.get().map(|e| e.id()),
            loaded: index.is_some(),
            count: index.as_ref().map_or(0, |i| i.len()),
            dimension: index.as_ref().map_or(0, |i| i.manifest.dimension),
            index_encoder_id: index.as_ref().map(|i| i.manifest.encoder_id.clone()),
            built_at: index.as_ref().map(|i| i.manifest.created_at),
        }
    }

    /// Ranks stored profiles against a free-text query.
    ///
    /// A blank query returns an empty outcome without touching the encoder or the index.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchOutcome, SearchError> {
        if query.trim().is_empty() {
            return Ok(SearchOutcome::empty());
        }

        let encoder = self.encoder()?;
        let index = self.document_index().await?;

        let parsed = parse_query(query);
        let sections = compose_sections(&parsed);
        let views = Section::ALL
            .iter()
            .map(|s| SectionView {
                section: *s,
                weight: SECTION_WEIGHTS.get(*s),
                text: sections.get(*s).to_string(),
            })
            .collect();

        if index.is_empty() {
            return Ok(SearchOutcome {
                query: parsed,
                sections: views,
                hits: Vec::new(),
            });
        }

        let live_id = encoder.id();
        if index.manifest.encoder_id != live_id {
            return Err(SearchError::IndexUnavailable(format!(
                "index was built with encoder '{}' but the live encoder is '{live_id}'; rebuild the index",
                index.manifest.encoder_id
            )));
        }

        let vector = embed_one(encoder.as_ref(), &sections, &SECTION_WEIGHTS).await?;
        if vector.len() != index.manifest.dimension {
            return Err(SearchError::IndexUnavailable(format!(
                "index dimension {} does not match query dimension {}; rebuild the index",
                index.manifest.dimension,
                vector.len()
            )));
        }

        let hits = rank_top_k(&vector, index.vectors(), top_k)
            .into_iter()
            .enumerate()
            .map(|(rank, (position, score))| {
                let entry = &index.entries[position];
                SearchHit {
                    rank: rank + 1,
                    label: entry.label.clone(),
                    json_name: entry.json_name.clone(),
                    score,
                }
            })
            .collect::<Vec<_>>();
        debug!(top_k, hits = hits.len(), "search ranked");

        Ok(SearchOutcome {
            query: parsed,
            sections: views,
            hits,
        })
    }
}

fn unavailable(err: CacheError) -> SearchError {
    SearchError::IndexUnavailable(err.to_string())
}

/// Probes `encoder` in the background until it answers, then fills the slot.
///
/// Delay doubles after each failure up to `max_delay`. Searches get `EncoderNotReady`
/// until the probe succeeds.
pub fn spawn_encoder_warmup(
    ctx: Arc<SearchContext>,
    encoder: Arc<dyn Encoder>,
    initial_delay: Duration,
    max_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let probe = vec!["warm-up".to_string()];
        let mut delay = initial_delay;
        let mut attempt: u32 = 1;
        loop {
            match encoder.encode(&probe).await {
                Ok(_) => {
                    info!(encoder_id = %encoder.id(), attempt, "encoder ready");
                    ctx.set_encoder(encoder);
                    return;
                }
                Err(e) => {
                    warn!(
                        encoder_id = %encoder.id(),
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "encoder not reachable yet: {e}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                    attempt += 1;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::encoder::HashEncoder;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seed_profiles(dir: &Path) {
        let docs = [
            ("anna_bianchi", r#"{"name":"Anna Bianchi","title":"Data Engineer","skills":["Python","Spark","Airflow"],"technologies":["AWS"]}"#),
            ("mario_rossi", r#"{"name":"Mario Rossi","title":"Java Developer","skills":["Java","Spring"],"technologies":["Kubernetes"]}"#),
            ("luca_verdi", r#"{"name":"Luca Verdi","title":"SAP Consultant","skills":["SAP","ABAP"]}"#),
        ];
        for (stem, body) in docs {
            fs::write(dir.join(format!("{stem}.json")), body).unwrap();
        }
    }

    fn context(profiles: &Path, cache: &Path, dim: usize) -> SearchContext {
        SearchContext::with_encoder(
            ProfileStore::new(profiles),
            cache,
            Arc::new(HashEncoder::new(dim)),
        )
    }

    /// Tracks how many `encode` calls overlap.
    struct OverlapEncoder {
        inner: HashEncoder,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Encoder for OverlapEncoder {
        fn id(&self) -> String {
            self.inner.id()
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            let out = self.inner.encode(texts).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            out
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rebuilds_do_not_interleave() {
        let profiles = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        seed_profiles(profiles.path());
        let encoder = Arc::new(OverlapEncoder {
            inner: HashEncoder::new(64),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        });
        let ctx = Arc::new(SearchContext::with_encoder(
            ProfileStore::new(profiles.path()),
            cache.path(),
            encoder.clone(),
        ));

        let first = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.rebuild().await }
        });
        let second = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.rebuild().await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(encoder.max_in_flight.load(Ordering::SeqCst), 1);
        let index = DocumentIndex::load(cache.path()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.manifest.count, 3);
    }

    #[tokio::test]
    async fn test_rebuild_then_search_ranks_best_match_first() {
        let profiles = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        seed_profiles(profiles.path());
        let ctx = context(profiles.path(), cache.path(), 512);

        let report = ctx.rebuild().await.unwrap();
        assert_eq!(report.indexed, 3);

        let outcome = ctx
            .search("Skills: Java, Spring\nTecnologie: Kubernetes", 2)
            .await
            .unwrap();
        assert_eq!(outcome.hits.len(), 2);
        assert_eq!(outcome.hits[0].json_name, "mario_rossi");
        assert_eq!(outcome.hits[0].rank, 1);
        assert_eq!(outcome.hits[1].rank, 2);
        assert!(outcome.hits[0].score >= outcome.hits[1].score);
        assert_eq!(outcome.query.skills, vec!["Java", "Spring"]);
        assert_eq!(outcome.sections.len(), 4);
        assert_eq!(outcome.sections[0].weight, 0.40);
    }

    #[tokio::test]
    async fn test_blank_query_is_empty_even_without_encoder() {
        let profiles = tempfile::tempdir().unwrap();
        let ctx = SearchContext::new(ProfileStore::new(profiles.path()), profiles.path());

        let outcome = ctx.search("  \n ", 5).await.unwrap();
        assert!(outcome.hits.is_empty());
        assert!(outcome.sections.is_empty());
    }

    #[tokio::test]
    async fn test_encoder_not_ready() {
        let profiles = tempfile::tempdir().unwrap();
        let ctx = SearchContext::new(ProfileStore::new(profiles.path()), profiles.path());
        assert!(matches!(
            ctx.search("Skills: Rust", 5).await,
            Err(SearchError::EncoderNotReady)
        ));
        assert!(matches!(ctx.rebuild().await, Err(SearchError::EncoderNotReady)));
    }

    #[tokio::test]
    async fn test_missing_cache_is_index_unavailable() {
        let profiles = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let ctx = context(profiles.path(), cache.path(), 64);

        match ctx.search("Skills: Rust", 5).await {
            Err(SearchError::IndexUnavailable(msg)) => assert!(msg.contains("cv_embeddings.npy")),
            other => panic!("expected IndexUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_from_other_encoder_is_rejected() {
        let profiles = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        seed_profiles(profiles.path());
        context(profiles.path(), cache.path(), 64).rebuild().await.unwrap();

        let other = context(profiles.path(), cache.path(), 128);
        match other.search("Skills: SAP", 3).await {
            Err(SearchError::IndexUnavailable(msg)) => assert!(msg.contains("rebuild")),
            other => panic!("expected IndexUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_hits() {
        let profiles = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let ctx = context(profiles.path(), cache.path(), 64);
        ctx.rebuild().await.unwrap();

        let outcome = ctx.search("Skills: Rust", 5).await.unwrap();
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.query.skills, vec!["Rust"]);
    }

    #[tokio::test]
    async fn test_status_reflects_loaded_index() {
        let profiles = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        seed_profiles(profiles.path());
        let ctx = context(profiles.path(), cache.path(), 32);

        let before = ctx.status().await;
        assert!(before.encoder_ready);
        assert!(!before.loaded);

        ctx.rebuild().await.unwrap();
        let after = ctx.status().await;
        assert!(after.loaded);
        assert_eq!(after.count, 3);
        assert_eq!(after.dimension, 32);
        assert_eq!(after.index_encoder_id.as_deref(), Some("hash-v1:32"));
    }

    struct FlakyEncoder {
        failures_left: AtomicUsize,
        inner: HashEncoder,
    }

    #[async_trait]
    impl Encoder for FlakyEncoder {
        fn id(&self) -> String {
            self.inner.id()
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EncoderError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(EncoderError::Api {
                    status: 503,
                    message: "loading model".to_string(),
                });
            }
            self.inner.encode(texts).await
        }
    }

    #[tokio::test]
    async fn test_warmup_fills_slot_after_retries() {
        let profiles = tempfile::tempdir().unwrap();
        let ctx = Arc::new(SearchContext::new(
            ProfileStore::new(profiles.path()),
            profiles.path(),
        ));
        let encoder = Arc::new(FlakyEncoder {
            failures_left: AtomicUsize::new(2),
            inner: HashEncoder::new(8),
        });

        spawn_encoder_warmup(
            Arc::clone(&ctx),
            encoder.clone(),
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
        .await
        .unwrap();

        assert!(ctx.encoder().is_ok());
        assert_eq!(encoder.failures_left.load(Ordering::SeqCst), 0);
    }
}
