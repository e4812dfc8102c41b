use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::profiles::store::{ProfileStore, SkippedFile, StoreError};
use crate::retrieval::cache::{self, CacheColumns, CacheContents, CacheError, Manifest};
use crate::retrieval::combiner::embed_batch;
use crate::retrieval::encoder::{Encoder, EncoderError};
use crate::retrieval::sections::{compose_sections, SECTION_WEIGHTS};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: Vec<SkippedFile>,
    pub dimension: usize,
    pub encoder_id: String,
    pub elapsed_ms: u64,
}

/// One profile as seen by the ranker.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub label: String,
    pub json_name: String,
    pub text: String,
    pub composite: Vec<f32>,
}

/// In-memory document table. Read-only once built; a rebuild replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentIndex {
    pub manifest: Manifest,
    pub entries: Vec<IndexEntry>,
}

impl DocumentIndex {
    pub fn load(cache_dir: &Path) -> Result<Self, CacheError> {
        cache::read_cache(cache_dir).map(Self::from)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(position, composite)` pairs in stored order, ready for ranking.
    pub fn vectors(&self) -> impl Iterator<Item = (usize, &[f32])> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, e.composite.as_slice()))
    }
}

impl From<CacheContents> for DocumentIndex {
    fn from(contents: CacheContents) -> Self {
        let CacheColumns {
            labels,
            json_names,
            texts,
        } = contents.columns;
        let entries = labels
            .into_iter()
            .zip(json_names)
            .zip(texts)
            .zip(contents.composite)
            .map(|(((label, json_name), text), composite)| IndexEntry {
                label,
                json_name,
                text,
                composite,
            })
            .collect();
        Self {
            manifest: contents.manifest,
            entries,
        }
    }
}

/// Embeds every profile in `profiles_dir` and writes a fresh cache to `cache_dir`.
///
/// Nothing is written when the encoder fails.
pub async fn build_index(
    profiles_dir: &Path,
    cache_dir: &Path,
    encoder: &dyn Encoder,
) -> Result<IndexReport, IndexError> {
    let started = Instant::now();
    let (profiles, skipped) = ProfileStore::new(profiles_dir).load_all()?;

    let sections: Vec<_> = profiles.iter().map(|p| compose_sections(&p.profile)).collect();
    let embedded = embed_batch(encoder, &sections, &SECTION_WEIGHTS).await?;
    if embedded.is_empty() {
        warn!(dir = %profiles_dir.display(), "no readable profiles; writing an empty cache");
    }

    let columns = CacheColumns {
        labels: profiles
            .iter()
            .map(|p| p.profile.label_or(&p.id).to_string())
            .collect(),
        json_names: profiles.iter().map(|p| p.id.clone()).collect(),
        texts: sections.iter().map(|s| s.joined()).collect(),
    };
    let manifest = Manifest {
        encoder_id: encoder.id(),
        dimension: embedded.dimension,
        count: embedded.len(),
        weights: SECTION_WEIGHTS,
        created_at: Utc::now(),
    };

    let cache_dir_owned = cache_dir.to_path_buf();
    let manifest_for_write = manifest.clone();
    tokio::task::spawn_blocking(move || {
        cache::write_cache(&cache_dir_owned, &manifest_for_write, &columns, &embedded)
    })
    .await
    .map_err(|e| {
        CacheError::Io {
            path: cache_dir.to_path_buf(),
            source: std::io::Error::other(e),
        }
    })??;

    let report = IndexReport {
        indexed: manifest.count,
        skipped,
        dimension: manifest.dimension,
        encoder_id: manifest.encoder_id,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        indexed = report.indexed,
        skipped = report.skipped.len(),
        dimension = report.dimension,
        elapsed_ms = report.elapsed_ms,
        "profile index built"
    );
    Ok(report)
}
