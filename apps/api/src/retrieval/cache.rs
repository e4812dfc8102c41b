//! Columnar on-disk embedding cache.
//!
//! ```text
//! CACHE_DIR/
//!   cv_embeddings.npy              N x D composite matrix (f32)
//!   cv_embeddings_{section}.npy    N x D per-section matrices
//!   cv_labels.json                 N display labels
//!   cv_json_names.json             N profile file stems
//!   cv_texts.json                  N joined section texts
//!   manifest.json                  encoder id, dimension, count, weights, timestamp
//! ```
//!
//! Row `i` of every column refers to the same profile.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy, ReadNpyError, WriteNpyError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::retrieval::combiner::EmbeddedBatch;
use crate::retrieval::sections::{Section, SectionWeights};

pub const COMPOSITE_FILE: &str = "cv_embeddings.npy";
pub const LABELS_FILE: &str = "cv_labels.json";
pub const JSON_NAMES_FILE: &str = "cv_json_names.json";
pub const TEXTS_FILE: &str = "cv_texts.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Files that must all be present for a cache to be readable.
const REQUIRED_FILES: [&str; 5] = [
    COMPOSITE_FILE,
    LABELS_FILE,
    JSON_NAMES_FILE,
    TEXTS_FILE,
    MANIFEST_FILE,
];

pub fn section_file(section: Section) -> String {
    format!("cv_embeddings_{}.npy", section.as_str())
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("embedding cache in {} is incomplete; missing: {}", dir.display(), files.join(", "))]
    Missing { dir: PathBuf, files: Vec<String> },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read array {}: {source}", path.display())]
    ReadArray {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },

    #[error("failed to write array {}: {source}", path.display())]
    WriteArray {
        path: PathBuf,
        #[source]
        source: WriteNpyError,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("embedding cache is inconsistent: {0}")]
    Inconsistent(String),
}

/// Build metadata written last, so its presence marks a complete cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub encoder_id: String,
    pub dimension: usize,
    pub count: usize,
    pub weights: SectionWeights,
    pub created_at: DateTime<Utc>,
}

/// Per-row metadata stored alongside the matrices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheColumns {
    pub labels: Vec<String>,
    pub json_names: Vec<String>,
    pub texts: Vec<String>,
}

impl CacheColumns {
    pub fn rows(&self) -> usize {
        self.labels.len()
    }
}

/// Everything a search needs from disk. Section matrices stay on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheContents {
    pub manifest: Manifest,
    pub columns: CacheColumns,
    pub composite: Vec<Vec<f32>>,
}

// ─── Write ────────────────────────────────────────────────────────────────────

/// Writes a full cache, replacing whatever is in `dir`.
///
/// Files are staged in a temporary directory inside `dir` and renamed into place,
/// manifest last. A failure while staging leaves `dir` untouched. A failure during the
/// renames can leave a mix of old and new files; `read_cache` then reports the mismatch
/// as `Inconsistent` when counts differ, and only a rebuild repairs it. Callers must not
/// run two writes on the same `dir` at once.
pub fn write_cache(
    dir: &Path,
    manifest: &Manifest,
    columns: &CacheColumns,
    embedded: &EmbeddedBatch,
) -> Result<(), CacheError> {
    let rows = columns.rows();
    if columns.json_names.len() != rows
        || columns.texts.len() != rows
        || embedded.len() != rows
        || manifest.count != rows
    {
        return Err(CacheError::Inconsistent(format!(
            "labels={rows} json_names={} texts={} vectors={} manifest.count={}",
            columns.json_names.len(),
            columns.texts.len(),
            embedded.len(),
            manifest.count
        )));
    }

    fs::create_dir_all(dir).map_err(|source| io_error(dir, source))?;
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(dir)
        .map_err(|source| io_error(dir, source))?;

    let mut staged: Vec<String> = Vec::with_capacity(10);

    write_matrix(staging.path(), COMPOSITE_FILE, &embedded.composite, manifest.dimension)?;
    staged.push(COMPOSITE_FILE.to_string());
    for section in Section::ALL {
        let name = section_file(section);
        write_matrix(staging.path(), &name, embedded.section(section), manifest.dimension)?;
        staged.push(name);
    }

    write_json(staging.path(), LABELS_FILE, &columns.labels)?;
    write_json(staging.path(), JSON_NAMES_FILE, &columns.json_names)?;
    write_json(staging.path(), TEXTS_FILE, &columns.texts)?;
    staged.extend([LABELS_FILE, JSON_NAMES_FILE, TEXTS_FILE].map(String::from));

    write_json(staging.path(), MANIFEST_FILE, manifest)?;
    staged.push(MANIFEST_FILE.to_string());

    for name in &staged {
        let from = staging.path().join(name);
        let to = dir.join(name);
        fs::rename(&from, &to).map_err(|source| io_error(&to, source))?;
    }

    tracing::debug!(dir = %dir.display(), files = staged.len(), "embedding cache written");
    Ok(())
}

fn write_matrix(
    dir: &Path,
    name: &str,
    rows: &[Vec<f32>],
    dimension: usize,
) -> Result<(), CacheError> {
    let path = dir.join(name);
    let mut flat = Vec::with_capacity(rows.len() * dimension);
    for row in rows {
        if row.len() != dimension {
            return Err(CacheError::Inconsistent(format!(
                "{name}: row of length {} in a {dimension}-wide matrix",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    let matrix = Array2::from_shape_vec((rows.len(), dimension), flat)
        .map_err(|e| CacheError::Inconsistent(format!("{name}: {e}")))?;
    write_npy(&path, &matrix).map_err(|source| CacheError::WriteArray { path, source })
}

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<(), CacheError> {
    let path = dir.join(name);
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| CacheError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, bytes).map_err(|source| io_error(&path, source))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

/// Files from the required set that are absent in `dir`.
pub fn missing_files(dir: &Path) -> Vec<String> {
    REQUIRED_FILES
        .iter()
        .filter(|name| !dir.join(name).is_file())
        .map(|name| name.to_string())
        .collect()
}

/// Loads the composite matrix and row metadata, validating that every column agrees.
pub fn read_cache(dir: &Path) -> Result<CacheContents, CacheError> {
    let missing = missing_files(dir);
    if !missing.is_empty() {
        return Err(CacheError::Missing {
            dir: dir.to_path_buf(),
            files: missing,
        });
    }

    let manifest: Manifest = read_json(dir, MANIFEST_FILE)?;
    let columns = CacheColumns {
        labels: read_json(dir, LABELS_FILE)?,
        json_names: read_json(dir, JSON_NAMES_FILE)?,
        texts: read_json(dir, TEXTS_FILE)?,
    };

    let path = dir.join(COMPOSITE_FILE);
    let matrix: Array2<f32> =
        read_npy(&path).map_err(|source| CacheError::ReadArray { path, source })?;
    let (rows, width) = matrix.dim();

    if columns.json_names.len() != columns.rows()
        || columns.texts.len() != columns.rows()
        || rows != columns.rows()
        || manifest.count != rows
    {
        return Err(CacheError::Inconsistent(format!(
            "labels={} json_names={} texts={} matrix rows={rows} manifest.count={}",
            columns.rows(),
            columns.json_names.len(),
            columns.texts.len(),
            manifest.count
        )));
    }
    if rows > 0 && width != manifest.dimension {
        return Err(CacheError::Inconsistent(format!(
            "matrix width {width} but manifest dimension {}",
            manifest.dimension
        )));
    }

    let composite = matrix.outer_iter().map(|row| row.to_vec()).collect();
    Ok(CacheContents {
        manifest,
        columns,
        composite,
    })
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T, CacheError> {
    let path = dir.join(name);
    let bytes = fs::read(&path).map_err(|source| io_error(&path, source))?;
    serde_json::from_slice(&bytes).map_err(|source| CacheError::Json { path, source })
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}
