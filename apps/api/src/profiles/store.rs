//! Profile store: a folder holding one JSON document per profile.
//!
//! A profile's id is its file stem. Stems produced by [`name_to_filename`] are lowercase
//! ASCII alphanumerics joined by underscores.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::profile::Profile;

/// File stem used when a name has no usable characters.
pub const UNNAMED_STEM: &str = "cv_senza_nome";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile folder {} does not exist", .0.display())]
    DirMissing(PathBuf),

    #[error("profile '{0}' not found")]
    NotFound(String),

    #[error("profile '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid profile id '{0}'")]
    InvalidId(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid profile document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A profile read from the store together with its id.
#[derive(Debug, Clone)]
pub struct StoredProfile {
    pub id: String,
    pub profile: Profile,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileSummary {
    pub id: String,
    pub label: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedProfile {
    pub id: String,
    pub path: PathBuf,
    pub overwritten: bool,
}

/// Lowercases, drops everything but ASCII letters, digits and whitespace, then joins
/// the remaining words with underscores.
pub fn name_to_filename(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    let stem = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if stem.is_empty() {
        UNNAMED_STEM.to_string()
    } else {
        stem
    }
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `*.json` paths sorted by file name.
    fn json_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.dir.is_dir() {
            return Err(StoreError::DirMissing(self.dir.clone()));
        }
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        let valid = !id.is_empty()
            && id != "."
            && id != ".."
            && !id.contains(['/', '\\'])
            && !id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Reads every document, sorted by file name.
    ///
    /// Unreadable or malformed documents are skipped with a warning and reported back.
    pub fn load_all(&self) -> Result<(Vec<StoredProfile>, Vec<SkippedFile>), StoreError> {
        let mut loaded = Vec::new();
        let mut skipped = Vec::new();

        for path in self.json_paths()? {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match read_profile(&path) {
                Ok(profile) => loaded.push(StoredProfile {
                    id: stem_of(&path),
                    profile: profile.normalized(),
                }),
                Err(e) => {
                    let reason = e.to_string();
                    warn!(file = %file, %reason, "skipping malformed profile document");
                    skipped.push(SkippedFile { file, reason });
                }
            }
        }

        Ok((loaded, skipped))
    }

    pub fn list(&self) -> Result<Vec<ProfileSummary>, StoreError> {
        let (loaded, _) = self.load_all()?;
        Ok(loaded
            .into_iter()
            .map(|stored| ProfileSummary {
                label: stored.profile.label_or(&stored.id).to_string(),
                title: stored.profile.title,
                id: stored.id,
            })
            .collect())
    }

    pub fn load(&self, id: &str) -> Result<Profile, StoreError> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        read_profile(&path).map(Profile::normalized)
    }

    /// Resolves a display label to a stored id.
    ///
    /// An exact match on the normalized stem wins; otherwise the first file (by name)
    /// whose stem contains every word of the label.
    pub fn find_by_label(&self, label: &str) -> Result<Option<String>, StoreError> {
        let normalized = label.trim().to_lowercase().replace([' ', '.'], "_");
        let parts: Vec<&str> = normalized.split('_').filter(|p| !p.is_empty()).collect();
        if parts.is_empty() {
            return Ok(None);
        }

        let stems: Vec<String> = self.json_paths()?.iter().map(|p| stem_of(p)).collect();
        if let Some(exact) = stems.iter().find(|s| s.to_lowercase() == normalized) {
            return Ok(Some(exact.clone()));
        }
        Ok(stems.into_iter().find(|stem| {
            let lowered = stem.to_lowercase();
            parts.iter().all(|part| lowered.contains(part))
        }))
    }

    /// Loads by id, falling back to label resolution.
    pub fn resolve(&self, id_or_label: &str) -> Result<StoredProfile, StoreError> {
        match self.load(id_or_label) {
            Ok(profile) => Ok(StoredProfile {
                id: id_or_label.to_string(),
                profile,
            }),
            Err(StoreError::NotFound(_)) | Err(StoreError::InvalidId(_)) => {
                let id = self
                    .find_by_label(id_or_label)?
                    .ok_or_else(|| StoreError::NotFound(id_or_label.to_string()))?;
                let profile = self.load(&id)?;
                Ok(StoredProfile { id, profile })
            }
            Err(e) => Err(e),
        }
    }

    /// Writes `<name_to_filename(name)>.json`, refusing to replace an existing file
    /// unless `overwrite` is set.
    pub fn save(&self, profile: &Profile, overwrite: bool) -> Result<SavedProfile, StoreError> {
        let id = name_to_filename(&profile.name);
        let path = self.path_for(&id)?;
        let exists = path.exists();
        if exists && !overwrite {
            return Err(StoreError::AlreadyExists(id));
        }

        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let bytes = serde_json::to_vec_pretty(profile).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let mut staged = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        staged.write_all(&bytes).map_err(io_err)?;
        if overwrite {
            staged.persist(&path).map_err(|e| io_err(e.error))?;
        } else {
            // A concurrent save may have created the file since the check above.
            staged.persist_noclobber(&path).map_err(|e| {
                if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                    StoreError::AlreadyExists(id.clone())
                } else {
                    io_err(e.error)
                }
            })?;
        }

        info!(id = %id, overwritten = exists, "profile saved");
        Ok(SavedProfile {
            id,
            path,
            overwritten: exists,
        })
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_profile(path: &Path) -> Result<Profile, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile {
            name: name.to_string(),
            title: "Consultant".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_name_to_filename() {
        assert_eq!(name_to_filename("Mario Rossi"), "mario_rossi");
        assert_eq!(name_to_filename("  Anna   Maria  De Luca "), "anna_maria_de_luca");
        assert_eq!(name_to_filename("D'Angelo, Paolo"), "dangelo_paolo");
        assert_eq!(name_to_filename("Nicolò Fabbri"), "nicol_fabbri");
        assert_eq!(name_to_filename("Agent 007"), "agent_007");
    }

    #[test]
    fn test_name_to_filename_fallback() {
        assert_eq!(name_to_filename(""), UNNAMED_STEM);
        assert_eq!(name_to_filename("---"), UNNAMED_STEM);
        assert_eq!(name_to_filename("ÀÈÌ"), UNNAMED_STEM);
    }

    #[test]
    fn test_save_refuses_overwrite_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());

        let saved = store.save(&profile("Mario Rossi"), false).unwrap();
        assert_eq!(saved.id, "mario_rossi");
        assert!(!saved.overwritten);

        let err = store.save(&profile("Mario Rossi"), false).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "mario_rossi"));

        let again = store.save(&profile("Mario Rossi"), true).unwrap();
        assert!(again.overwritten);
    }

    #[test]
    fn test_concurrent_saves_without_overwrite_have_one_winner() {
        use std::sync::Barrier;

        for _ in 0..50 {
            let dir = tempfile::tempdir().unwrap();
            let store = ProfileStore::new(dir.path());
            let barrier = Barrier::new(2);

            let outcomes: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            store.save(&profile("Mario Rossi"), false)
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let saved = outcomes.iter().filter(|r| r.is_ok()).count();
            assert_eq!(saved, 1);
            assert!(outcomes
                .iter()
                .any(|r| matches!(r, Err(StoreError::AlreadyExists(id)) if id == "mario_rossi")));
        }
    }

    #[test]
    fn test_save_creates_folder_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("cv_json"));

        let mut original = profile("Luca Verdi");
        original.skills = vec!["Rust".to_string()];
        store.save(&original, false).unwrap();

        assert_eq!(store.load("luca_verdi").unwrap(), original);
    }

    #[test]
    fn test_load_all_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.json"), r#"{"name":"B"}"#).unwrap();
        fs::write(dir.path().join("a.json"), "not json").unwrap();
        fs::write(dir.path().join("c.json"), r#"{"name":"C"}"#).unwrap();

        let (loaded, skipped) = ProfileStore::new(dir.path()).load_all().unwrap();
        let ids: Vec<_> = loaded.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].file, "a.json");
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("absent"));
        assert!(matches!(store.load_all(), Err(StoreError::DirMissing(_))));
    }

    #[test]
    fn test_load_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(matches!(store.load("../etc/passwd"), Err(StoreError::InvalidId(_))));
        assert!(matches!(store.load("nobody"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_find_by_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.save(&profile("Mario Rossi"), false).unwrap();
        store.save(&profile("Giovanni Mario Bianchi"), false).unwrap();

        assert_eq!(
            store.find_by_label("Mario Rossi").unwrap().as_deref(),
            Some("mario_rossi")
        );
        assert_eq!(
            store.find_by_label("bianchi mario").unwrap().as_deref(),
            Some("giovanni_mario_bianchi")
        );
        assert_eq!(store.find_by_label("Paolo Bianchi").unwrap().as_deref(), None);
        assert_eq!(store.find_by_label("  ").unwrap(), None);
    }

    #[test]
    fn test_resolve_by_id_or_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.save(&profile("Anna Neri"), false).unwrap();

        assert_eq!(store.resolve("anna_neri").unwrap().profile.name, "Anna Neri");
        assert_eq!(store.resolve("Anna Neri").unwrap().id, "anna_neri");
        assert!(matches!(store.resolve("Paolo"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_list_uses_label_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cv_042.json"), r#"{"title":"Analyst"}"#).unwrap();

        let listed = ProfileStore::new(dir.path()).list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].label, "cv_042");
        assert_eq!(listed[0].title, "Analyst");
    }
}
