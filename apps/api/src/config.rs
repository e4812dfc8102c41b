use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::retrieval::encoder::EncoderBackend;

/// Application configuration loaded from environment variables.
/// Every variable has a default; a `.env` file is honoured when present.
#[derive(Debug, Clone)]
pub struct Config {
    pub profiles_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub encoder_backend: EncoderBackend,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_timeout_secs: u64,
    pub hash_dimension: usize,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub default_top_k: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            profiles_dir: PathBuf::from(var("PROFILES_DIR", "./cv_json")),
            cache_dir: PathBuf::from(var("CACHE_DIR", "./embeddings")),
            encoder_backend: EncoderBackend::from_str(&var("ENCODER_BACKEND", "http"))
                .map_err(|e| anyhow!(e))
                .context("ENCODER_BACKEND must be 'http' or 'hash'")?,
            embedding_url: var("EMBEDDING_URL", "http://localhost:11434"),
            embedding_model: var("EMBEDDING_MODEL", "bge-m3"),
            embedding_timeout_secs: parse_var(&lookup, "EMBEDDING_TIMEOUT_SECS", 60)?,
            hash_dimension: parse_var(&lookup, "HASH_DIMENSION", 1024)?,
            llm_url: var("LLM_URL", "http://localhost:11434"),
            llm_model: var("LLM_MODEL", "llama3.2:3b"),
            llm_timeout_secs: parse_var(&lookup, "LLM_TIMEOUT_SECS", 180)?,
            default_top_k: parse_var(&lookup, "DEFAULT_TOP_K", 5)?,
            port: parse_var(&lookup, "PORT", 8080)?,
            rust_log: var("RUST_LOG", "info"),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
