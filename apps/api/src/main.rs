mod config;
mod errors;
mod llm_client;
mod models;
mod profiles;
mod retrieval;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::profiles::store::ProfileStore;
use crate::retrieval::context::{spawn_encoder_warmup, SearchContext};
use crate::retrieval::encoder::{build_encoder, EncoderBackend};
use crate::retrieval::index::build_index;
use crate::routes::build_router;
use crate::state::AppState;

const WARMUP_INITIAL_DELAY: Duration = Duration::from_secs(1);
const WARMUP_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "cv-search", version, about = "Weighted multi-section CV retrieval")]
struct Cli {
    /// Embedding backend; overrides ENCODER_BACKEND
    #[arg(long, global = true, value_enum)]
    encoder: Option<EncoderBackend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Rebuild the embedding cache from the profile folder
    Index {
        #[arg(long)]
        profiles_dir: Option<PathBuf>,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Rank cached profiles against a tagged query
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(backend) = cli.encoder {
        config.encoder_backend = backend;
    }

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Command::Index {
            profiles_dir,
            cache_dir,
        } => {
            if let Some(dir) = profiles_dir {
                config.profiles_dir = dir;
            }
            if let Some(dir) = cache_dir {
                config.cache_dir = dir;
            }
            let encoder = build_encoder(&config)?;
            let report = build_index(&config.profiles_dir, &config.cache_dir, encoder.as_ref())
                .await
                .context("index build failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Search { query, top_k } => {
            let encoder = build_encoder(&config)?;
            let ctx = SearchContext::with_encoder(
                ProfileStore::new(&config.profiles_dir),
                &config.cache_dir,
                encoder,
            );
            let outcome = ctx
                .search(&query, top_k.unwrap_or(config.default_top_k))
                .await
                .context("search failed")?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting cv-search API v{}", env!("CARGO_PKG_VERSION"));

    let llm = LlmClient::new(
        config.llm_url.clone(),
        config.llm_model.clone(),
        Duration::from_secs(config.llm_timeout_secs),
    )?;
    info!("LLM client initialized (model: {})", llm.model());

    let search = Arc::new(SearchContext::new(
        ProfileStore::new(&config.profiles_dir),
        &config.cache_dir,
    ));

    let encoder = build_encoder(&config)?;
    match config.encoder_backend {
        // Remote model may still be loading; searches answer 503 until it responds.
        EncoderBackend::Http => {
            spawn_encoder_warmup(
                search.clone(),
                encoder,
                WARMUP_INITIAL_DELAY,
                WARMUP_MAX_DELAY,
            );
        }
        EncoderBackend::Hash => {
            search.set_encoder(encoder);
        }
    }

    if let Err(e) = search.load_cache().await {
        warn!("Embedding cache not loaded at startup: {e}");
    }

    let state = AppState {
        config: config.clone(),
        llm,
        search,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
