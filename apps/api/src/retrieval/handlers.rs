//! Axum route handlers for the search and index API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::profiles::analysis::{assess_candidate, CandidateAssessment};
use crate::retrieval::context::{IndexStatus, SearchHit, SectionView};
use crate::retrieval::index::IndexReport;
use crate::state::AppState;

/// Hard cap on `top_k` per request.
pub const MAX_TOP_K: usize = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    #[serde(default)]
    pub analyze: bool,
}

#[derive(Debug, Serialize)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub hit: SearchHit,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<CandidateAssessment>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: Profile,
    pub sections: Vec<SectionView>,
    pub results: Vec<RankedCandidate>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/index
pub async fn handle_index_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.search.status().await)
}

/// POST /api/v1/index/rebuild
///
/// Re-embeds the whole profile folder and swaps the new table in.
pub async fn handle_rebuild(State(state): State<AppState>) -> Result<Json<IndexReport>, AppError> {
    let report = state.search.rebuild().await?;
    Ok(Json(report))
}

/// POST /api/v1/search
///
/// Parses the tagged query, ranks stored profiles by composite similarity and,
/// when `analyze` is set, asks the LLM to assess each hit.
pub async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let top_k = request.top_k.unwrap_or(state.config.default_top_k);
    if top_k > MAX_TOP_K {
        return Err(AppError::Validation(format!(
            "top_k must be at most {MAX_TOP_K}"
        )));
    }

    let outcome = state.search.search(&request.query, top_k).await?;
    info!(top_k, hits = outcome.hits.len(), analyze = request.analyze, "search served");

    let mut results = Vec::with_capacity(outcome.hits.len());
    for hit in outcome.hits {
        let assessment = if request.analyze {
            Some(assess_hit(&state, &hit, &request.query).await)
        } else {
            None
        };
        results.push(RankedCandidate { hit, assessment });
    }

    Ok(Json(SearchResponse {
        query: outcome.query,
        sections: outcome.sections,
        results,
    }))
}

async fn assess_hit(state: &AppState, hit: &SearchHit, query: &str) -> CandidateAssessment {
    match state.search.store().load(&hit.json_name) {
        Ok(profile) => assess_candidate(&state.llm, &profile, query, hit.score).await,
        Err(e) => CandidateAssessment {
            text: format!("Profilo non leggibile: {e}"),
            score: None,
            verdict: None,
            available: false,
        },
    }
}
