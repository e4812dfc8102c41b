pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::profiles::handlers as profiles;
use crate::retrieval::handlers as retrieval;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Index + search
        .route("/api/v1/index", get(retrieval::handle_index_status))
        .route("/api/v1/index/rebuild", post(retrieval::handle_rebuild))
        .route("/api/v1/search", post(retrieval::handle_search))
        // Profile store + ingestion
        .route(
            "/api/v1/profiles",
            get(profiles::handle_list_profiles).post(profiles::handle_save_profile),
        )
        .route("/api/v1/profiles/:id", get(profiles::handle_get_profile))
        .route(
            "/api/v1/profiles/extract",
            post(profiles::handle_extract_profile),
        )
        .route(
            "/api/v1/profiles/from-slides",
            post(profiles::handle_profile_from_slides),
        )
        .with_state(state)
}
