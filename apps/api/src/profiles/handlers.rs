//! Axum route handlers for the profile API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::profiles::extract::extract_profile;
use crate::profiles::slide_parser::parse_slide_text;
use crate::profiles::store::{ProfileSummary, SavedProfile};
use crate::retrieval::sections::{compose_sections, SectionTexts};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OverwriteQuery {
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SlidesRequest {
    pub text: String,
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Serialize)]
pub struct ProfileListResponse {
    pub profiles: Vec<ProfileSummary>,
}

#[derive(Serialize)]
pub struct ProfileDetailResponse {
    pub id: String,
    pub profile: Profile,
    pub sections: SectionTexts,
}

#[derive(Serialize)]
pub struct ProfilePreviewResponse {
    pub profile: Profile,
    pub sections: SectionTexts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<SavedProfile>,
}

/// GET /api/v1/profiles
pub async fn handle_list_profiles(
    State(state): State<AppState>,
) -> Result<Json<ProfileListResponse>, AppError> {
    let profiles = state.search.store().list()?;
    Ok(Json(ProfileListResponse { profiles }))
}

/// GET /api/v1/profiles/:id
///
/// Accepts a file stem or a display label.
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProfileDetailResponse>, AppError> {
    let stored = state.search.store().resolve(&id)?;
    let sections = compose_sections(&stored.profile);
    Ok(Json(ProfileDetailResponse {
        id: stored.id,
        profile: stored.profile,
        sections,
    }))
}

/// POST /api/v1/profiles
///
/// Saves a manually entered profile. The index is not rebuilt automatically.
pub async fn handle_save_profile(
    State(state): State<AppState>,
    Query(params): Query<OverwriteQuery>,
    Json(profile): Json<Profile>,
) -> Result<(StatusCode, Json<SavedProfile>), AppError> {
    let profile = profile.normalized();
    if profile.name.is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }
    let saved = state.search.store().save(&profile, params.overwrite)?;
    let status = if saved.overwritten {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(saved)))
}

/// POST /api/v1/profiles/extract
///
/// LLM extraction preview; persisting is a separate save.
pub async fn handle_extract_profile(
    State(state): State<AppState>,
    Json(request): Json<TextRequest>,
) -> Result<Json<ProfilePreviewResponse>, AppError> {
    let profile = extract_profile(&state.llm, &request.text).await?;
    let sections = compose_sections(&profile);
    Ok(Json(ProfilePreviewResponse {
        profile,
        sections,
        saved: None,
    }))
}

/// POST /api/v1/profiles/from-slides
pub async fn handle_profile_from_slides(
    State(state): State<AppState>,
    Json(request): Json<SlidesRequest>,
) -> Result<Json<ProfilePreviewResponse>, AppError> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }

    let profile = parse_slide_text(&request.text);
    let saved = if request.save {
        if profile.name.is_empty() {
            return Err(AppError::Validation(
                "no name found in the slide text; cannot save".to_string(),
            ));
        }
        Some(state.search.store().save(&profile, request.overwrite)?)
    } else {
        None
    };
    let sections = compose_sections(&profile);
    Ok(Json(ProfilePreviewResponse {
        profile,
        sections,
        saved,
    }))
}
