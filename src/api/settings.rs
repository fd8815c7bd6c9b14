//! Settings endpoints

use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::{LibrarySettings, UpdateSettings},
};

use super::{with_retries, AuthenticatedUser};

/// Get current settings
#[utoipa::path(
    get,
    path = "/settings",
    tag = "settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current lending policy", body = LibrarySettings)
    )
)]
pub async fn get_settings(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
) -> AppResult<Json<LibrarySettings>> {
    let settings = with_retries(&state, || state.services.settings.get_settings()).await?;
    Ok(Json(settings))
}

/// Update settings
#[utoipa::path(
    put,
    path = "/settings",
    tag = "settings",
    security(("bearer_auth" = [])),
    request_body = UpdateSettings,
    responses(
        (status = 200, description = "Settings updated", body = LibrarySettings),
        (status = 400, description = "Invalid value"),
        (status = 403, description = "Administrators only")
    )
)]
pub async fn update_settings(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<UpdateSettings>,
) -> AppResult<Json<LibrarySettings>> {
    user.actor().require_admin()?;

    let settings = with_retries(&state, || state.services.settings.update_settings(&request)).await?;
    Ok(Json(settings))
}
