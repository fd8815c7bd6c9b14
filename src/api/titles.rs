//! Title availability endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{QueueEntry, TitleAvailability, TitleId},
};

use super::AuthenticatedUser;

/// Copy counters of a title
#[utoipa::path(
    get,
    path = "/titles/{id}/availability",
    tag = "titles",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Title ID")
    ),
    responses(
        (status = 200, description = "Availability of the title", body = TitleAvailability),
        (status = 404, description = "Title not found")
    )
)]
pub async fn availability(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(title_id): Path<TitleId>,
) -> AppResult<Json<TitleAvailability>> {
    let availability = state.services.catalog.title_availability(title_id).await?;
    Ok(Json(availability))
}

/// Reservation queue of a title
#[utoipa::path(
    get,
    path = "/titles/{id}/queue",
    tag = "titles",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Title ID")
    ),
    responses(
        (status = 200, description = "Pending reservations, head first", body = Vec<QueueEntry>),
        (status = 404, description = "Title not found")
    )
)]
pub async fn queue(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Path(title_id): Path<TitleId>,
) -> AppResult<Json<Vec<QueueEntry>>> {
    let queue = state.services.reservations.queue(title_id).await?;
    Ok(Json(queue))
}
