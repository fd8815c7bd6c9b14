//! Statistics endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, services::stats::CirculationStats};

use super::AuthenticatedUser;

/// Get circulation statistics
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Circulation counters", body = CirculationStats),
        (status = 403, description = "Staff only")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<CirculationStats>> {
    user.actor().require_staff()?;
    let stats = state.services.stats.circulation().await?;
    Ok(Json(stats))
}
