//! Sweep triggers for the external scheduler

use axum::{extract::State, Json};

use crate::{error::AppResult, services::SweepReport};

use super::AuthenticatedUser;

/// Flag overdue loans and refresh their late fees
#[utoipa::path(
    post,
    path = "/sweeps/overdue",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 403, description = "Staff only")
    )
)]
pub async fn overdue(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    user.actor().require_staff()?;
    let report = state.services.loans.mark_overdue().await?;
    Ok(Json(report))
}

/// Expire reservations past their date
#[utoipa::path(
    post,
    path = "/sweeps/reservations",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 403, description = "Staff only")
    )
)]
pub async fn reservations(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    user.actor().require_staff()?;
    let report = state.services.reservations.expire_holds().await?;
    Ok(Json(report))
}
