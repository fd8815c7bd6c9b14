//! Reservation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{Loan, Reservation, ReservationFilter, ReservationId, TitleId, UserId},
};

use super::{with_retries, AuthenticatedUser};

/// Reserve request
#[derive(Deserialize, ToSchema)]
pub struct ReserveRequest {
    /// Reader joining the queue; defaults to the authenticated user
    pub user_id: Option<UserId>,
    pub title_id: TitleId,
}

/// Join the reservation queue of a title with no free copy
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation created", body = Reservation),
        (status = 404, description = "Title not found"),
        (status = 409, description = "A copy is available, or already reserved or borrowed")
    )
)]
pub async fn reserve(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<ReserveRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    let actor = user.actor();
    let user_id = request.user_id.unwrap_or(actor.user_id);

    let reservation = with_retries(&state, || {
        state
            .services
            .reservations
            .reserve(&actor, user_id, request.title_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Cancel a reservation
#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation already closed")
    )
)]
pub async fn cancel(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(reservation_id): Path<ReservationId>,
) -> AppResult<Json<Reservation>> {
    let actor = user.actor();
    let reservation = with_retries(&state, || {
        state.services.reservations.cancel(&actor, reservation_id)
    })
    .await?;
    Ok(Json(reservation))
}

/// Pick up the copy held for a reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/checkout",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Reservation ID")
    ),
    responses(
        (status = 201, description = "Loan created from the held copy", body = Loan),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation not held or hold expired"),
        (status = 422, description = "Loan limit reached")
    )
)]
pub async fn checkout(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(reservation_id): Path<ReservationId>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let actor = user.actor();
    let loan = with_retries(&state, || {
        state
            .services
            .reservations
            .convert_to_loan(&actor, reservation_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Get reservations for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID"),
        ReservationFilter
    ),
    responses(
        (status = 200, description = "User's reservations, newest first", body = Vec<Reservation>),
        (status = 403, description = "Not the user and not staff")
    )
)]
pub async fn get_user_reservations(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<UserId>,
    Query(filter): Query<ReservationFilter>,
) -> AppResult<Json<Vec<Reservation>>> {
    let reservations = state
        .services
        .reservations
        .reservations_for_user(&user.actor(), user_id, &filter)
        .await?;
    Ok(Json(reservations))
}
