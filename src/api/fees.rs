//! Late fee endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{FeeFilter, FeeLedger, FeeStatus, LateFee, LoanId, UserId},
};

use super::{with_retries, AuthenticatedUser};

/// Reason attached to a waiver or a waiver request
#[derive(Deserialize, ToSchema)]
pub struct ReasonRequest {
    pub reason: String,
}

/// Reviewer's note when turning down a waiver request
#[derive(Deserialize, ToSchema)]
pub struct RejectWaiverRequest {
    pub note: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFeesQuery {
    pub status: Option<FeeStatus>,
}

/// Fee ledger with totals
#[utoipa::path(
    get,
    path = "/fees",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(FeeFilter),
    responses(
        (status = 200, description = "Fees and totals per status", body = FeeLedger),
        (status = 403, description = "Staff only")
    )
)]
pub async fn ledger(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Query(filter): Query<FeeFilter>,
) -> AppResult<Json<FeeLedger>> {
    user.actor().require_staff()?;
    let ledger = state.services.fees.ledger(&filter).await?;
    Ok(Json(ledger))
}

/// Get late fees for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/fees",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID"),
        UserFeesQuery
    ),
    responses(
        (status = 200, description = "User's late fees, newest first", body = Vec<LateFee>),
        (status = 403, description = "Not the user and not staff")
    )
)]
pub async fn get_user_fees(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<UserId>,
    Query(query): Query<UserFeesQuery>,
) -> AppResult<Json<Vec<LateFee>>> {
    let fees = state
        .services
        .fees
        .fees_for_user(&user.actor(), user_id, query.status)
        .await?;
    Ok(Json(fees))
}

/// Pay a late fee
#[utoipa::path(
    post,
    path = "/fees/{loan_id}/pay",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(
        ("loan_id" = i64, Path, description = "Loan the fee belongs to")
    ),
    responses(
        (status = 200, description = "Fee paid", body = LateFee),
        (status = 404, description = "No fee for this loan"),
        (status = 409, description = "Fee already settled")
    )
)]
pub async fn pay(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
) -> AppResult<Json<LateFee>> {
    let actor = user.actor();
    let fee = with_retries(&state, || state.services.fees.pay(&actor, loan_id)).await?;
    Ok(Json(fee))
}

/// Waive a late fee
#[utoipa::path(
    post,
    path = "/fees/{loan_id}/waive",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(
        ("loan_id" = i64, Path, description = "Loan the fee belongs to")
    ),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Fee waived", body = LateFee),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Fee already settled")
    )
)]
pub async fn waive(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
    Json(request): Json<ReasonRequest>,
) -> AppResult<Json<LateFee>> {
    let actor = user.actor();
    let fee = with_retries(&state, || {
        state.services.fees.waive(&actor, loan_id, &request.reason)
    })
    .await?;
    Ok(Json(fee))
}

/// Ask for a late fee to be waived
#[utoipa::path(
    post,
    path = "/fees/{loan_id}/waiver-request",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(
        ("loan_id" = i64, Path, description = "Loan the fee belongs to")
    ),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Waiver request recorded", body = LateFee),
        (status = 403, description = "Only the borrower may ask"),
        (status = 409, description = "Fee already settled")
    )
)]
pub async fn request_waiver(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
    Json(request): Json<ReasonRequest>,
) -> AppResult<Json<LateFee>> {
    let actor = user.actor();
    let fee = with_retries(&state, || {
        state
            .services
            .fees
            .request_waiver(&actor, loan_id, &request.reason)
    })
    .await?;
    Ok(Json(fee))
}

/// Turn down a waiver request
#[utoipa::path(
    post,
    path = "/fees/{loan_id}/waiver-request/reject",
    tag = "fees",
    security(("bearer_auth" = [])),
    params(
        ("loan_id" = i64, Path, description = "Loan the fee belongs to")
    ),
    request_body = RejectWaiverRequest,
    responses(
        (status = 200, description = "Waiver request rejected", body = LateFee),
        (status = 403, description = "Staff only"),
        (status = 409, description = "No request pending or fee settled")
    )
)]
pub async fn reject_waiver(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
    Json(request): Json<RejectWaiverRequest>,
) -> AppResult<Json<LateFee>> {
    let actor = user.actor();
    let fee = with_retries(&state, || {
        state
            .services
            .fees
            .reject_waiver(&actor, loan_id, &request.note)
    })
    .await?;
    Ok(Json(fee))
}
