//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppResult,
    models::{Loan, LoanFilter, LoanId, TitleId, UserId},
};

use super::{with_retries, AuthenticatedUser};

/// Borrow request
#[derive(Deserialize, ToSchema)]
pub struct BorrowRequest {
    /// Borrower; defaults to the authenticated user
    pub user_id: Option<UserId>,
    pub title_id: TitleId,
}

/// Declare-lost request
#[derive(Deserialize, ToSchema)]
pub struct LostRequest {
    pub reason: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DueSoonQuery {
    /// Window in days from today (default 3)
    pub within_days: Option<i32>,
}

/// Get loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID"),
        LoanFilter
    ),
    responses(
        (status = 200, description = "User's loans, newest first", body = Vec<Loan>),
        (status = 403, description = "Not the user and not staff")
    )
)]
pub async fn get_user_loans(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<UserId>,
    Query(filter): Query<LoanFilter>,
) -> AppResult<Json<Vec<Loan>>> {
    let loans = state
        .services
        .loans
        .loans_for_user(&user.actor(), user_id, &filter)
        .await?;
    Ok(Json(loans))
}

/// Borrow a copy of a title
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 404, description = "Title not found"),
        (status = 409, description = "No copy available, already borrowed or held for another reader"),
        (status = 422, description = "Loan limit reached")
    )
)]
pub async fn borrow(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let actor = user.actor();
    let user_id = request.user_id.unwrap_or(actor.user_id);

    let loan = with_retries(&state, || {
        state.services.loans.borrow(&actor, user_id, request.title_id)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed item
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Item returned", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned or declared lost")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
) -> AppResult<Json<Loan>> {
    let actor = user.actor();
    let loan = with_retries(&state, || state.services.loans.return_loan(&actor, loan_id)).await?;
    Ok(Json(loan))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan renewed", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan not renewable or blocked by a reservation"),
        (status = 422, description = "Renewal limit reached")
    )
)]
pub async fn renew_loan(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
) -> AppResult<Json<Loan>> {
    let actor = user.actor();
    let loan = with_retries(&state, || state.services.loans.renew(&actor, loan_id)).await?;
    Ok(Json(loan))
}

/// Declare the copy of a loan lost
#[utoipa::path(
    post,
    path = "/loans/{id}/lost",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Loan ID")
    ),
    request_body = LostRequest,
    responses(
        (status = 200, description = "Loan marked lost", body = Loan),
        (status = 403, description = "Staff only"),
        (status = 409, description = "Loan already closed")
    )
)]
pub async fn mark_lost(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<LoanId>,
    Json(request): Json<LostRequest>,
) -> AppResult<Json<Loan>> {
    let actor = user.actor();
    let loan = with_retries(&state, || {
        state.services.loans.mark_lost(&actor, loan_id, &request.reason)
    })
    .await?;
    Ok(Json(loan))
}

/// Borrowed loans coming due (reminder feed)
#[utoipa::path(
    get,
    path = "/loans/due-soon",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(DueSoonQuery),
    responses(
        (status = 200, description = "Loans due within the window, earliest first", body = Vec<Loan>),
        (status = 403, description = "Staff only")
    )
)]
pub async fn due_soon(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DueSoonQuery>,
) -> AppResult<Json<Vec<Loan>>> {
    user.actor().require_staff()?;
    let loans = state
        .services
        .loans
        .due_soon(query.within_days.unwrap_or(3))
        .await?;
    Ok(Json(loans))
}
