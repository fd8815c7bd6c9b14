//! API handlers for the circulation REST endpoints

pub mod fees;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod reservations;
pub mod settings;
pub mod stats;
pub mod sweeps;
pub mod titles;

use std::future::Future;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::{AppError, AppResult},
    models::{Actor, UserClaims},
    services::retry_conflicts,
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor {
        self.0.actor()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Get the Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        // Validate JWT token using the secret from configuration
        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Run a store command, retrying it on serialization conflicts
pub(crate) async fn with_retries<T, F, Fut>(state: &AppState, op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    retry_conflicts(state.config.lending.conflict_retries.max(1), op).await
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Loans
        .route("/loans", post(loans::borrow))
        .route("/loans/due-soon", get(loans::due_soon))
        .route("/loans/:id/return", post(loans::return_loan))
        .route("/loans/:id/renew", post(loans::renew_loan))
        .route("/loans/:id/lost", post(loans::mark_lost))
        .route("/users/:id/loans", get(loans::get_user_loans))
        // Reservations
        .route("/reservations", post(reservations::reserve))
        .route("/reservations/:id", delete(reservations::cancel))
        .route("/reservations/:id/checkout", post(reservations::checkout))
        .route("/users/:id/reservations", get(reservations::get_user_reservations))
        // Titles
        .route("/titles/:id/availability", get(titles::availability))
        .route("/titles/:id/queue", get(titles::queue))
        // Fees
        .route("/fees", get(fees::ledger))
        .route("/fees/:loan_id/pay", post(fees::pay))
        .route("/fees/:loan_id/waive", post(fees::waive))
        .route("/fees/:loan_id/waiver-request", post(fees::request_waiver))
        .route("/fees/:loan_id/waiver-request/reject", post(fees::reject_waiver))
        .route("/users/:id/fees", get(fees::get_user_fees))
        // Sweeps
        .route("/sweeps/overdue", post(sweeps::overdue))
        .route("/sweeps/reservations", post(sweeps::reservations))
        // Statistics
        .route("/stats", get(stats::get_stats))
        // Settings
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
