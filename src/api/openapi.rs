//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{fees, health, loans, reservations, settings, stats, sweeps, titles};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation API",
        version = "1.0.0",
        description = "Library lending engine: loans, reservations and late fees",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::borrow,
        loans::return_loan,
        loans::renew_loan,
        loans::mark_lost,
        loans::due_soon,
        loans::get_user_loans,
        // Reservations
        reservations::reserve,
        reservations::cancel,
        reservations::checkout,
        reservations::get_user_reservations,
        // Titles
        titles::availability,
        titles::queue,
        // Fees
        fees::ledger,
        fees::get_user_fees,
        fees::pay,
        fees::waive,
        fees::request_waiver,
        fees::reject_waiver,
        // Sweeps
        sweeps::overdue,
        sweeps::reservations,
        // Stats
        stats::get_stats,
        // Settings
        settings::get_settings,
        settings::update_settings,
    ),
    components(
        schemas(
            // Loans
            loans::BorrowRequest,
            loans::LostRequest,
            crate::models::Loan,
            crate::models::LoanStatus,
            crate::models::LoanFilter,
            // Reservations
            reservations::ReserveRequest,
            crate::models::Reservation,
            crate::models::ReservationStatus,
            crate::models::ReservationFilter,
            crate::models::QueueEntry,
            // Titles
            crate::models::TitleAvailability,
            // Fees
            fees::ReasonRequest,
            fees::RejectWaiverRequest,
            crate::models::LateFee,
            crate::models::FeeStatus,
            crate::models::FeeFilter,
            crate::models::FeeLedger,
            // Sweeps
            crate::services::SweepReport,
            // Stats
            crate::services::stats::CirculationStats,
            // Settings
            crate::models::LibrarySettings,
            crate::models::UpdateSettings,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Loan management"),
        (name = "reservations", description = "Reservation queue"),
        (name = "titles", description = "Title availability"),
        (name = "fees", description = "Late fee ledger"),
        (name = "sweeps", description = "Scheduled time-driven transitions"),
        (name = "stats", description = "Statistics"),
        (name = "settings", description = "Lending policy")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
