//! Statistics service

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{FeeFilter, FeeStatus, LoanStatus, ReservationStatus},
    repository::Repository,
};

/// Circulation counters
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CirculationStats {
    pub borrowed_loans: i64,
    pub overdue_loans: i64,
    pub returned_loans: i64,
    pub lost_loans: i64,
    pub pending_reservations: i64,
    pub held_reservations: i64,
    /// Sum of pending late fees
    #[schema(value_type = String)]
    pub outstanding_fees: Decimal,
}

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn circulation(&self) -> AppResult<CirculationStats> {
        let mut tx = self.repository.begin().await?;
        let outstanding_fees: Decimal = tx
            .fees(&FeeFilter {
                status: Some(FeeStatus::Pending),
                user_id: None,
            })
            .await?
            .iter()
            .map(|fee| fee.amount)
            .sum();

        Ok(CirculationStats {
            borrowed_loans: tx.count_loans(LoanStatus::Borrowed).await?,
            overdue_loans: tx.count_loans(LoanStatus::Overdue).await?,
            returned_loans: tx.count_loans(LoanStatus::Returned).await?,
            lost_loans: tx.count_loans(LoanStatus::Lost).await?,
            pending_reservations: tx.count_reservations(ReservationStatus::Pending).await?,
            held_reservations: tx.count_reservations(ReservationStatus::Fulfilled).await?,
            outstanding_fees,
        })
    }
}
