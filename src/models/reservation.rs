//! Reservation (hold) model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::{LoanId, ReservationId, TitleId, UserId};

/// Reservation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Waiting in the title's queue
    Pending,
    /// A copy is held for pickup
    Fulfilled,
    Cancelled,
    Expired,
    /// Picked up and turned into a loan
    Consumed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Consumed => "consumed",
        }
    }

    /// Pending or fulfilled
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Fulfilled)
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "fulfilled" => Ok(ReservationStatus::Fulfilled),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            "consumed" => Ok(ReservationStatus::Consumed),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

super::text_column_enum!(ReservationStatus);

/// Reservation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: ReservationId,
    pub title_id: TitleId,
    pub user_id: UserId,
    pub created_at: NaiveDate,
    pub expires_at: NaiveDate,
    pub status: ReservationStatus,
    /// Day the copy started being held for this reader
    pub fulfilled_at: Option<NaiveDate>,
    /// Loan created at pickup
    pub loan_id: Option<LoanId>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        today > self.expires_at
    }

    /// Queue ordering key
    pub fn queue_key(&self) -> (NaiveDate, ReservationId) {
        (self.created_at, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub title_id: TitleId,
    pub user_id: UserId,
    pub created_at: NaiveDate,
    pub expires_at: NaiveDate,
}

/// One entry of a title's pending queue
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueEntry {
    /// 1-based position
    pub position: usize,
    pub reservation: Reservation,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    #[serde(default)]
    pub active_only: bool,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        if self.active_only && !reservation.is_active() {
            return false;
        }
        self.status.map_or(true, |status| reservation.status == status)
    }
}
