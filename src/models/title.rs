//! Title copy counters as seen by the lending engine

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::TitleId;

/// Catalogued title; the lending engine only touches its counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Title {
    pub id: TitleId,
    pub name: String,
    pub total_copies: i32,
    pub available_copies: i32,
}

/// Snapshot of a title's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CopyCounts {
    pub total: i32,
    pub available: i32,
}

/// Availability view of a title
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TitleAvailability {
    pub title_id: TitleId,
    pub total_copies: i32,
    pub available_copies: i32,
    /// Copies held for a reader awaiting pickup
    pub held_copies: i64,
    /// Readers waiting in the reservation queue
    pub queue_length: i64,
}
