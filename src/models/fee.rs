//! Late fee model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::{LoanId, TitleId, UserId};

/// Payment state of a late fee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Pending,
    Paid,
    Waived,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Pending => "pending",
            FeeStatus::Paid => "paid",
            FeeStatus::Waived => "waived",
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, FeeStatus::Pending)
    }
}

impl std::str::FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FeeStatus::Pending),
            "paid" => Ok(FeeStatus::Paid),
            "waived" => Ok(FeeStatus::Waived),
            _ => Err(format!("Invalid fee status: {}", s)),
        }
    }
}

super::text_column_enum!(FeeStatus);

/// Late fee owed on an overdue loan, keyed by its loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LateFee {
    pub loan_id: LoanId,
    /// Borrower of the loan (denormalized for ledger views)
    pub user_id: UserId,
    pub title_id: TitleId,
    #[schema(value_type = String, example = "4.00")]
    pub amount: Decimal,
    pub days_overdue: i32,
    pub status: FeeStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub waived_by: Option<UserId>,
    pub waived_reason: String,
    /// Borrower's waiver request awaiting review
    pub waiver_request: Option<String>,
    /// Reviewer's note when a waiver request was turned down
    pub waiver_rejection: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct FeeFilter {
    pub status: Option<FeeStatus>,
    pub user_id: Option<UserId>,
}

impl FeeFilter {
    pub fn matches(&self, fee: &LateFee) -> bool {
        self.status.map_or(true, |status| fee.status == status)
            && self.user_id.map_or(true, |user_id| fee.user_id == user_id)
    }
}

/// Ledger view: fees plus totals per payment state
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeeLedger {
    pub fees: Vec<LateFee>,
    #[schema(value_type = String)]
    pub total_pending: Decimal,
    #[schema(value_type = String)]
    pub total_paid: Decimal,
    #[schema(value_type = String)]
    pub total_waived: Decimal,
}

impl FeeLedger {
    pub fn from_fees(fees: Vec<LateFee>) -> Self {
        let total = |status: FeeStatus| -> Decimal {
            fees.iter()
                .filter(|fee| fee.status == status)
                .map(|fee| fee.amount)
                .sum()
        };
        Self {
            total_pending: total(FeeStatus::Pending),
            total_paid: total(FeeStatus::Paid),
            total_waived: total(FeeStatus::Waived),
            fees,
        }
    }
}
