//! Loan model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::{LoanId, TitleId, UserId};

/// Loan lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Overdue,
    Returned,
    Lost,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
            LoanStatus::Lost => "lost",
        }
    }

    /// Borrowed or overdue: the copy is out with the reader
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Borrowed | LoanStatus::Overdue)
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "overdue" => Ok(LoanStatus::Overdue),
            "returned" => Ok(LoanStatus::Returned),
            "lost" => Ok(LoanStatus::Lost),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

super::text_column_enum!(LoanStatus);

/// Loan record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: LoanId,
    pub title_id: TitleId,
    pub user_id: UserId,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: LoanStatus,
    pub renewals: i32,
    pub late_fee_settled: bool,
    /// Reason recorded when the copy was declared lost
    pub lost_reason: Option<String>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whole days past due, counted up to the return date or `today`,
    /// whichever comes first.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        let end = match self.return_date {
            Some(returned) if returned < today => returned,
            _ => today,
        };
        (end - self.due_date).num_days().max(0)
    }
}

/// Values for a loan about to be inserted
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub title_id: TitleId,
    pub user_id: UserId,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Filter for loan listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LoanFilter {
    /// Restrict to a single status
    pub status: Option<LoanStatus>,
    /// Only borrowed or overdue loans
    #[serde(default)]
    pub active_only: bool,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        if self.active_only && !loan.is_active() {
            return false;
        }
        self.status.map_or(true, |status| loan.status == status)
    }
}
