//! Late fee ledger
//!
//! A fee is keyed by its loan. While pending, its amount follows the loan:
//! `days_overdue × daily_rate`, with days counted up to the return date or
//! today. Once paid or waived it is frozen.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        Actor, FeeFilter, FeeLedger, FeeStatus, LateFee, LibrarySettings, Loan, LoanId,
        LoanStatus, UserId,
    },
    repository::{Repository, Transaction},
    services::settings,
};

/// Bring the loan's fee in line with its overdue days.
///
/// Creates a pending fee once the loan has at least one overdue day and
/// refreshes a pending one in place. Settled fees and fees of lost loans
/// are returned untouched.
pub(crate) async fn touch(
    tx: &mut dyn Transaction,
    loan: &Loan,
    settings: &LibrarySettings,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<Option<LateFee>> {
    let existing = tx.fee(loan.id).await?;
    if loan.status == LoanStatus::Lost {
        return Ok(existing);
    }
    if let Some(fee) = &existing {
        if fee.status.is_settled() {
            return Ok(existing);
        }
    }

    let days = loan.days_overdue(today);
    let days_overdue = i32::try_from(days)
        .map_err(|_| AppError::Internal(format!("Loan {} overdue for {} days", loan.id, days)))?;
    let amount = Decimal::from(days) * settings.daily_rate;

    match existing {
        Some(mut fee) => {
            if fee.days_overdue != days_overdue || fee.amount != amount {
                fee.days_overdue = days_overdue;
                fee.amount = amount;
                fee.updated_at = now;
                tx.update_fee(&fee).await?;
                tracing::debug!(loan_id = loan.id, days_overdue, %amount, "Late fee refreshed");
            }
            Ok(Some(fee))
        }
        None if days_overdue > 0 => {
            let fee = LateFee {
                loan_id: loan.id,
                user_id: loan.user_id,
                title_id: loan.title_id,
                amount,
                days_overdue,
                status: FeeStatus::Pending,
                paid_at: None,
                waived_by: None,
                waived_reason: String::new(),
                waiver_request: None,
                waiver_rejection: None,
                created_at: now,
                updated_at: now,
            };
            tx.insert_fee(&fee).await?;
            tracing::info!(loan_id = loan.id, user_id = loan.user_id, days_overdue, %amount, "Late fee created");
            Ok(Some(fee))
        }
        None => Ok(None),
    }
}

/// Final touch at return; a pending fee left with no overdue day is dropped
pub(crate) async fn finalize(
    tx: &mut dyn Transaction,
    loan: &Loan,
    settings: &LibrarySettings,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<Option<LateFee>> {
    match touch(tx, loan, settings, today, now).await? {
        Some(fee) if fee.status == FeeStatus::Pending && fee.days_overdue == 0 => {
            tx.delete_fee(loan.id).await?;
            tracing::debug!(loan_id = loan.id, "Stale late fee removed");
            Ok(None)
        }
        fee => Ok(fee),
    }
}

fn require_reason(reason: &str, what: &str) -> AppResult<String> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", what)));
    }
    Ok(reason.to_string())
}

fn fee_not_found(loan_id: LoanId) -> AppError {
    AppError::NotFound(format!("No late fee for loan {}", loan_id))
}

#[derive(Clone)]
pub struct FeesService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl FeesService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Settle a pending fee by payment
    pub async fn pay(&self, actor: &Actor, loan_id: LoanId) -> AppResult<LateFee> {
        let today = self.clock.today();
        let now = self.clock.now();
        let mut tx = self.repository.begin().await?;
        let mut loan = tx.loan(loan_id).await?;
        actor.require_self_or_staff(loan.user_id)?;
        let settings = settings::current(tx.as_mut()).await?;

        let mut fee = touch(tx.as_mut(), &loan, &settings, today, now)
            .await?
            .ok_or_else(|| fee_not_found(loan_id))?;
        if fee.status.is_settled() {
            return Err(AppError::FeeAlreadySettled);
        }

        fee.status = FeeStatus::Paid;
        fee.paid_at = Some(now);
        fee.updated_at = now;
        tx.update_fee(&fee).await?;
        loan.late_fee_settled = true;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(loan_id, user_id = loan.user_id, amount = %fee.amount, "Late fee paid");
        Ok(fee)
    }

    /// Settle a pending fee by waiver (staff only)
    pub async fn waive(&self, actor: &Actor, loan_id: LoanId, reason: &str) -> AppResult<LateFee> {
        actor.require_staff()?;
        let reason = require_reason(reason, "Waiver reason")?;
        let today = self.clock.today();
        let now = self.clock.now();

        let mut tx = self.repository.begin().await?;
        let mut loan = tx.loan(loan_id).await?;
        let settings = settings::current(tx.as_mut()).await?;
        let mut fee = touch(tx.as_mut(), &loan, &settings, today, now)
            .await?
            .ok_or_else(|| fee_not_found(loan_id))?;
        if fee.status.is_settled() {
            return Err(AppError::FeeAlreadySettled);
        }

        fee.status = FeeStatus::Waived;
        fee.waived_by = Some(actor.user_id);
        fee.waived_reason = reason;
        fee.updated_at = now;
        tx.update_fee(&fee).await?;
        loan.late_fee_settled = true;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(loan_id, waived_by = actor.user_id, amount = %fee.amount, "Late fee waived");
        Ok(fee)
    }

    /// Borrower asks for a waiver; the fee stays pending until reviewed
    pub async fn request_waiver(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        reason: &str,
    ) -> AppResult<LateFee> {
        let reason = require_reason(reason, "Waiver request reason")?;
        let now = self.clock.now();

        let mut tx = self.repository.begin().await?;
        let loan = tx.loan(loan_id).await?;
        if actor.user_id != loan.user_id {
            return Err(AppError::NotAuthorized(
                "Only the borrower may request a waiver".to_string(),
            ));
        }
        let mut fee = tx.fee(loan_id).await?.ok_or_else(|| fee_not_found(loan_id))?;
        if fee.status.is_settled() {
            return Err(AppError::FeeAlreadySettled);
        }

        fee.waiver_request = Some(reason);
        fee.waiver_rejection = None;
        fee.updated_at = now;
        tx.update_fee(&fee).await?;
        tx.commit().await?;

        tracing::info!(loan_id, user_id = actor.user_id, "Late fee waiver requested");
        Ok(fee)
    }

    /// Turn down a pending waiver request (staff only)
    pub async fn reject_waiver(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        note: &str,
    ) -> AppResult<LateFee> {
        actor.require_staff()?;
        let note = require_reason(note, "Rejection note")?;
        let now = self.clock.now();

        let mut tx = self.repository.begin().await?;
        let mut fee = tx.fee(loan_id).await?.ok_or_else(|| fee_not_found(loan_id))?;
        if fee.status.is_settled() {
            return Err(AppError::FeeAlreadySettled);
        }
        if fee.waiver_request.is_none() {
            return Err(AppError::InvalidState(format!(
                "No waiver request pending for loan {}",
                loan_id
            )));
        }

        fee.waiver_request = None;
        fee.waiver_rejection = Some(note);
        fee.updated_at = now;
        tx.update_fee(&fee).await?;
        tx.commit().await?;

        tracing::info!(loan_id, reviewed_by = actor.user_id, "Late fee waiver rejected");
        Ok(fee)
    }

    /// Fees of one user, newest first
    pub async fn fees_for_user(
        &self,
        actor: &Actor,
        user_id: UserId,
        status: Option<FeeStatus>,
    ) -> AppResult<Vec<LateFee>> {
        actor.require_self_or_staff(user_id)?;
        let mut tx = self.repository.begin().await?;
        tx.fees(&FeeFilter {
            status,
            user_id: Some(user_id),
        })
        .await
    }

    /// Ledger view with totals per payment state
    pub async fn ledger(&self, filter: &FeeFilter) -> AppResult<FeeLedger> {
        let mut tx = self.repository.begin().await?;
        let fees = tx.fees(filter).await?;
        Ok(FeeLedger::from_fees(fees))
    }
}
