//! Loan management service

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    clock::{add_days, Clock},
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        Actor, LibrarySettings, Loan, LoanFilter, LoanId, LoanStatus, NewLoan, ReservationStatus,
        TitleId, UserId,
    },
    repository::{Repository, Transaction},
    services::{
        fees, reservations, settings,
        sweep::{run_sweep, SweepReport, SweepStep},
    },
};

/// Fail with `LimitReached` when the user is at the loan cap
pub(crate) async fn ensure_below_cap(
    tx: &mut dyn Transaction,
    user_id: UserId,
    settings: &LibrarySettings,
) -> AppResult<()> {
    let current = tx.count_active_loans(user_id).await?;
    if current >= i64::from(settings.max_loans_per_user) {
        return Err(AppError::LimitReached {
            current,
            max: settings.max_loans_per_user,
        });
    }
    Ok(())
}

/// Insert a borrowed loan starting today; copy accounting is the caller's
pub(crate) async fn open_loan(
    tx: &mut dyn Transaction,
    title_id: TitleId,
    user_id: UserId,
    settings: &LibrarySettings,
    today: NaiveDate,
) -> AppResult<Loan> {
    let loan = tx
        .insert_loan(&NewLoan {
            title_id,
            user_id,
            loan_date: today,
            due_date: add_days(today, settings.max_loan_days)?,
        })
        .await?;
    tracing::info!(
        loan_id = loan.id,
        title_id,
        user_id,
        due_date = %loan.due_date,
        "Loan issued"
    );
    Ok(loan)
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    lending: LendingConfig,
}

impl LoansService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, lending: LendingConfig) -> Self {
        Self {
            repository,
            clock,
            lending,
        }
    }

    /// Borrow a copy of a title.
    ///
    /// A reader holding a copy for pickup gets that copy. Otherwise a free
    /// copy is required, and readers queued ahead of the borrower are
    /// served first: only the queue head (or anyone, when nobody waits)
    /// may take it.
    pub async fn borrow(&self, actor: &Actor, user_id: UserId, title_id: TitleId) -> AppResult<Loan> {
        actor.require_self_or_staff(user_id)?;
        let today = self.clock.today();

        let mut tx = self.repository.begin().await?;
        let settings = settings::current(tx.as_mut()).await?;

        if let Some(held) = tx.active_reservation(user_id, title_id).await? {
            if held.status == ReservationStatus::Fulfilled {
                if !held.is_expired(today) {
                    let loan = reservations::convert_held(tx.as_mut(), held, &settings, today).await?;
                    tx.commit().await?;
                    return Ok(loan);
                }
                // lapsed hold not yet swept: expire it and borrow like anyone else
                reservations::expire_hold(tx.as_mut(), held, &settings, today).await?;
            }
        }

        let counts = tx.observe(title_id).await?;
        if counts.available <= 0 {
            return Err(AppError::NotAvailable);
        }
        if tx.active_loan(user_id, title_id).await?.is_some() {
            return Err(AppError::AlreadyBorrowed);
        }
        ensure_below_cap(tx.as_mut(), user_id, &settings).await?;

        let consumed = match tx.queue_head(title_id).await? {
            Some(head) if head.user_id == user_id => Some(head),
            Some(_) => return Err(AppError::HeldForOther),
            None => None,
        };

        if !tx.try_reserve_copy(title_id).await? {
            return Err(AppError::NotAvailable);
        }
        let loan = open_loan(tx.as_mut(), title_id, user_id, &settings, today).await?;

        if let Some(mut reservation) = consumed {
            reservation.status = ReservationStatus::Consumed;
            reservation.fulfilled_at = Some(today);
            reservation.loan_id = Some(loan.id);
            tx.update_reservation(&reservation).await?;
            tracing::debug!(
                reservation_id = reservation.id,
                loan_id = loan.id,
                "Queue head reservation consumed by borrow"
            );
        }

        tx.commit().await?;
        Ok(loan)
    }

    /// Return a borrowed item.
    ///
    /// The freed copy is passed to the next queued reader in the same
    /// transaction, so it is never observed as available in between.
    pub async fn return_loan(&self, actor: &Actor, loan_id: LoanId) -> AppResult<Loan> {
        let today = self.clock.today();
        let now = self.clock.now();

        let mut tx = self.repository.begin().await?;
        let mut loan = tx.loan(loan_id).await?;
        actor.require_self_or_staff(loan.user_id)?;
        match loan.status {
            LoanStatus::Borrowed | LoanStatus::Overdue => {}
            LoanStatus::Returned => return Err(AppError::AlreadyReturned),
            LoanStatus::Lost => {
                return Err(AppError::InvalidState(format!("Loan {} was declared lost", loan_id)))
            }
        }
        let settings = settings::current(tx.as_mut()).await?;

        loan.return_date = Some(today);
        loan.status = LoanStatus::Returned;
        tx.update_loan(&loan).await?;
        tx.release_copy(loan.title_id).await?;
        let fee = fees::finalize(tx.as_mut(), &loan, &settings, today, now).await?;
        let promoted = reservations::promote_next(tx.as_mut(), loan.title_id, &settings, today).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id,
            title_id = loan.title_id,
            user_id = loan.user_id,
            late_fee = ?fee.map(|fee| fee.amount),
            promoted_reservation = ?promoted.map(|r| r.id),
            "Loan returned"
        );
        Ok(loan)
    }

    /// Renew a loan
    pub async fn renew(&self, actor: &Actor, loan_id: LoanId) -> AppResult<Loan> {
        let today = self.clock.today();

        let mut tx = self.repository.begin().await?;
        let mut loan = tx.loan(loan_id).await?;
        actor.require_self_or_staff(loan.user_id)?;
        if loan.status != LoanStatus::Borrowed {
            return Err(AppError::InvalidState(format!(
                "Loan {} is {} and cannot be renewed",
                loan_id, loan.status
            )));
        }
        if today > loan.due_date {
            return Err(AppError::InvalidState(format!(
                "Loan {} is past its due date",
                loan_id
            )));
        }
        let settings = settings::current(tx.as_mut()).await?;
        if loan.renewals >= settings.max_renewals {
            return Err(AppError::RenewalCapReached(settings.max_renewals));
        }
        let queue = tx.pending_queue(loan.title_id).await?;
        if queue.iter().any(|r| r.user_id != loan.user_id) {
            return Err(AppError::RenewalBlocked);
        }

        loan.due_date = add_days(loan.due_date.max(today), settings.max_loan_days)?;
        loan.renewals += 1;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id,
            renewals = loan.renewals,
            due_date = %loan.due_date,
            "Loan renewed"
        );
        Ok(loan)
    }

    /// Declare the copy of a loan lost (staff only).
    ///
    /// The copy leaves the title's pool and the late fee is frozen at its
    /// amount as of today.
    pub async fn mark_lost(&self, actor: &Actor, loan_id: LoanId, reason: &str) -> AppResult<Loan> {
        actor.require_staff()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("Loss reason must not be empty".to_string()));
        }
        let today = self.clock.today();
        let now = self.clock.now();

        let mut tx = self.repository.begin().await?;
        let mut loan = tx.loan(loan_id).await?;
        if !loan.is_active() {
            return Err(AppError::InvalidState(format!(
                "Loan {} is {} and cannot be declared lost",
                loan_id, loan.status
            )));
        }
        let settings = settings::current(tx.as_mut()).await?;
        fees::touch(tx.as_mut(), &loan, &settings, today, now).await?;

        loan.status = LoanStatus::Lost;
        loan.return_date = Some(today);
        loan.lost_reason = Some(reason.to_string());
        tx.update_loan(&loan).await?;
        tx.retire_copy(loan.title_id).await?;
        tx.commit().await?;

        tracing::warn!(
            loan_id,
            title_id = loan.title_id,
            user_id = loan.user_id,
            reason,
            "Loan declared lost"
        );
        Ok(loan)
    }

    /// Flag loans past their due date and refresh their late fees
    pub async fn mark_overdue(&self) -> AppResult<SweepReport> {
        let step = MarkOverdue {
            today: self.clock.today(),
            now: self.clock.now(),
        };
        run_sweep(&self.repository, self.lending.sweep_batch_size, &step).await
    }

    /// Get loans for a user
    pub async fn loans_for_user(
        &self,
        actor: &Actor,
        user_id: UserId,
        filter: &LoanFilter,
    ) -> AppResult<Vec<Loan>> {
        actor.require_self_or_staff(user_id)?;
        let mut tx = self.repository.begin().await?;
        tx.loans_for_user(user_id, filter).await
    }

    /// Borrowed loans due within the next `within_days` days
    pub async fn due_soon(&self, within_days: i32) -> AppResult<Vec<Loan>> {
        if within_days < 0 {
            return Err(AppError::Validation("within_days must not be negative".to_string()));
        }
        let today = self.clock.today();
        let until = add_days(today, within_days)?;
        let mut tx = self.repository.begin().await?;
        tx.loans_due_between(today, until).await
    }
}

struct MarkOverdue {
    today: NaiveDate,
    now: DateTime<Utc>,
}

#[async_trait]
impl SweepStep for MarkOverdue {
    fn name(&self) -> &'static str {
        "mark_overdue"
    }

    async fn candidates(
        &self,
        tx: &mut dyn Transaction,
        after: i64,
        limit: i64,
    ) -> AppResult<Vec<i64>> {
        let loans = tx.loans_past_due(self.today, after, limit).await?;
        Ok(loans.into_iter().map(|loan| loan.id).collect())
    }

    async fn apply(
        &self,
        tx: &mut dyn Transaction,
        id: i64,
        report: &mut SweepReport,
    ) -> AppResult<()> {
        let mut loan = tx.loan(id).await?;
        if !loan.is_active() || self.today <= loan.due_date {
            return Ok(());
        }

        if loan.status == LoanStatus::Borrowed {
            loan.status = LoanStatus::Overdue;
            tx.update_loan(&loan).await?;
            report.transitioned += 1;
            tracing::info!(
                loan_id = id,
                user_id = loan.user_id,
                due_date = %loan.due_date,
                "Loan overdue"
            );
        }

        let settings = settings::current(tx).await?;
        if fees::touch(tx, &loan, &settings, self.today, self.now)
            .await?
            .is_some()
        {
            report.fees_touched += 1;
        }
        Ok(())
    }
}
