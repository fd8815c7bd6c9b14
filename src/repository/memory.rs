//! In-process store
//!
//! A transaction takes the store's lock, works on a private copy of the
//! state and swaps it in on commit. Holding the lock for the whole
//! transaction makes every transaction serializable.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    FeeStore, LoanStore, ReservationStore, SettingsStore, Store, TitleStore, Transaction,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        CopyCounts, FeeFilter, LateFee, LibrarySettings, Loan, LoanFilter, LoanId, LoanStatus,
        NewLoan, NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
        Title, TitleId, UserId,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    titles: BTreeMap<TitleId, Title>,
    loans: BTreeMap<LoanId, Loan>,
    reservations: BTreeMap<ReservationId, Reservation>,
    fees: BTreeMap<LoanId, LateFee>,
    settings: Option<LibrarySettings>,
    last_title_id: TitleId,
    last_loan_id: LoanId,
    last_reservation_id: ReservationId,
}

/// Full copy of the store contents, for inspection
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
    pub titles: Vec<Title>,
    pub loans: Vec<Loan>,
    pub reservations: Vec<Reservation>,
    pub fees: Vec<LateFee>,
    pub settings: Option<LibrarySettings>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a title with `copies` copies, all available
    pub async fn add_title(&self, name: &str, copies: i32) -> TitleId {
        let mut state = self.state.lock().await;
        state.last_title_id += 1;
        let id = state.last_title_id;
        state.titles.insert(
            id,
            Title {
                id,
                name: name.to_string(),
                total_copies: copies,
                available_copies: copies,
            },
        );
        id
    }

    /// Add copies to a title, as the catalog does on acquisition
    pub async fn add_copies(&self, id: TitleId, copies: i32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let title = state
            .titles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Title with id {} not found", id)))?;
        title.total_copies += copies;
        title.available_copies += copies;
        Ok(())
    }

    pub async fn snapshot(&self) -> MemorySnapshot {
        let state = self.state.lock().await;
        MemorySnapshot {
            titles: state.titles.values().cloned().collect(),
            loans: state.loans.values().cloned().collect(),
            reservations: state.reservations.values().cloned().collect(),
            fees: state.fees.values().cloned().collect(),
            settings: state.settings.clone(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            work,
        }))
    }
}

pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    work: MemoryState,
}

impl MemoryTransaction {
    fn title_mut(&mut self, id: TitleId) -> AppResult<&mut Title> {
        self.work
            .titles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Title with id {} not found", id)))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&mut self) -> AppResult<()> {
        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| AppError::Internal("Transaction already committed".to_string()))?;
        *guard = std::mem::take(&mut self.work);
        Ok(())
    }
}

#[async_trait]
impl TitleStore for MemoryTransaction {
    async fn title(&mut self, id: TitleId) -> AppResult<Title> {
        self.title_mut(id).map(|title| title.clone())
    }

    async fn try_reserve_copy(&mut self, id: TitleId) -> AppResult<bool> {
        let title = self.title_mut(id)?;
        if title.available_copies > 0 {
            title.available_copies -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_copy(&mut self, id: TitleId) -> AppResult<()> {
        let title = self.title_mut(id)?;
        if title.available_copies >= title.total_copies {
            return Err(AppError::Internal(format!(
                "Releasing a copy of title {} would exceed its total copies",
                id
            )));
        }
        title.available_copies += 1;
        Ok(())
    }

    async fn retire_copy(&mut self, id: TitleId) -> AppResult<()> {
        let title = self.title_mut(id)?;
        if title.total_copies <= title.available_copies {
            return Err(AppError::Internal(format!(
                "Title {} has no copy out on loan to retire",
                id
            )));
        }
        title.total_copies -= 1;
        Ok(())
    }

    async fn observe(&mut self, id: TitleId) -> AppResult<CopyCounts> {
        let title = self.title_mut(id)?;
        Ok(CopyCounts {
            total: title.total_copies,
            available: title.available_copies,
        })
    }
}

#[async_trait]
impl LoanStore for MemoryTransaction {
    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        self.title_mut(loan.title_id)?;
        if loan.due_date <= loan.loan_date {
            return Err(AppError::Internal("Loan due date must follow its loan date".to_string()));
        }
        let duplicate = self.work.loans.values().any(|existing| {
            existing.is_active()
                && existing.user_id == loan.user_id
                && existing.title_id == loan.title_id
        });
        if duplicate {
            return Err(AppError::AlreadyBorrowed);
        }

        self.work.last_loan_id += 1;
        let created = Loan {
            id: self.work.last_loan_id,
            title_id: loan.title_id,
            user_id: loan.user_id,
            loan_date: loan.loan_date,
            due_date: loan.due_date,
            return_date: None,
            status: LoanStatus::Borrowed,
            renewals: 0,
            late_fee_settled: false,
            lost_reason: None,
        };
        self.work.loans.insert(created.id, created.clone());
        Ok(created)
    }

    async fn loan(&mut self, id: LoanId) -> AppResult<Loan> {
        self.work
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        match self.work.loans.get_mut(&loan.id) {
            Some(stored) => {
                *stored = loan.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Loan with id {} not found", loan.id))),
        }
    }

    async fn active_loan(&mut self, user_id: UserId, title_id: TitleId) -> AppResult<Option<Loan>> {
        Ok(self
            .work
            .loans
            .values()
            .find(|loan| loan.is_active() && loan.user_id == user_id && loan.title_id == title_id)
            .cloned())
    }

    async fn count_active_loans(&mut self, user_id: UserId) -> AppResult<i64> {
        Ok(self
            .work
            .loans
            .values()
            .filter(|loan| loan.is_active() && loan.user_id == user_id)
            .count() as i64)
    }

    async fn loans_for_user(&mut self, user_id: UserId, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .work
            .loans
            .values()
            .filter(|loan| loan.user_id == user_id && filter.matches(loan))
            .cloned()
            .collect();
        loans.sort_by(|a, b| (b.loan_date, b.id).cmp(&(a.loan_date, a.id)));
        Ok(loans)
    }

    async fn loans_past_due(
        &mut self,
        today: NaiveDate,
        after: LoanId,
        limit: i64,
    ) -> AppResult<Vec<Loan>> {
        Ok(self
            .work
            .loans
            .range(after + 1..)
            .map(|(_, loan)| loan)
            .filter(|loan| loan.is_active() && loan.due_date < today)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn loans_due_between(&mut self, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .work
            .loans
            .values()
            .filter(|loan| {
                loan.status == LoanStatus::Borrowed && loan.due_date >= from && loan.due_date <= to
            })
            .cloned()
            .collect();
        loans.sort_by_key(|loan| (loan.due_date, loan.id));
        Ok(loans)
    }

    async fn count_loans(&mut self, status: LoanStatus) -> AppResult<i64> {
        Ok(self
            .work
            .loans
            .values()
            .filter(|loan| loan.status == status)
            .count() as i64)
    }
}

#[async_trait]
impl ReservationStore for MemoryTransaction {
    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        self.title_mut(reservation.title_id)?;
        let duplicate = self.work.reservations.values().any(|existing| {
            existing.is_active()
                && existing.user_id == reservation.user_id
                && existing.title_id == reservation.title_id
        });
        if duplicate {
            return Err(AppError::AlreadyReserved);
        }

        self.work.last_reservation_id += 1;
        let created = Reservation {
            id: self.work.last_reservation_id,
            title_id: reservation.title_id,
            user_id: reservation.user_id,
            created_at: reservation.created_at,
            expires_at: reservation.expires_at,
            status: ReservationStatus::Pending,
            fulfilled_at: None,
            loan_id: None,
        };
        self.work.reservations.insert(created.id, created.clone());
        Ok(created)
    }

    async fn reservation(&mut self, id: ReservationId) -> AppResult<Reservation> {
        self.work
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        match self.work.reservations.get_mut(&reservation.id) {
            Some(stored) => {
                *stored = reservation.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Reservation with id {} not found",
                reservation.id
            ))),
        }
    }

    async fn active_reservation(
        &mut self,
        user_id: UserId,
        title_id: TitleId,
    ) -> AppResult<Option<Reservation>> {
        Ok(self
            .work
            .reservations
            .values()
            .find(|r| r.is_active() && r.user_id == user_id && r.title_id == title_id)
            .cloned())
    }

    async fn pending_queue(&mut self, title_id: TitleId) -> AppResult<Vec<Reservation>> {
        let mut queue: Vec<Reservation> = self
            .work
            .reservations
            .values()
            .filter(|r| r.title_id == title_id && r.status == ReservationStatus::Pending)
            .cloned()
            .collect();
        queue.sort_by_key(Reservation::queue_key);
        Ok(queue)
    }

    async fn queue_head(&mut self, title_id: TitleId) -> AppResult<Option<Reservation>> {
        Ok(self
            .work
            .reservations
            .values()
            .filter(|r| r.title_id == title_id && r.status == ReservationStatus::Pending)
            .min_by_key(|r| r.queue_key())
            .cloned())
    }

    async fn count_held(&mut self, title_id: TitleId) -> AppResult<i64> {
        Ok(self
            .work
            .reservations
            .values()
            .filter(|r| r.title_id == title_id && r.status == ReservationStatus::Fulfilled)
            .count() as i64)
    }

    async fn reservations_for_user(
        &mut self,
        user_id: UserId,
        filter: &ReservationFilter,
    ) -> AppResult<Vec<Reservation>> {
        let mut reservations: Vec<Reservation> = self
            .work
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && filter.matches(r))
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.queue_key().cmp(&a.queue_key()));
        Ok(reservations)
    }

    async fn reservations_past_expiry(
        &mut self,
        status: ReservationStatus,
        today: NaiveDate,
        after: ReservationId,
        limit: i64,
    ) -> AppResult<Vec<Reservation>> {
        Ok(self
            .work
            .reservations
            .range(after + 1..)
            .map(|(_, r)| r)
            .filter(|r| r.status == status && r.expires_at < today)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_reservations(&mut self, status: ReservationStatus) -> AppResult<i64> {
        Ok(self
            .work
            .reservations
            .values()
            .filter(|r| r.status == status)
            .count() as i64)
    }
}

#[async_trait]
impl FeeStore for MemoryTransaction {
    async fn fee(&mut self, loan_id: LoanId) -> AppResult<Option<LateFee>> {
        Ok(self.work.fees.get(&loan_id).cloned())
    }

    async fn insert_fee(&mut self, fee: &LateFee) -> AppResult<()> {
        if !self.work.loans.contains_key(&fee.loan_id) {
            return Err(AppError::NotFound(format!("Loan with id {} not found", fee.loan_id)));
        }
        if self.work.fees.contains_key(&fee.loan_id) {
            return Err(AppError::Internal(format!(
                "Loan {} already has a late fee",
                fee.loan_id
            )));
        }
        self.work.fees.insert(fee.loan_id, fee.clone());
        Ok(())
    }

    async fn update_fee(&mut self, fee: &LateFee) -> AppResult<()> {
        match self.work.fees.get_mut(&fee.loan_id) {
            Some(stored) => {
                *stored = fee.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "Late fee for loan {} not found",
                fee.loan_id
            ))),
        }
    }

    async fn delete_fee(&mut self, loan_id: LoanId) -> AppResult<()> {
        self.work.fees.remove(&loan_id);
        Ok(())
    }

    async fn fees(&mut self, filter: &FeeFilter) -> AppResult<Vec<LateFee>> {
        let mut fees: Vec<LateFee> = self
            .work
            .fees
            .values()
            .filter(|fee| filter.matches(fee))
            .cloned()
            .collect();
        fees.sort_by(|a, b| (b.created_at, b.loan_id).cmp(&(a.created_at, a.loan_id)));
        Ok(fees)
    }
}

#[async_trait]
impl SettingsStore for MemoryTransaction {
    async fn settings(&mut self) -> AppResult<Option<LibrarySettings>> {
        Ok(self.work.settings.clone())
    }

    async fn save_settings(&mut self, settings: &LibrarySettings) -> AppResult<()> {
        self.work.settings = Some(settings.clone());
        Ok(())
    }
}
