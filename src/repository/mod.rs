//! Repository layer for database operations
//!
//! Every state-changing command runs inside one [`Transaction`]. The store's
//! isolation is the only synchronization the lending engine relies on:
//! Postgres runs each transaction at SERIALIZABLE, the memory store holds an
//! exclusive lock for the life of the transaction.

pub mod fees;
pub mod loans;
pub mod memory;
pub mod reservations;
pub mod settings;
pub mod titles;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        CopyCounts, FeeFilter, LateFee, LibrarySettings, Loan, LoanFilter, LoanId, LoanStatus,
        NewLoan, NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus,
        Title, TitleId, UserId,
    },
};

pub use memory::MemoryStore;

/// Copy counters of a title (the catalog's atomic primitives)
#[async_trait]
pub trait TitleStore: Send {
    async fn title(&mut self, id: TitleId) -> AppResult<Title>;

    /// Decrement available copies if at least one is free
    async fn try_reserve_copy(&mut self, id: TitleId) -> AppResult<bool>;

    /// Increment available copies; exceeding the total is a bug and errors
    async fn release_copy(&mut self, id: TitleId) -> AppResult<()>;

    /// Remove a copy that is out on loan from the pool (lost copy)
    async fn retire_copy(&mut self, id: TitleId) -> AppResult<()>;

    async fn observe(&mut self, id: TitleId) -> AppResult<CopyCounts>;
}

#[async_trait]
pub trait LoanStore: Send {
    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    /// Fetch a loan, locking it for the rest of the transaction
    async fn loan(&mut self, id: LoanId) -> AppResult<Loan>;

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()>;

    /// Borrowed or overdue loan of `user_id` on `title_id`
    async fn active_loan(&mut self, user_id: UserId, title_id: TitleId) -> AppResult<Option<Loan>>;

    async fn count_active_loans(&mut self, user_id: UserId) -> AppResult<i64>;

    async fn loans_for_user(&mut self, user_id: UserId, filter: &LoanFilter) -> AppResult<Vec<Loan>>;

    /// Active loans with `due_date < today` and `id > after`, in id order
    async fn loans_past_due(
        &mut self,
        today: NaiveDate,
        after: LoanId,
        limit: i64,
    ) -> AppResult<Vec<Loan>>;

    /// Borrowed loans due in `[from, to]`, earliest first
    async fn loans_due_between(&mut self, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Loan>>;

    async fn count_loans(&mut self, status: LoanStatus) -> AppResult<i64>;
}

#[async_trait]
pub trait ReservationStore: Send {
    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation>;

    /// Fetch a reservation, locking it for the rest of the transaction
    async fn reservation(&mut self, id: ReservationId) -> AppResult<Reservation>;

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()>;

    /// Pending or fulfilled reservation of `user_id` on `title_id`
    async fn active_reservation(
        &mut self,
        user_id: UserId,
        title_id: TitleId,
    ) -> AppResult<Option<Reservation>>;

    /// Pending reservations of a title ordered by `(created_at, id)`
    async fn pending_queue(&mut self, title_id: TitleId) -> AppResult<Vec<Reservation>>;

    /// Oldest pending reservation of a title, locked
    async fn queue_head(&mut self, title_id: TitleId) -> AppResult<Option<Reservation>>;

    /// Copies currently held for pickup on a title
    async fn count_held(&mut self, title_id: TitleId) -> AppResult<i64>;

    async fn reservations_for_user(
        &mut self,
        user_id: UserId,
        filter: &ReservationFilter,
    ) -> AppResult<Vec<Reservation>>;

    /// Reservations in `status` with `expires_at < today` and `id > after`, in id order
    async fn reservations_past_expiry(
        &mut self,
        status: ReservationStatus,
        today: NaiveDate,
        after: ReservationId,
        limit: i64,
    ) -> AppResult<Vec<Reservation>>;

    async fn count_reservations(&mut self, status: ReservationStatus) -> AppResult<i64>;
}

#[async_trait]
pub trait FeeStore: Send {
    /// Fee attached to a loan, locked
    async fn fee(&mut self, loan_id: LoanId) -> AppResult<Option<LateFee>>;

    async fn insert_fee(&mut self, fee: &LateFee) -> AppResult<()>;

    async fn update_fee(&mut self, fee: &LateFee) -> AppResult<()>;

    async fn delete_fee(&mut self, loan_id: LoanId) -> AppResult<()>;

    /// Fees matching the filter, newest first
    async fn fees(&mut self, filter: &FeeFilter) -> AppResult<Vec<LateFee>>;
}

#[async_trait]
pub trait SettingsStore: Send {
    async fn settings(&mut self) -> AppResult<Option<LibrarySettings>>;

    async fn save_settings(&mut self, settings: &LibrarySettings) -> AppResult<()>;
}

/// One serializable unit of work. Dropping it without `commit` rolls back.
#[async_trait]
pub trait Transaction: TitleStore + LoanStore + ReservationStore + FeeStore + SettingsStore {
    async fn commit(&mut self) -> AppResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn Transaction>>;
}

/// Main repository handle shared by the services
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn Store>,
}

impl Repository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Repository backed by a Postgres pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self::new(Arc::new(PgStore::new(pool)))
    }

    pub async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        self.store.begin().await
    }
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn Transaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }
}

pub struct PgTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
}

impl PgTransaction {
    pub(crate) fn conn(&mut self) -> AppResult<&mut PgConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(AppError::Internal("Transaction already committed".to_string())),
        }
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(&mut self) -> AppResult<()> {
        match self.tx.take() {
            Some(tx) => Ok(tx.commit().await?),
            None => Err(AppError::Internal("Transaction already committed".to_string())),
        }
    }
}
