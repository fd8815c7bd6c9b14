//! Reservation queue service
//!
//! Pending reservations of a title form a FIFO queue keyed by
//! `(created_at, id)`. Promotion hands a freed copy to the queue head and
//! keeps it held (unavailable) until pickup or expiry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    clock::{add_days, Clock},
    config::LendingConfig,
    error::{AppError, AppResult},
    models::{
        Actor, LibrarySettings, Loan, NewReservation, QueueEntry, Reservation, ReservationFilter,
        ReservationId, ReservationStatus, TitleId, UserId,
    },
    repository::{Repository, Transaction},
    services::{
        loans, settings,
        sweep::{run_sweep, SweepReport, SweepStep},
    },
};

/// Hold a free copy of `title_id` for the oldest pending reservation.
///
/// Returns `None` when the queue is empty or no copy could be taken, in
/// which case the copy stays available.
pub(crate) async fn promote_next(
    tx: &mut dyn Transaction,
    title_id: TitleId,
    settings: &LibrarySettings,
    today: NaiveDate,
) -> AppResult<Option<Reservation>> {
    let Some(mut head) = tx.queue_head(title_id).await? else {
        return Ok(None);
    };
    if !tx.try_reserve_copy(title_id).await? {
        return Ok(None);
    }

    head.status = ReservationStatus::Fulfilled;
    head.fulfilled_at = Some(today);
    head.expires_at = add_days(today, settings.reservation_hold_days)?;
    tx.update_reservation(&head).await?;

    tracing::info!(
        reservation_id = head.id,
        title_id,
        user_id = head.user_id,
        expires_at = %head.expires_at,
        "Reservation fulfilled, copy held for pickup"
    );
    Ok(Some(head))
}

/// Expire a fulfilled hold and pass its copy to the next reader in line
pub(crate) async fn expire_hold(
    tx: &mut dyn Transaction,
    mut reservation: Reservation,
    settings: &LibrarySettings,
    today: NaiveDate,
) -> AppResult<Option<Reservation>> {
    reservation.status = ReservationStatus::Expired;
    tx.update_reservation(&reservation).await?;
    tx.release_copy(reservation.title_id).await?;
    tracing::info!(
        reservation_id = reservation.id,
        title_id = reservation.title_id,
        user_id = reservation.user_id,
        "Hold expired"
    );
    promote_next(tx, reservation.title_id, settings, today).await
}

/// Turn a held reservation into a loan on the copy already set aside
pub(crate) async fn convert_held(
    tx: &mut dyn Transaction,
    mut reservation: Reservation,
    settings: &LibrarySettings,
    today: NaiveDate,
) -> AppResult<Loan> {
    if reservation.status != ReservationStatus::Fulfilled {
        return Err(AppError::InvalidState(format!(
            "Reservation {} is {}, not held for pickup",
            reservation.id, reservation.status
        )));
    }
    if reservation.is_expired(today) {
        return Err(AppError::InvalidState(format!(
            "Hold of reservation {} expired on {}",
            reservation.id, reservation.expires_at
        )));
    }
    if tx
        .active_loan(reservation.user_id, reservation.title_id)
        .await?
        .is_some()
    {
        return Err(AppError::AlreadyBorrowed);
    }
    loans::ensure_below_cap(tx, reservation.user_id, settings).await?;

    let loan = loans::open_loan(tx, reservation.title_id, reservation.user_id, settings, today).await?;
    reservation.status = ReservationStatus::Consumed;
    reservation.loan_id = Some(loan.id);
    tx.update_reservation(&reservation).await?;

    tracing::info!(
        reservation_id = reservation.id,
        loan_id = loan.id,
        title_id = loan.title_id,
        user_id = loan.user_id,
        "Held copy picked up"
    );
    Ok(loan)
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    lending: LendingConfig,
}

impl ReservationsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, lending: LendingConfig) -> Self {
        Self {
            repository,
            clock,
            lending,
        }
    }

    /// Join the queue of a title that has no free copy
    pub async fn reserve(
        &self,
        actor: &Actor,
        user_id: UserId,
        title_id: TitleId,
    ) -> AppResult<Reservation> {
        actor.require_self_or_staff(user_id)?;
        let today = self.clock.today();

        let mut tx = self.repository.begin().await?;
        let settings = settings::current(tx.as_mut()).await?;
        let counts = tx.observe(title_id).await?;
        if counts.available > 0 {
            return Err(AppError::DirectlyAvailable);
        }
        if tx.active_reservation(user_id, title_id).await?.is_some() {
            return Err(AppError::AlreadyReserved);
        }
        if tx.active_loan(user_id, title_id).await?.is_some() {
            return Err(AppError::AlreadyBorrowed);
        }

        let reservation = tx
            .insert_reservation(&NewReservation {
                title_id,
                user_id,
                created_at: today,
                expires_at: add_days(today, settings.reservation_hold_days)?,
            })
            .await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = reservation.id,
            title_id,
            user_id,
            "Reservation created"
        );
        Ok(reservation)
    }

    /// Cancel a pending or held reservation; a held copy goes to the next reader
    pub async fn cancel(&self, actor: &Actor, reservation_id: ReservationId) -> AppResult<Reservation> {
        let today = self.clock.today();
        let mut tx = self.repository.begin().await?;
        let mut reservation = tx.reservation(reservation_id).await?;
        actor.require_self_or_staff(reservation.user_id)?;

        let was_held = match reservation.status {
            ReservationStatus::Pending => false,
            ReservationStatus::Fulfilled => true,
            status => {
                return Err(AppError::InvalidState(format!(
                    "Reservation {} is already {}",
                    reservation_id, status
                )))
            }
        };

        reservation.status = ReservationStatus::Cancelled;
        tx.update_reservation(&reservation).await?;
        if was_held {
            let settings = settings::current(tx.as_mut()).await?;
            tx.release_copy(reservation.title_id).await?;
            promote_next(tx.as_mut(), reservation.title_id, &settings, today).await?;
        }
        tx.commit().await?;

        tracing::info!(reservation_id, user_id = reservation.user_id, was_held, "Reservation cancelled");
        Ok(reservation)
    }

    /// Serve the queue head with a free copy, e.g. after copies were added
    pub async fn promote_next(&self, actor: &Actor, title_id: TitleId) -> AppResult<Option<Reservation>> {
        actor.require_staff()?;
        let today = self.clock.today();
        let mut tx = self.repository.begin().await?;
        let settings = settings::current(tx.as_mut()).await?;
        let promoted = promote_next(tx.as_mut(), title_id, &settings, today).await?;
        tx.commit().await?;
        Ok(promoted)
    }

    /// Pick up a held copy
    pub async fn convert_to_loan(&self, actor: &Actor, reservation_id: ReservationId) -> AppResult<Loan> {
        let today = self.clock.today();
        let mut tx = self.repository.begin().await?;
        let reservation = tx.reservation(reservation_id).await?;
        actor.require_self_or_staff(reservation.user_id)?;
        let settings = settings::current(tx.as_mut()).await?;

        let loan = convert_held(tx.as_mut(), reservation, &settings, today).await?;
        tx.commit().await?;
        Ok(loan)
    }

    /// Expire holds past their date.
    ///
    /// Held copies are released and passed on first, so a reader waiting
    /// behind an expired hold is served before stale pending entries expire.
    pub async fn expire_holds(&self) -> AppResult<SweepReport> {
        let today = self.clock.today();
        let batch_size = self.lending.sweep_batch_size;

        let mut report = run_sweep(
            &self.repository,
            batch_size,
            &ExpireHolds {
                status: ReservationStatus::Fulfilled,
                today,
            },
        )
        .await?;
        let pending = run_sweep(
            &self.repository,
            batch_size,
            &ExpireHolds {
                status: ReservationStatus::Pending,
                today,
            },
        )
        .await?;
        report.absorb(pending);
        Ok(report)
    }

    pub async fn reservations_for_user(
        &self,
        actor: &Actor,
        user_id: UserId,
        filter: &ReservationFilter,
    ) -> AppResult<Vec<Reservation>> {
        actor.require_self_or_staff(user_id)?;
        let mut tx = self.repository.begin().await?;
        tx.reservations_for_user(user_id, filter).await
    }

    /// Pending queue of a title, head first
    pub async fn queue(&self, title_id: TitleId) -> AppResult<Vec<QueueEntry>> {
        let mut tx = self.repository.begin().await?;
        tx.title(title_id).await?;
        let queue = tx.pending_queue(title_id).await?;
        Ok(queue
            .into_iter()
            .enumerate()
            .map(|(idx, reservation)| QueueEntry {
                position: idx + 1,
                reservation,
            })
            .collect())
    }
}

struct ExpireHolds {
    status: ReservationStatus,
    today: NaiveDate,
}

#[async_trait]
impl SweepStep for ExpireHolds {
    fn name(&self) -> &'static str {
        match self.status {
            ReservationStatus::Fulfilled => "expire_held",
            _ => "expire_pending",
        }
    }

    async fn candidates(
        &self,
        tx: &mut dyn Transaction,
        after: i64,
        limit: i64,
    ) -> AppResult<Vec<i64>> {
        let expired = tx
            .reservations_past_expiry(self.status, self.today, after, limit)
            .await?;
        Ok(expired.into_iter().map(|r| r.id).collect())
    }

    async fn apply(
        &self,
        tx: &mut dyn Transaction,
        id: i64,
        report: &mut SweepReport,
    ) -> AppResult<()> {
        let mut reservation = tx.reservation(id).await?;
        if reservation.status != self.status || !reservation.is_expired(self.today) {
            return Ok(());
        }

        report.transitioned += 1;
        if self.status == ReservationStatus::Fulfilled {
            let settings = settings::current(tx).await?;
            if expire_hold(tx, reservation, &settings, self.today)
                .await?
                .is_some()
            {
                report.promoted += 1;
            }
            return Ok(());
        }

        reservation.status = ReservationStatus::Expired;
        tx.update_reservation(&reservation).await?;
        tracing::info!(
            reservation_id = id,
            title_id = reservation.title_id,
            user_id = reservation.user_id,
            "Reservation expired"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        repository::{MemoryStore, Store},
    };

    fn day(n: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap() + chrono::Days::new(n)
    }

    struct Fixture {
        store: MemoryStore,
        clock: Arc<ManualClock>,
        service: ReservationsService,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(day(0)));
        let service = ReservationsService::new(
            Repository::new(Arc::new(store.clone())),
            clock.clone(),
            LendingConfig::default(),
        );
        Fixture {
            store,
            clock,
            service,
        }
    }

    /// Title with its only copy out on loan to user 100
    async fn checked_out_title(store: &MemoryStore) -> TitleId {
        let title = store.add_title("The Dispossessed", 1).await;
        let mut tx = store.begin().await.unwrap();
        assert!(tx.try_reserve_copy(title).await.unwrap());
        loans::open_loan(tx.as_mut(), title, 100, &LibrarySettings::default(), day(0))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        title
    }

    #[tokio::test]
    async fn test_reserve_requires_unavailable_title() {
        let f = fixture();
        let title = f.store.add_title("Kindred", 1).await;
        assert!(matches!(
            f.service.reserve(&Actor::reader(1), 1, title).await,
            Err(AppError::DirectlyAvailable)
        ));
        assert!(f.store.snapshot().await.reservations.is_empty());
    }

    #[tokio::test]
    async fn test_reserve_twice_and_while_borrowing() {
        let f = fixture();
        let title = checked_out_title(&f.store).await;

        let reservation = f.service.reserve(&Actor::reader(1), 1, title).await.unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.expires_at, day(3));
        assert!(matches!(
            f.service.reserve(&Actor::reader(1), 1, title).await,
            Err(AppError::AlreadyReserved)
        ));
        assert!(matches!(
            f.service.reserve(&Actor::reader(100), 100, title).await,
            Err(AppError::AlreadyBorrowed)
        ));
        assert!(matches!(
            f.service.reserve(&Actor::reader(2), 1, title).await,
            Err(AppError::NotAuthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_queue_order_and_cancel() {
        let f = fixture();
        let title = checked_out_title(&f.store).await;
        let first = f.service.reserve(&Actor::reader(1), 1, title).await.unwrap();
        f.clock.advance_days(1);
        let second = f.service.reserve(&Actor::reader(2), 2, title).await.unwrap();

        let queue = f.service.queue(title).await.unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].position, 1);
        assert_eq!(queue[0].reservation.id, first.id);
        assert_eq!(queue[1].reservation.id, second.id);

        let cancelled = f.service.cancel(&Actor::reader(1), first.id).await.unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(matches!(
            f.service.cancel(&Actor::reader(1), first.id).await,
            Err(AppError::InvalidState(_))
        ));
        let queue = f.service.queue(title).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].reservation.id, second.id);
    }

    #[tokio::test]
    async fn test_cancel_held_copy_goes_to_next_reader() {
        let f = fixture();
        let title = f.store.add_title("Solaris", 0).await;
        let first = f.service.reserve(&Actor::reader(1), 1, title).await.unwrap();
        let second = f.service.reserve(&Actor::reader(2), 2, title).await.unwrap();

        f.store.add_copies(title, 1).await.unwrap();
        let held = f
            .service
            .promote_next(&Actor::librarian(50), title)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(held.id, first.id);

        f.clock.advance_days(1);
        f.service.cancel(&Actor::reader(1), first.id).await.unwrap();

        let snapshot = f.store.snapshot().await;
        let second = snapshot.reservations.iter().find(|r| r.id == second.id).unwrap();
        assert_eq!(second.status, ReservationStatus::Fulfilled);
        assert_eq!(second.fulfilled_at, Some(day(1)));
        assert_eq!(second.expires_at, day(4));
        assert_eq!(snapshot.titles[0].available_copies, 0);
    }

    #[tokio::test]
    async fn test_convert_requires_live_hold() {
        let f = fixture();
        let title = f.store.add_title("Solaris", 0).await;
        let reservation = f.service.reserve(&Actor::reader(1), 1, title).await.unwrap();
        assert!(matches!(
            f.service.convert_to_loan(&Actor::reader(1), reservation.id).await,
            Err(AppError::InvalidState(_))
        ));

        f.store.add_copies(title, 1).await.unwrap();
        f.service.promote_next(&Actor::librarian(50), title).await.unwrap();
        let loan = f.service.convert_to_loan(&Actor::reader(1), reservation.id).await.unwrap();
        assert_eq!(loan.user_id, 1);
        assert_eq!(loan.due_date, day(14));

        let snapshot = f.store.snapshot().await;
        assert_eq!(snapshot.reservations[0].status, ReservationStatus::Consumed);
        assert_eq!(snapshot.reservations[0].loan_id, Some(loan.id));
        assert_eq!(snapshot.titles[0].available_copies, 0);
    }

    #[tokio::test]
    async fn test_expire_holds_is_idempotent() {
        let f = fixture();
        let title = checked_out_title(&f.store).await;
        f.service.reserve(&Actor::reader(1), 1, title).await.unwrap();

        f.clock.set(day(3));
        let report = f.service.expire_holds().await.unwrap();
        assert_eq!(report.transitioned, 0);

        f.clock.set(day(4));
        let report = f.service.expire_holds().await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.transitioned, 1);

        let report = f.service.expire_holds().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn test_expire_sweep_pages_through_batches() {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(day(0)));
        let service = ReservationsService::new(
            Repository::new(Arc::new(store.clone())),
            clock.clone(),
            LendingConfig {
                sweep_batch_size: 2,
                ..Default::default()
            },
        );
        let title = checked_out_title(&store).await;
        for user in 1..=5 {
            service.reserve(&Actor::reader(user), user, title).await.unwrap();
        }

        clock.set(day(10));
        let report = service.expire_holds().await.unwrap();
        assert_eq!(report.examined, 5);
        assert_eq!(report.transitioned, 5);
        assert_eq!(report.failures, 0);
    }
}
