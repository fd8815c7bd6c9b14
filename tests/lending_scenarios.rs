//! End-to-end lending scenarios against the in-memory store

mod common;

use std::str::FromStr;

use circulation_server::{
    error::AppError,
    models::{Actor, FeeStatus, LoanStatus, ReservationStatus},
};
use common::{day, Harness};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_return_hands_copy_to_waiting_reader() {
    let h = Harness::new();
    let title = h.store.add_title("The Left Hand of Darkness", 1).await;
    let (a, b) = (Actor::reader(1), Actor::reader(2));

    let loan = h.services.loans.borrow(&a, 1, title).await.unwrap();
    assert_eq!(h.available(title).await, 0);
    assert_eq!(loan.due_date, day(14));
    assert_eq!(loan.status, LoanStatus::Borrowed);

    h.set_day(2);
    let reservation = h.services.reservations.reserve(&b, 2, title).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.expires_at, day(5));
    let queue = h.services.reservations.queue(title).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].reservation.id, reservation.id);

    h.set_day(10);
    h.services.loans.return_loan(&a, loan.id).await.unwrap();
    assert_eq!(h.available(title).await, 0);
    let held = h
        .services
        .reservations
        .reservations_for_user(&b, 2, &Default::default())
        .await
        .unwrap();
    assert_eq!(held[0].status, ReservationStatus::Fulfilled);
    assert_eq!(held[0].expires_at, day(13));

    h.set_day(11);
    let second = h
        .services
        .reservations
        .convert_to_loan(&b, reservation.id)
        .await
        .unwrap();
    assert_eq!(second.due_date, day(25));
    assert_eq!(h.available(title).await, 0);
    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.reservations[0].status, ReservationStatus::Consumed);
    assert_eq!(snapshot.reservations[0].loan_id, Some(second.id));
}

#[tokio::test]
async fn test_overdue_fees_accrue_and_settle() {
    let h = Harness::new();
    let title = h.store.add_title("Beloved", 2).await;
    let a_loan = h.services.loans.borrow(&Actor::reader(1), 1, title).await.unwrap();
    let b_loan = h.services.loans.borrow(&Actor::reader(2), 2, title).await.unwrap();

    h.set_day(15);
    let report = h.services.loans.mark_overdue().await.unwrap();
    assert_eq!(report.transitioned, 2);
    let snapshot = h.store.snapshot().await;
    assert!(snapshot.loans.iter().all(|l| l.status == LoanStatus::Overdue));
    assert_eq!(snapshot.fees.len(), 2);
    for fee in &snapshot.fees {
        assert_eq!(fee.amount, dec("0.50"));
        assert_eq!(fee.days_overdue, 1);
    }

    h.set_day(20);
    h.services.loans.mark_overdue().await.unwrap();
    for fee in &h.store.snapshot().await.fees {
        assert_eq!(fee.amount, dec("3.00"));
        assert_eq!(fee.days_overdue, 6);
    }

    h.set_day(22);
    h.services.loans.return_loan(&Actor::reader(1), a_loan.id).await.unwrap();
    let fees = h
        .services
        .fees
        .fees_for_user(&Actor::reader(1), 1, None)
        .await
        .unwrap();
    assert_eq!(fees.len(), 1);
    assert_eq!(fees[0].amount, dec("4.00"));
    assert_eq!(fees[0].days_overdue, 8);
    assert_eq!(fees[0].status, FeeStatus::Pending);
    let snapshot = h.store.snapshot().await;
    let returned = snapshot.loans.iter().find(|l| l.id == a_loan.id).unwrap();
    assert!(!returned.late_fee_settled);

    // the returned loan's fee no longer moves
    h.set_day(30);
    h.services.loans.mark_overdue().await.unwrap();
    let fee = h.services.fees.pay(&Actor::reader(1), a_loan.id).await.unwrap();
    assert_eq!(fee.status, FeeStatus::Paid);
    assert_eq!(fee.amount, dec("4.00"));
    let snapshot = h.store.snapshot().await;
    assert!(snapshot.loans.iter().find(|l| l.id == a_loan.id).unwrap().late_fee_settled);
    assert!(!snapshot.loans.iter().find(|l| l.id == b_loan.id).unwrap().late_fee_settled);
}

#[tokio::test]
async fn test_expired_hold_passes_to_next_in_queue() {
    let h = Harness::new();
    let title = h.store.add_title("Parable of the Sower", 1).await;
    let loan = h.services.loans.borrow(&Actor::reader(9), 9, title).await.unwrap();

    let mut reservations = Vec::new();
    for user in 1..=3 {
        h.set_day(user as u64);
        reservations.push(
            h.services
                .reservations
                .reserve(&Actor::reader(user), user, title)
                .await
                .unwrap(),
        );
    }

    h.set_day(4);
    h.services.loans.return_loan(&Actor::reader(9), loan.id).await.unwrap();
    let snapshot = h.store.snapshot().await;
    let a = snapshot.reservations.iter().find(|r| r.id == reservations[0].id).unwrap();
    assert_eq!(a.status, ReservationStatus::Fulfilled);
    assert_eq!(a.expires_at, day(7));

    h.set_day(8);
    let report = h.services.reservations.expire_holds().await.unwrap();
    assert_eq!(report.promoted, 1);

    let snapshot = h.store.snapshot().await;
    let status_of = |idx: usize| {
        snapshot
            .reservations
            .iter()
            .find(|r| r.id == reservations[idx].id)
            .unwrap()
            .clone()
    };
    assert_eq!(status_of(0).status, ReservationStatus::Expired);
    assert_eq!(status_of(1).status, ReservationStatus::Fulfilled);
    assert_eq!(status_of(1).expires_at, day(11));
    assert_eq!(status_of(2).status, ReservationStatus::Expired);
    assert_eq!(h.available(title).await, 0);
}

#[tokio::test]
async fn test_reserve_with_free_copy_is_rejected() {
    let h = Harness::new();
    let title = h.store.add_title("Ficciones", 1).await;
    let before = h.store.snapshot().await;

    let err = h
        .services
        .reservations
        .reserve(&Actor::reader(1), 1, title)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DirectlyAvailable));

    let after = h.store.snapshot().await;
    assert_eq!(after.titles, before.titles);
    assert!(after.reservations.is_empty());
}

#[tokio::test]
async fn test_loan_cap_leaves_counters_alone() {
    let h = Harness::new();
    for idx in 0..5 {
        let title = h.store.add_title(&format!("Volume {}", idx), 1).await;
        h.services.loans.borrow(&Actor::reader(1), 1, title).await.unwrap();
    }
    let extra = h.store.add_title("Volume 5", 1).await;

    let err = h.services.loans.borrow(&Actor::reader(1), 1, extra).await.unwrap_err();
    assert!(matches!(err, AppError::LimitReached { current: 5, max: 5 }));
    assert_eq!(h.available(extra).await, 1);
}

#[tokio::test]
async fn test_renewal_rules() {
    let h = Harness::new();
    let title = h.store.add_title("Invisible Cities", 1).await;
    let reader = Actor::reader(1);
    let loan = h.services.loans.borrow(&reader, 1, title).await.unwrap();

    h.set_day(10);
    let renewed = h.services.loans.renew(&reader, loan.id).await.unwrap();
    assert_eq!(renewed.due_date, day(24));
    assert_eq!(renewed.renewals, 1);

    h.set_day(20);
    let waiting = h
        .services
        .reservations
        .reserve(&Actor::reader(2), 2, title)
        .await
        .unwrap();
    assert!(matches!(
        h.services.loans.renew(&reader, loan.id).await,
        Err(AppError::RenewalBlocked)
    ));

    h.services.reservations.cancel(&Actor::reader(2), waiting.id).await.unwrap();
    let renewed = h.services.loans.renew(&reader, loan.id).await.unwrap();
    assert_eq!(renewed.due_date, day(38));
    assert_eq!(renewed.renewals, 2);

    assert!(matches!(
        h.services.loans.renew(&reader, loan.id).await,
        Err(AppError::RenewalCapReached(2))
    ));
}

#[tokio::test]
async fn test_borrow_then_return_restores_counters() {
    let h = Harness::new();
    let title = h.store.add_title("Pedro Páramo", 3).await;
    let loan = h.services.loans.borrow(&Actor::reader(1), 1, title).await.unwrap();
    h.set_day(4);
    let returned = h.services.loans.return_loan(&Actor::reader(1), loan.id).await.unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(h.available(title).await, 3);
}

#[tokio::test]
async fn test_reserve_then_cancel_restores_state() {
    let h = Harness::new();
    let title = h.store.add_title("Pedro Páramo", 1).await;
    h.services.loans.borrow(&Actor::reader(1), 1, title).await.unwrap();

    let reservation = h
        .services
        .reservations
        .reserve(&Actor::reader(2), 2, title)
        .await
        .unwrap();
    h.services
        .reservations
        .cancel(&Actor::reader(2), reservation.id)
        .await
        .unwrap();

    assert_eq!(h.available(title).await, 0);
    assert!(h.services.reservations.queue(title).await.unwrap().is_empty());
    // the reader may queue again
    h.services
        .reservations
        .reserve(&Actor::reader(2), 2, title)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pickup_keeps_circulation_totals() {
    let h = Harness::new();
    let title = h.store.add_title("Hopscotch", 1).await;
    let loan = h.services.loans.borrow(&Actor::reader(1), 1, title).await.unwrap();
    let reservation = h
        .services
        .reservations
        .reserve(&Actor::reader(2), 2, title)
        .await
        .unwrap();

    let circulating = |snapshot: &circulation_server::repository::memory::MemorySnapshot| {
        let active = snapshot.loans.iter().filter(|l| l.is_active()).count() as i32;
        active + snapshot.titles[0].available_copies
    };
    let before = circulating(&h.store.snapshot().await);

    h.set_day(3);
    h.services.loans.return_loan(&Actor::reader(1), loan.id).await.unwrap();
    let picked_up = h
        .services
        .reservations
        .convert_to_loan(&Actor::reader(2), reservation.id)
        .await
        .unwrap();

    assert_eq!(picked_up.user_id, 2);
    assert_eq!(circulating(&h.store.snapshot().await), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_copy_goes_to_exactly_one_borrower() {
    let h = Harness::new();
    let title = h.store.add_title("Pale Fire", 1).await;

    let mut handles = Vec::new();
    for user in 1..=8 {
        let services = h.services.clone();
        handles.push(tokio::spawn(async move {
            services.loans.borrow(&Actor::reader(user), user, title).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(AppError::NotAvailable) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(h.available(title).await, 0);
}

#[tokio::test]
async fn test_lost_copy_leaves_the_pool() {
    let h = Harness::new();
    let title = h.store.add_title("Austerlitz", 1).await;
    let loan = h.services.loans.borrow(&Actor::reader(1), 1, title).await.unwrap();
    h.services
        .reservations
        .reserve(&Actor::reader(2), 2, title)
        .await
        .unwrap();

    h.set_day(20);
    h.services.loans.mark_overdue().await.unwrap();
    h.services
        .loans
        .mark_lost(&Actor::librarian(50), loan.id, "Never came back")
        .await
        .unwrap();

    let availability = h.services.catalog.title_availability(title).await.unwrap();
    assert_eq!(availability.total_copies, 0);
    assert_eq!(availability.available_copies, 0);
    assert_eq!(availability.queue_length, 1);

    // the fee froze at the loss
    h.set_day(40);
    h.services.loans.mark_overdue().await.unwrap();
    let fees = h.services.fees.fees_for_user(&Actor::reader(1), 1, None).await.unwrap();
    assert_eq!(fees[0].days_overdue, 6);
    assert_eq!(fees[0].amount, dec("3.00"));
}
