//! Randomized workload checking the circulation invariants after every step

mod common;

use std::collections::{BTreeMap, HashMap, HashSet};

use circulation_server::{
    error::AppError,
    models::{
        Actor, FeeStatus, LoanId, LoanStatus, ReservationId, ReservationStatus, UpdateSettings,
    },
    repository::memory::MemorySnapshot,
};
use common::{day, Harness};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;

const USERS: i64 = 6;
const LOAN_CAP: i32 = 3;
const STEPS: usize = 400;

fn pending_queues(snapshot: &MemorySnapshot) -> BTreeMap<i64, Vec<ReservationId>> {
    let mut pending: Vec<_> = snapshot
        .reservations
        .iter()
        .filter(|r| r.status == ReservationStatus::Pending)
        .collect();
    pending.sort_by_key(|r| r.queue_key());

    let mut queues: BTreeMap<i64, Vec<ReservationId>> = BTreeMap::new();
    for reservation in pending {
        queues.entry(reservation.title_id).or_default().push(reservation.id);
    }
    queues
}

struct Checker {
    frozen: HashMap<LoanId, (Decimal, i32)>,
}

impl Checker {
    fn check(&mut self, before: &MemorySnapshot, after: &MemorySnapshot, step: usize) {
        // copies are either on the shelf, on loan or held
        for title in &after.titles {
            let on_loan = after
                .loans
                .iter()
                .filter(|l| l.title_id == title.id && l.is_active())
                .count() as i32;
            let held = after
                .reservations
                .iter()
                .filter(|r| r.title_id == title.id && r.status == ReservationStatus::Fulfilled)
                .count() as i32;
            assert!(title.available_copies >= 0, "step {}: negative availability", step);
            assert_eq!(
                title.available_copies + on_loan + held,
                title.total_copies,
                "step {}: copy accounting broken for title {}",
                step,
                title.id
            );
        }

        let mut per_user: HashMap<i64, i32> = HashMap::new();
        let mut loan_pairs = HashSet::new();
        for loan in after.loans.iter().filter(|l| l.is_active()) {
            *per_user.entry(loan.user_id).or_default() += 1;
            assert!(
                loan_pairs.insert((loan.user_id, loan.title_id)),
                "step {}: duplicate active loan",
                step
            );
        }
        assert!(
            per_user.values().all(|count| *count <= LOAN_CAP),
            "step {}: loan cap exceeded",
            step
        );

        let mut reservation_pairs = HashSet::new();
        for reservation in after.reservations.iter().filter(|r| r.is_active()) {
            assert!(
                reservation_pairs.insert((reservation.user_id, reservation.title_id)),
                "step {}: duplicate active reservation",
                step
            );
        }

        for loan in &after.loans {
            if loan.status == LoanStatus::Overdue {
                assert!(loan.return_date.is_none(), "step {}: overdue loan returned", step);
            }
        }

        // promotions leave the queue from its head
        let queues = pending_queues(before);
        for (title_id, queue) in queues {
            let promoted: HashSet<ReservationId> = after
                .reservations
                .iter()
                .filter(|r| {
                    r.title_id == title_id
                        && matches!(
                            r.status,
                            ReservationStatus::Fulfilled | ReservationStatus::Consumed
                        )
                        && queue.contains(&r.id)
                })
                .map(|r| r.id)
                .collect();
            let prefix: HashSet<ReservationId> =
                queue.iter().take(promoted.len()).copied().collect();
            assert_eq!(promoted, prefix, "step {}: promotion out of queue order", step);
        }

        for fee in after.fees.iter().filter(|f| f.status.is_settled()) {
            let loan = after
                .loans
                .iter()
                .find(|l| l.id == fee.loan_id)
                .expect("fee has a loan");
            assert!(loan.late_fee_settled, "step {}: settled fee on unsettled loan", step);
            let frozen = self
                .frozen
                .entry(fee.loan_id)
                .or_insert((fee.amount, fee.days_overdue));
            assert_eq!(
                *frozen,
                (fee.amount, fee.days_overdue),
                "step {}: settled fee changed",
                step
            );
        }
    }
}

fn check_fees_current(snapshot: &MemorySnapshot, today: chrono::NaiveDate) {
    let rate = snapshot
        .settings
        .as_ref()
        .map(|s| s.daily_rate)
        .expect("settings stored");
    for loan in snapshot.loans.iter().filter(|l| l.is_active()) {
        let days = (today - loan.due_date).num_days().max(0);
        let fee = snapshot.fees.iter().find(|f| f.loan_id == loan.id);
        match fee {
            Some(fee) if fee.status == FeeStatus::Pending => {
                assert_eq!(fee.amount, Decimal::from(days) * rate);
                assert_eq!(i64::from(fee.days_overdue), days);
            }
            Some(_) => {}
            None => assert_eq!(days, 0, "loan {} overdue without a fee", loan.id),
        }
    }
}

fn tolerate<T>(result: Result<T, AppError>) {
    if let Err(e) = result {
        assert!(
            !matches!(e, AppError::Internal(_) | AppError::Database(_)),
            "unexpected failure: {}",
            e
        );
    }
}

#[tokio::test]
async fn test_random_workload_keeps_invariants() {
    let h = Harness::new();
    h.services
        .settings
        .update_settings(&UpdateSettings {
            max_loans_per_user: Some(LOAN_CAP),
            ..Default::default()
        })
        .await
        .unwrap();

    let titles = vec![
        h.store.add_title("Solaris", 1).await,
        h.store.add_title("Dune", 2).await,
        h.store.add_title("Kindred", 3).await,
    ];
    let librarian = Actor::librarian(100);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut checker = Checker {
        frozen: HashMap::new(),
    };
    let mut today = 0u64;

    for step in 0..STEPS {
        let before = h.store.snapshot().await;
        let user = rng.gen_range(1..=USERS);
        let reader = Actor::reader(user);
        let title = titles[rng.gen_range(0..titles.len())];

        match rng.gen_range(0..100) {
            0..=24 => tolerate(h.services.loans.borrow(&reader, user, title).await),
            25..=39 => {
                let active: Vec<_> = before.loans.iter().filter(|l| l.is_active()).collect();
                if !active.is_empty() {
                    let loan = active[rng.gen_range(0..active.len())];
                    let owner = Actor::reader(loan.user_id);
                    tolerate(h.services.loans.return_loan(&owner, loan.id).await);
                }
            }
            40..=49 => {
                if let Some(loan) = before.loans.iter().find(|l| l.user_id == user && l.is_active()) {
                    tolerate(h.services.loans.renew(&reader, loan.id).await);
                }
            }
            50..=64 => tolerate(h.services.reservations.reserve(&reader, user, title).await),
            65..=69 => {
                if let Some(r) = before.reservations.iter().find(|r| r.user_id == user && r.is_active()) {
                    tolerate(h.services.reservations.cancel(&reader, r.id).await);
                }
            }
            70..=79 => {
                let held: Vec<_> = before
                    .reservations
                    .iter()
                    .filter(|r| r.status == ReservationStatus::Fulfilled)
                    .collect();
                if !held.is_empty() {
                    let r = held[rng.gen_range(0..held.len())];
                    let owner = Actor::reader(r.user_id);
                    tolerate(h.services.reservations.convert_to_loan(&owner, r.id).await);
                }
            }
            80..=84 => {
                if let Some(fee) = before.fees.iter().find(|f| f.status == FeeStatus::Pending) {
                    if rng.gen_bool(0.5) {
                        let owner = Actor::reader(fee.user_id);
                        tolerate(h.services.fees.pay(&owner, fee.loan_id).await);
                    } else {
                        tolerate(h.services.fees.waive(&librarian, fee.loan_id, "Goodwill").await);
                    }
                }
            }
            85..=86 => {
                if let Some(loan) = before.loans.iter().find(|l| l.status == LoanStatus::Overdue) {
                    tolerate(h.services.loans.mark_lost(&librarian, loan.id, "Missing").await);
                }
            }
            _ => {
                today += rng.gen_range(1..=4);
                h.set_day(today);
                tolerate(h.services.loans.mark_overdue().await);
                check_fees_current(&h.store.snapshot().await, day(today));
                let mid = h.store.snapshot().await;
                checker.check(&before, &mid, step);
                tolerate(h.services.reservations.expire_holds().await);
                let after = h.store.snapshot().await;
                checker.check(&mid, &after, step);
                continue;
            }
        }

        let after = h.store.snapshot().await;
        checker.check(&before, &after, step);

        // overdue status only ever follows the due date
        for loan in after.loans.iter().filter(|l| l.status == LoanStatus::Overdue) {
            assert!(day(today) > loan.due_date, "step {}: overdue before due date", step);
        }
    }

    let stats = h.services.stats.circulation().await.unwrap();
    let snapshot = h.store.snapshot().await;
    let on_loan = snapshot.loans.iter().filter(|l| l.is_active()).count() as i64;
    assert_eq!(stats.borrowed_loans + stats.overdue_loans, on_loan);
}
