//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use circulation_server::{
    clock::ManualClock,
    config::LendingConfig,
    repository::{MemoryStore, Repository},
    services::Services,
};

/// Day `n` of the test calendar
pub fn day(n: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(n)
}

pub struct Harness {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_lending(LendingConfig::default())
    }

    pub fn with_lending(lending: LendingConfig) -> Self {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(day(0)));
        let services = Services::new(
            Repository::new(Arc::new(store.clone())),
            clock.clone(),
            lending,
        );
        Self {
            store,
            clock,
            services,
        }
    }

    pub fn set_day(&self, n: u64) {
        self.clock.set(day(n));
    }

    pub async fn available(&self, title_id: i64) -> i32 {
        let snapshot = self.store.snapshot().await;
        snapshot
            .titles
            .iter()
            .find(|t| t.id == title_id)
            .map(|t| t.available_copies)
            .expect("title exists")
    }
}
