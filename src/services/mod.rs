//! Business logic services
//!
//! Service structs own transaction boundaries and the clock. Transitions
//! that cross services (return finalizing fees and promoting the queue,
//! pickup opening a loan) are free functions taking the caller's open
//! transaction, so one command is always one transaction.

pub mod catalog;
pub mod fees;
pub mod loans;
pub mod reservations;
pub mod settings;
pub mod stats;
pub mod sweep;

use std::{future::Future, sync::Arc};

use crate::{clock::Clock, config::LendingConfig, error::AppResult, repository::Repository};

pub use sweep::SweepReport;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub fees: fees::FeesService,
    pub settings: settings::SettingsService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, lending: LendingConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), clock.clone(), lending.clone()),
            reservations: reservations::ReservationsService::new(
                repository.clone(),
                clock.clone(),
                lending,
            ),
            fees: fees::FeesService::new(repository.clone(), clock),
            settings: settings::SettingsService::new(repository.clone()),
            stats: stats::StatsService::new(repository),
        }
    }
}

/// Run `op`, retrying it while it fails with a store conflict, at most
/// `attempts` times in total
pub async fn retry_conflicts<T, F, Fut>(attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                tracing::debug!(attempt, "Store conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
