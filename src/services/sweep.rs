//! Batched, idempotent sweeps over time-driven transitions
//!
//! A sweep lists candidate ids with a keyset cursor, then applies the
//! transition to each batch in its own transaction. When a batch fails the
//! batch is replayed one entity per transaction so a single bad row cannot
//! stall the sweep; entities that still fail are logged and counted.

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    repository::{Repository, Transaction},
};

/// Outcome counters of one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SweepReport {
    /// Candidates listed by the sweep
    pub examined: u64,
    /// Entities that changed state
    pub transitioned: u64,
    /// Late fees created or refreshed
    pub fees_touched: u64,
    /// Reservations promoted to fulfilled
    pub promoted: u64,
    /// Entities skipped after an error
    pub failures: u64,
}

impl SweepReport {
    pub fn absorb(&mut self, other: SweepReport) {
        self.examined += other.examined;
        self.transitioned += other.transitioned;
        self.fees_touched += other.fees_touched;
        self.promoted += other.promoted;
        self.failures += other.failures;
    }
}

/// One kind of time-driven transition
#[async_trait]
pub(crate) trait SweepStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate ids greater than `after`, ascending, at most `limit`
    async fn candidates(
        &self,
        tx: &mut dyn Transaction,
        after: i64,
        limit: i64,
    ) -> AppResult<Vec<i64>>;

    /// Re-check and transition one entity; must be a no-op when it no longer qualifies
    async fn apply(
        &self,
        tx: &mut dyn Transaction,
        id: i64,
        report: &mut SweepReport,
    ) -> AppResult<()>;
}

pub(crate) async fn run_sweep(
    repository: &Repository,
    batch_size: i64,
    step: &dyn SweepStep,
) -> AppResult<SweepReport> {
    let limit = batch_size.max(1);
    let mut report = SweepReport::default();
    let mut after = 0;

    loop {
        let ids = {
            let mut tx = repository.begin().await?;
            step.candidates(tx.as_mut(), after, limit).await?
        };
        let Some(&last) = ids.last() else {
            break;
        };
        after = last;
        report.examined += ids.len() as u64;

        match apply_batch(repository, step, &ids).await {
            Ok(batch) => report.absorb(batch),
            Err(e) => {
                tracing::warn!(
                    sweep = step.name(),
                    batch = ids.len(),
                    error = %e,
                    "Sweep batch failed, retrying entity by entity"
                );
                for &id in &ids {
                    match apply_batch(repository, step, &[id]).await {
                        Ok(single) => report.absorb(single),
                        Err(e) => {
                            tracing::warn!(sweep = step.name(), id, error = %e, "Sweep skipped entity");
                            report.failures += 1;
                        }
                    }
                }
            }
        }

        if (ids.len() as i64) < limit {
            break;
        }
    }

    tracing::info!(
        sweep = step.name(),
        examined = report.examined,
        transitioned = report.transitioned,
        fees_touched = report.fees_touched,
        promoted = report.promoted,
        failures = report.failures,
        "Sweep completed"
    );
    Ok(report)
}

async fn apply_batch(
    repository: &Repository,
    step: &dyn SweepStep,
    ids: &[i64],
) -> AppResult<SweepReport> {
    let mut batch = SweepReport::default();
    let mut tx = repository.begin().await?;
    for &id in ids {
        step.apply(tx.as_mut(), id, &mut batch).await?;
    }
    tx.commit().await?;
    Ok(batch)
}
