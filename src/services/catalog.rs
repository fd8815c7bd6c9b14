//! Catalog surface seen by the lending engine

use crate::{
    error::AppResult,
    models::{TitleAvailability, TitleId},
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Copy counters of a title together with its hold and queue counts
    pub async fn title_availability(&self, title_id: TitleId) -> AppResult<TitleAvailability> {
        let mut tx = self.repository.begin().await?;
        let title = tx.title(title_id).await?;
        let held_copies = tx.count_held(title_id).await?;
        let queue_length = tx.pending_queue(title_id).await?.len() as i64;

        Ok(TitleAvailability {
            title_id,
            total_copies: title.total_copies,
            available_copies: title.available_copies,
            held_copies,
            queue_length,
        })
    }
}
