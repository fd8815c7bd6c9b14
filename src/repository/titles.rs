//! Title counters on Postgres

use async_trait::async_trait;

use super::{PgTransaction, TitleStore};
use crate::{
    error::{AppError, AppResult},
    models::{CopyCounts, Title, TitleId},
};

impl PgTransaction {
    async fn title_exists(&mut self, id: TitleId) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)")
            .bind(id)
            .fetch_one(self.conn()?)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl TitleStore for PgTransaction {
    async fn title(&mut self, id: TitleId) -> AppResult<Title> {
        sqlx::query_as::<_, Title>(
            "SELECT id, name, total_copies, available_copies FROM titles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Title with id {} not found", id)))
    }

    async fn try_reserve_copy(&mut self, id: TitleId) -> AppResult<bool> {
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE titles SET available_copies = available_copies - 1
            WHERE id = $1 AND available_copies > 0
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;

        if updated.is_some() {
            Ok(true)
        } else if self.title_exists(id).await? {
            Ok(false)
        } else {
            Err(AppError::NotFound(format!("Title with id {} not found", id)))
        }
    }

    async fn release_copy(&mut self, id: TitleId) -> AppResult<()> {
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE titles SET available_copies = available_copies + 1
            WHERE id = $1 AND available_copies < total_copies
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;

        if updated.is_some() {
            Ok(())
        } else if self.title_exists(id).await? {
            Err(AppError::Internal(format!(
                "Releasing a copy of title {} would exceed its total copies",
                id
            )))
        } else {
            Err(AppError::NotFound(format!("Title with id {} not found", id)))
        }
    }

    async fn retire_copy(&mut self, id: TitleId) -> AppResult<()> {
        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE titles SET total_copies = total_copies - 1
            WHERE id = $1 AND total_copies > available_copies
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn()?)
        .await?;

        if updated.is_some() {
            Ok(())
        } else if self.title_exists(id).await? {
            Err(AppError::Internal(format!(
                "Title {} has no copy out on loan to retire",
                id
            )))
        } else {
            Err(AppError::NotFound(format!("Title with id {} not found", id)))
        }
    }

    async fn observe(&mut self, id: TitleId) -> AppResult<CopyCounts> {
        let title = self.title(id).await?;
        Ok(CopyCounts {
            total: title.total_copies,
            available: title.available_copies,
        })
    }
}
