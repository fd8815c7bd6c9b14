//! Reservations repository

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{PgTransaction, ReservationStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        NewReservation, Reservation, ReservationFilter, ReservationId, ReservationStatus, TitleId,
        UserId,
    },
};

const RESERVATION_COLUMNS: &str =
    "id, title_id, user_id, created_at, expires_at, status, fulfilled_at, loan_id";

#[async_trait]
impl ReservationStore for PgTransaction {
    async fn insert_reservation(&mut self, reservation: &NewReservation) -> AppResult<Reservation> {
        let query = format!(
            r#"
            INSERT INTO reservations (title_id, user_id, created_at, expires_at, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        // The partial unique index on (title_id, user_id) maps to AlreadyReserved
        let created = sqlx::query_as::<_, Reservation>(&query)
            .bind(reservation.title_id)
            .bind(reservation.user_id)
            .bind(reservation.created_at)
            .bind(reservation.expires_at)
            .bind(ReservationStatus::Pending)
            .fetch_one(self.conn()?)
            .await?;
        Ok(created)
    }

    async fn reservation(&mut self, id: ReservationId) -> AppResult<Reservation> {
        let query = format!(
            "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        );
        sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE reservations SET
                expires_at = $2, status = $3, fulfilled_at = $4, loan_id = $5
            WHERE id = $1
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.expires_at)
        .bind(reservation.status)
        .bind(reservation.fulfilled_at)
        .bind(reservation.loan_id)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn active_reservation(
        &mut self,
        user_id: UserId,
        title_id: TitleId,
    ) -> AppResult<Option<Reservation>> {
        let query = format!(
            r#"
            SELECT {} FROM reservations
            WHERE user_id = $1 AND title_id = $2 AND status IN ('pending', 'fulfilled')
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        );
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(user_id)
            .bind(title_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(reservation)
    }

    async fn pending_queue(&mut self, title_id: TitleId) -> AppResult<Vec<Reservation>> {
        let query = format!(
            r#"
            SELECT {} FROM reservations
            WHERE title_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            "#,
            RESERVATION_COLUMNS
        );
        let queue = sqlx::query_as::<_, Reservation>(&query)
            .bind(title_id)
            .fetch_all(self.conn()?)
            .await?;
        Ok(queue)
    }

    async fn queue_head(&mut self, title_id: TitleId) -> AppResult<Option<Reservation>> {
        let query = format!(
            r#"
            SELECT {} FROM reservations
            WHERE title_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        );
        let head = sqlx::query_as::<_, Reservation>(&query)
            .bind(title_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(head)
    }

    async fn count_held(&mut self, title_id: TitleId) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE title_id = $1 AND status = 'fulfilled'",
        )
        .bind(title_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(count)
    }

    async fn reservations_for_user(
        &mut self,
        user_id: UserId,
        filter: &ReservationFilter,
    ) -> AppResult<Vec<Reservation>> {
        let mut conditions = vec!["user_id = $1".to_string()];
        if filter.status.is_some() {
            conditions.push("status = $2".to_string());
        }
        if filter.active_only {
            conditions.push("status IN ('pending', 'fulfilled')".to_string());
        }

        let query = format!(
            "SELECT {} FROM reservations WHERE {} ORDER BY created_at DESC, id DESC",
            RESERVATION_COLUMNS,
            conditions.join(" AND ")
        );
        let mut builder = sqlx::query_as::<_, Reservation>(&query).bind(user_id);
        if let Some(status) = filter.status {
            builder = builder.bind(status);
        }
        Ok(builder.fetch_all(self.conn()?).await?)
    }

    async fn reservations_past_expiry(
        &mut self,
        status: ReservationStatus,
        today: NaiveDate,
        after: ReservationId,
        limit: i64,
    ) -> AppResult<Vec<Reservation>> {
        let query = format!(
            r#"
            SELECT {} FROM reservations
            WHERE status = $1 AND expires_at < $2 AND id > $3
            ORDER BY id
            LIMIT $4
            "#,
            RESERVATION_COLUMNS
        );
        let expired = sqlx::query_as::<_, Reservation>(&query)
            .bind(status)
            .bind(today)
            .bind(after)
            .bind(limit)
            .fetch_all(self.conn()?)
            .await?;
        Ok(expired)
    }

    async fn count_reservations(&mut self, status: ReservationStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE status = $1")
            .bind(status)
            .fetch_one(self.conn()?)
            .await?;
        Ok(count)
    }
}
