//! Settings repository (singleton row)

use async_trait::async_trait;

use super::{PgTransaction, SettingsStore};
use crate::{error::AppResult, models::LibrarySettings};

#[async_trait]
impl SettingsStore for PgTransaction {
    async fn settings(&mut self) -> AppResult<Option<LibrarySettings>> {
        let settings = sqlx::query_as::<_, LibrarySettings>(
            r#"
            SELECT daily_rate, max_loan_days, max_renewals, max_loans_per_user, reservation_hold_days
            FROM settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(self.conn()?)
        .await?;
        Ok(settings)
    }

    async fn save_settings(&mut self, settings: &LibrarySettings) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, daily_rate, max_loan_days, max_renewals, max_loans_per_user, reservation_hold_days)
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                daily_rate = EXCLUDED.daily_rate,
                max_loan_days = EXCLUDED.max_loan_days,
                max_renewals = EXCLUDED.max_renewals,
                max_loans_per_user = EXCLUDED.max_loans_per_user,
                reservation_hold_days = EXCLUDED.reservation_hold_days
            "#,
        )
        .bind(settings.daily_rate)
        .bind(settings.max_loan_days)
        .bind(settings.max_renewals)
        .bind(settings.max_loans_per_user)
        .bind(settings.reservation_hold_days)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }
}
