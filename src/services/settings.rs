//! Settings service

use crate::{
    error::AppResult,
    models::{LibrarySettings, UpdateSettings},
    repository::{Repository, Transaction},
};

/// Current policy, creating the default record on first use
pub(crate) async fn current(tx: &mut dyn Transaction) -> AppResult<LibrarySettings> {
    if let Some(settings) = tx.settings().await? {
        return Ok(settings);
    }
    let settings = LibrarySettings::default();
    tx.save_settings(&settings).await?;
    tracing::info!("Created default library settings");
    Ok(settings)
}

#[derive(Clone)]
pub struct SettingsService {
    repository: Repository,
}

impl SettingsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get current settings
    pub async fn get_settings(&self) -> AppResult<LibrarySettings> {
        let mut tx = self.repository.begin().await?;
        let settings = current(tx.as_mut()).await?;
        tx.commit().await?;
        Ok(settings)
    }

    /// Update settings; absent fields keep their current value
    pub async fn update_settings(&self, update: &UpdateSettings) -> AppResult<LibrarySettings> {
        let mut tx = self.repository.begin().await?;
        let existing = current(tx.as_mut()).await?;
        let settings = update.apply_to(&existing)?;
        tx.save_settings(&settings).await?;
        tx.commit().await?;

        tracing::info!(
            daily_rate = %settings.daily_rate,
            max_loan_days = settings.max_loan_days,
            max_renewals = settings.max_renewals,
            max_loans_per_user = settings.max_loans_per_user,
            reservation_hold_days = settings.reservation_hold_days,
            "Library settings updated"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, sync::Arc};

    use rust_decimal::Decimal;

    use super::*;
    use crate::repository::MemoryStore;

    fn service() -> SettingsService {
        SettingsService::new(Repository::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_get_creates_defaults() {
        let service = service();
        assert_eq!(service.get_settings().await.unwrap(), LibrarySettings::default());
    }

    #[tokio::test]
    async fn test_update_is_visible_to_next_read() {
        let service = service();
        let update = UpdateSettings {
            daily_rate: Some(Decimal::from_str("0.25").unwrap()),
            max_renewals: Some(4),
            ..Default::default()
        };
        service.update_settings(&update).await.unwrap();

        let settings = service.get_settings().await.unwrap();
        assert_eq!(settings.daily_rate, Decimal::from_str("0.25").unwrap());
        assert_eq!(settings.max_renewals, 4);
        assert_eq!(settings.max_loan_days, 14);
    }

    #[tokio::test]
    async fn test_invalid_update_keeps_previous_values() {
        let service = service();
        let update = UpdateSettings {
            max_loans_per_user: Some(0),
            ..Default::default()
        };
        assert!(service.update_settings(&update).await.is_err());
        assert_eq!(service.get_settings().await.unwrap(), LibrarySettings::default());
    }
}
