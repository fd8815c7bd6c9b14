//! Library lending policy

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Process-wide policy record (a single row in the store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LibrarySettings {
    /// Late fee charged per overdue day
    #[schema(value_type = String, example = "0.50")]
    pub daily_rate: Decimal,
    /// Loan duration in days
    pub max_loan_days: i32,
    /// Renewals allowed per loan
    pub max_renewals: i32,
    /// Simultaneous active loans per user
    pub max_loans_per_user: i32,
    /// Days a reservation stays valid
    pub reservation_hold_days: i32,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            daily_rate: Decimal::new(50, 2),
            max_loan_days: 14,
            max_renewals: 2,
            max_loans_per_user: 5,
            reservation_hold_days: 3,
        }
    }
}

/// Partial settings update; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSettings {
    #[schema(value_type = Option<String>, example = "0.50")]
    pub daily_rate: Option<Decimal>,
    #[validate(range(min = 1, max = 365, message = "Loan duration must be between 1 and 365 days"))]
    pub max_loan_days: Option<i32>,
    #[validate(range(min = 0, max = 100, message = "Renewals must be between 0 and 100"))]
    pub max_renewals: Option<i32>,
    #[validate(range(min = 1, max = 1000, message = "Loan cap must be between 1 and 1000"))]
    pub max_loans_per_user: Option<i32>,
    #[validate(range(min = 1, max = 365, message = "Hold duration must be between 1 and 365 days"))]
    pub reservation_hold_days: Option<i32>,
}

impl UpdateSettings {
    /// Validate and merge onto the current settings
    pub fn apply_to(&self, current: &LibrarySettings) -> AppResult<LibrarySettings> {
        self.validate()?;
        if let Some(rate) = self.daily_rate {
            if rate.is_sign_negative() {
                return Err(AppError::Validation("Daily rate must not be negative".to_string()));
            }
            if rate.normalize().scale() > 2 {
                return Err(AppError::Validation(
                    "Daily rate must have at most two decimal places".to_string(),
                ));
            }
        }

        Ok(LibrarySettings {
            daily_rate: self.daily_rate.unwrap_or(current.daily_rate),
            max_loan_days: self.max_loan_days.unwrap_or(current.max_loan_days),
            max_renewals: self.max_renewals.unwrap_or(current.max_renewals),
            max_loans_per_user: self.max_loans_per_user.unwrap_or(current.max_loans_per_user),
            reservation_hold_days: self
                .reservation_hold_days
                .unwrap_or(current.reservation_hold_days),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_defaults() {
        let settings = LibrarySettings::default();
        assert_eq!(settings.daily_rate, Decimal::from_str("0.50").unwrap());
        assert_eq!(settings.max_loan_days, 14);
        assert_eq!(settings.max_renewals, 2);
        assert_eq!(settings.max_loans_per_user, 5);
        assert_eq!(settings.reservation_hold_days, 3);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let update = UpdateSettings {
            max_loan_days: Some(21),
            ..Default::default()
        };
        let merged = update.apply_to(&LibrarySettings::default()).unwrap();
        assert_eq!(merged.max_loan_days, 21);
        assert_eq!(merged.max_renewals, 2);
    }

    #[test]
    fn test_update_rejects_bad_values() {
        let negative = UpdateSettings {
            daily_rate: Some(Decimal::from_str("-0.10").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            negative.apply_to(&LibrarySettings::default()),
            Err(AppError::Validation(_))
        ));

        let fractional = UpdateSettings {
            daily_rate: Some(Decimal::from_str("0.125").unwrap()),
            ..Default::default()
        };
        assert!(fractional.apply_to(&LibrarySettings::default()).is_err());

        let zero_days = UpdateSettings {
            max_loan_days: Some(0),
            ..Default::default()
        };
        assert!(zero_days.apply_to(&LibrarySettings::default()).is_err());
    }
}
