//! Data models for the lending engine

pub mod fee;
pub mod loan;
pub mod reservation;
pub mod settings;
pub mod title;
pub mod user;

pub type TitleId = i64;
pub type UserId = i64;
pub type LoanId = i64;
pub type ReservationId = i64;

// Re-export commonly used types
pub use fee::{FeeFilter, FeeLedger, FeeStatus, LateFee};
pub use loan::{Loan, LoanFilter, LoanStatus, NewLoan};
pub use reservation::{NewReservation, QueueEntry, Reservation, ReservationFilter, ReservationStatus};
pub use settings::{LibrarySettings, UpdateSettings};
pub use title::{CopyCounts, Title, TitleAvailability};
pub use user::{Actor, Role, UserClaims};

/// Status enums are stored as lowercase TEXT columns.
macro_rules! text_column_enum {
    ($ty:ty) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use text_column_enum;
