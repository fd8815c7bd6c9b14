//! Late fees repository

use async_trait::async_trait;

use super::{FeeStore, PgTransaction};
use crate::{
    error::AppResult,
    models::{FeeFilter, LateFee, LoanId},
};

const FEE_SELECT: &str = r#"
    SELECT f.loan_id, l.user_id, l.title_id, f.amount, f.days_overdue, f.status, f.paid_at,
           f.waived_by, f.waived_reason, f.waiver_request, f.waiver_rejection,
           f.created_at, f.updated_at
    FROM late_fees f
    JOIN loans l ON l.id = f.loan_id
"#;

#[async_trait]
impl FeeStore for PgTransaction {
    async fn fee(&mut self, loan_id: LoanId) -> AppResult<Option<LateFee>> {
        let query = format!("{} WHERE f.loan_id = $1 FOR UPDATE OF f", FEE_SELECT);
        let fee = sqlx::query_as::<_, LateFee>(&query)
            .bind(loan_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(fee)
    }

    async fn insert_fee(&mut self, fee: &LateFee) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO late_fees (
                loan_id, amount, days_overdue, status, paid_at, waived_by, waived_reason,
                waiver_request, waiver_rejection, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(fee.loan_id)
        .bind(fee.amount)
        .bind(fee.days_overdue)
        .bind(fee.status)
        .bind(fee.paid_at)
        .bind(fee.waived_by)
        .bind(&fee.waived_reason)
        .bind(&fee.waiver_request)
        .bind(&fee.waiver_rejection)
        .bind(fee.created_at)
        .bind(fee.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn update_fee(&mut self, fee: &LateFee) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE late_fees SET
                amount = $2, days_overdue = $3, status = $4, paid_at = $5, waived_by = $6,
                waived_reason = $7, waiver_request = $8, waiver_rejection = $9, updated_at = $10
            WHERE loan_id = $1
            "#,
        )
        .bind(fee.loan_id)
        .bind(fee.amount)
        .bind(fee.days_overdue)
        .bind(fee.status)
        .bind(fee.paid_at)
        .bind(fee.waived_by)
        .bind(&fee.waived_reason)
        .bind(&fee.waiver_request)
        .bind(&fee.waiver_rejection)
        .bind(fee.updated_at)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn delete_fee(&mut self, loan_id: LoanId) -> AppResult<()> {
        sqlx::query("DELETE FROM late_fees WHERE loan_id = $1")
            .bind(loan_id)
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn fees(&mut self, filter: &FeeFilter) -> AppResult<Vec<LateFee>> {
        let mut conditions = Vec::new();
        let mut idx = 1;

        if filter.status.is_some() {
            conditions.push(format!("f.status = ${}", idx));
            idx += 1;
        }
        if filter.user_id.is_some() {
            conditions.push(format!("l.user_id = ${}", idx));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "{} {} ORDER BY f.created_at DESC, f.loan_id DESC",
            FEE_SELECT, where_clause
        );
        let mut builder = sqlx::query_as::<_, LateFee>(&query);
        if let Some(status) = filter.status {
            builder = builder.bind(status);
        }
        if let Some(user_id) = filter.user_id {
            builder = builder.bind(user_id);
        }
        Ok(builder.fetch_all(self.conn()?).await?)
    }
}
