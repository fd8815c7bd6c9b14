//! Loans repository for database operations

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{LoanStore, PgTransaction};
use crate::{
    error::{AppError, AppResult},
    models::{Loan, LoanFilter, LoanId, LoanStatus, NewLoan, TitleId, UserId},
};

const LOAN_COLUMNS: &str = "id, title_id, user_id, loan_date, due_date, return_date, status, \
                            renewals, late_fee_settled, lost_reason";

#[async_trait]
impl LoanStore for PgTransaction {
    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let query = format!(
            r#"
            INSERT INTO loans (title_id, user_id, loan_date, due_date, status, renewals, late_fee_settled)
            VALUES ($1, $2, $3, $4, $5, 0, FALSE)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        );
        let created = sqlx::query_as::<_, Loan>(&query)
            .bind(loan.title_id)
            .bind(loan.user_id)
            .bind(loan.loan_date)
            .bind(loan.due_date)
            .bind(LoanStatus::Borrowed)
            .fetch_one(self.conn()?)
            .await?;
        Ok(created)
    }

    async fn loan(&mut self, id: LoanId) -> AppResult<Loan> {
        let query = format!("SELECT {} FROM loans WHERE id = $1 FOR UPDATE", LOAN_COLUMNS);
        sqlx::query_as::<_, Loan>(&query)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn update_loan(&mut self, loan: &Loan) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE loans SET
                due_date = $2, return_date = $3, status = $4, renewals = $5,
                late_fee_settled = $6, lost_reason = $7
            WHERE id = $1
            "#,
        )
        .bind(loan.id)
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.status)
        .bind(loan.renewals)
        .bind(loan.late_fee_settled)
        .bind(&loan.lost_reason)
        .execute(self.conn()?)
        .await?;
        Ok(())
    }

    async fn active_loan(&mut self, user_id: UserId, title_id: TitleId) -> AppResult<Option<Loan>> {
        let query = format!(
            r#"
            SELECT {} FROM loans
            WHERE user_id = $1 AND title_id = $2 AND status IN ('borrowed', 'overdue')
            FOR UPDATE
            "#,
            LOAN_COLUMNS
        );
        let loan = sqlx::query_as::<_, Loan>(&query)
            .bind(user_id)
            .bind(title_id)
            .fetch_optional(self.conn()?)
            .await?;
        Ok(loan)
    }

    async fn count_active_loans(&mut self, user_id: UserId) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE user_id = $1 AND status IN ('borrowed', 'overdue')",
        )
        .bind(user_id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(count)
    }

    async fn loans_for_user(&mut self, user_id: UserId, filter: &LoanFilter) -> AppResult<Vec<Loan>> {
        let mut conditions = vec!["user_id = $1".to_string()];
        if filter.status.is_some() {
            conditions.push("status = $2".to_string());
        }
        if filter.active_only {
            conditions.push("status IN ('borrowed', 'overdue')".to_string());
        }

        let query = format!(
            "SELECT {} FROM loans WHERE {} ORDER BY loan_date DESC, id DESC",
            LOAN_COLUMNS,
            conditions.join(" AND ")
        );
        let mut builder = sqlx::query_as::<_, Loan>(&query).bind(user_id);
        if let Some(status) = filter.status {
            builder = builder.bind(status);
        }
        Ok(builder.fetch_all(self.conn()?).await?)
    }

    async fn loans_past_due(
        &mut self,
        today: NaiveDate,
        after: LoanId,
        limit: i64,
    ) -> AppResult<Vec<Loan>> {
        let query = format!(
            r#"
            SELECT {} FROM loans
            WHERE status IN ('borrowed', 'overdue') AND due_date < $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "#,
            LOAN_COLUMNS
        );
        let loans = sqlx::query_as::<_, Loan>(&query)
            .bind(today)
            .bind(after)
            .bind(limit)
            .fetch_all(self.conn()?)
            .await?;
        Ok(loans)
    }

    async fn loans_due_between(&mut self, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<Loan>> {
        let query = format!(
            r#"
            SELECT {} FROM loans
            WHERE status = 'borrowed' AND due_date BETWEEN $1 AND $2
            ORDER BY due_date, id
            "#,
            LOAN_COLUMNS
        );
        let loans = sqlx::query_as::<_, Loan>(&query)
            .bind(from)
            .bind(to)
            .fetch_all(self.conn()?)
            .await?;
        Ok(loans)
    }

    async fn count_loans(&mut self, status: LoanStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE status = $1")
            .bind(status)
            .fetch_one(self.conn()?)
            .await?;
        Ok(count)
    }
}
