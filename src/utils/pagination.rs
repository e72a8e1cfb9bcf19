use serde::{Deserialize, Serialize};
use sqlx::{FromRow, MySqlPool, mysql::MySqlRow};
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use crate::utils::db_utils::{SqlValue, to_arguments};
use crate::model::{
    correction::Correction, leave_request::LeaveRequest, notification::Notification,
    payroll::PayrollSlip, shift_change::ShiftChangeRequest, user::UserProfile,
};

#[derive(Debug, Clone, Copy, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page number, starting at 1
    #[schema(example = 1)]
    pub page: Option<u32>,
    /// Items per page (max 100)
    #[schema(example = 20)]
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn resolve(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, u64) {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(20).clamp(1, 100);
        let offset = u64::from(page - 1) * u64::from(per_page);
        (page, per_page, offset)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[aliases(
    UserPage = Paginated<UserProfile>,
    LeavePage = Paginated<LeaveRequest>,
    CorrectionPage = Paginated<Correction>,
    ShiftChangePage = Paginated<ShiftChangeRequest>,
    PayrollPage = Paginated<PayrollSlip>,
    NotificationPage = Paginated<Notification>
)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Paginated<T> {
    /// Converts rows while keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

/// Filtered listing over one table or join.
pub struct ListSql<'a> {
    pub columns: &'a str,
    /// Everything between FROM and WHERE, joins included.
    pub from: &'a str,
    pub conditions: Vec<String>,
    pub values: Vec<SqlValue>,
    pub order_by: &'a str,
}

impl<'a> ListSql<'a> {
    pub fn new(columns: &'a str, from: &'a str, order_by: &'a str) -> Self {
        Self {
            columns,
            from,
            conditions: Vec::new(),
            values: Vec::new(),
            order_by,
        }
    }

    pub fn push(&mut self, condition: impl Into<String>, value: SqlValue) {
        self.conditions.push(condition.into());
        self.values.push(value);
    }

    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub async fn fetch_page<T>(
        self,
        pool: &MySqlPool,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Paginated<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, MySqlRow> + Send + Unpin,
    {
        let (page, per_page, offset) = PageQuery::resolve(page, per_page);
        let where_clause = self.where_clause();

        let count_sql = format!("SELECT COUNT(*) FROM {} {}", self.from, where_clause);
        debug!(sql = %count_sql, bindings = ?self.values, "Counting rows");
        let total = sqlx::query_scalar_with::<_, i64, _>(&count_sql, to_arguments(self.values.clone()))
            .fetch_one(pool)
            .await?;

        let data_sql = format!(
            "SELECT {} FROM {} {} ORDER BY {} LIMIT ? OFFSET ?",
            self.columns, self.from, where_clause, self.order_by
        );
        debug!(sql = %data_sql, page, per_page, offset, "Fetching page");
        let mut values = self.values;
        values.push(SqlValue::U64(u64::from(per_page)));
        values.push(SqlValue::U64(offset));
        let data = sqlx::query_as_with::<_, T, _>(&data_sql, to_arguments(values))
            .fetch_all(pool)
            .await?;

        Ok(Paginated {
            data,
            page,
            per_page,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        assert_eq!(PageQuery::resolve(None, None), (1, 20, 0));
        assert_eq!(PageQuery::resolve(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(PageQuery::resolve(Some(3), Some(10)), (3, 10, 20));
    }

    #[test]
    fn where_clause_joins_conditions() {
        let mut sql = ListSql::new("*", "leave_requests", "id DESC");
        assert_eq!(sql.where_clause(), "");
        sql.push("status = ?", SqlValue::String("pending".into()));
        sql.push("user_id = ?", SqlValue::U64(7));
        assert_eq!(sql.where_clause(), "WHERE status = ? AND user_id = ?");
        assert_eq!(sql.values.len(), 2);
    }
}
