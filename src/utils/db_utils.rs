use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use sqlx::{Arguments, MySqlPool, mysql::MySqlArguments};

use crate::error::{ApiError, ApiResult};

/// SQL bindable value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Null,
}

/// Expected shape of an updatable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Int,
    Float,
    Bool,
    Date,
    Time,
    DateTime,
}

/// A column a PATCH-style payload may touch.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
        }
    }
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

fn convert(column: &Column, value: &Value) -> ApiResult<SqlValue> {
    let bad = || ApiError::validation(format!("Invalid value for {}", column.name));

    if value.is_null() {
        return if column.nullable {
            Ok(SqlValue::Null)
        } else {
            Err(ApiError::validation(format!("{} cannot be null", column.name)))
        };
    }

    let converted = match column.kind {
        ColumnKind::Text => SqlValue::String(value.as_str().ok_or_else(bad)?.to_string()),
        ColumnKind::Int => match (value.as_u64(), value.as_i64()) {
            (Some(u), _) => SqlValue::U64(u),
            (None, Some(i)) => SqlValue::I64(i),
            _ => return Err(bad()),
        },
        ColumnKind::Float => SqlValue::F64(value.as_f64().filter(|f| f.is_finite()).ok_or_else(bad)?),
        ColumnKind::Bool => SqlValue::Bool(value.as_bool().ok_or_else(bad)?),
        ColumnKind::Date => SqlValue::Date(
            NaiveDate::parse_from_str(value.as_str().ok_or_else(bad)?, "%Y-%m-%d")
                .map_err(|_| bad())?,
        ),
        ColumnKind::Time => {
            let raw = value.as_str().ok_or_else(bad)?;
            SqlValue::Time(
                NaiveTime::parse_from_str(raw, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                    .map_err(|_| bad())?,
            )
        }
        ColumnKind::DateTime => SqlValue::DateTime(
            NaiveDateTime::parse_from_str(value.as_str().ok_or_else(bad)?, "%Y-%m-%dT%H:%M:%S")
                .map_err(|_| bad())?,
        ),
    };
    Ok(converted)
}

/// Builds `UPDATE <table> SET ... WHERE <id_column> = ?` from a JSON object.
///
/// Only keys listed in `allowed` are accepted; any other key is a validation
/// error, so column names never come from the client verbatim.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed: &[Column],
    id_column: &str,
    id_value: u64,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::validation("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ApiError::validation("No fields provided for update"));
    }

    let mut assignments = Vec::with_capacity(obj.len());
    let mut values = Vec::with_capacity(obj.len() + 1);

    for (key, value) in obj {
        let column = allowed
            .iter()
            .find(|c| c.name == key)
            .ok_or_else(|| ApiError::validation(format!("Field {key} cannot be updated")))?;
        assignments.push(format!("{} = ?", column.name));
        values.push(convert(column, value)?);
    }

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        table,
        assignments.join(", "),
        id_column
    );

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

/// Packs values into positional MySQL arguments, in order.
pub fn to_arguments(values: Vec<SqlValue>) -> MySqlArguments {
    let mut args = MySqlArguments::default();
    for value in values {
        match value {
            SqlValue::String(v) => args.add(v),
            SqlValue::I64(v) => args.add(v),
            SqlValue::U64(v) => args.add(v),
            SqlValue::F64(v) => args.add(v),
            SqlValue::Bool(v) => args.add(v),
            SqlValue::Date(v) => args.add(v),
            SqlValue::Time(v) => args.add(v),
            SqlValue::DateTime(v) => args.add(v),
            SqlValue::Null => args.add(None::<String>),
        }
    }
    args
}

/// `?, ?, ?` for an IN list of `n` items. `n` must be non-zero.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Executes the update and returns rows affected.
pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query_with(&update.sql, to_arguments(update.values))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column::new("name", ColumnKind::Text),
        Column::nullable("address", ColumnKind::Text),
        Column::new("radius_m", ColumnKind::Float),
        Column::new("is_active", ColumnKind::Bool),
        Column::new("start_time", ColumnKind::Time),
    ];

    #[test]
    fn builds_set_clause_in_payload_order() {
        let update = build_update_sql(
            "outlets",
            &json!({ "name": "Braga", "radius_m": 120.5 }),
            COLUMNS,
            "id",
            4,
        )
        .unwrap();
        assert!(update.sql.starts_with("UPDATE outlets SET "));
        assert!(update.sql.ends_with(" WHERE id = ?"));
        assert!(update.sql.contains("name = ?"));
        assert!(update.sql.contains("radius_m = ?"));
        assert_eq!(update.values.len(), 3);
        assert_eq!(update.values.last(), Some(&SqlValue::U64(4)));
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let err = build_update_sql(
            "outlets",
            &json!({ "id = 1; DROP TABLE users; --": 1 }),
            COLUMNS,
            "id",
            1,
        )
        .unwrap_err();
        assert!(err.message.contains("cannot be updated"));
    }

    #[test]
    fn type_and_null_checks() {
        assert!(build_update_sql("outlets", &json!({ "radius_m": "wide" }), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("outlets", &json!({ "name": null }), COLUMNS, "id", 1).is_err());
        let ok = build_update_sql("outlets", &json!({ "address": null }), COLUMNS, "id", 1).unwrap();
        assert_eq!(ok.values[0], SqlValue::Null);
    }

    #[test]
    fn time_accepts_short_form() {
        let update =
            build_update_sql("shifts", &json!({ "start_time": "07:30" }), COLUMNS, "id", 1).unwrap();
        assert_eq!(
            update.values[0],
            SqlValue::Time(NaiveTime::from_hms_opt(7, 30, 0).unwrap())
        );
    }

    #[test]
    fn placeholders_for_in_lists() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn empty_or_non_object_payloads_fail() {
        assert!(build_update_sql("outlets", &json!({}), COLUMNS, "id", 1).is_err());
        assert!(build_update_sql("outlets", &json!([1, 2]), COLUMNS, "id", 1).is_err());
    }
}
