//! Assembles `DayContext`s for one or many users over a date range.
//!
//! Every attendance read goes through here so the derived status is computed
//! the same way for the daily snapshot, history, team views and dashboards.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::MySqlPool;
use tracing::{debug, info};

use crate::{
    config::Config,
    domain::{
        attendance::{DayContext, PunchDay, ShiftWindow, punch_day},
        leave::covers,
    },
    error::ApiResult,
    model::attendance::{ATTENDANCE_COLUMNS, AttendanceRecord, AttendanceStatus},
    utils::db_utils::{SqlValue, placeholders, to_arguments},
};

/// One user's day with the stored row, if any.
#[derive(Debug, Clone)]
pub struct DayBundle {
    pub ctx: DayContext,
    pub shift_id: Option<u64>,
    pub record: Option<AttendanceRecord>,
}

#[derive(Debug, sqlx::FromRow)]
struct ScheduleRow {
    user_id: u64,
    date: NaiveDate,
    shift_id: Option<u64>,
    is_off: bool,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    late_tolerance_minutes: Option<i32>,
}

impl ScheduleRow {
    fn window(&self) -> Option<ShiftWindow> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if !self.is_off => Some(ShiftWindow {
                start,
                end,
                late_tolerance_minutes: i64::from(self.late_tolerance_minutes.unwrap_or(0)),
            }),
            _ => None,
        }
    }
}

fn ids_and_range(user_ids: &[u64], from: NaiveDate, to: NaiveDate) -> Vec<SqlValue> {
    let mut values: Vec<SqlValue> = user_ids.iter().map(|id| SqlValue::U64(*id)).collect();
    values.push(SqlValue::Date(from));
    values.push(SqlValue::Date(to));
    values
}

/// Loads every (user, date) pair in `from..=to` for `user_ids`.
pub async fn load_days(
    pool: &MySqlPool,
    user_ids: &[u64],
    from: NaiveDate,
    to: NaiveDate,
) -> ApiResult<HashMap<(u64, NaiveDate), DayBundle>> {
    let mut days = HashMap::new();
    if user_ids.is_empty() || from > to {
        return Ok(days);
    }
    let ids = placeholders(user_ids.len());

    let schedule_sql = format!(
        r#"
        SELECT sc.user_id, sc.date, sc.shift_id, sc.is_off,
               sh.start_time, sh.end_time, sh.late_tolerance_minutes
        FROM shift_schedules sc
        LEFT JOIN shifts sh ON sh.id = sc.shift_id
        WHERE sc.user_id IN ({ids}) AND sc.date BETWEEN ? AND ?
        "#
    );
    let schedules = sqlx::query_as_with::<_, ScheduleRow, _>(
        &schedule_sql,
        to_arguments(ids_and_range(user_ids, from, to)),
    )
    .fetch_all(pool)
    .await?;

    let record_sql = format!(
        "SELECT {ATTENDANCE_COLUMNS} FROM attendance WHERE user_id IN ({ids}) AND date BETWEEN ? AND ?"
    );
    let records = sqlx::query_as_with::<_, AttendanceRecord, _>(
        &record_sql,
        to_arguments(ids_and_range(user_ids, from, to)),
    )
    .fetch_all(pool)
    .await?;

    // ranges overlapping [from, to]: start <= to AND end >= from
    let leave_sql = format!(
        r#"
        SELECT user_id, start_date, end_date
        FROM leave_requests
        WHERE user_id IN ({ids}) AND status = 'approved' AND end_date >= ? AND start_date <= ?
        "#
    );
    let leaves = sqlx::query_as_with::<_, (u64, NaiveDate, NaiveDate), _>(
        &leave_sql,
        to_arguments(ids_and_range(user_ids, from, to)),
    )
    .fetch_all(pool)
    .await?;

    let correction_sql = format!(
        r#"
        SELECT DISTINCT user_id, date
        FROM corrections
        WHERE user_id IN ({ids}) AND status = 'pending' AND date BETWEEN ? AND ?
        "#
    );
    let pending: HashSet<(u64, NaiveDate)> = sqlx::query_as_with::<_, (u64, NaiveDate), _>(
        &correction_sql,
        to_arguments(ids_and_range(user_ids, from, to)),
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    debug!(
        users = user_ids.len(),
        %from,
        %to,
        schedules = schedules.len(),
        records = records.len(),
        "Loaded attendance days"
    );

    let schedules: HashMap<(u64, NaiveDate), ScheduleRow> = schedules
        .into_iter()
        .map(|row| ((row.user_id, row.date), row))
        .collect();
    let mut records: HashMap<(u64, NaiveDate), AttendanceRecord> = records
        .into_iter()
        .map(|row| ((row.user_id, row.date), row))
        .collect();

    for &user_id in user_ids {
        let mut date = from;
        while date <= to {
            let key = (user_id, date);
            let schedule = schedules.get(&key);
            let record = records.remove(&key);

            let ctx = DayContext {
                date,
                shift: schedule.and_then(ScheduleRow::window),
                check_in_at: record.as_ref().and_then(|r| r.check_in_at),
                check_out_at: record.as_ref().and_then(|r| r.check_out_at),
                on_leave: leaves
                    .iter()
                    .any(|(uid, start, end)| *uid == user_id && covers(*start, *end, date)),
                scheduled_off: schedule.is_some_and(|s| s.is_off),
                correction_pending: pending.contains(&key),
                marked_absent: record.as_ref().is_some_and(AttendanceRecord::marked_absent),
            };
            let shift_id = schedule
                .and_then(|s| s.shift_id)
                .or_else(|| record.as_ref().and_then(|r| r.shift_id));

            days.insert(
                key,
                DayBundle {
                    ctx,
                    shift_id,
                    record,
                },
            );
            date += Duration::days(1);
        }
    }

    Ok(days)
}

fn empty_bundle(date: NaiveDate) -> DayBundle {
    DayBundle {
        ctx: DayContext {
            date,
            ..DayContext::default()
        },
        shift_id: None,
        record: None,
    }
}

pub async fn load_day(pool: &MySqlPool, user_id: u64, date: NaiveDate) -> ApiResult<DayBundle> {
    let mut days = load_days(pool, &[user_id], date, date).await?;
    Ok(days
        .remove(&(user_id, date))
        .unwrap_or_else(|| empty_bundle(date)))
}

/// The day a punch at `now` belongs to; see [`punch_day`].
pub async fn active_day(pool: &MySqlPool, user_id: u64, now: NaiveDateTime) -> ApiResult<DayBundle> {
    let today = now.date();
    let yesterday = today - Duration::days(1);
    let mut days = load_days(pool, &[user_id], yesterday, today).await?;

    let today_bundle = days
        .remove(&(user_id, today))
        .unwrap_or_else(|| empty_bundle(today));
    let yesterday_bundle = days
        .remove(&(user_id, yesterday))
        .unwrap_or_else(|| empty_bundle(yesterday));

    Ok(match punch_day(&yesterday_bundle.ctx, &today_bundle.ctx, now) {
        PunchDay::Yesterday => yesterday_bundle,
        PunchDay::Today => today_bundle,
    })
}

/// Marks scheduled days whose shift has ended without a check-in as
/// `mangkir`. Returns how many rows were written.
///
/// Looks back over the correction window so a restart never leaves gaps.
pub async fn mark_absent_days(pool: &MySqlPool, config: &Config) -> ApiResult<u64> {
    let now = config.local_now();
    let today = now.date();
    let from = today - Duration::days(config.correction_window_days.max(1));

    let candidates = sqlx::query_as::<_, ScheduleRow>(
        r#"
        SELECT sc.user_id, sc.date, sc.shift_id, sc.is_off,
               sh.start_time, sh.end_time, sh.late_tolerance_minutes
        FROM shift_schedules sc
        JOIN shifts sh ON sh.id = sc.shift_id
        JOIN users u ON u.id = sc.user_id AND u.is_active = 1
        LEFT JOIN attendance a ON a.user_id = sc.user_id AND a.date = sc.date
        WHERE sc.is_off = 0
          AND sc.date BETWEEN ? AND ?
          AND a.id IS NULL
          AND NOT EXISTS (
              SELECT 1 FROM leave_requests l
              WHERE l.user_id = sc.user_id AND l.status = 'approved'
                AND sc.date BETWEEN l.start_date AND l.end_date
          )
        "#,
    )
    .bind(from)
    .bind(today)
    .fetch_all(pool)
    .await?;

    let mut marked = 0;
    for row in candidates {
        let Some(window) = row.window() else {
            continue;
        };
        if now < window.ends_at(row.date) {
            continue;
        }
        // IGNORE: a late check-in may have won the race for this row
        let result = sqlx::query(
            r#"
            INSERT IGNORE INTO attendance (user_id, date, shift_id, status, late_minutes)
            VALUES (?, ?, ?, ?, 0)
            "#,
        )
        .bind(row.user_id)
        .bind(row.date)
        .bind(row.shift_id)
        .bind(AttendanceStatus::Mangkir.as_ref())
        .execute(pool)
        .await?;
        marked += result.rows_affected();
    }

    if marked > 0 {
        info!(marked, "Marked absent days");
    }
    Ok(marked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(is_off: bool, start: Option<(u32, u32)>) -> ScheduleRow {
        ScheduleRow {
            user_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            shift_id: start.map(|_| 4),
            is_off,
            start_time: start.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0)),
            end_time: start.and_then(|(h, m)| NaiveTime::from_hms_opt((h + 8) % 24, m, 0)),
            late_tolerance_minutes: Some(15),
        }
    }

    #[test]
    fn schedule_window_follows_the_shift() {
        let window = row(false, Some((7, 0))).window().unwrap();
        assert_eq!(window.start, NaiveTime::from_hms_opt(7, 0, 0).unwrap());
        assert_eq!(window.end, NaiveTime::from_hms_opt(15, 0, 0).unwrap());
        assert_eq!(window.late_tolerance_minutes, 15);
    }

    #[test]
    fn off_days_and_shiftless_rows_have_no_window() {
        assert!(row(true, Some((7, 0))).window().is_none());
        assert!(row(false, None).window().is_none());
    }

    #[test]
    fn id_list_precedes_the_range() {
        let from = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        let values = ids_and_range(&[3, 5], from, to);
        assert_eq!(
            values,
            vec![
                SqlValue::U64(3),
                SqlValue::U64(5),
                SqlValue::Date(from),
                SqlValue::Date(to),
            ]
        );
    }
}
