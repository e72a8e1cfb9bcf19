use chrono::{Datelike, NaiveDate};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::model::leave_request::LeaveType;

/// Calendar days in `[start, end]`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

pub fn overlaps(a: (NaiveDate, NaiveDate), b: (NaiveDate, NaiveDate)) -> bool {
    a.0 <= b.1 && b.0 <= a.1
}

pub fn covers(start: NaiveDate, end: NaiveDate, date: NaiveDate) -> bool {
    start <= date && date <= end
}

/// Days of `[start, end]` that fall inside `[from, to]`.
pub fn days_within(start: NaiveDate, end: NaiveDate, from: NaiveDate, to: NaiveDate) -> i64 {
    let first = start.max(from);
    let last = end.min(to);
    if first > last { 0 } else { days_inclusive(first, last) }
}

/// Days of `[start, end]` that fall inside `year`.
pub fn days_in_year(start: NaiveDate, end: NaiveDate, year: i32) -> i64 {
    match (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) {
        (Some(jan1), Some(dec31)) => days_within(start, end, jan1, dec31),
        _ => 0,
    }
}

/// Checks a new request against the calendar and the leave already booked.
///
/// Sick leave may be filed after the fact; every other type must start
/// today or later.
pub fn validate_request(
    leave_type: LeaveType,
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    booked: &[(NaiveDate, NaiveDate)],
) -> ApiResult<()> {
    if start > end {
        return Err(ApiError::validation("start_date cannot be after end_date"));
    }
    if start.year() != end.year() {
        return Err(ApiError::validation(
            "A leave request cannot span two calendar years",
        ));
    }
    if leave_type != LeaveType::Sick && start < today {
        return Err(ApiError::validation("Leave cannot start in the past"));
    }
    if booked.iter().any(|&range| overlaps(range, (start, end))) {
        return Err(ApiError::new(
            ErrorCode::LeaveOverlap,
            "Leave overlaps an existing pending or approved request",
        ));
    }
    Ok(())
}

pub fn ensure_quota(requested_days: i64, used_days: i64, quota: i64) -> ApiResult<()> {
    let remaining = (quota - used_days).max(0);
    if requested_days > remaining {
        return Err(ApiError::validation(format!(
            "Annual leave quota exceeded: {remaining} day(s) remaining"
        ))
        .with_details(serde_json::json!({
            "quota": quota,
            "used": used_days,
            "remaining": remaining,
            "requested": requested_days,
        })));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, day).unwrap()
    }

    #[test]
    fn inclusive_day_count() {
        assert_eq!(days_inclusive(d(1, 5), d(1, 5)), 1);
        assert_eq!(days_inclusive(d(1, 5), d(1, 7)), 3);
    }

    #[test]
    fn overlap_includes_touching_edges() {
        assert!(overlaps((d(1, 5), d(1, 7)), (d(1, 7), d(1, 9))));
        assert!(!overlaps((d(1, 5), d(1, 7)), (d(1, 8), d(1, 9))));
        assert!(overlaps((d(1, 1), d(1, 31)), (d(1, 10), d(1, 11))));
    }

    #[test]
    fn clips_to_a_pay_period() {
        assert_eq!(days_within(d(1, 28), d(2, 3), d(2, 1), d(2, 28)), 3);
        assert_eq!(days_within(d(1, 2), d(1, 4), d(2, 1), d(2, 28)), 0);
    }

    #[test]
    fn clips_to_year() {
        let start = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
        assert_eq!(days_in_year(start, d(1, 2), 2026), 2);
        assert_eq!(days_in_year(start, d(1, 2), 2025), 2);
        assert_eq!(days_in_year(d(3, 1), d(3, 3), 2024), 0);
    }

    #[test]
    fn rejects_inverted_and_past_ranges() {
        let today = d(2, 10);
        assert!(validate_request(LeaveType::Annual, d(2, 12), d(2, 11), today, &[]).is_err());
        assert!(validate_request(LeaveType::Annual, d(2, 9), d(2, 11), today, &[]).is_err());
        assert!(validate_request(LeaveType::Sick, d(2, 9), d(2, 11), today, &[]).is_ok());
    }

    #[test]
    fn rejects_overlap_with_booked_leave() {
        let today = d(2, 10);
        let err = validate_request(
            LeaveType::Unpaid,
            d(2, 14),
            d(2, 16),
            today,
            &[(d(2, 16), d(2, 18))],
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::LeaveOverlap);
    }

    #[test]
    fn quota_allows_exact_remaining() {
        assert!(ensure_quota(2, 10, 12).is_ok());
        let err = ensure_quota(3, 10, 12).unwrap_err();
        assert_eq!(err.details.unwrap()["remaining"], 2);
    }
}
