//! Daily attendance state machine.
//!
//! A day moves `belum_masuk → masuk|terlambat → pulang`. An approved leave
//! (`cuti`) or a scheduled off day (`libur`) suppresses both punches, and a
//! scheduled day that passes without a check-in becomes `mangkir`. Once a
//! correction is pending for the day, direct punches are frozen until it is
//! reviewed.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::model::attendance::AttendanceStatus;

/// How long after an overnight shift ends its check-out is still accepted.
pub const OVERNIGHT_GRACE_HOURS: i64 = 4;

/// Status of a day as the client sees it; derived, never stored.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DayStatus {
    BelumMasuk,
    Masuk,
    Terlambat,
    Pulang,
    Mangkir,
    Cuti,
    Libur,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub late_tolerance_minutes: i64,
}

impl ShiftWindow {
    pub fn starts_at(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start)
    }

    /// An end time at or before the start runs into the next day.
    pub fn ends_at(&self, date: NaiveDate) -> NaiveDateTime {
        let end = date.and_time(self.end);
        if self.end <= self.start {
            end + Duration::days(1)
        } else {
            end
        }
    }

    pub fn duration_minutes(&self, date: NaiveDate) -> i64 {
        (self.ends_at(date) - self.starts_at(date)).num_minutes()
    }

    /// Minutes past the shift start, or zero while inside the tolerance.
    pub fn late_minutes(&self, date: NaiveDate, check_in_at: NaiveDateTime) -> i64 {
        let late = (check_in_at - self.starts_at(date)).num_minutes();
        if late > self.late_tolerance_minutes {
            late
        } else {
            0
        }
    }
}

/// Everything known about one user's day.
#[derive(Debug, Clone, Default)]
pub struct DayContext {
    pub date: NaiveDate,
    pub shift: Option<ShiftWindow>,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
    pub on_leave: bool,
    pub scheduled_off: bool,
    pub correction_pending: bool,
    pub marked_absent: bool,
}

impl DayContext {
    pub fn has_checked_in(&self) -> bool {
        self.check_in_at.is_some()
    }

    pub fn has_checked_out(&self) -> bool {
        self.check_out_at.is_some()
    }

    pub fn late_minutes(&self) -> i64 {
        match (self.shift, self.check_in_at) {
            (Some(shift), Some(at)) => shift.late_minutes(self.date, at),
            _ => 0,
        }
    }

    pub fn status(&self, now: NaiveDateTime) -> DayStatus {
        if self.has_checked_out() {
            return DayStatus::Pulang;
        }
        if self.has_checked_in() {
            return if self.late_minutes() > 0 {
                DayStatus::Terlambat
            } else {
                DayStatus::Masuk
            };
        }
        if self.on_leave {
            return DayStatus::Cuti;
        }
        if self.scheduled_off {
            return DayStatus::Libur;
        }
        if self.marked_absent {
            return DayStatus::Mangkir;
        }

        match self.shift {
            Some(shift) if now >= shift.ends_at(self.date) => DayStatus::Mangkir,
            Some(_) => DayStatus::BelumMasuk,
            // Unscheduled days are flexible: a missed one is not an absence.
            None if self.date < now.date() => DayStatus::Libur,
            None => DayStatus::BelumMasuk,
        }
    }

    fn ensure_not_suppressed(&self) -> ApiResult<()> {
        if self.on_leave {
            return Err(ApiError::new(
                ErrorCode::OnLeave,
                "You are on approved leave today",
            ));
        }
        if self.scheduled_off {
            return Err(ApiError::new(
                ErrorCode::ScheduledOff,
                "Today is a scheduled day off",
            ));
        }
        if self.correction_pending {
            return Err(ApiError::new(
                ErrorCode::CorrectionPending,
                "A correction for this day is awaiting review",
            ));
        }
        Ok(())
    }

    pub fn ensure_can_check_in(&self, now: NaiveDateTime) -> ApiResult<()> {
        self.ensure_not_suppressed()?;
        if self.has_checked_in() {
            return Err(ApiError::new(
                ErrorCode::AlreadyCheckedIn,
                "Already checked in today",
            ));
        }
        let ended = self
            .shift
            .is_some_and(|shift| now >= shift.ends_at(self.date));
        if self.marked_absent || ended {
            return Err(ApiError::new(
                ErrorCode::ShiftEnded,
                "The shift has already ended; request a correction instead",
            ));
        }
        Ok(())
    }

    /// Leave and off days carry no punches, corrected or not.
    pub fn ensure_correctable(&self) -> ApiResult<()> {
        if self.on_leave {
            return Err(ApiError::new(
                ErrorCode::OnLeave,
                "That day is covered by approved leave",
            ));
        }
        if self.scheduled_off {
            return Err(ApiError::new(
                ErrorCode::ScheduledOff,
                "That day is a scheduled day off",
            ));
        }
        Ok(())
    }

    pub fn ensure_can_check_out(&self) -> ApiResult<()> {
        self.ensure_not_suppressed()?;
        if !self.has_checked_in() {
            return Err(ApiError::new(
                ErrorCode::NotCheckedIn,
                "No check-in found for today",
            ));
        }
        if self.has_checked_out() {
            return Err(ApiError::new(
                ErrorCode::AlreadyCheckedOut,
                "Already checked out today",
            ));
        }
        Ok(())
    }

    /// Stored status for a fresh check-in at `at`.
    pub fn check_in_status(&self, at: NaiveDateTime) -> (AttendanceStatus, i64) {
        let late = self
            .shift
            .map(|shift| shift.late_minutes(self.date, at))
            .unwrap_or(0);
        if late > 0 {
            (AttendanceStatus::Terlambat, late)
        } else {
            (AttendanceStatus::Masuk, 0)
        }
    }

    pub fn worked_minutes(&self, now: NaiveDateTime) -> i64 {
        match self.check_in_at {
            Some(start) => {
                let end = self.check_out_at.unwrap_or(now);
                (end - start).num_minutes().max(0)
            }
            None => 0,
        }
    }

    pub fn target_minutes(&self, default_minutes: i64) -> i64 {
        self.shift
            .map(|shift| shift.duration_minutes(self.date))
            .unwrap_or(default_minutes)
    }

    /// Whether the user may open a correction for this day.
    pub fn can_request_correction(&self, today: NaiveDate, window_days: i64) -> bool {
        if self.correction_pending || self.on_leave || self.scheduled_off {
            return false;
        }
        let age = (today - self.date).num_days();
        if age < 0 || age > window_days {
            return false;
        }
        let late = self.late_minutes() > 0;
        if age == 0 {
            return late;
        }
        let incomplete = !self.has_checked_in() || !self.has_checked_out();
        let was_scheduled = self.shift.is_some() || self.marked_absent || self.has_checked_in();
        (incomplete && was_scheduled) || late
    }
}

/// Calendar day a punch is booked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchDay {
    Yesterday,
    Today,
}

/// Picks the day a punch at `now` belongs to.
///
/// Yesterday wins while its overnight shift is still running, or, once
/// checked in, until the grace period after the shift end. Anything
/// already punched today keeps the punch on today.
pub fn punch_day(yesterday: &DayContext, today: &DayContext, now: NaiveDateTime) -> PunchDay {
    if today.has_checked_in()
        || yesterday.has_checked_out()
        || yesterday.on_leave
        || yesterday.scheduled_off
        || yesterday.marked_absent
    {
        return PunchDay::Today;
    }
    let Some(shift) = yesterday.shift else {
        return PunchDay::Today;
    };
    let ends_at = shift.ends_at(yesterday.date);
    if ends_at.date() <= yesterday.date {
        return PunchDay::Today;
    }

    let open = if yesterday.has_checked_in() {
        now <= ends_at + Duration::hours(OVERNIGHT_GRACE_HOURS)
    } else {
        now < ends_at
    };
    if open {
        PunchDay::Yesterday
    } else {
        PunchDay::Today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        date(d).and_hms_opt(h, m, 0).unwrap()
    }

    fn morning() -> ShiftWindow {
        ShiftWindow {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            late_tolerance_minutes: 10,
        }
    }

    fn night() -> ShiftWindow {
        ShiftWindow {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            late_tolerance_minutes: 0,
        }
    }

    fn day(shift: Option<ShiftWindow>) -> DayContext {
        DayContext {
            date: date(10),
            shift,
            ..Default::default()
        }
    }

    #[test]
    fn overnight_shift_ends_next_day() {
        assert_eq!(night().ends_at(date(10)), at(11, 6, 0));
        assert_eq!(night().duration_minutes(date(10)), 480);
        assert_eq!(morning().duration_minutes(date(10)), 480);
    }

    #[test]
    fn lateness_respects_tolerance() {
        let shift = morning();
        assert_eq!(shift.late_minutes(date(10), at(10, 8, 10)), 0);
        assert_eq!(shift.late_minutes(date(10), at(10, 8, 11)), 11);
        assert_eq!(shift.late_minutes(date(10), at(10, 7, 45)), 0);
    }

    #[test]
    fn full_day_walks_the_states() {
        let mut d = day(Some(morning()));
        assert_eq!(d.status(at(10, 7, 0)), DayStatus::BelumMasuk);

        d.ensure_can_check_in(at(10, 7, 55)).unwrap();
        let (stored, late) = d.check_in_status(at(10, 8, 5));
        assert_eq!((stored, late), (AttendanceStatus::Masuk, 0));
        d.check_in_at = Some(at(10, 8, 5));
        assert_eq!(d.status(at(10, 9, 0)), DayStatus::Masuk);

        let err = d.ensure_can_check_in(at(10, 9, 0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyCheckedIn);

        d.ensure_can_check_out().unwrap();
        d.check_out_at = Some(at(10, 16, 2));
        assert_eq!(d.status(at(10, 17, 0)), DayStatus::Pulang);
        assert_eq!(d.worked_minutes(at(10, 20, 0)), 477);

        let err = d.ensure_can_check_out().unwrap_err();
        assert_eq!(err.code, ErrorCode::AlreadyCheckedOut);
    }

    #[test]
    fn late_check_in_is_terlambat() {
        let mut d = day(Some(morning()));
        let (stored, late) = d.check_in_status(at(10, 8, 30));
        assert_eq!(stored, AttendanceStatus::Terlambat);
        assert_eq!(late, 30);
        d.check_in_at = Some(at(10, 8, 30));
        assert_eq!(d.status(at(10, 9, 0)), DayStatus::Terlambat);
    }

    #[test]
    fn check_out_requires_check_in() {
        let d = day(Some(morning()));
        assert_eq!(d.ensure_can_check_out().unwrap_err().code, ErrorCode::NotCheckedIn);
    }

    #[test]
    fn leave_and_off_day_suppress_punches() {
        let mut d = day(Some(morning()));
        d.on_leave = true;
        assert_eq!(d.status(at(10, 9, 0)), DayStatus::Cuti);
        assert_eq!(d.ensure_can_check_in(at(10, 9, 0)).unwrap_err().code, ErrorCode::OnLeave);
        assert_eq!(d.ensure_can_check_out().unwrap_err().code, ErrorCode::OnLeave);

        let mut d = day(None);
        d.scheduled_off = true;
        assert_eq!(d.status(at(10, 9, 0)), DayStatus::Libur);
        assert_eq!(d.ensure_can_check_in(at(10, 9, 0)).unwrap_err().code, ErrorCode::ScheduledOff);
    }

    #[test]
    fn pending_correction_freezes_the_day() {
        let mut d = day(Some(morning()));
        d.check_in_at = Some(at(10, 8, 0));
        d.correction_pending = true;
        assert_eq!(
            d.ensure_can_check_out().unwrap_err().code,
            ErrorCode::CorrectionPending
        );
    }

    #[test]
    fn missed_shift_becomes_mangkir() {
        let d = day(Some(morning()));
        assert_eq!(d.status(at(10, 15, 59)), DayStatus::BelumMasuk);
        assert_eq!(d.status(at(10, 16, 0)), DayStatus::Mangkir);

        let mut swept = day(None);
        swept.marked_absent = true;
        assert_eq!(swept.status(at(11, 9, 0)), DayStatus::Mangkir);
    }

    #[test]
    fn unscheduled_past_day_is_not_absence() {
        let d = day(None);
        assert_eq!(d.status(at(10, 23, 0)), DayStatus::BelumMasuk);
        assert_eq!(d.status(at(11, 8, 0)), DayStatus::Libur);
    }

    #[test]
    fn target_falls_back_to_default() {
        assert_eq!(day(None).target_minutes(420), 420);
        assert_eq!(day(Some(night())).target_minutes(420), 480);
    }

    #[test]
    fn correction_eligibility() {
        let today = date(12);

        // forgot to check out two days ago
        let mut d = day(Some(morning()));
        d.check_in_at = Some(at(10, 8, 0));
        assert!(d.can_request_correction(today, 7));

        // complete and on time: nothing to correct
        d.check_out_at = Some(at(10, 16, 0));
        assert!(!d.can_request_correction(today, 7));

        // outside the window
        let mut old = day(Some(morning()));
        old.date = date(1);
        assert!(!old.can_request_correction(today, 7));

        // already pending
        let mut pending = day(Some(morning()));
        pending.correction_pending = true;
        assert!(!pending.can_request_correction(today, 7));

        // today only when late
        let mut now = day(Some(morning()));
        now.date = today;
        now.check_in_at = Some(today.and_hms_opt(9, 0, 0).unwrap());
        assert!(now.can_request_correction(today, 7));
        now.check_in_at = Some(today.and_hms_opt(8, 0, 0).unwrap());
        assert!(!now.can_request_correction(today, 7));
    }

    #[test]
    fn check_in_after_shift_end_is_refused() {
        let d = day(Some(morning()));
        d.ensure_can_check_in(at(10, 15, 59)).unwrap();
        assert_eq!(
            d.ensure_can_check_in(at(10, 17, 0)).unwrap_err().code,
            ErrorCode::ShiftEnded
        );

        // the sweep already wrote a mangkir row
        let mut swept = day(Some(morning()));
        swept.marked_absent = true;
        assert_eq!(swept.status(at(10, 17, 0)), DayStatus::Mangkir);
        assert_eq!(
            swept.ensure_can_check_in(at(10, 17, 0)).unwrap_err().code,
            ErrorCode::ShiftEnded
        );

        // unscheduled days stay open all day
        day(None).ensure_can_check_in(at(10, 23, 0)).unwrap();
    }

    #[test]
    fn leave_and_off_days_cannot_be_corrected() {
        let mut d = day(Some(morning()));
        d.ensure_correctable().unwrap();
        d.on_leave = true;
        assert_eq!(d.ensure_correctable().unwrap_err().code, ErrorCode::OnLeave);
        assert!(!d.can_request_correction(date(12), 7));

        let mut off = day(None);
        off.scheduled_off = true;
        assert_eq!(off.ensure_correctable().unwrap_err().code, ErrorCode::ScheduledOff);
        assert!(!off.can_request_correction(date(12), 7));
    }

    fn pair(yesterday_shift: Option<ShiftWindow>) -> (DayContext, DayContext) {
        let yesterday = DayContext {
            date: date(9),
            shift: yesterday_shift,
            ..Default::default()
        };
        (yesterday, day(None))
    }

    #[test]
    fn night_shift_check_in_after_midnight_books_yesterday() {
        let (yesterday, today) = pair(Some(night()));
        assert_eq!(punch_day(&yesterday, &today, at(10, 0, 10)), PunchDay::Yesterday);
        assert_eq!(punch_day(&yesterday, &today, at(10, 5, 59)), PunchDay::Yesterday);
        assert_eq!(punch_day(&yesterday, &today, at(10, 6, 0)), PunchDay::Today);

        // lateness is measured against yesterday's 22:00 start
        let (stored, late) = yesterday.check_in_status(at(10, 0, 10));
        assert_eq!((stored, late), (AttendanceStatus::Terlambat, 130));

        // even when today is an off day
        let (yesterday, mut today) = pair(Some(night()));
        today.scheduled_off = true;
        assert_eq!(punch_day(&yesterday, &today, at(10, 1, 0)), PunchDay::Yesterday);
    }

    #[test]
    fn open_night_shift_keeps_check_out_on_yesterday_within_grace() {
        let (mut yesterday, today) = pair(Some(night()));
        yesterday.check_in_at = Some(at(9, 21, 55));
        assert_eq!(punch_day(&yesterday, &today, at(10, 6, 30)), PunchDay::Yesterday);
        assert_eq!(punch_day(&yesterday, &today, at(10, 10, 0)), PunchDay::Yesterday);
        assert_eq!(punch_day(&yesterday, &today, at(10, 10, 1)), PunchDay::Today);

        yesterday.check_out_at = Some(at(10, 6, 0));
        assert_eq!(punch_day(&yesterday, &today, at(10, 6, 30)), PunchDay::Today);
    }

    #[test]
    fn day_shifts_and_punched_today_stay_on_today() {
        let (yesterday, today) = pair(Some(morning()));
        assert_eq!(punch_day(&yesterday, &today, at(10, 0, 10)), PunchDay::Today);

        let (yesterday, mut today) = pair(Some(night()));
        today.check_in_at = Some(at(10, 0, 5));
        assert_eq!(punch_day(&yesterday, &today, at(10, 0, 10)), PunchDay::Today);

        let (mut yesterday, today) = pair(Some(night()));
        yesterday.on_leave = true;
        assert_eq!(punch_day(&yesterday, &today, at(10, 0, 10)), PunchDay::Today);
    }
}
