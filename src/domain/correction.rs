use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy)]
pub struct CorrectionDraft {
    pub date: NaiveDate,
    pub check_in_at: Option<NaiveDateTime>,
    pub check_out_at: Option<NaiveDateTime>,
}

/// Validates the proposed punches of a correction request.
///
/// The check-in has to fall on the corrected date; a check-out may run into
/// the next morning for overnight shifts.
pub fn validate_draft(draft: &CorrectionDraft, now: NaiveDateTime, window_days: i64) -> ApiResult<()> {
    let today = now.date();
    if draft.date > today {
        return Err(ApiError::validation("Cannot correct a future date"));
    }
    if (today - draft.date).num_days() > window_days {
        return Err(ApiError::validation(format!(
            "Corrections are only accepted for the last {window_days} day(s)"
        )));
    }
    if draft.check_in_at.is_none() && draft.check_out_at.is_none() {
        return Err(ApiError::validation(
            "Provide a corrected check-in, check-out, or both",
        ));
    }
    if let Some(check_in) = draft.check_in_at {
        if check_in.date() != draft.date {
            return Err(ApiError::validation("check_in_at must fall on the corrected date"));
        }
        if check_in > now {
            return Err(ApiError::validation("check_in_at cannot be in the future"));
        }
    }
    if let Some(check_out) = draft.check_out_at {
        let latest_day = draft.date + Duration::days(1);
        if check_out.date() < draft.date || check_out.date() > latest_day {
            return Err(ApiError::validation(
                "check_out_at must fall on the corrected date or the morning after",
            ));
        }
        if check_out > now {
            return Err(ApiError::validation("check_out_at cannot be in the future"));
        }
    }
    if let (Some(check_in), Some(check_out)) = (draft.check_in_at, draft.check_out_at) {
        if check_out <= check_in {
            return Err(ApiError::validation("check_out_at must be after check_in_at"));
        }
    }
    Ok(())
}

/// Merges approved punches over what was recorded; unspecified sides keep
/// their recorded value.
pub fn merge_punches(
    recorded: (Option<NaiveDateTime>, Option<NaiveDateTime>),
    draft: &CorrectionDraft,
) -> ApiResult<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
    let check_in = draft.check_in_at.or(recorded.0);
    let check_out = draft.check_out_at.or(recorded.1);
    match (check_in, check_out) {
        (None, Some(_)) => Err(ApiError::invalid_state(
            "Correction leaves a check-out without a check-in",
        )),
        (Some(i), Some(o)) if o <= i => Err(ApiError::invalid_state(
            "Corrected check-out would precede the check-in",
        )),
        merged => Ok(merged),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 5, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn draft(day: u32, ci: Option<NaiveDateTime>, co: Option<NaiveDateTime>) -> CorrectionDraft {
        CorrectionDraft {
            date: NaiveDate::from_ymd_opt(2026, 5, day).unwrap(),
            check_in_at: ci,
            check_out_at: co,
        }
    }

    #[test]
    fn accepts_backdated_missing_check_out() {
        let now = at(12, 9, 0);
        assert!(validate_draft(&draft(10, None, Some(at(10, 16, 0))), now, 7).is_ok());
    }

    #[test]
    fn rejects_future_and_stale_dates() {
        let now = at(12, 9, 0);
        assert!(validate_draft(&draft(13, Some(at(13, 8, 0)), None), now, 7).is_err());
        assert!(validate_draft(&draft(1, Some(at(1, 8, 0)), None), now, 7).is_err());
    }

    #[test]
    fn rejects_empty_and_inverted_punches() {
        let now = at(12, 9, 0);
        assert!(validate_draft(&draft(10, None, None), now, 7).is_err());
        let inverted = draft(10, Some(at(10, 16, 0)), Some(at(10, 8, 0)));
        assert!(validate_draft(&inverted, now, 7).is_err());
    }

    #[test]
    fn overnight_check_out_is_allowed() {
        let now = at(12, 9, 0);
        let night = draft(10, Some(at(10, 22, 0)), Some(at(11, 6, 0)));
        assert!(validate_draft(&night, now, 7).is_ok());
        let too_late = draft(9, Some(at(9, 22, 0)), Some(at(11, 6, 0)));
        assert!(validate_draft(&too_late, now, 7).is_err());
    }

    #[test]
    fn same_day_punch_cannot_be_in_the_future() {
        let now = at(12, 9, 0);
        assert!(validate_draft(&draft(12, Some(at(12, 10, 0)), None), now, 7).is_err());
        assert!(validate_draft(&draft(12, Some(at(12, 8, 0)), None), now, 7).is_ok());
    }

    #[test]
    fn merge_keeps_recorded_side() {
        let recorded = (Some(at(10, 8, 3)), None);
        let merged = merge_punches(recorded, &draft(10, None, Some(at(10, 16, 0)))).unwrap();
        assert_eq!(merged, (Some(at(10, 8, 3)), Some(at(10, 16, 0))));
    }

    #[test]
    fn merge_refuses_orphan_check_out() {
        let err = merge_punches((None, None), &draft(10, None, Some(at(10, 16, 0)))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidState);
    }
}
