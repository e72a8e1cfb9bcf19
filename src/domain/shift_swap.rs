use chrono::NaiveDate;

use crate::error::{ApiError, ApiResult};

/// A user's roster entry for one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub shift_id: Option<u64>,
    pub is_off: bool,
}

pub fn validate_swap(
    requester_id: u64,
    target_id: u64,
    date: NaiveDate,
    today: NaiveDate,
    requester: Option<Slot>,
    target: Option<Slot>,
) -> ApiResult<()> {
    if requester_id == target_id {
        return Err(ApiError::validation("Cannot swap a shift with yourself"));
    }
    if date < today {
        return Err(ApiError::validation("Cannot swap shifts on a past date"));
    }
    let (Some(requester), Some(target)) = (requester, target) else {
        return Err(ApiError::validation(
            "Both employees need a schedule on that date",
        ));
    };
    if requester == target {
        return Err(ApiError::validation(
            "Both employees already have the same schedule",
        ));
    }
    Ok(())
}

/// Slots after an approved swap: each side takes the other's.
pub fn swapped(requester: Slot, target: Slot) -> (Slot, Slot) {
    (target, requester)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap()
    }

    const MORNING: Slot = Slot { shift_id: Some(1), is_off: false };
    const EVENING: Slot = Slot { shift_id: Some(2), is_off: false };
    const OFF: Slot = Slot { shift_id: None, is_off: true };

    #[test]
    fn accepts_distinct_schedules() {
        assert!(validate_swap(1, 2, d(10), d(9), Some(MORNING), Some(EVENING)).is_ok());
        assert!(validate_swap(1, 2, d(10), d(10), Some(MORNING), Some(OFF)).is_ok());
    }

    #[test]
    fn rejects_self_past_missing_and_identical() {
        assert!(validate_swap(1, 1, d(10), d(9), Some(MORNING), Some(EVENING)).is_err());
        assert!(validate_swap(1, 2, d(8), d(9), Some(MORNING), Some(EVENING)).is_err());
        assert!(validate_swap(1, 2, d(10), d(9), None, Some(EVENING)).is_err());
        assert!(validate_swap(1, 2, d(10), d(9), Some(MORNING), Some(MORNING)).is_err());
    }

    #[test]
    fn swap_exchanges_slots() {
        assert_eq!(swapped(MORNING, OFF), (OFF, MORNING));
    }
}
