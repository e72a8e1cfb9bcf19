use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Announcement {
    pub id: u64,
    pub title: String,
    pub body: String,
    pub is_active: bool,
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
    pub created_by: u64,
    pub created_at: NaiveDateTime,
}

impl Announcement {
    pub fn is_visible_at(&self, now: NaiveDateTime) -> bool {
        self.is_active
            && self.starts_at.is_none_or(|s| s <= now)
            && self.ends_at.is_none_or(|e| now < e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn announcement(starts_at: Option<NaiveDateTime>, ends_at: Option<NaiveDateTime>) -> Announcement {
        Announcement {
            id: 1,
            title: "Stock opname".into(),
            body: "Outlet closes early on Friday".into(),
            is_active: true,
            starts_at,
            ends_at,
            created_by: 1,
            created_at: at(1, 8),
        }
    }

    #[test]
    fn open_window_is_always_visible() {
        assert!(announcement(None, None).is_visible_at(at(10, 12)));
    }

    #[test]
    fn respects_window_edges() {
        let a = announcement(Some(at(5, 0)), Some(at(7, 0)));
        assert!(!a.is_visible_at(at(4, 23)));
        assert!(a.is_visible_at(at(5, 0)));
        assert!(a.is_visible_at(at(6, 12)));
        assert!(!a.is_visible_at(at(7, 0)));
    }

    #[test]
    fn inactive_is_hidden() {
        let mut a = announcement(None, None);
        a.is_active = false;
        assert!(!a.is_visible_at(at(10, 12)));
    }
}
