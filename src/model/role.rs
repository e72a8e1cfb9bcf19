use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    Supervisor = 4,
    Manager = 5,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::Supervisor),
            5 => Some(Role::Manager),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Approval authority, lowest first.
    pub fn rank(self) -> u8 {
        match self {
            Role::Employee => 0,
            Role::Supervisor => 1,
            Role::Manager => 2,
            Role::Hr => 3,
            Role::Admin => 4,
        }
    }

    pub fn is_hr_or_admin(self) -> bool {
        matches!(self, Role::Hr | Role::Admin)
    }

    /// Manager and above see every employee, not only direct reports.
    pub fn sees_everyone(self) -> bool {
        self.rank() >= Role::Manager.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for role in [Role::Admin, Role::Hr, Role::Employee, Role::Supervisor, Role::Manager] {
            assert_eq!(Role::from_id(role.id()), Some(role));
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(9), None);
    }

    #[test]
    fn parses_snake_case_names() {
        assert_eq!("supervisor".parse::<Role>().unwrap(), Role::Supervisor);
        assert_eq!(Role::Hr.as_ref(), "hr");
    }

    #[test]
    fn authority_order() {
        assert!(Role::Employee.rank() < Role::Supervisor.rank());
        assert!(!Role::Supervisor.sees_everyone());
        assert!(Role::Manager.sees_everyone());
        assert!(Role::Hr.is_hr_or_admin());
        assert!(!Role::Manager.is_hr_or_admin());
    }
}
