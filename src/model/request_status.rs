use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};

/// Lifecycle shared by leave, correction and shift-change requests.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn is_final(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// Only pending requests move, and only to a final state.
    pub fn ensure_transition(self, to: RequestStatus) -> ApiResult<()> {
        match (self, to) {
            (RequestStatus::Pending, RequestStatus::Pending) => {
                Err(ApiError::invalid_state("Request is already pending"))
            }
            (RequestStatus::Pending, _) => Ok(()),
            (from, _) => Err(ApiError::invalid_state(format!(
                "Request is already {from}"
            ))),
        }
    }

    /// Indonesian past participle used in notification texts.
    pub fn verdict(self) -> &'static str {
        match self {
            RequestStatus::Pending => "diajukan",
            RequestStatus::Approved => "disetujui",
            RequestStatus::Rejected => "ditolak",
            RequestStatus::Cancelled => "dibatalkan",
        }
    }

    pub fn parse_stored(raw: &str) -> ApiResult<Self> {
        raw.parse()
            .map_err(|_| ApiError::internal(format!("unknown request status in database: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_to_any_final_state() {
        for to in [
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            assert!(RequestStatus::Pending.ensure_transition(to).is_ok());
            assert!(to.is_final());
        }
    }

    #[test]
    fn final_states_are_frozen() {
        let err = RequestStatus::Approved
            .ensure_transition(RequestStatus::Rejected)
            .unwrap_err();
        assert_eq!(err.message, "Request is already approved");
        assert!(RequestStatus::Rejected
            .ensure_transition(RequestStatus::Approved)
            .is_err());
        assert!(RequestStatus::Pending
            .ensure_transition(RequestStatus::Pending)
            .is_err());
    }
}
