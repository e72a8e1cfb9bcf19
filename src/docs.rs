use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

use crate::api::{
    access::ReviewReq,
    announcement::CreateAnnouncement,
    attendance::{DaySnapshot, PunchReq, TeamMemberDay},
    correction::CreateCorrectionReq,
    dashboard::{CompanySummary, Dashboard, OutletSummary, PendingApprovals, TeamSummary},
    leave_request::{CreateLeave, LeaveBalance},
    notification::UnreadCount,
    outlet::{CreateOutlet, NearbyOutlet},
    payroll::{CreateSlip, UpdateSlip},
    shift::{CreateShift, ScheduleEntry, ScheduleInput, ScheduleUpsert},
    shift_change::CreateShiftChange,
    users::{ChangePassword, CreateUser, UsernameAvailability},
};
use crate::domain::attendance::DayStatus;
use crate::model::{
    announcement::Announcement,
    attendance::{AttendanceRecord, AttendanceStatus},
    correction::Correction,
    leave_request::{LeaveRequest, LeaveType},
    notification::{Notification, NotificationKind},
    outlet::Outlet,
    payroll::{PayrollSlip, SlipStatus},
    request_status::RequestStatus,
    role::Role,
    shift::Shift,
    shift_change::ShiftChangeRequest,
    user::UserProfile,
};
use crate::models::{LoginReqDto, LoginResponse, TokenPair};
use crate::utils::pagination::{
    CorrectionPage, LeavePage, NotificationPage, PayrollPage, ShiftChangePage, UserPage,
};

/// Registers the JWT bearer scheme every protected path refers to.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Absensi API",
        version = "1.0.0",
        description = r#"
## Attendance & HR service

Backend for outlet staff attendance:

- **Absensi**: geofenced check-in (masuk) and check-out (pulang) with a photo
- **Koreksi**: correction requests for missed or wrong punches, reviewed up the chain
- **Cuti**: leave requests with an annual quota
- **Shift change**: swapping a scheduled day with a colleague
- **Payroll**: monthly slips with PDF export
- **Announcements** and **notifications**
- Role-based **dashboard**

### Security
Protected endpoints take `Authorization: Bearer <access_token>`. When the
access token expires, call `/auth/refresh` with the refresh token as bearer
to get a new pair.

### Errors
Every error body is `{"code": "...", "message": "..."}`; `code` is stable
(`ALREADY_CHECKED_IN`, `OUTSIDE_GEOFENCE`, `CORRECTION_PENDING`, ...).
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,

        crate::api::dashboard::dashboard,

        crate::api::attendance::today,
        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::history,
        crate::api::attendance::team,
        crate::api::attendance::photo,

        crate::api::correction::create_correction,
        crate::api::correction::my_corrections,
        crate::api::correction::list_corrections,
        crate::api::correction::approve_correction,
        crate::api::correction::reject_correction,

        crate::api::leave_request::create_leave,
        crate::api::leave_request::my_leaves,
        crate::api::leave_request::leave_balance,
        crate::api::leave_request::leave_list,
        crate::api::leave_request::get_leave,
        crate::api::leave_request::approve_leave,
        crate::api::leave_request::reject_leave,
        crate::api::leave_request::cancel_leave,

        crate::api::shift_change::create_shift_change,
        crate::api::shift_change::my_shift_changes,
        crate::api::shift_change::list_shift_changes,
        crate::api::shift_change::approve_shift_change,
        crate::api::shift_change::reject_shift_change,
        crate::api::shift_change::cancel_shift_change,

        crate::api::users::create_user,
        crate::api::users::list_users,
        crate::api::users::get_user,
        crate::api::users::update_user,
        crate::api::users::deactivate_user,
        crate::api::users::username_available,
        crate::api::users::change_password,

        crate::api::outlet::create_outlet,
        crate::api::outlet::list_outlets,
        crate::api::outlet::nearby_outlets,
        crate::api::outlet::get_outlet,
        crate::api::outlet::update_outlet,
        crate::api::outlet::delete_outlet,

        crate::api::shift::create_shift,
        crate::api::shift::list_shifts,
        crate::api::shift::update_shift,
        crate::api::shift::delete_shift,
        crate::api::shift::upsert_schedule,
        crate::api::shift::get_schedule,

        crate::api::payroll::create_slip,
        crate::api::payroll::update_slip,
        crate::api::payroll::publish_slip,
        crate::api::payroll::list_slips,
        crate::api::payroll::my_slips,
        crate::api::payroll::get_slip,
        crate::api::payroll::slip_pdf,

        crate::api::announcement::create_announcement,
        crate::api::announcement::list_announcements,
        crate::api::announcement::update_announcement,
        crate::api::announcement::delete_announcement,

        crate::api::notification::list_notifications,
        crate::api::notification::unread_count,
        crate::api::notification::mark_read,
        crate::api::notification::mark_all_read
    ),
    components(
        schemas(
            LoginReqDto,
            LoginResponse,
            TokenPair,
            Role,
            UserProfile,
            UserPage,
            CreateUser,
            ChangePassword,
            UsernameAvailability,
            Outlet,
            CreateOutlet,
            NearbyOutlet,
            Shift,
            CreateShift,
            ScheduleInput,
            ScheduleUpsert,
            ScheduleEntry,
            DayStatus,
            DaySnapshot,
            PunchReq,
            TeamMemberDay,
            AttendanceRecord,
            AttendanceStatus,
            RequestStatus,
            ReviewReq,
            Correction,
            CorrectionPage,
            CreateCorrectionReq,
            LeaveType,
            LeaveRequest,
            LeavePage,
            CreateLeave,
            LeaveBalance,
            ShiftChangeRequest,
            ShiftChangePage,
            CreateShiftChange,
            SlipStatus,
            PayrollSlip,
            PayrollPage,
            CreateSlip,
            UpdateSlip,
            Announcement,
            CreateAnnouncement,
            NotificationKind,
            Notification,
            NotificationPage,
            UnreadCount,
            Dashboard,
            TeamSummary,
            PendingApprovals,
            OutletSummary,
            CompanySummary
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token refresh and logout"),
        (name = "Dashboard", description = "Role-based home screen"),
        (name = "Absensi", description = "Check-in, check-out and attendance history"),
        (name = "Koreksi", description = "Attendance correction requests"),
        (name = "Cuti", description = "Leave requests and balance"),
        (name = "Shift change", description = "Shift swap requests"),
        (name = "Users", description = "User management"),
        (name = "Outlets", description = "Outlets and geofences"),
        (name = "Shifts", description = "Shifts and rosters"),
        (name = "Payroll", description = "Payroll slips"),
        (name = "Announcements", description = "Company announcements"),
        (name = "Notifications", description = "In-app notifications"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in [
            "/auth/refresh",
            "/api/absensi/masuk",
            "/api/koreksi/{id}/approve",
            "/api/notifications/unread-count",
            "/api/payroll/{id}/pdf",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
