pub mod announcement;
pub mod attendance;
pub mod correction;
pub mod leave_request;
pub mod notification;
pub mod outlet;
pub mod payroll;
pub mod request_status;
pub mod role;
pub mod shift;
pub mod shift_change;
pub mod user;
