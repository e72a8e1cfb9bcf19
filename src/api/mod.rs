pub mod access;
pub mod announcement;
pub mod attendance;
pub mod correction;
pub mod dashboard;
pub mod leave_request;
pub mod notification;
pub mod outlet;
pub mod payroll;
pub mod roster;
pub mod shift;
pub mod shift_change;
pub mod users;
