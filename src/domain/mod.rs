//! Rules of the attendance domain, free of I/O so handlers stay thin and
//! the rules stay testable.

pub mod approval;
pub mod attendance;
pub mod correction;
pub mod geofence;
pub mod leave;
pub mod payroll;
pub mod shift_swap;
