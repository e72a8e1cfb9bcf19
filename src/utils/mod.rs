pub mod db_utils;
pub mod outlet_cache;
pub mod pagination;
pub mod payslip_pdf;
pub mod photo;
pub mod username_index;
pub mod tls;
