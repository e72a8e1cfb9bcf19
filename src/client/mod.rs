//! Typed client for the attendance API.
//!
//! Every authenticated call goes through one interceptor: a 401 triggers a
//! single token refresh and a single retry of the original request. When the
//! refresh or the retry fails the session is cleared and the call returns
//! [`ClientError::SessionExpired`]. Nothing else is retried.

pub mod error;
pub mod http;
pub mod poller;
pub mod session;

pub use error::{ClientError, ClientResult};
pub use http::ApiClient;
pub use poller::NotificationPoller;
pub use session::{Session, SessionStore};
