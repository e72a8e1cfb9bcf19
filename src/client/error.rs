use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or TLS failure; the request may not have reached the server.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("API error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Refresh failed or the retried request was still unauthorized.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// An authenticated call was made without a session.
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    /// Machine code of an API error, e.g. `ALREADY_CHECKED_IN`.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// True when the caller has to log in again.
    pub fn is_logged_out(&self) -> bool {
        matches!(self, ClientError::SessionExpired | ClientError::NotLoggedIn)
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_expose_their_code() {
        let err = ClientError::Api {
            status: 409,
            code: "ALREADY_CHECKED_IN".into(),
            message: "Already checked in today".into(),
        };
        assert_eq!(err.code(), Some("ALREADY_CHECKED_IN"));
        assert!(!err.is_logged_out());
        assert!(ClientError::SessionExpired.is_logged_out());
        assert_eq!(ClientError::NotLoggedIn.code(), None);
    }
}
