//! Error model shared by the gateway and the session layer.

use thiserror::Error;

/// Result type returned by session operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Failure of a single backend request, categorized by HTTP status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("server error ({0}): {1}")]
    Server(u16, String),

    /// Any non-success status without a dedicated category.
    #[error("unexpected status ({0}): {1}")]
    Status(u16, String),

    /// The request never produced a response (DNS, connect, reset).
    #[error("network error: {0}")]
    Network(String),

    /// 2xx response whose envelope reported `success: false`.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Map a non-success HTTP status to its error category.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            408 => Self::Timeout,
            500..=599 => Self::Server(status, message),
            _ => Self::Status(status, message),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::BadRequest(_) => Some(400),
            Self::Unauthorized(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::NotFound(_) => Some(404),
            Self::Server(code, _) | Self::Status(code, _) => Some(*code),
            _ => None,
        }
    }
}

/// Session-level error surfaced to callers of login/logout and friends.
///
/// These are returned as values; nothing past the session boundary panics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("server error: {0}")]
    ServerError(String),

    /// 401 on an already-authenticated call; the session has been reset.
    #[error("session is no longer authorized")]
    Unauthorized,

    #[error("permission denied")]
    Forbidden,

    /// Another login/logout is still in flight.
    #[error("session is busy with another login or logout")]
    SessionBusy,

    /// Persisted profile could not be parsed; treated as absent.
    #[error("stored session data is corrupt: {0}")]
    StorageCorrupt(String),

    #[error("not logged in")]
    NotAuthenticated,

    /// The response arrived after a newer logout or reset and was dropped.
    #[error("operation superseded by a newer logout")]
    Superseded,
}

impl AuthError {
    /// Interpret a failed login request.
    ///
    /// Credential rejections come back as 400/401 or as a `success: false`
    /// envelope; everything that is not a transport failure is a server fault.
    pub fn from_login_failure(err: ApiError) -> Self {
        match err {
            ApiError::BadRequest(_) | ApiError::Unauthorized(_) | ApiError::Rejected(_) => {
                Self::InvalidCredentials
            }
            ApiError::Network(msg) => Self::NetworkError(msg),
            ApiError::Timeout => Self::NetworkError("request timed out".to_string()),
            other => Self::ServerError(other.to_string()),
        }
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized(_) => Self::Unauthorized,
            ApiError::Forbidden(_) => Self::Forbidden,
            ApiError::Network(msg) => Self::NetworkError(msg),
            ApiError::Timeout => Self::NetworkError("request timed out".to_string()),
            other => Self::ServerError(other.to_string()),
        }
    }
}
