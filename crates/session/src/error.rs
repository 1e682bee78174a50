//! Error taxonomy for the session core.
//!
//! Authentication-class failures are resolved inside the gateway/coordinator
//! (refresh-and-retry or a clean logout). Everything else propagates unchanged
//! to the calling page, which decides presentation.

use thiserror::Error;

/// Outcome classes surfaced by [`crate::RequestGateway`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The credential was rejected and a refresh is expected to fix it.
    /// Only surfaces when the refresh protocol is bypassed.
    #[error("authentication expired")]
    AuthenticationExpired,

    /// Permanent for the current credential: refresh failed, the replay was
    /// rejected again, or there is no session at all.
    #[error("authentication denied; sign in again")]
    AuthenticationDenied,

    /// Signed in, but not allowed to do this.
    #[error("not allowed to access {path}")]
    AuthorizationDenied { path: String },

    /// Backend-side failure (5xx).
    #[error("the server failed to handle the request ({status}); please retry")]
    ServerFault { status: u16 },

    /// Transport-level failure (timeout, refused connection, DNS).
    #[error("could not reach the server: {0}")]
    ConnectivityFault(String),

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationExpired | Self::AuthenticationDenied)
    }
}

/// Transport-level failures reported by an [`crate::HttpTransport`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl From<TransportError> for GatewayError {
    fn from(value: TransportError) -> Self {
        GatewayError::ConnectivityFault(value.to_string())
    }
}

/// Durable credential store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to (de)serialize stored entry '{key}': {message}")]
    Serialization { key: &'static str, message: String },

    /// One of the two entries exists without the other.
    #[error("stored session is inconsistent: {0}")]
    Inconsistent(&'static str),
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        StoreError::Backend(value.to_string())
    }
}

/// Failures talking to the authentication endpoints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend refused the credential (401/403).
    #[error("credential rejected by the backend")]
    Rejected,

    #[error("backend server error ({0})")]
    Server(u16),

    #[error("backend unreachable: {0}")]
    Connectivity(String),

    #[error("unexpected backend response ({status}): {message}")]
    Unexpected { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl From<TransportError> for BackendError {
    fn from(value: TransportError) -> Self {
        BackendError::Connectivity(value.to_string())
    }
}

/// Structured login failure; never mutates stored state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is locked")]
    AccountLocked,

    #[error("password has expired")]
    PasswordExpired,

    #[error("login rejected: {message}")]
    Rejected { message: String },

    #[error("could not reach the server: {0}")]
    Connectivity(String),

    #[error("the server failed to handle the login ({0})")]
    Server(u16),

    #[error("malformed login response: {0}")]
    Decode(String),

    #[error("could not persist the session: {0}")]
    Store(#[from] StoreError),
}

impl From<TransportError> for LoginError {
    fn from(value: TransportError) -> Self {
        LoginError::Connectivity(value.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordChangeError {
    #[error("not signed in")]
    NotAuthenticated,

    #[error("current password is incorrect")]
    IncorrectPassword,

    #[error("new password rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("could not persist the session: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("failed to open the session store: {0}")]
    Store(#[from] StoreError),
}
