//! Authentication endpoints consumed by the session core.
//!
//! These calls go straight to the transport, never through the gateway: a
//! refresh must not itself trigger the refresh protocol.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use riskdesk_auth::{Credential, UserProfile};

use crate::config::AuthEndpoints;
use crate::error::{BackendError, LoginError, PasswordChangeError};
use crate::request::{ACCEPT, APPLICATION_JSON, AUTHORIZATION, ApiRequest, ApiResponse};
use crate::transport::HttpTransport;

/// Answer of the "is this still good" endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid,
}

/// A credential issued by the backend (refresh or password change).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialGrant {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Present when the backend sends an updated profile along.
    #[serde(default, alias = "user")]
    pub profile: Option<UserProfile>,
}

impl CredentialGrant {
    pub fn into_credential(self, context: &str) -> (Credential, Option<UserProfile>) {
        let credential = Credential::new(self.token, Utc::now())
            .with_context(context)
            .with_expiry(self.expires_at);
        (credential, self.profile)
    }
}

/// Successful login: credential and profile arrive together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginGrant {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(alias = "profile")]
    pub user: UserProfile,
}

impl LoginGrant {
    pub fn into_parts(self) -> (Credential, UserProfile) {
        let credential = Credential::new(self.token, Utc::now())
            .with_context("login")
            .with_expiry(self.expires_at);
        (credential, self.user)
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn validate(&self, credential: &Credential) -> Result<Validation, BackendError>;

    async fn refresh(&self, credential: &Credential) -> Result<CredentialGrant, BackendError>;

    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, LoginError>;

    /// `Ok(Some(_))` when the backend rotated the credential with the change.
    async fn change_password(
        &self,
        credential: &Credential,
        current: &str,
        new: &str,
    ) -> Result<Option<CredentialGrant>, PasswordChangeError>;
}

/// Error body shape used by the backend's auth endpoints.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn from_response(resp: &ApiResponse) -> Self {
        serde_json::from_value(resp.body.clone()).unwrap_or_default()
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }
}

fn unexpected(resp: &ApiResponse) -> BackendError {
    BackendError::Unexpected {
        status: resp.status,
        message: ErrorBody::from_response(resp).message_or("no message"),
    }
}

/// `AuthBackend` over HTTP.
pub struct HttpAuthBackend {
    transport: Arc<dyn HttpTransport>,
    endpoints: AuthEndpoints,
}

impl HttpAuthBackend {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: AuthEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    fn request(path: &str, credential: Option<&Credential>, body: serde_json::Value) -> ApiRequest {
        let mut req = ApiRequest::post(path, body).with_header(ACCEPT, APPLICATION_JSON);
        if let Some(c) = credential {
            req = req.with_header(AUTHORIZATION, c.bearer());
        }
        req
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn validate(&self, credential: &Credential) -> Result<Validation, BackendError> {
        let req = Self::request(&self.endpoints.validate, Some(credential), json!({}));
        let resp = self.transport.send(&req).await?;

        match resp.status {
            s if (200..300).contains(&s) => {
                // A body of `{"valid": false}` also means invalid.
                let valid = resp
                    .body
                    .get("valid")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                Ok(if valid { Validation::Valid } else { Validation::Invalid })
            }
            401 | 403 => Ok(Validation::Invalid),
            s if s >= 500 => Err(BackendError::Server(s)),
            _ => Err(unexpected(&resp)),
        }
    }

    async fn refresh(&self, credential: &Credential) -> Result<CredentialGrant, BackendError> {
        let req = Self::request(&self.endpoints.refresh, Some(credential), json!({}));
        let resp = self.transport.send(&req).await?;

        match resp.status {
            s if (200..300).contains(&s) => {
                serde_json::from_value(resp.body).map_err(|e| BackendError::Decode(e.to_string()))
            }
            401 | 403 => Err(BackendError::Rejected),
            s if s >= 500 => Err(BackendError::Server(s)),
            _ => Err(unexpected(&resp)),
        }
    }

    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, LoginError> {
        let req = Self::request(
            &self.endpoints.login,
            None,
            json!({ "username": identifier, "password": secret }),
        );
        let resp = self.transport.send(&req).await?;

        if resp.is_success() {
            return serde_json::from_value(resp.body).map_err(|e| LoginError::Decode(e.to_string()));
        }

        let body = ErrorBody::from_response(&resp);
        match (resp.status, body.code.as_deref()) {
            (_, Some("account_locked")) | (423, _) => Err(LoginError::AccountLocked),
            (_, Some("password_expired")) => Err(LoginError::PasswordExpired),
            (_, Some("invalid_credentials")) | (401, _) => Err(LoginError::InvalidCredentials),
            (s, _) if s >= 500 => Err(LoginError::Server(s)),
            _ => Err(LoginError::Rejected {
                message: body.message_or("login rejected"),
            }),
        }
    }

    async fn change_password(
        &self,
        credential: &Credential,
        current: &str,
        new: &str,
    ) -> Result<Option<CredentialGrant>, PasswordChangeError> {
        let req = Self::request(
            &self.endpoints.change_password,
            Some(credential),
            json!({ "current_password": current, "new_password": new }),
        );
        let resp = self
            .transport
            .send(&req)
            .await
            .map_err(BackendError::from)?;

        match resp.status {
            204 => Ok(None),
            s if (200..300).contains(&s) => {
                if resp.body.get("token").is_some() {
                    serde_json::from_value(resp.body)
                        .map(Some)
                        .map_err(|e| BackendError::Decode(e.to_string()).into())
                } else {
                    Ok(None)
                }
            }
            401 => Err(BackendError::Rejected.into()),
            403 => Err(PasswordChangeError::IncorrectPassword),
            400 | 422 => Err(PasswordChangeError::Rejected(
                ErrorBody::from_response(&resp).message_or("password does not meet policy"),
            )),
            s if s >= 500 => Err(BackendError::Server(s).into()),
            _ => Err(unexpected(&resp).into()),
        }
    }
}
