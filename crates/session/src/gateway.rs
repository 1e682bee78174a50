//! Request gateway: every outbound call passes through here.
//!
//! Pre-send the current credential (if any) is attached; post-receive the
//! status is mapped onto [`GatewayError`], and a 401 is handed to the
//! [`RefreshCoordinator`] instead of being retried locally.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use riskdesk_auth::Credential;

use crate::coordinator::RefreshCoordinator;
use crate::error::{GatewayError, TransportError};
use crate::request::{
    ACCEPT, APPLICATION_JSON, AUTHORIZATION, ApiRequest, ApiResponse, CONTENT_TYPE, PendingRequest,
};
use crate::state::SessionState;
use crate::transport::HttpTransport;

/// What a single send produced, before the refresh protocol is involved.
pub(crate) enum Outcome {
    Completed(ApiResponse),
    Unauthorized,
}

/// Apply the default decoration. The gateway owns `Authorization`: a
/// caller-supplied value is dropped.
pub(crate) fn decorate(request: &ApiRequest, credential: Option<&Credential>) -> ApiRequest {
    let mut out = request.clone();
    out.headers
        .retain(|(name, _)| !name.eq_ignore_ascii_case(AUTHORIZATION));

    if out.header(ACCEPT).is_none() {
        out.headers
            .push((ACCEPT.to_string(), APPLICATION_JSON.to_string()));
    }
    if out.body.is_some() && out.header(CONTENT_TYPE).is_none() {
        out.headers
            .push((CONTENT_TYPE.to_string(), APPLICATION_JSON.to_string()));
    }
    if let Some(credential) = credential {
        out.headers
            .push((AUTHORIZATION.to_string(), credential.bearer()));
    }
    out
}

pub(crate) fn classify(
    request: &ApiRequest,
    result: Result<ApiResponse, TransportError>,
) -> Result<Outcome, GatewayError> {
    let resp = result.map_err(|err| {
        tracing::warn!(method = %request.method, path = %request.path, error = %err, "request did not reach the server");
        GatewayError::from(err)
    })?;

    match resp.status {
        401 => Ok(Outcome::Unauthorized),
        403 => Err(GatewayError::AuthorizationDenied {
            path: request.path.clone(),
        }),
        status if status >= 500 => {
            tracing::warn!(method = %request.method, path = %request.path, status, "server fault");
            Err(GatewayError::ServerFault { status })
        }
        _ => Ok(Outcome::Completed(resp)),
    }
}

/// Decorate, send and classify one attempt.
pub(crate) async fn issue(
    transport: &dyn HttpTransport,
    request: &ApiRequest,
    credential: Option<&Credential>,
) -> Result<Outcome, GatewayError> {
    let outbound = decorate(request, credential);
    let result = transport.send(&outbound).await;
    classify(request, result)
}

/// Entry point for every backend call made by the console.
#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestGateway {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionState>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            session,
            coordinator,
        }
    }

    /// Send a request. A 401 is resolved through the refresh protocol: the
    /// caller sees either the replayed response or a final error.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        let snapshot = self.session.snapshot();
        let credential = snapshot.credential();

        match issue(&*self.transport, &request, credential).await? {
            Outcome::Completed(resp) => Ok(resp),
            Outcome::Unauthorized => {
                tracing::debug!(
                    method = %request.method,
                    path = %request.path,
                    generation = snapshot.generation(),
                    epoch = snapshot.epoch(),
                    "credential rejected; handing off to refresh coordinator"
                );
                let pending = PendingRequest::capture(request, &snapshot);
                self.coordinator.recover(pending).await
            }
        }
    }

    /// Send and decode the JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, GatewayError> {
        self.send(request).await?.json()
    }

    pub async fn get(&self, path: impl Into<String>) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: impl Into<String>, body: Value) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::post(path, body)).await
    }

    pub async fn put(&self, path: impl Into<String>, body: Value) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::put(path, body)).await
    }

    pub async fn patch(&self, path: impl Into<String>, body: Value) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::patch(path, body)).await
    }

    pub async fn delete(&self, path: impl Into<String>) -> Result<ApiResponse, GatewayError> {
        self.send(ApiRequest::delete(path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn decoration_owns_authorization_and_defaults_json() {
        let credential = Credential::new("T1", Utc::now());
        let req = ApiRequest::post("/customers", json!({"name": "ACME"}))
            .with_header("authorization", "Bearer forged");

        let out = decorate(&req, Some(&credential));
        assert_eq!(out.bearer_token(), Some("T1"));
        assert_eq!(
            out.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(AUTHORIZATION))
                .count(),
            1
        );
        assert_eq!(out.header(ACCEPT), Some(APPLICATION_JSON));
        assert_eq!(out.header(CONTENT_TYPE), Some(APPLICATION_JSON));

        let anonymous = decorate(&ApiRequest::get("/health"), None);
        assert_eq!(anonymous.header(AUTHORIZATION), None);
        assert_eq!(anonymous.header(CONTENT_TYPE), None);
    }

    #[tokio::test]
    async fn attaches_current_credential() {
        let h = Harness::signed_in("T1").await;
        h.transport.accept("T1");

        let resp = h.gateway.get("/customers").await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(h.transport.sent(), vec![("/customers".to_string(), Some("T1".to_string()))]);
    }

    #[tokio::test]
    async fn anonymous_requests_carry_no_credential() {
        let h = Harness::anonymous();
        let resp = h.gateway.get("/public/health").await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(h.transport.sent(), vec![("/public/health".to_string(), None)]);
    }

    #[tokio::test]
    async fn server_faults_are_not_retried() {
        let h = Harness::signed_in("T1").await;
        h.transport.accept("T1");

        let err = h.gateway.get("/boom").await.unwrap_err();
        assert_eq!(err, GatewayError::ServerFault { status: 500 });
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.backend.calls(), (0, 0));
    }

    #[tokio::test]
    async fn connectivity_faults_are_distinct_and_not_auth_failures() {
        let h = Harness::signed_in("T1").await;

        let err = h.gateway.get("/offline").await.unwrap_err();
        assert!(matches!(err, GatewayError::ConnectivityFault(_)));
        assert!(!err.is_authentication());
        assert_eq!(h.transport.sent().len(), 1);
        assert_eq!(h.backend.calls(), (0, 0));
        assert!(h.session.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn forbidden_never_refreshes_or_logs_out() {
        let h = Harness::signed_in("T1").await;
        h.transport.accept("T1");

        let err = h.gateway.get("/forbidden").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::AuthorizationDenied {
                path: "/forbidden".to_string()
            }
        );
        assert_eq!(h.backend.calls(), (0, 0));
        assert!(h.session.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn typed_responses() {
        #[derive(serde::Deserialize)]
        struct Echo {
            path: String,
        }

        let h = Harness::signed_in("T1").await;
        h.transport.accept("T1");

        let echo: Echo = h.gateway.send_json(ApiRequest::get("/customers/7")).await.unwrap();
        assert_eq!(echo.path, "/customers/7");
    }

    #[tokio::test]
    async fn unauthenticated_401_is_denied_without_refresh() {
        let h = Harness::anonymous();
        let err = h.gateway.get("/customers").await.unwrap_err();
        assert_eq!(err, GatewayError::AuthenticationDenied);
        assert_eq!(h.backend.calls(), (0, 0));
        assert_eq!(h.coordinator.episodes(), 0);
    }
}
