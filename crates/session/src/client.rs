//! Wiring: one shared session, one coordinator, one gateway.

use std::sync::Arc;

use riskdesk_auth::{RolePolicy, RouteDecision, RouteTable, UserProfile};

use crate::backend::{AuthBackend, HttpAuthBackend};
use crate::config::SessionConfig;
use crate::coordinator::RefreshCoordinator;
use crate::error::ConfigError;
use crate::gateway::RequestGateway;
use crate::lifecycle::SessionLifecycle;
use crate::signal::LogoutSignal;
use crate::state::SessionState;
use crate::store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use crate::transport::{HttpTransport, ReqwestTransport};

/// The console's session core, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct SessionClient {
    session: Arc<SessionState>,
    coordinator: Arc<RefreshCoordinator>,
    gateway: RequestGateway,
    lifecycle: Arc<SessionLifecycle>,
    policy: Arc<RolePolicy>,
}

impl SessionClient {
    /// Build the production stack from configuration and restore any
    /// persisted session.
    pub async fn connect(config: &SessionConfig) -> Result<Self, ConfigError> {
        let store: Arc<dyn CredentialStore> = match &config.session_db {
            Some(path) => Arc::new(SqliteCredentialStore::open(path).await?),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
            config.api_url.clone(),
            config.request_timeout(),
        )?);
        let backend = Arc::new(HttpAuthBackend::new(
            transport.clone(),
            config.endpoints.clone(),
        ));

        let client = Self::assemble(store, transport, backend);
        client.lifecycle.restore().await?;
        tracing::debug!(api_url = %config.api_url, persistent = config.session_db.is_some(), "session client ready");
        Ok(client)
    }

    pub fn assemble(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn HttpTransport>,
        backend: Arc<dyn AuthBackend>,
    ) -> Self {
        let session = Arc::new(SessionState::new(store, LogoutSignal::default()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            session.clone(),
            backend.clone(),
            transport.clone(),
        ));
        let gateway = RequestGateway::new(transport, session.clone(), coordinator.clone());
        let lifecycle = Arc::new(SessionLifecycle::new(
            session.clone(),
            backend,
            coordinator.clone(),
        ));

        Self {
            session,
            coordinator,
            gateway,
            lifecycle,
            policy: Arc::new(RolePolicy::default()),
        }
    }

    /// Replace the role → permission table.
    pub fn with_policy(mut self, policy: RolePolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle> {
        &self.lifecycle
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    fn profile(&self) -> Option<UserProfile> {
        self.session.snapshot().profile().cloned()
    }

    /// Role check against the cached profile; `false` when signed out.
    pub fn has_role(&self, slug: &str) -> bool {
        self.profile().is_some_and(|p| p.has_role(slug))
    }

    /// Permission check against the cached profile; `false` when signed out.
    pub fn has_permission(&self, key: &str) -> bool {
        self.profile()
            .is_some_and(|p| self.policy.has_permission(&p, key))
    }

    pub fn dashboard_route(&self) -> Option<&'static str> {
        self.profile().map(|p| riskdesk_auth::dashboard_route(&p))
    }

    /// Where navigation to `path` should end up.
    pub fn navigate(&self, routes: &RouteTable, path: &str) -> RouteDecision {
        let profile = self.profile();
        routes.decide(&self.policy, profile.as_ref(), path)
    }
}

impl core::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
