//! Sign-in, sign-out and the forced password change.

use std::sync::Arc;

use tokio::sync::broadcast;

use riskdesk_auth::{Credential, UserProfile};

use crate::backend::AuthBackend;
use crate::coordinator::RefreshCoordinator;
use crate::error::{LoginError, PasswordChangeError, StoreError};
use crate::signal::{LogoutReason, SessionEnded};
use crate::state::SessionState;

/// Owns every user-initiated session transition.
///
/// Requests never carry ambient header state: the gateway reads the
/// credential from the current snapshot on each send, so clearing the
/// snapshot on logout is all it takes to stop sending the old token.
pub struct SessionLifecycle {
    session: Arc<SessionState>,
    backend: Arc<dyn AuthBackend>,
    coordinator: Arc<RefreshCoordinator>,
}

impl SessionLifecycle {
    pub fn new(
        session: Arc<SessionState>,
        backend: Arc<dyn AuthBackend>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            session,
            backend,
            coordinator,
        }
    }

    /// Load the session persisted by a previous run, if any.
    pub async fn restore(&self) -> Result<Option<UserProfile>, StoreError> {
        let restored = self.session.restore().await?;
        if let Some(profile) = &restored {
            tracing::info!(username = %profile.username, "session restored");
        }
        Ok(restored)
    }

    /// Exchange login credentials for a session. On failure nothing stored
    /// changes.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<UserProfile, LoginError> {
        let identifier = identifier.trim();
        if identifier.is_empty() || secret.is_empty() {
            return Err(LoginError::InvalidCredentials);
        }

        let grant = self
            .backend
            .login(identifier, secret)
            .await
            .inspect_err(|err| tracing::warn!(username = %identifier, error = %err, "login failed"))?;

        let (credential, profile) = grant.into_parts();
        let generation = self.session.establish(credential, profile.clone()).await?;
        tracing::info!(
            username = %profile.username,
            generation,
            must_change_password = profile.must_change_password,
            "signed in"
        );
        Ok(profile)
    }

    /// Sign out. Clears both stored entries, broadcasts one
    /// [`SessionEnded`], and fails any request parked behind a refresh.
    /// Returns `false` when there was no session.
    pub async fn logout(&self) -> bool {
        let ended = self
            .session
            .terminate(LogoutReason::UserRequested, None)
            .await;
        self.coordinator.cancel_episode();
        ended
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.session.signal().subscribe()
    }

    pub fn current_profile(&self) -> Option<UserProfile> {
        self.session.snapshot().profile().cloned()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.session.snapshot().credential().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.snapshot().is_authenticated()
    }

    /// Navigation must go to the password-change screen until this clears.
    pub fn requires_password_change(&self) -> bool {
        self.session
            .snapshot()
            .profile()
            .is_some_and(|p| p.must_change_password)
    }

    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), PasswordChangeError> {
        let snapshot = self.session.snapshot();
        let Some(active) = snapshot.active() else {
            return Err(PasswordChangeError::NotAuthenticated);
        };
        if new.is_empty() {
            return Err(PasswordChangeError::Rejected(
                "new password must not be empty".to_string(),
            ));
        }
        if new == current {
            return Err(PasswordChangeError::Rejected(
                "new password must differ from the current one".to_string(),
            ));
        }

        let grant = self
            .backend
            .change_password(&active.credential, current, new)
            .await?;
        let rotated = grant.map(|g| g.into_credential("password-change").0);

        if !self
            .session
            .complete_password_change(snapshot.generation(), rotated)
            .await?
        {
            return Err(PasswordChangeError::NotAuthenticated);
        }
        tracing::info!(username = %active.profile.username, "password changed");
        Ok(())
    }
}

impl core::fmt::Debug for SessionLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionLifecycle")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
