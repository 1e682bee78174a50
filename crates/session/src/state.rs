//! Shared session state: the current credential + profile pair.
//!
//! Readers take a consistent snapshot from a `watch` channel and never block
//! writers. Writes are crate-private and go through one async writer lock so
//! the durable store and the in-memory snapshot change together; only the
//! lifecycle and the refresh coordinator call them.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use riskdesk_auth::{Credential, UserProfile};

use crate::error::StoreError;
use crate::signal::{LogoutReason, LogoutSignal, SessionEnded};
use crate::store::{CredentialStore, StoredSession};

/// An authenticated session: both halves always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub credential: Credential,
    pub profile: UserProfile,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    active: Option<Arc<ActiveSession>>,
    generation: u64,
    epoch: u64,
}

impl SessionSnapshot {
    pub fn credential(&self) -> Option<&Credential> {
        self.active.as_deref().map(|s| &s.credential)
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.active.as_deref().map(|s| &s.profile)
    }

    pub fn active(&self) -> Option<&ActiveSession> {
        self.active.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.active.is_some()
    }

    /// Bumped on every login, credential renewal and logout.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bumped on login, restore and logout; a renewed credential keeps it.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

pub struct SessionState {
    tx: watch::Sender<SessionSnapshot>,
    store: Arc<dyn CredentialStore>,
    signal: LogoutSignal,
    writer: Mutex<()>,
}

impl core::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionState")
            .field("snapshot", &*self.tx.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionState {
    pub fn new(store: Arc<dyn CredentialStore>, signal: LogoutSignal) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            tx,
            store,
            signal,
            writer: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// Observe every snapshot change.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn signal(&self) -> &LogoutSignal {
        &self.signal
    }

    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    fn publish(&self, active: Option<ActiveSession>, new_epoch: bool) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|snap| {
            snap.generation += 1;
            if new_epoch {
                snap.epoch += 1;
            }
            snap.active = active.map(Arc::new);
            generation = snap.generation;
        });
        generation
    }

    /// Load a persisted session into memory. A half-written or unreadable
    /// store is cleared and treated as signed out.
    pub(crate) async fn restore(&self) -> Result<Option<UserProfile>, StoreError> {
        let _w = self.writer.lock().await;

        match self.store.load().await {
            Ok(Some(stored)) => {
                let profile = stored.profile.clone();
                self.publish(
                    Some(ActiveSession {
                        credential: stored.credential,
                        profile: stored.profile,
                    }),
                    true,
                );
                Ok(Some(profile))
            }
            Ok(None) => Ok(None),
            Err(err @ (StoreError::Inconsistent(_) | StoreError::Serialization { .. })) => {
                tracing::warn!(error = %err, "discarding corrupt stored session");
                self.store.clear().await?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Install a fresh session (login). Nothing changes if persisting fails.
    pub(crate) async fn establish(
        &self,
        credential: Credential,
        profile: UserProfile,
    ) -> Result<u64, StoreError> {
        let _w = self.writer.lock().await;

        let stored = StoredSession { credential, profile };
        self.store.save(&stored).await?;

        Ok(self.publish(
            Some(ActiveSession {
                credential: stored.credential,
                profile: stored.profile,
            }),
            true,
        ))
    }

    /// Swap in a renewed credential, but only if the session is still the one
    /// that was current at `expected_generation`. Returns the new generation,
    /// or `None` when the session moved on (e.g. logged out) meanwhile.
    pub(crate) async fn renew(
        &self,
        expected_generation: u64,
        credential: Credential,
        profile: Option<UserProfile>,
    ) -> Option<u64> {
        let _w = self.writer.lock().await;

        let current = self.snapshot();
        if current.generation != expected_generation {
            return None;
        }
        let existing = current.active()?;

        let stored = StoredSession {
            credential,
            profile: profile.unwrap_or_else(|| existing.profile.clone()),
        };
        if let Err(err) = self.store.save(&stored).await {
            // The in-memory session stays usable; the durable copy keeps the
            // previous (still consistent) pair.
            tracing::warn!(error = %err, "failed to persist renewed credential");
        }

        Some(self.publish(
            Some(ActiveSession {
                credential: stored.credential,
                profile: stored.profile,
            }),
            false,
        ))
    }

    /// Clear the forced-password-change flag in place, optionally adopting a
    /// credential the backend issued with the change.
    pub(crate) async fn complete_password_change(
        &self,
        expected_generation: u64,
        credential: Option<Credential>,
    ) -> Result<bool, StoreError> {
        let _w = self.writer.lock().await;

        let current = self.snapshot();
        if current.generation != expected_generation {
            return Ok(false);
        }
        let Some(existing) = current.active() else {
            return Ok(false);
        };

        let mut profile = existing.profile.clone();
        profile.must_change_password = false;
        let renewed = credential.is_some();
        let stored = StoredSession {
            credential: credential.unwrap_or_else(|| existing.credential.clone()),
            profile,
        };
        self.store.save(&stored).await?;

        if renewed {
            self.publish(
                Some(ActiveSession {
                    credential: stored.credential,
                    profile: stored.profile,
                }),
                false,
            );
        } else {
            // Same credential: in-flight requests are not stale.
            self.tx.send_modify(|snap| {
                snap.active = Some(Arc::new(ActiveSession {
                    credential: stored.credential,
                    profile: stored.profile,
                }));
            });
        }
        Ok(true)
    }

    /// End the session: clear both entries, then broadcast once.
    ///
    /// With `expected_generation`, only the session current at that generation
    /// is ended. Returns `false` (and emits nothing) when there was nothing to end.
    pub(crate) async fn terminate(
        &self,
        reason: LogoutReason,
        expected_generation: Option<u64>,
    ) -> bool {
        let _w = self.writer.lock().await;

        let current = self.snapshot();
        if !current.is_authenticated() {
            return false;
        }
        if expected_generation.is_some_and(|g| g != current.generation) {
            return false;
        }

        if let Err(err) = self.store.clear().await {
            tracing::warn!(error = %err, "failed to clear stored session");
        }
        self.publish(None, true);

        let notified = self.signal.emit(SessionEnded {
            reason,
            generation: current.generation,
        });
        tracing::info!(?reason, notified, "session ended");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCredentialStore;
    use chrono::Utc;
    use riskdesk_auth::Role;

    fn state() -> (Arc<MemoryCredentialStore>, SessionState) {
        let store = Arc::new(MemoryCredentialStore::new());
        let state = SessionState::new(store.clone(), LogoutSignal::default());
        (store, state)
    }

    fn profile() -> UserProfile {
        UserProfile::new("Ana", "ana@example.com", "ana", vec![Role::manager()])
    }

    #[tokio::test]
    async fn establish_then_terminate_clears_both_halves() {
        let (store, state) = state();
        let mut ended = state.signal().subscribe();

        let g1 = state
            .establish(Credential::new("T1", Utc::now()), profile())
            .await
            .unwrap();
        assert_eq!(g1, 1);
        assert!(state.snapshot().is_authenticated());

        assert!(state.terminate(LogoutReason::UserRequested, None).await);

        let snap = state.snapshot();
        assert!(snap.credential().is_none());
        assert!(snap.profile().is_none());
        assert_eq!(snap.generation(), 2);
        assert_eq!(store.load().await.unwrap(), None);

        let event = ended.try_recv().unwrap();
        assert_eq!(event.generation, 1);
        assert!(ended.try_recv().is_err());

        // Nothing left to end.
        assert!(!state.terminate(LogoutReason::UserRequested, None).await);
    }

    #[tokio::test]
    async fn renew_ignores_a_session_that_moved_on() {
        let (_store, state) = state();
        let g1 = state
            .establish(Credential::new("T1", Utc::now()), profile())
            .await
            .unwrap();

        state.terminate(LogoutReason::UserRequested, None).await;
        assert_eq!(
            state.renew(g1, Credential::new("T2", Utc::now()), None).await,
            None
        );
        assert!(!state.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn renew_keeps_profile_unless_replaced() {
        let (store, state) = state();
        let g1 = state
            .establish(Credential::new("T1", Utc::now()), profile())
            .await
            .unwrap();

        let g2 = state
            .renew(g1, Credential::new("T2", Utc::now()), None)
            .await
            .unwrap();
        assert_eq!(g2, g1 + 1);

        let snap = state.snapshot();
        assert_eq!(snap.credential().unwrap().token(), "T2");
        assert_eq!(snap.profile().unwrap().username, "ana");
        assert_eq!(
            store.load().await.unwrap().unwrap().credential.token(),
            "T2"
        );
    }

    #[tokio::test]
    async fn epoch_changes_with_the_session_not_the_credential() {
        let (_store, state) = state();
        let g1 = state
            .establish(Credential::new("T1", Utc::now()), profile())
            .await
            .unwrap();
        let first = state.epoch();

        state
            .renew(g1, Credential::new("T2", Utc::now()), None)
            .await
            .unwrap();
        assert_eq!(state.epoch(), first);

        state.terminate(LogoutReason::UserRequested, None).await;
        let signed_out = state.epoch();
        assert_ne!(signed_out, first);

        state
            .establish(Credential::new("T3", Utc::now()), profile())
            .await
            .unwrap();
        assert_ne!(state.epoch(), first);
        assert_ne!(state.epoch(), signed_out);
    }

    #[tokio::test]
    async fn corrupt_store_restores_as_signed_out() {
        let (store, state) = state();
        store.put_raw(crate::store::PROFILE_KEY, "{}");

        assert_eq!(state.restore().await.unwrap(), None);
        assert!(store.entry(crate::store::PROFILE_KEY).is_none());
        assert!(!state.snapshot().is_authenticated());
    }
}
