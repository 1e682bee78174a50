//! Single-flight credential refresh.
//!
//! The first request rejected with a 401 becomes the *leader* of a refresh
//! episode: it validates the current credential, refreshes it if needed, and
//! then replays itself and every *follower* that was rejected while the
//! episode was running, in arrival order. Each request is replayed at most
//! once. Any rejection that cannot be fixed ends the session exactly once.
//! A request is only ever replayed within the login it was first sent under.
//!
//! The phase lives behind a `std::sync::Mutex` that is never held across an
//! await point; followers park on a `oneshot` until the leader resolves them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use riskdesk_auth::Credential;

use crate::backend::{AuthBackend, Validation};
use crate::error::{BackendError, GatewayError};
use crate::gateway::{Outcome, issue};
use crate::queue::FollowerQueue;
use crate::request::{ApiResponse, PendingRequest};
use crate::signal::LogoutReason;
use crate::state::SessionState;
use crate::transport::HttpTransport;

type Reply = oneshot::Sender<Result<ApiResponse, GatewayError>>;

/// Observable phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

struct Follower {
    pending: PendingRequest,
    reply: Reply,
}

enum Phase {
    Idle,
    Refreshing {
        episode: u64,
        epoch: u64,
        queue: FollowerQueue<Follower>,
    },
}

struct Inner {
    phase: Phase,
    episodes: u64,
}

/// What a rejected request has to do, decided under the lock.
enum Assignment {
    Lead {
        episode: u64,
        generation: u64,
        credential: Credential,
        pending: PendingRequest,
    },
    Follow(oneshot::Receiver<Result<ApiResponse, GatewayError>>),
    /// The credential changed after the request was sent; retry with the
    /// current one instead of refreshing again.
    Replay(PendingRequest),
    /// No session to recover, or not the one the request was sent under.
    Deny,
}

enum Replayed {
    Answered(Result<ApiResponse, GatewayError>),
    /// 401 again with the current credential.
    Rejected,
    /// The login the request belonged to has ended.
    Orphaned,
}

impl Replayed {
    fn into_result(self) -> Result<ApiResponse, GatewayError> {
        match self {
            Replayed::Answered(result) => result,
            Replayed::Rejected | Replayed::Orphaned => Err(GatewayError::AuthenticationDenied),
        }
    }
}

enum EpisodeOutcome {
    /// A usable credential is in place (revalidated or refreshed).
    Renewed,
    /// The backend refused to renew the credential.
    Rejected,
    /// The backend could not answer; the credential is kept.
    Unavailable(GatewayError),
    /// The session changed while the episode ran.
    Superseded,
}

pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    session: Arc<SessionState>,
    backend: Arc<dyn AuthBackend>,
    transport: Arc<dyn HttpTransport>,
}

impl RefreshCoordinator {
    pub fn new(
        session: Arc<SessionState>,
        backend: Arc<dyn AuthBackend>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                episodes: 0,
            }),
            session,
            backend,
            transport,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> RefreshState {
        match self.lock().phase {
            Phase::Idle => RefreshState::Idle,
            Phase::Refreshing { .. } => RefreshState::Refreshing,
        }
    }

    /// Followers parked behind the running episode.
    pub fn queued(&self) -> usize {
        match &self.lock().phase {
            Phase::Idle => 0,
            Phase::Refreshing { queue, .. } => queue.len(),
        }
    }

    /// Number of refresh episodes started so far.
    pub fn episodes(&self) -> u64 {
        self.lock().episodes
    }

    /// Resolve a request the backend answered with 401.
    pub async fn recover(&self, pending: PendingRequest) -> Result<ApiResponse, GatewayError> {
        if pending.retried || !pending.authenticated {
            return Err(GatewayError::AuthenticationDenied);
        }

        let pending_epoch = pending.epoch;
        match self.assign(pending) {
            Assignment::Deny => {
                tracing::debug!(epoch = pending_epoch, "401 outside the current session; not refreshing");
                Err(GatewayError::AuthenticationDenied)
            }
            Assignment::Follow(rx) => rx.await.unwrap_or(Err(GatewayError::AuthenticationExpired)),
            Assignment::Replay(pending) => {
                tracing::debug!(
                    path = %pending.request.path,
                    sent_with = pending.generation,
                    "credential already renewed; replaying"
                );
                let generation = self.session.generation();
                let replayed = self.replay(pending).await;
                if matches!(replayed, Replayed::Rejected) {
                    self.session
                        .terminate(LogoutReason::CredentialRejected, Some(generation))
                        .await;
                }
                replayed.into_result()
            }
            Assignment::Lead {
                episode,
                generation,
                credential,
                pending,
            } => self.lead(episode, generation, credential, pending).await,
        }
    }

    fn assign(&self, pending: PendingRequest) -> Assignment {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if let Phase::Refreshing {
            episode,
            epoch,
            queue,
        } = &mut inner.phase
        {
            if *epoch != pending.epoch {
                return Assignment::Deny;
            }
            let (tx, rx) = oneshot::channel();
            let position = queue.push(Follower { pending, reply: tx });
            tracing::debug!(episode = *episode, position, "queued behind refresh");
            return Assignment::Follow(rx);
        }

        let snapshot = self.session.snapshot();
        let Some(active) = snapshot.active() else {
            return Assignment::Deny;
        };
        if snapshot.epoch() != pending.epoch {
            return Assignment::Deny;
        }
        if snapshot.generation() != pending.generation {
            return Assignment::Replay(pending);
        }

        inner.episodes += 1;
        let episode = inner.episodes;
        inner.phase = Phase::Refreshing {
            episode,
            epoch: pending.epoch,
            queue: FollowerQueue::new(),
        };
        Assignment::Lead {
            episode,
            generation: snapshot.generation(),
            credential: active.credential.clone(),
            pending,
        }
    }

    async fn lead(
        &self,
        episode: u64,
        generation: u64,
        credential: Credential,
        pending: PendingRequest,
    ) -> Result<ApiResponse, GatewayError> {
        let mut guard = EpisodeGuard {
            coordinator: self,
            episode,
            armed: true,
        };
        tracing::info!(episode, generation, "refresh episode started");

        let outcome = self.run_episode(generation, &credential).await;
        // `None` when a logout already failed the followers.
        let followers = guard.finish().unwrap_or_default();

        match outcome {
            EpisodeOutcome::Renewed => self.replay_all(pending, followers).await,
            EpisodeOutcome::Superseded => {
                // Requests of an ended login come back as orphaned.
                tracing::debug!(episode, "session changed during refresh");
                self.replay_all(pending, followers).await
            }
            EpisodeOutcome::Rejected => {
                // Clear first so followers observe the signed-out state.
                self.session
                    .terminate(LogoutReason::CredentialRejected, Some(generation))
                    .await;
                resolve_all(followers, &Err(GatewayError::AuthenticationDenied));
                Err(GatewayError::AuthenticationDenied)
            }
            EpisodeOutcome::Unavailable(err) => {
                let result = Err(err);
                resolve_all(followers, &result);
                result
            }
        }
    }

    async fn run_episode(&self, generation: u64, credential: &Credential) -> EpisodeOutcome {
        match self.backend.validate(credential).await {
            Ok(Validation::Valid) => {
                let snapshot = self.session.snapshot();
                return if snapshot.is_authenticated() && snapshot.generation() == generation {
                    tracing::debug!("credential still valid; reusing it");
                    EpisodeOutcome::Renewed
                } else {
                    EpisodeOutcome::Superseded
                };
            }
            Ok(Validation::Invalid) => {}
            Err(err) => tracing::warn!(error = %err, "credential validation failed"),
        }

        match self.backend.refresh(credential).await {
            Ok(grant) => {
                let (credential, profile) = grant.into_credential("refresh");
                match self.session.renew(generation, credential, profile).await {
                    Some(renewed) => {
                        tracing::info!(generation = renewed, "credential refreshed");
                        EpisodeOutcome::Renewed
                    }
                    None => EpisodeOutcome::Superseded,
                }
            }
            Err(BackendError::Connectivity(message)) => {
                tracing::warn!(%message, "refresh endpoint unreachable; keeping credential");
                EpisodeOutcome::Unavailable(GatewayError::ConnectivityFault(message))
            }
            Err(BackendError::Server(status)) => {
                tracing::warn!(status, "refresh endpoint failed; keeping credential");
                EpisodeOutcome::Unavailable(GatewayError::ServerFault { status })
            }
            Err(err) => {
                tracing::warn!(error = %err, "credential refresh rejected");
                EpisodeOutcome::Rejected
            }
        }
    }

    /// Replay the leader, then each follower in arrival order. A second 401
    /// anywhere in the batch ends the session once, after the whole batch ran.
    async fn replay_all(
        &self,
        pending: PendingRequest,
        followers: FollowerQueue<Follower>,
    ) -> Result<ApiResponse, GatewayError> {
        let generation = self.session.generation();

        let own = self.replay(pending).await;
        let mut rejected = matches!(own, Replayed::Rejected);
        let own = own.into_result();

        let mut resolved = Vec::with_capacity(followers.len());
        for follower in followers.drain() {
            let replayed = self.replay(follower.pending).await;
            rejected |= matches!(replayed, Replayed::Rejected);
            resolved.push((follower.reply, replayed.into_result()));
        }

        if rejected {
            self.session
                .terminate(LogoutReason::CredentialRejected, Some(generation))
                .await;
        }
        for (reply, result) in resolved {
            let _ = reply.send(result);
        }
        own
    }

    async fn replay(&self, mut pending: PendingRequest) -> Replayed {
        pending.retried = true;
        let snapshot = self.session.snapshot();
        if snapshot.epoch() != pending.epoch {
            tracing::debug!(path = %pending.request.path, "session replaced; dropping request");
            return Replayed::Orphaned;
        }
        let Some(credential) = snapshot.credential() else {
            return Replayed::Orphaned;
        };

        tracing::debug!(method = %pending.request.method, path = %pending.request.path, "replaying request");
        match issue(&*self.transport, &pending.request, Some(credential)).await {
            Ok(Outcome::Completed(resp)) => Replayed::Answered(Ok(resp)),
            Ok(Outcome::Unauthorized) => {
                tracing::warn!(path = %pending.request.path, "replayed request rejected again");
                Replayed::Rejected
            }
            Err(err) => Replayed::Answered(Err(err)),
        }
    }

    /// Take the followers of `episode` and return to idle, unless the episode
    /// was already cancelled or replaced.
    fn take_episode(&self, episode: u64) -> Option<FollowerQueue<Follower>> {
        let mut inner = self.lock();
        match &inner.phase {
            Phase::Refreshing { episode: current, .. } if *current == episode => {}
            _ => return None,
        }
        match std::mem::replace(&mut inner.phase, Phase::Idle) {
            Phase::Refreshing { queue, .. } => Some(queue),
            Phase::Idle => None,
        }
    }

    /// Abort the running episode (logout): every follower fails with
    /// `AuthenticationDenied` now, and the leader's late result is discarded.
    /// Returns how many followers were failed.
    pub(crate) fn cancel_episode(&self) -> usize {
        let cancelled = {
            let mut inner = self.lock();
            match std::mem::replace(&mut inner.phase, Phase::Idle) {
                Phase::Refreshing { episode, queue, .. } => Some((episode, queue)),
                Phase::Idle => None,
            }
        };

        let Some((episode, queue)) = cancelled else {
            return 0;
        };
        let failed = queue.len();
        resolve_all(queue, &Err(GatewayError::AuthenticationDenied));
        tracing::info!(episode, failed, "refresh episode cancelled");
        failed
    }
}

impl core::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("queued", &self.queued())
            .field("episodes", &self.episodes())
            .finish_non_exhaustive()
    }
}

fn resolve_all(
    followers: FollowerQueue<Follower>,
    result: &Result<ApiResponse, GatewayError>,
) {
    for follower in followers.drain() {
        let _ = follower.reply.send(result.clone());
    }
}

/// Returns the coordinator to idle if the leader's future is dropped
/// mid-episode, so later 401s are not parked forever.
struct EpisodeGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    episode: u64,
    armed: bool,
}

impl EpisodeGuard<'_> {
    fn finish(&mut self) -> Option<FollowerQueue<Follower>> {
        self.armed = false;
        self.coordinator.take_episode(self.episode)
    }
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some(queue) = self.coordinator.take_episode(self.episode) {
            tracing::warn!(episode = self.episode, "refresh episode abandoned by its leader");
            resolve_all(queue, &Err(GatewayError::AuthenticationExpired));
        }
    }
}
