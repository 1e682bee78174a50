//! Scripted fakes for the session core's unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;

use riskdesk_auth::{Credential, Role, UserProfile};

use crate::backend::{AuthBackend, CredentialGrant, LoginGrant, Validation};
use crate::client::SessionClient;
use crate::coordinator::RefreshCoordinator;
use crate::error::{BackendError, LoginError, PasswordChangeError, TransportError};
use crate::gateway::RequestGateway;
use crate::lifecycle::SessionLifecycle;
use crate::request::{ApiRequest, ApiResponse};
use crate::state::SessionState;
use crate::store::MemoryCredentialStore;
use crate::transport::HttpTransport;

pub(crate) const PASSWORD: &str = "correct horse";

/// Poll `check` until it holds, yielding to spawned tasks in between.
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub(crate) fn profile(username: &str, roles: Vec<Role>) -> UserProfile {
    UserProfile::new(
        username.to_uppercase(),
        format!("{username}@riskdesk.test"),
        username,
        roles,
    )
}

/// Answers like the console's API:
/// - `/public/*` is open
/// - `/boom` fails with 500, `/forbidden` with 403, `/offline` never connects
/// - `/stubborn` rejects every credential
/// - `/slow` parks until released, then behaves like any other path
/// - everything else echoes `{path, token}` for an accepted bearer token, 401 otherwise
pub(crate) struct ScriptedTransport {
    accepted: Mutex<HashSet<String>>,
    log: Mutex<Vec<(String, Option<String>)>>,
    reject_next: AtomicUsize,
    slow_gate: Semaphore,
    slow_held: AtomicBool,
    waiting: AtomicUsize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self {
            accepted: Mutex::new(HashSet::new()),
            log: Mutex::new(Vec::new()),
            reject_next: AtomicUsize::new(0),
            slow_gate: Semaphore::new(0),
            slow_held: AtomicBool::new(false),
            waiting: AtomicUsize::new(0),
        }
    }
}

impl ScriptedTransport {
    pub(crate) fn accept(&self, token: &str) {
        self.accepted.lock().unwrap().insert(token.to_string());
    }

    /// Answer the next `n` credentialed requests with 401 regardless of token.
    pub(crate) fn reject_next(&self, n: usize) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    pub(crate) fn hold_slow(&self) {
        self.slow_held.store(true, Ordering::SeqCst);
    }

    pub(crate) fn release_slow(&self, permits: usize) {
        self.slow_gate.add_permits(permits);
    }

    /// Requests currently parked on `/slow`.
    pub(crate) fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// `(path, bearer token)` of every request, in send order.
    pub(crate) fn sent(&self) -> Vec<(String, Option<String>)> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let token = request.bearer_token().map(str::to_string);
        let path = request.path.as_str();

        if path == "/slow" && self.slow_held.load(Ordering::SeqCst) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            self.slow_gate.acquire().await.unwrap().forget();
            self.waiting.fetch_sub(1, Ordering::SeqCst);
        }
        self.log
            .lock()
            .unwrap()
            .push((request.path.clone(), token.clone()));

        match path {
            "/offline" => return Err(TransportError::Connect("connection refused".into())),
            "/boom" => return Ok(ApiResponse::new(500, json!({"error": "boom"}))),
            "/forbidden" => return Ok(ApiResponse::new(403, json!({"error": "forbidden"}))),
            p if p.starts_with("/public/") => return Ok(ApiResponse::new(200, json!({"path": p}))),
            _ => {}
        }

        let forced = token.is_some()
            && self
                .reject_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        let accepted = token
            .as_ref()
            .is_some_and(|t| self.accepted.lock().unwrap().contains(t));

        if forced || !accepted || path == "/stubborn" {
            return Ok(ApiResponse::new(401, json!({"error": "unauthorized"})));
        }
        Ok(ApiResponse::new(200, json!({"path": path, "token": token})))
    }
}

/// Auth endpoints with scripted answers. Refreshes issue `T2`, `T3`, ... and
/// make the transport accept them.
pub(crate) struct ScriptedBackend {
    transport: Arc<ScriptedTransport>,
    validation: Mutex<Result<Validation, BackendError>>,
    refresh_failures: Mutex<VecDeque<BackendError>>,
    rotate_on_password_change: AtomicBool,
    gate: Semaphore,
    held: AtomicBool,
    validate_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    issued: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new(transport: Arc<ScriptedTransport>) -> Self {
        Self {
            transport,
            validation: Mutex::new(Ok(Validation::Invalid)),
            refresh_failures: Mutex::new(VecDeque::new()),
            rotate_on_password_change: AtomicBool::new(false),
            gate: Semaphore::new(0),
            held: AtomicBool::new(false),
            validate_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
        }
    }

    /// Park every refresh until [`release`](Self::release) is called.
    pub(crate) fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let one parked refresh through.
    pub(crate) fn release(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn set_validation(&self, answer: Result<Validation, BackendError>) {
        *self.validation.lock().unwrap() = answer;
    }

    /// Fail the next refresh with `err`.
    pub(crate) fn fail_refresh(&self, err: BackendError) {
        self.refresh_failures.lock().unwrap().push_back(err);
    }

    pub(crate) fn rotate_on_password_change(&self) {
        self.rotate_on_password_change.store(true, Ordering::SeqCst);
    }

    /// `(validate, refresh)` call counts.
    pub(crate) fn calls(&self) -> (usize, usize) {
        (
            self.validate_calls.load(Ordering::SeqCst),
            self.refresh_calls.load(Ordering::SeqCst),
        )
    }

    fn issue(&self) -> CredentialGrant {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 2;
        let token = format!("T{n}");
        self.transport.accept(&token);
        CredentialGrant {
            token,
            expires_at: None,
            profile: None,
        }
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn validate(&self, _credential: &Credential) -> Result<Validation, BackendError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.validation.lock().unwrap().clone()
    }

    async fn refresh(&self, _credential: &Credential) -> Result<CredentialGrant, BackendError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.held.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
        let failure = self.refresh_failures.lock().unwrap().pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(self.issue()),
        }
    }

    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginGrant, LoginError> {
        let roles = match identifier {
            "locked" => return Err(LoginError::AccountLocked),
            "admin" => vec![Role::admin()],
            "auditor" => vec![Role::compliance()],
            "analyst" => vec![Role::users()],
            _ => vec![Role::manager()],
        };
        if secret != PASSWORD {
            return Err(LoginError::InvalidCredentials);
        }

        let token = format!("L-{identifier}");
        self.transport.accept(&token);
        let mut user = profile(identifier, roles);
        user.must_change_password = identifier == "newhire";
        Ok(LoginGrant {
            token,
            expires_at: None,
            user,
        })
    }

    async fn change_password(
        &self,
        _credential: &Credential,
        current: &str,
        _new: &str,
    ) -> Result<Option<CredentialGrant>, PasswordChangeError> {
        if current != PASSWORD {
            return Err(PasswordChangeError::IncorrectPassword);
        }
        if self.rotate_on_password_change.load(Ordering::SeqCst) {
            return Ok(Some(self.issue()));
        }
        Ok(None)
    }
}

/// A fully wired client over the scripted fakes.
pub(crate) struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<MemoryCredentialStore>,
    pub client: SessionClient,
    pub session: Arc<SessionState>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub gateway: RequestGateway,
    pub lifecycle: Arc<SessionLifecycle>,
}

impl Harness {
    pub(crate) fn anonymous() -> Self {
        Self::with_store(Arc::new(MemoryCredentialStore::new()))
    }

    pub(crate) fn with_store(store: Arc<MemoryCredentialStore>) -> Self {
        let transport = Arc::new(ScriptedTransport::default());
        let backend = Arc::new(ScriptedBackend::new(transport.clone()));
        let client = SessionClient::assemble(store.clone(), transport.clone(), backend.clone());

        Self {
            session: client.session().clone(),
            coordinator: client.coordinator().clone(),
            gateway: client.gateway().clone(),
            lifecycle: client.lifecycle().clone(),
            transport,
            backend,
            store,
            client,
        }
    }

    /// Signed in as a manager holding `token`. The transport does not accept
    /// the token until told to.
    pub(crate) async fn signed_in(token: &str) -> Self {
        let h = Self::anonymous();
        h.session
            .establish(
                Credential::new(token, Utc::now()),
                profile("ana", vec![Role::manager()]),
            )
            .await
            .unwrap();
        h
    }
}
