//! `riskdesk-session`: session and request core of the RiskDesk console.
//!
//! - [`RequestGateway`]: every backend call; attaches the credential and
//!   classifies failures.
//! - [`RefreshCoordinator`]: single-flight credential refresh with ordered
//!   replay of the requests rejected meanwhile.
//! - [`SessionLifecycle`]: login, logout, restore and the forced password change.
//! - [`SessionState`] / [`CredentialStore`]: the in-memory snapshot and its
//!   durable copy, always updated together.

pub mod backend;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod queue;
pub mod request;
pub mod signal;
pub mod state;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{AuthBackend, CredentialGrant, HttpAuthBackend, LoginGrant, Validation};
pub use client::SessionClient;
pub use config::{AuthEndpoints, SessionConfig};
pub use coordinator::{RefreshCoordinator, RefreshState};
pub use error::{
    BackendError, ConfigError, GatewayError, LoginError, PasswordChangeError, StoreError,
    TransportError,
};
pub use gateway::RequestGateway;
pub use lifecycle::SessionLifecycle;
pub use request::{ApiRequest, ApiResponse, Method, PendingRequest};
pub use signal::{LogoutReason, LogoutSignal, SessionEnded};
pub use state::{ActiveSession, SessionSnapshot, SessionState};
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore, StoredSession};
pub use transport::{HttpTransport, ReqwestTransport};
