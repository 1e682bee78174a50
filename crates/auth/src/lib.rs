//! `riskdesk-auth`: pure authorization model for the RiskDesk console.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows what a
//! credential, a profile, a role and a permission are, and how to turn a role
//! set into route and action decisions. Nothing here performs IO.

pub mod credential;
pub mod guard;
pub mod permissions;
pub mod policy;
pub mod profile;
pub mod roles;

pub use credential::{Credential, CredentialError};
pub use guard::{Route, RouteDecision, RouteRequirement, RouteTable, guard};
pub use permissions::Permission;
pub use policy::{AuthzError, RolePolicy, authorize, dashboard_route, has_role};
pub use profile::{UserId, UserProfile};
pub use roles::Role;
