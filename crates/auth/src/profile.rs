//! Cached user profile as returned by the backend at login/refresh.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Role;

/// Identifier of a console user.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

/// Identity plus role assignments of the signed-in user.
///
/// # Invariants
/// - Replaced wholesale on login/refresh, never patched field by field
///   (the password-change flag is the one in-place mutation).
/// - Role order is preserved as sent by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    /// While set, the console blocks everything except the password-change screen.
    #[serde(default)]
    pub must_change_password: bool,
}

impl UserProfile {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        username: impl Into<String>,
        roles: Vec<Role>,
    ) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
            username: username.into(),
            roles,
            must_change_password: false,
        }
    }

    /// True iff any assigned role has exactly this slug.
    pub fn has_role(&self, slug: &str) -> bool {
        self.roles.iter().any(|r| r.matches(slug))
    }

    pub fn role_slugs(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.slug())
    }
}
