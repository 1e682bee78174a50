use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Stable role slugs referenced by route tables and navigation menus.
pub mod slugs {
    pub const ADMIN: &str = "admin";
    pub const COMPLIANCE: &str = "compliance";
    pub const MANAGER: &str = "manager";
    pub const USERS: &str = "users";

    /// The closed set of slugs the console knows about.
    pub const ALL: &[&str] = &[ADMIN, COMPLIANCE, MANAGER, USERS];
}

/// A role assignment as carried on a user profile.
///
/// The slug is the identity used for every check; the display name is only
/// for presentation and never participates in matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    slug: Cow<'static, str>,
    #[serde(default)]
    name: Cow<'static, str>,
}

impl Role {
    pub fn new(slug: impl Into<Cow<'static, str>>, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
        }
    }

    /// Build a role whose display name is derived from the slug.
    pub fn from_slug(slug: impl Into<Cow<'static, str>>) -> Self {
        let slug = slug.into();
        let name = match slug.as_ref() {
            slugs::ADMIN => Cow::Borrowed("Administrator"),
            slugs::COMPLIANCE => Cow::Borrowed("Compliance Officer"),
            slugs::MANAGER => Cow::Borrowed("Manager"),
            slugs::USERS => Cow::Borrowed("User"),
            other => Cow::Owned(other.to_string()),
        };
        Self { slug, name }
    }

    pub fn admin() -> Self {
        Self::from_slug(slugs::ADMIN)
    }

    pub fn compliance() -> Self {
        Self::from_slug(slugs::COMPLIANCE)
    }

    pub fn manager() -> Self {
        Self::from_slug(slugs::MANAGER)
    }

    pub fn users() -> Self {
        Self::from_slug(slugs::USERS)
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Display name; falls back to the slug when the backend sent none.
    pub fn name(&self) -> &str {
        if self.name.is_empty() { &self.slug } else { &self.name }
    }

    /// Exact, case-sensitive slug match.
    pub fn matches(&self, slug: &str) -> bool {
        self.slug == slug
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.slug)
    }
}
