//! Route guarding.
//!
//! A route declares what it needs (a role, a permission, or just a session);
//! the guard turns that plus the cached profile into a navigation decision.
//! The guard never ends a session: an unauthorized visit only redirects.

use std::borrow::Cow;

use crate::policy::{RolePolicy, dashboard_route};
use crate::{Permission, UserProfile};

pub const LOGIN_ROUTE: &str = "/login";
pub const CHANGE_PASSWORD_ROUTE: &str = "/change-password";

/// What a route requires. A route is gated by a role *or* a permission, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRequirement {
    /// Any signed-in user.
    Authenticated,
    Role(Cow<'static, str>),
    Permission(Permission),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: Cow<'static, str>,
    pub requirement: RouteRequirement,
}

impl Route {
    pub fn authenticated(path: impl Into<Cow<'static, str>>) -> Self {
        Self {
            path: path.into(),
            requirement: RouteRequirement::Authenticated,
        }
    }

    pub fn with_role(path: impl Into<Cow<'static, str>>, slug: impl Into<Cow<'static, str>>) -> Self {
        Self {
            path: path.into(),
            requirement: RouteRequirement::Role(slug.into()),
        }
    }

    pub fn with_permission(path: impl Into<Cow<'static, str>>, permission: impl Into<Permission>) -> Self {
        Self {
            path: path.into(),
            requirement: RouteRequirement::Permission(permission.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    RedirectToLogin,
    RedirectToPasswordChange,
    /// Signed in but not allowed here; go to the user's landing route.
    RedirectToDashboard(&'static str),
}

/// Decide whether `user` may navigate to `route`.
pub fn guard(policy: &RolePolicy, user: Option<&UserProfile>, route: &Route) -> RouteDecision {
    let Some(user) = user else {
        return RouteDecision::RedirectToLogin;
    };

    if user.must_change_password {
        return if route.path == CHANGE_PASSWORD_ROUTE {
            RouteDecision::Allow
        } else {
            RouteDecision::RedirectToPasswordChange
        };
    }

    let allowed = match &route.requirement {
        RouteRequirement::Authenticated => true,
        RouteRequirement::Role(slug) => user.has_role(slug),
        RouteRequirement::Permission(perm) => policy.has_permission(user, perm.as_str()),
    };

    if allowed {
        RouteDecision::Allow
    } else {
        tracing::debug!(path = %route.path, username = %user.username, "route denied");
        RouteDecision::RedirectToDashboard(dashboard_route(user))
    }
}

/// The console's declared routes, consulted by navigation menus and the router.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.path == path)
    }

    /// Guard a path; undeclared paths only require a session.
    pub fn decide(&self, policy: &RolePolicy, user: Option<&UserProfile>, path: &str) -> RouteDecision {
        match self.find(path) {
            Some(route) => guard(policy, user, route),
            None => guard(policy, user, &Route::authenticated(path.to_string())),
        }
    }

    /// Routes the user may open, in declaration order (for menus).
    pub fn accessible<'a>(
        &'a self,
        policy: &'a RolePolicy,
        user: &'a UserProfile,
    ) -> impl Iterator<Item = &'a Route> + 'a {
        self.routes
            .iter()
            .filter(move |r| guard(policy, Some(user), r) == RouteDecision::Allow)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        use crate::permissions::catalog;
        use crate::policy::{ADMIN_DASHBOARD_ROUTE, DASHBOARD_ROUTE, RESTRICTED_LANDING_ROUTE};
        use crate::roles::slugs;

        Self::new(vec![
            Route::with_role(ADMIN_DASHBOARD_ROUTE, slugs::ADMIN),
            Route::authenticated(DASHBOARD_ROUTE),
            Route::with_permission(RESTRICTED_LANDING_ROUTE, catalog::VIEW_RISK_ASSESSMENTS),
            Route::with_permission("/customers", catalog::VIEW_CUSTOMERS),
            Route::with_permission("/customers/new", catalog::CREATE_CUSTOMERS),
            Route::with_permission("/risk-assessments/new", catalog::CREATE_RISK_ASSESSMENT),
            Route::with_permission("/reports", catalog::VIEW_REPORTS),
            Route::with_permission("/admin/users", catalog::MANAGE_USERS),
            Route::with_permission("/admin/roles", catalog::MANAGE_ROLES),
            Route::with_permission("/audit-log", catalog::VIEW_AUDIT_LOG),
            Route::authenticated(CHANGE_PASSWORD_ROUTE),
        ])
    }
}
