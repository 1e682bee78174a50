use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::permissions::catalog;
use crate::roles::slugs;
use crate::{Permission, UserProfile};

/// Landing route for administrators.
pub const ADMIN_DASHBOARD_ROUTE: &str = "/admin/dashboard";
/// Landing route for compliance officers and managers.
pub const DASHBOARD_ROUTE: &str = "/dashboard";
/// Single-purpose landing route for everyone else.
pub const RESTRICTED_LANDING_ROUTE: &str = "/risk-assessments";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),

    #[error("forbidden: missing role '{0}'")]
    MissingRole(String),
}

/// True iff any of the user's roles matches `slug` exactly.
pub fn has_role(user: &UserProfile, slug: &str) -> bool {
    user.has_role(slug)
}

/// Landing route after login.
///
/// Pure function of the role set: admin wins over compliance/manager, which
/// win over everything else.
pub fn dashboard_route(user: &UserProfile) -> &'static str {
    if has_role(user, slugs::ADMIN) {
        ADMIN_DASHBOARD_ROUTE
    } else if has_role(user, slugs::COMPLIANCE) || has_role(user, slugs::MANAGER) {
        DASHBOARD_ROUTE
    } else {
        RESTRICTED_LANDING_ROUTE
    }
}

/// Role → permission table.
///
/// A user's effective permission set is the union over all of their roles.
/// Unknown roles grant nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    grants: BTreeMap<String, BTreeSet<Permission>>,
}

impl RolePolicy {
    pub fn empty() -> Self {
        Self {
            grants: BTreeMap::new(),
        }
    }

    /// Grant permissions to a role (additive).
    pub fn grant<I, P>(mut self, role: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.grants
            .entry(role.to_string())
            .or_default()
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Permissions granted by a single role.
    pub fn permissions_of(&self, role: &str) -> impl Iterator<Item = &Permission> {
        self.grants.get(role).into_iter().flatten()
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.grants.keys().map(String::as_str)
    }

    /// Sorted union of the permissions granted by all of the user's roles.
    pub fn effective_permissions(&self, user: &UserProfile) -> BTreeSet<Permission> {
        user.role_slugs()
            .flat_map(|slug| self.permissions_of(slug))
            .cloned()
            .collect()
    }

    /// True iff `key` is reachable through at least one of the user's roles.
    pub fn has_permission(&self, user: &UserProfile, key: &str) -> bool {
        user.role_slugs()
            .any(|slug| self.permissions_of(slug).any(|p| p.as_str() == key))
    }

    /// Registry of all roles for audit/display.
    pub fn registry(&self) -> Vec<RoleDefinition> {
        self.grants
            .iter()
            .map(|(name, perms)| RoleDefinition {
                name: name.clone(),
                permissions: perms.iter().map(|p| p.as_str().to_string()).collect(),
            })
            .collect()
    }
}

impl Default for RolePolicy {
    /// The console's shipped role table.
    fn default() -> Self {
        use catalog::*;

        RolePolicy::empty()
            .grant(slugs::ADMIN, catalog::ALL.iter().copied())
            .grant(
                slugs::COMPLIANCE,
                [
                    VIEW_CUSTOMERS,
                    VIEW_RISK_ASSESSMENTS,
                    CREATE_RISK_ASSESSMENT,
                    APPROVE_RISK_ASSESSMENT,
                    VIEW_REPORTS,
                    EXPORT_REPORTS,
                    VIEW_AUDIT_LOG,
                ],
            )
            .grant(
                slugs::MANAGER,
                [
                    VIEW_CUSTOMERS,
                    CREATE_CUSTOMERS,
                    EDIT_CUSTOMERS,
                    VIEW_RISK_ASSESSMENTS,
                    CREATE_RISK_ASSESSMENT,
                    VIEW_REPORTS,
                    EXPORT_REPORTS,
                ],
            )
            .grant(
                slugs::USERS,
                [VIEW_CUSTOMERS, VIEW_RISK_ASSESSMENTS, CREATE_RISK_ASSESSMENT],
            )
    }
}

/// Action-level authorization check.
///
/// - No IO
/// - No panics
/// - Never triggers refresh or logout; callers surface the error as-is
pub fn authorize(
    policy: &RolePolicy,
    user: Option<&UserProfile>,
    required: &Permission,
) -> Result<(), AuthzError> {
    let user = user.ok_or(AuthzError::Unauthenticated)?;
    if policy.has_permission(user, required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: String,
    pub granted: bool,
    pub reason: String,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
    /// Roles held by the user that grant the permission.
    pub granting_roles: Vec<String>,
    /// Roles in the policy that would grant it, if the user has none.
    pub suggested_roles: Vec<String>,
}

/// Role definition with its granted permissions (for audit/display).
#[derive(Debug, Clone, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Explain why an authorization decision was made (or would be made).
pub fn explain_authorization(
    policy: &RolePolicy,
    user: &UserProfile,
    required: &Permission,
) -> AuthorizationExplanation {
    let required_str = required.as_str();

    let granting_roles: Vec<String> = user
        .role_slugs()
        .filter(|slug| policy.permissions_of(slug).any(|p| p == required))
        .map(str::to_string)
        .collect();

    let effective_permissions: Vec<String> = policy
        .effective_permissions(user)
        .iter()
        .map(|p| p.as_str().to_string())
        .collect();

    let granted = !granting_roles.is_empty();

    let (reason, suggested_roles) = if granted {
        (
            format!("granted '{}' via role(s) {:?}", required_str, granting_roles),
            Vec::new(),
        )
    } else {
        let suggested: Vec<String> = policy
            .roles()
            .filter(|role| policy.permissions_of(role).any(|p| p == required))
            .map(str::to_string)
            .collect();
        let reason = if suggested.is_empty() {
            format!("no role grants '{}'", required_str)
        } else {
            format!(
                "missing '{}'; granted by role(s) {:?}",
                required_str, suggested
            )
        };
        (reason, suggested)
    };

    AuthorizationExplanation {
        required_permission: required_str.to_string(),
        granted,
        reason,
        roles: user.role_slugs().map(str::to_string).collect(),
        effective_permissions,
        granting_roles,
        suggested_roles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn user(roles: Vec<Role>) -> UserProfile {
        UserProfile::new("Test", "test@example.com", "test", roles)
    }

    #[test]
    fn dashboard_priority_order() {
        assert_eq!(
            dashboard_route(&user(vec![Role::admin(), Role::manager()])),
            ADMIN_DASHBOARD_ROUTE
        );
        assert_eq!(
            dashboard_route(&user(vec![Role::manager(), Role::admin()])),
            ADMIN_DASHBOARD_ROUTE
        );
        assert_eq!(dashboard_route(&user(vec![Role::manager()])), DASHBOARD_ROUTE);
        assert_eq!(dashboard_route(&user(vec![Role::compliance()])), DASHBOARD_ROUTE);
        assert_eq!(dashboard_route(&user(vec![Role::users()])), RESTRICTED_LANDING_ROUTE);
        assert_eq!(dashboard_route(&user(vec![])), RESTRICTED_LANDING_ROUTE);
    }

    #[test]
    fn permission_is_union_over_roles() {
        let policy = RolePolicy::default();
        let u = user(vec![Role::users(), Role::compliance()]);

        // from users
        assert!(policy.has_permission(&u, catalog::CREATE_RISK_ASSESSMENT));
        // from compliance
        assert!(policy.has_permission(&u, catalog::APPROVE_RISK_ASSESSMENT));
        // from neither
        assert!(!policy.has_permission(&u, catalog::MANAGE_USERS));
    }

    #[test]
    fn unknown_permission_and_unknown_role_grant_nothing() {
        let policy = RolePolicy::default();
        let admin = user(vec![Role::admin()]);
        assert!(!policy.has_permission(&admin, "launch missiles"));

        let stranger = user(vec![Role::from_slug("auditor")]);
        assert!(policy.effective_permissions(&stranger).is_empty());
    }

    #[test]
    fn authorize_distinguishes_unauthenticated_from_forbidden() {
        let policy = RolePolicy::default();
        let perm = Permission::from_static(catalog::MANAGE_ROLES);

        assert_eq!(authorize(&policy, None, &perm), Err(AuthzError::Unauthenticated));

        let manager = user(vec![Role::manager()]);
        assert_eq!(
            authorize(&policy, Some(&manager), &perm),
            Err(AuthzError::Forbidden("manage roles".to_string()))
        );

        let admin = user(vec![Role::admin()]);
        assert!(authorize(&policy, Some(&admin), &perm).is_ok());
    }

    #[test]
    fn explanation_suggests_granting_roles() {
        let policy = RolePolicy::default();
        let u = user(vec![Role::users()]);
        let explanation =
            explain_authorization(&policy, &u, &Permission::from_static(catalog::VIEW_AUDIT_LOG));

        assert!(!explanation.granted);
        assert!(explanation.granting_roles.is_empty());
        assert_eq!(
            explanation.suggested_roles,
            vec!["admin".to_string(), "compliance".to_string()]
        );

        let granted =
            explain_authorization(&policy, &u, &Permission::from_static(catalog::VIEW_CUSTOMERS));
        assert!(granted.granted);
        assert_eq!(granted.granting_roles, vec!["users".to_string()]);
    }

    #[test]
    fn registry_lists_every_shipped_role() {
        let registry = RolePolicy::default().registry();
        let names: Vec<&str> = registry.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "compliance", "manager", "users"]);
        assert_eq!(registry[0].permissions.len(), catalog::ALL.len());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn role_set() -> impl Strategy<Value = Vec<Role>> {
            proptest::sample::subsequence(slugs::ALL.to_vec(), 0..=slugs::ALL.len())
                .prop_map(|s| s.into_iter().map(Role::from_slug).collect())
        }

        proptest! {
            #[test]
            fn dashboard_route_is_deterministic(roles in role_set()) {
                let u = user(roles);
                prop_assert_eq!(dashboard_route(&u), dashboard_route(&u.clone()));
            }

            #[test]
            fn has_permission_matches_union(roles in role_set(), idx in 0..catalog::ALL.len()) {
                let policy = RolePolicy::default();
                let u = user(roles);
                let key = catalog::ALL[idx];

                let reachable = u
                    .role_slugs()
                    .any(|slug| policy.permissions_of(slug).any(|p| p.as_str() == key));

                prop_assert_eq!(policy.has_permission(&u, key), reachable);
                prop_assert_eq!(
                    policy.effective_permissions(&u).contains(&Permission::from_static(key)),
                    reachable
                );
            }

            #[test]
            fn admin_always_lands_on_admin_dashboard(roles in role_set()) {
                let mut roles = roles;
                roles.push(Role::admin());
                prop_assert_eq!(dashboard_route(&user(roles)), ADMIN_DASHBOARD_ROUTE);
            }
        }
    }
}
