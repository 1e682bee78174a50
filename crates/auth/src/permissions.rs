use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque capability keys (e.g. "view customers").
/// The console references them by name through [`catalog`]; this crate only
/// evaluates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::from_static(value)
    }
}

/// The closed enumeration of capability keys used by the console.
pub mod catalog {
    pub const VIEW_CUSTOMERS: &str = "view customers";
    pub const CREATE_CUSTOMERS: &str = "create customers";
    pub const EDIT_CUSTOMERS: &str = "edit customers";
    pub const DELETE_CUSTOMERS: &str = "delete customers";

    pub const VIEW_RISK_ASSESSMENTS: &str = "view risk assessments";
    pub const CREATE_RISK_ASSESSMENT: &str = "create risk assessment";
    pub const APPROVE_RISK_ASSESSMENT: &str = "approve risk assessment";

    pub const VIEW_REPORTS: &str = "view reports";
    pub const EXPORT_REPORTS: &str = "export reports";

    pub const MANAGE_USERS: &str = "manage users";
    pub const MANAGE_ROLES: &str = "manage roles";
    pub const VIEW_AUDIT_LOG: &str = "view audit log";

    pub const ALL: &[&str] = &[
        VIEW_CUSTOMERS,
        CREATE_CUSTOMERS,
        EDIT_CUSTOMERS,
        DELETE_CUSTOMERS,
        VIEW_RISK_ASSESSMENTS,
        CREATE_RISK_ASSESSMENT,
        APPROVE_RISK_ASSESSMENT,
        VIEW_REPORTS,
        EXPORT_REPORTS,
        MANAGE_USERS,
        MANAGE_ROLES,
        VIEW_AUDIT_LOG,
    ];

    /// Grouping used when listing permissions for audit screens.
    pub fn category(key: &str) -> Option<&'static str> {
        if key.ends_with("customers") {
            Some("customers")
        } else if key.contains("risk assessment") {
            Some("risk")
        } else if key.ends_with("reports") {
            Some("reporting")
        } else if ALL.contains(&key) {
            Some("administration")
        } else {
            None
        }
    }
}
