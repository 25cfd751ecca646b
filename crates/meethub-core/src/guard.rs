//! Role-based route authorization.
//!
//! `RouteGuard` decides whether navigation to a path is allowed, using only
//! the locally stored session. It never talks to the backend, so a role
//! changed server-side is only seen after the next login or token refresh.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenStore;
use crate::models::{CurrentUser, ParseRoleError, Role};

/// Roles allowed into a route subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub allowed_roles: Vec<Role>,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            prefix: prefix.into(),
            allowed_roles: roles.into_iter().collect(),
        }
    }

    /// Build a rule from role names such as `"admin"` or `"business-owner"`
    pub fn from_role_names(prefix: impl Into<String>, roles: &[&str]) -> Result<Self, ParseRoleError> {
        let allowed_roles = roles
            .iter()
            .map(|r| r.parse())
            .collect::<Result<Vec<Role>, _>>()?;
        Ok(Self {
            prefix: prefix.into(),
            allowed_roles,
        })
    }

    /// Prefix match on whole path segments: `/admin` covers `/admin/users`, not `/administrators`
    fn matches(&self, path: &str) -> bool {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// No session; carries the login path
    RedirectToLogin(String),
    /// Signed in with a role the route does not accept; carries the landing path
    RedirectToUnauthorized(String),
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GuardDecision::Allow)
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    rules: Vec<RouteRule>,
    login_path: String,
    unauthorized_path: String,
}

impl RouteGuard {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self {
            rules,
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
        }
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_unauthorized_path(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_path = path.into();
        self
    }

    /// Rules for the platform's dashboards: admin-only, pm-and-admin,
    /// business-owner-and-admin and every authenticated role.
    pub fn default_rules() -> Vec<RouteRule> {
        vec![
            RouteRule::new("/admin", [Role::Admin]),
            RouteRule::new("/pm", [Role::Pm, Role::Admin]),
            RouteRule::new("/business", [Role::BusinessOwner, Role::Admin]),
            RouteRule::new("/member", Role::ALL),
            RouteRule::new("/meetings", Role::ALL),
            RouteRule::new("/projects", Role::ALL),
            RouteRule::new("/tasks", Role::ALL),
            RouteRule::new("/profile", Role::ALL),
        ]
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn unauthorized_path(&self) -> &str {
        &self.unauthorized_path
    }

    /// Most specific rule covering `path`; paths no rule covers are public
    fn rule_for(&self, path: &str) -> Option<&RouteRule> {
        let path = path.split(|c: char| c == '?' || c == '#').next().unwrap_or(path);
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.prefix.trim_end_matches('/').len())
    }

    /// Decide navigation to `path` for the session in `tokens`
    pub fn check(&self, path: &str, tokens: &TokenStore) -> GuardDecision {
        let user = if tokens.is_authenticated() {
            tokens.current_user()
        } else {
            None
        };
        self.check_user(path, user.as_ref())
    }

    /// Decide navigation to `path` for an already loaded user (`None` = no session)
    pub fn check_user(&self, path: &str, user: Option<&CurrentUser>) -> GuardDecision {
        let Some(rule) = self.rule_for(path) else {
            return GuardDecision::Allow;
        };

        let Some(user) = user else {
            debug!(path, "No session, redirecting to login");
            return GuardDecision::RedirectToLogin(self.login_path.clone());
        };

        if rule.allows(user.role) {
            GuardDecision::Allow
        } else {
            debug!(path, role = %user.role, "Role not allowed for route");
            GuardDecision::RedirectToUnauthorized(self.unauthorized_path.clone())
        }
    }
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}
