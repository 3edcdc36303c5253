//! The typed request context threaded through handlers.
//!
//! Source pattern requiring re-architecture (§9): `context.WithValue("user",
//! user)` string-keyed lookups. Here, authentication middleware (the
//! out-of-scope `RequestBoundary` capability) produces one [`RequestContext`]
//! per request; everything downstream reads typed fields off it instead of
//! doing a string-keyed context lookup.

use std::net::IpAddr;

use crate::ids::{TenantId, UserId};

/// The set of role flags a user can hold (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Role {
    /// Global administrator (empty tenant id).
    Admin,
    /// Administrator scoped to one tenant.
    TenantAdmin,
    /// Ordinary authenticated user.
    User,
    /// Read-only user.
    Read,
}

/// Everything downstream components need to know about the authenticated
/// caller of the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The authenticated user id.
    pub user_id: UserId,
    /// The user's tenant, if any (empty for a global admin).
    pub tenant_id: TenantId,
    /// The roles held by the user.
    pub roles: Vec<Role>,
    /// The client IP address, used for rate limiting and policy conditions.
    pub client_ip: Option<IpAddr>,
    /// A tenant id override taken from a query parameter.
    ///
    /// Per §9's resolved Open Question, an override is honored **only**
    /// when the caller is a global admin; every endpoint enforces this the
    /// same way instead of the source's inconsistent per-handler rule.
    pub tenant_override: Option<TenantId>,
}

impl RequestContext {
    /// Whether this caller is a global admin (`Role::Admin` with an empty
    /// tenant id).
    #[must_use]
    pub fn is_global_admin(&self) -> bool {
        self.tenant_id.is_global() && self.roles.contains(&Role::Admin)
    }

    /// Whether this caller is a tenant admin for the given tenant.
    #[must_use]
    pub fn is_tenant_admin_of(&self, tenant: &TenantId) -> bool {
        self.roles.contains(&Role::TenantAdmin) && &self.tenant_id == tenant
    }

    /// Resolve the effective tenant id for this request: the
    /// `tenant_override` if present and the caller is a global admin,
    /// otherwise the caller's own tenant.
    #[must_use]
    pub fn effective_tenant(&self) -> TenantId {
        match &self.tenant_override {
            Some(t) if self.is_global_admin() => t.clone(),
            _ => self.tenant_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(roles: Vec<Role>, tenant: &str) -> RequestContext {
        RequestContext {
            user_id: UserId::new("u1").unwrap(),
            tenant_id: if tenant.is_empty() {
                TenantId::global()
            } else {
                TenantId::new(tenant).unwrap()
            },
            roles,
            client_ip: None,
            tenant_override: None,
        }
    }

    #[test]
    fn test_global_admin_override_is_honored() {
        let mut c = ctx(vec![Role::Admin], "");
        c.tenant_override = Some(TenantId::new("t2").unwrap());
        assert_eq!(c.effective_tenant().as_str(), "t2");
    }

    #[test]
    fn test_non_admin_override_is_ignored() {
        let mut c = ctx(vec![Role::User], "t1");
        c.tenant_override = Some(TenantId::new("t2").unwrap());
        assert_eq!(c.effective_tenant().as_str(), "t1");
    }

    #[test]
    fn test_tenant_admin_scope() {
        let c = ctx(vec![Role::TenantAdmin], "t1");
        assert!(c.is_tenant_admin_of(&TenantId::new("t1").unwrap()));
        assert!(!c.is_tenant_admin_of(&TenantId::new("t2").unwrap()));
    }
}
