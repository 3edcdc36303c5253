//! `PermissionEvaluator` (C7, §4.5): combines ownership, bucket permission
//! rows, bucket policy, and ACL to authorize one `(user, action, bucket,
//! object?)` request.
//!
//! Deliberately takes every input it needs as plain data rather than
//! fetching it itself, breaking the cyclic manager reference the source
//! has between bucket and auth managers (§9: "refactor the filter to take
//! the evaluator as a collaborator").

use meridian_core::{RequestContext, Role, TenantId, UserId};
use serde::{Deserialize, Serialize};

use crate::acl::{AclConfig, Level, Owner, OwnerType};
use crate::policy::{EvalContext, PolicyDocument};

/// Who a [`BucketPermission`] row grants access to: either one specific user
/// or every user in a tenant (§4.5, §5 data model: exactly one of
/// `user_id`/`tenant_id` is set).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    User(UserId),
    Tenant(TenantId),
}

/// One row granting a subject (user or tenant) a level of access on a
/// bucket, optionally time-limited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketPermission {
    pub subject: Subject,
    pub level: Level,
    /// The admin or bucket owner who created this grant, for audit (§5).
    pub granted_by: UserId,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl BucketPermission {
    fn is_active(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.is_none_or(|exp| exp > now)
    }

    fn matches(&self, ctx: &RequestContext) -> bool {
        match &self.subject {
            Subject::User(user_id) => *user_id == ctx.user_id,
            Subject::Tenant(tenant_id) => *tenant_id == ctx.tenant_id,
        }
    }
}

/// Everything about one bucket the evaluator needs to authorize a request
/// against it. Constructed by the caller (`meridian-objects`) from its own
/// bucket record; this crate never reaches into bucket storage directly.
#[derive(Debug, Clone)]
pub struct BucketAuthContext {
    pub owner: Owner,
    pub tenant_id: TenantId,
    pub permissions: Vec<BucketPermission>,
    pub policy: Option<PolicyDocument>,
    pub acl: AclConfig,
    pub tenant_suspended: bool,
}

/// The outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Evaluates the §4.5 precedence chain. Holds no state: every call is pure
/// with respect to its inputs.
#[derive(Debug, Default)]
pub struct PermissionEvaluator;

impl PermissionEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Authorize `ctx` to perform `action` (e.g. `"s3:GetObject"`) against
    /// `resource` (an ARN-shaped string the policy/condition layer matches
    /// against) inside `bucket`, optionally scoped to `object_key`.
    #[must_use]
    pub fn evaluate(
        &self,
        ctx: &RequestContext,
        action: &str,
        resource: &str,
        object_key: Option<&str>,
        bucket: &BucketAuthContext,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Decision {
        // 1. Deny if tenant status=suspended.
        if bucket.tenant_suspended {
            return Decision::Deny;
        }

        // 2. Allow if user is global admin.
        if ctx.is_global_admin() {
            return Decision::Allow;
        }

        // 3. Allow if user is tenant admin and the bucket's tenant matches.
        if ctx.is_tenant_admin_of(&bucket.tenant_id) {
            return Decision::Allow;
        }

        // 4. Allow if bucket owner is this user.
        if bucket.owner.owner_type == OwnerType::User && bucket.owner.owner_id == ctx.user_id.as_str() {
            return Decision::Allow;
        }

        let required = Level::required_for_action(action);

        // 5. Allow on a matching, unexpired BucketPermission row (user- or
        // tenant-scoped).
        let has_permission_row = bucket
            .permissions
            .iter()
            .any(|p| p.matches(ctx) && p.is_active(now) && p.level.satisfies(required));
        if has_permission_row {
            return Decision::Allow;
        }

        // 6. Bucket policy: explicit Deny always wins.
        let eval_ctx = EvalContext {
            source_ip: ctx.client_ip,
            now,
            object_key,
        };
        if let Some(policy) = &bucket.policy {
            match policy.evaluate(Some(ctx.user_id.as_str()), action, resource, &eval_ctx) {
                Some(crate::policy::Effect::Deny) => return Decision::Deny,
                Some(crate::policy::Effect::Allow) => return Decision::Allow,
                None => {}
            }
        }

        // 7. ACL grants.
        let authenticated = !ctx.roles.is_empty();
        if bucket.acl.allows(Some(ctx.user_id.as_str()), authenticated, required, &bucket.owner) {
            return Decision::Allow;
        }

        // 8. Otherwise deny.
        Decision::Deny
    }

    /// Authorize an anonymous caller (no `RequestContext`), used for
    /// presigned/public access where there is no authenticated identity.
    #[must_use]
    pub fn evaluate_anonymous(
        &self,
        action: &str,
        resource: &str,
        object_key: Option<&str>,
        bucket: &BucketAuthContext,
        source_ip: Option<std::net::IpAddr>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Decision {
        if bucket.tenant_suspended {
            return Decision::Deny;
        }

        let required = Level::required_for_action(action);
        let eval_ctx = EvalContext {
            source_ip,
            now,
            object_key,
        };
        if let Some(policy) = &bucket.policy {
            match policy.evaluate(None, action, resource, &eval_ctx) {
                Some(crate::policy::Effect::Deny) => return Decision::Deny,
                Some(crate::policy::Effect::Allow) => return Decision::Allow,
                None => {}
            }
        }

        if bucket.acl.allows(None, false, required, &bucket.owner) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

#[cfg(test)]
mod tests {
    use meridian_core::UserId;

    use super::*;
    use crate::acl::CannedAcl;

    fn ctx(user: &str, tenant: &str, roles: Vec<Role>) -> RequestContext {
        RequestContext {
            user_id: UserId::new(user).unwrap(),
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

    fn bucket(owner_id: &str, tenant: &str) -> BucketAuthContext {
        BucketAuthContext {
            owner: Owner {
                owner_type: OwnerType::User,
                owner_id: owner_id.to_owned(),
            },
            tenant_id: TenantId::new(tenant).unwrap(),
            permissions: vec![],
            policy: None,
            acl: AclConfig::default(),
            tenant_suspended: false,
        }
    }

    #[test]
    fn test_suspended_tenant_denies_everyone() {
        let mut b = bucket("owner", "t1");
        b.tenant_suspended = true;
        let c = ctx("owner", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Deny
        );
    }

    #[test]
    fn test_global_admin_always_allowed() {
        let b = bucket("someone-else", "t1");
        let c = ctx("root", "", vec![Role::Admin]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:DeleteBucket", "arn:b", None, &b, chrono::Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn test_owner_allowed_without_any_permission_row() {
        let b = bucket("alice", "t1");
        let c = ctx("alice", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:PutObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn test_stranger_denied_without_grant() {
        let b = bucket("alice", "t1");
        let c = ctx("mallory", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Deny
        );
    }

    #[test]
    fn test_unexpired_permission_row_grants_access() {
        let mut b = bucket("alice", "t1");
        b.permissions.push(BucketPermission {
            subject: Subject::User(UserId::new("bob").unwrap()),
            level: Level::Read,
            granted_by: UserId::new("alice").unwrap(),
            expires_at: None,
        });
        let c = ctx("bob", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn test_expired_permission_row_does_not_grant_access() {
        let mut b = bucket("alice", "t1");
        b.permissions.push(BucketPermission {
            subject: Subject::User(UserId::new("bob").unwrap()),
            level: Level::Read,
            granted_by: UserId::new("alice").unwrap(),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        });
        let c = ctx("bob", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Deny
        );
    }

    #[test]
    fn test_tenant_scoped_permission_row_grants_every_user_in_tenant() {
        let mut b = bucket("alice", "t1");
        b.permissions.push(BucketPermission {
            subject: Subject::Tenant(TenantId::new("t1").unwrap()),
            level: Level::Read,
            granted_by: UserId::new("alice").unwrap(),
            expires_at: None,
        });
        let c = ctx("anyone-in-t1", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn test_tenant_scoped_permission_row_does_not_leak_to_other_tenants() {
        let mut b = bucket("alice", "t1");
        b.permissions.push(BucketPermission {
            subject: Subject::Tenant(TenantId::new("t1").unwrap()),
            level: Level::Read,
            granted_by: UserId::new("alice").unwrap(),
            expires_at: None,
        });
        let c = ctx("mallory", "t2", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Deny
        );
    }

    #[test]
    fn test_acl_grant_is_last_resort_before_deny() {
        let mut b = bucket("alice", "t1");
        b.acl.canned = CannedAcl::PublicRead;
        let c = ctx("mallory", "t1", vec![Role::User]);
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate(&c, "s3:GetObject", "arn:b/k", None, &b, chrono::Utc::now()),
            Decision::Allow
        );
    }

    #[test]
    fn test_anonymous_public_read_succeeds() {
        let mut b = bucket("alice", "t1");
        b.acl.canned = CannedAcl::PublicRead;
        let eval = PermissionEvaluator::new();
        assert_eq!(
            eval.evaluate_anonymous("s3:GetObject", "arn:b/k", None, &b, None, chrono::Utc::now()),
            Decision::Allow
        );
    }
}
