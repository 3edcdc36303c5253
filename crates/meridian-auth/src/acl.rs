//! Bucket/object ownership, ACL grants, and canned ACLs (§4.5 steps 3-4, 7).

use serde::{Deserialize, Serialize};

/// Who owns a bucket (§3: "owner `{owner_id, owner_type}`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    User,
    Tenant,
}

/// A bucket or object owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub owner_type: OwnerType,
    pub owner_id: String,
}

/// The access level an ACL grant or bucket permission row confers.
///
/// Ordered: `FullControl` satisfies a `Write` or `Read` requirement, `Write`
/// satisfies only `Write`, `Read` satisfies only `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Read,
    Write,
    FullControl,
}

impl Level {
    /// Whether this level satisfies a request that needs `required`.
    #[must_use]
    pub fn satisfies(self, required: Level) -> bool {
        self == Level::FullControl || self == required
    }

    /// The level an S3 action requires, inferred from its verb.
    #[must_use]
    pub fn required_for_action(action: &str) -> Level {
        let verb = action.rsplit(':').next().unwrap_or(action);
        if verb.starts_with("Get")
            || verb.starts_with("List")
            || verb.starts_with("Head")
            || verb.starts_with("Describe")
        {
            Level::Read
        } else if verb.contains("Acl") || verb.contains("Policy") || verb.contains("Ownership") {
            Level::FullControl
        } else {
            Level::Write
        }
    }
}

/// Who an ACL grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grantee {
    /// The resource owner (always implicitly granted `FullControl`).
    Owner,
    /// Any authenticated user of any tenant.
    AuthenticatedUsers,
    /// Any caller, including anonymous/presigned access.
    AllUsers,
    /// One specific user.
    User(String),
}

/// A single ACL grant: grantee plus the level conferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclGrant {
    pub grantee: Grantee,
    pub level: Level,
}

/// The S3 canned ACL names, expanded into their implied grant lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CannedAcl {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl CannedAcl {
    /// Expand this canned ACL into the grants it implies, in addition to
    /// the owner's always-implicit `FullControl`.
    #[must_use]
    pub fn grants(self) -> Vec<AclGrant> {
        match self {
            CannedAcl::Private | CannedAcl::BucketOwnerFullControl => vec![],
            CannedAcl::PublicRead | CannedAcl::BucketOwnerRead => vec![AclGrant {
                grantee: Grantee::AllUsers,
                level: Level::Read,
            }],
            CannedAcl::PublicReadWrite => vec![
                AclGrant {
                    grantee: Grantee::AllUsers,
                    level: Level::Read,
                },
                AclGrant {
                    grantee: Grantee::AllUsers,
                    level: Level::Write,
                },
            ],
            CannedAcl::AuthenticatedRead => vec![AclGrant {
                grantee: Grantee::AuthenticatedUsers,
                level: Level::Read,
            }],
        }
    }
}

/// A resource's full ACL configuration: a canned baseline plus explicit
/// grants layered on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AclConfig {
    pub canned: CannedAcl,
    pub explicit_grants: Vec<AclGrant>,
}

impl AclConfig {
    /// Whether `caller` (`None` for anonymous) is granted at least
    /// `required` by this ACL, given the resource `owner`.
    #[must_use]
    pub fn allows(&self, caller: Option<&str>, authenticated: bool, required: Level, owner: &Owner) -> bool {
        if owner.owner_type == OwnerType::User && Some(owner.owner_id.as_str()) == caller {
            return true;
        }
        let grants = self.canned.grants().into_iter().chain(self.explicit_grants.iter().cloned());
        for grant in grants {
            let matches = match &grant.grantee {
                Grantee::Owner => Some(owner.owner_id.as_str()) == caller,
                Grantee::AllUsers => true,
                Grantee::AuthenticatedUsers => authenticated,
                Grantee::User(id) => Some(id.as_str()) == caller,
            };
            if matches && grant.level.satisfies(required) {
                return true;
            }
        }
        false
    }
}
