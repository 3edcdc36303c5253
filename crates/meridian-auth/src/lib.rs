//! Users, tenants, access keys, authentication, and permission evaluation
//! (§4.4, §4.5, §4.6 -- spec C6, C7).
//!
//! This crate owns everything about "who is making this request and what
//! are they allowed to do": password and TOTP-based login with rate
//! limiting and account lockout, JWT issuance/verification, access key
//! lifecycle (including the [`credentials::CredentialProvider`] impl that
//! `meridian-sigv4` verifies signatures against), bucket ACLs and policy
//! documents, and the [`permission::PermissionEvaluator`] that combines all
//! of the above into one allow/deny decision.
//!
//! # Modules
//!
//! - [`model`] - tenant/user/access-key/2FA/lockout record types
//! - [`password`] - bcrypt password hashing
//! - [`totp`] - TOTP 2FA codes and backup codes
//! - [`jwt`] - JWT issuance and verification
//! - [`rate_limit`] - per-IP token-bucket rate limiting
//! - [`users`] - tenant and user CRUD
//! - [`access_keys`] - access key lifecycle and credential lookup
//! - [`acl`] - canned and explicit bucket ACLs
//! - [`policy`] - S3-style bucket policy documents
//! - [`permission`] - the combined authorization decision
//! - [`manager`] - [`manager::AuthManager`], the component's façade

pub mod access_keys;
pub mod acl;
pub mod jwt;
pub mod manager;
pub mod model;
pub mod password;
pub mod permission;
pub mod policy;
pub mod rate_limit;
pub mod totp;
pub mod users;

pub use manager::{AuthManager, LoginOutcome};
pub use model::{AccessKey, AccessKeySummary, LockoutState, NewAccessKey, Status, Tenant, TenantCounters, TwoFactorState, User, UserStatus};
pub use permission::{BucketAuthContext, BucketPermission, Decision, PermissionEvaluator, Subject};
pub use policy::{Condition, Effect, PolicyDocument, Principal, Statement};
