//! `AuthManager` (C6, §4.4): users, tenants, access keys, JWT, password
//! hashing, 2FA, rate limiting, account lockout.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use meridian_core::{CoreError, CoreResult, Role, TenantId, UserId};
use meridian_metadata::{MetadataStore, keys};

use crate::model::{AccessKey, AccessKeySummary, LockoutState, NewAccessKey, TwoFactorState, User, UserStatus};
use crate::rate_limit::RateLimiter;
use crate::{access_keys, jwt, password, totp, users};

const LOCKOUT_THRESHOLD: u32 = 5;
const LOCKOUT_WINDOW: Duration = Duration::minutes(15);
const LOCKOUT_DURATION: Duration = Duration::minutes(15);
const TOTP_ISSUER: &str = "Meridian";

fn encode<T: serde::Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CoreError::Internal(anyhow::anyhow!("encode: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| CoreError::Internal(anyhow::anyhow!("decode: {e}")))
}

/// The outcome of a login attempt, mirroring S4's `{locked}` /
/// `{requires_2fa}` / `{token, user}` shapes without committing to any wire
/// format.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// Account locked; includes when it unlocks.
    Locked { locked_until: DateTime<Utc> },
    /// Password correct but 2FA still required.
    RequiresTwoFactor { user_id: UserId },
    /// Fully authenticated; a JWT has been issued.
    Authenticated { token: String, user_id: UserId },
}

/// Users, tenants, access keys, and their authentication flows.
pub struct AuthManager {
    store: Arc<dyn MetadataStore>,
    jwt_secret: Arc<str>,
    rate_limiter: RateLimiter,
}

impl AuthManager {
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            jwt_secret: jwt_secret.into(),
            rate_limiter: RateLimiter::new(),
        }
    }

    /// Materialize the configured bootstrap admin/access key on first
    /// startup, if no global admin user exists yet. Idempotent across
    /// restarts (§6.4, `SPEC_FULL.md` "Bootstrap admin/access key").
    pub fn bootstrap(&self, access_key_id: &str, secret_access_key: &str, username: &str) -> CoreResult<()> {
        if self.store.get(&keys::access_key(access_key_id))?.is_none() {
            let user_id = UserId::generate();
            let user = User {
                id: user_id.clone(),
                tenant_id: TenantId::global(),
                username: username.to_owned(),
                password_hash: password::hash(secret_access_key)?,
                roles: vec![Role::Admin],
                status: UserStatus::Active,
                totp_secret: None,
                two_factor_enabled: false,
                created_at: Utc::now(),
            };
            users::create_user(self.store.as_ref(), &user)?;

            let record = AccessKey {
                access_key_id: access_key_id.to_owned(),
                secret_access_key: secret_access_key.to_owned(),
                user_id: user_id.clone(),
                tenant_id: TenantId::global(),
                created_at: Utc::now(),
                revoked: false,
                last_used: None,
            };
            self.store.put(&keys::access_key(access_key_id), encode(&record)?)?;
            self.store.put(
                &keys::access_key_by_user(user_id.as_str(), access_key_id),
                Vec::new(),
            )?;
            tracing::info!(access_key_id, "materialized bootstrap admin");
        }
        Ok(())
    }

    /// §4.4: 5 requests per minute per client IP.
    #[must_use]
    pub fn rate_limit(&self, client_ip: IpAddr) -> bool {
        self.rate_limiter.check(client_ip)
    }

    /// Seconds until `client_ip` next has a request token available.
    #[must_use]
    pub fn rate_limit_retry_after(&self, client_ip: IpAddr) -> u64 {
        self.rate_limiter.retry_after(client_ip)
    }

    fn lockout_state(&self, user_id: &UserId) -> CoreResult<LockoutState> {
        match self.store.get(&keys::user_lockout(user_id.as_str()))? {
            Some(bytes) => decode(&bytes),
            None => Ok(LockoutState::default()),
        }
    }

    fn save_lockout(&self, user_id: &UserId, state: &LockoutState) -> CoreResult<()> {
        self.store.put(&keys::user_lockout(user_id.as_str()), encode(state)?)
    }

    /// Validate a username/password pair, applying lockout and 2FA gating
    /// (§4.4, S4).
    ///
    /// The lockout check happens *before* the password is verified so that
    /// an attacker cannot distinguish "wrong password" from "account locked"
    /// by timing (§4.4: "this is done before credential check so timing
    /// does not reveal whether the account exists").
    pub fn login(&self, username: &str, password: &str) -> CoreResult<LoginOutcome> {
        let Some(user) = users::find_user_by_username(self.store.as_ref(), username)? else {
            // Burn the same amount of work a real lockout+bcrypt check
            // would, so a nonexistent username isn't distinguishable by
            // timing from a locked one.
            let _ = password::verify(password, "$2b$12$CwTycUXWue0Thq9StjUM0uJ8qJn.1Y6xH6Ljl7BVaOYe0w8XgKTya");
            return Err(CoreError::Unauthenticated("invalid credentials".to_owned()));
        };

        let now = Utc::now();
        let mut lockout = self.lockout_state(&user.id)?;
        if let Some(locked_until) = lockout.locked_until {
            if locked_until > now {
                return Ok(LoginOutcome::Locked { locked_until });
            }
        }

        if !password::verify(password, &user.password_hash)? {
            if lockout
                .first_failure_at
                .is_none_or(|first| now - first > LOCKOUT_WINDOW)
            {
                lockout.first_failure_at = Some(now);
                lockout.failed_count = 0;
            }
            lockout.failed_count += 1;
            if lockout.failed_count >= LOCKOUT_THRESHOLD {
                lockout.locked_until = Some(now + LOCKOUT_DURATION);
            }
            self.save_lockout(&user.id, &lockout)?;
            if let Some(locked_until) = lockout.locked_until {
                return Ok(LoginOutcome::Locked { locked_until });
            }
            return Err(CoreError::Unauthenticated("invalid credentials".to_owned()));
        }

        self.save_lockout(&user.id, &LockoutState::default())?;

        if user.two_factor_enabled {
            return Ok(LoginOutcome::RequiresTwoFactor { user_id: user.id });
        }

        let token = self.issue_token(&user)?;
        Ok(LoginOutcome::Authenticated {
            token,
            user_id: user.id,
        })
    }

    fn issue_token(&self, user: &User) -> CoreResult<String> {
        jwt::issue(&self.jwt_secret, user.id.as_str(), user.tenant_id.as_str(), &user.roles)
    }

    /// Validate a signed JWT and return the live user it names.
    pub fn validate_jwt(&self, token: &str) -> CoreResult<User> {
        let claims = jwt::verify(&self.jwt_secret, token)?;
        let user_id = UserId::new(claims.sub)?;
        let Some(user) = users::get_user(self.store.as_ref(), &user_id)? else {
            return Err(CoreError::Unauthenticated("unknown user".to_owned()));
        };
        match user.status {
            UserStatus::Active => {}
            UserStatus::Locked => return Err(CoreError::Unauthenticated("account is locked".to_owned())),
            UserStatus::Disabled => return Err(CoreError::Unauthenticated("account is disabled".to_owned())),
        }
        Ok(user)
    }

    fn two_factor_state(&self, user_id: &UserId) -> CoreResult<TwoFactorState> {
        match self.store.get(&keys::user_2fa(user_id.as_str()))? {
            Some(bytes) => decode(&bytes),
            None => Ok(TwoFactorState::default()),
        }
    }

    fn save_two_factor_state(&self, user_id: &UserId, state: &TwoFactorState) -> CoreResult<()> {
        self.store.put(&keys::user_2fa(user_id.as_str()), encode(state)?)
    }

    /// Start 2FA enrollment: generate a secret and return its provisioning
    /// URL. Not yet active until [`Self::enable_2fa`] confirms a fresh code.
    pub fn setup_2fa(&self, user: &User) -> CoreResult<String> {
        let secret = totp::generate_secret();
        let url = totp::provisioning_url(&secret, &user.username, TOTP_ISSUER)?;
        self.save_two_factor_state(
            &user.id,
            &TwoFactorState {
                secret: Some(secret),
                enabled: false,
                backup_code_hashes: vec![],
            },
        )?;
        Ok(url)
    }

    /// Confirm enrollment with a fresh TOTP code, activating 2FA and
    /// returning ten single-use backup codes in plaintext (shown once).
    pub fn enable_2fa(&self, user: &User, code: &str) -> CoreResult<Vec<String>> {
        let mut state = self.two_factor_state(&user.id)?;
        let Some(secret) = state.secret.clone() else {
            return Err(CoreError::invalid_input("2FA has not been set up"));
        };
        if !totp::check(&secret, &user.username, TOTP_ISSUER, code)? {
            return Err(CoreError::Unauthenticated("invalid 2FA code".to_owned()));
        }

        let backup_codes = totp::generate_backup_codes();
        state.enabled = true;
        state.backup_code_hashes = backup_codes
            .iter()
            .map(|c| password::hash(c))
            .collect::<CoreResult<Vec<_>>>()?;
        self.save_two_factor_state(&user.id, &state)?;

        let mut user = user.clone();
        user.two_factor_enabled = true;
        user.totp_secret = Some(secret);
        users::save_user(self.store.as_ref(), &user)?;

        Ok(backup_codes)
    }

    /// Verify a 2FA code: a fresh TOTP in the current ±1 step window, or an
    /// unused backup code (exhausted on success). Returns a JWT on success.
    pub fn verify_2fa(&self, user: &User, code: &str) -> CoreResult<String> {
        let mut state = self.two_factor_state(&user.id)?;
        if let Some(secret) = &state.secret {
            if totp::check(secret, &user.username, TOTP_ISSUER, code)? {
                return self.issue_token(user);
            }
        }

        if let Some(pos) = state
            .backup_code_hashes
            .iter()
            .position(|h| password::verify(code, h).unwrap_or(false))
        {
            state.backup_code_hashes.remove(pos);
            self.save_two_factor_state(&user.id, &state)?;
            return self.issue_token(user);
        }

        Err(CoreError::Unauthenticated("invalid 2FA code".to_owned()))
    }

    /// Disable 2FA. Requires either the user themselves with a fresh TOTP,
    /// or a global admin acting on another user (§4.4).
    pub fn disable_2fa(&self, actor: &User, target: &User, code: Option<&str>) -> CoreResult<()> {
        if actor.id == target.id {
            let Some(code) = code else {
                return Err(CoreError::invalid_input("TOTP code required to disable 2FA"));
            };
            let state = self.two_factor_state(&target.id)?;
            let Some(secret) = &state.secret else {
                return Err(CoreError::invalid_input("2FA is not enabled"));
            };
            if !totp::check(secret, &target.username, TOTP_ISSUER, code)? {
                return Err(CoreError::Unauthenticated("invalid 2FA code".to_owned()));
            }
        } else if !actor.is_global_admin() {
            return Err(CoreError::forbidden("only a global admin may disable another user's 2FA"));
        }

        self.save_two_factor_state(&target.id, &TwoFactorState::default())?;
        let mut target = target.clone();
        target.two_factor_enabled = false;
        target.totp_secret = None;
        users::save_user(self.store.as_ref(), &target)
    }

    /// Create a new access key for `user_id`/`tenant_id` and account for it
    /// in the tenant's key counter.
    pub fn create_access_key(&self, user_id: &UserId, tenant_id: &TenantId) -> CoreResult<NewAccessKey> {
        let created = access_keys::create(self.store.as_ref(), user_id, tenant_id)?;
        if !tenant_id.is_global() {
            self.store
                .atomic_add(&keys::tenant_counter(tenant_id.as_str(), "access_keys"), 1)?;
        }
        Ok(created)
    }

    /// List every access key belonging to `user_id`, redacted (§5: "all
    /// later reads return metadata only").
    pub fn list_access_keys(&self, user_id: &UserId) -> CoreResult<Vec<AccessKeySummary>> {
        access_keys::list_for_user_summaries(self.store.as_ref(), user_id)
    }

    /// Revoke an access key.
    pub fn revoke_access_key(&self, access_key_id: &str) -> CoreResult<()> {
        access_keys::revoke(self.store.as_ref(), access_key_id)
    }

    /// Explicitly lock or disable a user (admin action), independent of the
    /// automatic failed-login lockout (§4.4).
    pub fn set_user_status(&self, user_id: &UserId, status: UserStatus) -> CoreResult<()> {
        users::set_user_status(self.store.as_ref(), user_id, status)
    }

    /// A [`meridian_sigv4::credentials::CredentialProvider`] backed by this
    /// manager's access key table.
    #[must_use]
    pub fn credential_store(&self) -> access_keys::CredentialStore {
        access_keys::CredentialStore::new(Arc::clone(&self.store))
    }
}

#[cfg(test)]
mod tests {
    use meridian_metadata::InMemoryStore;

    use super::*;

    fn manager() -> AuthManager {
        AuthManager::new(Arc::new(InMemoryStore::new()), "test-secret")
    }

    fn make_user(mgr: &AuthManager, username: &str, password: &str) -> User {
        let user = User {
            id: UserId::generate(),
            tenant_id: TenantId::new("t1").unwrap(),
            username: username.to_owned(),
            password_hash: crate::password::hash(password).unwrap(),
            roles: vec![Role::User],
            status: UserStatus::Active,
            totp_secret: None,
            two_factor_enabled: false,
            created_at: Utc::now(),
        };
        users::create_user(mgr.store.as_ref(), &user).unwrap();
        user
    }

    #[test]
    fn test_login_with_correct_password_succeeds() {
        let mgr = manager();
        make_user(&mgr, "alice", "hunter2");
        let outcome = mgr.login("alice", "hunter2").unwrap();
        assert!(matches!(outcome, LoginOutcome::Authenticated { .. }));
    }

    #[test]
    fn test_login_with_wrong_password_fails() {
        let mgr = manager();
        make_user(&mgr, "alice", "hunter2");
        assert!(mgr.login("alice", "wrong").is_err());
    }

    #[test]
    fn test_five_failures_lock_the_account() {
        let mgr = manager();
        make_user(&mgr, "alice", "hunter2");
        for _ in 0..5 {
            let _ = mgr.login("alice", "wrong");
        }
        let outcome = mgr.login("alice", "hunter2").unwrap();
        assert!(matches!(outcome, LoginOutcome::Locked { .. }));
    }

    #[test]
    fn test_successful_login_resets_failure_count() {
        let mgr = manager();
        make_user(&mgr, "alice", "hunter2");
        for _ in 0..3 {
            let _ = mgr.login("alice", "wrong");
        }
        assert!(matches!(
            mgr.login("alice", "hunter2").unwrap(),
            LoginOutcome::Authenticated { .. }
        ));
        for _ in 0..4 {
            let _ = mgr.login("alice", "wrong");
        }
        // Only 4 failures since the reset -- still under threshold.
        assert!(matches!(
            mgr.login("alice", "hunter2").unwrap(),
            LoginOutcome::Authenticated { .. }
        ));
    }

    #[test]
    fn test_2fa_enrollment_then_verify_round_trips() {
        let mgr = manager();
        let user = make_user(&mgr, "alice", "hunter2");
        let url = mgr.setup_2fa(&user).unwrap();
        assert!(url.contains("otpauth://"));

        let state = mgr.two_factor_state(&user.id).unwrap();
        let secret = state.secret.unwrap();
        let totp = totp_rs::TOTP::new(
            totp_rs::Algorithm::SHA1,
            6,
            1,
            30,
            totp_rs::Secret::Encoded(secret).to_bytes().unwrap(),
        )
        .unwrap();
        let code = totp.generate_current().unwrap();

        let backup_codes = mgr.enable_2fa(&user, &code).unwrap();
        assert_eq!(backup_codes.len(), 10);

        let mut enabled_user = user.clone();
        enabled_user.two_factor_enabled = true;
        let token = mgr.verify_2fa(&enabled_user, &code).unwrap();
        assert!(!token.is_empty());
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let mgr = manager();
        mgr.bootstrap("AKIAROOT", "rootsecret", "root").unwrap();
        mgr.bootstrap("AKIAROOT", "rootsecret", "root").unwrap();
        assert!(mgr.store.get(&keys::access_key("AKIAROOT")).unwrap().is_some());
    }

    #[test]
    fn test_validate_jwt_rejects_disabled_user() {
        let mgr = manager();
        let mut user = make_user(&mgr, "alice", "hunter2");
        let token = mgr.issue_token(&user).unwrap();
        assert!(mgr.validate_jwt(&token).is_ok());

        user.status = UserStatus::Disabled;
        users::save_user(mgr.store.as_ref(), &user).unwrap();
        assert!(mgr.validate_jwt(&token).is_err());
    }

    #[test]
    fn test_validate_jwt_rejects_locked_user() {
        let mgr = manager();
        let mut user = make_user(&mgr, "bob", "hunter2");
        let token = mgr.issue_token(&user).unwrap();
        user.status = UserStatus::Locked;
        users::save_user(mgr.store.as_ref(), &user).unwrap();
        assert!(mgr.validate_jwt(&token).is_err());
    }

    #[test]
    fn test_set_user_status_disables_login_via_jwt() {
        let mgr = manager();
        let user = make_user(&mgr, "carol", "hunter2");
        let token = mgr.issue_token(&user).unwrap();
        mgr.set_user_status(&user.id, UserStatus::Disabled).unwrap();
        assert!(mgr.validate_jwt(&token).is_err());
    }

    #[test]
    fn test_list_access_keys_never_exposes_the_secret() {
        let mgr = manager();
        let user = make_user(&mgr, "dave", "hunter2");
        let created = mgr.create_access_key(&user.id, &user.tenant_id).unwrap();
        let summaries = mgr.list_access_keys(&user.id).unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].access_key_id, created.access_key_id);
    }
}
