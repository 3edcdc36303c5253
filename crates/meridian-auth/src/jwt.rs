//! JWT issuance and validation (§4.4): HS256, 12h expiry, claims
//! `{sub, tenant, roles, exp, iat, jti}`.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use meridian_core::{CoreError, CoreResult, Role};
use serde::{Deserialize, Serialize};

const EXPIRY_HOURS: i64 = 12;

/// The claim set embedded in every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: String,
    /// The user's tenant id (empty for a global admin).
    pub tenant: String,
    /// The user's roles, serialized by name.
    pub roles: Vec<Role>,
    /// Expiry, Unix seconds.
    pub exp: i64,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// A unique token id, for future revocation lists.
    pub jti: String,
}

/// Mint a signed token for the given identity.
pub fn issue(secret: &str, user_id: &str, tenant_id: &str, roles: &[Role]) -> CoreResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_owned(),
        tenant: tenant_id.to_owned(),
        roles: roles.to_vec(),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::hours(EXPIRY_HOURS)).timestamp(),
        jti: uuid::Uuid::new_v4().to_string(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CoreError::Internal(anyhow::anyhow!("issue JWT: {e}")))
}

/// Verify `token`'s signature and expiry, returning its claims.
///
/// # Errors
/// Returns [`CoreError::Unauthenticated`] for any signature, expiry, or
/// structural failure; the caller should not distinguish between them
/// (§4.4: a rejected token is just unauthenticated).
pub fn verify(secret: &str, token: &str) -> CoreResult<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|_| CoreError::Unauthenticated("invalid or expired token".to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify_round_trips() {
        let token = issue("s3cr3t", "u1", "t1", &[Role::User]).unwrap();
        let claims = verify("s3cr3t", &token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.tenant, "t1");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = issue("s3cr3t", "u1", "t1", &[Role::User]).unwrap();
        assert!(matches!(
            verify("wrong-secret", &token),
            Err(CoreError::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        assert!(matches!(
            verify("s3cr3t", "not-a-jwt"),
            Err(CoreError::Unauthenticated(_))
        ));
    }
}
