//! TOTP-based 2FA (§4.4): 30-second step, 6 digits, SHA1, one step of clock
//! skew tolerated in either direction.

use meridian_core::{CoreError, CoreResult};
use rand::RngCore;
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP: u64 = 30;
const BACKUP_CODE_COUNT: usize = 10;

fn totp_for(secret_base32: &str, account: &str, issuer: &str) -> CoreResult<TOTP> {
    let secret = Secret::Encoded(secret_base32.to_owned())
        .to_bytes()
        .map_err(|e| CoreError::invalid_input(format!("invalid 2FA secret: {e:?}")))?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP, secret)
        .map(|mut t| {
            t.account_name = account.to_owned();
            t.issuer = Some(issuer.to_owned());
            t
        })
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("build TOTP: {e}")))
}

/// Generate a fresh base32-encoded TOTP secret.
#[must_use]
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

/// Build the `otpauth://` provisioning URL a client app scans as a QR code.
pub fn provisioning_url(secret_base32: &str, account: &str, issuer: &str) -> CoreResult<String> {
    Ok(totp_for(secret_base32, account, issuer)?.get_url())
}

/// Check `code` against `secret_base32` within the configured skew window
/// (§4.4: "TOTP in the current ±1 step window").
pub fn check(secret_base32: &str, account: &str, issuer: &str, code: &str) -> CoreResult<bool> {
    let totp = totp_for(secret_base32, account, issuer)?;
    totp.check_current(code)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("check TOTP: {e}")))
}

/// Generate `BACKUP_CODE_COUNT` single-use backup codes in plaintext. The
/// caller is responsible for hashing and persisting them and returning the
/// plaintext to the user exactly once.
#[must_use]
pub fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODE_COUNT)
        .map(|_| {
            let mut buf = [0_u8; 5];
            rand::rng().fill_bytes(&mut buf);
            hex::encode(buf)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_code_verifies() {
        let secret = generate_secret();
        let totp = totp_for(&secret, "alice", "meridian").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(check(&secret, "alice", "meridian", &code).unwrap());
    }

    #[test]
    fn test_wrong_code_is_rejected() {
        let secret = generate_secret();
        assert!(!check(&secret, "alice", "meridian", "000000").unwrap());
    }

    #[test]
    fn test_replaying_same_code_within_step_is_allowed() {
        // S4: "Same TOTP code replayed within the same time step is not
        // rejected" -- TOTP verification itself is stateless; replay
        // rejection is the caller's job only for backup codes.
        let secret = generate_secret();
        let totp = totp_for(&secret, "alice", "meridian").unwrap();
        let code = totp.generate_current().unwrap();
        assert!(check(&secret, "alice", "meridian", &code).unwrap());
        assert!(check(&secret, "alice", "meridian", &code).unwrap());
    }

    #[test]
    fn test_backup_codes_are_unique_and_plentiful() {
        let codes = generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), BACKUP_CODE_COUNT);
    }
}
