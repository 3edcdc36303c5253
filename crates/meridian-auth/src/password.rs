//! bcrypt password hashing (§4.4 ambient stack: cost factor is a constant,
//! not configurable — see `SPEC_FULL.md`).

use meridian_core::{CoreError, CoreResult};

/// bcrypt work factor. Fixed rather than configurable; raising it is a
/// breaking change to every stored hash.
const COST: u32 = 12;

/// Hash `password` with bcrypt at [`COST`].
pub fn hash(password: &str) -> CoreResult<String> {
    bcrypt::hash(password, COST)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("bcrypt hash: {e}")))
}

/// Verify `password` against a previously stored bcrypt `hash`.
pub fn verify(password: &str, hash: &str) -> CoreResult<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("bcrypt verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify_round_trips() {
        let h = hash("correct horse battery staple").unwrap();
        assert!(verify("correct horse battery staple", &h).unwrap());
    }

    #[test]
    fn test_wrong_password_fails_verify() {
        let h = hash("correct horse battery staple").unwrap();
        assert!(!verify("wrong", &h).unwrap());
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let h = hash("hunter2").unwrap();
        assert_ne!(h, "hunter2");
    }
}
