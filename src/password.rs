// Salted password derivation and constant-time verification

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use subtle::ConstantTimeEq;

/// PBKDF2 rounds; slow on purpose
const ITERATIONS: u32 = 120_000;
/// Derived key length in bytes
const KEY_LENGTH: usize = 64;
/// Random salt length in bytes (hex-encoded for storage)
const SALT_LENGTH: usize = 16;

/// A salted one-way digest of a password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordHash {
    pub salt: String,
    pub hash: String,
}

/// Derive a digest for `password`, generating a fresh random salt when none
/// is supplied.
pub fn hash_password(password: &str, salt: Option<&str>) -> PasswordHash {
    let salt = match salt {
        Some(existing) => existing.to_string(),
        None => generate_salt(),
    };

    let mut derived = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha512>(password.as_bytes(), salt.as_bytes(), ITERATIONS, &mut derived);

    PasswordHash {
        salt,
        hash: hex::encode(derived),
    }
}

/// Recompute the digest with the stored salt and compare in constant time.
///
/// A malformed stored hash fails verification rather than panicking.
pub fn verify_password(password: &str, stored: &PasswordHash) -> bool {
    let computed = hash_password(password, Some(&stored.salt));

    let expected = match hex::decode(&stored.hash) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let actual = match hex::decode(&computed.hash) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    if expected.len() != actual.len() {
        return false;
    }

    actual.ct_eq(&expected).into()
}

fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    hex::encode(salt)
}
