//! API key secret hashing and verification, shared by `dispatch-ctl`
//! (which mints keys) and `dispatch-api` (which verifies them on every
//! request) so the two can never drift onto different hash schemes.
//!
//! spec.md §6: `Authorization: Bearer {key_id}.{secret}`, verified via
//! constant-time comparison against `key_hash`.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const KEY_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A freshly minted key pair: the public `key_id` goes in the API key row
/// as-is, the `secret` is shown to the operator exactly once and never
/// stored — only its hash is.
pub struct NewApiKey {
    pub key_id: String,
    pub secret: SecretString,
    pub key_hash: String,
}

pub fn generate() -> NewApiKey {
    let key_id: String = (0..16).map(|_| KEY_ID_CHARS[fastrand::usize(..KEY_ID_CHARS.len())] as char).collect();
    let secret_raw: String = (0..32).map(|_| KEY_ID_CHARS[fastrand::usize(..KEY_ID_CHARS.len())] as char).collect();
    let key_hash = hash_secret(&secret_raw);
    NewApiKey {
        key_id,
        secret: SecretString::from(secret_raw),
        key_hash,
    }
}

pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    hex::encode(digest)
}

/// Constant-time verification: decodes the stored hex digest and the
/// freshly computed one, then compares byte-for-byte via `subtle` so a
/// mistyped secret doesn't leak timing information about how many
/// leading bytes matched.
pub fn verify_secret(secret: &SecretString, stored_hash_hex: &str) -> bool {
    let computed = hash_secret(secret.expose_secret());
    let (Ok(a), Ok(b)) = (hex::decode(&computed), hex::decode(stored_hash_hex)) else {
        return false;
    };
    a.len() == b.len() && bool::from(a.ct_eq(&b))
}

/// Splits `Bearer {key_id}.{secret}` into its two parts.
pub fn parse_bearer(header_value: &str) -> Option<(&str, SecretString)> {
    let token = header_value.strip_prefix("Bearer ")?;
    let (key_id, secret) = token.split_once('.')?;
    if key_id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((key_id, SecretString::from(secret.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_verifies_against_its_own_hash() {
        let key = generate();
        assert!(verify_secret(&key.secret, &key.key_hash));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let key = generate();
        let wrong = SecretString::from("not-the-secret".to_string());
        assert!(!verify_secret(&wrong, &key.key_hash));
    }

    #[test]
    fn parses_bearer_header() {
        let (key_id, secret) = parse_bearer("Bearer abc123.supersecret").unwrap();
        assert_eq!(key_id, "abc123");
        assert_eq!(secret.expose_secret(), "supersecret");
    }

    #[test]
    fn rejects_malformed_bearer_header() {
        assert!(parse_bearer("Bearer noseparator").is_none());
        assert!(parse_bearer("Basic abc.def").is_none());
    }
}
